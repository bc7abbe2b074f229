use super::units::{line_box, mm_to_dots};
use super::{
    check_copies, check_range, font_id, lookup_symbology, CommandBuffer, LabelSetup, Protocol,
    ProtocolEncoder,
};
use crate::errors::PrintError;
use crate::label::{BarcodeSpec, FontSpec, Position, QrSpec, Rotation};

/// ZPL II field types for `^B` barcode commands.
const SYMBOLOGIES: &[(&str, &str)] = &[
    ("CODE128", "BC"),
    ("EAN13", "BE"),
    ("EAN8", "B8"),
    ("CODE39", "B3"),
    ("UPCA", "BU"),
    ("ITF", "B2"),
    ("CODE93", "BA"),
];

/// Scalable font height in dots for a multiplier of 1.
const FONT_BASE_DOTS: u32 = 20;

pub struct ZplEncoder {
    buffer: CommandBuffer,
    setup: LabelSetup,
}

impl ZplEncoder {
    pub fn new(setup: LabelSetup) -> Self {
        Self {
            buffer: CommandBuffer::default(),
            setup,
        }
    }

    fn orientation(rotation: Rotation) -> char {
        match rotation {
            Rotation::R0 => 'N',
            Rotation::R90 => 'R',
            Rotation::R180 => 'I',
            Rotation::R270 => 'B',
        }
    }

    fn origin(at: Position) -> String {
        format!("^FO{},{}", mm_to_dots(at.x), mm_to_dots(at.y))
    }
}

impl ProtocolEncoder for ZplEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::Zpl
    }

    fn setup(&self) -> LabelSetup {
        self.setup
    }

    fn initialize(&mut self) {
        self.buffer.push("^XA");
        // UTF-8 field data
        self.buffer.push("^CI28");
    }

    fn set_label_size(&mut self, width_mm: f32, height_mm: f32) {
        self.buffer.push(format!("^PW{}", mm_to_dots(width_mm)));
        self.buffer.push(format!("^LL{}", mm_to_dots(height_mm)));
    }

    fn set_print_speed(&mut self, speed: u8) -> Result<(), PrintError> {
        let speed = check_range("speed", speed, 2..=14, Protocol::Zpl)?;
        self.buffer.push(format!("^PR{}", speed));
        Ok(())
    }

    fn set_print_density(&mut self, density: u8) -> Result<(), PrintError> {
        let density = check_range("density", density, 0..=30, Protocol::Zpl)?;
        self.buffer.push(format!("~SD{:02}", density));
        Ok(())
    }

    fn add_text(&mut self, content: &str, at: Position, font: &FontSpec, rotation: Rotation) {
        let height = FONT_BASE_DOTS * u32::from(font.height.max(1));
        let width = FONT_BASE_DOTS * u32::from(font.width.max(1));
        self.buffer.push(format!(
            "{}^A{}{},{},{}^FD{}^FS",
            Self::origin(at),
            font_id(&font.name, '0'),
            Self::orientation(rotation),
            height,
            width,
            content
        ));
    }

    fn add_barcode(&mut self, content: &str, at: Position, spec: &BarcodeSpec, rotation: Rotation) {
        let code = lookup_symbology(SYMBOLOGIES, &spec.symbology);
        let orientation = Self::orientation(rotation);
        let height = mm_to_dots(spec.height);
        let human_readable = if spec.human_readable { 'Y' } else { 'N' };
        // ^B3 takes its check-digit flag before the height.
        let params = if code == "B3" {
            format!("{},N,{},{},N", orientation, height, human_readable)
        } else {
            format!("{},{},{},N", orientation, height, human_readable)
        };
        self.buffer.push(format!(
            "{}^BY{}^{}{}^FD{}^FS",
            Self::origin(at),
            spec.bar_width.clamp(1, 10),
            code,
            params,
            content
        ));
    }

    fn add_qr_code(&mut self, content: &str, at: Position, spec: &QrSpec, _rotation: Rotation) {
        // ^BQ only supports normal orientation.
        self.buffer.push(format!(
            "{}^BQN,2,{}^FDQA,{}^FS",
            Self::origin(at),
            spec.size.clamp(1, 10),
            content
        ));
    }

    fn add_line(&mut self, at: Position, length: f32, thickness: f32, rotation: Rotation) {
        let (x, y, w, h) = line_box(at, length, thickness, rotation);
        let (w, h) = (mm_to_dots(w).max(1), mm_to_dots(h).max(1));
        self.buffer.push(format!(
            "{}^GB{},{},{}^FS",
            Self::origin(Position::new(x, y)),
            w,
            h,
            w.min(h)
        ));
    }

    fn add_rectangle(&mut self, at: Position, width: f32, height: f32, thickness: f32) {
        self.buffer.push(format!(
            "{}^GB{},{},{}^FS",
            Self::origin(at),
            mm_to_dots(width),
            mm_to_dots(height),
            mm_to_dots(thickness).max(1)
        ));
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    fn print(&mut self, copies: i32) -> Result<(), PrintError> {
        let copies = check_copies(copies)?;
        self.buffer.push(format!("^PQ{}", copies));
        self.buffer.push("^XZ");
        Ok(())
    }

    fn commands(&self) -> &[String] {
        self.buffer.lines()
    }

    fn line_terminator(&self) -> &'static str {
        "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> ZplEncoder {
        ZplEncoder::new(LabelSetup::default())
    }

    #[test]
    fn test_text_command() {
        let mut zpl = encoder();
        zpl.add_text("Blusa", Position::new(10.0, 5.0), &FontSpec::new("0", 2, 3), Rotation::R90);
        assert_eq!(zpl.commands(), ["^FO80,40^A0R,60,40^FDBlusa^FS"]);
    }

    #[test]
    fn test_barcode_symbology_table() {
        let mut zpl = encoder();
        let ean = BarcodeSpec {
            symbology: "EAN13".to_string(),
            bar_width: 2,
            height: 10.0,
            human_readable: true,
        };
        zpl.add_barcode("7891234567895", Position::new(0.0, 0.0), &ean, Rotation::R0);
        assert_eq!(zpl.commands()[0], "^FO0,0^BY2^BEN,80,Y,N^FD7891234567895^FS");

        let unknown = BarcodeSpec {
            symbology: "MAXICODE".to_string(),
            human_readable: false,
            ..ean.clone()
        };
        zpl.add_barcode("ABC", Position::new(0.0, 0.0), &unknown, Rotation::R0);
        assert_eq!(zpl.commands()[1], "^FO0,0^BY2^BCN,80,N,N^FDABC^FS");

        let code39 = BarcodeSpec {
            symbology: "CODE39".to_string(),
            ..ean
        };
        zpl.add_barcode("A1", Position::new(0.0, 0.0), &code39, Rotation::R180);
        assert_eq!(zpl.commands()[2], "^FO0,0^BY2^B3I,N,80,Y,N^FDA1^FS");
    }

    #[test]
    fn test_print_with_copies() {
        let mut zpl = encoder();
        zpl.initialize();
        zpl.print(3).expect("print");
        assert_eq!(zpl.commands(), ["^XA", "^CI28", "^PQ3", "^XZ"]);
    }

    #[test]
    fn test_density_range() {
        let mut zpl = encoder();
        assert!(zpl.set_print_density(30).is_ok());
        assert!(matches!(
            zpl.set_print_density(31),
            Err(PrintError::InvalidArgument(_))
        ));
        assert_eq!(zpl.commands(), ["~SD30"]);
    }

    #[test]
    fn test_line_and_rectangle() {
        let mut zpl = encoder();
        zpl.add_line(Position::new(0.0, 30.0), 40.0, 0.5, Rotation::R0);
        zpl.add_rectangle(Position::new(1.0, 1.0), 10.0, 5.0, 0.25);
        assert_eq!(zpl.commands()[0], "^FO0,240^GB320,4,4^FS");
        assert_eq!(zpl.commands()[1], "^FO8,8^GB80,40,2^FS");
    }
}
