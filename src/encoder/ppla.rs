// Argox PPLA encoder.
//
// Label formats run in metric mode, so every coordinate is in tenths of a
// millimetre. Records inside a format are fixed-width ASCII fields; system
// commands are prefixed with STX and must come before `<STX>L`.

use super::units::{line_box, mm_to_tenths};
use super::{
    check_copies, check_range, font_id, lookup_symbology, CommandBuffer, LabelSetup, Protocol,
    ProtocolEncoder,
};
use crate::errors::PrintError;
use crate::label::{BarcodeSpec, FontSpec, Position, QrSpec, Rotation};

const STX: char = '\u{2}';

/// Barcode ids; uppercase prints the human readable line, lowercase omits it.
const SYMBOLOGIES: &[(&str, &str)] = &[
    ("CODE128", "E"),
    ("EAN13", "F"),
    ("EAN8", "G"),
    ("CODE39", "A"),
    ("UPCA", "B"),
    ("ITF", "D"),
    ("CODE93", "O"),
];

pub struct PplaEncoder {
    buffer: CommandBuffer,
    setup: LabelSetup,
    /// Index of `<STX>L` once the format has been opened.
    format_start: Option<usize>,
}

impl PplaEncoder {
    pub fn new(setup: LabelSetup) -> Self {
        Self {
            buffer: CommandBuffer::default(),
            setup,
            format_start: None,
        }
    }

    fn rotation_code(rotation: Rotation) -> u8 {
        rotation.quarter_turns() + 1
    }

    /// Row/column tail shared by every record.
    fn place(at: Position) -> String {
        format!("{:04}{:04}", mm_to_tenths(at.y), mm_to_tenths(at.x))
    }

    fn system_command(&mut self, command: String) {
        match self.format_start {
            Some(index) => {
                self.buffer.insert(index, command);
                self.format_start = Some(index + 1);
            }
            None => self.buffer.push(command),
        }
    }
}

impl ProtocolEncoder for PplaEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::Ppla
    }

    fn setup(&self) -> LabelSetup {
        self.setup
    }

    fn initialize(&mut self) {
        self.format_start = Some(self.buffer.len());
        self.buffer.push(format!("{}L", STX));
        self.buffer.push("m");
        self.buffer.push("D11");
    }

    fn set_label_size(&mut self, width_mm: f32, height_mm: f32) {
        self.system_command(format!("{}KcLW{:04}", STX, mm_to_tenths(width_mm)));
        self.system_command(format!("{}M{:04}", STX, mm_to_tenths(height_mm)));
    }

    fn set_print_speed(&mut self, speed: u8) -> Result<(), PrintError> {
        let speed = check_range("speed", speed, 1..=6, Protocol::Ppla)?;
        self.buffer.push(format!("P{}", (b'A' + speed - 1) as char));
        Ok(())
    }

    fn set_print_density(&mut self, density: u8) -> Result<(), PrintError> {
        let density = check_range("density", density, 0..=20, Protocol::Ppla)?;
        self.buffer.push(format!("H{:02}", density));
        Ok(())
    }

    fn add_text(&mut self, content: &str, at: Position, font: &FontSpec, rotation: Rotation) {
        self.buffer.push(format!(
            "{}{}{}{}000{}{}",
            Self::rotation_code(rotation),
            font_id(&font.name, '2'),
            font.width.clamp(1, 9),
            font.height.clamp(1, 9),
            Self::place(at),
            content
        ));
    }

    fn add_barcode(&mut self, content: &str, at: Position, spec: &BarcodeSpec, rotation: Rotation) {
        let code = lookup_symbology(SYMBOLOGIES, &spec.symbology);
        let code = if spec.human_readable {
            code.to_string()
        } else {
            code.to_ascii_lowercase()
        };
        let narrow = spec.bar_width.clamp(1, 3);
        self.buffer.push(format!(
            "{}{}{}{}{:03}{}{}",
            Self::rotation_code(rotation),
            code,
            narrow * 3,
            narrow,
            mm_to_tenths(spec.height).min(999),
            Self::place(at),
            content
        ));
    }

    fn add_qr_code(&mut self, content: &str, at: Position, spec: &QrSpec, rotation: Rotation) {
        let size = spec.size.clamp(1, 9);
        self.buffer.push(format!(
            "{}W1D{}{}000{}QA,{}",
            Self::rotation_code(rotation),
            size,
            size,
            Self::place(at),
            content
        ));
    }

    fn add_line(&mut self, at: Position, length: f32, thickness: f32, rotation: Rotation) {
        let (x, y, w, h) = line_box(at, length, thickness, rotation);
        self.buffer.push(format!(
            "1X1100{}l{:04}{:04}",
            Self::place(Position::new(x, y)),
            mm_to_tenths(w).max(1),
            mm_to_tenths(h).max(1)
        ));
    }

    fn add_rectangle(&mut self, at: Position, width: f32, height: f32, thickness: f32) {
        let border = mm_to_tenths(thickness).max(1);
        self.buffer.push(format!(
            "1X1100{}b{:04}{:04}{:04}{:04}",
            Self::place(at),
            mm_to_tenths(width),
            mm_to_tenths(height),
            border,
            border
        ));
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.format_start = None;
    }

    fn print(&mut self, copies: i32) -> Result<(), PrintError> {
        let copies = check_copies(copies)?;
        self.buffer.push(format!("Q{:04}", copies.min(9999)));
        self.buffer.push("E");
        Ok(())
    }

    fn commands(&self) -> &[String] {
        self.buffer.lines()
    }

    fn line_terminator(&self) -> &'static str {
        "\r"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_commands_precede_format() {
        let mut ppla = PplaEncoder::new(LabelSetup {
            width_mm: Some(40.0),
            height_mm: Some(60.0),
            speed: Some(2),
            density: Some(10),
        });
        ppla.compose(&[]).expect("compose");
        assert_eq!(
            ppla.commands(),
            [
                "\u{2}KcLW0400",
                "\u{2}M0600",
                "\u{2}L",
                "m",
                "D11",
                "PB",
                "H10"
            ]
        );
    }

    #[test]
    fn test_text_record() {
        let mut ppla = PplaEncoder::new(LabelSetup::default());
        ppla.add_text("R$ 29,90", Position::new(5.0, 12.3), &FontSpec::new("9", 2, 2), Rotation::R0);
        assert_eq!(ppla.commands(), ["192200001230050R$ 29,90"]);
    }

    #[test]
    fn test_barcode_without_human_readable_is_lowercase() {
        let mut ppla = PplaEncoder::new(LabelSetup::default());
        let spec = BarcodeSpec {
            symbology: "EAN13".to_string(),
            bar_width: 2,
            height: 10.0,
            human_readable: false,
        };
        ppla.add_barcode("789123456789", Position::new(1.0, 2.0), &spec, Rotation::R270);
        assert_eq!(ppla.commands(), ["4f6210000200010789123456789"]);
    }

    #[test]
    fn test_print_quantity_and_end() {
        let mut ppla = PplaEncoder::new(LabelSetup::default());
        ppla.print(3).expect("print");
        assert_eq!(ppla.commands(), ["Q0003", "E"]);
    }

    #[test]
    fn test_clear_resets_format_marker() {
        let mut ppla = PplaEncoder::new(LabelSetup::default());
        ppla.initialize();
        ppla.clear_buffer();
        ppla.set_label_size(40.0, 30.0);
        assert_eq!(ppla.commands(), ["\u{2}KcLW0400", "\u{2}M0300"]);
    }
}
