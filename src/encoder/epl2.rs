use super::units::{line_box, mm_to_dots};
use super::{
    check_copies, check_range, font_id, lookup_symbology, CommandBuffer, LabelSetup, Protocol,
    ProtocolEncoder,
};
use crate::errors::PrintError;
use crate::label::{BarcodeSpec, FontSpec, Position, QrSpec, Rotation};

const SYMBOLOGIES: &[(&str, &str)] = &[
    ("CODE128", "1"),
    ("EAN13", "E30"),
    ("EAN8", "E80"),
    ("CODE39", "3"),
    ("UPCA", "UA0"),
    ("ITF", "2"),
    ("CODE93", "9"),
];

/// Gap between labels in dots (3 mm).
const LABEL_GAP_DOTS: u32 = 24;

pub struct Epl2Encoder {
    buffer: CommandBuffer,
    setup: LabelSetup,
}

impl Epl2Encoder {
    pub fn new(setup: LabelSetup) -> Self {
        Self {
            buffer: CommandBuffer::default(),
            setup,
        }
    }

    fn quote(content: &str) -> String {
        content.replace('\\', "\\\\").replace('"', "\\\"")
    }
}

impl ProtocolEncoder for Epl2Encoder {
    fn protocol(&self) -> Protocol {
        Protocol::Epl2
    }

    fn setup(&self) -> LabelSetup {
        self.setup
    }

    fn initialize(&mut self) {
        // Clear the image buffer
        self.buffer.push("N");
    }

    fn set_label_size(&mut self, width_mm: f32, height_mm: f32) {
        self.buffer.push(format!("q{}", mm_to_dots(width_mm)));
        self.buffer
            .push(format!("Q{},{}", mm_to_dots(height_mm), LABEL_GAP_DOTS));
    }

    fn set_print_speed(&mut self, speed: u8) -> Result<(), PrintError> {
        let speed = check_range("speed", speed, 1..=6, Protocol::Epl2)?;
        self.buffer.push(format!("S{}", speed));
        Ok(())
    }

    fn set_print_density(&mut self, density: u8) -> Result<(), PrintError> {
        let density = check_range("density", density, 0..=15, Protocol::Epl2)?;
        self.buffer.push(format!("D{}", density));
        Ok(())
    }

    fn add_text(&mut self, content: &str, at: Position, font: &FontSpec, rotation: Rotation) {
        self.buffer.push(format!(
            "A{},{},{},{},{},{},N,\"{}\"",
            mm_to_dots(at.x),
            mm_to_dots(at.y),
            rotation.quarter_turns(),
            font_id(&font.name, '2'),
            font.width.clamp(1, 8),
            font.height.clamp(1, 9),
            Self::quote(content)
        ));
    }

    fn add_barcode(&mut self, content: &str, at: Position, spec: &BarcodeSpec, rotation: Rotation) {
        let narrow = spec.bar_width.clamp(1, 10);
        self.buffer.push(format!(
            "B{},{},{},{},{},{},{},{},\"{}\"",
            mm_to_dots(at.x),
            mm_to_dots(at.y),
            rotation.quarter_turns(),
            lookup_symbology(SYMBOLOGIES, &spec.symbology),
            narrow,
            narrow * 3,
            mm_to_dots(spec.height),
            if spec.human_readable { 'B' } else { 'N' },
            Self::quote(content)
        ));
    }

    fn add_qr_code(&mut self, content: &str, at: Position, spec: &QrSpec, _rotation: Rotation) {
        // EPL2 QR symbols cannot be rotated.
        self.buffer.push(format!(
            "b{},{},Q,m2,s{},eM,\"{}\"",
            mm_to_dots(at.x),
            mm_to_dots(at.y),
            spec.size.clamp(1, 10),
            Self::quote(content)
        ));
    }

    fn add_line(&mut self, at: Position, length: f32, thickness: f32, rotation: Rotation) {
        let (x, y, w, h) = line_box(at, length, thickness, rotation);
        self.buffer.push(format!(
            "LO{},{},{},{}",
            mm_to_dots(x),
            mm_to_dots(y),
            mm_to_dots(w).max(1),
            mm_to_dots(h).max(1)
        ));
    }

    fn add_rectangle(&mut self, at: Position, width: f32, height: f32, thickness: f32) {
        self.buffer.push(format!(
            "X{},{},{},{},{}",
            mm_to_dots(at.x),
            mm_to_dots(at.y),
            mm_to_dots(thickness).max(1),
            mm_to_dots(at.x + width.max(0.0)),
            mm_to_dots(at.y + height.max(0.0))
        ));
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    fn print(&mut self, copies: i32) -> Result<(), PrintError> {
        let copies = check_copies(copies)?;
        self.buffer.push(format!("P{}", copies));
        Ok(())
    }

    fn commands(&self) -> &[String] {
        self.buffer.lines()
    }
}
