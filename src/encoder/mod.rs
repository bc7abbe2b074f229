//! Printer command-language encoders.
//!
//! Every encoder accumulates one label's command lines in a [`CommandBuffer`].
//! Printing and previewing go through the same [`ProtocolEncoder::compose`]
//! path, so the only difference between the two outputs is the trailing
//! print command.

pub mod epl2;
pub mod ppla;
pub mod units;
pub mod zpl;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::PrintError;
use crate::label::{BarcodeSpec, FontSpec, LabelElement, Position, QrSpec, Rotation};

pub use epl2::Epl2Encoder;
pub use ppla::PplaEncoder;
pub use zpl::ZplEncoder;

/// Symbology used when a barcode type is not in an encoder's table.
pub const DEFAULT_SYMBOLOGY: &str = "CODE128";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Ppla,
    Epl2,
    Zpl,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Ppla => "PPLA",
            Protocol::Epl2 => "EPL2",
            Protocol::Zpl => "ZPL",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PPLA" => Ok(Protocol::Ppla),
            "EPL2" | "EPL" => Ok(Protocol::Epl2),
            "ZPL" | "ZPL2" | "ZPLII" => Ok(Protocol::Zpl),
            _ => Err(PrintError::UnsupportedProtocol {
                protocol: s.to_string(),
            }),
        }
    }
}

/// Media and print settings written at the start of every label.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelSetup {
    pub width_mm: Option<f32>,
    pub height_mm: Option<f32>,
    pub speed: Option<u8>,
    pub density: Option<u8>,
}

/// Ordered command lines for a single label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBuffer {
    lines: Vec<String>,
}

impl CommandBuffer {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn insert(&mut self, index: usize, line: impl Into<String>) {
        self.lines.insert(index, line.into());
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

pub trait ProtocolEncoder: Send {
    fn protocol(&self) -> Protocol;

    /// Settings applied by [`ProtocolEncoder::compose`] after `initialize`.
    fn setup(&self) -> LabelSetup;

    fn initialize(&mut self);

    fn set_label_size(&mut self, width_mm: f32, height_mm: f32);

    fn set_print_speed(&mut self, speed: u8) -> Result<(), PrintError>;

    fn set_print_density(&mut self, density: u8) -> Result<(), PrintError>;

    fn add_text(&mut self, content: &str, at: Position, font: &FontSpec, rotation: Rotation);

    fn add_barcode(&mut self, content: &str, at: Position, spec: &BarcodeSpec, rotation: Rotation);

    fn add_qr_code(&mut self, content: &str, at: Position, spec: &QrSpec, rotation: Rotation);

    fn add_line(&mut self, at: Position, length: f32, thickness: f32, rotation: Rotation);

    fn add_rectangle(&mut self, at: Position, width: f32, height: f32, thickness: f32);

    fn clear_buffer(&mut self);

    /// Appends the print command. `copies` must be at least 1.
    fn print(&mut self, copies: i32) -> Result<(), PrintError>;

    fn commands(&self) -> &[String];

    fn line_terminator(&self) -> &'static str {
        "\r\n"
    }

    fn apply(&mut self, element: &LabelElement) {
        match element {
            LabelElement::Text {
                position,
                rotation,
                content,
                font,
            } => self.add_text(content, *position, font, *rotation),
            LabelElement::Barcode {
                position,
                rotation,
                content,
                spec,
            } => self.add_barcode(content, *position, spec, *rotation),
            LabelElement::QrCode {
                position,
                rotation,
                content,
                spec,
            } => self.add_qr_code(content, *position, spec, *rotation),
            LabelElement::Line {
                position,
                rotation,
                length,
                thickness,
            } => self.add_line(*position, *length, *thickness, *rotation),
            LabelElement::Rectangle {
                position,
                width,
                height,
                thickness,
                ..
            } => self.add_rectangle(*position, *width, *height, *thickness),
        }
    }

    /// Resets the buffer and encodes the label header plus every element.
    fn compose(&mut self, elements: &[LabelElement]) -> Result<(), PrintError> {
        let setup = self.setup();
        self.clear_buffer();
        self.initialize();
        if let (Some(width), Some(height)) = (setup.width_mm, setup.height_mm) {
            self.set_label_size(width, height);
        }
        if let Some(speed) = setup.speed {
            self.set_print_speed(speed)?;
        }
        if let Some(density) = setup.density {
            self.set_print_density(density)?;
        }
        for element in elements {
            self.apply(element);
        }
        Ok(())
    }

    fn generate_preview(&mut self, elements: &[LabelElement]) -> Result<String, PrintError> {
        self.compose(elements)?;
        Ok(self.commands().join("\n"))
    }

    /// Full print job for `elements`, ready for the transport.
    fn encode_job(&mut self, elements: &[LabelElement], copies: i32) -> Result<Vec<u8>, PrintError> {
        self.compose(elements)?;
        self.print(copies)?;
        Ok(self.to_wire())
    }

    fn to_wire(&self) -> Vec<u8> {
        let terminator = self.line_terminator();
        let mut wire = Vec::new();
        for line in self.commands() {
            wire.extend_from_slice(line.as_bytes());
            wire.extend_from_slice(terminator.as_bytes());
        }
        wire
    }
}

pub fn new_encoder(protocol: Protocol, setup: LabelSetup) -> Box<dyn ProtocolEncoder> {
    match protocol {
        Protocol::Ppla => Box::new(PplaEncoder::new(setup)),
        Protocol::Epl2 => Box::new(Epl2Encoder::new(setup)),
        Protocol::Zpl => Box::new(ZplEncoder::new(setup)),
    }
}

pub(crate) fn check_copies(copies: i32) -> Result<u32, PrintError> {
    if copies < 1 {
        return Err(PrintError::InvalidArgument(format!(
            "copies must be at least 1, got {}",
            copies
        )));
    }
    Ok(copies as u32)
}

pub(crate) fn check_range(
    what: &str,
    value: u8,
    range: std::ops::RangeInclusive<u8>,
    protocol: Protocol,
) -> Result<u8, PrintError> {
    if !range.contains(&value) {
        return Err(PrintError::InvalidArgument(format!(
            "{} {} out of range {}..={} for {}",
            what,
            value,
            range.start(),
            range.end(),
            protocol
        )));
    }
    Ok(value)
}

/// Looks `symbology` up in a protocol table, falling back to the
/// [`DEFAULT_SYMBOLOGY`] entry.
pub(crate) fn lookup_symbology(
    table: &[(&'static str, &'static str)],
    symbology: &str,
) -> &'static str {
    let wanted: String = symbology
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase();
    table
        .iter()
        .find(|(name, _)| *name == wanted)
        .or_else(|| table.iter().find(|(name, _)| *name == DEFAULT_SYMBOLOGY))
        .map(|(_, code)| *code)
        .unwrap_or_default()
}

/// Single-character font id, or `fallback` when the name is not one.
pub(crate) fn font_id(name: &str, fallback: char) -> char {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => c,
        _ => fallback,
    }
}
