// Label model shared by the encoders and the serial layout

use serde::{Deserialize, Serialize};

/// A point on the label in millimetres from the top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Quarter turns clockwise, 0..=3.
    pub fn quarter_turns(self) -> u8 {
        (self.degrees() / 90) as u8
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {}", other)),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    #[serde(default = "FontSpec::default_name")]
    pub name: String,
    #[serde(default = "FontSpec::default_multiplier")]
    pub width: u8,
    #[serde(default = "FontSpec::default_multiplier")]
    pub height: u8,
}

impl FontSpec {
    fn default_name() -> String {
        "2".to_string()
    }

    fn default_multiplier() -> u8 {
        1
    }

    pub fn new(name: &str, width: u8, height: u8) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
        }
    }
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            width: 1,
            height: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeSpec {
    /// Symbology name as sent by the designer, e.g. `CODE128` or `EAN13`.
    #[serde(default = "BarcodeSpec::default_symbology")]
    pub symbology: String,
    /// Narrow bar width in dots.
    #[serde(default = "BarcodeSpec::default_bar_width")]
    pub bar_width: u8,
    /// Bar height in millimetres.
    #[serde(default = "BarcodeSpec::default_height")]
    pub height: f32,
    #[serde(default = "BarcodeSpec::default_human_readable")]
    pub human_readable: bool,
}

impl BarcodeSpec {
    fn default_symbology() -> String {
        "CODE128".to_string()
    }

    fn default_bar_width() -> u8 {
        2
    }

    fn default_height() -> f32 {
        10.0
    }

    fn default_human_readable() -> bool {
        true
    }
}

impl Default for BarcodeSpec {
    fn default() -> Self {
        Self {
            symbology: Self::default_symbology(),
            bar_width: Self::default_bar_width(),
            height: Self::default_height(),
            human_readable: Self::default_human_readable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrSpec {
    /// Module magnification, 1..=10.
    #[serde(default = "QrSpec::default_size")]
    pub size: u8,
}

impl QrSpec {
    fn default_size() -> u8 {
        4
    }
}

impl Default for QrSpec {
    fn default() -> Self {
        Self {
            size: Self::default_size(),
        }
    }
}

/// One drawable primitive. Closed set: encoders match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LabelElement {
    Text {
        position: Position,
        #[serde(default)]
        rotation: Rotation,
        content: String,
        #[serde(default)]
        font: FontSpec,
    },
    Barcode {
        position: Position,
        #[serde(default)]
        rotation: Rotation,
        content: String,
        #[serde(default)]
        spec: BarcodeSpec,
    },
    #[serde(alias = "qr")]
    QrCode {
        position: Position,
        #[serde(default)]
        rotation: Rotation,
        content: String,
        #[serde(default)]
        spec: QrSpec,
    },
    Line {
        position: Position,
        #[serde(default)]
        rotation: Rotation,
        length: f32,
        thickness: f32,
    },
    Rectangle {
        position: Position,
        #[serde(default)]
        rotation: Rotation,
        width: f32,
        height: f32,
        thickness: f32,
    },
}

impl LabelElement {
    pub fn position(&self) -> Position {
        match self {
            LabelElement::Text { position, .. }
            | LabelElement::Barcode { position, .. }
            | LabelElement::QrCode { position, .. }
            | LabelElement::Line { position, .. }
            | LabelElement::Rectangle { position, .. } => *position,
        }
    }

    pub fn rotation(&self) -> Rotation {
        match self {
            LabelElement::Text { rotation, .. }
            | LabelElement::Barcode { rotation, .. }
            | LabelElement::QrCode { rotation, .. }
            | LabelElement::Line { rotation, .. }
            | LabelElement::Rectangle { rotation, .. } => *rotation,
        }
    }

    pub fn text(position: Position, content: impl Into<String>, font: FontSpec) -> Self {
        LabelElement::Text {
            position,
            rotation: Rotation::R0,
            content: content.into(),
            font,
        }
    }

    pub fn qr(position: Position, content: impl Into<String>, size: u8) -> Self {
        LabelElement::QrCode {
            position,
            rotation: Rotation::R0,
            content: content.into(),
            spec: QrSpec { size },
        }
    }

    /// The printed string of a text element.
    pub fn text_content(&self) -> Option<&str> {
        match self {
            LabelElement::Text { content, .. } => Some(content),
            _ => None,
        }
    }
}
