// Sheet layout for serial printers, expressed as protocol-neutral elements.
//
// Mirrors the raster column in millimetres: 40 mm wide columns, the second
// one offset by a full column width.

use chrono::NaiveDate;

use crate::batch::{PrintableItem, SheetJob};
use crate::label::{FontSpec, LabelElement, Position, QrSpec, Rotation};
use crate::render::{format_price, wrap_words, COLUMN_WIDTH_MM};

const MARGIN_MM: f32 = 3.0;
const QR_TOP_MM: f32 = 2.0;
const CODE_TOP_MM: f32 = 21.0;
const DESCRIPTION_TOP_MM: f32 = 25.0;
const DESCRIPTION_LINE_MM: f32 = 3.0;
const DESCRIPTION_MAX_LINES: usize = 3;
/// Printer font "2" advances roughly 1.25 mm per character at 203 DPI.
const CHAR_WIDTH_MM: f32 = 1.25;
const PRICE_BAND_TOP_MM: f32 = 50.0;
const PRICE_BAND_HEIGHT_MM: f32 = 9.0;

fn body_font() -> FontSpec {
    FontSpec::new("2", 1, 1)
}

fn small_font() -> FontSpec {
    FontSpec::new("1", 1, 1)
}

fn text(x: f32, y: f32, content: impl Into<String>, font: FontSpec) -> LabelElement {
    LabelElement::text(Position::new(x, y), content, font)
}

/// Label elements for a whole sheet, columns left to right.
pub fn sheet_elements(job: &SheetJob, printed_on: NaiveDate) -> Vec<LabelElement> {
    job.items()
        .into_iter()
        .enumerate()
        .flat_map(|(index, item)| column_elements(item, index as f32 * COLUMN_WIDTH_MM, printed_on))
        .collect()
}

pub fn column_elements(item: &PrintableItem, left: f32, printed_on: NaiveDate) -> Vec<LabelElement> {
    let content_width = COLUMN_WIDTH_MM - 2.0 * MARGIN_MM;
    let mut elements = vec![
        LabelElement::Text {
            position: Position::new(left + 0.5, MARGIN_MM),
            rotation: Rotation::R90,
            content: printed_on.format("%m%d%y").to_string(),
            font: small_font(),
        },
        LabelElement::qr(Position::new(left + 13.0, QR_TOP_MM), item.code.clone(), QrSpec::default().size),
        text(left + MARGIN_MM, CODE_TOP_MM, item.code.clone(), body_font()),
    ];

    if item.is_new {
        elements.push(LabelElement::Rectangle {
            position: Position::new(left + COLUMN_WIDTH_MM - 3.0, MARGIN_MM),
            rotation: Rotation::R0,
            width: 2.5,
            height: 12.0,
            thickness: 0.25,
        });
        elements.push(LabelElement::Text {
            position: Position::new(left + COLUMN_WIDTH_MM - 2.5, MARGIN_MM + 1.0),
            rotation: Rotation::R90,
            content: "NOVO".to_string(),
            font: small_font(),
        });
    }

    let measure = |line: &str| (line.chars().count() as f32 * CHAR_WIDTH_MM * 10.0) as u32;
    let lines = wrap_words(&item.description, (content_width * 10.0) as u32, measure);
    let mut y = DESCRIPTION_TOP_MM;
    for line in lines.into_iter().take(DESCRIPTION_MAX_LINES) {
        elements.push(text(left + MARGIN_MM, y, line, body_font()));
        y += DESCRIPTION_LINE_MM;
    }

    let mut extras = Vec::new();
    if let Some(size) = &item.size {
        extras.push(format!("TAM: {}", size));
    }
    if let Some(event) = &item.event {
        extras.push(event.clone());
    }
    if let Some(credit) = &item.credit_value {
        extras.push(format!("CREDITO {}", format_price(Some(credit))));
    }
    let mut y = PRICE_BAND_TOP_MM - 1.0 - extras.len() as f32 * DESCRIPTION_LINE_MM;
    for extra in extras {
        elements.push(text(left + MARGIN_MM, y, extra, body_font()));
        y += DESCRIPTION_LINE_MM;
    }

    elements.push(LabelElement::Rectangle {
        position: Position::new(left + 1.0, PRICE_BAND_TOP_MM),
        rotation: Rotation::R0,
        width: COLUMN_WIDTH_MM - 2.0,
        height: PRICE_BAND_HEIGHT_MM,
        thickness: 0.5,
    });
    elements.push(text(
        left + MARGIN_MM,
        PRICE_BAND_TOP_MM + 2.0,
        format_price(item.price.as_deref()),
        FontSpec::new("4", 1, 1),
    ));
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(code: &str) -> PrintableItem {
        PrintableItem {
            description: "Saia jeans midi com botões frontais e bolsos".to_string(),
            code: code.to_string(),
            price: Some("49,9".to_string()),
            size: Some("38".to_string()),
            ..PrintableItem::default()
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
    }

    fn texts(elements: &[LabelElement]) -> Vec<&str> {
        elements.iter().filter_map(|e| e.text_content()).collect()
    }

    #[test]
    fn test_column_contains_printable_fields() {
        let elements = column_elements(&item("SJ-38"), 0.0, date());
        let texts = texts(&elements);
        assert!(texts.contains(&"031524"));
        assert!(texts.contains(&"SJ-38"));
        assert!(texts.contains(&"TAM: 38"));
        assert!(texts.contains(&"R$ 49,90"));
        assert!(elements.iter().any(|e| matches!(e, LabelElement::QrCode { content, .. } if content == "SJ-38")));
    }

    #[test]
    fn test_description_is_wrapped_and_capped() {
        let elements = column_elements(&item("SJ-38"), 0.0, date());
        let description_lines = elements
            .iter()
            .filter(|e| {
                let p = e.position();
                p.y >= DESCRIPTION_TOP_MM && p.y < DESCRIPTION_TOP_MM + 3.0 * DESCRIPTION_LINE_MM
            })
            .count();
        assert!(description_lines >= 2 && description_lines <= DESCRIPTION_MAX_LINES);
    }

    #[test]
    fn test_pair_offsets_second_column() {
        let job = SheetJob::Pair {
            left: item("L1"),
            right: item("R1"),
        };
        let elements = sheet_elements(&job, date());
        let right_code = elements
            .iter()
            .find(|e| e.text_content() == Some("R1"))
            .expect("right code");
        assert_eq!(right_code.position().x, COLUMN_WIDTH_MM + MARGIN_MM);
        assert_eq!(elements.len(), 2 * column_elements(&item("X"), 0.0, date()).len());
    }

    #[test]
    fn test_new_item_marker() {
        let mut new_item = item("N1");
        new_item.is_new = true;
        let elements = column_elements(&new_item, 0.0, date());
        assert!(texts(&elements).contains(&"NOVO"));
    }
}
