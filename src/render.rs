// Raster label rendering for spooler printers

use chrono::NaiveDate;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use qrcode::{Color, QrCode};
use rusttype::{point, Font, Scale};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::batch::{PrintableItem, SheetJob};
use crate::errors::PrintError;

pub const RENDER_DPI: u32 = 203;

// One 40x60 mm column at 203 DPI
pub const COLUMN_WIDTH: u32 = 320;
pub const COLUMN_HEIGHT: u32 = 480;
pub const COLUMN_WIDTH_MM: f32 = 40.0;
pub const COLUMN_HEIGHT_MM: f32 = 60.0;

const SIDE_MARGIN: u32 = 22;
const CONTENT_WIDTH: u32 = COLUMN_WIDTH - 2 * SIDE_MARGIN;

const HEADER_TOP: u32 = 10;
const HEADER_MARK_WIDTH: u32 = 60;
const HEADER_MARK_HEIGHT: u32 = 4;
const QR_BOX: u32 = 150;

const DESCRIPTION_PX: f32 = 18.0;
const DESCRIPTION_LINE: u32 = 21;
const SIZE_PX: f32 = 16.0;
const SIZE_LINE: u32 = 20;
const EVENT_BOX_HEIGHT: u32 = 30;
const CREDIT_BOX_HEIGHT: u32 = 28;
const BOX_GAP: u32 = 4;

const PRICE_BAND_HEIGHT: u32 = 72;
const PRICE_BAND_TOP: u32 = COLUMN_HEIGHT - PRICE_BAND_HEIGHT;
const PRICE_PX: f32 = 44.0;

const NEW_BAND_WIDTH: u32 = 20;
const STAMP_PX: f32 = 12.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const EVENT_FILL: Rgb<u8> = Rgb([215, 215, 215]);
const CREDIT_FILL: Rgb<u8> = Rgb([240, 240, 240]);

/// Brazilian-real price text. Empty input prints as zero; numbers accept
/// either decimal separator; anything else is printed as given.
pub fn format_price(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return "R$ 0,00".to_string(),
    };
    match raw.replace(',', ".").parse::<f64>() {
        Ok(value) if value.is_finite() => format!("R$ {:.2}", value).replace('.', ","),
        _ => format!("R$ {}", raw),
    }
}

/// Code line size in pixels, stepping down as the code gets longer.
pub fn code_font_px(code: &str) -> f32 {
    match code.chars().count() {
        0..=10 => 16.0,
        11..=15 => 14.0,
        16..=20 => 13.0,
        _ => 12.0,
    }
}

/// Breaks a code that does not fit onto two lines at its character midpoint.
/// Codes of 15 characters or fewer are never split.
pub fn split_code(code: &str, measured_width: u32, max_width: u32) -> Vec<String> {
    let chars: Vec<char> = code.chars().collect();
    if measured_width <= max_width || chars.len() <= 15 {
        return vec![code.to_string()];
    }
    let mid = (chars.len() + 1) / 2;
    vec![
        chars[..mid].iter().collect(),
        chars[mid..].iter().collect(),
    ]
}

/// Greedy word wrap. A single word wider than `max_width` gets its own line.
pub fn wrap_words(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        let candidate = if current_line.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current_line, word)
        };

        if measure(&candidate) > max_width && !current_line.is_empty() {
            lines.push(std::mem::replace(&mut current_line, word.to_string()));
        } else {
            current_line = candidate;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }
    lines
}

/// Largest size between `start_px` and `min_px` (1 px steps) at which `text`
/// fits; `min_px` when nothing does.
pub fn shrink_to_fit(
    text: &str,
    start_px: f32,
    min_px: f32,
    max_width: u32,
    measure: impl Fn(&str, f32) -> u32,
) -> f32 {
    let mut px = start_px;
    while px > min_px && measure(text, px) > max_width {
        px -= 1.0;
    }
    px.max(min_px)
}

/// Physical size of a sheet with `columns` label columns.
pub fn sheet_size_mm(columns: u32) -> (f32, f32) {
    (COLUMN_WIDTH_MM * columns as f32, COLUMN_HEIGHT_MM)
}

pub struct LabelRenderer {
    font: Font<'static>,
}

impl LabelRenderer {
    pub fn from_file(path: &Path) -> Result<Self, PrintError> {
        let data = std::fs::read(path).map_err(|e| {
            PrintError::RenderError(format!("cannot read font {}: {}", path.display(), e))
        })?;
        let renderer = Self::from_bytes(data)?;
        info!("Loaded label font from {}", path.display());
        Ok(renderer)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, PrintError> {
        let font = Font::try_from_vec(data)
            .ok_or_else(|| PrintError::RenderError("invalid TrueType font".to_string()))?;
        Ok(Self { font })
    }

    pub fn text_width(&self, text: &str, px: f32) -> u32 {
        let scale = Scale::uniform(px);
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .last()
            .map_or(0, |g| {
                (g.position().x + g.unpositioned().h_metrics().advance_width).ceil() as u32
            })
    }

    /// Renders one sheet: columns side by side, then the whole canvas turned
    /// 180 degrees to match how the stock feeds.
    pub fn render_sheet(&self, job: &SheetJob, printed_on: Option<NaiveDate>) -> RgbImage {
        let items = job.items();
        let mut sheet = RgbImage::from_pixel(COLUMN_WIDTH * items.len() as u32, COLUMN_HEIGHT, WHITE);
        for (index, item) in items.iter().enumerate() {
            let column = self.render_column(item, printed_on);
            imageops::overlay(&mut sheet, &column, (index as u32 * COLUMN_WIDTH) as i64, 0);
        }
        debug!("Rendered {}x{} sheet", sheet.width(), sheet.height());
        imageops::rotate180(&sheet)
    }

    pub fn render_column(&self, item: &PrintableItem, printed_on: Option<NaiveDate>) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(COLUMN_WIDTH, COLUMN_HEIGHT, WHITE);

        if let Some(date) = printed_on {
            self.draw_date_stamp(&mut canvas, date);
        }
        if item.is_new {
            self.draw_new_band(&mut canvas);
        }

        let mut y = HEADER_TOP;
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(((COLUMN_WIDTH - HEADER_MARK_WIDTH) / 2) as i32, y as i32)
                .of_size(HEADER_MARK_WIDTH, HEADER_MARK_HEIGHT),
            BLACK,
        );
        y += HEADER_MARK_HEIGHT + 6;

        draw_qr(&mut canvas, &item.code, (COLUMN_WIDTH - QR_BOX) / 2, y, QR_BOX);
        y += QR_BOX + 6;

        y = self.draw_code(&mut canvas, &item.code, y);

        // Optional blocks are stacked directly above the price band
        let mut reserved = 0;
        if item.size.is_some() {
            reserved += SIZE_LINE;
        }
        if item.event.is_some() {
            reserved += EVENT_BOX_HEIGHT + BOX_GAP;
        }
        if item.credit_value.is_some() {
            reserved += CREDIT_BOX_HEIGHT + BOX_GAP;
        }
        let description_limit = PRICE_BAND_TOP - BOX_GAP - reserved;
        self.draw_description(&mut canvas, &item.description, y + 4, description_limit);

        let mut y = description_limit;
        if let Some(size) = &item.size {
            self.draw_centered(&mut canvas, &format!("TAM: {}", size), SIZE_PX, y + 2, BLACK);
            y += SIZE_LINE;
        }
        if let Some(event) = &item.event {
            self.draw_callout(&mut canvas, event, y, EVENT_BOX_HEIGHT, EVENT_FILL, 16.0);
            y += EVENT_BOX_HEIGHT + BOX_GAP;
        }
        if let Some(credit) = &item.credit_value {
            let text = format!("CRÉDITO {}", format_price(Some(credit)));
            self.draw_callout(&mut canvas, &text, y, CREDIT_BOX_HEIGHT, CREDIT_FILL, 15.0);
        }

        self.draw_price_band(&mut canvas, &format_price(item.price.as_deref()));
        canvas
    }

    fn draw_centered(&self, canvas: &mut RgbImage, text: &str, px: f32, y: u32, color: Rgb<u8>) {
        let width = self.text_width(text, px);
        let x = (COLUMN_WIDTH as i32 - width as i32) / 2;
        draw_text_mut(canvas, color, x.max(0), y as i32, Scale::uniform(px), &self.font, text);
    }

    fn draw_code(&self, canvas: &mut RgbImage, code: &str, y: u32) -> u32 {
        let px = code_font_px(code);
        let lines = split_code(code, self.text_width(code, px), CONTENT_WIDTH);
        let line_height = px as u32 + 3;
        let mut y = y;
        for line in &lines {
            self.draw_centered(canvas, line, px, y, BLACK);
            y += line_height;
        }
        y
    }

    fn draw_description(&self, canvas: &mut RgbImage, text: &str, top: u32, limit: u32) {
        let lines = wrap_words(text, CONTENT_WIDTH, |t| self.text_width(t, DESCRIPTION_PX));
        let mut y = top;
        for line in &lines {
            if y + DESCRIPTION_LINE > limit {
                warn!("Description truncated: '{}'", text);
                break;
            }
            self.draw_centered(canvas, line, DESCRIPTION_PX, y, BLACK);
            y += DESCRIPTION_LINE;
        }
    }

    fn draw_callout(
        &self,
        canvas: &mut RgbImage,
        text: &str,
        y: u32,
        height: u32,
        fill: Rgb<u8>,
        start_px: f32,
    ) {
        let frame = Rect::at(SIDE_MARGIN as i32, y as i32).of_size(CONTENT_WIDTH, height);
        draw_filled_rect_mut(canvas, frame, fill);
        draw_hollow_rect_mut(canvas, frame, BLACK);
        draw_hollow_rect_mut(
            canvas,
            Rect::at(SIDE_MARGIN as i32 + 1, y as i32 + 1).of_size(CONTENT_WIDTH - 2, height - 2),
            BLACK,
        );

        let px = shrink_to_fit(text, start_px, 8.0, CONTENT_WIDTH - 8, |t, px| {
            self.text_width(t, px)
        });
        let text_y = y + height.saturating_sub(px as u32) / 2;
        self.draw_centered(canvas, text, px, text_y, BLACK);
    }

    fn draw_price_band(&self, canvas: &mut RgbImage, price: &str) {
        draw_filled_rect_mut(
            canvas,
            Rect::at(0, PRICE_BAND_TOP as i32).of_size(COLUMN_WIDTH, PRICE_BAND_HEIGHT),
            BLACK,
        );
        let px = shrink_to_fit(price, PRICE_PX, 20.0, CONTENT_WIDTH, |t, px| {
            self.text_width(t, px)
        });
        let y = PRICE_BAND_TOP + PRICE_BAND_HEIGHT.saturating_sub(px as u32) / 2;
        self.draw_centered(canvas, price, px, y, WHITE);
    }

    /// Draws `text` horizontally on a scratch image and returns it turned a
    /// quarter clockwise.
    fn vertical_text(&self, text: &str, px: f32, fg: Rgb<u8>, bg: Rgb<u8>) -> RgbImage {
        let width = self.text_width(text, px).max(1) + 2;
        let height = px.ceil() as u32 + 2;
        let mut strip = RgbImage::from_pixel(width, height, bg);
        draw_text_mut(&mut strip, fg, 1, 1, Scale::uniform(px), &self.font, text);
        imageops::rotate90(&strip)
    }

    fn draw_date_stamp(&self, canvas: &mut RgbImage, date: NaiveDate) {
        let stamp = self.vertical_text(&date.format("%m%d%y").to_string(), STAMP_PX, BLACK, WHITE);
        imageops::overlay(canvas, &stamp, 3, (HEADER_TOP + 4) as i64);
    }

    fn draw_new_band(&self, canvas: &mut RgbImage) {
        let x = COLUMN_WIDTH - NEW_BAND_WIDTH;
        draw_filled_rect_mut(
            canvas,
            Rect::at(x as i32, 0).of_size(NEW_BAND_WIDTH, PRICE_BAND_TOP),
            BLACK,
        );
        let label = self.vertical_text("NOVO", 14.0, WHITE, BLACK);
        let label_x = x + NEW_BAND_WIDTH.saturating_sub(label.width()) / 2;
        let label_y = PRICE_BAND_TOP.saturating_sub(label.height()) / 2;
        imageops::overlay(canvas, &label, label_x as i64, label_y as i64);
    }
}

/// Draws the QR symbol for `payload` centred in a `size` pixel square.
fn draw_qr(canvas: &mut RgbImage, payload: &str, left: u32, top: u32, size: u32) {
    let code = match QrCode::new(payload.as_bytes()) {
        Ok(code) => code,
        Err(e) => {
            warn!("Skipping QR code for '{}': {}", payload, e);
            return;
        }
    };
    let modules = code.width() as u32;
    let module_px = (size / modules).max(1);
    let offset = size.saturating_sub(module_px * modules) / 2;

    for (index, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let col = index as u32 % modules;
        let row = index as u32 / modules;
        draw_filled_rect_mut(
            canvas,
            Rect::at(
                (left + offset + col * module_px) as i32,
                (top + offset + row * module_px) as i32,
            )
            .of_size(module_px, module_px),
            BLACK,
        );
    }
}

/// Writes the sheet as PNG, the format handed to the spooler.
pub fn save_png(image: &RgbImage, path: &Path) -> Result<(), PrintError> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| PrintError::RenderError(format!("failed to write {}: {}", path.display(), e)))
}
