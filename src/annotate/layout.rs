/// Side length of the normalized coordinate grid boxes are expressed on.
pub const GRID: f32 = 1000.0;
/// Extra pixels the background patch covers beyond the mapped box.
pub const PATCH_PADDING: u32 = 4;
pub const MIN_FONT_SIZE: u32 = 14;

/// Pixel rectangle with exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) as f32 / 2.0,
            (self.top + self.bottom) as f32 / 2.0,
        )
    }

    /// Grows the rect by `padding` on every side, clamped to the canvas.
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> PixelRect {
        PixelRect {
            left: self.left.saturating_sub(padding),
            top: self.top.saturating_sub(padding),
            right: self.right.saturating_add(padding).min(width),
            bottom: self.bottom.saturating_add(padding).min(height),
        }
    }
}

/// Maps a `[yMin, xMin, yMax, xMax]` box on the 0–1000 grid onto a canvas.
/// Returns `None` for boxes that collapse or invert once scaled.
pub fn map_box(bbox: [f32; 4], width: u32, height: u32) -> Option<PixelRect> {
    if bbox.iter().any(|value| !value.is_finite()) {
        return None;
    }
    let [y_min, x_min, y_max, x_max] = bbox;
    let scale = |value: f32, extent: u32| -> u32 {
        let pixels = value * extent as f32 / GRID;
        pixels.clamp(0.0, extent as f32) as u32
    };
    let rect = PixelRect {
        left: scale(x_min, width),
        top: scale(y_min, height),
        right: scale(x_max, width),
        bottom: scale(y_max, height),
    };
    if rect.left >= rect.right || rect.top >= rect.bottom {
        return None;
    }
    Some(rect)
}

pub fn font_size_for(region: &PixelRect) -> u32 {
    let scaled = (region.height() as f32 * 0.75) as u32;
    scaled.max(MIN_FONT_SIZE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColor {
    White,
    Black,
}

impl TextColor {
    pub fn hex(&self) -> &'static str {
        match self {
            TextColor::White => "#ffffff",
            TextColor::Black => "#000000",
        }
    }
}

pub fn brightness(rgb: [u8; 3]) -> f32 {
    let [r, g, b] = rgb;
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// White on dark backgrounds (luma < 128), black otherwise.
pub fn contrast_text_color(rgb: [u8; 3]) -> TextColor {
    // integer luma keeps the 128 boundary exact
    let [r, g, b] = rgb.map(u32::from);
    let luma_milli = 299 * r + 587 * g + 114 * b;
    if luma_milli < 128_000 {
        TextColor::White
    } else {
        TextColor::Black
    }
}
