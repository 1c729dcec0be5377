use image::{Rgba, RgbaImage};

use super::layout::PixelRect;

/// Translucent near-black used when a region cannot be sampled (alpha ≈ 86%).
pub const FALLBACK_FILL: Rgba<u8> = Rgba([0, 0, 0, 220]);

/// Chameleon colour for `rect`: per-channel median of the crop's four
/// one-pixel perimeter edges, fully opaque. Corners are counted once per
/// edge they sit on. `None` when the crop is empty after clamping.
pub fn perimeter_median(image: &RgbaImage, rect: &PixelRect) -> Option<Rgba<u8>> {
    let crop = PixelRect {
        left: rect.left.min(image.width()),
        top: rect.top.min(image.height()),
        right: rect.right.min(image.width()),
        bottom: rect.bottom.min(image.height()),
    };
    if crop.is_empty() {
        return None;
    }

    let last_x = crop.right - 1;
    let last_y = crop.bottom - 1;
    let mut samples: Vec<[u8; 3]> =
        Vec::with_capacity(2 * (crop.width() + crop.height()) as usize);
    for x in crop.left..crop.right {
        samples.push(rgb_at(image, x, crop.top));
        samples.push(rgb_at(image, x, last_y));
    }
    for y in crop.top..crop.bottom {
        samples.push(rgb_at(image, crop.left, y));
        samples.push(rgb_at(image, last_x, y));
    }

    let mut channels = [0u8; 3];
    for (channel, slot) in channels.iter_mut().enumerate() {
        let mut values = samples.iter().map(|rgb| rgb[channel]).collect::<Vec<_>>();
        *slot = median(&mut values)?;
    }
    let [r, g, b] = channels;
    Some(Rgba([r, g, b, 255]))
}

pub fn patch_color(image: &RgbaImage, rect: &PixelRect) -> Rgba<u8> {
    perimeter_median(image, rect).unwrap_or(FALLBACK_FILL)
}

/// Middle value; for an even count the two middle values are averaged and
/// truncated.
fn median(values: &mut [u8]) -> Option<u8> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(((values[mid - 1] as u16 + values[mid] as u16) / 2) as u8)
    }
}

fn rgb_at(image: &RgbaImage, x: u32, y: u32) -> [u8; 3] {
    let [r, g, b, _] = image.get_pixel(x, y).0;
    [r, g, b]
}
