use anyhow::{Context, Result, anyhow};
use image::{Rgba, RgbaImage};
use tiny_skia::{Pixmap, Transform};
use usvg::{Options, Tree};

use super::font::OverlayFont;
use super::layout::{PixelRect, TextColor};

/// Fills `rect` with `color` pixel by pixel. Opaque colours replace the
/// pixel, translucent ones blend source-over. Pixels outside `rect` are
/// never touched.
pub(crate) fn fill_patch(image: &mut RgbaImage, rect: &PixelRect, color: Rgba<u8>) {
    let right = rect.right.min(image.width());
    let bottom = rect.bottom.min(image.height());
    for y in rect.top..bottom {
        for x in rect.left..right {
            let pixel = image.get_pixel_mut(x, y);
            *pixel = if color[3] == 255 {
                color
            } else {
                blend_over(*pixel, color)
            };
        }
    }
}

/// Lays out `text` centred on `rect` and rasterizes it onto a transparent
/// layer the size of the canvas. `None` for blank text.
pub(crate) fn render_text_layer(
    width: u32,
    height: u32,
    font: &OverlayFont,
    text: &str,
    rect: &PixelRect,
    font_size: u32,
    color: TextColor,
) -> Result<Option<Pixmap>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let svg = text_svg(width, height, font, text, rect, font_size, color);
    let options = Options {
        fontdb: font.database(),
        ..Options::default()
    };
    let tree = Tree::from_str(&svg, &options).with_context(|| "failed to lay out overlay text")?;
    let mut layer =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("empty canvas {}x{}", width, height))?;
    resvg::render(&tree, Transform::identity(), &mut layer.as_mut());
    Ok(Some(layer))
}

/// Blends the covered pixels of `layer` onto `image`.
pub(crate) fn composite_layer(image: &mut RgbaImage, layer: &Pixmap) -> Result<()> {
    if (layer.width(), layer.height()) != image.dimensions() {
        return Err(anyhow!(
            "text layer is {}x{} but canvas is {}x{}",
            layer.width(),
            layer.height(),
            image.width(),
            image.height()
        ));
    }
    for (pixel, src) in image.pixels_mut().zip(layer.pixels()) {
        if src.alpha() == 0 {
            continue;
        }
        let color = src.demultiply();
        *pixel = blend_over(
            *pixel,
            Rgba([color.red(), color.green(), color.blue(), color.alpha()]),
        );
    }
    Ok(())
}

/// Source-over in straight alpha.
fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let src_alpha = src[3] as f32 / 255.0;
    let dst_alpha = dst[3] as f32 / 255.0 * (1.0 - src_alpha);
    let out_alpha = src_alpha + dst_alpha;
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |s: u8, d: u8| {
        ((s as f32 * src_alpha + d as f32 * dst_alpha) / out_alpha)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

fn text_svg(
    width: u32,
    height: u32,
    font: &OverlayFont,
    text: &str,
    rect: &PixelRect,
    font_size: u32,
    color: TextColor,
) -> String {
    let (cx, cy) = rect.center();
    let family = font
        .family()
        .map(|family| format!(r#" font-family="{}""#, escape_xml(family)))
        .unwrap_or_default();
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text x="{x}" y="{y}" font-size="{size}" font-weight="bold"{family} fill="{fill}" text-anchor="middle" dominant-baseline="central">{text}</text></svg>"#,
        w = width,
        h = height,
        x = cx,
        y = cy,
        size = font_size,
        family = family,
        fill = color.hex(),
        text = escape_xml(text.trim()),
    )
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
