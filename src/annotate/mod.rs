//! Image remix: paints a background patch sampled from each region's
//! perimeter over the detected text and draws the translation on top.

mod canvas;
mod font;
mod layout;
mod render;
mod sample;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use canvas::{Canvas, MAX_CANVAS_SIDE};
pub use font::OverlayFont;
pub use layout::{
    MIN_FONT_SIZE, PATCH_PADDING, PixelRect, TextColor, brightness, contrast_text_color,
    font_size_for, map_box,
};
pub use sample::{FALLBACK_FILL, patch_color, perimeter_median};

pub const TEXT_SEPARATOR: &str = " | ";

pub fn invalid_image_message(err: &anyhow::Error) -> String {
    format!("Invalid Image: {:#}", err)
}

/// One detected region with its replacement text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationItem {
    #[serde(alias = "sourceText", alias = "original_text", default)]
    pub original_text: String,
    #[serde(alias = "translated_text", default)]
    pub translated_text: String,
    /// `[yMin, xMin, yMax, xMax]` on the 0–1000 grid.
    #[serde(alias = "bounding_box", alias = "box_2d")]
    pub bounding_box: [f32; 4],
}

/// Canvas after an annotation pass, before encoding.
#[derive(Debug, Clone)]
pub struct AnnotatedCanvas {
    pub canvas: Canvas,
    pub item_count: usize,
    pub original_text: String,
    pub translated_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemixedImage {
    pub item_count: usize,
    pub original_text: String,
    pub translated_text: String,
    pub remixed_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RemixOutcome {
    Remixed(RemixedImage),
    Failed { error: String },
}

impl RemixOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        RemixOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn invalid_image(err: &anyhow::Error) -> Self {
        Self::failed(invalid_image_message(err))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RemixOutcome::Remixed(_))
    }
}

#[derive(Debug, Clone)]
pub struct ImageAnnotator {
    font: OverlayFont,
}

enum ItemResult {
    Drawn,
    Skipped,
}

impl ImageAnnotator {
    pub fn new(font: OverlayFont) -> Self {
        Self { font }
    }

    pub fn font(&self) -> &OverlayFont {
        &self.font
    }

    /// Decode, annotate and encode in one pass. Never fails: errors come
    /// back as `RemixOutcome::Failed`.
    pub fn annotate(&self, image_bytes: &[u8], items: &[AnnotationItem]) -> RemixOutcome {
        let canvas = match Canvas::decode(image_bytes) {
            Ok(canvas) => canvas,
            Err(err) => return RemixOutcome::invalid_image(&err),
        };
        self.remix(&canvas, items)
    }

    pub fn remix(&self, canvas: &Canvas, items: &[AnnotationItem]) -> RemixOutcome {
        match self.annotate_canvas(canvas, items).and_then(encode_outcome) {
            Ok(remixed) => RemixOutcome::Remixed(remixed),
            Err(err) => {
                warn!("remix failed: {:#}", err);
                RemixOutcome::failed(format!("Remix failed: {:#}", err))
            }
        }
    }

    /// Draws `items` in order onto a copy of `canvas`. Items with malformed
    /// boxes, or whose drawing fails, are skipped.
    pub fn annotate_canvas(
        &self,
        canvas: &Canvas,
        items: &[AnnotationItem],
    ) -> Result<AnnotatedCanvas> {
        let source = canvas.image();
        let mut image = source.clone();
        let mut originals = Vec::new();
        let mut translations = Vec::new();

        for (index, item) in items.iter().enumerate() {
            match self.draw_item(&mut image, source, item) {
                Ok(ItemResult::Drawn) => {
                    originals.push(item.original_text.trim());
                    translations.push(item.translated_text.trim());
                }
                Ok(ItemResult::Skipped) => {
                    debug!("skipping item {} with malformed box {:?}", index, item.bounding_box);
                }
                Err(err) => {
                    warn!("skipping item {}: {:#}", index, err);
                }
            }
        }

        Ok(AnnotatedCanvas {
            canvas: Canvas::from_rgba(image),
            item_count: originals.len(),
            original_text: originals.join(TEXT_SEPARATOR),
            translated_text: translations.join(TEXT_SEPARATOR),
        })
    }

    /// Text is laid out before the patch is painted, so an item that fails
    /// leaves `target` untouched.
    fn draw_item(
        &self,
        target: &mut RgbaImage,
        source: &RgbaImage,
        item: &AnnotationItem,
    ) -> Result<ItemResult> {
        let (width, height) = source.dimensions();
        let Some(region) = map_box(item.bounding_box, width, height) else {
            return Ok(ItemResult::Skipped);
        };

        let fill = patch_color(source, &region);
        let [r, g, b, _] = fill.0;
        let layer = render::render_text_layer(
            width,
            height,
            &self.font,
            &item.translated_text,
            &region,
            font_size_for(&region),
            contrast_text_color([r, g, b]),
        )?;

        render::fill_patch(target, &region.padded(PATCH_PADDING, width, height), fill);
        if let Some(layer) = layer {
            render::composite_layer(target, &layer)
                .with_context(|| "failed to composite overlay text")?;
        }
        Ok(ItemResult::Drawn)
    }
}

fn encode_outcome(annotated: AnnotatedCanvas) -> Result<RemixedImage> {
    let png = annotated.canvas.to_png()?;
    Ok(RemixedImage {
        item_count: annotated.item_count,
        original_text: annotated.original_text,
        translated_text: annotated.translated_text,
        remixed_image: format!("data:image/png;base64,{}", BASE64.encode(png)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use insta::assert_json_snapshot;

    const BACKGROUND: Rgba<u8> = Rgba([240, 200, 60, 255]);
    const STROKE: Rgba<u8> = Rgba([20, 20, 20, 255]);

    fn signboard() -> Canvas {
        let mut image = RgbaImage::from_pixel(1000, 1000, BACKGROUND);
        for y in 140..260 {
            for x in 120..280 {
                image.put_pixel(x, y, STROKE);
            }
        }
        Canvas::from_rgba(image)
    }

    fn item(bbox: [f32; 4], original: &str, translated: &str) -> AnnotationItem {
        AnnotationItem {
            original_text: original.to_string(),
            translated_text: translated.to_string(),
            bounding_box: bbox,
        }
    }

    fn annotator() -> ImageAnnotator {
        ImageAnnotator::new(OverlayFont::resolve(None, None))
    }

    #[test]
    fn paints_padded_chameleon_patch() {
        let canvas = signboard();
        let items = [item([100.0, 100.0, 300.0, 300.0], "Kopi O", "HELLO")];
        let out = annotator().annotate_canvas(&canvas, &items).expect("annotate");
        let image = out.canvas.image();
        assert_eq!(out.item_count, 1);
        // corners of the padded patch sit outside the text's ink
        assert_eq!(image.get_pixel(96, 96), &BACKGROUND);
        assert_eq!(image.get_pixel(303, 303), &BACKGROUND);
        assert_eq!(image.get_pixel(98, 300), &BACKGROUND);
        // untouched beyond the padding
        assert_eq!(image.get_pixel(95, 95), &BACKGROUND);
    }

    #[test]
    fn patch_takes_the_perimeter_median_not_the_surroundings() {
        const SIGN: Rgba<u8> = Rgba([30, 90, 160, 255]);
        let mut image = RgbaImage::from_pixel(1000, 1000, BACKGROUND);
        for y in 100..300 {
            for x in 100..300 {
                let color = if (120..280).contains(&x) && (140..260).contains(&y) {
                    STROKE
                } else {
                    SIGN
                };
                image.put_pixel(x, y, color);
            }
        }
        let canvas = Canvas::from_rgba(image);
        let items = [item([100.0, 100.0, 300.0, 300.0], "Kopi O", "")];
        let out = annotator().annotate_canvas(&canvas, &items).expect("annotate");
        let image = out.canvas.image();
        assert_eq!(out.item_count, 1);
        assert_eq!(image.get_pixel(96, 96), &SIGN);
        assert_eq!(image.get_pixel(303, 303), &SIGN);
        assert_eq!(image.get_pixel(200, 200), &SIGN);
        assert_eq!(image.get_pixel(95, 95), &BACKGROUND);
        assert_eq!(image.get_pixel(304, 304), &BACKGROUND);
        assert_eq!(image.get_pixel(96, 304), &BACKGROUND);
    }

    #[test]
    fn translucent_pixels_outside_regions_are_unchanged() {
        let canvas = Canvas::from_rgba(RgbaImage::from_pixel(50, 50, Rgba([200, 100, 50, 3])));
        let items = [item([0.0, 0.0, 200.0, 200.0], "Kopi", "K")];
        let out = annotator().annotate_canvas(&canvas, &items).expect("annotate");
        assert_eq!(out.item_count, 1);
        assert_eq!(out.canvas.image().get_pixel(40, 40), &Rgba([200, 100, 50, 3]));
        assert_eq!(out.canvas.image().get_pixel(20, 20), &Rgba([200, 100, 50, 3]));
    }

    #[test]
    fn no_items_leaves_canvas_identical() {
        let mut image = RgbaImage::from_pixel(30, 20, Rgba([200, 100, 50, 3]));
        image.put_pixel(5, 5, Rgba([1, 2, 3, 128]));
        let canvas = Canvas::from_rgba(image);
        let out = annotator().annotate_canvas(&canvas, &[]).expect("annotate");
        assert_eq!(out.canvas, canvas);
    }

    #[test]
    fn item_whose_text_fails_leaves_no_patch() {
        const RED: Rgba<u8> = Rgba([220, 0, 0, 255]);
        let mut image = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        for y in 10..40 {
            for x in 10..40 {
                if x == 10 || x == 39 || y == 10 || y == 39 {
                    image.put_pixel(x, y, RED);
                }
            }
        }
        let canvas = Canvas::from_rgba(image);
        let items = [item([100.0, 100.0, 400.0, 400.0], "bad", "bad\u{1}text")];
        let out = annotator().annotate_canvas(&canvas, &items).expect("annotate");
        assert_eq!(out.item_count, 0);
        assert_eq!(out.canvas.image().get_pixel(20, 20), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.canvas, canvas);
    }

    #[test]
    fn patch_hides_original_strokes_near_edges() {
        let canvas = signboard();
        let items = [item([100.0, 100.0, 300.0, 300.0], "Kopi O", "")];
        let out = annotator().annotate_canvas(&canvas, &items).expect("annotate");
        for (x, y) in [(121, 141), (279, 259), (200, 200)] {
            assert_eq!(out.canvas.image().get_pixel(x, y), &BACKGROUND);
        }
    }

    #[test]
    fn malformed_boxes_are_skipped_without_artifacts() {
        let canvas = signboard();
        let items = [
            item([100.0, 300.0, 300.0, 100.0], "bad", "BAD"),
            item([500.0, 0.0, 400.0, 100.0], "bad", "BAD"),
        ];
        let out = annotator().annotate_canvas(&canvas, &items).expect("annotate");
        assert_eq!(out.item_count, 0);
        assert_eq!(out.original_text, "");
        assert_eq!(out.canvas, canvas);
    }

    #[test]
    fn joins_texts_of_drawn_items_in_order() {
        let canvas = Canvas::from_rgba(RgbaImage::from_pixel(200, 100, BACKGROUND));
        let items = [
            item([0.0, 0.0, 400.0, 400.0], "Kopi O", "Black coffee"),
            item([0.0, 0.0, 0.0, 0.0], "skip", "skip"),
            item([500.0, 500.0, 900.0, 900.0], " Cham ", "Coffee + tea"),
        ];
        let out = annotator().annotate_canvas(&canvas, &items).expect("annotate");
        assert_eq!(out.item_count, 2);
        assert_eq!(out.original_text, "Kopi O | Cham");
        assert_eq!(out.translated_text, "Black coffee | Coffee + tea");
    }

    #[test]
    fn annotation_is_deterministic() {
        let canvas = signboard();
        let items = [
            item([100.0, 100.0, 300.0, 300.0], "Kopi O", "HELLO"),
            item([600.0, 50.0, 700.0, 950.0], "Teh C", "Milk tea"),
        ];
        let annotator = annotator();
        let first = annotator.remix(&canvas, &items);
        let second = annotator.remix(&canvas, &items);
        assert!(first.is_success());
        assert_eq!(first, second);
    }

    #[test]
    fn remix_returns_png_data_uri() {
        let canvas = signboard();
        let items = [item([100.0, 100.0, 300.0, 300.0], "Kopi O", "HELLO")];
        let RemixOutcome::Remixed(remixed) = annotator().remix(&canvas, &items) else {
            panic!("expected remixed image");
        };
        let encoded = remixed
            .remixed_image
            .strip_prefix("data:image/png;base64,")
            .expect("data uri");
        let png = BASE64.decode(encoded).expect("base64");
        let decoded = Canvas::decode(&png).expect("png");
        assert_eq!((decoded.width(), decoded.height()), (1000, 1000));
    }

    #[test]
    fn invalid_bytes_report_invalid_image() {
        let outcome = annotator().annotate(b"GIF89a-but-not-really", &[]);
        let RemixOutcome::Failed { error } = outcome else {
            panic!("expected failure");
        };
        assert!(error.starts_with("Invalid Image: "), "{}", error);
    }

    #[test]
    fn failure_serializes_as_error_object() {
        assert_json_snapshot!(RemixOutcome::failed("Invalid Image: unsupported"), @r###"
        {
          "error": "Invalid Image: unsupported"
        }
        "###);
    }

    #[test]
    fn items_accept_source_text_alias() {
        let parsed: AnnotationItem = serde_json::from_str(
            r#"{"sourceText": "Kopi O", "translatedText": "Black coffee", "boundingBox": [1, 2, 3, 4]}"#,
        )
        .expect("item");
        assert_eq!(parsed.original_text, "Kopi O");
        assert_eq!(parsed.bounding_box, [1.0, 2.0, 3.0, 4.0]);
    }
}
