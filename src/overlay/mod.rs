//! Output image rendering
//!
//! Builds the image published to the image sink from the boxes of one pass:
//! a binary detection mask, or a text overlay drawn by an [`OverlayRenderer`].
//! The output always matches the sampled frame's dimensions.

use crate::config::OutputImageMode;
use crate::vision::{BoxRect, OcrBox};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const MASK_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MASK_FOREGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const OUTLINE_COLOUR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BACKGROUND_FILL: Rgba<u8> = Rgba([0, 0, 0, 160]);

/// Draws recognized text onto a transparent canvas
pub trait OverlayRenderer: Send + Sync {
    fn render(&self, canvas: &mut RgbaImage, boxes: &[OcrBox], with_background: bool);
}

/// Renderer drawing box outlines, optionally over a translucent fill.
///
/// Hosts with a text layout engine supply their own renderer for glyphs.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutlineRenderer;

impl OverlayRenderer for OutlineRenderer {
    fn render(&self, canvas: &mut RgbaImage, boxes: &[OcrBox], with_background: bool) {
        for b in boxes {
            let Some(rect) = to_rect(&b.rect) else {
                continue;
            };
            if with_background {
                draw_filled_rect_mut(canvas, rect, BACKGROUND_FILL);
            }
            draw_hollow_rect_mut(canvas, rect, OUTLINE_COLOUR);
        }
    }
}

fn to_rect(rect: &BoxRect) -> Option<Rect> {
    (rect.width > 0 && rect.height > 0)
        .then(|| Rect::at(rect.x, rect.y).of_size(rect.width as u32, rect.height as u32))
}

/// Render the output image for `boxes` at frame size
pub fn render_output(
    mode: OutputImageMode,
    width: u32,
    height: u32,
    boxes: &[OcrBox],
    renderer: &dyn OverlayRenderer,
) -> RgbaImage {
    match mode {
        OutputImageMode::DetectionMask => {
            let mut mask = RgbaImage::from_pixel(width, height, MASK_BACKGROUND);
            for rect in boxes.iter().filter_map(|b| to_rect(&b.rect)) {
                draw_filled_rect_mut(&mut mask, rect, MASK_FOREGROUND);
            }
            mask
        }
        OutputImageMode::TextOverlay | OutputImageMode::TextOverlayWithBackground => {
            let mut canvas = RgbaImage::new(width, height);
            renderer.render(
                &mut canvas,
                boxes,
                mode == OutputImageMode::TextOverlayWithBackground,
            );
            canvas
        }
    }
}
