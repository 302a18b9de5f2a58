//! Per-frame annotation output.

use crate::types::BoundingBox;
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_STRIP_HEIGHT: u32 = 25;

/// A box to draw on the original frame, with the name to show under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Display collaborator: receives every captured frame and owns the stop signal.
pub trait Annotator {
    /// Show `frame` with `annotations` overlaid. Skipped frames arrive with none.
    fn present(&mut self, frame: &RgbImage, annotations: &[Annotation]);

    /// Polled once per iteration, after `present`.
    fn stop_requested(&mut self) -> bool;
}

/// Draw each annotation as a rectangle outline with a filled strip along its bottom edge.
///
/// Boxes are clamped to the frame; boxes entirely outside it are ignored.
pub fn draw_annotations(frame: &mut RgbImage, annotations: &[Annotation]) {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    for a in annotations {
        let Some((left, top, right, bottom)) = clamp_box(&a.bbox, w, h) else {
            continue;
        };

        for t in 0..BOX_THICKNESS {
            for x in left..=right {
                put(frame, x, top.saturating_add(t));
                put(frame, x, bottom.saturating_sub(t));
            }
            for y in top..=bottom {
                put(frame, left.saturating_add(t), y);
                put(frame, right.saturating_sub(t), y);
            }
        }

        let strip_top = bottom.saturating_sub(LABEL_STRIP_HEIGHT).max(top);
        for y in strip_top..=bottom {
            for x in left..=right {
                put(frame, x, y);
            }
        }
    }
}

fn clamp_box(b: &BoundingBox, w: u32, h: u32) -> Option<(u32, u32, u32, u32)> {
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;
    if b.right() < 0.0 || b.bottom() < 0.0 || b.x > max_x || b.y > max_y {
        return None;
    }
    let left = b.x.clamp(0.0, max_x) as u32;
    let top = b.y.clamp(0.0, max_y) as u32;
    let right = b.right().clamp(0.0, max_x) as u32;
    let bottom = b.bottom().clamp(0.0, max_y) as u32;
    Some((left, top, right, bottom))
}

fn put(frame: &mut RgbImage, x: u32, y: u32) {
    if x < frame.width() && y < frame.height() {
        frame.put_pixel(x, y, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(x: f32, y: f32, w: f32, h: f32) -> Annotation {
        Annotation {
            bbox: BoundingBox { x, y, width: w, height: h, confidence: 1.0 },
            label: "carol".into(),
        }
    }

    #[test]
    fn test_draws_outline_and_strip() {
        let mut frame = RgbImage::new(100, 100);
        draw_annotations(&mut frame, &[ann(10.0, 10.0, 60.0, 60.0)]);

        assert_eq!(*frame.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*frame.get_pixel(70, 40), BOX_COLOR);
        // inside the strip
        assert_eq!(*frame.get_pixel(40, 65), BOX_COLOR);
        // inside the box, above the strip
        assert_eq!(*frame.get_pixel(40, 30), Rgb([0, 0, 0]));
        // outside
        assert_eq!(*frame.get_pixel(90, 90), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_clamps_partially_outside_box() {
        let mut frame = RgbImage::new(20, 20);
        draw_annotations(&mut frame, &[ann(-5.0, -5.0, 100.0, 100.0)]);
        assert_eq!(*frame.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*frame.get_pixel(19, 19), BOX_COLOR);
    }

    #[test]
    fn test_ignores_box_outside_frame() {
        let mut frame = RgbImage::new(20, 20);
        draw_annotations(&mut frame, &[ann(50.0, 50.0, 10.0, 10.0)]);
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
