//! Drawing detections onto frames.

use image::RgbImage;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::result::{BoundingBox, DetectionSet};
use crate::frame::{AnnotatedFrame, Frame};
use crate::settings::BoxColor;

/// How boxes are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxStyle {
    pub color: BoxColor,
    /// Line thickness in pixels.
    pub thickness: u32,
}

impl BoxStyle {
    pub fn new(color: BoxColor) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            color: BoxColor::default(),
            thickness: 2,
        }
    }
}

/// Composite detections onto a copy of `frame`.
pub fn draw_detections(frame: &Frame, detections: &DetectionSet, style: &BoxStyle) -> AnnotatedFrame {
    let mut canvas = frame.image().clone();
    for detection in detections {
        draw_box(&mut canvas, &detection.bbox, style);
    }
    AnnotatedFrame::new(canvas, frame.origin())
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, style: &BoxStyle) {
    let (img_w, img_h) = canvas.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }
    let color = style.color.rgb();
    for inset in 0..style.thickness.max(1) {
        let Some(rect) = rect_from_bbox(bbox, inset as f32, img_w, img_h) else {
            break;
        };
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Convert a float box shrunk by `inset` to an integer `Rect` inside the image.
fn rect_from_bbox(bbox: &BoundingBox, inset: f32, img_w: u32, img_h: u32) -> Option<Rect> {
    let max_x = (img_w - 1) as f32;
    let max_y = (img_h - 1) as f32;

    let x1 = (bbox.x + inset).clamp(0.0, max_x);
    let y1 = (bbox.y + inset).clamp(0.0, max_y);
    let x2 = (bbox.x + bbox.width - 1.0 - inset).clamp(0.0, max_x);
    let y2 = (bbox.y + bbox.height - 1.0 - inset).clamp(0.0, max_y);
    if x2 < x1 || y2 < y1 {
        return None;
    }

    let width = (x2 - x1 + 1.0).round().max(1.0) as u32;
    let height = (y2 - y1 + 1.0).round().max(1.0) as u32;
    Some(Rect::at(x1.round() as i32, y1.round() as i32).of_size(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::Detection;
    use crate::frame::FrameOrigin;
    use image::Rgb;

    fn gray_frame() -> Frame {
        Frame::new(RgbImage::from_pixel(40, 30, Rgb([90, 90, 90])), FrameOrigin::SingleImage, 0)
    }

    #[test]
    fn draws_box_edges_in_requested_color() {
        let frame = gray_frame();
        let set = DetectionSet::from_sorted(vec![Detection::pothole(
            BoundingBox::new(5.0, 5.0, 10.0, 10.0),
            0.8,
        )]);
        let style = BoxStyle::new(BoxColor([0, 255, 0]));

        let annotated = draw_detections(&frame, &set, &style);

        assert_eq!(annotated.image().get_pixel(5, 5), &Rgb([0, 255, 0]));
        assert_eq!(annotated.image().get_pixel(14, 14), &Rgb([0, 255, 0]));
        // interior untouched
        assert_eq!(annotated.image().get_pixel(10, 10), &Rgb([90, 90, 90]));
    }

    #[test]
    fn source_frame_is_not_modified() {
        let frame = gray_frame();
        let set = DetectionSet::from_sorted(vec![Detection::pothole(
            BoundingBox::new(0.0, 0.0, 40.0, 30.0),
            0.9,
        )]);
        let _ = draw_detections(&frame, &set, &BoxStyle::default());
        assert!(frame.image().pixels().all(|p| *p == Rgb([90, 90, 90])));
    }

    #[test]
    fn empty_set_yields_identical_copy() {
        let frame = gray_frame();
        let annotated = draw_detections(&frame, &DetectionSet::empty(), &BoxStyle::default());
        assert_eq!(annotated.image().as_raw(), frame.image().as_raw());
    }
}
