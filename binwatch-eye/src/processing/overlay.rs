//! Detection overlays: corner-style boxes with a `label confidence` tab

use crate::error::{EyeError, Result};
use crate::frame::Frame;
use crate::models::Detection;

/// Box outline and label tab colour (RGB)
pub const OUTLINE_COLOR: [u8; 3] = [255, 0, 255];
/// Corner accent colour (RGB)
pub const CORNER_COLOR: [u8; 3] = [0, 255, 0];
/// Label text colour (RGB)
pub const TEXT_COLOR: [u8; 3] = [255, 255, 255];

const CORNER_LENGTH: u32 = 30;
const CORNER_THICKNESS: u32 = 2;
const TAB_PADDING: i32 = 3;
/// Label tabs never end above this row, so they stay on screen
const TAB_MIN_BOTTOM: i32 = 35;

/// Text shown on a detection's tab
pub fn label_text(det: &Detection) -> String {
    format!("{} {:.2}", det.label, det.confidence)
}

/// A detection box snapped to whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    pub fn from_detection(det: &Detection) -> Option<Self> {
        if !det.bbox.is_finite() {
            return None;
        }
        Some(Self {
            x: det.bbox.x as i32,
            y: det.bbox.y as i32,
            width: (det.bbox.width as i64).clamp(1, u32::MAX as i64) as u32,
            height: (det.bbox.height as i64).clamp(1, u32::MAX as i64) as u32,
        })
    }

    /// The eight corner bars as `(x, y, width, height)`
    pub fn corner_bars(&self) -> [(i32, i32, u32, u32); 8] {
        let len_x = CORNER_LENGTH.min(self.width / 2).max(1);
        let len_y = CORNER_LENGTH.min(self.height / 2).max(1);
        let t = CORNER_THICKNESS;
        let right = self.x + self.width as i32;
        let bottom = self.y + self.height as i32;
        let (x, y) = (self.x, self.y);

        [
            (x, y, len_x, t),
            (x, y, t, len_y),
            (right - len_x as i32, y, len_x, t),
            (right - t as i32, y, t, len_y),
            (x, bottom - t as i32, len_x, t),
            (x, bottom - len_y as i32, t, len_y),
            (right - len_x as i32, bottom - t as i32, len_x, t),
            (right - t as i32, bottom - len_y as i32, t, len_y),
        ]
    }
}

/// Tab rectangle `(left, top, width, height)` for text of the given size
fn tab_geometry(x: i32, y: i32, text_width: u32, text_height: u32) -> (i32, i32, u32, u32) {
    let width = text_width + 2 * TAB_PADDING as u32;
    let height = text_height + 2 * TAB_PADDING as u32;
    let bottom = y.max(TAB_MIN_BOTTOM);
    (x.max(0), bottom - height as i32, width, height)
}

/// Draw every detection onto the frame
pub fn annotate(frame: &mut Frame, detections: &[Detection]) -> Result<()> {
    if detections.is_empty() {
        return Ok(());
    }
    draw(frame, detections)
}

#[cfg(feature = "opencv")]
fn draw(frame: &mut Frame, detections: &[Detection]) -> Result<()> {
    cv::annotate(frame, detections)
}

#[cfg(not(feature = "opencv"))]
fn draw(frame: &mut Frame, detections: &[Detection]) -> Result<()> {
    raster::annotate(frame, detections)
}

/// Pure Rust rendering on top of `imageproc`
pub mod raster {
    use super::*;
    use ab_glyph::{FontRef, PxScale};
    use image::{Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
    use imageproc::rect::Rect;

    static FONT_BYTES: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");
    const FONT_SCALE: f32 = 16.0;

    pub fn font() -> Result<FontRef<'static>> {
        FontRef::try_from_slice(FONT_BYTES)
            .map_err(|e| EyeError::Processing(format!("Overlay font unusable: {}", e)))
    }

    pub fn annotate(frame: &mut Frame, detections: &[Detection]) -> Result<()> {
        let font = font()?;
        let format = frame.format();
        let mut canvas = frame.to_rgb_image()?;

        for det in detections {
            let Some(pixel_box) = PixelBox::from_detection(det) else {
                continue;
            };
            draw_corner_rect(&mut canvas, &pixel_box);
            draw_label(&mut canvas, &font, pixel_box.x, pixel_box.y, &label_text(det));
        }

        *frame = Frame::from_rgb_image(canvas, format)?;
        Ok(())
    }

    pub fn draw_corner_rect(canvas: &mut RgbImage, pixel_box: &PixelBox) {
        let outline = Rect::at(pixel_box.x, pixel_box.y).of_size(pixel_box.width, pixel_box.height);
        draw_hollow_rect_mut(canvas, outline, Rgb(OUTLINE_COLOR));
        for (x, y, w, h) in pixel_box.corner_bars() {
            draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(w, h), Rgb(CORNER_COLOR));
        }
    }

    pub fn draw_label(canvas: &mut RgbImage, font: &FontRef<'_>, x: i32, y: i32, text: &str) {
        let scale = PxScale::from(FONT_SCALE);
        let (text_width, text_height) = text_size(scale, font, text);
        let (left, top, width, height) = tab_geometry(x, y, text_width.max(1), text_height.max(1));

        draw_filled_rect_mut(canvas, Rect::at(left, top).of_size(width, height), Rgb(OUTLINE_COLOR));
        draw_text_mut(
            canvas,
            Rgb(TEXT_COLOR),
            left + TAB_PADDING,
            top + TAB_PADDING,
            scale,
            font,
            text,
        );
    }
}

#[cfg(feature = "opencv")]
mod cv {
    //! OpenCV `imgproc` rendering, used when the crate is built with OpenCV

    use super::*;
    use crate::frame::PixelFormat;
    use opencv::core::{Mat, Point, Rect, Scalar, CV_8UC3};
    use opencv::imgproc;
    use opencv::prelude::*;

    const FONT_FACE: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
    const FONT_SCALE: f64 = 0.5;

    fn bgr(rgb: [u8; 3]) -> Scalar {
        Scalar::new(rgb[2] as f64, rgb[1] as f64, rgb[0] as f64, 0.0)
    }

    pub fn annotate(frame: &mut Frame, detections: &[Detection]) -> Result<()> {
        let format = frame.format();
        let source = frame.to_bgr();
        let mut mat = Mat::new_rows_cols_with_default(
            source.height() as i32,
            source.width() as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(source.data());

        for det in detections {
            let Some(pixel_box) = PixelBox::from_detection(det) else {
                continue;
            };
            draw_corner_rect(&mut mat, &pixel_box)?;
            draw_label(&mut mat, pixel_box.x, pixel_box.y, &label_text(det))?;
        }

        let annotated = Frame::new(
            source.width(),
            source.height(),
            PixelFormat::Bgr8,
            mat.data_bytes()?.to_vec(),
        )?;
        *frame = match format {
            PixelFormat::Bgr8 => annotated,
            PixelFormat::Rgb8 => annotated.to_rgb(),
        };
        Ok(())
    }

    fn draw_corner_rect(mat: &mut Mat, pixel_box: &PixelBox) -> Result<()> {
        let outline = Rect::new(
            pixel_box.x,
            pixel_box.y,
            pixel_box.width as i32,
            pixel_box.height as i32,
        );
        imgproc::rectangle(mat, outline, bgr(OUTLINE_COLOR), 1, imgproc::LINE_8, 0)?;
        for (x, y, w, h) in pixel_box.corner_bars() {
            let bar = Rect::new(x, y, w as i32, h as i32);
            imgproc::rectangle(mat, bar, bgr(CORNER_COLOR), imgproc::FILLED, imgproc::LINE_8, 0)?;
        }
        Ok(())
    }

    fn draw_label(mat: &mut Mat, x: i32, y: i32, text: &str) -> Result<()> {
        let mut baseline = 0;
        let size = imgproc::get_text_size(text, FONT_FACE, FONT_SCALE, 1, &mut baseline)?;
        let (left, top, width, height) = tab_geometry(x, y, size.width.max(1) as u32, size.height.max(1) as u32);

        let tab = Rect::new(left, top, width as i32, height as i32);
        imgproc::rectangle(mat, tab, bgr(OUTLINE_COLOR), imgproc::FILLED, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            mat,
            text,
            Point::new(left + TAB_PADDING, top + TAB_PADDING + size.height),
            FONT_FACE,
            FONT_SCALE,
            bgr(TEXT_COLOR),
            1,
            imgproc::LINE_AA,
            false,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::models::BoundingBox;
    use image::{Rgb, RgbImage};

    fn blank(w: u32, h: u32) -> Frame {
        Frame::filled(w, h, PixelFormat::Bgr8, 0).unwrap()
    }

    fn detection(label: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection {
            class_id: 2,
            label: label.to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn test_label_text_format() {
        let det = detection("garbage", 0.87, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(label_text(&det), "garbage 0.87");
    }

    #[test]
    fn test_corner_rect_marks_edges_only() {
        let mut canvas = RgbImage::new(100, 100);
        let pixel_box = PixelBox {
            x: 10,
            y: 10,
            width: 80,
            height: 80,
        };
        raster::draw_corner_rect(&mut canvas, &pixel_box);

        assert_eq!(canvas.get_pixel(10, 10), &Rgb(CORNER_COLOR));
        assert_eq!(canvas.get_pixel(89, 89), &Rgb(CORNER_COLOR));
        // middle of the top edge is plain outline
        assert_eq!(canvas.get_pixel(50, 10), &Rgb(OUTLINE_COLOR));
        assert_eq!(canvas.get_pixel(50, 50), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_tab_carries_text() {
        let mut canvas = RgbImage::new(200, 60);
        let font = raster::font().unwrap();
        raster::draw_label(&mut canvas, &font, 5, 50, "garbage 0.87");

        // tab sits right above the box top
        assert_eq!(canvas.get_pixel(6, 48), &Rgb(OUTLINE_COLOR));
        let glyph_pixels = canvas
            .pixels()
            .filter(|p| p.0 != OUTLINE_COLOR && p.0 != [0, 0, 0])
            .count();
        assert!(glyph_pixels > 0);
    }

    #[test]
    fn test_different_labels_render_differently() {
        let bbox = BoundingBox::new(20.0, 40.0, 60.0, 40.0);
        let mut garbage = blank(160, 120);
        let mut trash = blank(160, 120);

        annotate(&mut garbage, &[detection("garbage", 0.87, bbox)]).unwrap();
        annotate(&mut trash, &[detection("trash", 0.87, bbox)]).unwrap();

        assert_ne!(garbage, trash);
        assert_eq!(garbage.format(), PixelFormat::Bgr8);
    }

    #[test]
    fn test_different_confidences_render_differently() {
        let bbox = BoundingBox::new(20.0, 40.0, 60.0, 40.0);
        let mut low = blank(160, 120);
        let mut high = blank(160, 120);

        annotate(&mut low, &[detection("garbage", 0.31, bbox)]).unwrap();
        annotate(&mut high, &[detection("garbage", 0.87, bbox)]).unwrap();

        assert_ne!(low, high);
    }

    #[test]
    fn test_drawing_clips_to_frame() {
        let mut frame = blank(20, 20);
        let bbox = BoundingBox::new(-10.0, -10.0, 100.0, 100.0);
        annotate(&mut frame, &[detection("garbage", 0.9, bbox)]).unwrap();
        assert_eq!((frame.width(), frame.height()), (20, 20));
    }

    #[test]
    fn test_annotate_skips_non_finite_boxes() {
        let mut frame = blank(50, 50);
        let bbox = BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0);
        annotate(&mut frame, &[detection("garbage", 0.8, bbox)]).unwrap();
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_no_detections_leaves_frame() {
        let mut frame = blank(8, 8);
        annotate(&mut frame, &[]).unwrap();
        assert_eq!(frame, blank(8, 8));
    }
}
