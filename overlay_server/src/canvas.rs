//! Transparent drawing surface laid over the video.
//!
use std::{io::Cursor, path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use common::{BBox, Point};
use image::{imageops::FilterType, DynamicImage, ImageOutputFormat, RgbImage, Rgba, RgbaImage};
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut,
        text_size,
    },
    rect::Rect,
};
use rusttype::{Font, Scale};

pub type Color = Rgba<u8>;

const TRANSPARENT: Color = Rgba([0, 0, 0, 0]);

/// How a text label is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStyle {
    pub text: Color,
    pub background: Option<Color>,
    pub font_size: f32,
    pub padding: u32,
}

impl LabelStyle {
    /// Height of one label line including padding.
    pub fn line_height(&self) -> f32 {
        self.font_size + 2.0 * self.padding as f32
    }
}

/// 2D drawing primitives used by the overlay renderers.
pub trait DrawSurface {
    fn dimensions(&self) -> (u32, u32);

    /// Erase everything drawn so far.
    fn clear(&mut self);

    fn stroke_rect(&mut self, bbox: &BBox, color: Color, line_width: u32);

    fn fill_point(&mut self, point: &Point, radius: u32, color: Color);

    /// Draw `text` with its top-left corner at `anchor`.
    fn draw_label(&mut self, anchor: &Point, text: &str, style: &LabelStyle);
}

/// RGBA overlay canvas sized 1:1 to the video frame.
pub struct OverlayCanvas {
    image: RgbaImage,
    font: Option<Arc<Font<'static>>>,
    warned_missing_font: bool,
}

impl OverlayCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, TRANSPARENT),
            font: None,
            warned_missing_font: false,
        }
    }

    pub fn with_font(mut self, font: Option<Arc<Font<'static>>>) -> Self {
        self.font = font;
        self
    }

    /// Resize to the video dimensions. Resizing drops the current drawing.
    /// Returns `true` if the size changed.
    pub fn match_dimensions(&mut self, width: u32, height: u32) -> bool {
        if self.image.dimensions() == (width, height) {
            return false;
        }
        log::debug!("Matching overlay canvas to {width}x{height}");
        self.image = RgbaImage::from_pixel(width, height, TRANSPARENT);
        true
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// True if nothing is drawn on the canvas.
    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|pixel| pixel[3] == 0)
    }

    /// Blend the overlay over a video frame. A frame of different size is
    /// scaled to the canvas first.
    pub fn composite_onto(&self, frame: &RgbImage) -> RgbImage {
        let (width, height) = self.image.dimensions();
        let frame = if frame.dimensions() == (width, height) {
            frame.clone()
        } else {
            image::imageops::resize(frame, width, height, FilterType::Triangle)
        };

        let mut base = DynamicImage::ImageRgb8(frame).to_rgba8();
        image::imageops::overlay(&mut base, &self.image, 0, 0);
        DynamicImage::ImageRgba8(base).to_rgb8()
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageOutputFormat::Png)?;
        Ok(buf.into_inner())
    }
}

impl DrawSurface for OverlayCanvas {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self) {
        self.image.pixels_mut().for_each(|pixel| *pixel = TRANSPARENT);
    }

    fn stroke_rect(&mut self, bbox: &BBox, color: Color, line_width: u32) {
        let (x, y) = (bbox.x.round() as i32, bbox.y.round() as i32);
        let (width, height) = (bbox.width.round() as i32, bbox.height.round() as i32);
        if width < 1 || height < 1 {
            return;
        }

        // Grow the outline outwards, one pixel ring per unit of line width
        for ring in 0..line_width.max(1) as i32 {
            let rect = Rect::at(x - ring, y - ring)
                .of_size((width + 2 * ring) as u32, (height + 2 * ring) as u32);
            draw_hollow_rect_mut(&mut self.image, rect, color);
        }
    }

    fn fill_point(&mut self, point: &Point, radius: u32, color: Color) {
        draw_filled_circle_mut(
            &mut self.image,
            (point.x.round() as i32, point.y.round() as i32),
            radius as i32,
            color,
        );
    }

    fn draw_label(&mut self, anchor: &Point, text: &str, style: &LabelStyle) {
        let Some(font) = self.font.clone() else {
            if !self.warned_missing_font {
                log::warn!("No font loaded, overlay labels are not drawn");
                self.warned_missing_font = true;
            }
            return;
        };

        let scale = Scale::uniform(style.font_size);
        let padding = style.padding as i32;
        let (x, y) = (anchor.x.round() as i32, anchor.y.round() as i32);

        if let Some(background) = style.background {
            let (text_width, _) = text_size(scale, &font, text);
            let rect = Rect::at(x, y).of_size(
                (text_width + 2 * padding).max(1) as u32,
                style.line_height().round().max(1.0) as u32,
            );
            draw_filled_rect_mut(&mut self.image, rect, background);
        }

        draw_text_mut(
            &mut self.image,
            style.text,
            x + padding,
            y + padding,
            scale,
            &font,
            text,
        );
    }
}

/// Load a TrueType font for overlay labels.
pub fn load_font(path: &Path) -> Result<Font<'static>> {
    let font_data = std::fs::read(path)
        .with_context(|| format!("failed to read font {}", path.display()))?;
    Font::try_from_vec(font_data).ok_or_else(|| anyhow!("invalid font file {}", path.display()))
}

/// Like [`load_font`], but a missing font only disables labels.
pub fn load_font_or_warn(path: &Path) -> Option<Arc<Font<'static>>> {
    match load_font(path) {
        Ok(font) => Some(Arc::new(font)),
        Err(err) => {
            log::warn!("{err:#}, overlay labels are disabled");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GREEN: Color = Rgba([0, 255, 0, 255]);

    #[test]
    fn test_new_canvas_is_blank() {
        let canvas = OverlayCanvas::new(32, 24);
        assert!(canvas.is_blank());
        assert_eq!(canvas.dimensions(), (32, 24));
    }

    #[test]
    fn test_stroke_rect_then_clear() {
        let mut canvas = OverlayCanvas::new(32, 24);
        canvas.stroke_rect(&BBox::new(4.0, 4.0, 10.0, 8.0), GREEN, 1);

        assert!(!canvas.is_blank());
        assert_eq!(*canvas.image().get_pixel(4, 4), GREEN);
        assert_eq!(*canvas.image().get_pixel(8, 8), TRANSPARENT);

        canvas.clear();
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_degenerate_rect_draws_nothing() {
        let mut canvas = OverlayCanvas::new(32, 24);
        canvas.stroke_rect(&BBox::new(4.0, 4.0, 0.0, 8.0), GREEN, 2);
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_rect_outside_canvas_is_clipped() {
        let mut canvas = OverlayCanvas::new(32, 24);
        canvas.stroke_rect(&BBox::new(-10.0, -10.0, 100.0, 100.0), GREEN, 3);
        canvas.fill_point(&Point::new(40.0, 40.0), 2, GREEN);
        assert_eq!(canvas.dimensions(), (32, 24));
    }

    #[test]
    fn test_label_without_font_is_skipped() {
        let mut canvas = OverlayCanvas::new(32, 24);
        let style = LabelStyle {
            text: GREEN,
            background: Some(GREEN),
            font_size: 12.0,
            padding: 2,
        };
        canvas.draw_label(&Point::new(1.0, 1.0), "person", &style);
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_match_dimensions() {
        let mut canvas = OverlayCanvas::new(32, 24);
        canvas.fill_point(&Point::new(10.0, 10.0), 2, GREEN);

        assert!(!canvas.match_dimensions(32, 24));
        assert!(!canvas.is_blank());

        assert!(canvas.match_dimensions(64, 48));
        assert_eq!(canvas.dimensions(), (64, 48));
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_composite_keeps_video_where_overlay_is_transparent() {
        let mut canvas = OverlayCanvas::new(8, 8);
        canvas.fill_point(&Point::new(2.0, 2.0), 1, GREEN);
        let frame = RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]));

        let composite = canvas.composite_onto(&frame);
        assert_eq!(composite.get_pixel(2, 2).0, [0, 255, 0]);
        assert_eq!(composite.get_pixel(6, 6).0, [10, 20, 30]);
    }

    #[test]
    fn test_png_export() -> Result<()> {
        let canvas = OverlayCanvas::new(8, 8);
        let png = canvas.to_png()?;
        assert_eq!(&png[1..4], b"PNG");
        Ok(())
    }
}
