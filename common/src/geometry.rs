//! Geometry primitives in frame pixel coordinates.
//!
//! The coordinate frame basis is the top left corner of the video frame.
use serde::Serialize;

/// A point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
        }
    }
}

/// Bounding box given by its top-left corner and its size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a box from top-left and bottom-right corner points.
    ///
    /// An ill-defined box (bottom-right above or left of top-left) collapses to
    /// zero width/height instead of going negative.
    pub fn from_corners(x_tl: f32, y_tl: f32, x_br: f32, y_br: f32) -> Self {
        Self {
            x: x_tl,
            y: y_tl,
            width: (x_br - x_tl).max(0.0),
            height: (y_br - y_tl).max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Rescale the box, e.g. from detector input size to display size.
    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }

    /// Clamp the box to a `width` x `height` frame.
    pub fn clamped(self, width: f32, height: f32) -> Self {
        let x_tl = self.x.clamp(0.0, width);
        let y_tl = self.y.clamp(0.0, height);
        let x_br = self.right().clamp(0.0, width);
        let y_br = self.bottom().clamp(0.0, height);
        Self::from_corners(x_tl, y_tl, x_br, y_br)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_corners() {
        let bbox = BBox::from_corners(10.0, 20.0, 110.0, 70.0);
        assert_eq!(bbox, BBox::new(10.0, 20.0, 100.0, 50.0));
        assert_eq!(bbox.right(), 110.0);
        assert_eq!(bbox.bottom(), 70.0);
        assert_eq!(bbox.area(), 5000.0);
    }

    #[test]
    fn test_ill_defined_corners_collapse() {
        let bbox = BBox::from_corners(50.0, 50.0, 10.0, 10.0);
        assert_eq!(bbox.width, 0.0);
        assert_eq!(bbox.height, 0.0);
        assert_eq!(bbox.area(), 0.0);
    }

    #[test]
    fn test_scaled_and_clamped() {
        let bbox = BBox::new(160.0, 120.0, 32.0, 24.0).scaled(2.0, 2.0);
        assert_eq!(bbox, BBox::new(320.0, 240.0, 64.0, 48.0));

        let clamped = BBox::new(-10.0, 470.0, 50.0, 50.0).clamped(640.0, 480.0);
        assert_eq!(clamped, BBox::new(0.0, 470.0, 40.0, 10.0));
    }
}
