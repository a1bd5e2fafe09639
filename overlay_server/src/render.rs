//! Overlay renderers.
//!
//! Both renderers clear the surface first and then draw the given batch only;
//! nothing carries over from previous frames.
use common::{DetectionBatch, FaceDetection, Point};
use image::Rgba;

use crate::canvas::{Color, DrawSurface, LabelStyle};

const OBJECT_COLOR: Color = Rgba([0, 255, 0, 255]);
const FACE_BOX_COLOR: Color = Rgba([0, 0, 255, 255]);
const LANDMARK_COLOR: Color = Rgba([1, 255, 255, 255]);
const LABEL_BACKGROUND: Color = Rgba([0, 0, 0, 128]);
const WHITE: Color = Rgba([255, 255, 255, 255]);

/// Expressions below this probability are not listed.
pub const MIN_EXPRESSION_PROBABILITY: f32 = 0.1;

const BOX_LINE_WIDTH: u32 = 2;
const LANDMARK_RADIUS: u32 = 1;

const OBJECT_LABEL: LabelStyle = LabelStyle {
    text: Rgba([0, 0, 0, 255]),
    background: Some(OBJECT_COLOR),
    font_size: 16.0,
    padding: 2,
};

const FACE_LABEL: LabelStyle = LabelStyle {
    text: WHITE,
    background: Some(LABEL_BACKGROUND),
    font_size: 14.0,
    padding: 2,
};

/// Draw one box with `label score%` per detected object.
pub fn render_objects<S: DrawSurface + ?Sized>(surface: &mut S, batch: &DetectionBatch) {
    surface.clear();

    for detection in batch.iter() {
        let bbox = &detection.bbox;
        surface.stroke_rect(bbox, OBJECT_COLOR, BOX_LINE_WIDTH);

        // Label sits on top of the box, or inside when the box touches the top edge
        let label_y = if bbox.y >= OBJECT_LABEL.line_height() {
            bbox.y - OBJECT_LABEL.line_height()
        } else {
            bbox.y
        };
        surface.draw_label(
            &Point::new(bbox.x, label_y),
            &detection.caption(),
            &OBJECT_LABEL,
        );
    }
}

/// Draw box, score, landmarks, expressions and age/gender per face.
pub fn render_faces<S: DrawSurface + ?Sized>(surface: &mut S, faces: &[FaceDetection]) {
    surface.clear();

    for face in faces {
        let bbox = &face.bbox;
        surface.stroke_rect(bbox, FACE_BOX_COLOR, BOX_LINE_WIDTH);
        surface.draw_label(
            &Point::new(bbox.x, bbox.y),
            &format!("{:.2}", face.score),
            &FACE_LABEL,
        );

        for point in face.landmarks.iter() {
            surface.fill_point(point, LANDMARK_RADIUS, LANDMARK_COLOR);
        }

        let line_height = FACE_LABEL.line_height();
        let expressions = face.expressions.ranked(MIN_EXPRESSION_PROBABILITY);
        for (line, (expression, probability)) in expressions.iter().enumerate() {
            surface.draw_label(
                &Point::new(bbox.x, bbox.bottom() + line as f32 * line_height),
                &format!("{expression} ({probability:.2})"),
                &FACE_LABEL,
            );
        }

        // Above the box if there is room, else below the expression lines
        let age_gender_y = if bbox.y >= line_height {
            bbox.y - line_height
        } else {
            bbox.bottom() + expressions.len() as f32 * line_height
        };
        surface.draw_label(
            &Point::new(bbox.x, age_gender_y),
            &face.age_gender_label(),
            &FACE_LABEL,
        );
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use common::{BBox, Expressions, Gender, ObjectDetection};

    use super::*;
    use crate::canvas::OverlayCanvas;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Clear,
        Rect(BBox),
        Point(Point),
        Label(Point, String),
    }

    /// Records draw calls instead of rasterizing them.
    #[derive(Default)]
    struct RecordingSurface {
        ops: Vec<Op>,
    }

    impl RecordingSurface {
        fn anchor_of(&self, label: &str) -> Point {
            self.ops
                .iter()
                .find_map(|op| match op {
                    Op::Label(anchor, text) if text == label => Some(*anchor),
                    _ => None,
                })
                .expect("label not drawn")
        }

        fn labels(&self) -> Vec<&str> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Label(_, text) => Some(text.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    impl DrawSurface for RecordingSurface {
        fn dimensions(&self) -> (u32, u32) {
            (640, 480)
        }

        fn clear(&mut self) {
            self.ops.push(Op::Clear);
        }

        fn stroke_rect(&mut self, bbox: &BBox, _color: Color, _line_width: u32) {
            self.ops.push(Op::Rect(*bbox));
        }

        fn fill_point(&mut self, point: &Point, _radius: u32, _color: Color) {
            self.ops.push(Op::Point(*point));
        }

        fn draw_label(&mut self, anchor: &Point, text: &str, _style: &LabelStyle) {
            self.ops.push(Op::Label(*anchor, text.to_owned()));
        }
    }

    fn objects() -> DetectionBatch {
        DetectionBatch::new(vec![
            ObjectDetection::new("person", 0.875, BBox::new(10.0, 40.0, 100.0, 200.0)),
            ObjectDetection::new("dog", 0.75, BBox::new(200.0, 0.0, 50.0, 40.0)),
        ])
    }

    fn face() -> FaceDetection {
        FaceDetection {
            score: 0.93,
            bbox: BBox::new(100.0, 100.0, 120.0, 120.0),
            landmarks: vec![Point::new(130.0, 140.0), Point::new(190.0, 140.0)],
            expressions: Expressions([0.05, 0.8, 0.0, 0.15, 0.0, 0.0, 0.0, 0.0]),
            age: 29.6,
            gender: Gender::Male,
            gender_probability: 0.97,
        }
    }

    #[test]
    fn test_objects_clear_before_draw() {
        let mut surface = RecordingSurface::default();
        render_objects(&mut surface, &objects());

        assert_eq!(surface.ops[0], Op::Clear);
        assert_eq!(surface.ops[1], Op::Rect(BBox::new(10.0, 40.0, 100.0, 200.0)));
        assert_eq!(surface.labels(), ["person 87.50%", "dog 75.00%"]);
    }

    #[test]
    fn test_face_overlay_content() {
        let mut surface = RecordingSurface::default();
        render_faces(&mut surface, &[face()]);

        assert_eq!(surface.ops[0], Op::Clear);
        let points = surface
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Point(_)))
            .count();
        assert_eq!(points, 2);
        assert_eq!(
            surface.labels(),
            [
                "0.93",
                "happy (0.80)",
                "sad (0.15)",
                "Age: 30 | Gender: male"
            ]
        );
    }

    #[test]
    fn test_age_gender_label_above_box() {
        let mut surface = RecordingSurface::default();
        render_faces(&mut surface, &[face()]);

        let line_height = FACE_LABEL.line_height();
        assert_eq!(
            surface.anchor_of("Age: 30 | Gender: male"),
            Point::new(100.0, 100.0 - line_height)
        );
    }

    #[test]
    fn test_age_gender_label_moves_below_expressions_at_top_edge() {
        let mut face = face();
        face.bbox = BBox::new(100.0, 5.0, 120.0, 120.0);
        let mut surface = RecordingSurface::default();
        render_faces(&mut surface, &[face]);

        let line_height = FACE_LABEL.line_height();
        let score = surface.anchor_of("0.93");
        let age_gender = surface.anchor_of("Age: 30 | Gender: male");
        // Two expression lines sit between the box bottom and the age label
        assert_eq!(age_gender, Point::new(100.0, 125.0 + 2.0 * line_height));
        assert!(age_gender.y >= score.y + line_height);
    }

    #[test]
    fn test_empty_batch_only_clears() {
        let mut surface = RecordingSurface::default();
        render_objects(&mut surface, &DetectionBatch::default());
        render_faces(&mut surface, &[]);
        assert_eq!(surface.ops, [Op::Clear, Op::Clear]);
    }

    #[test]
    fn test_rendering_empty_batch_leaves_canvas_blank() {
        let mut canvas = OverlayCanvas::new(320, 240);
        render_objects(&mut canvas, &objects());
        assert!(!canvas.is_blank());
        render_objects(&mut canvas, &DetectionBatch::default());
        assert!(canvas.is_blank());

        render_faces(&mut canvas, &[face()]);
        assert!(!canvas.is_blank());
        render_faces(&mut canvas, &[]);
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_rendering_replaces_previous_frame() {
        let mut first = OverlayCanvas::new(320, 240);
        render_objects(&mut first, &objects());

        let mut reused = OverlayCanvas::new(320, 240).with_font(None::<Arc<_>>);
        render_faces(&mut reused, &[face()]);
        render_objects(&mut reused, &objects());

        assert_eq!(first.image(), reused.image());
    }
}
