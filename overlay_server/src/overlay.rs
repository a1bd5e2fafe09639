//! Presenters drawing detection results onto the shared overlay canvas.
//!
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cam_capture::VideoFrame;
use common::{DetectionBatch, FaceDetection, LabelSummary};
use tokio::sync::watch;

use crate::{
    canvas::OverlayCanvas,
    detection_loop::Presenter,
    render::{render_faces, render_objects},
};

/// Overlay canvas shared between the detection loop and the HTTP endpoints.
pub type SharedCanvas = Arc<Mutex<OverlayCanvas>>;

pub fn shared_canvas(canvas: OverlayCanvas) -> SharedCanvas {
    Arc::new(Mutex::new(canvas))
}

/// Lock the canvas. A panicked renderer leaves at worst a half drawn overlay
/// which the next tick clears, so poisoning is ignored.
pub fn lock_canvas(canvas: &SharedCanvas) -> MutexGuard<'_, OverlayCanvas> {
    canvas.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object pipeline: canvas follows the frame size, labels go to the summary.
pub struct ObjectOverlay {
    canvas: SharedCanvas,
    labels: watch::Sender<LabelSummary>,
}

impl ObjectOverlay {
    pub fn new(canvas: SharedCanvas) -> Self {
        let (labels, _) = watch::channel(LabelSummary::default());
        Self { canvas, labels }
    }

    pub fn canvas(&self) -> SharedCanvas {
        Arc::clone(&self.canvas)
    }

    pub fn subscribe_labels(&self) -> watch::Receiver<LabelSummary> {
        self.labels.subscribe()
    }
}

impl Presenter<DetectionBatch> for ObjectOverlay {
    fn present(&self, frame: &VideoFrame, batch: DetectionBatch) {
        {
            let mut canvas = lock_canvas(&self.canvas);
            let (width, height) = frame.dimensions();
            canvas.match_dimensions(width, height);
            render_objects(&mut *canvas, &batch);
        }

        let summary = LabelSummary::from_batch(&batch);
        log::debug!("Frame {}: {} detections", frame.sequence, batch.len());
        self.labels.send_if_modified(|current| {
            if *current == summary {
                false
            } else {
                *current = summary;
                true
            }
        });
    }

    fn detection_failed(&self, err: &anyhow::Error) {
        log::warn!("Unhandled object detection failure: {err:#}");
    }
}

/// Face pipeline: fixed display size, results are rescaled to it.
pub struct FaceOverlay {
    canvas: SharedCanvas,
    display_size: (u32, u32),
}

impl FaceOverlay {
    pub fn new(canvas: SharedCanvas, display_size: (u32, u32)) -> Self {
        lock_canvas(&canvas).match_dimensions(display_size.0, display_size.1);
        Self {
            canvas,
            display_size,
        }
    }

    pub fn canvas(&self) -> SharedCanvas {
        Arc::clone(&self.canvas)
    }
}

impl Presenter<Vec<FaceDetection>> for FaceOverlay {
    fn present(&self, frame: &VideoFrame, faces: Vec<FaceDetection>) {
        let (width, height) = frame.dimensions();
        let sx = self.display_size.0 as f32 / width.max(1) as f32;
        let sy = self.display_size.1 as f32 / height.max(1) as f32;
        let faces: Vec<_> = faces.into_iter().map(|face| face.scaled(sx, sy)).collect();

        let mut canvas = lock_canvas(&self.canvas);
        render_faces(&mut *canvas, &faces);
    }

    fn detection_failed(&self, err: &anyhow::Error) {
        log::error!("Error during face detection: {err:#}");
    }
}
