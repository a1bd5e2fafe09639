//! Latest-frame feed between the capture thread and its consumers.
//!
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use image::RgbImage;
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::error::CameraAccessError;

/// Capture one frame from an opened camera, decoded to RGB.
///
/// Not `Send`: a camera handle stays on the thread that opened it.
pub type CaptureFn = Box<dyn FnMut() -> Option<RgbImage>>;

/// Back-off after a failed capture before trying again.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Constraints passed when requesting camera access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Audio is never captured; kept to make the request explicit.
    pub audio: bool,
    pub width: u32,
    pub height: u32,
}

impl CaptureConstraints {
    pub fn video(width: u32, height: u32) -> Self {
        Self {
            audio: false,
            width,
            height,
        }
    }
}

/// One decoded video frame.
#[derive(Debug)]
pub struct VideoFrame {
    pub image: RgbImage,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl VideoFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Anything the detection loop can pull the current frame from.
pub trait FrameSource: Send + Sync + 'static {
    /// The current frame, or `None` while there is not enough data yet.
    fn current_frame(&self) -> Option<Arc<VideoFrame>>;
}

/// Holds the most recently captured frame.
pub struct CameraFeed {
    tx: watch::Sender<Option<Arc<VideoFrame>>>,
    sequence: AtomicU64,
}

impl CameraFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Replace the current frame and wake up subscribers.
    pub fn publish(&self, image: RgbImage) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.tx.send_replace(Some(Arc::new(VideoFrame {
            image,
            sequence,
            captured_at: Instant::now(),
        })));
        sequence
    }

    /// True once at least one full frame has been decoded.
    pub fn has_live_frame(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<VideoFrame>>> {
        self.tx.subscribe()
    }
}

impl Default for CameraFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for CameraFeed {
    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.tx.borrow().clone()
    }
}

/// Open a camera on the blocking pool and keep publishing its frames into
/// `feed` until `cancel` fires.
///
/// The camera is opened and read on the same thread. Resolves once the open
/// attempt finished: `Ok` carries the handle of the running capture thread,
/// `Err` the reason camera access was refused.
pub async fn start_capture<O>(
    open: O,
    feed: Arc<CameraFeed>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, CameraAccessError>
where
    O: FnOnce() -> Result<CaptureFn, CameraAccessError> + Send + 'static,
{
    let (opened_tx, opened_rx) = oneshot::channel();

    let handle = tokio::task::spawn_blocking(move || {
        let mut capture_fn = match open() {
            Ok(capture_fn) => {
                opened_tx.send(Ok(())).ok();
                capture_fn
            }
            Err(err) => {
                opened_tx.send(Err(err)).ok();
                return;
            }
        };

        log::info!("Capture thread started");
        while !cancel.is_cancelled() {
            match capture_fn() {
                Some(image) => {
                    let sequence = feed.publish(image);
                    log::trace!("Captured frame {sequence}");
                }
                None => {
                    log::error!("Unable to capture frame, trying again...");
                    std::thread::sleep(CAPTURE_RETRY_DELAY);
                }
            }
        }
        log::info!("Capture thread stopped");
    });

    match opened_rx.await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(CameraAccessError::Join(
            "camera opener exited without reporting".to_owned(),
        )),
    }
}
