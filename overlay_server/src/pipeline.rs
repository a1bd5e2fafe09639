//! Wiring of capture source and readiness flags.
//!
use std::sync::Arc;

use anyhow::{Context, Result};
use cam_capture::{start_capture, CameraAccessError, CameraFeed, CaptureFn};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{detection_loop::LoopHandle, readiness::ReadinessFlag};

/// Request camera access and mark the stream as playing once it is granted.
///
/// A refused camera is logged and leaves `stream_playing` unset, so the
/// detection loop of the pipeline never arms. There is no retry.
pub async fn start_capture_source<O>(
    open: O,
    feed: Arc<CameraFeed>,
    stream_playing: ReadinessFlag,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>>
where
    O: FnOnce() -> Result<CaptureFn, CameraAccessError> + Send + 'static,
{
    match start_capture(open, feed, cancel).await {
        Ok(handle) => {
            stream_playing.set();
            log::info!("Webcam stream playing");
            Some(handle)
        }
        Err(err) => {
            log::error!("Error accessing webcam: {err}");
            None
        }
    }
}

/// Cancel `cancel` on Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    log::info!("Shutting down");
                    cancel.cancel();
                }
                Err(err) => log::error!("Unable to listen for Ctrl-C: {err}"),
            },
            _ = cancel.cancelled() => {}
        }
    })
}

/// Run until the server exits or the model fails to load, then stop the
/// detection loop and the capture thread.
///
/// `cancel` is cancelled on every path out of here. The capture thread only
/// checks the token, and the runtime cannot shut down while it is running.
pub async fn run_until_shutdown(
    mut server: JoinHandle<Result<()>>,
    loader: JoinHandle<Result<()>>,
    cancel: CancellationToken,
    detection_loop: LoopHandle,
    capture: Option<JoinHandle<()>>,
) -> Result<()> {
    let early = tokio::select! {
        served = &mut server => Some(joined(served, "server task failed")),
        loaded = loader => joined(loaded, "model loader task failed")
            .err()
            .map(|err| Err(err.context("failed to load model"))),
    };
    let result = match early {
        Some(result) => result,
        None => joined(server.await, "server task failed"),
    };

    cancel.cancel();
    detection_loop.teardown().await;
    if let Some(capture) = capture {
        if let Err(err) = capture.await {
            log::error!("Capture thread failed: {err}");
        }
    }

    result
}

fn joined(result: Result<Result<()>, JoinError>, task: &'static str) -> Result<()> {
    result.context(task)?
}
