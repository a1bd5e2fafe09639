//! Endpoints of HTTP server.
//!
use std::{io::Cursor, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    body::StreamBody,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use bytes::Bytes;
use cam_capture::{CameraFeed, VideoFrame};
use common::LabelSummary;
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    detection_loop::LoopState,
    overlay::{lock_canvas, SharedCanvas},
    readiness::ReadinessStatus,
    ui::{render_index, render_labels_panel, PageKind},
};

const JPEG_QUALITY: u8 = 80;

/// Everything the endpoints read from the running pipeline.
pub struct AppState {
    pub kind: PageKind,
    pub feed: Arc<CameraFeed>,
    pub canvas: SharedCanvas,
    pub labels: watch::Receiver<LabelSummary>,
    pub readiness: Arc<dyn ReadinessStatus>,
    pub loop_state: watch::Receiver<LoopState>,
}

/// Reply of `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub model_loaded: bool,
    pub stream_playing: bool,
    pub state: LoopState,
}

/// Build the router of one pipeline. Label routes exist for the object
/// pipeline only.
pub fn router(state: Arc<AppState>) -> Router {
    let app = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/", get(index))
        .route("/video", get(video))
        .route("/overlay_stream", get(overlay_stream))
        .route("/overlay.png", get(overlay_png))
        .route("/status", get(status));

    let app = match state.kind {
        PageKind::Objects => app
            .route("/labels", get(labels))
            .route("/labels.json", get(labels_json)),
        PageKind::Faces => app,
    };

    app.layer(Extension(state))
}

/// Serve the pipeline's page until `cancel` fires.
pub async fn serve(state: Arc<AppState>, address: &str, cancel: CancellationToken) -> Result<()> {
    let addr: SocketAddr = address.parse()?;
    log::info!("Serving on http://{addr}");

    axum::Server::try_bind(&addr)?
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

pub async fn index(Extension(state): Extension<Arc<AppState>>) -> Html<String> {
    let summary = state.labels.borrow().clone();
    Html(render_index(
        state.kind,
        state.readiness.model_loaded(),
        &summary,
    ))
}

/// Raw camera frames as multipart JPEG stream.
pub async fn video(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    log::info!("Video stream requested");
    mjpeg_response(jpeg_frames(state.feed.subscribe(), |frame| {
        encode_jpeg(&frame.image)
    }))
}

/// Camera frames with the overlay composited on top.
pub async fn overlay_stream(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    log::info!("Overlay stream requested");
    let canvas = Arc::clone(&state.canvas);
    mjpeg_response(jpeg_frames(state.feed.subscribe(), move |frame| {
        let composite = lock_canvas(&canvas).composite_onto(&frame.image);
        encode_jpeg(&composite)
    }))
}

/// The current overlay as transparent PNG.
pub async fn overlay_png(Extension(state): Extension<Arc<AppState>>) -> Response {
    let png = lock_canvas(&state.canvas).to_png();
    match png {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(err) => {
            log::error!("Failed to encode overlay: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn labels(Extension(state): Extension<Arc<AppState>>) -> Html<String> {
    let summary = state.labels.borrow().clone();
    Html(render_labels_panel(&summary))
}

pub async fn labels_json(Extension(state): Extension<Arc<AppState>>) -> Json<LabelSummary> {
    let summary = state.labels.borrow().clone();
    Json(summary)
}

pub async fn status(Extension(state): Extension<Arc<AppState>>) -> Json<StatusReport> {
    Json(StatusReport {
        model_loaded: state.readiness.model_loaded(),
        stream_playing: state.readiness.stream_playing(),
        state: *state.loop_state.borrow(),
    })
}

fn mjpeg_response<S>(stream: S) -> impl IntoResponse
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    (headers, body)
}

/// One multipart item per published frame, encoded by `encode`.
fn jpeg_frames<F>(
    frames: watch::Receiver<Option<Arc<VideoFrame>>>,
    encode: F,
) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    F: Fn(&VideoFrame) -> Result<Vec<u8>> + Send + 'static,
{
    WatchStream::new(frames).filter_map(move |frame| {
        let frame = frame?;
        match encode(&frame) {
            Ok(jpeg) => Some(Ok(as_jpeg_stream_item(&jpeg))),
            Err(err) => {
                log::warn!("Failed to encode frame {}: {err:#}", frame.sequence);
                None
            }
        }
    })
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode(
        image,
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf.into_inner())
}

fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}
