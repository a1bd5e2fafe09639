//! Face detection overlay binary.
//!
//! The webcam is only opened after all four face models are loaded.
use std::sync::Arc;

use anyhow::Result;
use cam_capture::{sensors::open_webcam, CameraFeed, CaptureConstraints};
use clap::Parser;
use common::LabelSummary;
use env_logger::TimestampPrecision;
use overlay_server::{
    canvas::{load_font_or_warn, OverlayCanvas},
    config::{FaceArgs, FACE_DISPLAY_SIZE, FACE_MAX_IOU, FACE_MIN_CONFIDENCE, FACE_TICK_PERIOD},
    detection_loop::DetectionLoop,
    endpoints::{serve, AppState},
    meter::{spawn_meter_logger, Meter},
    model_loader::spawn_model_loader,
    nn::{FaceAnalyzer, FaceModelFiles},
    overlay::{shared_canvas, FaceOverlay},
    pipeline::{cancel_on_ctrl_c, start_capture_source},
    readiness::readiness,
    ui::PageKind,
};
use reqwest::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = FaceArgs::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (slot, stream_playing, gate) = readiness::<FaceAnalyzer>();

    let [detector, landmarks, expressions, age_gender] = args.model_sources();
    let loader = spawn_model_loader(
        async move {
            let client = Client::new();
            let (detector, landmarks, expressions, age_gender) = futures::try_join!(
                detector.resolve(&client),
                landmarks.resolve(&client),
                expressions.resolve(&client),
                age_gender.resolve(&client),
            )?;
            let files = FaceModelFiles {
                detector,
                landmarks,
                expressions,
                age_gender,
            };
            let model = tokio::task::spawn_blocking(move || {
                FaceAnalyzer::load(&files, FACE_MAX_IOU, FACE_MIN_CONFIDENCE)
            })
            .await??;
            Ok::<_, anyhow::Error>(model)
        },
        slot,
    );

    let (width, height) = FACE_DISPLAY_SIZE;
    let feed = Arc::new(CameraFeed::new());
    let font = load_font_or_warn(&args.common.font);
    let canvas = shared_canvas(OverlayCanvas::new(width, height).with_font(font));
    let overlay = Arc::new(FaceOverlay::new(Arc::clone(&canvas), FACE_DISPLAY_SIZE));

    let meter = Arc::new(Meter::new());
    let detection_loop = DetectionLoop::new(
        Arc::clone(&feed),
        overlay,
        args.common.tick_period(FACE_TICK_PERIOD),
    )
    .with_overlap_policy(args.common.overlap_policy())
    .with_meter(Arc::clone(&meter))
    .spawn(gate.clone());
    spawn_meter_logger(meter, cancel.clone());

    // Open the camera once the models are there. A failed load keeps the
    // loading page up until shutdown.
    let capture = {
        let feed = Arc::clone(&feed);
        let device = args.common.device.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let loaded = tokio::select! {
                result = loader => result,
                _ = cancel.cancelled() => return None,
            };
            match loaded {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::error!("Failed to load face models: {err:#}");
                    return None;
                }
                Err(err) => {
                    log::error!("Face model loader task failed: {err}");
                    return None;
                }
            }

            start_capture_source(
                move || open_webcam(&device, CaptureConstraints::video(width, height)),
                feed,
                stream_playing,
                cancel,
            )
            .await
        })
    };

    // The face page has no label panel
    let (_labels_tx, labels) = watch::channel(LabelSummary::default());
    let state = Arc::new(AppState {
        kind: PageKind::Faces,
        feed,
        canvas,
        labels,
        readiness: Arc::new(gate),
        loop_state: detection_loop.subscribe(),
    });
    let address = args.common.server_address.clone();
    let served = serve(state, &address, cancel.clone()).await;
    if served.is_err() {
        cancel.cancel();
    }

    detection_loop.teardown().await;
    if let Some(capture) = capture.await? {
        capture.await?;
    }

    served
}
