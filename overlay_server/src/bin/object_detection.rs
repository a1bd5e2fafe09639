//! Object detection overlay binary.
//!
use std::sync::Arc;

use anyhow::Result;
use cam_capture::{sensors::open_webcam, CameraFeed, CaptureConstraints};
use clap::Parser;
use env_logger::TimestampPrecision;
use overlay_server::{
    canvas::{load_font_or_warn, OverlayCanvas},
    config::{ObjectArgs, OBJECT_TICK_PERIOD},
    detection_loop::DetectionLoop,
    endpoints::{serve, AppState},
    meter::{spawn_meter_logger, Meter},
    model_loader::spawn_model_loader,
    nn::SsdMobilenet,
    overlay::{shared_canvas, ObjectOverlay},
    pipeline::{cancel_on_ctrl_c, run_until_shutdown, start_capture_source},
    readiness::readiness,
    ui::PageKind,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ObjectArgs::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (slot, stream_playing, gate) = readiness::<SsdMobilenet>();

    let source = args.model_source();
    let min_score = args.min_score;
    let loader = spawn_model_loader(
        async move {
            let path = source.resolve(&Client::new()).await?;
            let model =
                tokio::task::spawn_blocking(move || SsdMobilenet::load(&path, min_score)).await??;
            Ok::<_, anyhow::Error>(model)
        },
        slot,
    );

    let feed = Arc::new(CameraFeed::new());
    let device = args.common.device.clone();
    let constraints = CaptureConstraints::video(args.width, args.height);
    let capture = start_capture_source(
        move || open_webcam(&device, constraints),
        Arc::clone(&feed),
        stream_playing,
        cancel.clone(),
    )
    .await;

    let font = load_font_or_warn(&args.common.font);
    let canvas = shared_canvas(OverlayCanvas::new(args.width, args.height).with_font(font));
    let overlay = Arc::new(ObjectOverlay::new(Arc::clone(&canvas)));
    let labels = overlay.subscribe_labels();

    let meter = Arc::new(Meter::new());
    let detection_loop = DetectionLoop::new(
        Arc::clone(&feed),
        overlay,
        args.common.tick_period(OBJECT_TICK_PERIOD),
    )
    .with_overlap_policy(args.common.overlap_policy())
    .with_meter(Arc::clone(&meter))
    .spawn(gate.clone());
    spawn_meter_logger(meter, cancel.clone());

    let state = Arc::new(AppState {
        kind: PageKind::Objects,
        feed,
        canvas,
        labels,
        readiness: Arc::new(gate),
        loop_state: detection_loop.subscribe(),
    });
    let server = {
        let address = args.common.server_address.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { serve(state, &address, cancel).await })
    };

    // A model that fails to load takes the whole pipeline down
    run_until_shutdown(server, loader, cancel, detection_loop, capture).await
}
