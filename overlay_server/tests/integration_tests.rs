use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use cam_capture::CameraFeed;
use common::{BBox, DetectionBatch, LabelSummary, ObjectDetection};
use image::RgbImage;
use overlay_server::{
    canvas::OverlayCanvas,
    detection_loop::{DetectionLoop, Detector, LoopState},
    endpoints::{router, AppState},
    model_loader::default_model_dir,
    nn::{FaceAnalyzer, FaceModelFiles, SsdMobilenet},
    overlay::{shared_canvas, ObjectOverlay},
    readiness::readiness,
    ui::PageKind,
};

struct FixedDetector(DetectionBatch);

impl Detector for FixedDetector {
    type Output = DetectionBatch;

    fn detect(&self, _frame: &RgbImage) -> anyhow::Result<DetectionBatch> {
        Ok(self.0.clone())
    }
}

fn person() -> DetectionBatch {
    DetectionBatch::new(vec![ObjectDetection::new(
        "person",
        0.9,
        BBox::new(10.0, 10.0, 30.0, 50.0),
    )])
}

async fn get_json(client: &reqwest::Client, url: String) -> anyhow::Result<serde_json::Value> {
    let body = client.get(url).send().await?.text().await?;
    Ok(serde_json::from_str(&body)?)
}

async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
        .serve(router(state).into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

#[tokio::test]
async fn test_object_pipeline_end_to_end() -> anyhow::Result<()> {
    let feed = Arc::new(CameraFeed::new());
    let canvas = shared_canvas(OverlayCanvas::new(64, 48));
    let overlay = Arc::new(ObjectOverlay::new(Arc::clone(&canvas)));
    let labels = overlay.subscribe_labels();
    let (slot, stream_playing, gate) = readiness();

    let detection_loop =
        DetectionLoop::new(Arc::clone(&feed), overlay, Duration::from_millis(5)).spawn(gate.clone());

    let state = Arc::new(AppState {
        kind: PageKind::Objects,
        feed: Arc::clone(&feed),
        canvas,
        labels,
        readiness: Arc::new(gate),
        loop_state: detection_loop.subscribe(),
    });
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();

    let page = client.get(format!("http://{addr}/")).send().await?.text().await?;
    assert!(page.contains("Loading AI Model..."));

    slot.fill(FixedDetector(person()));
    feed.publish(RgbImage::new(64, 48));
    stream_playing.set();

    let mut loop_state = detection_loop.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        loop_state.wait_for(|state| *state != LoopState::Idle),
    )
    .await??;

    let mut summary = serde_json::Value::Null;
    for _ in 0..100 {
        summary = get_json(&client, format!("http://{addr}/labels.json")).await?;
        if summary.as_array().map_or(false, |labels| !labels.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(summary, serde_json::json!(["person"]));

    let panel = client.get(format!("http://{addr}/labels")).send().await?.text().await?;
    assert!(panel.contains("person"));

    let status = get_json(&client, format!("http://{addr}/status")).await?;
    assert_eq!(status["model_loaded"], true);
    assert_eq!(status["stream_playing"], true);

    detection_loop.teardown().await;
    Ok(())
}

#[tokio::test]
async fn test_face_page_has_no_label_routes() -> anyhow::Result<()> {
    let (_slot, _flag, gate) = readiness::<FaceAnalyzer>();
    let (_labels_tx, labels) = tokio::sync::watch::channel(LabelSummary::default());
    let (_state_tx, loop_state) = tokio::sync::watch::channel(LoopState::Idle);
    let state = Arc::new(AppState {
        kind: PageKind::Faces,
        feed: Arc::new(CameraFeed::new()),
        canvas: shared_canvas(OverlayCanvas::new(640, 480)),
        labels,
        readiness: Arc::new(gate),
        loop_state,
    });
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{addr}/healthcheck"))
        .send()
        .await?;
    assert_eq!(health.text().await?, "healthy");

    let labels = client.get(format!("http://{addr}/labels")).send().await?;
    assert_eq!(labels.status(), reqwest::StatusCode::NOT_FOUND);

    Ok(())
}

fn model_file(name: &str) -> PathBuf {
    default_model_dir().join(name)
}

#[test]
#[ignore = "needs ssd_mobilenet_v1.onnx in the model cache"]
fn test_ssd_mobilenet_on_blank_frame() -> anyhow::Result<()> {
    let model = SsdMobilenet::load(&model_file("ssd_mobilenet_v1.onnx"), 0.6)?;
    let batch = model.detect(&RgbImage::new(1280, 720))?;
    assert!(batch.len() <= 20);
    Ok(())
}

#[test]
#[ignore = "needs the four face models in the model cache"]
fn test_face_analyzer_on_blank_frame() -> anyhow::Result<()> {
    let files = FaceModelFiles {
        detector: model_file("version-RFB-320.onnx"),
        landmarks: model_file("face_landmarks_68.onnx"),
        expressions: model_file("emotion-ferplus-8.onnx"),
        age_gender: model_file("genderage.onnx"),
    };
    let analyzer = FaceAnalyzer::load(&files, 0.5, 0.5)?;
    let faces = analyzer.detect(&RgbImage::new(640, 480))?;
    assert!(faces.is_empty());
    Ok(())
}
