//! Webcam detection overlay.
//!
//! Two pipelines share this library: generic object detection
//! (`object_detection` binary) and face analysis (`face_detection` binary).
//! Each opens a webcam, loads its models, runs a [`detection_loop`] once both
//! are ready and draws the results onto an overlay served to the browser.
pub mod canvas;
pub mod config;
pub mod detection_loop;
pub mod endpoints;
pub mod meter;
pub mod model_loader;
pub mod nn;
pub mod overlay;
pub mod pipeline;
pub mod readiness;
pub mod render;
pub mod ui;
