//! Sensors module.
//!
//! Opens a V4L2 webcam with rscam and negotiates an MJPG capture mode close to
//! the requested [`CaptureConstraints`].
use image::ImageFormat;
use rscam::{Camera, Config};
use simple_error::{simple_error, SimpleError};

use crate::{error::CameraAccessError, feed::CaptureConstraints, CaptureFn};

const MJPG: &[u8] = b"MJPG";

/// Get a capture function to a video device on a Linux machine.
///
/// The requested resolution is used if the device offers it, otherwise the
/// maximum supported resolution. The frame rate is the maximum the device
/// supports at that resolution.
pub fn open_webcam(
    device_name: &str,
    constraints: CaptureConstraints,
) -> Result<CaptureFn, CameraAccessError> {
    let mut cam = Camera::new(device_name).map_err(|source| CameraAccessError::Open {
        device: device_name.to_owned(),
        source,
    })?;
    log_supported_formats(&cam);

    log::info!("Using camera {}", device_name);

    let negotiate = |source| CameraAccessError::Negotiate {
        device: device_name.to_owned(),
        source,
    };
    let resolution = select_resolution(&cam, MJPG, constraints).map_err(negotiate)?;
    let frame_rate = get_max_frame_rate(&cam, MJPG, resolution).map_err(negotiate)?;
    log::info!(
        "Capturing {}x{} at interval {}/{} s",
        resolution.0,
        resolution.1,
        frame_rate.0,
        frame_rate.1
    );

    cam.start(&Config {
        interval: frame_rate,
        resolution,
        format: MJPG,
        ..Default::default()
    })
    .map_err(|err| CameraAccessError::Start {
        device: device_name.to_owned(),
        reason: err.to_string(),
    })?;

    let callback = move || {
        let frame = match cam.capture() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Capture failed: {err}");
                return None;
            }
        };
        match image::load_from_memory_with_format(&frame[..], ImageFormat::Jpeg) {
            Ok(decoded) => Some(decoded.to_rgb8()),
            Err(err) => {
                log::warn!("Dropping undecodable frame ({} bytes): {err}", frame.len());
                None
            }
        }
    };
    Ok(Box::new(callback))
}

/// Use the requested resolution when supported, else the largest one.
fn select_resolution(
    cam: &Camera,
    format: &[u8],
    constraints: CaptureConstraints,
) -> Result<(u32, u32), SimpleError> {
    let requested = (constraints.width, constraints.height);
    let resolution_info = cam
        .resolutions(format)
        .map_err(|err| SimpleError::with("failed to query resolutions", err))?;
    let supported = match &resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions.contains(&requested),
        rscam::ResolutionInfo::Stepwise { min, max, step: _ } => {
            (min.0..=max.0).contains(&requested.0) && (min.1..=max.1).contains(&requested.1)
        }
    };
    if supported {
        return Ok(requested);
    }

    let fallback = get_max_resolution(cam, format)?;
    log::warn!(
        "Requested resolution {}x{} not supported, falling back to {}x{}",
        requested.0,
        requested.1,
        fallback.0,
        fallback.1
    );
    Ok(fallback)
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32), SimpleError> {
    let resolution_info = cam
        .resolutions(format)
        .map_err(|err| SimpleError::with("failed to query resolutions", err))?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .iter()
            // Map to iterator over ((width, height) num_pixels)
            .map(|res| (res, res.0 * res.1))
            // Get the highest resolution in terms of number of pixels
            .max_by(|a, b| a.1.cmp(&b.1))
            // Extract width and height values
            .map(|res| *res.0),
        rscam::ResolutionInfo::Stepwise {
            min: _,
            max,
            step: _,
        } => Some(max),
    }
    .ok_or_else(|| simple_error!("No resolution found"))
}

/// Get the maximum supported frame rate for the given format and resolution.
fn get_max_frame_rate(
    cam: &Camera,
    format: &[u8],
    resolution: (u32, u32),
) -> Result<(u32, u32), SimpleError> {
    let interval_info = cam
        .intervals(format, resolution)
        .map_err(|err| SimpleError::with("failed to query frame rates", err))?;
    log::debug!("Found frame rates: {:?}", &interval_info);
    match interval_info {
        rscam::IntervalInfo::Discretes(frame_rates) => frame_rates
            .iter()
            // Intervals are seconds per frame as (numerator, denominator)
            .map(|(numerator, denominator)| ((numerator, denominator), denominator / numerator))
            // Get the highest frame rate
            .max_by(|a, b| a.1.cmp(&b.1))
            // Extract numerator and denominator
            .map(|((&n, &d), _)| (n, d)),
        rscam::IntervalInfo::Stepwise {
            min,
            max: _,
            step: _,
        } => Some(min),
    }
    .ok_or_else(|| simple_error!("No frame rate found"))
}

fn log_supported_formats(cam: &Camera) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        String::from_utf8_lossy(MJPG)
    );
}
