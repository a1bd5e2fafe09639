use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;

/// Tick counters of one detection loop.
#[derive(Default)]
pub struct Meter {
    ticks: AtomicU64,
    skipped: AtomicU64,
    busy: AtomicU64,
    overlapping: AtomicU64,
    rendered: AtomicU64,
    failed: AtomicU64,
}

/// Counter values taken (and reset) by [`Meter::take_snapshot`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MeterSnapshot {
    pub ticks: u64,
    /// Ticks without a live frame.
    pub skipped: u64,
    /// Ticks skipped because a detection was still in flight.
    pub busy: u64,
    pub overlapping: u64,
    pub rendered: u64,
    pub failed: u64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            ticks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            overlapping: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_busy(&self) {
        self.busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_overlapping(&self) {
        self.overlapping.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_rendered(&self) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn take_snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            ticks: self.ticks.swap(0, Ordering::Relaxed),
            skipped: self.skipped.swap(0, Ordering::Relaxed),
            busy: self.busy.swap(0, Ordering::Relaxed),
            overlapping: self.overlapping.swap(0, Ordering::Relaxed),
            rendered: self.rendered.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
        }
    }
}

pub fn spawn_meter_logger(meter: Arc<Meter>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = log_interval.tick() => {}
            }

            let snapshot = meter.take_snapshot();
            let elapsed = start.elapsed().as_secs_f32();

            if snapshot.ticks > 0 {
                log::info!(
                    "Ticks per second: {:.2}, rendered per second: {:.2}",
                    snapshot.ticks as f32 / elapsed,
                    snapshot.rendered as f32 / elapsed
                )
            }
            if snapshot.skipped > 0 {
                log::debug!("Skipped {} ticks without a live frame", snapshot.skipped)
            }
            if snapshot.busy > 0 {
                log::debug!(
                    "Skipped {} ticks while a detection was in flight",
                    snapshot.busy
                )
            }
            if snapshot.overlapping > 0 {
                log::warn!(
                    "{} ticks started while a previous detection was still in flight",
                    snapshot.overlapping
                )
            }
            if snapshot.failed > 0 {
                log::warn!("{} detections failed", snapshot.failed)
            }
        }
    })
}
