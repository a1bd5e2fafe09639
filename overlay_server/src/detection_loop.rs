//! Interval-driven detect-and-render loop.
//!
//! A [`DetectionLoop`] sits in [`LoopState::Idle`] until its
//! [`ReadinessGate`] opens, then creates its interval timer and moves to
//! [`LoopState::Armed`]. Every tick pulls the current frame from the
//! [`FrameSource`]; without a frame the tick is skipped silently, otherwise the
//! [`Detector`] runs on the blocking pool ([`LoopState::Detecting`]) and its
//! output goes to the [`Presenter`].
//!
//! Ticks are not serialized against each other unless
//! [`OverlapPolicy::SkipIfBusy`] is selected: with slow inference several
//! detections may be in flight and finish out of order. Overlaps are counted
//! by the [`Meter`].
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use cam_capture::{FrameSource, VideoFrame};
use image::RgbImage;
use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{meter::Meter, readiness::ReadinessGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// Waiting for model and stream readiness, no timer registered.
    Idle,
    /// Timer registered, no detection in flight.
    Armed,
    /// At least one detection in flight.
    Detecting,
    /// Torn down, no further ticks.
    Stopped,
}

/// What to do when a tick fires while a detection is still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Start another detection anyway.
    #[default]
    Allow,
    /// Skip the tick.
    SkipIfBusy,
}

/// A loaded inference model.
pub trait Detector: Send + Sync + 'static {
    type Output: Send + 'static;

    fn detect(&self, frame: &RgbImage) -> Result<Self::Output>;
}

/// Consumes detection results, e.g. by drawing them onto the overlay.
pub trait Presenter<T>: Send + Sync + 'static {
    fn present(&self, frame: &VideoFrame, output: T);

    fn detection_failed(&self, err: &anyhow::Error) {
        log::error!("Detection failed: {err:#}");
    }
}

pub struct DetectionLoop<S, P> {
    source: Arc<S>,
    presenter: Arc<P>,
    period: Duration,
    overlap: OverlapPolicy,
    meter: Arc<Meter>,
}

impl<S: FrameSource, P> DetectionLoop<S, P> {
    pub fn new(source: Arc<S>, presenter: Arc<P>, period: Duration) -> Self {
        Self {
            source,
            presenter,
            period,
            overlap: OverlapPolicy::default(),
            meter: Arc::new(Meter::new()),
        }
    }

    pub fn with_overlap_policy(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_meter(mut self, meter: Arc<Meter>) -> Self {
        self.meter = meter;
        self
    }

    /// Spawn the scheduler task. The loop runs until the handle is torn down
    /// or dropped.
    pub fn spawn<D>(self, gate: ReadinessGate<D>) -> LoopHandle
    where
        D: Detector,
        P: Presenter<D::Output>,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);
        let task = tokio::spawn(self.run(gate, Arc::new(state_tx), cancel.clone()));

        LoopHandle {
            cancel,
            task,
            state: state_rx,
        }
    }

    async fn run<D>(
        self,
        mut gate: ReadinessGate<D>,
        state: Arc<watch::Sender<LoopState>>,
        cancel: CancellationToken,
    ) where
        D: Detector,
        P: Presenter<D::Output>,
    {
        let model = tokio::select! {
            _ = cancel.cancelled() => {
                state.send_replace(LoopState::Stopped);
                return;
            }
            model = gate.opened() => model,
        };

        let Some(model) = model else {
            log::warn!("Readiness gate closed before opening, detection loop stays idle");
            cancel.cancelled().await;
            state.send_replace(LoopState::Stopped);
            return;
        };

        state.send_replace(LoopState::Armed);
        log::info!("Detection loop armed, ticking every {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let in_flight = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.on_tick(&model, &in_flight, &state),
            }
        }

        state.send_replace(LoopState::Stopped);
        log::info!("Detection loop stopped");
    }

    fn on_tick<D>(
        &self,
        model: &Arc<D>,
        in_flight: &Arc<AtomicUsize>,
        state: &Arc<watch::Sender<LoopState>>,
    ) where
        D: Detector,
        P: Presenter<D::Output>,
    {
        self.meter.tick();

        let Some(frame) = self.source.current_frame() else {
            self.meter.tick_skipped();
            return;
        };

        let busy = in_flight.load(Ordering::Acquire);
        if busy > 0 {
            if self.overlap == OverlapPolicy::SkipIfBusy {
                self.meter.tick_busy();
                return;
            }
            self.meter.tick_overlapping();
            log::debug!("Tick overlaps {busy} in-flight detections");
        }

        in_flight.fetch_add(1, Ordering::AcqRel);
        state.send_if_modified(|current| transition(current, LoopState::Armed, LoopState::Detecting));

        let model = Arc::clone(model);
        let presenter = Arc::clone(&self.presenter);
        let meter = Arc::clone(&self.meter);
        let in_flight = Arc::clone(in_flight);
        let state = Arc::clone(state);

        tokio::spawn(async move {
            let detect_frame = Arc::clone(&frame);
            let result =
                tokio::task::spawn_blocking(move || model.detect(&detect_frame.image)).await;

            match result {
                Ok(Ok(output)) => {
                    presenter.present(&frame, output);
                    meter.tick_rendered();
                }
                Ok(Err(err)) => {
                    meter.tick_failed();
                    presenter.detection_failed(&err);
                }
                Err(err) => {
                    meter.tick_failed();
                    log::error!("Detection task failed: {err}");
                }
            }

            if in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                state.send_if_modified(|current| {
                    transition(current, LoopState::Detecting, LoopState::Armed)
                });
            }
        });
    }
}

fn transition(current: &mut LoopState, from: LoopState, to: LoopState) -> bool {
    if *current == from {
        *current = to;
        true
    } else {
        false
    }
}

/// Owner of a running detection loop.
///
/// Dropping the handle stops future ticks as well.
pub struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    state: watch::Receiver<LoopState>,
}

impl LoopHandle {
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// Cancel the timer and wait for the scheduler to exit.
    ///
    /// Detections already in flight are not cancelled and may still present
    /// their result afterwards.
    pub async fn teardown(mut self) {
        self.cancel.cancel();
        if let Err(err) = (&mut self.task).await {
            log::error!("Detection loop task failed: {err}");
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
