//! Readiness gate of the detection loop.
//!
//! Two independent signals have to hold before a pipeline may start detecting:
//! the model is loaded ([`ModelSlot`]) and the camera stream is playing
//! ([`ReadinessFlag`]). Both start unset, are set at most once and never reset.
//! The [`ReadinessGate`] observes both and opens once the last of them is set,
//! no matter in which order that happens.
use std::sync::Arc;

use tokio::sync::watch;

/// One-way boolean signal.
#[derive(Clone)]
pub struct ReadinessFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadinessFlag {
    /// Set the flag. Returns `true` if this call flipped it.
    pub fn set(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receives the loaded model exactly once.
pub struct ModelSlot<M> {
    tx: watch::Sender<Option<Arc<M>>>,
}

impl<M> ModelSlot<M> {
    /// Publish the loaded model. A second call is ignored and returns `false`.
    pub fn fill(&self, model: M) -> bool {
        let mut model = Some(Arc::new(model));
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = model.take();
                true
            }
        })
    }

    pub fn is_filled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Observes model and stream readiness.
pub struct ReadinessGate<M> {
    model: watch::Receiver<Option<Arc<M>>>,
    stream: watch::Receiver<bool>,
}

impl<M> Clone for ReadinessGate<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            stream: self.stream.clone(),
        }
    }
}

impl<M> ReadinessGate<M> {
    pub fn model_loaded(&self) -> bool {
        self.model.borrow().is_some()
    }

    pub fn stream_playing(&self) -> bool {
        *self.stream.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.model_loaded() && self.stream_playing()
    }

    /// Wait until both signals are set and hand out the model.
    ///
    /// Returns `None` if a signal's owner went away without setting it; the gate
    /// then never opens.
    pub async fn opened(&mut self) -> Option<Arc<M>> {
        let model = {
            let slot = self.model.wait_for(Option::is_some).await.ok()?;
            (*slot).clone()?
        };
        self.stream.wait_for(|playing| *playing).await.ok()?;
        Some(model)
    }
}

/// Readiness as reported to the browser, independent of the model type.
pub trait ReadinessStatus: Send + Sync {
    fn model_loaded(&self) -> bool;

    fn stream_playing(&self) -> bool;
}

impl<M: Send + Sync> ReadinessStatus for ReadinessGate<M> {
    fn model_loaded(&self) -> bool {
        ReadinessGate::model_loaded(self)
    }

    fn stream_playing(&self) -> bool {
        ReadinessGate::stream_playing(self)
    }
}

/// Create the two signals of one pipeline and the gate observing them.
pub fn readiness<M>() -> (ModelSlot<M>, ReadinessFlag, ReadinessGate<M>) {
    let (model_tx, model_rx) = watch::channel(None);
    let (stream_tx, stream_rx) = watch::channel(false);
    (
        ModelSlot { tx: model_tx },
        ReadinessFlag {
            tx: Arc::new(stream_tx),
        },
        ReadinessGate {
            model: model_rx,
            stream: stream_rx,
        },
    )
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_flag_flips_once() {
        let (_slot, flag, gate) = readiness::<()>();
        assert!(!gate.stream_playing());
        assert!(flag.set());
        assert!(!flag.set());
        assert!(flag.is_set());
        assert!(gate.stream_playing());
    }

    #[test]
    fn test_slot_keeps_first_model() {
        let (slot, _flag, gate) = readiness::<u32>();
        assert!(slot.fill(1));
        assert!(!slot.fill(2));
        assert!(gate.model_loaded());
        assert_eq!(gate.model.borrow().as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn test_gate_opens_with_model_first() {
        let (slot, flag, mut gate) = readiness::<&str>();
        slot.fill("model");
        assert!(!gate.is_open());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.set();
        });
        assert_eq!(gate.opened().await.as_deref(), Some(&"model"));
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn test_gate_opens_with_stream_first() {
        let (slot, flag, mut gate) = readiness::<&str>();
        flag.set();
        assert!(!gate.is_open());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            slot.fill("model");
        });
        assert_eq!(gate.opened().await.as_deref(), Some(&"model"));
    }

    #[tokio::test]
    async fn test_gate_stays_closed_when_model_never_loads() {
        let (slot, flag, mut gate) = readiness::<&str>();
        flag.set();
        drop(slot);
        assert!(gate.opened().await.is_none());
        assert!(!gate.model_loaded());
    }

    #[tokio::test]
    async fn test_gate_stays_closed_when_stream_never_plays() {
        let (slot, flag, mut gate) = readiness::<&str>();
        slot.fill("model");
        drop(flag);
        assert!(gate.opened().await.is_none());
    }
}
