//! Pause/resume signal between background processing and priority requests.

use std::sync::Arc;
use tokio::sync::watch;

/// A gate that is open while no hold is outstanding.
///
/// Priority requests take a hold with [`Gate::close`]; background work calls
/// [`Gate::wait_open`] before starting each unit. Holds are counted, so with
/// several concurrent priority requests the gate reopens only after the last
/// one finishes.
#[derive(Debug, Clone)]
pub struct Gate {
    holds: Arc<watch::Sender<usize>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Created open.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { holds: Arc::new(tx) }
    }

    pub fn is_open(&self) -> bool {
        *self.holds.borrow() == 0
    }

    pub fn holds(&self) -> usize {
        *self.holds.borrow()
    }

    /// Close the gate until the returned hold is dropped.
    pub fn close(&self) -> GateHold {
        self.holds.send_modify(|n| *n += 1);
        GateHold { holds: self.holds.clone() }
    }

    /// Resolve once no hold is outstanding. Returns immediately when open.
    pub async fn wait_open(&self) {
        let mut rx = self.holds.subscribe();
        // the sender lives as long as `self`, so this cannot observe a closed channel
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Keeps its gate closed; reopens on drop, including unwinding and early returns.
#[derive(Debug)]
#[must_use = "the gate reopens as soon as the hold is dropped"]
pub struct GateHold {
    holds: Arc<watch::Sender<usize>>,
}

impl Drop for GateHold {
    fn drop(&mut self) {
        self.holds.send_modify(|n| *n = n.saturating_sub(1));
    }
}
