// device -> host copies that are waited on later
use std::sync::mpsc;

use crate::error::FluidError;

/// A readback that has been issued but not waited on yet.
pub struct PendingRead {
    rx: mpsc::Receiver<Vec<f32>>,
}

impl PendingRead {
    /// Returns the handle and the sender the copy is delivered through.
    pub fn channel() -> (mpsc::Sender<Vec<f32>>, PendingRead) {
        let (tx, rx) = mpsc::channel();
        (tx, PendingRead { rx })
    }

    /// Blocks until the copy has landed.
    pub fn wait(self) -> Result<Vec<f32>, FluidError> {
        self.rx.recv().map_err(|_| FluidError::ReadbackDisconnected)
    }
}

/// Largest value of a readback, `None` for an empty one. A NaN anywhere makes
/// the result NaN, so no comparison against it can pass.
pub fn max_value(values: &[f32]) -> Option<f32> {
    values
        .iter()
        .copied()
        .reduce(|a, b| if a.is_nan() || b.is_nan() { f32::NAN } else { a.max(b) })
}
