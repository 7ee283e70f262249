// Cooperative cancellation shared between the interrupt handler and workers

use crate::error::{Result, TgenError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable flag that asks every worker to stop at its next poll
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Return [`TgenError::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TgenError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Install a process-wide Ctrl-C handler that cancels this token.
    /// Can only be installed once per process.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if !token.is_cancelled() {
                tracing::warn!("Interrupted, terminating workers");
            }
            token.cancel();
        })
        .map_err(|e| TgenError::Other(anyhow::anyhow!("Failed to set interrupt handler: {}", e)))
    }
}
