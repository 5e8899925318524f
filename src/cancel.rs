//! Interrupt flag shared between the watchdog and a running command
//! Every wait loop checks it, so an interrupted command stops at its next poll.

use crate::error::ScripterError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn checkpoint(&self) -> Result<(), ScripterError> {
        if self.is_cancelled() {
            Err(ScripterError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let flag = CancelFlag::new();
        let worker_view = flag.clone();
        assert!(worker_view.checkpoint().is_ok());

        flag.cancel();
        assert!(worker_view.is_cancelled());
        assert!(matches!(worker_view.checkpoint(), Err(ScripterError::Cancelled)));
    }
}
