use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DataError;

/// Owner side of a cancellation token.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    flag: Arc<AtomicBool>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            flag: Arc::clone(&self.flag),
        }
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Observer side of a cancellation token, passed to every async entry point.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Checkpoint: `Err(DataError::Aborted)` once the controller has fired.
    pub fn check(&self) -> Result<(), DataError> {
        if self.is_aborted() {
            Err(DataError::Aborted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_follows_controller() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let copy = signal.clone();
        assert!(signal.check().is_ok());
        controller.abort();
        assert!(signal.is_aborted());
        assert!(copy.check().unwrap_err().is_aborted());
    }

    #[test]
    fn test_never_signal() {
        assert!(!AbortSignal::never().is_aborted());
    }
}
