//! Scoped in-flight flags.
//!
//! A controller raises its flag by acquiring an [`InFlight`] guard before a remote call;
//! dropping the guard lowers the flag and zeroes any attached progress counter, on every
//! exit path including early returns and unwinding.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    #[cfg(test)]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn acquire(&self) -> InFlight {
        self.0.store(true, Ordering::Release);
        InFlight {
            busy: self.0.clone(),
            progress: None,
        }
    }
}

/// Percentage in `0..=100`, shared with the transport's progress callbacks.
#[derive(Debug, Clone, Default)]
pub struct Percent(Arc<AtomicU8>);

impl Percent {
    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, value: u8) {
        self.0.store(value.min(100), Ordering::Release);
    }
}

#[must_use = "the flag is lowered as soon as the guard is dropped"]
pub struct InFlight {
    busy: Arc<AtomicBool>,
    progress: Option<Percent>,
}

impl InFlight {
    /// Also zero `progress` now and when the guard is released.
    pub fn with_progress(mut self, progress: &Percent) -> Self {
        progress.set(0);
        self.progress = Some(progress.clone());
        self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(p) = &self.progress {
            p.set(0);
        }
        self.busy.store(false, Ordering::Release);
    }
}
