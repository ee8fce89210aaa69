//! Shared download control flag
//!
//! One three-valued atomic is shared by the coordinator, every worker and
//! every in-flight HTTP call. Workers observe it between iterations, HTTP
//! body loops observe it between chunks; any transition away from `Running`
//! makes them unwind as soon as they can checkpoint their current range.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const RUNNING: u8 = 0;
const FAILED: u8 = 1;
const CANCELLED: u8 = 2;

/// Observable state of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    Running,
    Failed,
    Cancelled,
}

/// Cheaply cloneable handle to the download's shared state flag.
///
/// The first transition away from `Running` wins; later `fail`/`cancel`
/// calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct ControlFlag(Arc<AtomicU8>);

impl ControlFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> FlagState {
        match self.0.load(Ordering::Acquire) {
            FAILED => FlagState::Failed,
            CANCELLED => FlagState::Cancelled,
            _ => FlagState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) == RUNNING
    }

    /// Mark the download failed. No-op unless currently running.
    pub fn fail(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, FAILED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Mark the download cancelled. No-op unless currently running.
    pub fn cancel(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let flag = ControlFlag::new();
        assert!(flag.is_running());
        assert_eq!(flag.get(), FlagState::Running);
    }

    #[test]
    fn first_transition_wins() {
        let flag = ControlFlag::new();
        flag.cancel();
        flag.fail();
        assert_eq!(flag.get(), FlagState::Cancelled);
        assert!(!flag.is_running());
    }

    #[test]
    fn clones_share_state() {
        let flag = ControlFlag::new();
        let observer = flag.clone();
        flag.fail();
        assert_eq!(observer.get(), FlagState::Failed);
    }
}
