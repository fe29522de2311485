//! Shared daemon health state.
//!
//! # States
//! - Down: the last snapshot could not be applied
//! - Up: the last snapshot was applied
//! - Retrying: a store operation failed and is being retried
//! - Failed: a store operation exhausted its retries
//!
//! # Design Decisions
//! - Single writer (the snapshot consumer), many readers (reporters)
//! - Stored in an atomic so readers never observe a torn or stale-cached value
//! - Externally published as 1 (Up) or 0 (anything else)

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Down = 0,
    Up = 1,
    Retrying = 2,
    Failed = 3,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Up,
            2 => HealthState::Retrying,
            3 => HealthState::Failed,
            _ => HealthState::Down,
        }
    }
}

impl HealthState {
    /// Value published to graphite.
    pub fn as_metric(self) -> u8 {
        u8::from(self == HealthState::Up)
    }
}

/// Cloneable handle to one health value.
#[derive(Debug, Clone)]
pub struct HealthFlag {
    state: Arc<AtomicU8>,
}

impl HealthFlag {
    pub fn new(initial: HealthState) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(initial as u8)),
        }
    }

    pub fn get(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    /// Store a new state, returning the previous one.
    pub fn set(&self, state: HealthState) -> HealthState {
        let prev = HealthState::from(self.state.swap(state as u8, Ordering::AcqRel));
        if prev != state {
            tracing::info!(from = ?prev, to = ?state, "Health changed");
        }
        prev
    }

    pub fn mark_up(&self) {
        self.set(HealthState::Up);
    }

    pub fn mark_down(&self) {
        self.set(HealthState::Down);
    }

    pub fn is_up(&self) -> bool {
        self.get() == HealthState::Up
    }
}

impl Default for HealthFlag {
    fn default() -> Self {
        Self::new(HealthState::Down)
    }
}
