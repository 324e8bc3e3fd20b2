//! Partitioned fixed-window counters

use super::{LimiterPolicy, Rejection};
use crate::config::{FixedWindowConfig, MAX_DURATION_SECS};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Pruning of expired partitions starts once the map holds this many keys
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window limiter keyed by an arbitrary partition string.
///
/// A partition's window opens with its first request and lasts `window`.
/// A request arriving exactly at `reset_at` opens the next window.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    policy: LimiterPolicy,
    permit_limit: u32,
    window: TimeDelta,
    partitions: Mutex<HashMap<String, WindowState>>,
}

impl FixedWindowLimiter {
    /// Windows outside `1..=MAX_DURATION_SECS` are clamped into that range;
    /// `Config::validate` rejects them before startup.
    pub fn new(policy: LimiterPolicy, config: FixedWindowConfig) -> Self {
        let window = config.window().unwrap_or_else(|| {
            let secs = if config.window_secs == 0 { 1 } else { MAX_DURATION_SECS };
            TimeDelta::seconds(secs)
        });
        Self {
            policy,
            permit_limit: config.permit_limit,
            window,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> LimiterPolicy {
        self.policy
    }

    /// Take one permit from `key`'s current window.
    ///
    /// Rejections do not count against the window.
    pub fn try_acquire(&self, key: &str, now: DateTime<Utc>) -> Result<(), Rejection> {
        let mut partitions = self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let reset_at = now
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let state = partitions
            .entry(key.to_string())
            .or_insert(WindowState { count: 0, reset_at });
        if now >= state.reset_at {
            *state = WindowState { count: 0, reset_at };
        }

        if state.count >= self.permit_limit {
            let retry_after = (state.reset_at - now).to_std().unwrap_or_default();
            return Err(Rejection::Throttled {
                policy: self.policy,
                retry_after,
            });
        }
        state.count += 1;

        if partitions.len() > PRUNE_THRESHOLD {
            partitions.retain(|_, s| s.reset_at > now);
        }
        Ok(())
    }

    /// Hand one permit back to `key`'s current window.
    /// A no-op once that window has closed.
    pub fn release(&self, key: &str, now: DateTime<Utc>) {
        let mut partitions = self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = partitions.get_mut(key) {
            if now < state.reset_at {
                state.count = state.count.saturating_sub(1);
            }
        }
    }

    /// Permits left in `key`'s current window
    pub fn remaining(&self, key: &str, now: DateTime<Utc>) -> u32 {
        let partitions = self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match partitions.get(key) {
            Some(state) if now < state.reset_at => self.permit_limit.saturating_sub(state.count),
            _ => self.permit_limit,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
