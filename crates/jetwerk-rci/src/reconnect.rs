// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Auto-reconnect bookkeeping.
//
// After an unexpected disconnect the worker retries the last good address a
// bounded number of times. A manual connect suspends the policy while it is
// in flight so the worker does not queue a competing attempt, and any
// successful connect resets the counter.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{debug, info};

use jetwerk_core::types::ReconnectState;

pub struct ReconnectPolicy {
    /// Operator switch.
    enabled: AtomicBool,
    /// Set while a manual connect is running.
    suspended: AtomicBool,
    attempts: AtomicU32,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(enabled: bool, max_attempts: u32) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            suspended: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            max_attempts,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "auto-reconnect switched");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && !self.suspended.load(Ordering::SeqCst)
    }

    /// Hold off automatic attempts while a manual connect runs.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        let previous = self.attempts.swap(0, Ordering::SeqCst);
        if previous > 0 {
            debug!(previous, "reconnect attempts reset");
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts() >= self.max_attempts
    }

    /// Claim the next attempt. Returns its 1-based number, or `None` once
    /// the ceiling is reached.
    pub fn try_begin_attempt(&self) -> Option<u32> {
        self.attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_attempts).then_some(n + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    pub fn snapshot(&self) -> ReconnectState {
        ReconnectState {
            auto_reconnect_enabled: self.is_enabled(),
            attempts: self.attempts(),
            max_attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_stop_at_ceiling() {
        let p = ReconnectPolicy::new(true, 3);
        assert_eq!(p.try_begin_attempt(), Some(1));
        assert_eq!(p.try_begin_attempt(), Some(2));
        assert_eq!(p.try_begin_attempt(), Some(3));
        assert_eq!(p.try_begin_attempt(), None);
        assert!(p.is_exhausted());

        p.reset();
        assert_eq!(p.try_begin_attempt(), Some(1));
    }

    #[test]
    fn suspend_masks_enabled_switch() {
        let p = ReconnectPolicy::new(true, 5);
        p.suspend();
        assert!(!p.is_enabled());
        p.resume();
        assert!(p.is_enabled());
    }

    #[test]
    fn resume_does_not_override_operator_switch() {
        let p = ReconnectPolicy::new(false, 5);
        p.suspend();
        p.resume();
        assert!(!p.is_enabled());
        p.set_enabled(true);
        assert!(p.is_enabled());
    }

    #[test]
    fn snapshot_reflects_counters() {
        let p = ReconnectPolicy::new(true, 2);
        p.try_begin_attempt();
        assert_eq!(
            p.snapshot(),
            ReconnectState {
                auto_reconnect_enabled: true,
                attempts: 1,
                max_attempts: 2,
            }
        );
    }
}
