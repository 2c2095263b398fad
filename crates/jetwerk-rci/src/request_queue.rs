// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// FIFO of user-issued requests, drained by the controller worker.
//
// Unbounded: producers are paced by a human at the UI.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use jetwerk_core::types::Request;

use crate::lock;

#[derive(Default)]
pub struct RequestQueue {
    items: Mutex<VecDeque<Request>>,
    ready: Condvar,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request and wake one waiter.
    pub fn push(&self, request: Request) {
        lock(&self.items).push_back(request);
        self.ready.notify_one();
    }

    /// Take the oldest request, waiting up to `timeout` for one to arrive.
    ///
    /// `None` after the timeout is the normal idle outcome.
    pub fn pop(&self, timeout: Duration) -> Option<Request> {
        let deadline = Instant::now() + timeout;
        let mut items = lock(&self.items);
        loop {
            if let Some(request) = items.pop_front() {
                return Some(request);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(items, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            items = guard;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// Drop all queued requests, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut items = lock(&self.items);
        let n = items.len();
        items.clear();
        n
    }
}
