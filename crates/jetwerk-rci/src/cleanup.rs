// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ordered teardown.
//
// Named cleanup tasks run last-registered-first. Each task runs at most once
// no matter how many paths (normal shutdown, emergency shutdown, drop) call
// into the stack, and a panicking task does not stop the ones after it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use tracing::{debug, error, info};

use crate::lock;

type Task = Box<dyn FnOnce() + Send>;

pub struct CleanupStack {
    name: String,
    tasks: Mutex<Vec<(String, Task)>>,
}

fn run_guarded(owner: &str, task_name: &str, task: Task) -> bool {
    debug!(owner, task = task_name, "cleaning up");
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                owner,
                task = task_name,
                reason = %crate::panic_message(payload.as_ref()),
                "cleanup task failed"
            );
            false
        }
    }
}

impl CleanupStack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, task_name: impl Into<String>, task: impl FnOnce() + Send + 'static) {
        let task_name = task_name.into();
        debug!(owner = %self.name, task = %task_name, "cleanup task registered");
        lock(&self.tasks).push((task_name, Box::new(task)));
    }

    /// Run every pending task in reverse registration order.
    ///
    /// Returns the number of tasks that completed without panicking.
    pub fn run_all(&self) -> usize {
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        if tasks.is_empty() {
            return 0;
        }
        info!(owner = %self.name, count = tasks.len(), "running cleanup");
        let ok = tasks
            .into_iter()
            .rev()
            .map(|(task_name, task)| run_guarded(&self.name, &task_name, task))
            .filter(|ok| *ok)
            .count();
        info!(owner = %self.name, ok, "cleanup completed");
        ok
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Forget every task without running it.
    pub fn clear_without_running(&self) -> usize {
        let dropped = std::mem::take(&mut *lock(&self.tasks)).len();
        if dropped > 0 {
            debug!(owner = %self.name, dropped, "cleanup tasks discarded");
        }
        dropped
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if self.pending_count() > 0 {
            debug!(owner = %self.name, "running cleanup from drop");
            self.run_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn runs_in_reverse_order() {
        let log = recorder();
        let stack = CleanupStack::new("test");
        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            stack.add(name, move || log.lock().unwrap().push(name));
        }

        assert_eq!(stack.run_all(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let log = recorder();
        let stack = CleanupStack::new("test");
        let l = Arc::clone(&log);
        stack.add("only", move || l.lock().unwrap().push("only"));

        assert_eq!(stack.run_all(), 1);
        assert_eq!(stack.run_all(), 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn panicking_task_does_not_stop_others() {
        let log = recorder();
        let stack = CleanupStack::new("test");
        let l = Arc::clone(&log);
        stack.add("survivor", move || l.lock().unwrap().push("survivor"));
        stack.add("boom", || panic!("cleanup exploded"));

        assert_eq!(stack.run_all(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn clear_without_running_skips_tasks() {
        let log = recorder();
        let stack = CleanupStack::new("test");
        let l = Arc::clone(&log);
        stack.add("skipped", move || l.lock().unwrap().push("skipped"));

        assert_eq!(stack.clear_without_running(), 1);
        assert_eq!(stack.pending_count(), 0);
        drop(stack);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn drop_runs_pending_tasks() {
        let log = recorder();
        {
            let stack = CleanupStack::new("test");
            let l = Arc::clone(&log);
            stack.add("on-drop", move || l.lock().unwrap().push("on-drop"));
        }
        assert_eq!(*log.lock().unwrap(), vec!["on-drop"]);
    }
}
