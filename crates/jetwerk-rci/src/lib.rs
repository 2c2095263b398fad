// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Jetwerk RCI: frame codec, TCP transport, device client and the controller
// worker that drives an inkjet printer over the RCI protocol. Builds on the
// domain types and errors from `jetwerk-core`.

use std::any::Any;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cleanup;
pub mod client;
pub mod codec;
pub mod controller;
pub mod events;
pub mod model;
pub mod reconnect;
pub mod request_queue;
pub mod transport;

#[cfg(test)]
mod mock;

pub use client::DeviceClient;
pub use controller::{Controller, Step, Worker};
pub use events::{ChannelSink, ControllerEvent, EventSink, LogMessage};
pub use transport::{TcpTransport, Transport};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
