// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Controller → UI event channel.
//
// Delivery is fire-and-forget: a failed send is logged once and dropped, and
// sending never blocks the worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use jetwerk_core::error::{JetwerkError, Result};
use jetwerk_core::types::{PrinterState, Severity};

/// A log line destined for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    pub text: String,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

/// Everything the controller reports to its UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ControllerEvent {
    StateUpdate {
        state: PrinterState,
        status_text: String,
    },
    Log(LogMessage),
    ConnectionUpdate {
        connected: bool,
        ip: String,
        port: u16,
    },
}

/// Receiver side of the event channel, implemented by the UI layer.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ControllerEvent) -> Result<()>;
}

/// Sink backed by an unbounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ControllerEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| JetwerkError::EventDelivery("event receiver dropped".into()))
    }
}

/// Create a channel sink and the receiver the UI drains.
pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<ControllerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink::new(tx), rx)
}

/// Discards every event. Useful for headless tools and benches.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ControllerEvent) -> Result<()> {
        Ok(())
    }
}

/// Cloneable handle the controller and device client emit through.
///
/// Log events are mirrored into `tracing` at the matching level.
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn EventSink>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    fn deliver(&self, event: ControllerEvent) {
        if let Err(e) = self.sink.emit(event) {
            warn!(error = %e, "event delivery failed, dropping event");
        }
    }

    pub fn log(&self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        match severity {
            Severity::Info => info!(target: "jetwerk::events", "{text}"),
            Severity::Warning => warn!(target: "jetwerk::events", "{text}"),
            Severity::Error => error!(target: "jetwerk::events", "{text}"),
        }
        self.deliver(ControllerEvent::Log(LogMessage {
            text,
            severity,
            at: Utc::now(),
        }));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(Severity::Info, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.log(Severity::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(Severity::Error, text);
    }

    pub fn state(&self, state: PrinterState) {
        let status_text = state.status_text.clone();
        self.deliver(ControllerEvent::StateUpdate { state, status_text });
    }

    pub fn connection(&self, connected: bool, ip: impl Into<String>, port: u16) {
        self.deliver(ControllerEvent::ConnectionUpdate {
            connected,
            ip: ip.into(),
            port,
        });
    }
}
