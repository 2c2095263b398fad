// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Jetwerk printer controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length (in characters) of print content accepted by the command API.
pub const MAX_CONTENT_LEN: usize = 1000;

/// Maximum print count accepted by the command API.
pub const MAX_PRINT_COUNT: u32 = 1000;

/// Jet state byte meaning "jet off".
pub const JET_OFF_CODE: u8 = 0x03;

/// Print state byte meaning "printing".
pub const PRINTING_CODE: u8 = 0x04;

/// Print state byte meaning "paused".
pub const PAUSED_CODE: u8 = 0x02;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection and activity status of the printer as seen by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrinterStatus {
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    Connected,
    Idle,
    Printing,
    /// Connect failure or a non-zero device error mask.
    Error,
}

impl PrinterStatus {
    /// Whether a print job may be submitted in this status.
    pub fn can_print(&self) -> bool {
        matches!(self, Self::Connected | Self::Idle | Self::Printing)
    }

    /// Whether the model believes a live link exists.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Connected | Self::Idle | Self::Printing)
    }
}

impl std::fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Idle => "Idle",
            Self::Printing => "Printing",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Device telemetry decoded from a status reply.
///
/// The boolean flags are always derived from the raw bytes; build values
/// through [`DeviceStatus::from_telemetry`] or [`DeviceStatus::unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub jet_state: u8,
    pub print_state: u8,
    pub error_mask: u32,
    pub jet_on: bool,
    pub printing: bool,
    pub paused: bool,
    /// `false` for the zeroed fallback returned when polling failed.
    pub reported: bool,
}

impl DeviceStatus {
    pub fn from_telemetry(jet_state: u8, print_state: u8, error_mask: u32) -> Self {
        Self {
            jet_state,
            print_state,
            error_mask,
            jet_on: jet_state != JET_OFF_CODE,
            printing: print_state == PRINTING_CODE,
            paused: print_state == PAUSED_CODE,
            reported: true,
        }
    }

    /// Zeroed status used when the device did not answer a poll.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Human-readable summary, e.g. `Jet=0x01 Print=0x04 ErrMask=0x00000000`.
    pub fn summary(&self) -> String {
        format!(
            "Jet=0x{:02X} Print=0x{:02X} ErrMask=0x{:08X}",
            self.jet_state, self.print_state, self.error_mask
        )
    }
}

/// Full snapshot of the printer state handed to readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterState {
    pub status: PrinterStatus,
    pub jet_on: bool,
    pub printing: bool,
    pub printed_count: u32,
    pub target_count: u32,
    pub job_id: Option<JobId>,
    pub error_message: String,
    pub status_text: String,
}

impl PrinterState {
    pub fn can_print(&self) -> bool {
        self.status.can_print()
    }
}

/// A user-issued command, consumed exactly once by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Connect { ip: String },
    Disconnect,
    StartPrint { content: String, count: u32 },
    StopPrint,
    SetCount { count: u32 },
    StartJet,
    StopJet,
}

impl Request {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "Connect",
            Self::Disconnect => "Disconnect",
            Self::StartPrint { .. } => "StartPrint",
            Self::StopPrint => "StopPrint",
            Self::SetCount { .. } => "SetCount",
            Self::StartJet => "StartJet",
            Self::StopJet => "StopJet",
        }
    }
}

/// Last successfully connected endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub ip: String,
    pub port: u16,
}

/// Point-in-time view of the auto-reconnect bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectState {
    pub auto_reconnect_enabled: bool,
    pub attempts: u32,
    pub max_attempts: u32,
}

/// The job currently loaded on the printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub content: String,
    pub target_count: u32,
    pub printed_count: u32,
    pub started_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(content: impl Into<String>, target_count: u32) -> Self {
        Self {
            id: JobId::new(),
            content: content.into(),
            target_count,
            printed_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.target_count > 0 && self.printed_count >= self.target_count
    }
}

/// A print job waiting for the jet to come up before it can be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingJob {
    pub content: String,
    pub count: u32,
    pub jet_failures: u32,
}

/// Severity of a log event sent to the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => f.write_str("INFO"),
            Self::Warning => f.write_str("WARN"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}
