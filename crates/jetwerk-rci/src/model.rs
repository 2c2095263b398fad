// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer state model.
//
// One mutex guards everything; readers get full copies, so a snapshot is
// never torn. Only the controller worker mutates it.

use std::sync::Mutex;

use jetwerk_core::human_errors::describe_error_mask;
use jetwerk_core::types::{
    ConnectionInfo, DeviceStatus, JobId, JobRecord, PendingJob, PrinterState, PrinterStatus,
};

use crate::lock;

/// Everything behind the model lock.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub state: PrinterState,
    pub job: Option<JobRecord>,
    pub pending: Option<PendingJob>,
    pub connection: Option<ConnectionInfo>,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub struct PrinterStateModel {
    data: Mutex<ModelData>,
}

impl PrinterStateModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PrinterState {
        lock(&self.data).state.clone()
    }

    pub fn status(&self) -> PrinterStatus {
        lock(&self.data).state.status
    }

    /// Run `f` with the model locked.
    pub fn update<R>(&self, f: impl FnOnce(&mut ModelData) -> R) -> R {
        f(&mut lock(&self.data))
    }

    pub fn set_status(&self, status: PrinterStatus, text: impl Into<String>) {
        let text = text.into();
        self.update(|d| {
            d.state.status = status;
            d.state.status_text = text;
        });
    }

    /// Record a failure: status Error with the given message.
    pub fn set_error(&self, message: impl Into<String>, text: impl Into<String>) {
        let message = message.into();
        let text = text.into();
        self.update(|d| {
            d.state.status = PrinterStatus::Error;
            d.state.error_message = message.clone();
            d.state.status_text = text;
            d.last_error = Some(message);
        });
    }

    /// Merge polled telemetry. Returns `true` if the snapshot changed.
    pub fn apply_device_status(&self, raw: &DeviceStatus) -> bool {
        self.update(|d| {
            let before = d.state.clone();
            let st = &mut d.state;
            st.jet_on = raw.jet_on;
            st.printing = raw.printing;
            st.status_text = raw.summary();

            if raw.error_mask != 0 {
                st.status = PrinterStatus::Error;
                st.error_message = describe_error_mask(raw.error_mask);
                d.last_error = Some(st.error_message.clone());
            } else {
                st.error_message.clear();
                st.status = if raw.printing {
                    PrinterStatus::Printing
                } else if raw.jet_on {
                    PrinterStatus::Connected
                } else {
                    PrinterStatus::Idle
                };
            }
            d.state != before
        })
    }

    /// Socket loss or explicit disconnect: flags cleared, job kept.
    pub fn mark_disconnected(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|d| {
            d.state.status = PrinterStatus::Disconnected;
            d.state.jet_on = false;
            d.state.printing = false;
            d.state.status_text = text;
        });
    }

    pub fn connection(&self) -> Option<ConnectionInfo> {
        lock(&self.data).connection.clone()
    }

    pub fn set_connection(&self, ip: impl Into<String>, port: u16) {
        let info = ConnectionInfo {
            ip: ip.into(),
            port,
        };
        self.update(|d| d.connection = Some(info));
    }

    pub fn clear_connection(&self) -> Option<ConnectionInfo> {
        self.update(|d| d.connection.take())
    }

    /// Record a freshly started job and mark the printer as printing.
    pub fn start_job(&self, content: &str, count: u32) -> JobId {
        let job = JobRecord::new(content, count);
        let id = job.id;
        self.update(|d| {
            d.state.job_id = Some(id);
            d.state.target_count = count;
            d.state.printed_count = 0;
            d.state.jet_on = true;
            d.state.printing = true;
            d.state.status = PrinterStatus::Printing;
            d.state.status_text = "Printing".into();
            d.job = Some(job);
        });
        id
    }

    /// Change the target of the current job, creating an empty record if
    /// no job exists yet.
    pub fn set_target_count(&self, count: u32) {
        self.update(|d| {
            let job = d.job.get_or_insert_with(|| JobRecord::new("", count));
            job.target_count = count;
            d.state.job_id = Some(job.id);
            d.state.target_count = count;
        });
    }

    /// Advance the simulated counter. Returns `true` once the target is met.
    pub fn increment_printed(&self) -> bool {
        self.update(|d| {
            d.state.printed_count = d.state.printed_count.saturating_add(1);
            let printed = d.state.printed_count;
            match d.job.as_mut() {
                Some(job) => {
                    job.printed_count = printed;
                    job.is_complete()
                }
                None => d.state.target_count > 0 && printed >= d.state.target_count,
            }
        })
    }

    pub fn job(&self) -> Option<JobRecord> {
        lock(&self.data).job.clone()
    }

    pub fn pending(&self) -> Option<PendingJob> {
        lock(&self.data).pending.clone()
    }

    pub fn park_pending(&self, content: &str, count: u32) {
        let pending = PendingJob {
            content: content.to_string(),
            count,
            jet_failures: 1,
        };
        self.update(|d| d.pending = Some(pending));
    }

    /// Count another failed jet attempt for the pending job.
    pub fn note_pending_jet_failure(&self) -> u32 {
        self.update(|d| match d.pending.as_mut() {
            Some(p) => {
                p.jet_failures += 1;
                p.jet_failures
            }
            None => 0,
        })
    }

    pub fn take_pending(&self) -> Option<PendingJob> {
        self.update(|d| d.pending.take())
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.data).last_error.clone()
    }

    /// Back to the initial disconnected model.
    pub fn reset(&self) {
        self.update(|d| *d = ModelData::default());
    }
}
