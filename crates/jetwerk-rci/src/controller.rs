// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer controller.
//
// A single worker thread owns all device I/O and every state-model write.
// The UI side only pushes requests and reads snapshots. Each worker
// iteration does exactly one of: handle a queued request, schedule a
// reconnect, or poll the device. Requests always win, so a command issued
// between polls is served before the next status request goes out.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use jetwerk_core::config::ControllerConfig;
use jetwerk_core::error::{JetwerkError, Result};
use jetwerk_core::human_errors::describe;
use jetwerk_core::types::{
    ConnectionInfo, JobRecord, MAX_CONTENT_LEN, MAX_PRINT_COUNT, PrinterState, PrinterStatus,
    ReconnectState, Request,
};

use crate::cleanup::CleanupStack;
use crate::client::DeviceClient;
use crate::events::{Emitter, EventSink};
use crate::model::PrinterStateModel;
use crate::reconnect::ReconnectPolicy;
use crate::request_queue::RequestQueue;
use crate::transport::{TcpTransport, Transport};
use crate::{lock, panic_message};

/// A parked job is dropped after this many failed jet starts.
pub const MAX_PENDING_JET_FAILURES: u32 = 3;

/// Name length sent with LoadMessage.
const MESSAGE_NAME_CHARS: usize = 8;

/// "No address to reconnect to" is logged once per this many idle ticks.
const NO_ADDRESS_LOG_EVERY: u64 = 20;

/// What one worker iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A queued request was handled.
    Handled(&'static str),
    /// An automatic reconnect attempt was queued.
    Reconnecting(u32),
    /// The device was polled.
    Polled,
    /// Nothing to do.
    Idle,
}

struct Shared {
    config: ControllerConfig,
    client: DeviceClient,
    queue: RequestQueue,
    model: PrinterStateModel,
    reconnect: ReconnectPolicy,
    events: Emitter,
    idle_ticks: AtomicU64,
}

/// One spawned worker thread and its private stop flag.
struct WorkerHandle {
    thread: JoinHandle<()>,
    done: mpsc::Receiver<()>,
    running: Arc<AtomicBool>,
}

impl WorkerHandle {
    fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn has_exited(&self) -> bool {
        !matches!(self.done.try_recv(), Err(TryRecvError::Empty))
    }
}

#[derive(Default)]
struct WorkerSlots {
    active: Option<WorkerHandle>,
    /// Stopped threads that missed their join deadline and are still
    /// finishing an in-flight command.
    detached: Vec<WorkerHandle>,
}

type WorkerSlot = Arc<Mutex<WorkerSlots>>;

/// Command API and lifecycle owner for the worker thread.
pub struct Controller {
    shared: Arc<Shared>,
    worker: WorkerSlot,
    cleanup: CleanupStack,
}

impl Controller {
    /// Controller speaking to the printer over TCP.
    pub fn new(config: ControllerConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::with_transport(config, Arc::new(TcpTransport::new()), sink)
    }

    pub fn with_transport(
        config: ControllerConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let config = config.sanitized();
        let events = Emitter::new(sink);
        let client = DeviceClient::new(transport, events.clone(), &config);
        let shared = Arc::new(Shared {
            reconnect: ReconnectPolicy::new(config.auto_reconnect, config.max_reconnect_attempts),
            client,
            queue: RequestQueue::new(),
            model: PrinterStateModel::new(),
            events,
            idle_ticks: AtomicU64::new(0),
            config,
        });
        let worker: WorkerSlot = Arc::new(Mutex::new(WorkerSlots::default()));
        let cleanup = CleanupStack::new("controller");

        // Runs in reverse: signal, disconnect, join, clear queue, reset model.
        {
            let s = Arc::clone(&shared);
            cleanup.add("model_reset", move || s.model.reset());
        }
        {
            let s = Arc::clone(&shared);
            cleanup.add("queue_clear", move || {
                let dropped = s.queue.clear();
                if dropped > 0 {
                    debug!(dropped, "discarded queued requests");
                }
            });
        }
        {
            let s = Arc::clone(&shared);
            let w = Arc::clone(&worker);
            cleanup.add("worker_stop", move || {
                let timeout = s.config.stop_timeout();
                stop_worker_thread(&s, &w, timeout);
            });
        }
        {
            let s = Arc::clone(&shared);
            cleanup.add("transport_disconnect", move || {
                s.client.transport().disconnect();
            });
        }
        {
            let w = Arc::clone(&worker);
            cleanup.add("worker_signal", move || {
                if let Some(handle) = lock(&w).active.as_ref() {
                    handle.signal_stop();
                }
            });
        }

        Self {
            shared,
            worker,
            cleanup,
        }
    }

    // -- Command API ----------------------------------------------------------

    pub fn connect(&self, ip: &str) -> Result<()> {
        let ip = ip.trim();
        if ip.is_empty() {
            return self.reject(JetwerkError::InvalidAddress(ip.to_string()));
        }
        self.shared.queue.push(Request::Connect { ip: ip.to_string() });
        Ok(())
    }

    pub fn disconnect(&self) {
        self.shared.queue.push(Request::Disconnect);
    }

    /// Validate and queue a print job.
    ///
    /// Rejected before queuing when the content is empty or longer than
    /// 1000 characters, the count is outside 1..=1000, or the printer is
    /// not in a printable status.
    pub fn start_printing(&self, content: &str, count: i64) -> Result<()> {
        let len = content.chars().count();
        if content.trim().is_empty() || len > MAX_CONTENT_LEN {
            return self.reject(JetwerkError::InvalidContent {
                len,
                max: MAX_CONTENT_LEN,
            });
        }
        let count = match u32::try_from(count) {
            Ok(c) if (1..=MAX_PRINT_COUNT).contains(&c) => c,
            _ => {
                return self.reject(JetwerkError::InvalidCount {
                    count,
                    max: MAX_PRINT_COUNT,
                });
            }
        };
        let status = self.shared.model.status();
        if !status.can_print() {
            return self.reject(JetwerkError::NotPrintable(status.to_string()));
        }

        self.shared.queue.push(Request::StartPrint {
            content: content.to_string(),
            count,
        });
        Ok(())
    }

    pub fn stop_printing(&self) {
        self.shared.queue.push(Request::StopPrint);
    }

    pub fn set_count(&self, count: u32) {
        self.shared.queue.push(Request::SetCount { count });
    }

    pub fn start_jet(&self) {
        self.shared.queue.push(Request::StartJet);
    }

    pub fn stop_jet(&self) {
        self.shared.queue.push(Request::StopJet);
    }

    fn reject(&self, err: JetwerkError) -> Result<()> {
        let human = describe(&err);
        self.shared
            .events
            .log(human.severity, format!("{} {}", human.message, human.suggestion));
        Err(err)
    }

    // -- Queries --------------------------------------------------------------

    pub fn current_state(&self) -> PrinterState {
        self.shared.model.snapshot()
    }

    /// The job currently loaded on the printer, if any.
    pub fn current_job(&self) -> Option<JobRecord> {
        self.shared.model.job()
    }

    /// Most recent device or connection error, kept after the status heals.
    pub fn last_error(&self) -> Option<String> {
        self.shared.model.last_error()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.client.is_connected()
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.shared.model.connection()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.shared.reconnect.snapshot()
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.shared.reconnect.set_enabled(enabled);
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.queue.len()
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Handle for driving the worker loop by hand, one step at a time.
    pub fn worker(&self) -> Worker {
        Worker {
            shared: Arc::clone(&self.shared),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn the worker thread. Returns `false` if it was already running.
    ///
    /// Fails with [`JetwerkError::WorkerBusy`] while a previously detached
    /// worker is still inside a device command, so two threads never drive
    /// the printer at once.
    pub fn start_worker(&self) -> Result<bool> {
        let mut slots = lock(&self.worker);
        if slots.active.is_some() {
            return Ok(false);
        }
        reap_detached(&mut slots)?;

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = mpsc::channel();
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            running: Arc::clone(&running),
        };
        let thread = thread::Builder::new()
            .name("jetwerk-worker".into())
            .spawn(move || worker.run(done_tx))?;

        slots.active = Some(WorkerHandle {
            thread,
            done: done_rx,
            running,
        });
        info!("worker thread started");
        Ok(true)
    }

    /// Ask the worker to stop and wait up to `timeout` for it.
    ///
    /// Returns `false` if the thread had to be detached. An in-flight
    /// device command is never interrupted, so the wait can be as long as
    /// that command's timeout.
    pub fn stop_worker(&self, timeout: Duration) -> bool {
        stop_worker_thread(&self.shared, &self.worker, timeout)
    }

    pub fn is_worker_running(&self) -> bool {
        lock(&self.worker)
            .active
            .as_ref()
            .is_some_and(|h| h.running.load(Ordering::SeqCst))
    }

    /// Ordered teardown. Safe to call more than once.
    pub fn shutdown(&self) {
        self.cleanup.run_all();
    }

    /// Last-resort teardown: stop signal, detach the worker, close the
    /// socket, and forget the remaining cleanup tasks.
    pub fn emergency_shutdown(&self) {
        warn!("emergency shutdown");
        {
            let mut slots = lock(&self.worker);
            if let Some(handle) = slots.active.take() {
                handle.signal_stop();
                slots.detached.push(handle);
            }
        }
        self.shared.client.transport().disconnect();
        self.cleanup.clear_without_running();
    }

    pub fn pending_cleanup(&self) -> usize {
        self.cleanup.pending_count()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_worker_thread(shared: &Shared, slots: &Mutex<WorkerSlots>, timeout: Duration) -> bool {
    let Some(handle) = lock(slots).active.take() else {
        return true;
    };
    handle.signal_stop();

    match handle.done.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => join_worker(shared, handle),
        Err(RecvTimeoutError::Timeout) => {
            let err = JetwerkError::WorkerStop {
                timeout_ms: timeout.as_millis() as u64,
            };
            shared
                .events
                .warning(format!("{err}; detaching it"));
            lock(slots).detached.push(handle);
            false
        }
    }
}

fn join_worker(shared: &Shared, handle: WorkerHandle) -> bool {
    match handle.thread.join() {
        Ok(()) => {
            info!("worker thread stopped");
            true
        }
        Err(payload) => {
            let err = JetwerkError::WorkerPanic(panic_message(payload.as_ref()));
            shared.events.error(err.to_string());
            false
        }
    }
}

/// Join detached workers that have finished. Fails if any is still alive.
fn reap_detached(slots: &mut WorkerSlots) -> Result<()> {
    let (finished, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut slots.detached)
        .into_iter()
        .partition(WorkerHandle::has_exited);
    slots.detached = alive;
    for handle in finished {
        if handle.thread.join().is_err() {
            warn!("detached worker thread had panicked");
        }
    }
    if slots.detached.is_empty() {
        Ok(())
    } else {
        warn!(alive = slots.detached.len(), "detached worker still running");
        Err(JetwerkError::WorkerBusy)
    }
}

/// The worker loop. Also usable directly for step-by-step driving.
pub struct Worker {
    shared: Arc<Shared>,
    /// Private to one spawn, so a restart never revives a detached thread.
    running: Arc<AtomicBool>,
}

impl Worker {
    fn run(self, done: mpsc::Sender<()>) {
        let s = &self.shared;
        info!("worker loop running");
        while self.running.load(Ordering::SeqCst) {
            match panic::catch_unwind(AssertUnwindSafe(|| self.step())) {
                Ok(Step::Handled(_)) => {}
                Ok(Step::Reconnecting(_)) => self.pause(s.config.reconnect_interval(), false),
                Ok(Step::Polled | Step::Idle) => self.pause(s.config.poll_interval(), true),
                Err(payload) => {
                    let err = JetwerkError::WorkerPanic(panic_message(payload.as_ref()));
                    s.events.error(err.to_string());
                    self.pause(s.config.poll_interval(), true);
                }
            }
        }
        info!("worker loop exited");
        let _ = done.send(());
    }

    /// Sleep in short slices so a stop request, or optionally a new
    /// request, cuts the wait short.
    fn pause(&self, total: Duration, wake_on_request: bool) {
        let s = &self.shared;
        let slice = s.config.request_pop();
        let deadline = Instant::now() + total;
        loop {
            if !self.running.load(Ordering::SeqCst) || (wake_on_request && !s.queue.is_empty()) {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(slice));
        }
    }

    /// One iteration of the worker loop.
    pub fn step(&self) -> Step {
        let s = &self.shared;
        if let Some(request) = s.queue.pop(s.config.request_pop()) {
            let name = request.name();
            debug!(request = name, "handling request");
            self.handle(request);
            s.events.state(s.model.snapshot());
            return Step::Handled(name);
        }

        if !s.client.is_connected() {
            if self.reconcile() {
                s.events.state(s.model.snapshot());
            }
            return self.maybe_reconnect();
        }

        self.poll();
        Step::Polled
    }

    fn handle(&self, request: Request) {
        match request {
            Request::Connect { ip } => self.handle_connect(&ip),
            Request::Disconnect => self.handle_disconnect(),
            Request::StartPrint { content, count } => self.handle_start_print(&content, count),
            Request::StopPrint => self.handle_stop_print(),
            Request::SetCount { count } => self.handle_set_count(count),
            Request::StartJet => {
                let _ = self.switch_jet_on();
            }
            Request::StopJet => self.handle_stop_jet(),
        }
    }

    fn handle_connect(&self, ip: &str) {
        let s = &self.shared;
        let port = s.config.port;
        s.reconnect.suspend();
        s.model.set_status(PrinterStatus::Connecting, "Connecting...");
        s.events.state(s.model.snapshot());
        s.events.info(format!("Connecting to {ip}:{port}..."));

        match s
            .client
            .transport()
            .connect(ip, port, s.config.connect_timeout())
        {
            Ok(()) => {
                s.model.set_connection(ip, port);
                s.reconnect.reset();
                s.model.update(|d| {
                    d.state.status = PrinterStatus::Connected;
                    d.state.status_text = "Connected".into();
                    d.state.error_message.clear();
                });
                s.events.info(format!("Connected to {ip}:{port}"));
                s.events.connection(true, ip, port);
            }
            Err(e) => {
                let human = describe(&e);
                s.model.set_error(e.to_string(), "Connection failed");
                s.events
                    .error(format!("Could not connect to {ip}:{port}: {e}. {}", human.suggestion));
                s.events.connection(false, ip, port);
            }
        }

        s.reconnect.resume();
    }

    fn handle_disconnect(&self) {
        let s = &self.shared;
        let closed = s.client.transport().disconnect();
        let previous = s.model.clear_connection();
        s.reconnect.reset();
        if s.model.take_pending().is_some() {
            s.events.info("Pending print job discarded");
        }
        s.model.mark_disconnected("Disconnected");

        s.events.info(if closed {
            "Disconnected"
        } else {
            "Already disconnected"
        });
        let (ip, port) = previous
            .map(|c| (c.ip, c.port))
            .unwrap_or_else(|| (String::new(), s.config.port));
        s.events.connection(false, ip, port);
    }

    fn handle_start_print(&self, content: &str, count: u32) {
        let s = &self.shared;
        if !s.client.is_connected() {
            s.events.error("Cannot print: not connected to a printer");
            return;
        }
        if self.switch_jet_on().is_err() {
            s.model.park_pending(content, count);
            s.events
                .warning("Print job parked until the jet is running");
            return;
        }
        self.load_and_start(content, count);
    }

    /// LoadMessage followed by StartPrint; records the job on success.
    fn load_and_start(&self, content: &str, count: u32) -> bool {
        let s = &self.shared;
        let name: String = content.chars().take(MESSAGE_NAME_CHARS).collect();
        let device_count = u16::try_from(count).unwrap_or(u16::MAX);

        if let Err(e) = s.client.load_message(&name, device_count) {
            s.events.error(format!("LoadMessage failed: {e}"));
            return false;
        }
        if let Err(e) = s.client.start_print() {
            s.events.error(format!("StartPrint failed: {e}"));
            return false;
        }

        let id = s.model.start_job(content, count);
        s.events
            .info(format!("Printing \"{name}\" x{count} (job {id})"));
        true
    }

    fn handle_stop_print(&self) {
        let s = &self.shared;
        if s.model.take_pending().is_some() {
            s.events.info("Pending print job discarded");
        }
        if s.client.is_connected() {
            if let Err(e) = s.client.stop_print() {
                s.events.warning(format!("StopPrint failed: {e}"));
            }
        }
        s.model.update(|d| {
            d.state.printing = false;
            d.state.status = PrinterStatus::Idle;
            d.state.status_text = "Stopped".into();
        });
        s.events.info("Printing stopped");
    }

    fn switch_jet_on(&self) -> Result<()> {
        let s = &self.shared;
        match s.client.start_jet() {
            Ok(()) => {
                s.model.update(|d| {
                    d.state.jet_on = true;
                    d.state.status = PrinterStatus::Connected;
                    d.state.status_text = "Jet on".into();
                });
                s.events.info("Jet on");
                Ok(())
            }
            Err(e) => {
                s.events.error(format!("Could not start the jet: {e}"));
                Err(e)
            }
        }
    }

    fn handle_stop_jet(&self) {
        let s = &self.shared;
        match s.client.stop_jet() {
            Ok(()) => {
                s.model.update(|d| {
                    d.state.jet_on = false;
                    d.state.printing = false;
                    d.state.status = PrinterStatus::Idle;
                    d.state.status_text = "Jet off".into();
                });
                s.events.info("Jet off");
            }
            Err(e) => s.events.error(format!("Could not stop the jet: {e}")),
        }
    }

    fn handle_set_count(&self, count: u32) {
        let s = &self.shared;
        s.model.set_target_count(count);
        s.events.info(format!("Target count set to {count}"));
    }

    fn maybe_reconnect(&self) -> Step {
        let s = &self.shared;
        if s.model.status() == PrinterStatus::Connecting {
            return Step::Idle;
        }
        if !s.reconnect.is_enabled() {
            s.reconnect.reset();
            return Step::Idle;
        }
        let Some(info) = s.model.connection() else {
            let ticks = s.idle_ticks.fetch_add(1, Ordering::Relaxed);
            if ticks % NO_ADDRESS_LOG_EVERY == 0 {
                debug!("no printer address to reconnect to");
            }
            return Step::Idle;
        };
        match s.reconnect.try_begin_attempt() {
            Some(attempt) => {
                s.events.info(format!(
                    "Auto-reconnect {attempt}/{} to {}...",
                    s.reconnect.max_attempts(),
                    info.ip
                ));
                if s.reconnect.is_exhausted() {
                    warn!(attempt, "last automatic reconnect attempt");
                }
                s.queue.push(Request::Connect { ip: info.ip });
                Step::Reconnecting(attempt)
            }
            None => Step::Idle,
        }
    }

    fn poll(&self) {
        let s = &self.shared;
        let raw = s.client.request_status_ex();
        let mut changed = raw.reported && s.model.apply_device_status(&raw);

        match s.model.status() {
            PrinterStatus::Printing => {
                changed = true;
                if s.model.increment_printed() {
                    s.events.info("Target count reached");
                    self.handle_stop_print();
                }
            }
            PrinterStatus::Connected | PrinterStatus::Idle if s.model.pending().is_some() => {
                changed = true;
                self.resume_pending();
            }
            _ => {}
        }

        if self.reconcile() {
            changed = true;
        }
        if changed {
            s.events.state(s.model.snapshot());
        }
    }

    fn resume_pending(&self) {
        let s = &self.shared;
        if self.switch_jet_on().is_ok() {
            if let Some(job) = s.model.take_pending() {
                s.events.info("Resuming parked print job");
                self.load_and_start(&job.content, job.count);
            }
            return;
        }
        let failures = s.model.note_pending_jet_failure();
        if failures >= MAX_PENDING_JET_FAILURES {
            s.model.take_pending();
            s.events.error(format!(
                "Dropping parked print job after {failures} failed jet starts"
            ));
        }
    }

    /// Move an online model to Disconnected once the socket is gone.
    fn reconcile(&self) -> bool {
        let s = &self.shared;
        if s.client.is_connected() || !s.model.status().is_online() {
            return false;
        }
        s.model.mark_disconnected("Connection lost");
        let (ip, port) = s
            .model
            .connection()
            .map(|c| (c.ip, c.port))
            .unwrap_or_else(|| (String::new(), s.config.port));
        s.events.warning(format!("Lost connection to {ip}:{port}"));
        s.events.connection(false, ip, port);
        true
    }
}
