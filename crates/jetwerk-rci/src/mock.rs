// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scripted in-memory transport and recording event sink for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use jetwerk_core::error::{JetwerkError, Result};

use crate::codec::{self, Command};
use crate::events::{ControllerEvent, EventSink};
use crate::lock;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct SentFrame {
    pub frame: Vec<u8>,
    /// `None` for raw sends.
    pub timeout: Option<Duration>,
    pub thread: ThreadId,
    pub at: Instant,
}

impl SentFrame {
    pub fn cmd_id(&self) -> Option<u8> {
        codec::decode_frame(&self.frame).ok().map(|f| f.cmd_id)
    }
}

#[derive(Default)]
struct State {
    connected: bool,
    replies: VecDeque<Result<Vec<u8>>>,
    connect_results: VecDeque<Result<()>>,
    sent: Vec<SentFrame>,
    connects: Vec<(String, u16)>,
    closes: usize,
    delay: Duration,
}

/// Transport whose replies are queued up front by the test.
///
/// An empty reply queue answers with a command timeout. Connection-fatal
/// errors drop the simulated link, like the TCP transport does.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected() -> Self {
        let t = Self::default();
        lock(&t.state).connected = true;
        t
    }

    pub fn reply(&self, reply: Result<Vec<u8>>) {
        lock(&self.state).replies.push_back(reply);
    }

    pub fn ack(&self, cmd: Command) {
        self.reply(Ok(codec::build_reply(true, &[0, 0, cmd.id()])));
    }

    pub fn nak(&self, cmd: Command) {
        self.reply(Ok(codec::build_reply(false, &[0, 0, cmd.id()])));
    }

    pub fn status(&self, jet_state: u8, print_state: u8, error_mask: u32) {
        let mut body = vec![0, 0, Command::RequestStatus.id(), jet_state, print_state];
        body.extend_from_slice(&error_mask.to_be_bytes());
        self.reply(Ok(codec::build_reply(true, &body)));
    }

    /// Make every acknowledged command take `delay` before it answers.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = delay;
    }

    pub fn fail_next_connect(&self, err: JetwerkError) {
        lock(&self.state).connect_results.push_back(Err(err));
    }

    /// Simulate the socket going away underneath the controller.
    pub fn drop_link(&self) {
        lock(&self.state).connected = false;
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        lock(&self.state).sent.clone()
    }

    pub fn sent_commands(&self) -> Vec<u8> {
        self.sent().iter().filter_map(SentFrame::cmd_id).collect()
    }

    pub fn connects(&self) -> Vec<(String, u16)> {
        lock(&self.state).connects.clone()
    }

    pub fn close_count(&self) -> usize {
        lock(&self.state).closes
    }

    pub fn pending_replies(&self) -> usize {
        lock(&self.state).replies.len()
    }
}

impl Transport for MockTransport {
    fn connect(&self, host: &str, port: u16, _timeout: Duration) -> Result<()> {
        let mut st = lock(&self.state);
        st.connects.push((host.to_string(), port));
        let outcome = st.connect_results.pop_front().unwrap_or(Ok(()));
        st.connected = outcome.is_ok();
        outcome
    }

    fn disconnect(&self) -> bool {
        let mut st = lock(&self.state);
        if st.connected {
            st.connected = false;
            st.closes += 1;
            true
        } else {
            false
        }
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn send_frame(&self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let delay = {
            let mut st = lock(&self.state);
            if !st.connected {
                return Err(JetwerkError::NotConnected);
            }
            st.sent.push(SentFrame {
                frame: frame.to_vec(),
                timeout: Some(timeout),
                thread: thread::current().id(),
                at: Instant::now(),
            });
            st.delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut st = lock(&self.state);
        let reply = st.replies.pop_front().unwrap_or(Err(JetwerkError::CommandTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }));
        if let Err(e) = &reply {
            if e.class().is_connection_fatal() {
                st.connected = false;
            }
        }
        reply
    }

    fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut st = lock(&self.state);
        if !st.connected {
            return Err(JetwerkError::NotConnected);
        }
        st.sent.push(SentFrame {
            frame: bytes.to_vec(),
            timeout: None,
            thread: thread::current().id(),
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Sink that keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ControllerEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ControllerEvent> {
        lock(&self.events).clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::Log(m) => Some(m.text),
                _ => None,
            })
            .collect()
    }

    pub fn connection_updates(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::ConnectionUpdate { connected, .. } => Some(connected),
                _ => None,
            })
            .collect()
    }

    pub fn state_updates(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ControllerEvent::StateUpdate { .. }))
            .count()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ControllerEvent) -> Result<()> {
        lock(&self.events).push(event);
        Ok(())
    }
}
