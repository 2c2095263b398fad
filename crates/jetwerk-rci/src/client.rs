// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RCI device client: the printer's command vocabulary on top of the frame
// codec and a transport.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use jetwerk_core::config::ControllerConfig;
use jetwerk_core::error::{ErrorClass, JetwerkError, Result};
use jetwerk_core::types::DeviceStatus;

use crate::codec::{self, AckFrame, Command};
use crate::events::Emitter;
use crate::transport::Transport;

/// Message names are fixed at 8 bytes, NUL padded.
pub const MESSAGE_NAME_LEN: usize = 8;

/// Telemetry needs [p, c, cmd, jet, print, mask0..mask3].
const STATUS_BODY_LEN: usize = 9;

/// Encode a LoadMessage payload: 8-byte name, then the count as LE u16.
pub fn load_message_payload(name: &str, count: u16) -> Vec<u8> {
    let mut payload = vec![0u8; MESSAGE_NAME_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(MESSAGE_NAME_LEN);
    payload[..n].copy_from_slice(&bytes[..n]);
    payload.extend_from_slice(&count.to_le_bytes());
    payload
}

/// Encode a DownloadRemoteField payload: LE u16 length, then the data.
pub fn remote_field_payload(data: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(data.len()).map_err(|_| JetwerkError::PayloadTooLarge {
        len: data.len(),
        max: u16::MAX as usize,
    })?;
    let mut payload = Vec::with_capacity(data.len() + 2);
    payload.extend_from_slice(&len.to_le_bytes());
    payload.extend_from_slice(data);
    Ok(payload)
}

/// Decode status telemetry from a validated status acknowledgement.
pub fn parse_status(ack: &AckFrame) -> Option<DeviceStatus> {
    if ack.body.len() < STATUS_BODY_LEN {
        return None;
    }
    let b = &ack.body;
    let mask = u32::from_be_bytes([b[5], b[6], b[7], b[8]]);
    Some(DeviceStatus::from_telemetry(b[3], b[4], mask))
}

pub struct DeviceClient {
    transport: Arc<dyn Transport>,
    events: Emitter,
    command_timeout: Duration,
    jet_timeout: Duration,
    status_timeout: Duration,
}

impl DeviceClient {
    pub fn new(transport: Arc<dyn Transport>, events: Emitter, config: &ControllerConfig) -> Self {
        Self {
            transport,
            events,
            command_timeout: config.command_timeout(),
            jet_timeout: config.jet_timeout(),
            status_timeout: config.status_timeout(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn default_timeout(&self, cmd: Command) -> Duration {
        match cmd {
            Command::StartJet | Command::StopJet => self.jet_timeout,
            _ => self.command_timeout,
        }
    }

    /// Send a command and validate its acknowledgement.
    ///
    /// `timeout` of `None` picks the per-command default.
    pub fn send_and_wait_ack(
        &self,
        cmd: Command,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<AckFrame> {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout(cmd));
        let frame = codec::build_frame(cmd.id(), payload, false, true);
        let reply = self.transport.send_frame(&frame, timeout)?;
        debug!(cmd = ?cmd, reply = %codec::reply_to_string(&reply), "recv");

        codec::parse_ack(&reply, cmd.id()).inspect_err(|e| {
            if e.class() == ErrorClass::Protocol {
                self.events.warning(format!("{cmd:?}: {e}"));
            }
        })
    }

    fn simple(&self, cmd: Command) -> Result<()> {
        self.send_and_wait_ack(cmd, &[], None).map(|_| ())
    }

    pub fn start_jet(&self) -> Result<()> {
        self.simple(Command::StartJet)
    }

    pub fn stop_jet(&self) -> Result<()> {
        self.simple(Command::StopJet)
    }

    pub fn start_print(&self) -> Result<()> {
        self.simple(Command::StartPrint)
    }

    pub fn stop_print(&self) -> Result<()> {
        self.simple(Command::StopPrint)
    }

    /// Plain acknowledged status request, telemetry ignored.
    pub fn request_status(&self) -> Result<()> {
        self.simple(Command::RequestStatus)
    }

    /// Select a stored message by name and set its print count.
    pub fn load_message(&self, name: &str, count: u16) -> Result<()> {
        let payload = load_message_payload(name, count);
        self.send_and_wait_ack(Command::LoadMessage, &payload, None)
            .map(|_| ())
    }

    pub fn download_remote_field(&self, data: &[u8]) -> Result<()> {
        let payload = remote_field_payload(data)?;
        self.send_and_wait_ack(Command::DownloadRemoteField, &payload, None)
            .map(|_| ())
    }

    pub fn download_message_data(&self, data: &[u8]) -> Result<()> {
        self.send_and_wait_ack(Command::DownloadMessageData, data, None)
            .map(|_| ())
    }

    /// Transmit a command without waiting for any reply.
    pub fn send_command_no_ack(&self, cmd: Command, payload: &[u8]) -> Result<()> {
        let frame = codec::build_frame(cmd.id(), payload, false, true);
        self.transport.send_raw(&frame)
    }

    /// Best-effort status poll.
    ///
    /// Never fails: any error or short reply yields [`DeviceStatus::unknown`].
    pub fn request_status_ex(&self) -> DeviceStatus {
        if !self.transport.is_connected() {
            return DeviceStatus::unknown();
        }
        match self.send_and_wait_ack(Command::RequestStatus, &[], Some(self.status_timeout)) {
            Ok(ack) => parse_status(&ack).unwrap_or_else(|| {
                debug!(len = ack.body.len(), "status reply too short for telemetry");
                DeviceStatus::unknown()
            }),
            Err(e) => {
                debug!(error = %e, "status poll failed");
                DeviceStatus::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ControllerEvent, Emitter};
    use crate::mock::{MockTransport, RecordingSink};
    use jetwerk_core::types::{JET_OFF_CODE, PRINTING_CODE};

    fn client(transport: &Arc<MockTransport>) -> (DeviceClient, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let emitter = Emitter::new(sink.clone());
        let t: Arc<dyn Transport> = transport.clone();
        (
            DeviceClient::new(t, emitter, &ControllerConfig::default()),
            sink,
        )
    }

    #[test]
    fn load_message_truncates_long_names() {
        let payload = load_message_payload("VERYLONGNAME", 10);
        assert_eq!(&payload[..8], b"VERYLONG");
        assert_eq!(&payload[8..], &[10, 0]);
    }

    #[test]
    fn load_message_pads_short_names() {
        let payload = load_message_payload("AB", 0x0102);
        assert_eq!(payload, vec![b'A', b'B', 0, 0, 0, 0, 0, 0, 0x02, 0x01]);
    }

    #[test]
    fn remote_field_has_length_prefix() {
        assert_eq!(remote_field_payload(b"xyz").unwrap(), vec![3, 0, b'x', b'y', b'z']);
        let big = vec![0u8; 70_000];
        assert!(matches!(
            remote_field_payload(&big),
            Err(JetwerkError::PayloadTooLarge { len: 70_000, .. })
        ));
    }

    #[test]
    fn jet_commands_use_long_timeout() {
        let t = Arc::new(MockTransport::connected());
        t.ack(Command::StartJet);
        t.ack(Command::StartPrint);
        let (c, _) = client(&t);

        c.start_jet().unwrap();
        c.start_print().unwrap();

        let sent = t.sent();
        assert_eq!(sent[0].timeout, Some(Duration::from_secs(60)));
        assert_eq!(sent[1].timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn load_message_transmits_first_eight_chars() {
        let t = Arc::new(MockTransport::connected());
        t.ack(Command::LoadMessage);
        let (c, _) = client(&t);

        c.load_message("VERYLONGNAME", 10).unwrap();

        let frame = codec::decode_frame(&t.sent()[0].frame).unwrap();
        assert_eq!(frame.cmd_id, Command::LoadMessage.id());
        assert_eq!(&frame.payload[..8], b"VERYLONG");
        assert_eq!(&frame.payload[8..], &[10, 0]);
    }

    #[test]
    fn checksum_mismatch_logs_warning_and_fails() {
        let t = Arc::new(MockTransport::connected());
        let mut bad = codec::build_reply(true, &[0, 0, Command::StopPrint.id()]);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        t.reply(Ok(bad));
        let (c, sink) = client(&t);

        assert!(matches!(
            c.stop_print(),
            Err(JetwerkError::ChecksumMismatch { .. })
        ));
        assert!(t.is_connected());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, ControllerEvent::Log(m) if m.text.contains("checksum"))));
    }

    #[test]
    fn status_ex_decodes_telemetry() {
        let t = Arc::new(MockTransport::connected());
        t.status(0x01, PRINTING_CODE, 0);
        let (c, _) = client(&t);

        let st = c.request_status_ex();
        assert!(st.reported);
        assert!(st.jet_on);
        assert!(st.printing);
        assert_eq!(t.sent()[0].timeout, Some(Duration::from_millis(100)));
    }

    #[test]
    fn status_ex_reads_big_endian_mask() {
        let t = Arc::new(MockTransport::connected());
        t.status(JET_OFF_CODE, 0x00, 0x0102_0304);
        let (c, _) = client(&t);

        let st = c.request_status_ex();
        assert_eq!(st.error_mask, 0x0102_0304);
        assert!(!st.jet_on);
    }

    #[test]
    fn status_ex_swallows_failures() {
        let t = Arc::new(MockTransport::connected());
        t.reply(Err(JetwerkError::CommandTimeout { timeout_ms: 100 }));
        t.reply(Ok(codec::build_reply(true, &[0, 0, Command::RequestStatus.id(), 1])));
        let (c, _) = client(&t);

        assert_eq!(c.request_status_ex(), DeviceStatus::unknown());
        assert_eq!(c.request_status_ex(), DeviceStatus::unknown());
    }

    #[test]
    fn status_ex_skips_io_when_disconnected() {
        let t = Arc::new(MockTransport::new());
        let (c, _) = client(&t);
        assert_eq!(c.request_status_ex(), DeviceStatus::unknown());
        assert!(t.sent().is_empty());
    }

    #[test]
    fn no_ack_command_goes_out_raw() {
        let t = Arc::new(MockTransport::connected());
        let (c, _) = client(&t);
        c.send_command_no_ack(Command::StopPrint, &[]).unwrap();
        let sent = t.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].timeout, None);
    }
}
