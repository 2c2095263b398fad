// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RCI frame codec.
//
// Wire layout: ESC (SOH|STX) escaped(cmd ‖ payload) ESC ETX [checksum]
// Replies:     ESC (ACK|NAK) escaped(body) ESC ETX checksum
//
// Any ESC, STX, SOH or ETX inside the body is sent as ESC followed by the
// byte itself. The checksum is the two's complement of the byte sum of the
// unescaped [delimiter ‖ body ‖ ETX]. Pure functions only, no I/O.
//
// An escaped ETX in the body is byte-identical to the terminator, so the
// terminator is the ESC ETX pair whose checksum ends the buffer.

use jetwerk_core::error::{JetwerkError, Result};

pub const ESC: u8 = 0x1B;
pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

/// Smallest well-formed reply: ESC ACK x ESC ETX.
const MIN_REPLY_LEN: usize = 5;

/// Reply bodies carry at least [p_status, c_status, cmd].
const MIN_BODY_LEN: usize = 3;

/// Bytes shown by [`reply_to_string`].
const PREVIEW_BYTES: usize = 12;

/// RCI command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    StartJet = 0x0F,
    StopJet = 0x10,
    StartPrint = 0x11,
    StopPrint = 0x12,
    RequestStatus = 0x14,
    DownloadMessageData = 0x19,
    DownloadRemoteField = 0x1D,
    LoadMessage = 0x1E,
}

impl Command {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x0F => Some(Self::StartJet),
            0x10 => Some(Self::StopJet),
            0x11 => Some(Self::StartPrint),
            0x12 => Some(Self::StopPrint),
            0x14 => Some(Self::RequestStatus),
            0x19 => Some(Self::DownloadMessageData),
            0x1D => Some(Self::DownloadRemoteField),
            0x1E => Some(Self::LoadMessage),
            _ => None,
        }
    }
}

/// A validated acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFrame {
    pub cmd_id: u8,
    /// Unescaped body: [p_status, c_status, cmd, data...].
    pub body: Vec<u8>,
}

impl AckFrame {
    /// Command-specific data after the three header bytes.
    pub fn data(&self) -> &[u8] {
        &self.body[MIN_BODY_LEN..]
    }
}

/// A decoded outgoing command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub use_soh: bool,
    pub cmd_id: u8,
    pub payload: Vec<u8>,
}

/// Location of a frame terminator found by [`find_terminator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminator {
    /// Offset of the ESC of the closing ESC ETX.
    pub at: usize,
    /// Checksum byte, already unescaped.
    pub checksum: u8,
    /// Offset one past the checksum.
    pub end: usize,
}

fn needs_escape(b: u8) -> bool {
    matches!(b, ESC | STX | SOH | ETX)
}

fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if needs_escape(b) {
            out.push(ESC);
        }
        out.push(b);
    }
}

/// `(0x100 - sum(bytes) mod 256) mod 256`.
pub fn compute_checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

fn checksum_of(lead: u8, body: &[u8]) -> u8 {
    let sum = body.iter().fold(lead.wrapping_add(ETX), |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

/// Build an outgoing command frame.
pub fn build_frame(cmd_id: u8, payload: &[u8], use_soh: bool, include_checksum: bool) -> Vec<u8> {
    let delimiter = if use_soh { SOH } else { STX };
    let mut frame = Vec::with_capacity(payload.len() * 2 + 7);
    frame.push(ESC);
    frame.push(delimiter);
    escape_into(&mut frame, &[cmd_id]);
    escape_into(&mut frame, payload);
    frame.push(ESC);
    frame.push(ETX);

    if include_checksum {
        let mut unescaped = Vec::with_capacity(payload.len() + 1);
        unescaped.push(cmd_id);
        unescaped.extend_from_slice(payload);
        frame.push(checksum_of(delimiter, &unescaped));
    }
    frame
}

/// Build a device reply frame. Used by simulators and tests.
pub fn build_reply(ack: bool, body: &[u8]) -> Vec<u8> {
    let status = if ack { ACK } else { NAK };
    let mut frame = Vec::with_capacity(body.len() * 2 + 5);
    frame.push(ESC);
    frame.push(status);
    escape_into(&mut frame, body);
    frame.push(ESC);
    frame.push(ETX);
    frame.push(checksum_of(status, body));
    frame
}

/// Locate the terminator of a checksummed frame in `buf`.
///
/// Scans forward, escape-aware, from the two lead bytes. An escaped ETX in
/// the body is byte-identical to the terminator, so the first `ESC ETX`
/// whose following checksum (`cs` or `ESC cs`) matches the bytes so far
/// wins. Bytes after it belong to the next frame. If no candidate verifies,
/// a candidate whose checksum ends the buffer is returned so the caller can
/// report the mismatch. `None` means the frame is still incomplete.
pub fn find_terminator(buf: &[u8]) -> Option<Terminator> {
    let lead = *buf.get(1)?;
    let mut sum = lead.wrapping_add(ETX);
    let mut unverified = None;
    let mut i = 2;
    while i + 1 < buf.len() {
        let b = buf[i];
        if b != ESC {
            sum = sum.wrapping_add(b);
            i += 1;
            continue;
        }
        let next = buf[i + 1];
        if next == ETX {
            let expected = 0u8.wrapping_sub(sum);
            match &buf[i + 2..] {
                [] => break,
                [cs, ..] if *cs == expected => {
                    return Some(Terminator {
                        at: i,
                        checksum: *cs,
                        end: i + 3,
                    });
                }
                [ESC, cs, ..] if *cs == expected => {
                    return Some(Terminator {
                        at: i,
                        checksum: *cs,
                        end: i + 4,
                    });
                }
                [cs] | [ESC, cs] => {
                    unverified = Some(Terminator {
                        at: i,
                        checksum: *cs,
                        end: buf.len(),
                    });
                }
                _ => {}
            }
        }
        sum = sum.wrapping_add(next);
        i += 2;
    }
    unverified
}

fn unescape(bytes: &[u8], base_offset: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == ESC {
            match bytes.get(i + 1) {
                Some(&next) if needs_escape(next) => {
                    out.push(next);
                    i += 2;
                }
                _ => {
                    return Err(JetwerkError::MalformedEscape {
                        offset: base_offset + i,
                    });
                }
            }
        } else {
            out.push(b);
            i += 1;
        }
    }
    Ok(out)
}

/// Validate an acknowledgement for `expected_cmd`.
///
/// Protocol failures come back as errors; none of them imply that the
/// connection is unusable.
pub fn parse_ack(reply: &[u8], expected_cmd: u8) -> Result<AckFrame> {
    if reply.len() < MIN_REPLY_LEN {
        return Err(JetwerkError::ShortReply { len: reply.len() });
    }
    if reply[0] != ESC {
        return Err(JetwerkError::BadFrameStart(reply[0]));
    }
    match reply[1] {
        ACK => {}
        NAK => return Err(JetwerkError::Nak),
        other => return Err(JetwerkError::UnexpectedStatusByte(other)),
    }

    let term = find_terminator(reply).ok_or(JetwerkError::MissingTerminator)?;
    let body = unescape(&reply[2..term.at], 2)?;
    if body.len() < MIN_BODY_LEN {
        return Err(JetwerkError::ShortReply { len: body.len() });
    }

    let expected = checksum_of(ACK, &body);
    if expected != term.checksum {
        return Err(JetwerkError::ChecksumMismatch {
            expected,
            actual: term.checksum,
        });
    }

    let cmd_id = body[2];
    if cmd_id != expected_cmd {
        return Err(JetwerkError::UnexpectedCommand {
            expected: expected_cmd,
            actual: cmd_id,
        });
    }
    Ok(AckFrame { cmd_id, body })
}

/// Decode a checksummed command frame produced by [`build_frame`].
pub fn decode_frame(frame: &[u8]) -> Result<DecodedFrame> {
    if frame.len() < MIN_REPLY_LEN {
        return Err(JetwerkError::ShortReply { len: frame.len() });
    }
    if frame[0] != ESC {
        return Err(JetwerkError::BadFrameStart(frame[0]));
    }
    let delimiter = frame[1];
    if delimiter != SOH && delimiter != STX {
        return Err(JetwerkError::UnexpectedStatusByte(delimiter));
    }

    let term = find_terminator(frame).ok_or(JetwerkError::MissingTerminator)?;
    let body = unescape(&frame[2..term.at], 2)?;
    let Some((&cmd_id, payload)) = body.split_first() else {
        return Err(JetwerkError::ShortReply { len: 0 });
    };

    let expected = checksum_of(delimiter, &body);
    if expected != term.checksum {
        return Err(JetwerkError::ChecksumMismatch {
            expected,
            actual: term.checksum,
        });
    }

    Ok(DecodedFrame {
        use_soh: delimiter == SOH,
        cmd_id,
        payload: payload.to_vec(),
    })
}

/// Hex preview of a reply for debug logs: `[N bytes] 1B 06 ...`.
pub fn reply_to_string(reply: &[u8]) -> String {
    let mut out = format!("[{} bytes]", reply.len());
    for b in reply.iter().take(PREVIEW_BYTES) {
        out.push_str(&format!(" {b:02X}"));
    }
    if reply.len() > PREVIEW_BYTES {
        out.push_str(" ...");
    }
    out
}
