// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TCP transport for the RCI protocol (port 9100 by default).
//
// Owns at most one socket. Connect is bounded by a timeout; replies are read
// in short slices until a complete frame (terminator plus checksum) has
// arrived or the command budget runs out. A command timeout leaves the link
// up. Send errors, receive errors and peer close tear it down.
//
// The socket handle lives behind its own mutex so `disconnect` can run from
// a shutdown path while the worker sits in a blocking read: the handle is
// detached under the lock and shut down outside it, which wakes the reader.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use jetwerk_core::error::{JetwerkError, Result};

use crate::codec;
use crate::lock;

/// Default RCI TCP port.
pub const RCI_PORT: u16 = 9100;

/// Upper bound of a single blocking read while waiting for a reply.
const READ_SLICE: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 1024;

/// Byte transport used by the device client.
///
/// Implementations must be safe to `disconnect` from another thread while a
/// `send_frame` is in progress.
pub trait Transport: Send + Sync {
    /// Open a connection, replacing any existing one.
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<()>;

    /// Close the connection. Returns `true` if a live socket was closed and
    /// `false` if there was nothing to close.
    fn disconnect(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Send a frame and wait up to `timeout` for a complete reply frame.
    fn send_frame(&self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    /// Send bytes without waiting for any reply.
    fn send_raw(&self, bytes: &[u8]) -> Result<()>;
}

struct Link {
    stream: Arc<TcpStream>,
    peer: SocketAddr,
}

/// Blocking `std::net` transport.
#[derive(Default)]
pub struct TcpTransport {
    link: Mutex<Option<Link>>,
    /// Serialises request/reply exchanges on the socket.
    io: Mutex<()>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_stream(&self) -> Result<Arc<TcpStream>> {
        lock(&self.link)
            .as_ref()
            .map(|link| Arc::clone(&link.stream))
            .ok_or(JetwerkError::NotConnected)
    }

    /// Drop the link if it is still the one `stream` belongs to.
    fn tear_down(&self, stream: &Arc<TcpStream>) {
        let detached = {
            let mut guard = lock(&self.link);
            match guard.as_ref() {
                Some(link) if Arc::ptr_eq(&link.stream, stream) => guard.take(),
                _ => None,
            }
        };
        if let Some(link) = detached {
            let _ = link.stream.shutdown(Shutdown::Both);
            warn!(peer = %link.peer, "connection torn down after I/O failure");
        }
    }

    fn write_all(&self, stream: &Arc<TcpStream>, bytes: &[u8]) -> Result<()> {
        let mut writer: &TcpStream = stream;
        if let Err(e) = writer.write_all(bytes).and_then(|()| writer.flush()) {
            self.tear_down(stream);
            return Err(JetwerkError::Send(e.to_string()));
        }
        Ok(())
    }

    /// Discard bytes left over from an earlier timed-out exchange.
    fn drain_stale(stream: &TcpStream) {
        if stream.set_nonblocking(true).is_err() {
            return;
        }
        let mut reader: &TcpStream = stream;
        let mut scratch = [0u8; READ_CHUNK];
        let mut dropped = 0usize;
        while let Ok(n) = reader.read(&mut scratch) {
            if n == 0 {
                break;
            }
            dropped += n;
        }
        let _ = stream.set_nonblocking(false);
        if dropped > 0 {
            debug!(dropped, "discarded stale reply bytes");
        }
    }

    fn read_reply(&self, stream: &Arc<TcpStream>, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut reader: &TcpStream = stream;
        let mut reply = Vec::with_capacity(64);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(JetwerkError::CommandTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            if let Err(e) = stream.set_read_timeout(Some(remaining.min(READ_SLICE))) {
                self.tear_down(stream);
                return Err(JetwerkError::Receive(e.to_string()));
            }

            match reader.read(&mut chunk) {
                Ok(0) => {
                    self.tear_down(stream);
                    return Err(JetwerkError::PeerClosed);
                }
                Ok(n) => {
                    reply.extend_from_slice(&chunk[..n]);
                    if let Some(term) = codec::find_terminator(&reply) {
                        if term.end < reply.len() {
                            debug!(extra = reply.len() - term.end, "dropping bytes after reply");
                            reply.truncate(term.end);
                        }
                        return Ok(reply);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    self.tear_down(stream);
                    return Err(JetwerkError::Receive(e.to_string()));
                }
            }
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let host = host.trim();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(JetwerkError::InvalidAddress(host.to_string()));
    }
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| JetwerkError::NameResolution {
            host: host.to_string(),
            detail: e.to_string(),
        })?;
    addrs.next().ok_or_else(|| JetwerkError::NameResolution {
        host: host.to_string(),
        detail: "no addresses returned".into(),
    })
}

impl Transport for TcpTransport {
    #[instrument(skip(self, timeout), fields(timeout_ms = timeout.as_millis() as u64))]
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        if self.disconnect() {
            debug!("closed previous connection before reconnecting");
        }

        let addr = resolve(host, port)?;
        let timeout = timeout.max(Duration::from_millis(1));
        info!(addr = %addr, "connecting to printer");

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => JetwerkError::ConnectTimeout {
                addr: addr.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            ErrorKind::ConnectionRefused => JetwerkError::ConnectRefused {
                addr: addr.to_string(),
            },
            _ => JetwerkError::Connect {
                addr: addr.to_string(),
                detail: e.to_string(),
            },
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(JetwerkError::SocketCreate(e.to_string()));
        }

        *lock(&self.link) = Some(Link {
            stream: Arc::new(stream),
            peer: addr,
        });
        info!(addr = %addr, "connected");
        Ok(())
    }

    fn disconnect(&self) -> bool {
        let detached = lock(&self.link).take();
        match detached {
            Some(link) => {
                let _ = link.stream.shutdown(Shutdown::Both);
                info!(peer = %link.peer, "disconnected");
                true
            }
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    fn send_frame(&self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let _io = lock(&self.io);
        let stream = self.current_stream()?;
        Self::drain_stale(&stream);
        self.write_all(&stream, frame)?;
        let reply = self.read_reply(&stream, timeout)?;
        debug!(reply = %codec::reply_to_string(&reply), "reply received");
        Ok(reply)
    }

    fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        let _io = lock(&self.io);
        let stream = self.current_stream()?;
        self.write_all(&stream, bytes)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
