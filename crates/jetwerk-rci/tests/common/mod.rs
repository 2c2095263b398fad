// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process RCI printer simulator for integration tests.
//
// Listens on 127.0.0.1, decodes each command frame and answers with an
// ACK (or a NAK for commands the test asks it to refuse). Jet and print
// state follow the commands so status polls look like a real device.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use jetwerk_core::types::{JET_OFF_CODE, PRINTING_CODE};
use jetwerk_rci::codec::{self, Command};

#[derive(Debug)]
pub struct SimState {
    pub jet_state: u8,
    pub print_state: u8,
    pub error_mask: u32,
    pub received: Vec<u8>,
    pub loaded: Option<(Vec<u8>, u16)>,
    pub refuse: HashSet<u8>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            jet_state: JET_OFF_CODE,
            print_state: 0x00,
            error_mask: 0,
            received: Vec::new(),
            loaded: None,
            refuse: HashSet::new(),
        }
    }
}

pub struct Simulator {
    pub port: u16,
    pub state: Arc<Mutex<SimState>>,
    kick: Arc<AtomicBool>,
    accepted: Arc<AtomicUsize>,
}

impl Simulator {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind simulator");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(Mutex::new(SimState::default()));
        let kick = Arc::new(AtomicBool::new(false));
        let accepted = Arc::new(AtomicUsize::new(0));

        {
            let state = Arc::clone(&state);
            let kick = Arc::clone(&kick);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { continue };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let state = Arc::clone(&state);
                    let kick = Arc::clone(&kick);
                    thread::spawn(move || serve(stream, state, kick));
                }
            });
        }

        Self {
            port,
            state,
            kick,
            accepted,
        }
    }

    /// Close the current connection from the device side.
    pub fn drop_connection(&self) {
        self.kick.store(true, Ordering::SeqCst);
    }

    pub fn refuse(&self, cmd: Command) {
        self.state.lock().unwrap().refuse.insert(cmd.id());
    }

    pub fn set_error_mask(&self, mask: u32) {
        self.state.lock().unwrap().error_mask = mask;
    }

    pub fn received(&self) -> Vec<u8> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn loaded(&self) -> Option<(Vec<u8>, u16)> {
        self.state.lock().unwrap().loaded.clone()
    }

    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn serve(mut stream: TcpStream, state: Arc<Mutex<SimState>>, kick: Arc<AtomicBool>) {
    stream
        .set_read_timeout(Some(Duration::from_millis(20)))
        .expect("read timeout");
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        if kick.swap(false, Ordering::SeqCst) {
            return;
        }
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(_) => return,
        }
        while let Some(term) = codec::find_terminator(&buf) {
            let frame: Vec<u8> = buf.drain(..term.end).collect();
            let Ok(decoded) = codec::decode_frame(&frame) else {
                continue;
            };
            let reply = respond(&state, decoded.cmd_id, &decoded.payload);
            if stream.write_all(&reply).is_err() {
                return;
            }
        }
    }
}

fn respond(state: &Mutex<SimState>, cmd_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut st = state.lock().unwrap();
    st.received.push(cmd_id);
    if st.refuse.contains(&cmd_id) {
        return codec::build_reply(false, &[0, 0, cmd_id]);
    }

    let mut body = vec![0x00, 0x00, cmd_id];
    match Command::from_id(cmd_id) {
        Some(Command::StartJet) => st.jet_state = 0x01,
        Some(Command::StopJet) => {
            st.jet_state = JET_OFF_CODE;
            st.print_state = 0x00;
        }
        Some(Command::StartPrint) => st.print_state = PRINTING_CODE,
        Some(Command::StopPrint) => st.print_state = 0x00,
        Some(Command::LoadMessage) if payload.len() >= 10 => {
            let count = u16::from_le_bytes([payload[8], payload[9]]);
            st.loaded = Some((payload[..8].to_vec(), count));
        }
        Some(Command::RequestStatus) => {
            body.push(st.jet_state);
            body.push(st.print_state);
            body.extend_from_slice(&st.error_mask.to_be_bytes());
        }
        _ => {}
    }
    codec::build_reply(true, &body)
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
