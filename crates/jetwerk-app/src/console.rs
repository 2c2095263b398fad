// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Console line commands and event rendering.

use jetwerk_core::types::PrinterState;
use jetwerk_rci::ControllerEvent;

pub const HELP: &str = "\
commands:
  connect <ip>             connect to a printer on the configured port
  disconnect               close the connection
  print <content> <count>  print a message <count> times
  stop                     stop printing
  count <n>                change the target count
  jet on | jet off         start or stop the ink jet
  status                   show the current printer state
  help                     show this text
  quit                     shut down and exit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect(String),
    Disconnect,
    Print { content: String, count: i64 },
    Stop,
    Count(u32),
    JetOn,
    JetOff,
    Status,
    Help,
    Quit,
    Empty,
}

/// Parse one input line. The error is a usage hint for the operator.
///
/// The print count is kept signed so range checks happen in the controller,
/// which reports them the same way as any other rejected command.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "" => Ok(ConsoleCommand::Empty),
        "connect" if !rest.is_empty() => Ok(ConsoleCommand::Connect(rest.to_string())),
        "connect" => Err("usage: connect <ip>".into()),
        "disconnect" => Ok(ConsoleCommand::Disconnect),
        "print" => {
            let (content, count) = rest
                .rsplit_once(char::is_whitespace)
                .ok_or("usage: print <content> <count>")?;
            let count = count
                .parse::<i64>()
                .map_err(|_| format!("not a number: {count}"))?;
            Ok(ConsoleCommand::Print {
                content: content.trim().to_string(),
                count,
            })
        }
        "stop" => Ok(ConsoleCommand::Stop),
        "count" => rest
            .parse::<u32>()
            .map(ConsoleCommand::Count)
            .map_err(|_| "usage: count <n>".into()),
        "jet" => match rest.to_ascii_lowercase().as_str() {
            "on" => Ok(ConsoleCommand::JetOn),
            "off" => Ok(ConsoleCommand::JetOff),
            _ => Err("usage: jet on | jet off".into()),
        },
        "status" => Ok(ConsoleCommand::Status),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(format!("unknown command: {other} (try help)")),
    }
}

pub fn render_state(state: &PrinterState) -> String {
    let mut line = format!(
        "[state] {} | {} | jet {} | {}/{}",
        state.status,
        state.status_text,
        if state.jet_on { "on" } else { "off" },
        state.printed_count,
        state.target_count,
    );
    if let Some(id) = &state.job_id {
        line.push_str(&format!(" | job {id}"));
    }
    if !state.error_message.is_empty() {
        line.push_str(&format!(" | {}", state.error_message));
    }
    line
}

/// One output line per controller event.
pub fn render_event(event: &ControllerEvent) -> String {
    match event {
        ControllerEvent::StateUpdate { state, .. } => render_state(state),
        ControllerEvent::Log(msg) => format!(
            "{} {:<5} {}",
            msg.at.with_timezone(&chrono::Local).format("%H:%M:%S"),
            msg.severity.to_string(),
            msg.text
        ),
        ControllerEvent::ConnectionUpdate {
            connected: true,
            ip,
            port,
        } => format!("[link] up {ip}:{port}"),
        ControllerEvent::ConnectionUpdate {
            connected: false,
            ip,
            port,
        } if ip.is_empty() => format!("[link] down (port {port})"),
        ControllerEvent::ConnectionUpdate { ip, port, .. } => format!("[link] down {ip}:{port}"),
    }
}
