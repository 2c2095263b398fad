// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Every technical error is mapped to a short plain-language message with a
// suggestion for the person standing at the line. Device error masks get
// their own description listing the raised fault bits.

use crate::error::JetwerkError;
use crate::types::Severity;

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What the operator should try.
    pub suggestion: String,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            severity,
        }
    }
}

impl std::fmt::Display for HumanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.message, self.suggestion)
    }
}

/// Convert a `JetwerkError` into a `HumanError` for the log channel.
pub fn describe(err: &JetwerkError) -> HumanError {
    match err {
        // -- Connecting --
        JetwerkError::InvalidAddress(addr) => HumanError::new(
            format!("\"{addr}\" is not a valid printer address."),
            "Enter the printer's IP address, for example 192.168.1.50.",
            Severity::Error,
        ),
        JetwerkError::NameResolution { host, .. } => HumanError::new(
            format!("The name \"{host}\" could not be found on the network."),
            "Use the printer's IP address instead of its name.",
            Severity::Error,
        ),
        JetwerkError::ConnectTimeout { .. } => HumanError::new(
            "The printer did not answer in time.",
            "Check that the printer is switched on and reachable on the network.",
            Severity::Error,
        ),
        JetwerkError::ConnectRefused { .. } => HumanError::new(
            "The printer refused the connection.",
            "Check that remote control is enabled on the printer and the port is correct.",
            Severity::Error,
        ),
        JetwerkError::SocketCreate(_) | JetwerkError::Connect { .. } => HumanError::new(
            "Could not open a connection to the printer.",
            "Check the network cable and try connecting again.",
            Severity::Error,
        ),

        // -- Link loss --
        JetwerkError::NotConnected => HumanError::new(
            "No printer is connected.",
            "Connect to a printer first.",
            Severity::Warning,
        ),
        JetwerkError::Send(_) | JetwerkError::Receive(_) | JetwerkError::PeerClosed => {
            HumanError::new(
                "The connection to the printer was lost.",
                "The controller will try to reconnect automatically.",
                Severity::Error,
            )
        }

        // -- Command outcome --
        JetwerkError::CommandTimeout { .. } => HumanError::new(
            "The printer did not acknowledge the command.",
            "The printer may be busy. Try the command again.",
            Severity::Warning,
        ),
        JetwerkError::Nak => HumanError::new(
            "The printer rejected the command.",
            "Check the printer display for a reason, then try again.",
            Severity::Warning,
        ),
        JetwerkError::ShortReply { .. }
        | JetwerkError::BadFrameStart(_)
        | JetwerkError::UnexpectedStatusByte(_)
        | JetwerkError::MissingTerminator
        | JetwerkError::MalformedEscape { .. }
        | JetwerkError::ChecksumMismatch { .. }
        | JetwerkError::UnexpectedCommand { .. } => HumanError::new(
            "The printer sent a garbled reply.",
            "This is usually a one-off. If it keeps happening, check for electrical noise on the network cable.",
            Severity::Warning,
        ),
        JetwerkError::PayloadTooLarge { max, .. } => HumanError::new(
            "The data is too large to send to the printer.",
            format!("Keep the data under {max} bytes."),
            Severity::Warning,
        ),

        // -- Validation --
        JetwerkError::InvalidContent { max, .. } => HumanError::new(
            "The print text is empty or too long.",
            format!("Enter between 1 and {max} characters."),
            Severity::Warning,
        ),
        JetwerkError::InvalidCount { max, .. } => HumanError::new(
            "The print count is out of range.",
            format!("Enter a count between 1 and {max}."),
            Severity::Warning,
        ),
        JetwerkError::NotPrintable(_) => HumanError::new(
            "The printer is not ready to print.",
            "Connect to the printer and wait until it reports Connected or Idle.",
            Severity::Warning,
        ),

        // -- Internal --
        JetwerkError::WorkerStop { .. } => HumanError::new(
            "The controller did not shut down cleanly.",
            "A command was still waiting for the printer. It is safe to exit.",
            Severity::Warning,
        ),
        JetwerkError::WorkerBusy => HumanError::new(
            "The controller is still finishing a printer command.",
            "Wait for the command to time out, then start again.",
            Severity::Warning,
        ),
        JetwerkError::WorkerPanic(_) | JetwerkError::EventDelivery(_) => HumanError::new(
            "The controller hit an internal problem and carried on.",
            "If this repeats, restart the application and report it.",
            Severity::Error,
        ),
        JetwerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError::new(
                    "A settings file could not be found.",
                    "Default settings are used instead.",
                    Severity::Info,
                )
            } else {
                HumanError::new(
                    "There was a problem reading or writing a file.",
                    "Check disk space and file permissions.",
                    Severity::Warning,
                )
            }
        }
        JetwerkError::Serialization(_) => HumanError::new(
            "The settings file is damaged.",
            "Fix or delete the file. Default settings are used until then.",
            Severity::Warning,
        ),
    }
}

/// Describe a non-zero device error mask, naming the raised bits.
///
/// Returns an empty string for a zero mask.
pub fn describe_error_mask(mask: u32) -> String {
    if mask == 0 {
        return String::new();
    }
    let bits: Vec<String> = (0..32)
        .filter(|bit| mask & (1u32 << bit) != 0)
        .map(|bit| bit.to_string())
        .collect();
    format!("ErrorMask: 0x{mask:08X} (fault bits {})", bits.join(", "))
}
