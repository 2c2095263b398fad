// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Jetwerk console.
//
// Entry point. Initialises logging, loads the controller config, starts the
// worker thread and drives it from stdin line commands. Controller events are
// rendered on a separate task as they arrive.

mod console;
mod data_dir;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use jetwerk_rci::{Controller, events};

use console::{ConsoleCommand, HELP, parse_command, render_event, render_state};

/// How long to wait for remaining events to print after shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Jetwerk starting");

    let config = data_dir::load_config(&data_dir::config_path());
    let port = config.port;
    let (sink, mut rx) = events::channel();
    let controller = Controller::new(config, Arc::new(sink));

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", render_event(&event));
        }
    });

    match controller.start_worker() {
        Ok(_) => info!(port, "worker running"),
        Err(e) => {
            error!(error = %e, "could not start the worker thread");
            return;
        }
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        match parse_command(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => dispatch(&controller, command),
            Err(hint) => println!("{hint}"),
        }
    }

    info!("shutting down");
    controller.shutdown();
    drop(controller);
    // A detached worker may still hold the sink, so do not wait forever
    // for the channel to close.
    match tokio::time::timeout(FLUSH_TIMEOUT, printer).await {
        Ok(Err(e)) => error!(error = %e, "event printer task failed"),
        Ok(Ok(())) => {}
        Err(_) => info!("event channel still open at exit"),
    }
}

fn dispatch(controller: &Controller, command: ConsoleCommand) {
    // Rejected commands are already reported through the event channel.
    match command {
        ConsoleCommand::Connect(ip) => {
            let _ = controller.connect(&ip);
        }
        ConsoleCommand::Print { content, count } => {
            let _ = controller.start_printing(&content, count);
        }
        ConsoleCommand::Disconnect => controller.disconnect(),
        ConsoleCommand::Stop => controller.stop_printing(),
        ConsoleCommand::Count(n) => controller.set_count(n),
        ConsoleCommand::JetOn => controller.start_jet(),
        ConsoleCommand::JetOff => controller.stop_jet(),
        ConsoleCommand::Status => {
            println!("{}", render_state(&controller.current_state()));
            if let Some(info) = controller.connection_info() {
                println!("[link] {}:{}", info.ip, info.port);
            }
            if let Some(job) = controller.current_job() {
                println!(
                    "[job] {} \"{}\" {}/{} since {}",
                    job.id,
                    job.content,
                    job.printed_count,
                    job.target_count,
                    job.started_at.with_timezone(&chrono::Local).format("%H:%M:%S")
                );
            }
            if let Some(err) = controller.last_error() {
                println!("[last error] {err}");
            }
            let rs = controller.reconnect_state();
            println!(
                "[reconnect] {} {}/{}",
                if rs.auto_reconnect_enabled { "on" } else { "off" },
                rs.attempts,
                rs.max_attempts
            );
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit | ConsoleCommand::Empty => {}
    }
}
