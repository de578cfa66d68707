// src/console.rs

//! Local interactive console: reads control commands from stdin.

use crate::control::{self, Command};
use crate::state::RunContext;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Starts the console on its own thread. Stdin reads block, so it never runs
/// on the async runtime.
pub fn spawn(ctx: Arc<RunContext>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            serve(&ctx, stdin.lock(), io::stdout());
        })
}

/// Dispatches every line of `input` until EOF or `exit`.
pub fn serve(ctx: &RunContext, input: impl BufRead, mut output: impl Write) {
    info!("Interactive console ready, type 'help' for the command list");
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Console input failed, closing the console");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!(command = control::verb_of(line), "Console command");
        let closing = matches!(line.parse::<Command>(), Ok(Command::Exit));
        let reply = control::dispatch(ctx, line, false);
        if writeln!(output, "{reply}").and_then(|()| output.flush()).is_err() {
            break;
        }
        if closing {
            break;
        }
    }
    info!("Interactive console closed");
}
