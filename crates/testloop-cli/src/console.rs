//! Terminal-backed reporter and approver.

use std::io::{BufRead, BufReader, Write};
use std::thread;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use testloop_core::{ApprovalRequest, Approver, Reporter};

/// Writes info and chat output to stdout, errors to stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for ConsoleReporter {
    fn info_line(&self, line: &str) {
        println!("{line}");
    }

    fn error_line(&self, line: &str) {
        eprintln!("{line}");
    }

    fn chat_output(&self, text: &str) {
        println!("\n{text}");
    }

    fn busy_started(&self, label: &str) {
        if self.verbose {
            println!("→ {label}...");
        }
        debug!(label = %label, "busy");
    }

    fn busy_finished(&self, label: &str) {
        debug!(label = %label, "idle");
    }
}

/// Asks on stdout and reads answers from a dedicated input thread.
///
/// The thread owns every blocking read. A prompt that times out only drops
/// its wait on the channel, so the runtime has nothing left to join at exit.
#[derive(Debug)]
pub struct TerminalApprover {
    answers: Mutex<mpsc::Receiver<String>>,
}

impl TerminalApprover {
    pub fn stdin() -> std::io::Result<Self> {
        Self::from_reader(BufReader::new(std::io::stdin()))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(mut reader: R) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(16);
        thread::Builder::new()
            .name("testloop-input".to_string())
            .spawn(move || loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                }
            })?;
        Ok(Self {
            answers: Mutex::new(rx),
        })
    }
}

/// Interpret a typed answer; anything unrecognised falls back to `default`.
pub fn parse_answer(input: &str, default: bool) -> bool {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

fn prompt_suffix(request: &ApprovalRequest) -> String {
    let choices = if request.default { "[Y/n]" } else { "[y/N]" };
    match request.timeout_seconds {
        Some(secs) => format!("{choices} (no answer in {secs}s skips the repair)"),
        None => choices.to_string(),
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn ask_for_approval(&self, request: &ApprovalRequest) -> anyhow::Result<bool> {
        println!("{}", request.message.trim_end());
        print!("{} ", prompt_suffix(request));
        std::io::stdout().flush()?;

        let line = self
            .answers
            .lock()
            .await
            .recv()
            .await
            .context("stdin closed before an answer was given")?;
        Ok(parse_answer(&line, request.default))
    }
}
