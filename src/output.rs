use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;

use crate::backup::BackupReport;
use crate::restore::RestoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    /// Start of a resource type or pipeline step.
    Phase,
    /// One written file or one restored resource.
    Item,
    /// Raw API response bodies.
    Detail,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: EventLevel,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn phase(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Phase,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn item(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Item,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn detail(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Detail,
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Console,
    Json,
}

/// Human-readable progress on stdout; item and detail lines only when verbose.
pub struct ConsoleOutput {
    pub verbose: bool,
}

impl ConsoleOutput {
    pub fn print_backup(&self, report: &BackupReport) {
        if let Some(archive) = &report.archive {
            println!("Backup file '{archive}' successfully created.");
        }
        println!(
            "Backup successfully created in {} seconds.",
            rounded_seconds(report.elapsed_ms)
        );
    }

    pub fn print_restore(&self, result: &RestoreResult) {
        println!(
            "Restore successful in {} seconds.",
            rounded_seconds(result.elapsed_ms)
        );
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let show = match event.level {
            EventLevel::Phase => true,
            EventLevel::Item | EventLevel::Detail => self.verbose,
        };
        if !show {
            return;
        }
        match event.elapsed {
            Some(elapsed) => println!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => println!("{}", event.message),
        }
    }
}

/// Silent while running; the final report goes to stdout as JSON.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_backup(report: &BackupReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_restore(result: &RestoreResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

fn rounded_seconds(elapsed_ms: u128) -> u128 {
    (elapsed_ms + 500) / 1000
}
