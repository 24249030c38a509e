//! Append-only chat log
//!
//! Every broadcast is written here as one line:
//! `[YYYY-MM-DD HH:MM:SS] sender: message`.
//! The sink itself does no locking; the broadcaster serialises appends.

use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Timestamp format used in log lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub sender: String,
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current local time
    pub fn now(sender: &str, message: &str) -> Self {
        Self::at(Local::now(), sender, message)
    }

    /// Create an entry for the given instant (truncated to whole seconds)
    pub fn at<Tz: TimeZone>(when: DateTime<Tz>, sender: &str, message: &str) -> Self {
        let local = when.naive_local();
        let timestamp = local.with_nanosecond(0).unwrap_or(local);
        Self {
            timestamp,
            sender: sender.to_string(),
            message: message.to_string(),
        }
    }

    /// Render as a newline-terminated log line
    pub fn format_line(&self) -> String {
        format!(
            "[{}] {}: {}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.sender,
            self.message
        )
    }

    /// Parse a line produced by `format_line` (with or without the newline)
    ///
    /// The sender is everything up to the first `": "` after the timestamp,
    /// so messages may themselves contain `": "`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let rest = line.strip_prefix('[')?;
        let (stamp, rest) = rest.split_once("] ")?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        let (sender, message) = rest.split_once(": ")?;
        Some(Self {
            timestamp,
            sender: sender.to_string(),
            message: message.to_string(),
        })
    }
}

/// Append-only text sink
pub struct ChatLog {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl ChatLog {
    /// Open (or create) a log file in append mode
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::from_writer(file))
    }

    /// Wrap any async writer as a log sink
    pub fn from_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Box::new(writer),
        }
    }

    /// Write one entry and flush it before returning
    pub async fn append(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        self.writer.write_all(entry.format_line().as_bytes()).await?;
        self.writer.flush().await
    }
}

impl std::fmt::Debug for ChatLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatLog").finish_non_exhaustive()
    }
}
