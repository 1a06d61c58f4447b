//! Connection notification channel.
//!
//! The connection reports its lifecycle through an explicit handler
//! registered at construction instead of an ambient event emitter.
//! Implement [`ConnectionEvents`] to observe dispatched commands
//! (credential bytes already masked), errors, and connection closure.

use crate::error::Error;

/// Handler for connection notifications.
///
/// All methods have no-op defaults; implement only what you need.
pub trait ConnectionEvents: Send {
    /// Called for every dispatched command line, already redacted:
    /// `AUTH` commands and continuation payloads never carry
    /// credential bytes here.
    fn on_command(&mut self, line: &str) {
        let _ = line;
    }

    /// Called when the connection records an error.
    fn on_error(&mut self, error: &Error) {
        let _ = error;
    }

    /// Called exactly once when the connection is destroyed.
    fn on_close(&mut self) {}
}

/// A no-op handler that ignores all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl ConnectionEvents for NoopEvents {}

/// A handler that logs notifications using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEvents;

impl ConnectionEvents for LoggingEvents {
    fn on_command(&mut self, line: &str) {
        tracing::debug!(command = line, "SMTP command");
    }

    fn on_error(&mut self, error: &Error) {
        tracing::warn!(%error, "SMTP connection error");
    }

    fn on_close(&mut self) {
        tracing::debug!("SMTP connection closed");
    }
}

/// A handler that collects notifications for later inspection.
///
/// Useful for testing.
#[derive(Debug, Default, Clone)]
pub struct CollectingEvents {
    /// Redacted command lines in dispatch order.
    pub commands: Vec<String>,
    /// Formatted errors in occurrence order.
    pub errors: Vec<String>,
    /// Number of close notifications received.
    pub closes: usize,
}

impl CollectingEvents {
    /// Creates a new collecting handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionEvents for CollectingEvents {
    fn on_command(&mut self, line: &str) {
        self.commands.push(line.to_string());
    }

    fn on_error(&mut self, error: &Error) {
        self.errors.push(error.to_string());
    }

    fn on_close(&mut self) {
        self.closes += 1;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_events() {
        let mut events = NoopEvents;
        events.on_command("NOOP");
        events.on_error(&Error::connection("refused"));
        events.on_close();
    }

    #[test]
    fn test_collecting_events() {
        let mut events = CollectingEvents::new();
        events.on_command("EHLO localhost");
        events.on_command("AUTH ***");
        events.on_error(&Error::connection("refused"));
        events.on_close();

        assert_eq!(events.commands, vec!["EHLO localhost", "AUTH ***"]);
        assert_eq!(events.errors.len(), 1);
        assert_eq!(events.closes, 1);
    }
}
