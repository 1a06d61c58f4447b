//! Incremental SMTP reply parser.
//!
//! SMTP replies are one or more lines of the shape `NNN(-| )text`. All
//! lines of a reply carry the same three-digit code; `-` in the fourth
//! column marks continuation and a space marks the final line:
//!
//! ```text
//! 250-First line
//! 250-Second line
//! 250 Last line
//! ```
//!
//! The parser accumulates raw bytes, splits CRLF-terminated lines,
//! discards lines that do not match the shape, and yields a [`Reply`]
//! once the terminating line arrives.

use crate::types::{Reply, ReplyCode};

/// Incremental reply parser over a byte buffer.
#[derive(Debug, Default)]
pub struct ReplyParser {
    buffer: Vec<u8>,
    pending_code: Option<u16>,
    pending_lines: Vec<String>,
    complete: Vec<Reply>,
}

impl ReplyParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds received bytes into the parser.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while let Some(line) = self.take_line() {
            self.consume_line(&line);
        }
    }

    /// Takes the next complete reply, if one has been assembled.
    pub fn next_reply(&mut self) -> Option<Reply> {
        if self.complete.is_empty() {
            None
        } else {
            Some(self.complete.remove(0))
        }
    }

    /// Extracts the next CRLF-terminated line from the buffer.
    fn take_line(&mut self) -> Option<String> {
        let pos = self
            .buffer
            .windows(2)
            .position(|window| window == b"\r\n")?;
        let line = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
        self.buffer.drain(..pos + 2);
        Some(line)
    }

    /// Folds one line into the pending reply, discarding malformed lines.
    fn consume_line(&mut self, line: &str) {
        let Some((code, last, text)) = split_reply_line(line) else {
            tracing::debug!(line, "Discarding malformed reply line");
            return;
        };

        match self.pending_code {
            None => {
                self.pending_code = Some(code);
                self.pending_lines.push(text.to_string());
            }
            Some(pending) if pending == code => {
                self.pending_lines.push(text.to_string());
            }
            Some(_) => {
                // Code changed mid-reply; the earlier lines cannot be
                // completed and are dropped.
                tracing::debug!(line, "Reply code changed mid-reply, dropping partial");
                self.pending_code = Some(code);
                self.pending_lines = vec![text.to_string()];
            }
        }

        if last {
            let lines = std::mem::take(&mut self.pending_lines);
            self.pending_code = None;
            self.complete.push(Reply::new(ReplyCode::new(code), lines));
        }
    }
}

/// Splits a reply line into `(code, is_last, text)`.
///
/// Returns `None` for lines not matching `NNN(-| )text`.
fn split_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return None;
    }
    if !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let code = line[..3].parse().ok()?;
    let last = match bytes[3] {
        b' ' => true,
        b'-' => false,
        _ => return None,
    };

    Some((code, last, &line[4..]))
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
    fn test_single_line_reply() {
        let mut parser = ReplyParser::new();
        parser.push(b"250 OK\r\n");

        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
        assert!(parser.next_reply().is_none());
    }

    #[test]
    fn test_multi_line_reply() {
        let mut parser = ReplyParser::new();
        parser.push(b"250-smtp.example.com\r\n250-SIZE 1000\r\n250 STARTTLS\r\n");

        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["smtp.example.com", "SIZE 1000", "STARTTLS"]);
    }

    #[test]
    fn test_partial_bytes() {
        let mut parser = ReplyParser::new();
        parser.push(b"220 smtp.exa");
        assert!(parser.next_reply().is_none());

        parser.push(b"mple.com ready\r\n");
        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.code.as_u16(), 220);
        assert_eq!(reply.lines, vec!["smtp.example.com ready"]);
    }

    #[test]
    fn test_continuation_held_until_final_line() {
        let mut parser = ReplyParser::new();
        parser.push(b"250-partial\r\n");
        assert!(parser.next_reply().is_none());

        parser.push(b"250 done\r\n");
        assert!(parser.next_reply().is_some());
    }

    #[test]
    fn test_two_replies_fifo() {
        let mut parser = ReplyParser::new();
        parser.push(b"250 first\r\n354 second\r\n");

        assert_eq!(parser.next_reply().unwrap().code.as_u16(), 250);
        assert_eq!(parser.next_reply().unwrap().code.as_u16(), 354);
    }

    #[test]
    fn test_malformed_lines_discarded() {
        let mut parser = ReplyParser::new();
        parser.push(b"garbage\r\nAB1 nope\r\n25 short\r\n250 OK\r\n");

        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
        assert!(parser.next_reply().is_none());
    }

    #[test]
    fn test_bare_code_without_separator_discarded() {
        let mut parser = ReplyParser::new();
        parser.push(b"250\r\n250 OK\r\n");

        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn test_empty_text_allowed() {
        let mut parser = ReplyParser::new();
        parser.push(b"250 \r\n");
        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.lines, vec![""]);
    }

    #[test]
    fn test_split_reply_line() {
        assert_eq!(split_reply_line("250 OK"), Some((250, true, "OK")));
        assert_eq!(split_reply_line("250-more"), Some((250, false, "more")));
        assert_eq!(split_reply_line("250"), None);
        assert_eq!(split_reply_line("2x0 OK"), None);
        assert_eq!(split_reply_line("250xOK"), None);
    }
}
