//! Server capability table populated from the EHLO reply.

/// Capabilities advertised by the server.
///
/// Reset and repopulated on every EHLO, including the one that follows a
/// STARTTLS upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Advertised AUTH mechanisms, uppercased.
    pub auth: Vec<String>,
    /// Maximum message size, when advertised.
    pub size: Option<u64>,
    /// STARTTLS offered.
    pub starttls: bool,
    /// 8BITMIME transport.
    pub eight_bit_mime: bool,
    /// Command pipelining.
    pub pipelining: bool,
    /// Enhanced status codes.
    pub enhanced_status_codes: bool,
    /// UTF-8 addresses.
    pub smtputf8: bool,
    /// Unrecognized capability lines, kept verbatim for diagnostics.
    pub unknown: Vec<String>,
}

impl Capabilities {
    /// Creates an empty capability table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one EHLO capability line into the table.
    ///
    /// The greeting line echoing the server hostname must be skipped by
    /// the caller.
    pub fn parse_line(&mut self, line: &str) {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return;
        };

        match keyword.to_uppercase().as_str() {
            "AUTH" => {
                self.auth = parts.map(str::to_uppercase).collect();
            }
            "SIZE" => {
                self.size = parts.next().and_then(|s| s.parse().ok());
            }
            "STARTTLS" => self.starttls = true,
            "8BITMIME" => self.eight_bit_mime = true,
            "PIPELINING" => self.pipelining = true,
            "ENHANCEDSTATUSCODES" => self.enhanced_status_codes = true,
            "SMTPUTF8" => self.smtputf8 = true,
            _ => self.unknown.push(line.to_string()),
        }
    }

    /// Populates a fresh table from EHLO reply lines, dropping the first
    /// line (the server hostname echo).
    #[must_use]
    pub fn from_ehlo_lines(lines: &[String]) -> Self {
        let mut capabilities = Self::new();
        for line in lines.iter().skip(1) {
            capabilities.parse_line(line);
        }
        capabilities
    }

    /// Returns true if the server advertises the given AUTH mechanism
    /// (case-insensitive).
    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        let mechanism = mechanism.to_uppercase();
        self.auth.iter().any(|m| *m == mechanism)
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

    fn ehlo_lines(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_auth_uppercased() {
        let caps = Capabilities::from_ehlo_lines(&ehlo_lines(&[
            "smtp.example.com greets you",
            "AUTH plain login Cram-Md5",
        ]));
        assert_eq!(caps.auth, vec!["PLAIN", "LOGIN", "CRAM-MD5"]);
        assert!(caps.supports_auth("cram-md5"));
        assert!(!caps.supports_auth("XOAUTH2"));
    }

    #[test]
    fn test_parse_size() {
        let caps =
            Capabilities::from_ehlo_lines(&ehlo_lines(&["hostname", "SIZE 35882577"]));
        assert_eq!(caps.size, Some(35882577));
    }

    #[test]
    fn test_parse_size_without_value() {
        let caps = Capabilities::from_ehlo_lines(&ehlo_lines(&["hostname", "SIZE"]));
        assert_eq!(caps.size, None);
    }

    #[test]
    fn test_parse_boolean_tokens() {
        let caps = Capabilities::from_ehlo_lines(&ehlo_lines(&[
            "hostname",
            "STARTTLS",
            "8BITMIME",
            "PIPELINING",
            "ENHANCEDSTATUSCODES",
            "SMTPUTF8",
        ]));
        assert!(caps.starttls);
        assert!(caps.eight_bit_mime);
        assert!(caps.pipelining);
        assert!(caps.enhanced_status_codes);
        assert!(caps.smtputf8);
    }

    #[test]
    fn test_first_line_skipped() {
        let caps = Capabilities::from_ehlo_lines(&ehlo_lines(&["STARTTLS"]));
        assert!(!caps.starttls);
    }

    #[test]
    fn test_unknown_kept_verbatim() {
        let caps = Capabilities::from_ehlo_lines(&ehlo_lines(&["hostname", "CHUNKING"]));
        assert_eq!(caps.unknown, vec!["CHUNKING"]);
        assert!(!caps.starttls);
    }

    #[test]
    fn test_case_insensitive_keywords() {
        let caps = Capabilities::from_ehlo_lines(&ehlo_lines(&["hostname", "starttls"]));
        assert!(caps.starttls);
    }
}
