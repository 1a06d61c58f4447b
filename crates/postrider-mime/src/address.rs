//! Email address and mailbox handling.

use crate::error::{Error, Result};
use std::fmt;

/// Extracts the bare `local@domain` address from a display form.
///
/// Returns the content of the angle brackets if present, otherwise the
/// trimmed input. Idempotent for bare addresses.
#[must_use]
pub fn extract_address(input: &str) -> &str {
    if let (Some(start), Some(end)) = (input.rfind('<'), input.rfind('>')) {
        if start < end {
            return &input[start + 1..end];
        }
    }
    input.trim()
}

/// A mailbox: an address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox from a bare address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address shape is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        validate(&address)?;
        Ok(Self {
            name: None,
            address,
        })
    }

    /// Creates a mailbox with a display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the address shape is invalid.
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        validate(&address)?;
        Ok(Self {
            name: Some(name.into()),
            address,
        })
    }

    /// Parses a mailbox from either a bare address or `Name <addr@host>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extracted address shape is invalid.
    pub fn parse(input: &str) -> Result<Self> {
        let address = extract_address(input);
        if address == input.trim() {
            return Self::new(address);
        }

        let name = input[..input.rfind('<').unwrap_or(0)]
            .trim()
            .trim_matches('"')
            .to_string();
        let mailbox = Self::new(address)?;
        if name.is_empty() {
            Ok(mailbox)
        } else {
            Ok(Self {
                name: Some(name),
                ..mailbox
            })
        }
    }

    /// Returns the bare address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "\"{}\" <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Validates the basic `local@domain` shape.
fn validate(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(Error::InvalidMessage("address cannot be empty".into()));
    }

    let mut parts = address.split('@');
    let (local, domain) = (parts.next(), parts.next());
    if parts.next().is_some() {
        return Err(Error::InvalidMessage(format!(
            "address must have exactly one @: {address}"
        )));
    }

    match (local, domain) {
        (Some(l), Some(d)) if !l.is_empty() && !d.is_empty() => Ok(()),
        _ => Err(Error::InvalidMessage(format!(
            "address must have local and domain parts: {address}"
        ))),
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
    fn test_extract_bare() {
        assert_eq!(extract_address("a@b.com"), "a@b.com");
    }

    #[test]
    fn test_extract_display_form() {
        assert_eq!(extract_address("Name <a@b.com>"), "a@b.com");
        assert_eq!(extract_address("\"Quoted Name\" <a@b.com>"), "a@b.com");
    }

    #[test]
    fn test_extract_idempotent() {
        let once = extract_address("Name <a@b.com>");
        assert_eq!(extract_address(once), once);
    }

    #[test]
    fn test_mailbox_parse_bare() {
        let mailbox = Mailbox::parse("user@example.com").unwrap();
        assert!(mailbox.name.is_none());
        assert_eq!(mailbox.address(), "user@example.com");
    }

    #[test]
    fn test_mailbox_parse_display() {
        let mailbox = Mailbox::parse("John Doe <john@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("John Doe"));
        assert_eq!(mailbox.address(), "john@example.com");
    }

    #[test]
    fn test_mailbox_parse_quoted_display() {
        let mailbox = Mailbox::parse("\"Doe, John\" <john@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Doe, John"));
    }

    #[test]
    fn test_mailbox_display() {
        let mailbox = Mailbox::with_name("John", "john@example.com").unwrap();
        assert_eq!(mailbox.to_string(), "\"John\" <john@example.com>");

        let bare = Mailbox::new("john@example.com").unwrap();
        assert_eq!(bare.to_string(), "john@example.com");
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        assert!(Mailbox::new("").is_err());
        assert!(Mailbox::new("no-at-sign").is_err());
        assert!(Mailbox::new("@domain").is_err());
        assert!(Mailbox::new("local@").is_err());
        assert!(Mailbox::new("a@b@c").is_err());
    }

    #[test]
    fn test_validate_accepts_minimal() {
        assert!(Mailbox::new("a@b.c").is_ok());
    }
}
