//! Error taxonomy for SMTP operations.

use serde::Serialize;
use std::fmt;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an SMTP client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The transport could not be established or was lost.
    ConnectionFailed,
    /// A handshake or idle timeout expired.
    ConnectionTimeout,
    /// Authentication was rejected or not possible.
    AuthFailed,
    /// TLS negotiation failed.
    TlsFailed,
    /// Every envelope recipient was rejected.
    InvalidRecipient,
    /// The envelope sender was rejected.
    InvalidSender,
    /// The message payload was rejected.
    MessageRejected,
    /// The server applied rate limiting.
    RateLimit,
    /// No connection slot was available.
    PoolExhausted,
    /// The client configuration or message record is unusable.
    InvalidConfig,
    /// Content could not be encoded or decoded.
    EncodingError,
    /// A lifecycle hook failed.
    PluginError,
    /// The server returned a 4xx/5xx protocol reply.
    SmtpError,
}

impl ErrorKind {
    /// Returns the stable string code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::AuthFailed => "AUTH_FAILED",
            Self::TlsFailed => "TLS_FAILED",
            Self::InvalidRecipient => "INVALID_RECIPIENT",
            Self::InvalidSender => "INVALID_SENDER",
            Self::MessageRejected => "MESSAGE_REJECTED",
            Self::RateLimit => "RATE_LIMIT",
            Self::PoolExhausted => "POOL_EXHAUSTED",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::EncodingError => "ENCODING_ERROR",
            Self::PluginError => "PLUGIN_ERROR",
            Self::SmtpError => "SMTP_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An SMTP client error.
///
/// Carries the kind, a human-readable message, and, when a server reply
/// was involved, the numeric status code and the raw response text. The
/// optional `solution` is a remediation hint.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{kind}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct Error {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Numeric server status code, when a reply was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Raw server response text, when a reply was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

impl Error {
    /// Creates an error with the given kind and message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            response: None,
            solution: None,
        }
    }

    /// Attaches a server status code.
    #[must_use]
    pub const fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attaches the raw server response.
    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    /// Attaches a remediation hint.
    #[must_use]
    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    /// Creates a `SMTP_ERROR` from a server reply.
    #[must_use]
    pub fn smtp(status_code: u16, response: impl Into<String>) -> Self {
        let response = response.into();
        Self::new(ErrorKind::SmtpError, format!("SMTP error {status_code}"))
            .with_status(status_code)
            .with_response(response)
    }

    /// Creates a `CONNECTION_FAILED` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailed, message)
    }

    /// Creates a `CONNECTION_TIMEOUT` error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionTimeout, message)
    }

    /// Creates a `TLS_FAILED` error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TlsFailed, message)
    }

    /// Creates an `AUTH_FAILED` error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailed, message)
    }

    /// Creates an `INVALID_CONFIG` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    /// Returns true if this is a permanent server rejection (5xx).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self.status_code, Some(code) if (500..600).contains(&code))
    }

    /// Returns true if this is a transient server rejection (4xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.status_code, Some(code) if (400..500).contains(&code))
    }

    /// Serializes the error to its stable JSON form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"kind\":\"{}\"}}", self.kind))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::connection(err.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Self::tls(err.to_string())
    }
}

impl From<postrider_mime::Error> for Error {
    fn from(err: postrider_mime::Error) -> Self {
        match &err {
            postrider_mime::Error::AttachmentRead { .. }
            | postrider_mime::Error::InvalidMessage(_) => {
                Self::new(ErrorKind::InvalidConfig, err.to_string())
            }
            _ => Self::new(ErrorKind::EncodingError, err.to_string()),
        }
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
    fn test_smtp_error_carries_reply() {
        let error = Error::smtp(550, "550 mailbox unavailable");
        assert_eq!(error.kind, ErrorKind::SmtpError);
        assert_eq!(error.status_code, Some(550));
        assert_eq!(error.response.as_deref(), Some("550 mailbox unavailable"));
        assert!(error.is_permanent());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        let error = Error::smtp(451, "451 try again");
        assert!(error.is_transient());
        assert!(!error.is_permanent());
    }

    #[test]
    fn test_json_form() {
        let error = Error::auth("Invalid credentials")
            .with_status(535)
            .with_response("535 5.7.8 denied")
            .with_solution("Check username and password");
        let json: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();

        assert_eq!(json["kind"], "AUTH_FAILED");
        assert_eq!(json["message"], "Invalid credentials");
        assert_eq!(json["statusCode"], 535);
        assert_eq!(json["response"], "535 5.7.8 denied");
        assert_eq!(json["solution"], "Check username and password");
    }

    #[test]
    fn test_json_omits_absent_fields() {
        let error = Error::connection("refused");
        let json: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();
        assert!(json.get("statusCode").is_none());
        assert!(json.get("response").is_none());
        assert!(json.get("solution").is_none());
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(ErrorKind::ConnectionTimeout.code(), "CONNECTION_TIMEOUT");
        assert_eq!(ErrorKind::InvalidRecipient.code(), "INVALID_RECIPIENT");
        assert_eq!(ErrorKind::SmtpError.code(), "SMTP_ERROR");
    }

    #[test]
    fn test_display() {
        let error = Error::timeout("greeting timed out");
        assert_eq!(error.to_string(), "CONNECTION_TIMEOUT: greeting timed out");
    }

    #[test]
    fn test_from_mime_error() {
        let mime_error = postrider_mime::Error::InvalidMessage("no subject".into());
        let error: Error = mime_error.into();
        assert_eq!(error.kind, ErrorKind::InvalidConfig);
    }
}
