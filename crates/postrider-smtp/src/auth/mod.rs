//! SASL authentication.
//!
//! Implements PLAIN (RFC 4616), LOGIN, CRAM-MD5 (RFC 2195), and XOAUTH2
//! (Google/Microsoft). The mechanism is selected from the server's
//! advertised set; credentials pass through transiently and are zeroized
//! when authentication concludes.

use crate::command::Command;
use crate::connection::SmtpConnection;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{Capabilities, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::fmt::Write as _;
use tokio::io::{AsyncRead, AsyncWrite};

const PASSWORD_HINT: &str = "Check username and password";
const TOKEN_HINT: &str = "Check access token validity and scopes";

/// SASL mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// PLAIN - single base64 response (RFC 4616)
    Plain,
    /// LOGIN - legacy two-step username/password
    Login,
    /// CRAM-MD5 - challenge-response (RFC 2195)
    CramMd5,
    /// XOAUTH2 - bearer-token (Google/Microsoft)
    XOAuth2,
}

impl Mechanism {
    /// Returns the mechanism name as advertised in EHLO.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
        }
    }

    /// Parses a mechanism name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authentication credentials.
///
/// Secrets are held behind [`SecretString`] and never appear in `Debug`
/// output.
#[derive(Clone)]
pub struct Credentials {
    /// Username.
    pub user: String,
    password: Option<SecretString>,
    access_token: Option<SecretString>,
    mechanism: Option<Mechanism>,
}

impl Credentials {
    /// Creates password credentials.
    #[must_use]
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Some(SecretString::new(password.into())),
            access_token: None,
            mechanism: None,
        }
    }

    /// Creates OAuth2 access-token credentials.
    #[must_use]
    pub fn access_token(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: None,
            access_token: Some(SecretString::new(token.into())),
            mechanism: None,
        }
    }

    /// Forces a specific mechanism; the server must advertise it.
    #[must_use]
    pub const fn mechanism(mut self, mechanism: Mechanism) -> Self {
        self.mechanism = Some(mechanism);
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

/// Authenticates the connection.
///
/// Requires the server to advertise at least one AUTH mechanism. The
/// credentials are consumed and dropped (zeroizing their secrets) when
/// the exchange concludes.
///
/// # Errors
///
/// Returns `AUTH_FAILED` when the server does not support
/// authentication, no mechanism can be selected, required credential
/// material is missing, or the server rejects the exchange. Server
/// rejections preserve the status code and raw response and carry a
/// remediation hint.
pub async fn authenticate<S>(
    conn: &mut SmtpConnection<S>,
    credentials: Credentials,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if conn.capabilities().auth.is_empty() {
        return Err(Error::auth("Server does not support authentication"));
    }

    let mechanism = select_mechanism(&credentials, conn.capabilities())?;
    tracing::debug!(mechanism = %mechanism, user = %credentials.user, "Authenticating");

    match mechanism {
        Mechanism::Plain => {
            let password = require_password(&credentials, mechanism)?;
            auth_plain(conn, &credentials.user, password)
                .await
                .map_err(|e| wrap_rejection(e, PASSWORD_HINT))
        }
        Mechanism::Login => {
            let password = require_password(&credentials, mechanism)?;
            auth_login(conn, &credentials.user, password)
                .await
                .map_err(|e| wrap_rejection(e, PASSWORD_HINT))
        }
        Mechanism::CramMd5 => {
            let password = require_password(&credentials, mechanism)?;
            auth_cram_md5(conn, &credentials.user, password)
                .await
                .map_err(|e| wrap_rejection(e, PASSWORD_HINT))
        }
        Mechanism::XOAuth2 => {
            let token = credentials.access_token.as_ref().ok_or_else(|| {
                Error::auth("XOAUTH2 requires an access token").with_solution(TOKEN_HINT)
            })?;
            auth_xoauth2(conn, &credentials.user, token)
                .await
                .map_err(|e| wrap_rejection(e, TOKEN_HINT))
        }
    }
}

/// Selects the mechanism to use.
///
/// An explicitly requested mechanism must be advertised. Otherwise an
/// access token selects XOAUTH2 when offered, and password credentials
/// prefer CRAM-MD5 over LOGIN over PLAIN.
fn select_mechanism(
    credentials: &Credentials,
    capabilities: &Capabilities,
) -> Result<Mechanism> {
    if let Some(mechanism) = credentials.mechanism {
        if capabilities.supports_auth(mechanism.as_str()) {
            return Ok(mechanism);
        }
        return Err(Error::auth(format!(
            "Server does not advertise the {mechanism} mechanism"
        )));
    }

    if credentials.access_token.is_some() && capabilities.supports_auth("XOAUTH2") {
        return Ok(Mechanism::XOAuth2);
    }

    [Mechanism::CramMd5, Mechanism::Login, Mechanism::Plain]
        .into_iter()
        .find(|mechanism| capabilities.supports_auth(mechanism.as_str()))
        .ok_or_else(|| {
            Error::auth("No supported authentication mechanism available")
                .with_solution(PASSWORD_HINT)
        })
}

fn require_password<'a>(
    credentials: &'a Credentials,
    mechanism: Mechanism,
) -> Result<&'a SecretString> {
    credentials.password.as_ref().ok_or_else(|| {
        Error::auth(format!("{mechanism} requires a password")).with_solution(PASSWORD_HINT)
    })
}

/// Wraps a server rejection into `AUTH_FAILED`, preserving the status
/// code and raw response; transport errors pass through.
fn wrap_rejection(error: Error, solution: &str) -> Error {
    match error.kind {
        ErrorKind::SmtpError => {
            let mut wrapped = Error::auth(format!(
                "Authentication failed: {}",
                error.response.as_deref().unwrap_or(&error.message)
            ))
            .with_solution(solution);
            wrapped.status_code = error.status_code;
            wrapped.response = error.response;
            wrapped
        }
        _ => error,
    }
}

/// PLAIN: `AUTH PLAIN base64(\0user\0pass)`.
async fn auth_plain<S>(
    conn: &mut SmtpConnection<S>,
    user: &str,
    password: &SecretString,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let payload = format!("\0{user}\0{}", password.expose_secret());
    let command = Command::Auth {
        mechanism: "PLAIN".to_string(),
        initial_response: Some(STANDARD.encode(payload)),
    };
    conn.dispatch(&command).await?;
    Ok(())
}

/// LOGIN: `AUTH LOGIN`, then base64 username and password after 334
/// prompts.
async fn auth_login<S>(
    conn: &mut SmtpConnection<S>,
    user: &str,
    password: &SecretString,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let reply = conn
        .dispatch(&Command::Auth {
            mechanism: "LOGIN".to_string(),
            initial_response: None,
        })
        .await?;
    expect_continue(reply.code)?;

    let reply = conn
        .dispatch(&Command::AuthData {
            payload: STANDARD.encode(user),
        })
        .await?;
    expect_continue(reply.code)?;

    conn.dispatch(&Command::AuthData {
        payload: STANDARD.encode(password.expose_secret()),
    })
    .await?;
    Ok(())
}

/// CRAM-MD5: decode the 334 challenge, respond with
/// `base64(user + " " + hex(HMAC-MD5(password, challenge)))`.
async fn auth_cram_md5<S>(
    conn: &mut SmtpConnection<S>,
    user: &str,
    password: &SecretString,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let reply = conn
        .dispatch(&Command::Auth {
            mechanism: "CRAM-MD5".to_string(),
            initial_response: None,
        })
        .await?;
    expect_continue(reply.code)?;

    let challenge = reply
        .lines
        .first()
        .map(|line| line.trim())
        .unwrap_or_default();
    let challenge = STANDARD
        .decode(challenge)
        .map_err(|_| Error::auth("Invalid CRAM-MD5 challenge").with_solution(PASSWORD_HINT))?;

    let digest = hmac_md5_hex(password.expose_secret().as_bytes(), &challenge)?;
    conn.dispatch(&Command::AuthData {
        payload: STANDARD.encode(format!("{user} {digest}")),
    })
    .await?;
    Ok(())
}

/// XOAUTH2: `AUTH XOAUTH2 base64(user=<u>\x01auth=Bearer <tok>\x01\x01)`.
/// A 334 reply carries error data; the client acknowledges with an empty
/// line and observes the final status.
async fn auth_xoauth2<S>(
    conn: &mut SmtpConnection<S>,
    user: &str,
    token: &SecretString,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let payload = format!("user={user}\x01auth=Bearer {}\x01\x01", token.expose_secret());
    let reply = conn
        .dispatch(&Command::Auth {
            mechanism: "XOAUTH2".to_string(),
            initial_response: Some(STANDARD.encode(payload)),
        })
        .await?;

    if reply.code == ReplyCode::AUTH_CONTINUE {
        conn.dispatch(&Command::AuthData {
            payload: String::new(),
        })
        .await?;
    }
    Ok(())
}

fn expect_continue(code: ReplyCode) -> Result<()> {
    if code == ReplyCode::AUTH_CONTINUE {
        Ok(())
    } else {
        Err(Error::auth("Unexpected authentication continuation")
            .with_status(code.as_u16())
            .with_solution(PASSWORD_HINT))
    }
}

/// Computes the lowercase hex HMAC-MD5 digest used by CRAM-MD5.
fn hmac_md5_hex(key: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Md5>::new_from_slice(key)
        .map_err(|e| Error::auth(format!("HMAC error: {e}")))?;
    mac.update(message);

    let digest = mac.finalize().into_bytes();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
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

    fn capabilities_with_auth(mechanisms: &[&str]) -> Capabilities {
        let mut capabilities = Capabilities::new();
        capabilities.auth = mechanisms.iter().map(|m| (*m).to_string()).collect();
        capabilities
    }

    #[test]
    fn test_mechanism_parse() {
        assert_eq!(Mechanism::parse("plain"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::parse("CRAM-MD5"), Some(Mechanism::CramMd5));
        assert_eq!(Mechanism::parse("XOAUTH2"), Some(Mechanism::XOAuth2));
        assert_eq!(Mechanism::parse("GSSAPI"), None);
    }

    #[test]
    fn test_select_explicit_mechanism() {
        let credentials =
            Credentials::password("u", "p").mechanism(Mechanism::Plain);
        let capabilities = capabilities_with_auth(&["PLAIN", "LOGIN"]);
        assert_eq!(
            select_mechanism(&credentials, &capabilities).unwrap(),
            Mechanism::Plain
        );
    }

    #[test]
    fn test_select_explicit_not_advertised() {
        let credentials =
            Credentials::password("u", "p").mechanism(Mechanism::CramMd5);
        let capabilities = capabilities_with_auth(&["PLAIN"]);
        let error = select_mechanism(&credentials, &capabilities).unwrap_err();
        assert_eq!(error.kind, ErrorKind::AuthFailed);
    }

    #[test]
    fn test_select_prefers_xoauth2_with_token() {
        let credentials = Credentials::access_token("u", "tok");
        let capabilities = capabilities_with_auth(&["PLAIN", "XOAUTH2"]);
        assert_eq!(
            select_mechanism(&credentials, &capabilities).unwrap(),
            Mechanism::XOAuth2
        );
    }

    #[test]
    fn test_select_priority_order() {
        let credentials = Credentials::password("u", "p");

        let capabilities = capabilities_with_auth(&["PLAIN", "LOGIN", "CRAM-MD5"]);
        assert_eq!(
            select_mechanism(&credentials, &capabilities).unwrap(),
            Mechanism::CramMd5
        );

        let capabilities = capabilities_with_auth(&["PLAIN", "LOGIN"]);
        assert_eq!(
            select_mechanism(&credentials, &capabilities).unwrap(),
            Mechanism::Login
        );

        let capabilities = capabilities_with_auth(&["PLAIN"]);
        assert_eq!(
            select_mechanism(&credentials, &capabilities).unwrap(),
            Mechanism::Plain
        );
    }

    #[test]
    fn test_select_none_available() {
        let credentials = Credentials::password("u", "p");
        let capabilities = capabilities_with_auth(&["GSSAPI"]);
        assert!(select_mechanism(&credentials, &capabilities).is_err());
    }

    #[test]
    fn test_cram_md5_known_answer() {
        // RFC 2195 example: challenge <12345.67890@example.com>,
        // password tanstaaftanstaaf.
        let challenge = STANDARD
            .decode("PDEyMzQ1LjY3ODkwQGV4YW1wbGUuY29tPg==")
            .unwrap();
        assert_eq!(
            String::from_utf8(challenge.clone()).unwrap(),
            "<12345.67890@example.com>"
        );

        let digest = hmac_md5_hex(b"tanstaaftanstaaf", &challenge).unwrap();
        assert_eq!(digest, "b913a602c7eda7a495b4e6e7334d3890");

        let response = STANDARD.encode(format!("tim {digest}"));
        let decoded = STANDARD.decode(&response).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "tim b913a602c7eda7a495b4e6e7334d3890"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = Credentials::password("user", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));

        let credentials = Credentials::access_token("user", "ya29.token");
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("ya29.token"));
    }

    #[test]
    fn test_wrap_rejection_preserves_reply() {
        let error = Error::smtp(535, "535 5.7.8 Bad credentials");
        let wrapped = wrap_rejection(error, PASSWORD_HINT);
        assert_eq!(wrapped.kind, ErrorKind::AuthFailed);
        assert_eq!(wrapped.status_code, Some(535));
        assert_eq!(wrapped.response.as_deref(), Some("535 5.7.8 Bad credentials"));
        assert_eq!(wrapped.solution.as_deref(), Some(PASSWORD_HINT));
    }

    #[test]
    fn test_wrap_rejection_passes_transport_errors() {
        let error = Error::timeout("idle");
        let wrapped = wrap_rejection(error, PASSWORD_HINT);
        assert_eq!(wrapped.kind, ErrorKind::ConnectionTimeout);
    }
}
