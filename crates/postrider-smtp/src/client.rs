//! High-level SMTP client: connect, send, verify, close.

use crate::auth::{Credentials, authenticate};
use crate::command::Command;
use crate::connection::{
    ConnectionEvents, LoggingEvents, Options, SmtpConnection, SmtpStream, State,
};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{Envelope, ReplyCode, SendResult};
use postrider_mime::{Message, compose};
use tokio::io::{AsyncRead, AsyncWrite};

/// Transmits a message over an established connection.
///
/// Issues MAIL FROM, one RCPT TO per envelope recipient (5xx/4xx
/// rejections are demoted to the `rejected` list), DATA, and the
/// dot-stuffed payload, and assembles the result.
///
/// # Errors
///
/// Returns `INVALID_SENDER` when MAIL FROM is rejected,
/// `INVALID_RECIPIENT` when every recipient is rejected,
/// `MESSAGE_REJECTED` when the DATA phase fails, `INVALID_CONFIG` /
/// `ENCODING_ERROR` for composition failures, or the underlying
/// transport error.
pub async fn send_message<S>(
    conn: &mut SmtpConnection<S>,
    message: &Message,
) -> Result<SendResult>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let envelope = Envelope::from_message(message);
    conn.set_sending(true);
    let result = transmit(conn, message, envelope).await;
    conn.set_sending(false);
    result
}

async fn transmit<S>(
    conn: &mut SmtpConnection<S>,
    message: &Message,
    envelope: Envelope,
) -> Result<SendResult>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // Compose up front so attachment and encoding failures surface
    // before any envelope command reaches the server.
    let composed = compose(message, &conn.options().name)?;

    let size = conn
        .capabilities()
        .size
        .map(|_| composed.payload.len());
    let mail_from = Command::MailFrom {
        from: envelope.from.clone(),
        size,
    };
    match conn.send_command(&mail_from).await {
        Ok(_) => {}
        Err(error) if error.kind == ErrorKind::SmtpError => {
            return Err(into_kind(
                error,
                ErrorKind::InvalidSender,
                "Sender rejected",
            ));
        }
        Err(error) => return Err(error),
    }

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for recipient in &envelope.to {
        let rcpt = Command::RcptTo {
            to: recipient.clone(),
        };
        match conn.send_command(&rcpt).await {
            Ok(_) => accepted.push(recipient.clone()),
            Err(error) if error.kind == ErrorKind::SmtpError => {
                tracing::debug!(recipient = %recipient, %error, "Recipient rejected");
                rejected.push(recipient.clone());
            }
            Err(error) => return Err(error),
        }
    }

    if accepted.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidRecipient,
            "All recipients were rejected",
        )
        .with_solution("Verify the recipient addresses"));
    }

    let data_reply = conn
        .send_command(&Command::Data)
        .await
        .map_err(reject_payload)?;
    if data_reply.code != ReplyCode::START_DATA {
        return Err(Error::new(
            ErrorKind::MessageRejected,
            "Server did not accept DATA",
        )
        .with_status(data_reply.code.as_u16())
        .with_response(data_reply.to_line()));
    }

    let final_reply = conn
        .write_payload(&composed.payload)
        .await
        .map_err(reject_payload)?;
    let response = final_reply.to_line();

    let message_id = extract_queue_id(&response).unwrap_or(composed.message_id);
    tracing::info!(
        message_id = %message_id,
        accepted = accepted.len(),
        rejected = rejected.len(),
        "Message sent"
    );

    Ok(SendResult {
        message_id,
        accepted,
        rejected,
        response,
        envelope,
    })
}

/// Maps a DATA-phase server rejection to `MESSAGE_REJECTED`; transport
/// errors pass through.
fn reject_payload(error: Error) -> Error {
    if error.kind == ErrorKind::SmtpError {
        into_kind(error, ErrorKind::MessageRejected, "Message rejected")
    } else {
        error
    }
}

fn into_kind(error: Error, kind: ErrorKind, context: &str) -> Error {
    let mut mapped = Error::new(
        kind,
        format!(
            "{context}: {}",
            error.response.as_deref().unwrap_or(&error.message)
        ),
    );
    mapped.status_code = error.status_code;
    mapped.response = error.response;
    mapped
}

/// Extracts the queue id from a `queued as XXXX` fragment.
fn extract_queue_id(response: &str) -> Option<String> {
    let rest = &response[response.find("queued as ")? + "queued as ".len()..];
    let token = rest.split_whitespace().next()?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// An SMTP submission client.
///
/// Wraps a lazily-opened [`SmtpConnection`]: the first `send` or
/// `verify` dials the server, performs the greeting/EHLO/STARTTLS
/// handshake, and authenticates when credentials are configured.
pub struct SmtpClient {
    options: Options,
    credentials: Option<Credentials>,
    events: Option<Box<dyn ConnectionEvents>>,
    connection: Option<SmtpConnection<SmtpStream>>,
}

impl std::fmt::Debug for SmtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpClient")
            .field("options", &self.options)
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl SmtpClient {
    /// Creates a client with the given options.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            options,
            credentials: None,
            events: None,
            connection: None,
        }
    }

    /// Sets the credentials used on connect.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Registers the notification handler installed on the next
    /// connection.
    #[must_use]
    pub fn events(mut self, events: Box<dyn ConnectionEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Opens the connection and authenticates. A no-op when already
    /// connected.
    ///
    /// # Errors
    ///
    /// Returns connection, TLS, or authentication errors.
    pub async fn connect(&mut self) -> Result<()> {
        if self
            .connection
            .as_ref()
            .is_some_and(|conn| matches!(conn.state(), State::Ready | State::Sending))
        {
            return Ok(());
        }
        self.connection = None;

        let events = self
            .events
            .take()
            .unwrap_or_else(|| Box::new(LoggingEvents));
        let mut conn = SmtpConnection::open(self.options.clone(), events).await?;

        if let Some(credentials) = self.credentials.clone() {
            authenticate(&mut conn, credentials).await?;
        }

        self.connection = Some(conn);
        Ok(())
    }

    /// Sends a message, opening the connection first when needed.
    ///
    /// Returns a result carrying the accepted and rejected recipient
    /// lists; per-recipient rejections do not abort the send unless
    /// every recipient is rejected.
    ///
    /// # Errors
    ///
    /// See [`send_message`].
    pub async fn send(&mut self, message: &Message) -> Result<SendResult> {
        let conn = self.ensure_connected().await?;
        send_message(conn, message).await
    }

    /// Verifies the connection by opening it (when needed) and issuing
    /// NOOP. Returns false on any failure.
    pub async fn verify(&mut self) -> bool {
        match self.ensure_connected().await {
            Ok(conn) => conn.send_command(&Command::Noop).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Resets the current mail transaction with RSET.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection is not established or the
    /// server rejects RSET.
    pub async fn reset(&mut self) -> Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::connection("Connection is not established"))?;
        conn.send_command(&Command::Rset).await?;
        Ok(())
    }

    /// Closes the connection with QUIT, ignoring errors.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.quit().await;
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut SmtpConnection<SmtpStream>> {
        self.connect().await?;
        self.connection
            .as_mut()
            .ok_or_else(|| Error::connection("Connection is not established"))
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
    fn test_extract_queue_id() {
        assert_eq!(
            extract_queue_id("250 2.0.0 OK: queued as ABC123"),
            Some("ABC123".to_string())
        );
        assert_eq!(
            extract_queue_id("250 2.0.0 queued as 4Xk9Tz 1234"),
            Some("4Xk9Tz".to_string())
        );
        assert_eq!(extract_queue_id("250 2.0.0 OK"), None);
        assert_eq!(extract_queue_id("250 queued as "), None);
    }

    #[test]
    fn test_into_kind_preserves_reply() {
        let error = Error::smtp(550, "550 no such user");
        let mapped = into_kind(error, ErrorKind::InvalidSender, "Sender rejected");
        assert_eq!(mapped.kind, ErrorKind::InvalidSender);
        assert_eq!(mapped.status_code, Some(550));
        assert_eq!(mapped.response.as_deref(), Some("550 no such user"));
        assert!(mapped.message.contains("Sender rejected"));
    }

    #[test]
    fn test_reject_payload_passes_transport_errors() {
        let error = Error::timeout("idle");
        assert_eq!(reject_payload(error).kind, ErrorKind::ConnectionTimeout);
    }
}
