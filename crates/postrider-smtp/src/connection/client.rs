//! The SMTP connection state machine.

use super::config::Options;
use super::events::ConnectionEvents;
use super::stream::{SmtpStream, connect, connect_tls};
use super::State;
use crate::command::Command;
use crate::error::{Error, ErrorKind, Result};
use crate::parser::ReplyParser;
use crate::types::{Capabilities, Reply, ReplyCode};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// An SMTP connection over a transport `S`.
///
/// Owns the socket exclusively: every command is written and its reply
/// awaited before the next command can be dispatched, so replies match
/// commands in strict FIFO order.
pub struct SmtpConnection<S> {
    stream: S,
    parser: ReplyParser,
    state: State,
    capabilities: Capabilities,
    options: Options,
    events: Box<dyn ConnectionEvents>,
    server_greeting: String,
    secure: bool,
    close_emitted: bool,
}

impl<S> std::fmt::Debug for SmtpConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConnection")
            .field("state", &self.state)
            .field("secure", &self.secure)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl<S> SmtpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Establishes the session over an already-connected transport:
    /// reads the 220 greeting and performs the EHLO handshake (with HELO
    /// fallback), leaving the connection READY.
    ///
    /// # Errors
    ///
    /// Returns `CONNECTION_TIMEOUT` if the greeting does not arrive
    /// within the greeting timeout, or `CONNECTION_FAILED` if the server
    /// greets with anything but 220.
    pub async fn start(
        stream: S,
        options: Options,
        events: Box<dyn ConnectionEvents>,
    ) -> Result<Self> {
        let secure = options.secure;
        let mut conn = Self {
            stream,
            parser: ReplyParser::new(),
            state: State::Connecting,
            capabilities: Capabilities::new(),
            options,
            events,
            server_greeting: String::new(),
            secure,
            close_emitted: false,
        };

        let greeting_timeout = conn.options.greeting_timeout;
        let greeting = conn.read_reply(greeting_timeout).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            let error = Error::connection("Unexpected server greeting")
                .with_status(greeting.code.as_u16())
                .with_response(greeting.to_line());
            conn.fail(&error);
            return Err(error);
        }

        conn.server_greeting = greeting
            .lines
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        conn.state = State::Connected;
        tracing::debug!(server = %conn.server_greeting, "Greeting received");

        conn.ehlo().await?;
        conn.state = State::Ready;
        Ok(conn)
    }

    /// Sends EHLO and repopulates the capability table, falling back to
    /// HELO once if the server rejects EHLO. Capabilities stay empty
    /// after a HELO fallback.
    pub(crate) async fn ehlo(&mut self) -> Result<()> {
        self.capabilities = Capabilities::new();

        let hostname = self.options.name.clone();
        match self.dispatch(&Command::Ehlo { hostname }).await {
            Ok(reply) => {
                self.capabilities = Capabilities::from_ehlo_lines(&reply.lines);
                Ok(())
            }
            Err(error) if error.kind == ErrorKind::SmtpError => {
                tracing::warn!(%error, "EHLO rejected, falling back to HELO");
                let hostname = self.options.name.clone();
                self.dispatch(&Command::Helo { hostname }).await?;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Dispatches a client command.
    ///
    /// # Errors
    ///
    /// Returns `CONNECTION_FAILED` when the connection is not READY or
    /// SENDING, `SMTP_ERROR` carrying the code and raw response for a
    /// 4xx/5xx reply, or the underlying transport error.
    pub async fn send_command(&mut self, command: &Command) -> Result<Reply> {
        if !matches!(self.state, State::Ready | State::Sending) {
            return Err(Error::connection(format!(
                "Cannot send a command in the {:?} state",
                self.state
            )));
        }
        self.dispatch(command).await
    }

    /// Writes a command and awaits its reply without a state guard; used
    /// by the handshake and authentication phases.
    pub(crate) async fn dispatch(&mut self, command: &Command) -> Result<Reply> {
        let redacted = command.redacted();
        self.events.on_command(&redacted);
        tracing::debug!(command = %redacted, "Dispatching command");

        if let Err(error) = self.write_all(&command.serialize()).await {
            self.fail(&error);
            return Err(error);
        }

        let socket_timeout = self.options.socket_timeout;
        let reply = self.read_reply(socket_timeout).await?;

        if reply.is_positive() {
            Ok(reply)
        } else {
            Err(Error::smtp(reply.code.as_u16(), reply.to_line()))
        }
    }

    /// Transmits a composed payload in the DATA phase: splits on LF,
    /// dot-stuffs lines starting with `.`, terminates every line with
    /// CRLF, writes the lone-dot terminator, and awaits the final reply.
    ///
    /// # Errors
    ///
    /// Returns `SMTP_ERROR` if the server rejects the payload, or the
    /// underlying transport error.
    pub async fn write_payload(&mut self, payload: &str) -> Result<Reply> {
        let mut wire = Vec::with_capacity(payload.len() + 64);
        let mut lines = payload.split('\n').peekable();
        while let Some(line) = lines.next() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() && lines.peek().is_none() {
                // A trailing CRLF in the payload already terminated the
                // final line.
                break;
            }
            if line.starts_with('.') {
                wire.push(b'.');
            }
            wire.extend_from_slice(line.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }
        wire.extend_from_slice(b".\r\n");

        if let Err(error) = self.write_all(&wire).await {
            self.fail(&error);
            return Err(error);
        }

        let socket_timeout = self.options.socket_timeout;
        let reply = self.read_reply(socket_timeout).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(Error::smtp(reply.code.as_u16(), reply.to_line()))
        }
    }

    /// Sends QUIT, ignoring any error, and destroys the connection.
    pub async fn quit(&mut self) {
        self.state = State::Closing;
        let _ = self.dispatch(&Command::Quit).await;
        self.destroy();
    }

    /// Destroys the connection: moves to CLOSED (ERROR is sticky) and
    /// emits the close notification exactly once. The socket itself is
    /// released when the connection is dropped.
    pub fn destroy(&mut self) {
        if self.state != State::Error {
            self.state = State::Closed;
        }
        self.emit_close();
    }

    /// Returns the connection state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns the capability table from the most recent EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the connection options.
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Returns true when the transport is TLS (implicit or upgraded).
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns the hostname the server announced in its greeting.
    #[must_use]
    pub fn server_greeting(&self) -> &str {
        &self.server_greeting
    }

    /// Marks the start or end of a mail transaction.
    pub(crate) fn set_sending(&mut self, sending: bool) {
        if sending && self.state == State::Ready {
            self.state = State::Sending;
        } else if !sending && self.state == State::Sending {
            self.state = State::Ready;
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads until the parser yields a complete reply, bounding each
    /// read by `limit`.
    async fn read_reply(&mut self, limit: Duration) -> Result<Reply> {
        loop {
            if let Some(reply) = self.parser.next_reply() {
                return Ok(reply);
            }

            let mut buf = [0u8; 4096];
            match tokio::time::timeout(limit, self.stream.read(&mut buf)).await {
                Err(_) => {
                    let error = Error::timeout("Socket timed out waiting for a reply");
                    self.fail(&error);
                    return Err(error);
                }
                Ok(Err(io_error)) => {
                    let error = Error::from(io_error);
                    self.fail(&error);
                    return Err(error);
                }
                Ok(Ok(0)) => {
                    let error = Error::connection("Connection closed by server");
                    self.fail(&error);
                    return Err(error);
                }
                Ok(Ok(read)) => self.parser.push(&buf[..read]),
            }
        }
    }

    /// Records a terminal failure: ERROR state, error and close
    /// notifications.
    fn fail(&mut self, error: &Error) {
        self.state = State::Error;
        self.events.on_error(error);
        self.emit_close();
    }

    fn emit_close(&mut self) {
        if !self.close_emitted {
            self.close_emitted = true;
            self.events.on_close();
        }
    }
}

impl SmtpConnection<SmtpStream> {
    /// Opens a connection per the options: dials TCP (or implicit TLS),
    /// performs the greeting and EHLO handshake, and upgrades with
    /// STARTTLS when the connection is plaintext, the server offers it,
    /// and the caller has not disabled it.
    ///
    /// # Errors
    ///
    /// Returns `CONNECTION_TIMEOUT` if the handshake does not complete
    /// within the connection timeout, `TLS_FAILED` on TLS negotiation
    /// failure, or `CONNECTION_FAILED` on transport errors.
    pub async fn open(options: Options, events: Box<dyn ConnectionEvents>) -> Result<Self> {
        let dial = async {
            if options.secure {
                connect_tls(&options.host, options.port, &options.tls).await
            } else {
                connect(&options.host, options.port).await
            }
        };
        let stream = tokio::time::timeout(options.connection_timeout, dial)
            .await
            .map_err(|_| Error::timeout("Connection timed out during handshake"))??;
        tracing::info!(host = %options.host, port = options.port, secure = options.secure, "Connected");

        let mut conn = Self::start(stream, options, events).await?;

        if !conn.secure && conn.capabilities.starttls && !conn.options.disable_starttls {
            conn = conn.starttls().await?;
        }

        Ok(conn)
    }

    /// Issues STARTTLS, upgrades the transport in place, and re-issues
    /// EHLO over the encrypted channel. The capability table is replaced
    /// by the post-upgrade EHLO reply.
    ///
    /// # Errors
    ///
    /// Returns `TLS_FAILED` if the server rejects STARTTLS or the
    /// handshake fails. The connection is consumed either way; on
    /// failure it is unusable.
    pub async fn starttls(mut self) -> Result<Self> {
        let reply = match self.dispatch(&Command::StartTls).await {
            Ok(reply) => reply,
            Err(error) => {
                let mut tls = Error::tls(format!("STARTTLS rejected: {}", error.message));
                tls.status_code = error.status_code;
                tls.response = error.response;
                if error.kind == ErrorKind::SmtpError {
                    // Transport failures already emitted their events.
                    self.fail(&tls);
                }
                return Err(tls);
            }
        };
        if reply.code != ReplyCode::SERVICE_READY {
            let tls = Error::tls("Unexpected STARTTLS reply")
                .with_status(reply.code.as_u16())
                .with_response(reply.to_line());
            self.fail(&tls);
            return Err(tls);
        }

        let Self {
            stream,
            parser: _,
            state,
            capabilities: _,
            options,
            mut events,
            server_greeting,
            secure: _,
            close_emitted,
        } = self;

        match stream.upgrade_to_tls(&options.host, &options.tls).await {
            Ok(stream) => {
                let mut conn = Self {
                    stream,
                    // No plaintext bytes may survive the upgrade.
                    parser: ReplyParser::new(),
                    state,
                    capabilities: Capabilities::new(),
                    options,
                    events,
                    server_greeting,
                    secure: true,
                    close_emitted,
                };
                conn.ehlo().await?;
                tracing::info!("STARTTLS upgrade complete");
                Ok(conn)
            }
            Err(error) => {
                events.on_error(&error);
                if !close_emitted {
                    events.on_close();
                }
                Err(error)
            }
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
    use crate::connection::NoopEvents;
    use tokio::io::AsyncWriteExt as _;

    async fn start_over_duplex(
        server_bytes: &[u8],
        options: Options,
    ) -> (Result<SmtpConnection<tokio::io::DuplexStream>>, tokio::io::DuplexStream) {
        let (client_io, mut server_io) = tokio::io::duplex(4096);
        server_io.write_all(server_bytes).await.unwrap();
        let conn = SmtpConnection::start(client_io, options, Box::new(NoopEvents)).await;
        (conn, server_io)
    }

    #[tokio::test]
    async fn test_handshake_reaches_ready() {
        let (conn, _server) = start_over_duplex(
            b"220 ready\r\n250-host\r\n250 STARTTLS\r\n",
            Options::builder("host").build(),
        )
        .await;
        let conn = conn.unwrap();
        assert_eq!(conn.state(), State::Ready);
        assert!(conn.capabilities().starttls);
    }

    #[tokio::test]
    async fn test_second_ehlo_replaces_capabilities() {
        let (conn, mut server) = start_over_duplex(
            b"220 ready\r\n250-host\r\n250 STARTTLS\r\n",
            Options::builder("host").build(),
        )
        .await;
        let mut conn = conn.unwrap();
        assert!(conn.capabilities().starttls);

        // The reply to the next EHLO no longer offers STARTTLS.
        server
            .write_all(b"250-host\r\n250 AUTH PLAIN\r\n")
            .await
            .unwrap();
        conn.ehlo().await.unwrap();

        assert!(!conn.capabilities().starttls);
        assert_eq!(conn.capabilities().auth, vec!["PLAIN"]);
    }

    #[tokio::test]
    async fn test_greeting_timeout() {
        let options = Options::builder("host")
            .greeting_timeout(Duration::from_millis(20))
            .build();
        let (conn, _server) = start_over_duplex(b"", options).await;
        let error = conn.unwrap_err();
        assert_eq!(error.kind, ErrorKind::ConnectionTimeout);
    }

    #[tokio::test]
    async fn test_socket_timeout_on_command() {
        let options = Options::builder("host")
            .socket_timeout(Duration::from_millis(20))
            .build();
        let (conn, _server) =
            start_over_duplex(b"220 ready\r\n250 host\r\n", options).await;
        let mut conn = conn.unwrap();

        let error = conn
            .send_command(&Command::Noop)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ConnectionTimeout);
        assert_eq!(conn.state(), State::Error);
    }
}
