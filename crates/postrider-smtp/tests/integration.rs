//! Integration tests for the SMTP client.
//!
//! These tests drive the connection state machine, authenticator, and
//! send orchestrator over a mock stream with scripted server responses,
//! without a real server.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use postrider_mime::Message;
use postrider_smtp::auth::{Credentials, Mechanism, authenticate};
use postrider_smtp::command::Command;
use postrider_smtp::{
    ConnectionEvents, ErrorKind, Options, SmtpConnection, State, send_message,
};

/// Captured bytes written by the client, shared with the test.
#[derive(Clone, Default)]
struct Wire(Arc<Mutex<Vec<u8>>>);

impl Wire {
    fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Mock stream returning scripted responses and capturing writes.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Wire,
}

impl MockStream {
    fn new(responses: &str) -> (Self, Wire) {
        let sent = Wire::default();
        (
            Self {
                responses: Cursor::new(responses.as_bytes().to_vec()),
                sent: sent.clone(),
            },
            sent,
        )
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Event handler sharing its records with the test.
#[derive(Clone, Default)]
struct SharedEvents {
    commands: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<usize>>,
}

impl ConnectionEvents for SharedEvents {
    fn on_command(&mut self, line: &str) {
        self.commands.lock().unwrap().push(line.to_string());
    }

    fn on_close(&mut self) {
        *self.closes.lock().unwrap() += 1;
    }
}

fn options() -> Options {
    Options::builder("mock.example.com").build()
}

async fn connect(script: &str) -> (SmtpConnection<MockStream>, Wire, SharedEvents) {
    let (stream, wire) = MockStream::new(script);
    let events = SharedEvents::default();
    let conn = SmtpConnection::start(stream, options(), Box::new(events.clone()))
        .await
        .expect("handshake failed");
    (conn, wire, events)
}

fn simple_message() -> Message {
    Message::builder()
        .from("a@x.com")
        .unwrap()
        .to("b@y.com")
        .unwrap()
        .subject("hi")
        .text("hello")
        .build()
        .unwrap()
}

#[tokio::test]
async fn plain_text_send() {
    let script = concat!(
        "220 mock.example.com ESMTP ready\r\n",
        "250-mock.example.com\r\n250 8BITMIME\r\n",
        "250 OK\r\n",
        "250 Accepted\r\n",
        "354 End data with <CR><LF>.<CR><LF>\r\n",
        "250 2.0.0 OK: queued as ABC123\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;
    assert_eq!(conn.state(), State::Ready);
    assert!(conn.capabilities().eight_bit_mime);

    let result = send_message(&mut conn, &simple_message()).await.unwrap();

    assert_eq!(result.accepted, vec!["b@y.com"]);
    assert!(result.rejected.is_empty());
    assert_eq!(result.message_id, "ABC123");
    assert_eq!(result.envelope.from, "a@x.com");
    assert!(result.response.contains("queued as ABC123"));

    let sent = wire.as_string();
    assert!(sent.contains("EHLO localhost\r\n"));
    assert!(sent.contains("MAIL FROM:<a@x.com>\r\n"));
    assert!(sent.contains("RCPT TO:<b@y.com>\r\n"));
    assert!(sent.contains("DATA\r\n"));
    assert!(sent.ends_with("hello\r\n.\r\n"));
}

#[tokio::test]
async fn dot_stuffing() {
    let script = concat!(
        "220 ready\r\n",
        "250 mock\r\n",
        "250 OK\r\n",
        "250 Accepted\r\n",
        "354 Go\r\n",
        "250 OK\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;

    let message = Message::builder()
        .from("a@x.com")
        .unwrap()
        .to("b@y.com")
        .unwrap()
        .subject("hi")
        .text(".leading\n..double")
        .build()
        .unwrap();
    send_message(&mut conn, &message).await.unwrap();

    let sent = wire.as_string();
    assert!(sent.contains("\r\n..leading\r\n...double\r\n.\r\n"));
    // The lone-dot terminator appears exactly once.
    assert_eq!(sent.matches("\r\n.\r\n").count(), 1);
    assert!(sent.ends_with("...double\r\n.\r\n"));
}

#[tokio::test]
async fn partial_rejection() {
    let script = concat!(
        "220 ready\r\n",
        "250 mock\r\n",
        "250 OK\r\n",
        "250 Accepted\r\n",
        "550 No such user\r\n",
        "354 Go\r\n",
        "250 OK: queued as XYZ\r\n",
    );
    let (mut conn, _, _) = connect(script).await;

    let message = Message::builder()
        .from("a@x.com")
        .unwrap()
        .to("ok@x.com")
        .unwrap()
        .to("bad@x.com")
        .unwrap()
        .subject("hi")
        .text("hello")
        .build()
        .unwrap();
    let result = send_message(&mut conn, &message).await.unwrap();

    assert_eq!(result.accepted, vec!["ok@x.com"]);
    assert_eq!(result.rejected, vec!["bad@x.com"]);
    assert_eq!(result.message_id, "XYZ");
}

#[tokio::test]
async fn all_recipients_rejected() {
    let script = concat!(
        "220 ready\r\n",
        "250 mock\r\n",
        "250 OK\r\n",
        "550 No\r\n",
        "550 No\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;

    let message = Message::builder()
        .from("a@x.com")
        .unwrap()
        .to("bad1@x.com")
        .unwrap()
        .to("bad2@x.com")
        .unwrap()
        .subject("hi")
        .text("hello")
        .build()
        .unwrap();
    let error = send_message(&mut conn, &message).await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::InvalidRecipient);
    assert_eq!(error.message, "All recipients were rejected");
    assert!(!wire.as_string().contains("DATA"));
}

#[tokio::test]
async fn sender_rejected() {
    let script = concat!(
        "220 ready\r\n",
        "250 mock\r\n",
        "553 Sender not allowed\r\n",
    );
    let (mut conn, _, _) = connect(script).await;

    let error = send_message(&mut conn, &simple_message()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::InvalidSender);
    assert_eq!(error.status_code, Some(553));
}

#[tokio::test]
async fn data_rejected() {
    let script = concat!(
        "220 ready\r\n",
        "250 mock\r\n",
        "250 OK\r\n",
        "250 Accepted\r\n",
        "354 Go\r\n",
        "554 Rejected for content\r\n",
    );
    let (mut conn, _, _) = connect(script).await;

    let error = send_message(&mut conn, &simple_message()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::MessageRejected);
    assert_eq!(error.status_code, Some(554));
}

#[tokio::test]
async fn starttls_advertised_and_auth_plain() {
    let script = concat!(
        "220 ready\r\n",
        "250-mock.example.com\r\n250-STARTTLS\r\n250 AUTH PLAIN LOGIN\r\n",
        "235 Accepted\r\n",
    );
    let (mut conn, wire, events) = connect(script).await;
    assert!(conn.capabilities().starttls);
    assert_eq!(conn.capabilities().auth, vec!["PLAIN", "LOGIN"]);

    let credentials = Credentials::password("user", "pass").mechanism(Mechanism::Plain);
    authenticate(&mut conn, credentials).await.unwrap();

    let expected = STANDARD.encode("\0user\0pass");
    let sent = wire.as_string();
    assert!(sent.contains(&format!("AUTH PLAIN {expected}\r\n")));

    // The command channel carries the redacted form only.
    let commands = events.commands.lock().unwrap().clone();
    assert!(commands.contains(&"AUTH ***".to_string()));
    assert!(commands.iter().all(|line| !line.contains(&expected)));
    assert!(commands.iter().all(|line| !line.contains("pass")));
}

#[tokio::test]
async fn auth_login_flow() {
    let script = concat!(
        "220 ready\r\n",
        "250-mock\r\n250 AUTH LOGIN\r\n",
        "334 VXNlcm5hbWU6\r\n",
        "334 UGFzc3dvcmQ6\r\n",
        "235 Accepted\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;

    let credentials = Credentials::password("user", "pass");
    authenticate(&mut conn, credentials).await.unwrap();

    let sent = wire.as_string();
    assert!(sent.contains("AUTH LOGIN\r\n"));
    assert!(sent.contains(&format!("{}\r\n", STANDARD.encode("user"))));
    assert!(sent.contains(&format!("{}\r\n", STANDARD.encode("pass"))));
}

#[tokio::test]
async fn auth_cram_md5_known_answer() {
    let script = concat!(
        "220 ready\r\n",
        "250-mock\r\n250 AUTH CRAM-MD5\r\n",
        "334 PDEyMzQ1LjY3ODkwQGV4YW1wbGUuY29tPg==\r\n",
        "235 Accepted\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;

    let credentials = Credentials::password("tim", "tanstaaftanstaaf");
    authenticate(&mut conn, credentials).await.unwrap();

    let expected = STANDARD.encode("tim b913a602c7eda7a495b4e6e7334d3890");
    assert!(wire.as_string().contains(&format!("{expected}\r\n")));
}

#[tokio::test]
async fn auth_xoauth2_error_roundtrip() {
    let script = concat!(
        "220 ready\r\n",
        "250-mock\r\n250 AUTH XOAUTH2\r\n",
        "334 eyJzdGF0dXMiOiI0MDEifQ==\r\n",
        "535 5.7.8 Bad token\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;

    let credentials = Credentials::access_token("user@x.com", "bad-token");
    let error = authenticate(&mut conn, credentials).await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::AuthFailed);
    assert_eq!(error.status_code, Some(535));
    assert_eq!(
        error.solution.as_deref(),
        Some("Check access token validity and scopes")
    );

    // The empty acknowledgement line was sent after the 334 error data.
    let sent = wire.as_string();
    let xoauth = STANDARD.encode("user=user@x.com\x01auth=Bearer bad-token\x01\x01");
    assert!(sent.contains(&format!("AUTH XOAUTH2 {xoauth}\r\n")));
    assert!(sent.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn auth_rejection_wrapped() {
    let script = concat!(
        "220 ready\r\n",
        "250-mock\r\n250 AUTH PLAIN\r\n",
        "535 5.7.8 Bad credentials\r\n",
    );
    let (mut conn, _, _) = connect(script).await;

    let error = authenticate(&mut conn, Credentials::password("u", "p"))
        .await
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::AuthFailed);
    assert_eq!(error.status_code, Some(535));
    assert!(error.response.as_deref().unwrap().contains("Bad credentials"));
    assert_eq!(error.solution.as_deref(), Some("Check username and password"));
}

#[tokio::test]
async fn auth_without_capability() {
    let script = concat!("220 ready\r\n", "250 mock\r\n");
    let (mut conn, _, _) = connect(script).await;

    let error = authenticate(&mut conn, Credentials::password("u", "p"))
        .await
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::AuthFailed);
    assert_eq!(error.message, "Server does not support authentication");
}

#[tokio::test]
async fn bcc_on_envelope_but_not_in_payload() {
    let script = concat!(
        "220 ready\r\n",
        "250 mock\r\n",
        "250 OK\r\n",
        "250 Accepted\r\n",
        "250 Accepted\r\n",
        "354 Go\r\n",
        "250 OK\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;

    let message = Message::builder()
        .from("a@x.com")
        .unwrap()
        .to("b@y.com")
        .unwrap()
        .bcc("hidden@z.com")
        .unwrap()
        .subject("hi")
        .text("hello")
        .build()
        .unwrap();
    let result = send_message(&mut conn, &message).await.unwrap();
    assert_eq!(result.envelope.to, vec!["b@y.com", "hidden@z.com"]);

    let sent = wire.as_string();
    assert!(sent.contains("RCPT TO:<hidden@z.com>\r\n"));

    // The DATA payload never names the blind recipient.
    let payload = sent.split("DATA\r\n").nth(1).unwrap();
    assert!(!payload.contains("hidden@z.com"));
    assert!(!payload.to_lowercase().contains("bcc"));
}

#[tokio::test]
async fn commands_dispatch_in_fifo_order() {
    let script = concat!(
        "220 ready\r\n",
        "250 mock\r\n",
        "250 OK\r\n",
        "250 Accepted\r\n",
        "354 Go\r\n",
        "250 OK\r\n",
    );
    let (mut conn, _, events) = connect(script).await;
    send_message(&mut conn, &simple_message()).await.unwrap();

    let commands = events.commands.lock().unwrap().clone();
    assert_eq!(
        commands,
        vec![
            "EHLO localhost",
            "MAIL FROM:<a@x.com>",
            "RCPT TO:<b@y.com>",
            "DATA",
        ]
    );
}

#[tokio::test]
async fn size_parameter_sent_when_advertised() {
    let script = concat!(
        "220 ready\r\n",
        "250-mock\r\n250 SIZE 35882577\r\n",
        "250 OK\r\n",
        "250 Accepted\r\n",
        "354 Go\r\n",
        "250 OK\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;
    send_message(&mut conn, &simple_message()).await.unwrap();

    let sent = wire.as_string();
    assert!(sent.contains("MAIL FROM:<a@x.com> SIZE="));
}

#[tokio::test]
async fn ehlo_falls_back_to_helo() {
    let script = concat!(
        "220 ready\r\n",
        "502 Command not implemented\r\n",
        "250 mock\r\n",
        "250 pong\r\n",
    );
    let (mut conn, wire, _) = connect(script).await;

    assert_eq!(conn.state(), State::Ready);
    assert!(conn.capabilities().auth.is_empty());
    assert!(!conn.capabilities().starttls);

    conn.send_command(&Command::Noop).await.unwrap();

    let sent = wire.as_string();
    assert!(sent.contains("EHLO localhost\r\n"));
    assert!(sent.contains("HELO localhost\r\n"));
}

#[tokio::test]
async fn unexpected_greeting_fails_connection() {
    let (stream, _) = MockStream::new("554 No service\r\n");
    let error = SmtpConnection::start(stream, options(), Box::new(SharedEvents::default()))
        .await
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::ConnectionFailed);
    assert_eq!(error.status_code, Some(554));
}

#[tokio::test]
async fn server_close_rejects_pending_command() {
    let script = concat!("220 ready\r\n", "250 mock\r\n");
    let (mut conn, _, events) = connect(script).await;

    // The script is exhausted; the next read sees EOF.
    let error = conn.send_command(&Command::Noop).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::ConnectionFailed);
    assert_eq!(conn.state(), State::Error);
    assert_eq!(*events.closes.lock().unwrap(), 1);

    // Further commands are refused in the ERROR state.
    let error = conn.send_command(&Command::Noop).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::ConnectionFailed);
}

#[tokio::test]
async fn quit_ignores_errors_and_closes_once() {
    let script = concat!("220 ready\r\n", "250 mock\r\n");
    let (mut conn, wire, events) = connect(script).await;

    conn.quit().await;
    assert!(wire.as_string().contains("QUIT\r\n"));
    assert_eq!(*events.closes.lock().unwrap(), 1);

    conn.destroy();
    assert_eq!(*events.closes.lock().unwrap(), 1, "close must fire once");
}

#[tokio::test]
async fn multiline_reply_capabilities() {
    let script = concat!(
        "220 mock.example.com ESMTP\r\n",
        "250-mock.example.com at your service\r\n",
        "250-SIZE 10000000\r\n",
        "250-8BITMIME\r\n",
        "250-PIPELINING\r\n",
        "250-ENHANCEDSTATUSCODES\r\n",
        "250-SMTPUTF8\r\n",
        "250 AUTH PLAIN LOGIN CRAM-MD5 XOAUTH2\r\n",
    );
    let (conn, _, _) = connect(script).await;

    let capabilities = conn.capabilities();
    assert_eq!(capabilities.size, Some(10000000));
    assert!(capabilities.eight_bit_mime);
    assert!(capabilities.pipelining);
    assert!(capabilities.enhanced_status_codes);
    assert!(capabilities.smtputf8);
    assert_eq!(
        capabilities.auth,
        vec!["PLAIN", "LOGIN", "CRAM-MD5", "XOAUTH2"]
    );
    assert_eq!(conn.server_greeting(), "mock.example.com");
}
