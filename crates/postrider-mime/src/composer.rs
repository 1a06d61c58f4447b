//! RFC 5322 / MIME payload composition.
//!
//! Renders a [`Message`] into the CRLF-terminated payload transmitted in
//! the SMTP DATA phase. Header order is fixed; the body structure is
//! selected from the text/html/attachment combination.

use crate::address::Mailbox;
use crate::encoding::{
    HeaderScheme, encode_base64_wrapped, encode_header, encode_quoted_printable, fold_header,
};
use crate::error::{Error, Result};
use crate::message::{Attachment, AttachmentSource, Message, TransferEncoding};
use chrono::Utc;
use rand::Rng;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

/// Column width for wrapped base64 attachment bodies.
const BASE64_LINE_LENGTH: usize = 76;

/// A composed payload together with its `Message-ID`.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    /// The `Message-ID` placed in the headers.
    pub message_id: String,
    /// The full CRLF-terminated RFC 5322 payload.
    pub payload: String,
}

/// Composes a message into an RFC 5322 payload.
///
/// `hostname` is the client name used for synthesized `Message-ID`s.
///
/// # Errors
///
/// Returns an error if an attachment path cannot be read or attachment
/// content cannot be represented in the requested encoding.
pub fn compose(message: &Message, hostname: &str) -> Result<ComposedMessage> {
    let attachments: Vec<ResolvedAttachment> = message
        .attachments
        .iter()
        .map(ResolvedAttachment::resolve)
        .collect::<Result<_>>()?;

    let message_id = message
        .message_id
        .clone()
        .map_or_else(|| synthesize_message_id(hostname), normalize_message_id);

    let mut headers: Vec<String> = Vec::new();
    headers.push(fold_header(&format!(
        "From: {}",
        format_mailbox(&message.from)
    )));
    headers.push(fold_header(&format!(
        "To: {}",
        format_mailbox_list(&message.to)
    )));
    if !message.cc.is_empty() {
        headers.push(fold_header(&format!(
            "Cc: {}",
            format_mailbox_list(&message.cc)
        )));
    }
    headers.push(fold_header(&format!(
        "Subject: {}",
        encode_header(&message.subject, HeaderScheme::B, "utf-8")
    )));
    headers.push(format!(
        "Date: {}",
        message.date.unwrap_or_else(Utc::now).to_rfc2822()
    ));
    headers.push(format!("Message-ID: {message_id}"));
    if let Some(priority) = message.priority {
        headers.push(format!("X-Priority: {}", priority.header_value()));
    }
    if let Some(references) = &message.references {
        headers.push(fold_header(&format!("References: {references}")));
    }
    if let Some(in_reply_to) = &message.in_reply_to {
        headers.push(format!("In-Reply-To: {in_reply_to}"));
    }
    for (name, value) in &message.headers {
        headers.push(fold_header(&format!("{name}: {value}")));
    }
    headers.push("MIME-Version: 1.0".to_string());

    let body = compose_body(message, &attachments, &mut headers)?;

    let mut payload = headers.join("\r\n");
    payload.push_str("\r\n\r\n");
    payload.push_str(&body);

    Ok(ComposedMessage {
        message_id,
        payload,
    })
}

/// Selects the body structure and appends the content headers.
fn compose_body(
    message: &Message,
    attachments: &[ResolvedAttachment],
    headers: &mut Vec<String>,
) -> Result<String> {
    let text = message.text.as_deref();
    let html = message.html.as_deref();

    if attachments.is_empty() {
        return Ok(match (text, html) {
            (Some(text), None) => {
                headers.push("Content-Type: text/plain; charset=utf-8".to_string());
                headers.push("Content-Transfer-Encoding: quoted-printable".to_string());
                encode_quoted_printable(text)
            }
            (None, Some(html)) => {
                headers.push("Content-Type: text/html; charset=utf-8".to_string());
                headers.push("Content-Transfer-Encoding: quoted-printable".to_string());
                encode_quoted_printable(html)
            }
            (Some(text), Some(html)) => {
                let boundary = unique_boundary(message, attachments, &[]);
                headers.push(format!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\""
                ));
                render_alternative(text, html, &boundary)
            }
            // The builder guarantees at least one body.
            (None, None) => String::new(),
        });
    }

    let mixed_boundary = unique_boundary(message, attachments, &[]);
    headers.push(format!(
        "Content-Type: multipart/mixed; boundary=\"{mixed_boundary}\""
    ));

    let mut body = String::new();
    let content_part = match (text, html) {
        (Some(text), Some(html)) => {
            let alt_boundary =
                unique_boundary(message, attachments, &[mixed_boundary.as_str()]);
            let mut part = format!(
                "Content-Type: multipart/alternative; boundary=\"{alt_boundary}\"\r\n\r\n"
            );
            part.push_str(&render_alternative(text, html, &alt_boundary));
            part
        }
        (Some(text), None) => render_text_part(text, "plain"),
        (None, Some(html)) => render_text_part(html, "html"),
        (None, None) => String::new(),
    };

    if !content_part.is_empty() {
        let _ = write!(body, "--{mixed_boundary}\r\n{content_part}\r\n");
    }
    for attachment in attachments {
        let _ = write!(
            body,
            "--{mixed_boundary}\r\n{}\r\n",
            render_attachment(attachment)
        );
    }
    let _ = write!(body, "--{mixed_boundary}--\r\n");

    Ok(body)
}

/// Renders a `multipart/alternative` body: plain part first, then HTML.
fn render_alternative(text: &str, html: &str, boundary: &str) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "--{boundary}\r\n{}\r\n",
        render_text_part(text, "plain")
    );
    let _ = write!(
        body,
        "--{boundary}\r\n{}\r\n",
        render_text_part(html, "html")
    );
    let _ = write!(body, "--{boundary}--\r\n");
    body
}

/// Renders a quoted-printable `text/plain` or `text/html` part.
fn render_text_part(content: &str, subtype: &str) -> String {
    format!(
        "Content-Type: text/{subtype}; charset=utf-8\r\n\
         Content-Transfer-Encoding: quoted-printable\r\n\r\n{}",
        encode_quoted_printable(content)
    )
}

/// Renders an attachment part with its headers and encoded body.
fn render_attachment(attachment: &ResolvedAttachment) -> String {
    let mut part = String::new();

    match &attachment.filename {
        Some(filename) => {
            let _ = write!(
                part,
                "Content-Type: {}; name=\"{filename}\"\r\n\
                 Content-Disposition: {}; filename=\"{filename}\"\r\n",
                attachment.content_type, attachment.disposition
            );
        }
        None => {
            let _ = write!(
                part,
                "Content-Type: {}\r\nContent-Disposition: {}\r\n",
                attachment.content_type, attachment.disposition
            );
        }
    }

    let _ = write!(
        part,
        "Content-Transfer-Encoding: {}\r\n",
        attachment.encoding
    );
    if let Some(cid) = &attachment.cid {
        let _ = write!(part, "Content-ID: <{cid}>\r\n");
    }
    for (name, value) in &attachment.headers {
        let _ = write!(part, "{name}: {value}\r\n");
    }

    part.push_str("\r\n");
    part.push_str(&attachment.encoded_body);
    part
}

/// An attachment with its content loaded and encoded.
struct ResolvedAttachment {
    filename: Option<String>,
    content_type: String,
    disposition: String,
    encoding: TransferEncoding,
    cid: Option<String>,
    headers: Vec<(String, String)>,
    encoded_body: String,
}

impl ResolvedAttachment {
    fn resolve(attachment: &Attachment) -> Result<Self> {
        let (bytes, derived_name) = match &attachment.source {
            AttachmentSource::Bytes(bytes) => (bytes.clone(), None),
            AttachmentSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| Error::AttachmentRead {
                    path: path.clone(),
                    source,
                })?;
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                (bytes, name)
            }
        };

        let encoded_body = match attachment.encoding {
            TransferEncoding::Base64 => encode_base64_wrapped(&bytes, BASE64_LINE_LENGTH),
            TransferEncoding::QuotedPrintable => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    Error::InvalidEncoding(
                        "quoted-printable attachment content must be UTF-8".into(),
                    )
                })?;
                encode_quoted_printable(&text)
            }
            TransferEncoding::SevenBit => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    Error::InvalidEncoding("7bit attachment content must be UTF-8".into())
                })?;
                normalize_newlines(&text)
            }
        };

        Ok(Self {
            filename: attachment.filename.clone().or(derived_name),
            content_type: attachment.content_type.clone(),
            disposition: attachment.disposition.clone(),
            encoding: attachment.encoding,
            cid: attachment.cid.clone(),
            headers: attachment.headers.clone(),
            encoded_body,
        })
    }
}

/// Normalizes bare LF and CR line endings to CRLF.
fn normalize_newlines(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                result.push_str("\r\n");
                i += 2;
            }
            b'\r' | b'\n' => {
                result.push_str("\r\n");
                i += 1;
            }
            _ => {
                // Multi-byte code points never contain CR/LF bytes.
                let ch_len = utf8_len(bytes[i]);
                result.push_str(&text[i..i + ch_len]);
                i += ch_len;
            }
        }
    }
    result
}

const fn utf8_len(first: u8) -> usize {
    match first {
        0xF0..=0xF7 => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

/// Formats a mailbox for a header, encoding non-ASCII display names.
fn format_mailbox(mailbox: &Mailbox) -> String {
    match &mailbox.name {
        Some(name) if name.is_ascii() => format!("\"{name}\" <{}>", mailbox.address),
        Some(name) => format!(
            "{} <{}>",
            encode_header(name, HeaderScheme::B, "utf-8"),
            mailbox.address
        ),
        None => mailbox.address.clone(),
    }
}

fn format_mailbox_list(mailboxes: &[Mailbox]) -> String {
    mailboxes
        .iter()
        .map(format_mailbox)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Synthesizes a `Message-ID` of the form `<millis.random@hostname>`.
fn synthesize_message_id(hostname: &str) -> String {
    format!("<{}.{}@{hostname}>", epoch_millis(), random_base36(12))
}

/// Wraps a caller-supplied id in angle brackets when they are missing.
fn normalize_message_id(id: String) -> String {
    if id.starts_with('<') && id.ends_with('>') {
        id
    } else {
        format!("<{id}>")
    }
}

/// Generates a boundary unique against the message bodies, the encoded
/// attachment bodies, and any boundaries already chosen for outer levels.
fn unique_boundary(
    message: &Message,
    attachments: &[ResolvedAttachment],
    taken: &[&str],
) -> String {
    loop {
        let boundary = format!("----=_Part_{}_{}", epoch_millis(), random_base36(12));
        let collides = taken.contains(&boundary.as_str())
            || message
                .text
                .as_deref()
                .is_some_and(|t| t.contains(&boundary))
            || message
                .html
                .as_deref()
                .is_some_and(|h| h.contains(&boundary))
            || attachments
                .iter()
                .any(|a| a.encoded_body.contains(&boundary));
        if !collides {
            return boundary;
        }
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn random_base36(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
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
    use crate::message::Priority;

    fn base_message() -> crate::message::MessageBuilder {
        Message::builder()
            .from("a@x.com")
            .unwrap()
            .to("b@y.com")
            .unwrap()
            .subject("hi")
    }

    #[test]
    fn test_plain_text_structure() {
        let message = base_message().text("hello").build().unwrap();
        let composed = compose(&message, "localhost").unwrap();

        assert!(composed.payload.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(
            composed
                .payload
                .contains("Content-Transfer-Encoding: quoted-printable")
        );
        assert!(composed.payload.ends_with("hello"));
        assert!(!composed.payload.contains("multipart"));
    }

    #[test]
    fn test_html_only_structure() {
        let message = base_message().html("<p>hi</p>").build().unwrap();
        let composed = compose(&message, "localhost").unwrap();
        assert!(composed.payload.contains("Content-Type: text/html; charset=utf-8"));
    }

    #[test]
    fn test_alternative_structure() {
        let message = base_message()
            .text("plain")
            .html("<p>rich</p>")
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();

        assert!(composed.payload.contains("multipart/alternative"));
        let plain_pos = composed.payload.find("text/plain").unwrap();
        let html_pos = composed.payload.find("text/html").unwrap();
        assert!(plain_pos < html_pos, "plain part must come first");
        assert!(composed.payload.contains("--\r\n"));
    }

    #[test]
    fn test_mixed_with_attachment() {
        let attachment = Attachment::from_bytes(b"file-data".to_vec())
            .filename("data.bin")
            .cid("img1");
        let message = base_message()
            .text("plain")
            .html("<p>rich</p>")
            .attach(attachment)
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();

        assert!(composed.payload.contains("multipart/mixed"));
        assert!(composed.payload.contains("multipart/alternative"));
        assert!(composed.payload.contains("name=\"data.bin\""));
        assert!(composed.payload.contains("filename=\"data.bin\""));
        assert!(composed.payload.contains("Content-ID: <img1>"));
        assert!(composed.payload.contains("Content-Transfer-Encoding: base64"));
        assert!(composed.payload.contains(&encode_base64_wrapped(b"file-data", 76)));
    }

    #[test]
    fn test_nested_boundaries_differ() {
        let message = base_message()
            .text("plain")
            .html("<p>rich</p>")
            .attach(Attachment::from_bytes(b"x".to_vec()))
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();

        let boundaries: Vec<&str> = composed
            .payload
            .lines()
            .filter_map(|line| line.split("boundary=\"").nth(1))
            .filter_map(|rest| rest.split('"').next())
            .collect();
        assert_eq!(boundaries.len(), 2);
        assert_ne!(boundaries[0], boundaries[1]);
    }

    #[test]
    fn test_header_order() {
        let message = base_message()
            .text("hello")
            .priority(Priority::High)
            .header("X-Custom", "1")
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();

        let positions: Vec<usize> = [
            "From:",
            "To:",
            "Subject:",
            "Date:",
            "Message-ID:",
            "X-Priority:",
            "X-Custom:",
            "MIME-Version:",
            "Content-Type:",
        ]
        .iter()
        .map(|header| composed.payload.find(header).unwrap())
        .collect();

        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "headers out of order");
    }

    #[test]
    fn test_bcc_never_in_headers() {
        let message = base_message()
            .bcc("hidden@z.com")
            .unwrap()
            .text("hello")
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();
        assert!(!composed.payload.contains("hidden@z.com"));
        assert!(!composed.payload.to_lowercase().contains("bcc"));
    }

    #[test]
    fn test_cc_in_headers() {
        let message = base_message()
            .cc("copy@z.com")
            .unwrap()
            .text("hello")
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();
        assert!(composed.payload.contains("Cc: copy@z.com"));
    }

    #[test]
    fn test_explicit_message_id_kept() {
        let message = base_message()
            .text("hello")
            .message_id("<abc@x.com>")
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();
        assert_eq!(composed.message_id, "<abc@x.com>");
        assert!(composed.payload.contains("Message-ID: <abc@x.com>"));
    }

    #[test]
    fn test_synthesized_message_id_shape() {
        let message = base_message().text("hello").build().unwrap();
        let composed = compose(&message, "mail.example.com").unwrap();
        assert!(composed.message_id.starts_with('<'));
        assert!(composed.message_id.ends_with("@mail.example.com>"));
        assert!(composed.message_id.contains('.'));
    }

    #[test]
    fn test_non_ascii_subject_encoded() {
        let message = base_message()
            .subject("Grüße")
            .text("hello")
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();
        assert!(composed.payload.contains("Subject: =?utf-8?B?"));
        assert!(!composed.payload.contains("Grüße"));
    }

    #[test]
    fn test_attachment_path_missing_is_config_error() {
        let message = base_message()
            .text("hello")
            .attach(Attachment::from_path("/nonexistent/file.bin"))
            .build()
            .unwrap();
        let error = compose(&message, "localhost").unwrap_err();
        match error {
            Error::AttachmentRead { path, .. } => {
                assert_eq!(path.to_string_lossy(), "/nonexistent/file.bin");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_seven_bit_attachment_verbatim() {
        let attachment = Attachment::from_bytes(b"line1\nline2".to_vec())
            .encoding(TransferEncoding::SevenBit)
            .filename("notes.txt")
            .content_type("text/plain");
        let message = base_message().text("hello").attach(attachment).build().unwrap();
        let composed = compose(&message, "localhost").unwrap();
        assert!(composed.payload.contains("line1\r\nline2"));
        assert!(composed.payload.contains("Content-Transfer-Encoding: 7bit"));
    }

    #[test]
    fn test_crlf_line_termination() {
        let message = base_message().text("hello\nworld").build().unwrap();
        let composed = compose(&message, "localhost").unwrap();
        for line in composed.payload.split("\r\n") {
            assert!(!line.contains('\n'), "bare LF in payload line");
        }
    }

    #[test]
    fn test_references_and_reply_headers() {
        let message = base_message()
            .text("hello")
            .references("<one@x> <two@x>")
            .in_reply_to("<two@x>")
            .build()
            .unwrap();
        let composed = compose(&message, "localhost").unwrap();
        assert!(composed.payload.contains("References: <one@x> <two@x>"));
        assert!(composed.payload.contains("In-Reply-To: <two@x>"));
    }
}
