//! Outgoing message model.

use crate::address::Mailbox;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// Transfer encoding for attachment content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII, emitted verbatim.
    SevenBit,
    /// Base64 encoding, wrapped at 76 columns.
    #[default]
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Parses a transfer encoding name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "quoted-printable" => Self::QuotedPrintable,
            "7bit" => Self::SevenBit,
            _ => Self::Base64,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
        }
    }
}

/// Message priority, emitted as `X-Priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// `1 (Highest)`.
    High,
    /// `3 (Normal)`.
    Normal,
    /// `5 (Lowest)`.
    Low,
}

impl Priority {
    /// Returns the `X-Priority` header value.
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::High => "1 (Highest)",
            Self::Normal => "3 (Normal)",
            Self::Low => "5 (Lowest)",
        }
    }
}

/// Attachment content source: owned bytes or a filesystem path.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// Content held in memory.
    Bytes(Vec<u8>),
    /// Content loaded from a file when the message is composed.
    Path(PathBuf),
}

/// A message attachment.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Content bytes or path.
    pub source: AttachmentSource,
    /// Filename; derived from the path basename when absent.
    pub filename: Option<String>,
    /// MIME content type.
    pub content_type: String,
    /// Content disposition (`attachment` or `inline`).
    pub disposition: String,
    /// Transfer encoding for the part body.
    pub encoding: TransferEncoding,
    /// Content-ID for inline references.
    pub cid: Option<String>,
    /// Extra part headers in insertion order.
    pub headers: Vec<(String, String)>,
}

impl Attachment {
    /// Creates an attachment from owned bytes.
    #[must_use]
    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        Self::with_source(AttachmentSource::Bytes(content.into()))
    }

    /// Creates an attachment that loads its content from a file path.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_source(AttachmentSource::Path(path.into()))
    }

    fn with_source(source: AttachmentSource) -> Self {
        Self {
            source,
            filename: None,
            content_type: "application/octet-stream".to_string(),
            disposition: "attachment".to_string(),
            encoding: TransferEncoding::Base64,
            cid: None,
            headers: Vec::new(),
        }
    }

    /// Sets the filename.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets the content disposition.
    #[must_use]
    pub fn disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = disposition.into();
        self
    }

    /// Sets the transfer encoding.
    #[must_use]
    pub const fn encoding(mut self, encoding: TransferEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the Content-ID.
    #[must_use]
    pub fn cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    /// Adds an extra part header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// An outgoing email message.
///
/// Built via [`MessageBuilder`]; validated at build time.
#[derive(Debug, Clone)]
pub struct Message {
    /// Sender mailbox.
    pub from: Mailbox,
    /// Primary recipients.
    pub to: Vec<Mailbox>,
    /// Carbon-copy recipients.
    pub cc: Vec<Mailbox>,
    /// Blind-carbon-copy recipients; never emitted in headers.
    pub bcc: Vec<Mailbox>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Attachments in insertion order.
    pub attachments: Vec<Attachment>,
    /// User-supplied headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Priority, emitted as `X-Priority` when set.
    pub priority: Option<Priority>,
    /// `References` header value.
    pub references: Option<String>,
    /// `In-Reply-To` header value.
    pub in_reply_to: Option<String>,
    /// Explicit `Message-ID`; synthesized when absent.
    pub message_id: Option<String>,
    /// Explicit `Date`; the current instant is used when absent.
    pub date: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates a message builder.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }
}

/// Builder for [`Message`].
#[derive(Debug, Default)]
pub struct MessageBuilder {
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
    headers: Vec<(String, String)>,
    priority: Option<Priority>,
    references: Option<String>,
    in_reply_to: Option<String>,
    message_id: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    /// Sets the sender. Accepts a bare address or `Name <addr@host>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address shape is invalid.
    pub fn from(mut self, from: &str) -> Result<Self> {
        self.from = Some(Mailbox::parse(from)?);
        Ok(self)
    }

    /// Sets the sender mailbox.
    #[must_use]
    pub fn from_mailbox(mut self, from: Mailbox) -> Self {
        self.from = Some(from);
        self
    }

    /// Adds a primary recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address shape is invalid.
    pub fn to(mut self, to: &str) -> Result<Self> {
        self.to.push(Mailbox::parse(to)?);
        Ok(self)
    }

    /// Adds a carbon-copy recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address shape is invalid.
    pub fn cc(mut self, cc: &str) -> Result<Self> {
        self.cc.push(Mailbox::parse(cc)?);
        Ok(self)
    }

    /// Adds a blind-carbon-copy recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address shape is invalid.
    pub fn bcc(mut self, bcc: &str) -> Result<Self> {
        self.bcc.push(Mailbox::parse(bcc)?);
        Ok(self)
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Adds a user header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the `References` header value.
    #[must_use]
    pub fn references(mut self, references: impl Into<String>) -> Self {
        self.references = Some(references.into());
        self
    }

    /// Sets the `In-Reply-To` header value.
    #[must_use]
    pub fn in_reply_to(mut self, in_reply_to: impl Into<String>) -> Self {
        self.in_reply_to = Some(in_reply_to.into());
        self
    }

    /// Sets an explicit `Message-ID`.
    #[must_use]
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Sets an explicit `Date`.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Builds the message.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender is missing, there are no recipients,
    /// the subject is missing, or neither text nor HTML body is present.
    pub fn build(self) -> Result<Message> {
        let from = self
            .from
            .ok_or_else(|| Error::InvalidMessage("sender is required".into()))?;

        if self.to.is_empty() {
            return Err(Error::InvalidMessage(
                "at least one recipient is required".into(),
            ));
        }

        let subject = self
            .subject
            .ok_or_else(|| Error::InvalidMessage("subject is required".into()))?;

        if self.text.is_none() && self.html.is_none() {
            return Err(Error::InvalidMessage(
                "either a text or an html body is required".into(),
            ));
        }

        Ok(Message {
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject,
            text: self.text,
            html: self.html,
            attachments: self.attachments,
            headers: self.headers,
            priority: self.priority,
            references: self.references,
            in_reply_to: self.in_reply_to,
            message_id: self.message_id,
            date: self.date,
        })
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
    fn test_builder_minimal() {
        let message = Message::builder()
            .from("a@x.com")
            .unwrap()
            .to("b@y.com")
            .unwrap()
            .subject("hi")
            .text("hello")
            .build()
            .unwrap();

        assert_eq!(message.from.address(), "a@x.com");
        assert_eq!(message.to.len(), 1);
        assert_eq!(message.subject, "hi");
    }

    #[test]
    fn test_builder_requires_sender() {
        let result = Message::builder()
            .to("b@y.com")
            .unwrap()
            .subject("hi")
            .text("hello")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_recipient() {
        let result = Message::builder()
            .from("a@x.com")
            .unwrap()
            .subject("hi")
            .text("hello")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_body() {
        let result = Message::builder()
            .from("a@x.com")
            .unwrap()
            .to("b@y.com")
            .unwrap()
            .subject("hi")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_display_form_recipient() {
        let message = Message::builder()
            .from("Sender <a@x.com>")
            .unwrap()
            .to("Recipient <b@y.com>")
            .unwrap()
            .subject("hi")
            .html("<p>hello</p>")
            .build()
            .unwrap();

        assert_eq!(message.from.name.as_deref(), Some("Sender"));
        assert_eq!(message.to[0].address(), "b@y.com");
    }

    #[test]
    fn test_attachment_defaults() {
        let attachment = Attachment::from_bytes(b"data".to_vec());
        assert_eq!(attachment.content_type, "application/octet-stream");
        assert_eq!(attachment.disposition, "attachment");
        assert_eq!(attachment.encoding, TransferEncoding::Base64);
        assert!(attachment.filename.is_none());
        assert!(attachment.cid.is_none());
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("base64"), TransferEncoding::Base64);
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_priority_header_values() {
        assert_eq!(Priority::High.header_value(), "1 (Highest)");
        assert_eq!(Priority::Normal.header_value(), "3 (Normal)");
        assert_eq!(Priority::Low.header_value(), "5 (Lowest)");
    }
}
