//! Content and header encoding primitives.
//!
//! Base64 and Quoted-Printable per RFC 2045, encoded-word header encoding
//! per RFC 2047, and header folding per RFC 5322.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum encoded line length for body encodings.
const MAX_LINE_LENGTH: usize = 76;

/// Maximum header line length before folding.
const MAX_HEADER_LENGTH: usize = 78;

/// Encodes data as Base64 (RFC 4648, `=` padding).
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Encodes data as Base64 with a CRLF inserted every `line_len` output
/// characters. The final chunk carries no terminator.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8], line_len: usize) -> String {
    let encoded = STANDARD.encode(data);
    if line_len == 0 || encoded.len() <= line_len {
        return encoded;
    }

    let mut result = String::with_capacity(encoded.len() + 2 * (encoded.len() / line_len));
    for (i, chunk) in encoded.as_bytes().chunks(line_len).enumerate() {
        if i > 0 {
            result.push_str("\r\n");
        }
        // Base64 output is pure ASCII, chunks cannot split a code point.
        result.push_str(std::str::from_utf8(chunk).unwrap_or_default());
    }
    result
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Bytes outside printable ASCII and `=` become `=HH`. Tab and space are
/// encoded only when they would end a line. A lone LF is normalized to
/// CRLF, a CRLF pair passes through, and a lone CR is encoded. Soft line
/// breaks (`=\r\n`) keep encoded lines within 76 characters and never
/// split an escape sequence.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = String::with_capacity(bytes.len());
    let mut line_length = 0;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];

        // Hard line breaks reset the column counter.
        if byte == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            result.push_str("\r\n");
            line_length = 0;
            i += 2;
            continue;
        }
        if byte == b'\n' {
            result.push_str("\r\n");
            line_length = 0;
            i += 1;
            continue;
        }

        let at_line_end =
            i + 1 == bytes.len() || bytes[i + 1] == b'\r' || bytes[i + 1] == b'\n';

        let mut token = String::new();
        match byte {
            b'\t' | b' ' if at_line_end => {
                let _ = write!(token, "={byte:02X}");
            }
            b'\t' | b' ' => token.push(byte as char),
            b'!'..=b'<' | b'>'..=b'~' => token.push(byte as char),
            _ => {
                let _ = write!(token, "={byte:02X}");
            }
        }

        // Reserve one column for a possible soft-break marker.
        if line_length + token.len() > MAX_LINE_LENGTH - 1 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        line_length += token.len();
        result.push_str(&token);
        i += 1;
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// `=HH` yields the byte, `=` before CRLF is a soft break and vanishes,
/// and `=` before anything else passes through literally.
///
/// # Errors
///
/// Returns an error if the decoded bytes are not valid UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' {
            if let (Some(&hi), Some(&lo)) = (bytes.get(i + 1), bytes.get(i + 2)) {
                if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() {
                    let hex = [hi, lo];
                    let hex = std::str::from_utf8(&hex).unwrap_or_default();
                    if let Ok(byte) = u8::from_str_radix(hex, 16) {
                        result.push(byte);
                        i += 3;
                        continue;
                    }
                }
                if hi == b'\r' && lo == b'\n' {
                    // Soft line break.
                    i += 3;
                    continue;
                }
            }
            result.push(b'=');
            i += 1;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(result).map_err(Into::into)
}

/// Encoded-word scheme for RFC 2047 header encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderScheme {
    /// Base64 (`B`) encoding.
    B,
    /// Quoted-Printable (`Q`) encoding with `_` for space.
    Q,
}

/// Encodes a header value as an RFC 2047 encoded word if needed.
///
/// All-ASCII input is returned unchanged; otherwise the value is wrapped
/// as `=?charset?B?..?=` or `=?charset?Q?..?=`.
#[must_use]
pub fn encode_header(text: &str, scheme: HeaderScheme, charset: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    match scheme {
        HeaderScheme::B => {
            format!("=?{charset}?B?{}?=", encode_base64(text.as_bytes()))
        }
        HeaderScheme::Q => {
            let mut payload = String::with_capacity(text.len());
            for byte in text.as_bytes() {
                match byte {
                    b' ' => payload.push('_'),
                    b if b.is_ascii_alphanumeric() => payload.push(*b as char),
                    b => {
                        let _ = write!(payload, "={b:02X}");
                    }
                }
            }
            format!("=?{charset}?Q?{payload}?=")
        }
    }
}

/// Decodes RFC 2047 encoded words within a header value.
///
/// Segments that are not encoded words, and encoded words with malformed
/// payloads, are returned unchanged.
#[must_use]
pub fn decode_header(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        result.push_str(before);

        match split_encoded_word(candidate) {
            Some((word, tail)) => {
                match decode_encoded_word(word) {
                    Some(decoded) => result.push_str(&decoded),
                    None => result.push_str(word),
                }
                rest = tail;
            }
            None => {
                // No closing marker; keep the remainder verbatim.
                result.push_str(candidate);
                return result;
            }
        }
    }

    result.push_str(rest);
    result
}

/// Splits `=?..?=` off the front of `s`, returning the word and the tail.
fn split_encoded_word(s: &str) -> Option<(&str, &str)> {
    let end = s.find("?=")?;
    Some((&s[..end + 2], &s[end + 2..]))
}

/// Decodes a single `=?charset?scheme?payload?=` word.
fn decode_encoded_word(word: &str) -> Option<String> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let _charset = parts.next()?;
    let scheme = parts.next()?;
    let payload = parts.next()?;

    match scheme {
        "B" | "b" => {
            let bytes = decode_base64(payload).ok()?;
            String::from_utf8(bytes).ok()
        }
        "Q" | "q" => {
            let spaced = payload.replace('_', " ");
            decode_quoted_printable(&spaced).ok()
        }
        _ => None,
    }
}

/// Folds a header line at whitespace to stay within 78 columns.
///
/// Continuation lines start with CRLF plus a single space. Words are
/// never split, so encoded words survive folding intact.
#[must_use]
pub fn fold_header(line: &str) -> String {
    if line.len() <= MAX_HEADER_LENGTH {
        return line.to_string();
    }

    let mut result = String::with_capacity(line.len() + 8);
    let mut current = String::new();

    for word in line.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() > MAX_HEADER_LENGTH {
            result.push_str(&current);
            result.push_str("\r\n");
            current.clear();
            current.push(' ');
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }

    result.push_str(&current);
    result
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
    fn test_base64_round_trip() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base64_round_trip_binary() {
        let data: Vec<u8> = (0..=255).collect();
        let encoded = encode_base64(&data);
        assert_eq!(decode_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base64_wrapped_line_lengths() {
        let data = vec![0xAB_u8; 200];
        let wrapped = encode_base64_wrapped(&data, 76);

        let lines: Vec<&str> = wrapped.split("\r\n").collect();
        assert!(lines.len() > 1);
        for line in &lines[..lines.len() - 1] {
            assert_eq!(line.len(), 76);
        }
        assert!(lines.last().unwrap().len() <= 76);

        let joined: String = lines.concat();
        assert_eq!(decode_base64(&joined).unwrap(), data);
    }

    #[test]
    fn test_base64_wrapped_short_input() {
        assert_eq!(encode_base64_wrapped(b"hi", 76), "aGk=");
    }

    #[test]
    fn test_qp_ascii_passthrough() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");
    }

    #[test]
    fn test_qp_encodes_non_ascii() {
        let encoded = encode_quoted_printable("Héllo");
        assert_eq!(encoded, "H=C3=A9llo");
    }

    #[test]
    fn test_qp_encodes_equals() {
        assert_eq!(encode_quoted_printable("a=b"), "a=3Db");
    }

    #[test]
    fn test_qp_trailing_space_encoded() {
        assert_eq!(encode_quoted_printable("end "), "end=20");
        assert_eq!(encode_quoted_printable("end\t"), "end=09");
        assert_eq!(encode_quoted_printable("end \nnext"), "end=20\r\nnext");
    }

    #[test]
    fn test_qp_interior_space_literal() {
        assert_eq!(encode_quoted_printable("a b"), "a b");
    }

    #[test]
    fn test_qp_newline_normalization() {
        assert_eq!(encode_quoted_printable("a\nb"), "a\r\nb");
        assert_eq!(encode_quoted_printable("a\r\nb"), "a\r\nb");
        assert_eq!(encode_quoted_printable("a\rb"), "a=0Db");
    }

    #[test]
    fn test_qp_soft_break_line_length() {
        let long = "x".repeat(300);
        let encoded = encode_quoted_printable(&long);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76, "line too long: {}", line.len());
        }
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), long);
    }

    #[test]
    fn test_qp_soft_break_never_splits_escape() {
        let long = "é".repeat(100);
        let encoded = encode_quoted_printable(&long);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76);
            // A soft-broken line ends with a bare '=', never a partial =HH.
            let trimmed = line.strip_suffix('=').unwrap_or(line);
            let bytes = trimmed.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'=' {
                    assert!(i + 3 <= bytes.len(), "split escape in {line:?}");
                    assert!(bytes[i + 1].is_ascii_hexdigit());
                    assert!(bytes[i + 2].is_ascii_hexdigit());
                    i += 3;
                } else {
                    i += 1;
                }
            }
        }
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), long);
    }

    #[test]
    fn test_qp_round_trip() {
        let text = "Grüße aus München — ¡hola! こんにちは";
        let encoded = encode_quoted_printable(text);
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
    }

    #[test]
    fn test_qp_decode_soft_break() {
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld").unwrap(), "HelloWorld");
    }

    #[test]
    fn test_qp_decode_literal_equals() {
        // '=' followed by non-hex passes through.
        assert_eq!(decode_quoted_printable("a=zb").unwrap(), "a=zb");
        assert_eq!(decode_quoted_printable("trailing=").unwrap(), "trailing=");
    }

    #[test]
    fn test_header_encode_ascii_unchanged() {
        assert_eq!(encode_header("Hello", HeaderScheme::B, "utf-8"), "Hello");
        assert_eq!(encode_header("a=b?c", HeaderScheme::Q, "utf-8"), "a=b?c");
    }

    #[test]
    fn test_header_encode_b() {
        let encoded = encode_header("Héllo", HeaderScheme::B, "utf-8");
        assert_eq!(encoded, "=?utf-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_header_encode_q() {
        let encoded = encode_header("Héllo there", HeaderScheme::Q, "utf-8");
        assert_eq!(encoded, "=?utf-8?Q?H=C3=A9llo_there?=");
    }

    #[test]
    fn test_header_decode_round_trip() {
        for scheme in [HeaderScheme::B, HeaderScheme::Q] {
            let text = "Grüße und ☃";
            let encoded = encode_header(text, scheme, "utf-8");
            assert_eq!(decode_header(&encoded), text);
        }
    }

    #[test]
    fn test_header_decode_mixed_segments() {
        let input = "Re: =?utf-8?B?SMOpbGxv?= world";
        assert_eq!(decode_header(input), "Re: Héllo world");
    }

    #[test]
    fn test_header_decode_malformed_kept() {
        assert_eq!(decode_header("=?utf-8?B?!!!?="), "=?utf-8?B?!!!?=");
        assert_eq!(decode_header("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_header("lone =? marker"), "lone =? marker");
    }

    #[test]
    fn test_fold_short_line_unchanged() {
        assert_eq!(fold_header("Subject: hi"), "Subject: hi");
    }

    #[test]
    fn test_fold_long_line() {
        let line = format!("Subject: {}", "word ".repeat(30).trim_end());
        let folded = fold_header(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= 78);
        }
        assert!(folded.contains("\r\n "));
    }

    #[test]
    fn test_fold_keeps_encoded_word_whole() {
        let word = encode_header(&"é".repeat(30), HeaderScheme::B, "utf-8");
        let line = format!("Subject: padding padding padding padding padding {word}");
        let folded = fold_header(&line);
        assert!(folded.replace("\r\n ", " ").contains(&word));
    }
}
