//! Reconstruction of an [`Email`] from the payload of a DATA section
//!
//! The payload is scanned line by line in two phases: the header block up to
//! the first blank line, then the body. Line endings are kept exactly as they
//! arrived so that the stored body compares equal to what the client sent.

use crate::smtp::email::Email;

use mailparse::{ParsedContentType, parse_content_type, parse_header, parse_mail};

/// Builds emails from dot-unstuffed DATA payloads
#[derive(Debug)]
pub struct MessageParser<'a> {
    from: &'a str,
    to: &'a str,
}

impl<'a> MessageParser<'a> {
    /// Create a parser for a message with the given envelope
    pub fn new(from: &'a str, to: &'a str) -> Self {
        Self { from, to }
    }

    /// Parse a payload into an email
    ///
    /// Only `Subject` is kept from the headers. The body is the message text
    /// decoded with its declared charset; for multipart messages it is the
    /// first plain text part. Attachments and non-text bodies are dropped.
    pub fn parse(&self, data: &[u8]) -> Email {
        let (headers, body) = split_headers(data);

        let subject = headers
            .get("Subject")
            .map(decode_header_value)
            .unwrap_or_default();
        let body = text_body(&headers, body).unwrap_or_default();

        Email::new(self.from, self.to, subject, body)
    }
}

#[derive(Debug)]
struct Header {
    name: String,
    value: String,
}

/// Unfolded headers of a message or a MIME part
#[derive(Debug, Default)]
struct HeaderBlock {
    headers: Vec<Header>,
}

impl HeaderBlock {
    /// First value of the named header, case-insensitive on the name
    ///
    /// Whitespace after the colon is skipped; trailing whitespace is part of
    /// the value.
    fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.trim_start())
    }

    fn content_type(&self) -> Option<ParsedContentType> {
        self.get("Content-Type").map(parse_content_type)
    }

    fn transfer_encoding(&self) -> Option<String> {
        self.get("Content-Transfer-Encoding")
            .map(|value| value.trim().to_ascii_lowercase())
    }

    fn is_attachment(&self) -> bool {
        self.get("Content-Disposition")
            .is_some_and(|value| value.to_ascii_lowercase().starts_with("attachment"))
    }
}

/// Split raw bytes into their header block and the body after the blank line
///
/// Data without a well-formed header block terminated by a blank line is all
/// body.
fn split_headers(data: &[u8]) -> (HeaderBlock, &[u8]) {
    let mut block = HeaderBlock::default();
    let mut offset = 0;

    for line in data.split_inclusive(|&b| b == b'\n') {
        offset += line.len();
        let content = strip_line_ending(line);

        if content.is_empty() {
            return (block, &data[offset..]);
        }

        if content.starts_with(b" ") || content.starts_with(b"\t") {
            match block.headers.last_mut() {
                Some(header) => {
                    header.value.push_str(&String::from_utf8_lossy(content));
                    continue;
                }
                None => break,
            }
        }

        let Some(colon) = content.iter().position(|&b| b == b':') else {
            break;
        };
        let name = &content[..colon];
        if !is_header_name(name) {
            break;
        }
        block.headers.push(Header {
            name: String::from_utf8_lossy(name).into_owned(),
            value: String::from_utf8_lossy(&content[colon + 1..]).into_owned(),
        });
    }

    (HeaderBlock::default(), data)
}

fn is_header_name(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().all(u8::is_ascii_graphic)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    match line.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => line,
    }
}

/// Decode RFC 2047 encoded-words, leaving plain values untouched
fn decode_header_value(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_owned();
    }

    let raw = format!("Subject: {value}");
    match parse_header(raw.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => value.to_owned(),
    }
}

/// Text of a message or part, or `None` when it carries no plain text
///
/// Attachments, non-text types and multiparts without a usable boundary
/// yield nothing, so attachment payloads never reach the stored body.
fn text_body(headers: &HeaderBlock, body: &[u8]) -> Option<String> {
    if headers.is_attachment() {
        return None;
    }

    match headers.content_type() {
        None => Some(decode_text(headers, body)),
        Some(content_type) if content_type.mimetype == "text/plain" => {
            Some(decode_text(headers, body))
        }
        Some(content_type) if content_type.mimetype.starts_with("multipart/") => content_type
            .params
            .get("boundary")
            .and_then(|boundary| first_plain_text(body, boundary)),
        Some(_) => None,
    }
}

/// Body of the first inline `text/plain` part, searching nested multiparts
fn first_plain_text(body: &[u8], boundary: &str) -> Option<String> {
    let delimiter = format!("--{boundary}");
    let mut part_start = None;
    let mut offset = 0;

    for line in body.split_inclusive(|&b| b == b'\n') {
        let line_start = offset;
        offset += line.len();

        let Some(rest) = strip_line_ending(line)
            .trim_ascii_end()
            .strip_prefix(delimiter.as_bytes())
        else {
            continue;
        };
        if !rest.is_empty() && rest != b"--" {
            continue;
        }

        if let Some(start) = part_start {
            // The line ending before a delimiter belongs to the delimiter.
            let part = strip_line_ending(&body[start..line_start]);
            if let Some(text) = plain_text_part(part) {
                return Some(text);
            }
        }

        if rest == b"--" {
            return None;
        }
        part_start = Some(offset);
    }

    part_start.and_then(|start| plain_text_part(&body[start..]))
}

fn plain_text_part(part: &[u8]) -> Option<String> {
    let (headers, body) = split_headers(part);
    text_body(&headers, body)
}

/// Decode a text body by transfer encoding and charset
///
/// UTF-8 and ASCII bodies without a transfer encoding are kept byte for
/// byte, line endings included.
fn decode_text(headers: &HeaderBlock, body: &[u8]) -> String {
    let encoded = matches!(
        headers.transfer_encoding().as_deref(),
        Some("quoted-printable" | "base64")
    );
    let unicode = headers.content_type().is_none_or(|content_type| {
        ["utf-8", "utf8", "us-ascii"]
            .iter()
            .any(|charset| content_type.charset.eq_ignore_ascii_case(charset))
    });
    if !encoded && unicode {
        return String::from_utf8_lossy(body).into_owned();
    }

    let mut raw = Vec::with_capacity(body.len() + 128);
    for name in ["Content-Type", "Content-Transfer-Encoding"] {
        if let Some(value) = headers.get(name) {
            raw.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
    }
    raw.extend_from_slice(b"\r\n");
    raw.extend_from_slice(body);

    parse_mail(&raw)
        .and_then(|part| part.get_body())
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
}
