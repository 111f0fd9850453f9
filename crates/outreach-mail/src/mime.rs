//! Outgoing message composition.
//!
//! Builds RFC 5322 / RFC 2046 messages: a single `text/plain` part, or a
//! `multipart/mixed` body with the text part followed by one attachment.
//! Pure functions, no I/O.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use rand::Rng;
use rand::distr::Alphanumeric;

/// RFC 2045 line limit for base64 bodies.
const BASE64_LINE_LENGTH: usize = 76;

/// RFC 5322 hard limit; longer lines force base64 for the text part.
const MAX_7BIT_LINE: usize = 998;

/// A binary part attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    /// Attachments in this system are always résumés, delivered as PDF
    /// whatever the source URL looked like.
    pub fn pdf(filename: &str, content: Vec<u8>) -> Self {
        Self {
            filename: normalize_pdf_filename(filename),
            content_type: "application/pdf".to_string(),
            content,
        }
    }
}

/// Append `.pdf` unless the name already ends with it (case-insensitive).
pub fn normalize_pdf_filename(filename: &str) -> String {
    let trimmed = filename.trim();
    let name = if trimmed.is_empty() { "resume" } else { trimmed };
    if name.to_ascii_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{}.pdf", name)
    }
}

/// Compose a complete message. `attachment: None` yields a single-part
/// plain message.
pub fn compose(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachment: Option<&Attachment>,
) -> Vec<u8> {
    let mut out = String::new();
    push_header(&mut out, "From", &sanitize_header(from));
    push_header(&mut out, "To", &sanitize_header(to));
    push_header(&mut out, "Subject", &encode_header_value(&sanitize_header(subject)));
    push_header(&mut out, "Date", &chrono::Utc::now().to_rfc2822());
    push_header(&mut out, "MIME-Version", "1.0");

    match attachment {
        None => push_text_part(&mut out, body),
        Some(att) => {
            let boundary = unique_boundary(body);
            push_header(
                &mut out,
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{}\"", boundary),
            );
            out.push_str("\r\n");

            // The CRLF before each later delimiter belongs to the delimiter,
            // not to the part it follows (RFC 2046 5.1.1).
            out.push_str(&format!("--{}\r\n", boundary));
            push_text_part(&mut out, body);

            let filename = quote_safe(&att.filename);
            out.push_str(&format!("\r\n--{}\r\n", boundary));
            push_header(
                &mut out,
                "Content-Type",
                &format!("{}; name=\"{}\"", att.content_type, filename),
            );
            push_header(&mut out, "Content-Transfer-Encoding", "base64");
            push_header(
                &mut out,
                "Content-Disposition",
                &format!("attachment; filename=\"{}\"", filename),
            );
            out.push_str("\r\n");
            out.push_str(&wrap_base64(&att.content));
            out.push_str(&format!("\r\n--{}--\r\n", boundary));
        }
    }

    out.into_bytes()
}

/// Headers and body of a `text/plain` part. 7bit when the body survives
/// SMTP untouched, base64 otherwise so the text round-trips exactly.
fn push_text_part(out: &mut String, body: &str) {
    push_header(out, "Content-Type", "text/plain; charset=\"UTF-8\"");
    if is_7bit_safe(body) {
        push_header(out, "Content-Transfer-Encoding", "7bit");
        out.push_str("\r\n");
        out.push_str(body);
    } else {
        push_header(out, "Content-Transfer-Encoding", "base64");
        out.push_str("\r\n");
        out.push_str(&wrap_base64(body.as_bytes()));
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// ASCII, no bare CR or LF, no overlong lines. CRLF pairs are allowed.
fn is_7bit_safe(body: &str) -> bool {
    if !body.is_ascii() || body.contains('\0') {
        return false;
    }
    let bytes = body.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\r' if bytes.get(i + 1) != Some(&b'\n') => return false,
            b'\n' if i == 0 || bytes[i - 1] != b'\r' => return false,
            _ => {}
        }
    }
    body.split("\r\n").all(|line| line.len() <= MAX_7BIT_LINE)
}

/// Base64 in lines of at most 76 characters joined by CRLF, with no
/// trailing line break.
fn wrap_base64(data: &[u8]) -> String {
    let encoded = B64.encode(data);
    encoded
        .as_bytes()
        .chunks(BASE64_LINE_LENGTH)
        // base64 output is ASCII
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// A fresh boundary token that does not occur in the text part.
fn unique_boundary(body: &str) -> String {
    loop {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        let boundary = format!("----=_Part_{}", token);
        if !body.contains(&boundary) {
            return boundary;
        }
    }
}

/// Header values must never carry line breaks (header injection).
fn sanitize_header(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

fn quote_safe(value: &str) -> String {
    sanitize_header(value).replace(['"', '\\'], "_")
}

/// RFC 2047 `B` encoding for non-ASCII header values.
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() && !value.contains("=?") {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", B64.encode(value.as_bytes()))
    }
}
