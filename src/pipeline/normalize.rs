//! Raw message bytes → `NormalizedEmail`.

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MessagePart, MimeHeaders};

use crate::error::ParseError;
use crate::mailbox::RawMessage;
use crate::pipeline::types::NormalizedEmail;

/// Decode one fetched buffer.
///
/// Fails only for this message; callers drop it from the batch and carry on.
/// A message without a `Date` header takes `fetched_at`.
pub fn normalize(raw: &RawMessage, fetched_at: DateTime<Utc>) -> Result<NormalizedEmail, ParseError> {
    let bytes = raw.as_bytes();
    check_header_section(bytes).map_err(|reason| ParseError {
        uid: raw.uid,
        reason: reason.to_string(),
    })?;

    let parsed = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| ParseError {
            uid: raw.uid,
            reason: "unparseable MIME structure".into(),
        })?;

    let subject = parsed.subject().map(|s| s.trim().to_string()).unwrap_or_default();
    let sender = extract_sender(&parsed);
    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(fetched_at);

    let html_body = parsed
        .html_part(0)
        .filter(|part| is_html(part))
        .and_then(part_text);
    let text_body = parsed
        .text_part(0)
        .filter(|part| !is_html(part))
        .and_then(part_text)
        .or_else(|| {
            // Single-part bodies with unusual content types still carry text.
            html_body
                .is_none()
                .then(|| parsed.body_text(0).map(|t| t.into_owned()))
                .flatten()
        });

    Ok(NormalizedEmail {
        uid: raw.uid,
        subject,
        sender,
        received_at,
        html_body,
        text_body,
    })
}

/// The buffer must open with a header field. Anything else is not a message.
fn check_header_section(bytes: &[u8]) -> Result<(), &'static str> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err("empty message buffer");
    }
    let first = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    let Some(colon) = first.iter().position(|&b| b == b':') else {
        return Err("no header section");
    };
    let name = &first[..colon];
    if name.is_empty() || !name.iter().all(|&b| b.is_ascii_graphic()) {
        return Err("no header section");
    }
    Ok(())
}

/// Sender address, else display name, else empty.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address().or(a.name()))
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn is_html(part: &MessagePart) -> bool {
    MimeHeaders::content_type(part)
        .map(|ct| {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("html"))
        })
        .unwrap_or(false)
}

fn part_text(part: &MessagePart) -> Option<String> {
    std::str::from_utf8(part.contents())
        .ok()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(uid: u32, bytes: &str) -> RawMessage {
        RawMessage::new(uid, vec![], bytes.as_bytes().to_vec())
    }

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn plain_text_message() {
        let msg = raw(
            3,
            "From: Dispatch Desk <dispatch@vendor.example>\r\n\
Subject:  Work Order C2959324 \r\n\
Date: Mon, 5 Jan 2026 14:48:00 +0000\r\n\
\r\n\
Building: Tower A Floor 3\r\n",
        );
        let email = normalize(&msg, fetched_at()).unwrap();
        assert_eq!(email.uid, 3);
        assert_eq!(email.subject, "Work Order C2959324");
        assert_eq!(email.sender, "dispatch@vendor.example");
        assert_eq!(
            email.received_at,
            Utc.with_ymd_and_hms(2026, 1, 5, 14, 48, 0).unwrap()
        );
        assert!(email.html_body.is_none());
        assert!(email.text_body.unwrap().contains("Building: Tower A"));
    }

    #[test]
    fn multipart_alternative_keeps_both_bodies() {
        let msg = raw(
            4,
            "From: dispatch@vendor.example\r\n\
Subject: Dispatch\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain body\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html body</p>\r\n\
--b1--\r\n",
        );
        let email = normalize(&msg, fetched_at()).unwrap();
        assert!(email.text_body.unwrap().contains("plain body"));
        assert!(email.html_body.unwrap().contains("<p>html body</p>"));
    }

    #[test]
    fn html_only_message() {
        let msg = raw(
            5,
            "From: dispatch@vendor.example\r\n\
Subject: Work Order A1\r\n\
Content-Type: text/html\r\n\
\r\n\
<b>Building:</b> Main\r\n",
        );
        let email = normalize(&msg, fetched_at()).unwrap();
        assert!(email.html_body.unwrap().contains("<b>Building:</b>"));
        assert!(email.text_body.is_none());
    }

    #[test]
    fn missing_headers_default() {
        let msg = raw(6, "X-Mailer: test\r\n\r\nhello\r\n");
        let email = normalize(&msg, fetched_at()).unwrap();
        assert_eq!(email.subject, "");
        assert_eq!(email.sender, "");
        assert_eq!(email.received_at, fetched_at());
    }

    #[test]
    fn garbage_is_parse_error() {
        let err = normalize(&raw(8, "\u{0}\u{1} not an email at all"), fetched_at()).unwrap_err();
        assert_eq!(err.uid, 8);

        let err = normalize(&raw(9, ""), fetched_at()).unwrap_err();
        assert_eq!(err.reason, "empty message buffer");
    }
}
