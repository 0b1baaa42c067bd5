//! IMAP response framing and the few response shapes the session reads.

use std::io::{self, BufRead, Read};
use std::sync::LazyLock;

use regex::Regex;

use super::{RawMessage, Uid};

static FETCH_UID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bUID (\d+)").unwrap());

static FETCH_FLAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFLAGS \(([^)]*)\)").unwrap());

static FETCH_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bBODY\[[^\]]*\] (\{\d+\}|NIL|"(?:[^"\\]|\\.)*")"#).unwrap());

static LITERAL_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\d+\+?\}").unwrap());

/// One logical server response: the text with literal markers left in
/// place, plus each literal's bytes in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Response {
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Ok,
    No,
    Bad,
}

impl Response {
    /// Status if this is the tagged completion for `tag`.
    pub fn tagged_status(&self, tag: &str) -> Option<Status> {
        let rest = self.text.strip_prefix(tag)?.strip_prefix(' ')?;
        let word = rest.split_whitespace().next()?;
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Status::Ok),
            "NO" => Some(Status::No),
            _ => Some(Status::Bad),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.text.starts_with('+')
    }
}

/// Largest literal accepted from the server. Dispatch notices are small;
/// anything near this size is a broken or hostile server.
pub(crate) const MAX_LITERAL_BYTES: usize = 50 * 1024 * 1024;

/// Read one complete response, following `{n}` literals.
pub(crate) fn read_response<R: BufRead>(reader: &mut R) -> io::Result<Response> {
    let mut response = Response::default();
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "IMAP connection closed",
            ));
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches(['\r', '\n']);
        response.text.push_str(text);

        match literal_len(text) {
            Some(len) => {
                if len > MAX_LITERAL_BYTES {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("IMAP literal of {len} bytes exceeds {MAX_LITERAL_BYTES}"),
                    ));
                }
                let mut literal = Vec::with_capacity(len.min(64 * 1024));
                reader.by_ref().take(len as u64).read_to_end(&mut literal)?;
                if literal.len() != len {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "IMAP connection closed inside a literal",
                    ));
                }
                response.literals.push(literal);
            }
            None => return Ok(response),
        }
    }
}

/// Length announced by a trailing `{n}` (or `{n+}`) marker.
fn literal_len(line: &str) -> Option<usize> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

/// UIDs from an untagged `* SEARCH` response.
pub(crate) fn parse_search(response: &Response) -> Option<Vec<Uid>> {
    let rest = response.text.strip_prefix("* ")?;
    let mut words = rest.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("SEARCH") {
        return None;
    }
    Some(words.filter_map(|w| w.parse().ok()).collect())
}

/// Message from an untagged `* n FETCH (...)` response.
///
/// Returns `None` for FETCH responses carrying no message data, such as
/// unsolicited flag updates.
pub(crate) fn parse_fetch(response: &Response) -> Option<RawMessage> {
    let text = &response.text;
    let rest = text.strip_prefix("* ")?;
    let mut words = rest.split_whitespace();
    words.next()?.parse::<u32>().ok()?;
    if !words.next()?.eq_ignore_ascii_case("FETCH") {
        return None;
    }

    let uid: Uid = FETCH_UID.captures(text)?.get(1)?.as_str().parse().ok()?;

    let flags = FETCH_FLAGS
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let body = FETCH_BODY.captures(text)?;
    let value = body.get(1)?;
    let bytes = match value.as_str() {
        v if v.starts_with('{') => {
            let index = LITERAL_MARKER.find_iter(&text[..value.start()]).count();
            response.literals.get(index)?.clone()
        }
        v if v.eq_ignore_ascii_case("NIL") => Vec::new(),
        v => unquote(v).into_bytes(),
    };

    let message = RawMessage::new(uid, flags, bytes);
    Some(match body_structure(text) {
        Some(structure) => message.with_structure(structure),
        None => message,
    })
}

/// The parenthesized list following `BODYSTRUCTURE`, if present.
fn body_structure(text: &str) -> Option<String> {
    let upper = text.to_ascii_uppercase();
    let start = upper.find("BODYSTRUCTURE ")? + "BODYSTRUCTURE ".len();
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_quote {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_quote = true,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=start + offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn unquote(quoted: &str) -> String {
    let inner = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(quoted);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
