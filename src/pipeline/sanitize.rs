//! Body canonicalization: quoted-printable leftovers, tags and whitespace
//! reduced to one matchable line of text.
//!
//! Lossy by intent. Tag stripping is a span replace, not an HTML parser, so
//! `<script>`/`<style>` contents survive as text. Fine for short vendor
//! dispatch notices; not a general HTML-to-text converter.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static SOFT_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"=\r?\n").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Plain text derived once from a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SanitizedBody(String);

impl SanitizedBody {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedBody {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize `body`. Re-running on the output is a no-op.
pub fn sanitize(body: &str) -> SanitizedBody {
    let joined = SOFT_BREAK.replace_all(body, "");
    let decoded = decode_escapes(&joined);
    let untagged = TAG.replace_all(&decoded, " ");
    let spaced = untagged.replace("&nbsp;", " ");
    let collapsed = WHITESPACE.replace_all(&spaced, " ");
    SanitizedBody(collapsed.trim().to_string())
}

/// `=3D` → `=` and `=20` → space, repeated until nothing changes.
///
/// A single pass would turn `=3D20` into `=20`, which a second sanitize
/// would then decode again.
fn decode_escapes(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = current.replace("=3D", "=").replace("=20", " ");
        if next == current {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_soft_breaks() {
        assert_eq!(sanitize("Build=\r\ning: A").as_str(), "Building: A");
        assert_eq!(sanitize("Build=\ning: A").as_str(), "Building: A");
    }

    #[test]
    fn decodes_only_two_escapes() {
        assert_eq!(sanitize("a=3Db=20c").as_str(), "a=b c");
        assert_eq!(sanitize("path=2Fto=2C x").as_str(), "path=2Fto=2C x");
    }

    #[test]
    fn strips_tags_to_spaces() {
        assert_eq!(
            sanitize("<p>Building:</p><b>Tower A</b>Floor 3").as_str(),
            "Building: Tower A Floor 3"
        );
    }

    #[test]
    fn html_attribute_escape_then_tag_strip() {
        assert_eq!(
            sanitize(r#"<td class=3D"label">Priority:</td><td>P2</td>"#).as_str(),
            "Priority: P2"
        );
    }

    #[test]
    fn nbsp_and_whitespace_collapse() {
        assert_eq!(sanitize("  a&nbsp;&nbsp;b\r\n\t c  ").as_str(), "a b c");
        assert_eq!(sanitize("x &amp; y").as_str(), "x &amp; y");
    }

    #[test]
    fn script_content_survives() {
        assert_eq!(
            sanitize("<script>var x = 1;</script>Building: A").as_str(),
            "var x = 1; Building: A"
        );
    }

    #[test]
    fn empty_input() {
        assert!(sanitize("").is_empty());
        assert!(sanitize(" <br/> &nbsp; ").is_empty());
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "<div>Work=\r\n Order C2959324</div>&nbsp;Building: Tower=20A Floor 3",
            "a=3D20b =3D3D c",
            "<<b>>nested<</b>>",
            "soft=\n=\nbreaks=3D=\r\n20",
            "plain text already",
            "",
        ];
        for input in inputs {
            let once = sanitize(input);
            let twice = sanitize(once.as_str());
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
