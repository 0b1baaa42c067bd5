//! Locating JSON inside free-form model output.

/// The first balanced `{...}` span in `text`.
///
/// Counts brace depth from the first `{`, skipping braces inside string
/// literals, so nested objects (line items) stay inside the span and prose
/// after the object is left out. Returns `None` when the object never
/// closes.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_surrounding_prose() {
        let text = r#"Here is the data: {"invoiceNumber":"INV-1","regularHours":8} Thanks"#;
        assert_eq!(
            first_balanced_object(text),
            Some(r#"{"invoiceNumber":"INV-1","regularHours":8}"#)
        );
    }

    #[test]
    fn keeps_nested_objects() {
        let text = r#"{"lineItems":[{"amount":1},{"amount":2}],"total":3} trailing {"x":1}"#;
        assert_eq!(
            first_balanced_object(text),
            Some(r#"{"lineItems":[{"amount":1},{"amount":2}],"total":3}"#)
        );
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let text = r#"{"description":"fix } bracket {","note":"say \"}\""} done"#;
        assert_eq!(
            first_balanced_object(text),
            Some(r#"{"description":"fix } bracket {","note":"say \"}\""}"#)
        );
    }

    #[test]
    fn unterminated_object() {
        assert_eq!(first_balanced_object(r#"{"invoiceNumber": "INV-1", "lineItems": [{"#), None);
    }

    #[test]
    fn no_object() {
        assert_eq!(first_balanced_object("I could not read this document."), None);
        assert_eq!(first_balanced_object(""), None);
    }

    #[test]
    fn stray_closing_brace_before_object() {
        assert_eq!(first_balanced_object("} oops {\"a\":1}"), Some("{\"a\":1}"));
    }

    #[test]
    fn multibyte_text() {
        assert_eq!(
            first_balanced_object("Résumé → {\"café\":\"naïve\"} ✓"),
            Some("{\"café\":\"naïve\"}")
        );
    }
}
