//! Recovery of the embedded data object from decoded HTML.

use super::ParseError;
use serde_json::Value;

/// Locate the anchor, slice out the balanced-brace object after it, coerce
/// it to strict JSON and parse it.
pub fn embedded_object(html: &str, anchor: &str) -> Result<Value, ParseError> {
    let raw = balanced_object(html, anchor)?;
    let strict = substitute_undefined(raw);
    serde_json::from_str(&strict).map_err(|e| ParseError::Syntax(e.to_string()))
}

/// Return the `{...}` slice starting at the first `{` after `anchor`.
///
/// Brace depth is tracked ignoring braces inside string literals; escape
/// sequences inside strings are honored so `"\""` and `"\\"` do not
/// desynchronize the scan.
fn balanced_object<'a>(html: &'a str, anchor: &str) -> Result<&'a str, ParseError> {
    let at = html.find(anchor).ok_or(ParseError::Shape)?;
    let after = &html[at + anchor.len()..];
    let start = after.find('{').ok_or(ParseError::Shape)?;
    let object = &after[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in object.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&object[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    Err(ParseError::Syntax("unbalanced braces in data object".into()))
}

/// Replace bare `undefined` tokens (values, never string contents) with
/// `null` so the object parses as strict JSON.
fn substitute_undefined(raw: &str) -> String {
    const TOKEN: &str = "undefined";

    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = raw;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if rest.starts_with(TOKEN) && !is_word_char(rest[TOKEN.len()..].chars().next()) {
            out.push_str("null");
            rest = &rest[TOKEN.len()..];
            continue;
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

fn is_word_char(c: Option<char>) -> bool {
    matches!(c, Some(c) if c.is_alphanumeric() || c == '_')
}
