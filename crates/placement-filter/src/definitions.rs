//! Splitting of `id:expression;id:expression;...` definition text
//!
//! Uses memchr to find separators. A `;` inside a string literal belongs to
//! the expression, so the scanner skips over quoted text (honouring `\`
//! escapes) while looking for entry boundaries.

use memchr::{memchr, memchr2};
use placement_core::error::ParseError;
use placement_core::PlacementId;

/// One `id:expression` entry of a definition string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Whole trimmed entry, used in error messages
    pub text: &'a str,
    /// Placement the expression is registered under
    pub id: PlacementId,
    /// Expression text, trimmed
    pub expression: &'a str,
}

/// Split definition text into trimmed, non-empty entries.
///
/// ```
/// use placement_filter::definitions::split_entries;
///
/// let entries = split_entries(r#" 10:country("us") ;; 11:tag("ab","k","a;b") "#);
/// assert_eq!(entries, vec![r#"10:country("us")"#, r#"11:tag("ab","k","a;b")"#]);
/// ```
pub fn split_entries(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut entries = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while let Some(offset) = memchr2(b';', b'"', &bytes[pos..]) {
        let at = pos + offset;
        if bytes[at] == b';' {
            push_trimmed(&mut entries, &text[start..at]);
            start = at + 1;
            pos = at + 1;
        } else {
            pos = skip_string(bytes, at + 1);
        }
    }
    push_trimmed(&mut entries, &text[start..]);
    entries
}

/// Split one entry on its first `:` and parse the placement id.
pub fn parse_entry(text: &str) -> Result<Entry<'_>, ParseError> {
    let colon = memchr(b':', text.as_bytes()).ok_or_else(|| ParseError::MalformedEntry {
        entry: text.to_string(),
    })?;
    let raw_id = text[..colon].trim();
    let id = raw_id
        .parse::<PlacementId>()
        .map_err(|_| ParseError::InvalidPlacementId {
            entry: text.to_string(),
            value: raw_id.to_string(),
        })?;
    Ok(Entry {
        text,
        id,
        expression: text[colon + 1..].trim(),
    })
}

fn push_trimmed<'a>(entries: &mut Vec<&'a str>, entry: &'a str) {
    let entry = entry.trim();
    if !entry.is_empty() {
        entries.push(entry);
    }
}

/// Returns the index just past the closing quote, or the end of input for
/// an unterminated literal.
fn skip_string(bytes: &[u8], mut pos: usize) -> usize {
    while let Some(offset) = memchr2(b'"', b'\\', &bytes[pos..]) {
        let at = pos + offset;
        if bytes[at] == b'"' {
            return at + 1;
        }
        pos = (at + 2).min(bytes.len());
    }
    bytes.len()
}
