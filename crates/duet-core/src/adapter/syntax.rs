//! Low-level `winnow` parsers shared by the category grammars.

use winnow::ascii::space0;
use winnow::combinator::delimited;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

/// Consume optional whitespace (concrete error type avoids inference issues).
pub(crate) fn skip_space(input: &mut &str) {
    let _: Result<&str, ErrMode<ContextError>> = space0.parse_next(input);
}

/// `[A-Za-z0-9_]+`
pub(crate) fn identifier<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_').parse_next(input)
}

/// Identifier that may also contain `-` and `.` (ER entity names, C4 aliases).
pub(crate) fn dashed_identifier<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
    })
    .parse_next(input)
}

/// `"..."` without escapes.
pub(crate) fn quoted<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    delimited('"', take_till(0.., '"'), '"').parse_next(input)
}

/// Text of a `title ...` statement.
pub(crate) fn title_text(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("title")?;
    if rest.is_empty() {
        return Some("");
    }
    if !rest.starts_with(char::is_whitespace) && !rest.starts_with(':') {
        return None;
    }
    Some(rest.trim_start_matches(':').trim())
}

/// Strip a matching pair of surrounding double quotes.
pub(crate) fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Significant lines after the header: `(1-based line number, trimmed text)`,
/// skipping blanks and `%%` comments.
pub(crate) fn body_lines(cleaned: &str) -> impl Iterator<Item = (usize, &str)> {
    cleaned
        .lines()
        .enumerate()
        .skip(1)
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with("%%"))
}

/// Words after the header keyword on the first line.
pub(crate) fn header_rest(cleaned: &str) -> &str {
    let first = cleaned.lines().next().unwrap_or_default().trim();
    first
        .split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest.trim())
}
