//! Stripping of non-diagram wrapper content.
//!
//! Generated or pasted diagram text often arrives wrapped in narrative prose,
//! markdown fences, or file-path comments. Cleaning keeps only the slice that
//! starts at the category's header line and ends at the last line that still
//! looks like a diagram statement.

const FENCE: &str = "```";

/// Extract the diagram body from `text`.
///
/// `is_header` recognizes the category keyword line; `is_statement`
/// recognizes lines that belong to the diagram grammar. Returns an empty
/// string when no header is found.
pub fn extract_diagram(
    text: &str,
    is_header: impl Fn(&str) -> bool,
    is_statement: impl Fn(&str) -> bool,
) -> String {
    let normalized = text.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.lines().collect();

    let body = match fenced_block_with_header(&lines, &is_header) {
        Some(block) => block,
        None => lines
            .iter()
            .copied()
            .filter(|l| !l.trim_start().starts_with(FENCE))
            .collect(),
    };

    let Some(start) = body.iter().position(|l| is_header(l.trim())) else {
        return String::new();
    };

    let end = body[start..]
        .iter()
        .rposition(|l| {
            let t = l.trim();
            !t.is_empty() && (is_statement(t) || is_comment(t))
        })
        .map_or(start, |i| start + i);

    let mut out = String::with_capacity(normalized.len());
    out.push_str(body[start].trim());
    out.push('\n');
    for line in &body[start + 1..=end] {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// `%%` line comments are valid in every category.
pub fn is_comment(line: &str) -> bool {
    line.starts_with("%%")
}

/// First fenced block whose contents include a header line.
fn fenced_block_with_header<'a>(
    lines: &[&'a str],
    is_header: &impl Fn(&str) -> bool,
) -> Option<Vec<&'a str>> {
    let mut inside = false;
    let mut current: Vec<&'a str> = Vec::new();
    for line in lines {
        if line.trim_start().starts_with(FENCE) {
            if inside {
                if current.iter().any(|l| is_header(l.trim())) {
                    return Some(current);
                }
                current.clear();
            }
            inside = !inside;
            continue;
        }
        if inside {
            current.push(line);
        }
    }
    // Unterminated fence: accept what we have.
    if inside && current.iter().any(|l| is_header(l.trim())) {
        return Some(current);
    }
    None
}

/// True when the first whitespace-separated token of `line` is one of `keywords`.
pub fn first_token_is(line: &str, keywords: &[&str]) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|tok| keywords.contains(&tok))
}
