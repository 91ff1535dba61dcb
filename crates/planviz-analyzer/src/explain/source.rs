//! Source Normalizer - cleanup of raw EXPLAIN text.
//!
//! EXPLAIN output reaches us in many shapes: copied out of psql with its
//! box-drawing frame, exported as quoted CSV from pgAdmin, force-wrapped at a
//! terminal width, or decorated with `+` / `↵` soft line breaks. This module
//! strips that decoration (`cleanup_source`) and reassembles force-wrapped
//! physical lines into logical ones (`split_into_lines`) before the grammar
//! ever sees them.

use regex::Regex;
use std::sync::LazyLock;

static QUERY_PLAN_HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*QUERY PLAN\s*$").expect("valid regex"));

// Trailing row-count footer, e.g. "(8 rows)"; the word can be translated.
static ROW_COUNT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d+\s+[a-z]*s?\)$").expect("valid regex"));

// Lines starting with these keywords always begin a new logical line, even
// though they may start in column zero.
static HEADER_KEYWORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Total\s+runtime|Planning\s+time|Execution\s+time|Time|Filter|Output|JIT)")
        .expect("valid regex")
});

const FRAME_CHARS: [char; 3] = ['|', '║', '│'];

/// Strips terminal decoration from raw EXPLAIN text: box-drawing frames,
/// separator rules, whole-line quotes, `+`/`↵` soft line breaks, the
/// "QUERY PLAN" header and the trailing row-count footer.
pub fn cleanup_source(source: &str) -> String {
    let source = source.replace("\r\n", "\n");

    let mut lines: Vec<String> = Vec::new();
    for raw in source.split('\n') {
        let mut line = strip_frame_pair(raw).to_string();
        line = strip_trailing_frame(&line).to_string();
        if is_separator_line(&line) {
            continue;
        }
        line = strip_quote_pair(&line).to_string();
        line = strip_trailing_plus(&line).to_string();
        lines.push(line);
    }

    // "↵" soft line breaks become real newlines before the header pass.
    let joined = lines.join("\n").replace('↵', "\n");

    let mut out: Vec<&str> = Vec::new();
    let mut header_removed = false;
    for line in joined.split('\n') {
        if !header_removed && QUERY_PLAN_HEADER_REGEX.is_match(line) {
            header_removed = true;
            continue;
        }
        if ROW_COUNT_REGEX.is_match(line) {
            out.push("");
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

/// Splits cleaned source into logical lines, repairing input that was
/// force-wrapped to a fixed column width.
///
/// A physical line is merged into the previous logical line when it closes
/// more parentheses than it opens, or when it fails to look like the start of
/// a plan line (starts with a non-blank character, opens with a parenthesis,
/// or closes a parenthesis before opening one). Lines starting with one of
/// the known header keywords always begin a new logical line.
pub fn split_into_lines(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for raw in text.split('\n') {
        let line = repair_line(raw);

        let closers = line.matches(')').count();
        let openers = line.matches('(').count();

        if closers > openers {
            // More closers than openers: the tail of a wrapped group.
            match out.last_mut() {
                Some(last) => last.push_str(&line),
                None => out.push(line),
            }
        } else if HEADER_KEYWORD_REGEX.is_match(&line) {
            out.push(line);
        } else if starts_nonblank(&line)
            || line.trim_start().starts_with('(')
            || closing_before_opening(&line)
        {
            match out.last_mut() {
                Some(last) => last.push_str(&line),
                None => out.push(line),
            }
        } else {
            out.push(line);
        }
    }

    out
}

/// Per-line repair applied before the merge decision: strips a single
/// leftover CSV quote on either end and converts tabs to four spaces.
fn repair_line(raw: &str) -> String {
    let mut line = raw;
    let trimmed = line.trim_end();
    if trimmed.ends_with('"') {
        line = &trimmed[..trimmed.len() - 1];
    }
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix('"') {
        line = rest;
    }
    line.replace('\t', "    ")
}

fn starts_nonblank(line: &str) -> bool {
    line.chars().next().is_some_and(|c| !c.is_whitespace())
}

fn closing_before_opening(line: &str) -> bool {
    match (line.find(')'), line.find('(')) {
        (Some(close), Some(open)) => close < open,
        _ => false,
    }
}

/// Strips a matching frame character wrapping the line on both sides.
fn strip_frame_pair(line: &str) -> &str {
    let mut chars = line.chars();
    if let (Some(first), Some(last)) = (chars.next(), chars.next_back())
        && first == last
        && FRAME_CHARS.contains(&first)
    {
        return &line[first.len_utf8()..line.len() - last.len_utf8()];
    }
    line
}

/// Strips a single frame character at end-of-line only.
fn strip_trailing_frame(line: &str) -> &str {
    for frame in FRAME_CHARS {
        if let Some(rest) = line.strip_suffix(frame) {
            return rest;
        }
    }
    line
}

/// Strips a single matching quote character wrapping the whole line.
fn strip_quote_pair(line: &str) -> &str {
    let mut chars = line.chars();
    if let (Some(first), Some(last)) = (chars.next(), chars.next_back())
        && first == last
        && (first == '"' || first == '\'')
    {
        return &line[1..line.len() - 1];
    }
    line
}

/// Strips a trailing `+` line-continuation marker and the blanks before it.
fn strip_trailing_plus(line: &str) -> &str {
    if line.ends_with('+') {
        line[..line.len() - 1].trim_end()
    } else {
        line
    }
}

/// Recognizes horizontal separator lines: `+---+`, homogeneous dash runs,
/// junction rows like `├──┤` and corner rows like `┌──┐` / `╚══╝`.
fn is_separator_line(line: &str) -> bool {
    let chars: Vec<char> = line.chars().collect();
    if chars.len() < 2 {
        return false;
    }
    let first = chars[0];
    let last = chars[chars.len() - 1];
    let inner = &chars[1..chars.len() - 1];

    if matches!(first, '-' | '─' | '═') && chars.iter().all(|&c| c == first) {
        return true;
    }
    if inner.is_empty() {
        return false;
    }
    if first == '+' && last == '+' && inner.iter().all(|&c| c == '-') {
        return true;
    }
    if matches!(first, '├' | '╟' | '╠' | '╞')
        && matches!(last, '┤' | '╢' | '╣' | '╡')
        && (inner.iter().all(|&c| c == '─') || inner.iter().all(|&c| c == '═'))
    {
        return true;
    }
    let corner = match (first, last) {
        ('┌', '┐') | ('└', '┘') => '─',
        ('╔', '╗') | ('╚', '╝') => '═',
        _ => return false,
    };
    inner.iter().all(|&c| c == corner)
}
