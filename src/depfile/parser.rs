//! Compiler dependency artifact parser.
//!
//! Accepts the two layouts C/C++ compilers produce with `-M`-family flags:
//!
//! ```text
//! a.o: a.c a.h \
//!   include/b.h
//! ```
//!
//! and one prerequisite per rule:
//!
//! ```text
//! a.o: a.c
//! a.o: a.h
//! a.o: include/b.h
//! ```
//!
//! The result is the flat list of prerequisites with the target names and
//! the primary source removed.

use std::collections::HashSet;

use thiserror::Error;

/// Why an artifact could not be turned into a prerequisite list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepParseError {
    #[error("dependency artifact contains no rules")]
    NoDependencyData,

    #[error("malformed dependency artifact at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// One `targets: prereqs` rule after continuation joining.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DepRule {
    targets: Vec<String>,
    prereqs: Vec<String>,
}

/// Parse a raw dependency artifact.
///
/// `primary_source` names the source file to drop from the result; when
/// `None`, the first prerequisite of the first rule is taken to be it.
pub fn parse(text: &str, primary_source: Option<&str>) -> Result<Vec<String>, DepParseError> {
    let rules = parse_rules(text)?;
    let first = rules.first().ok_or(DepParseError::NoDependencyData)?;

    let targets: HashSet<&str> = first.targets.iter().map(String::as_str).collect();
    let source = primary_source
        .map(str::to_string)
        .or_else(|| first.prereqs.first().cloned());

    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for rule in &rules {
        // -MP adds `header.h:` stubs; they belong to other targets.
        if !rule.targets.iter().any(|t| targets.contains(t.as_str())) {
            continue;
        }
        for prereq in &rule.prereqs {
            if targets.contains(prereq.as_str()) || source.as_deref() == Some(prereq.as_str()) {
                continue;
            }
            if seen.insert(prereq.clone()) {
                out.push(prereq.clone());
            }
        }
    }

    Ok(out)
}

/// Render prerequisites as the single-line persisted form.
pub fn render(prereqs: &[String]) -> String {
    let mut line = prereqs
        .iter()
        .map(|p| escape(p))
        .collect::<Vec<_>>()
        .join(" ");
    line.push('\n');
    line
}

/// Split one rendered line back into paths.
pub fn split_line(line: &str) -> Vec<String> {
    tokenize(line)
}

fn parse_rules(text: &str) -> Result<Vec<DepRule>, DepParseError> {
    let mut rules = Vec::new();

    for (line_no, logical) in logical_lines(text) {
        if logical.trim().is_empty() {
            continue;
        }

        let Some(sep) = find_separator(&logical) else {
            return Err(DepParseError::Malformed {
                line: line_no,
                reason: "missing `:` between targets and prerequisites".to_string(),
            });
        };

        let targets = tokenize(&logical[..sep]);
        if targets.is_empty() {
            return Err(DepParseError::Malformed {
                line: line_no,
                reason: "rule has no target".to_string(),
            });
        }

        rules.push(DepRule {
            targets,
            prereqs: tokenize(&logical[sep + 1..]),
        });
    }

    Ok(rules)
}

/// Join backslash-newline continuations. Yields the 1-based number of the
/// first physical line of each logical line.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 1;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if current.is_empty() {
            start = idx + 1;
        }

        if ends_with_continuation(line) {
            current.push_str(&line[..line.len() - 1]);
            current.push(' ');
        } else {
            current.push_str(line);
            out.push((start, std::mem::take(&mut current)));
        }
    }

    if !current.trim().is_empty() {
        out.push((start, current));
    }

    out
}

/// A line continues when it ends in an odd number of backslashes.
fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.bytes().rev().take_while(|&b| b == b'\\').count();
    trailing % 2 == 1
}

/// The rule separator is the first unescaped `:` not followed by `/` or
/// `\\`, so a drive prefix like `C:/src/a.c` stays part of the path.
fn find_separator(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b':' => {
                if !matches!(bytes.get(i + 1), Some(b'/' | b'\\')) {
                    return Some(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

fn is_escapable(c: char) -> bool {
    matches!(c, ' ' | '\t' | '#')
}

fn push_backslashes(out: &mut String, count: usize) {
    out.extend(std::iter::repeat('\\').take(count));
}

/// Split on unescaped whitespace, undoing `\ `, `\#` and `$$`.
///
/// A run of backslashes before a space, tab or `#` (or the end of input)
/// is halved; an odd run escapes that character. Backslashes anywhere else
/// are literal.
fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut run = 1;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    run += 1;
                }
                match chars.peek().copied() {
                    Some(next) if is_escapable(next) => {
                        push_backslashes(&mut current, run / 2);
                        if run % 2 == 1 {
                            current.push(next);
                            chars.next();
                        }
                    }
                    None => push_backslashes(&mut current, run / 2 + run % 2),
                    Some(_) => push_backslashes(&mut current, run),
                }
            }
            '$' if chars.peek() == Some(&'$') => {
                current.push('$');
                chars.next();
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Inverse of [`tokenize`] for one path.
fn escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut run = 0;
    for c in path.chars() {
        if c == '\\' {
            run += 1;
            continue;
        }
        if is_escapable(c) {
            push_backslashes(&mut out, run * 2 + 1);
        } else {
            push_backslashes(&mut out, run);
        }
        run = 0;
        match c {
            '$' => out.push_str("$$"),
            c => out.push(c),
        }
    }
    // A separator or the end of the line follows.
    push_backslashes(&mut out, run * 2);
    out
}
