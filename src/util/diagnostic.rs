//! User-facing failure reports.
//!
//! A [`Diagnostic`] is what the CLI prints for a goal that could not be
//! built: a headline, optional notes with the underlying cause, and a hint
//! on how to fix it.

use std::fmt;
use std::path::PathBuf;

/// Hints shared by several failure kinds.
pub mod suggestions {
    pub const NO_RULEFILE: &str = "Create a `Rulefile` or pass one with `-f <path>`";

    pub const NO_RULE: &str =
        "Add a rule producing it, or check that the source file exists and is spelled correctly";

    pub const CYCLE: &str = "Remove one of the prerequisites listed in the cycle";

    pub const BUILD_FAILED: &str = "Run `lazymake build --verbose` to see the failing command";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }

    /// ANSI color of the label.
    fn color(self) -> &'static str {
        match self {
            Severity::Error => "1;31",
            Severity::Warning => "1;33",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub notes: Vec<String>,
    pub help: Option<String>,
    /// File and 1-based line the diagnostic points at
    pub location: Option<(PathBuf, Option<usize>)>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            notes: Vec::new(),
            help: None,
            location: None,
        }
    }

    /// Add a line of detail, e.g. the underlying error.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Set the fix hint. A later call replaces an earlier one.
    pub fn with_suggestion(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>, line: Option<usize>) -> Self {
        self.location = Some((path.into(), line));
        self
    }

    /// Render for the terminal, optionally with ANSI colors.
    pub fn render(&self, color: bool) -> String {
        let mut out = format!(
            "{}: {}\n",
            paint(self.severity.label(), self.severity.color(), color),
            self.message
        );

        match self.location {
            Some((ref path, Some(line))) => out.push_str(&format!("  --> {}:{}\n", path.display(), line)),
            Some((ref path, None)) => out.push_str(&format!("  --> {}\n", path.display())),
            None => {}
        }
        for note in &self.notes {
            out.push_str(&format!("  = {note}\n"));
        }
        if let Some(ref help) = self.help {
            out.push_str(&format!("{}: {}\n", paint("help", "1;32", color), help));
        }
        out
    }
}

fn paint(text: &str, code: &str, color: bool) -> String {
    if color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.render(color));
}
