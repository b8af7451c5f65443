//! Rulefile parsing.
//!
//! ```text
//! # comment
//! %.o: %.c, .deps/%.d action: cc -MMD -MP -MF $(DEPFILE) -c $< -o $@
//! prog: a.o b.o action: cc -o $@ $^
//!     strip $@
//! .PHONY: install
//! .NOTINTERMEDIATE: .deps/%.d %.h
//! ```
//!
//! A rule is `pattern ":" prereqs ["," record] ["action:" command]`.
//! Indented lines following a rule are further commands of its action.

use std::path::Path;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::core::graph::TargetGraph;
use crate::core::pattern::Pattern;
use crate::core::rule::{Action, Rule};

const ACTION_MARKER: &str = "action:";

/// A Rulefile syntax error.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(lazymake::rulefile::syntax))]
pub struct RulefileError {
    pub message: String,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("here")]
    pub span: SourceSpan,
    #[help]
    pub help: Option<String>,
    /// 1-based line number
    pub line: usize,
}

/// Parse Rulefile text into a target graph.
pub fn parse(name: &str, text: &str) -> Result<TargetGraph, RulefileError> {
    Parser::new(name, text).run()
}

/// Read and parse a Rulefile from disk.
pub fn load(path: &Path) -> anyhow::Result<TargetGraph> {
    let text = crate::util::fs::read_to_string(path)?;
    let graph = parse(&path.display().to_string(), &text)?;
    tracing::debug!(
        "loaded {} rule(s) from {}",
        graph.rule_count(),
        path.display()
    );
    Ok(graph)
}

struct Parser<'a> {
    name: &'a str,
    text: &'a str,
    graph: TargetGraph,
    pending: Option<Rule>,
}

impl<'a> Parser<'a> {
    fn new(name: &'a str, text: &'a str) -> Self {
        Parser {
            name,
            text,
            graph: TargetGraph::new(),
            pending: None,
        }
    }

    fn run(mut self) -> Result<TargetGraph, RulefileError> {
        let mut offset = 0;

        for (idx, raw_line) in self.text.split_inclusive('\n').enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim_end_matches(['\n', '\r']);
            let line_offset = offset;
            offset += raw_line.len();

            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if line.starts_with([' ', '\t']) {
                let command = line.trim();
                match self.pending.as_mut() {
                    Some(rule) => match rule.action.as_mut() {
                        Some(action) => action.commands.push(command.to_string()),
                        None => rule.action = Some(Action::new(command)),
                    },
                    None => {
                        return Err(self.error(
                            "command line outside of a rule",
                            line_offset,
                            line.len(),
                            line_no,
                            Some("indented lines continue the action of the rule above them"),
                        ))
                    }
                }
                continue;
            }

            self.flush();
            self.statement(strip_comment(line), line_offset, line_no)?;
        }

        self.flush();
        Ok(self.graph)
    }

    fn flush(&mut self) {
        if let Some(rule) = self.pending.take() {
            self.graph.add_rule(rule);
        }
    }

    fn statement(
        &mut self,
        content: &str,
        line_offset: usize,
        line_no: usize,
    ) -> Result<(), RulefileError> {
        let Some(colon) = content.find(':') else {
            return Err(self.error(
                "expected `:` after target pattern",
                line_offset,
                content.len(),
                line_no,
                Some("rules look like `target: prereqs action: command`"),
            ));
        };

        let head = content[..colon].trim();
        let body = &content[colon + 1..];

        if head.is_empty() {
            return Err(self.error("missing target", line_offset, colon + 1, line_no, None));
        }

        match head {
            ".PHONY" => {
                for name in body.split_whitespace() {
                    self.graph.declare_phony(name);
                }
                Ok(())
            }
            ".INTERMEDIATE" | ".NOTINTERMEDIATE" => {
                let intermediate = head == ".INTERMEDIATE";
                for word in body.split_whitespace() {
                    let pattern = self.pattern(word, content, line_offset, line_no)?;
                    self.graph
                        .declare_intermediate_override(pattern, intermediate);
                }
                Ok(())
            }
            _ if head.starts_with('.') && head.chars().skip(1).all(|c| c.is_ascii_uppercase()) => {
                Err(self.error(
                    format!("unknown directive `{head}`"),
                    line_offset,
                    head.len(),
                    line_no,
                    Some("supported directives are .PHONY, .INTERMEDIATE and .NOTINTERMEDIATE"),
                ))
            }
            _ => self.rule(head, body, content, line_offset, line_no),
        }
    }

    fn rule(
        &mut self,
        head: &str,
        body: &str,
        content: &str,
        line_offset: usize,
        line_no: usize,
    ) -> Result<(), RulefileError> {
        if head.split_whitespace().count() != 1 {
            return Err(self.error(
                "a rule declares exactly one target pattern",
                line_offset,
                head.len(),
                line_no,
                None,
            ));
        }
        let target = self.pattern(head, content, line_offset, line_no)?;

        let (deps, command) = match body.find(ACTION_MARKER) {
            Some(idx) => (&body[..idx], Some(body[idx + ACTION_MARKER.len()..].trim())),
            None => (body, None),
        };

        let (prereqs, record) = match deps.split_once(',') {
            Some((prereqs, record)) => {
                let record = record.trim();
                if record.is_empty() || record.split_whitespace().count() != 1 {
                    return Err(self.error(
                        "expected exactly one dependency record after `,`",
                        line_offset,
                        content.len(),
                        line_no,
                        Some("write the record path as a pattern, e.g. `, .deps/%.d`"),
                    ));
                }
                (prereqs, Some(record))
            }
            None => (deps, None),
        };

        let mut rule = Rule::new(target).with_prereqs(prereqs.split_whitespace());
        if let Some(record) = record {
            rule = rule.with_lazy(record);
        }
        if let Some(command) = command.filter(|c| !c.is_empty()) {
            rule = rule.with_action(Action::new(command));
        }

        self.pending = Some(rule);
        Ok(())
    }

    fn pattern(
        &self,
        word: &str,
        content: &str,
        line_offset: usize,
        line_no: usize,
    ) -> Result<Pattern, RulefileError> {
        Pattern::parse(word).map_err(|e| {
            let start = content.find(word).unwrap_or(0);
            self.error(e.to_string(), line_offset + start, word.len(), line_no, None)
        })
    }

    fn error(
        &self,
        message: impl Into<String>,
        start: usize,
        len: usize,
        line: usize,
        help: Option<&str>,
    ) -> RulefileError {
        RulefileError {
            message: message.into(),
            src: NamedSource::new(self.name, self.text.to_string()),
            span: (start, len).into(),
            help: help.map(str::to_string),
            line,
        }
    }
}

/// Cut a trailing comment from a rule line. Everything after `action:` is
/// command text and kept verbatim.
fn strip_comment(line: &str) -> &str {
    let head = line.find(ACTION_MARKER).unwrap_or(line.len());
    match line[..head].find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}
