//! Rules and actions.

use std::fmt;

use crate::core::pattern::Pattern;

/// A declared rule: target pattern, static prerequisites, optional lazy
/// prerequisite provider and optional action.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Target pattern
    pub target: Pattern,

    /// Static prerequisite templates; `%` is replaced by the stem for
    /// wildcard rules
    pub prereqs: Vec<String>,

    /// Where the lazily loaded prerequisites of a matched target live
    pub lazy: Option<LazyProviderSpec>,

    /// Commands to run (None = no action)
    pub action: Option<Action>,
}

impl Rule {
    /// Create a rule without prerequisites or action.
    pub fn new(target: Pattern) -> Self {
        Rule {
            target,
            prereqs: Vec::new(),
            lazy: None,
            action: None,
        }
    }

    /// Add static prerequisites.
    pub fn with_prereqs<I, S>(mut self, prereqs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prereqs.extend(prereqs.into_iter().map(Into::into));
        self
    }

    /// Attach a lazy prerequisite provider.
    pub fn with_lazy(mut self, record: impl Into<String>) -> Self {
        self.lazy = Some(LazyProviderSpec {
            record: record.into(),
        });
        self
    }

    /// Attach an action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Static prerequisites instantiated for a stem.
    pub fn prereqs_for(&self, stem: &str) -> Vec<String> {
        self.prereqs
            .iter()
            .map(|p| self.instantiate(p, stem))
            .collect()
    }

    /// Record path of the lazy provider instantiated for a stem.
    pub fn record_for(&self, stem: &str) -> Option<String> {
        self.lazy
            .as_ref()
            .map(|lazy| self.instantiate(&lazy.record, stem))
    }

    fn instantiate(&self, template: &str, stem: &str) -> String {
        if self.target.is_wildcard() {
            template.replacen('%', stem, 1)
        } else {
            template.to_string()
        }
    }
}

/// Lazy prerequisite provider declaration.
///
/// `record` is a template for the dependency record path, e.g. `.deps/%.d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyProviderSpec {
    pub record: String,
}

/// An action: one or more shell command templates run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub commands: Vec<String>,
}

impl Action {
    pub fn new(command: impl Into<String>) -> Self {
        Action {
            commands: vec![command.into()],
        }
    }

    /// Expand automatic variables in every command.
    pub fn expand(&self, vars: &AutoVars<'_>) -> Vec<String> {
        self.commands.iter().map(|c| vars.expand(c)).collect()
    }
}

/// Values for the automatic variables of a command template.
///
/// - `$@` target
/// - `$<` first prerequisite
/// - `$^` all prerequisites, deduplicated
/// - `$*` stem
/// - `$(DEPFILE)` raw dependency artifact path
/// - `$$` a literal `$`
#[derive(Debug, Clone, Default)]
pub struct AutoVars<'a> {
    pub target: &'a str,
    pub stem: &'a str,
    pub prereqs: &'a [String],
    pub depfile: Option<&'a str>,
}

impl AutoVars<'_> {
    /// Expand a command template. Unknown `$` sequences are kept verbatim.
    pub fn expand(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(idx) = rest.find('$') {
            out.push_str(&rest[..idx]);
            let tail = &rest[idx..];

            if let Some(after) = tail.strip_prefix("$(DEPFILE)") {
                out.push_str(self.depfile.unwrap_or(""));
                rest = after;
                continue;
            }

            let mut chars = tail[1..].chars();
            match chars.next() {
                Some('@') => out.push_str(self.target),
                Some('<') => out.push_str(self.prereqs.first().map(String::as_str).unwrap_or("")),
                Some('^') => out.push_str(&self.prereqs.join(" ")),
                Some('*') => out.push_str(self.stem),
                Some('$') => out.push('$'),
                Some(other) => {
                    out.push('$');
                    out.push(other);
                }
                None => {
                    out.push('$');
                    rest = "";
                    continue;
                }
            }
            let consumed = 1 + tail[1..].chars().next().map_or(0, char::len_utf8);
            rest = &tail[consumed..];
        }

        out.push_str(rest);
        out
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.target)?;
        for p in &self.prereqs {
            write!(f, " {p}")?;
        }
        if let Some(ref lazy) = self.lazy {
            write!(f, ", {}", lazy.record)?;
        }
        Ok(())
    }
}
