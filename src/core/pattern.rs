//! Target name patterns.
//!
//! A pattern is either an exact name (`main.o`) or contains a single `%`
//! wildcard (`%.o`, `.deps/%.d`). The text matched by `%` is the *stem*,
//! which is substituted into the prerequisite patterns of the same rule.

use std::fmt;

use thiserror::Error;

/// Error parsing a pattern string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,

    #[error("pattern `{0}` contains more than one `%`")]
    MultipleWildcards(String),
}

/// A target pattern with at most one `%` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Matches exactly one name.
    Exact(String),
    /// Matches any name starting with `prefix` and ending with `suffix`.
    Wildcard { prefix: String, suffix: String },
}

impl Pattern {
    /// Parse a pattern string.
    pub fn parse(s: &str) -> Result<Self, PatternError> {
        if s.is_empty() {
            return Err(PatternError::Empty);
        }

        match s.find('%') {
            None => Ok(Pattern::Exact(s.to_string())),
            Some(idx) => {
                let (prefix, rest) = s.split_at(idx);
                let suffix = &rest[1..];
                if suffix.contains('%') {
                    return Err(PatternError::MultipleWildcards(s.to_string()));
                }
                Ok(Pattern::Wildcard {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
        }
    }

    /// Create an exact pattern without parsing.
    pub fn exact(name: impl Into<String>) -> Self {
        Pattern::Exact(name.into())
    }

    /// Whether this pattern contains a wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Pattern::Wildcard { .. })
    }

    /// Match a name against this pattern, returning the stem.
    ///
    /// Exact patterns yield an empty stem. The stem of a wildcard match is
    /// never empty: `%.o` does not match `.o`.
    pub fn matches<'a>(&self, name: &'a str) -> Option<&'a str> {
        match self {
            Pattern::Exact(exact) => (exact == name).then_some(""),
            Pattern::Wildcard { prefix, suffix } => {
                if name.len() <= prefix.len() + suffix.len() {
                    return None;
                }
                let stem = name.strip_prefix(prefix.as_str())?;
                stem.strip_suffix(suffix.as_str())
            }
        }
    }

    /// Substitute a stem for the wildcard.
    pub fn substitute(&self, stem: &str) -> String {
        match self {
            Pattern::Exact(exact) => exact.clone(),
            Pattern::Wildcard { prefix, suffix } => format!("{prefix}{stem}{suffix}"),
        }
    }

    /// Match specificity: exact names beat everything, otherwise the number
    /// of literal characters around the wildcard (a shorter stem wins).
    pub fn specificity(&self) -> usize {
        match self {
            Pattern::Exact(_) => usize::MAX,
            Pattern::Wildcard { prefix, suffix } => prefix.len() + suffix.len(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(exact) => write!(f, "{exact}"),
            Pattern::Wildcard { prefix, suffix } => write!(f, "{prefix}%{suffix}"),
        }
    }
}

impl std::str::FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::parse(s)
    }
}

/// An ordered list of patterns queried by specificity.
///
/// Entries are kept in declaration order; lookups visit them sorted by
/// descending specificity, and the sort is stable so the first-declared
/// entry wins among equally specific matches.
#[derive(Debug, Clone)]
pub struct PatternTable<T> {
    entries: Vec<(Pattern, T)>,
}

impl<T> Default for PatternTable<T> {
    fn default() -> Self {
        PatternTable {
            entries: Vec::new(),
        }
    }
}

impl<T> PatternTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, pattern: Pattern, value: T) {
        self.entries.push((pattern, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All matches for `name` in precedence order, with their stems.
    pub fn matches<'a, 'n>(&'a self, name: &'n str) -> Vec<(&'a Pattern, &'a T, &'n str)> {
        let mut found: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(pattern, value)| pattern.matches(name).map(|stem| (pattern, value, stem)))
            .collect();
        found.sort_by(|a, b| b.0.specificity().cmp(&a.0.specificity()));
        found
    }

    /// The highest-precedence match for `name`.
    pub fn lookup<'a, 'n>(&'a self, name: &'n str) -> Option<(&'a Pattern, &'a T, &'n str)> {
        self.matches(name).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_and_wildcard() {
        assert_eq!(Pattern::parse("main.o").unwrap(), Pattern::exact("main.o"));
        assert_eq!(
            Pattern::parse(".deps/%.d").unwrap(),
            Pattern::Wildcard {
                prefix: ".deps/".to_string(),
                suffix: ".d".to_string()
            }
        );
        assert_eq!(Pattern::parse(""), Err(PatternError::Empty));
        assert!(matches!(
            Pattern::parse("%/%.o"),
            Err(PatternError::MultipleWildcards(_))
        ));
    }

    #[test]
    fn test_match_and_substitute() {
        let p = Pattern::parse("%.o").unwrap();
        assert_eq!(p.matches("src/a.o"), Some("src/a"));
        assert_eq!(p.matches("a.c"), None);
        assert_eq!(p.matches(".o"), None);

        let dep = Pattern::parse(".deps/%.d").unwrap();
        assert_eq!(dep.substitute("src/a"), ".deps/src/a.d");
        assert_eq!(p.to_string(), "%.o");
    }

    #[test]
    fn test_exact_match_has_empty_stem() {
        let p = Pattern::exact("install");
        assert_eq!(p.matches("install"), Some(""));
        assert_eq!(p.matches("install2"), None);
    }

    #[test]
    fn test_table_precedence() {
        let mut table = PatternTable::new();
        table.push(Pattern::parse("%").unwrap(), "anything");
        table.push(Pattern::parse("%.o").unwrap(), "first-o");
        table.push(Pattern::parse("%.o").unwrap(), "second-o");
        table.push(Pattern::parse("lib%.o").unwrap(), "lib-o");
        table.push(Pattern::exact("libfoo.o"), "exact");

        let order: Vec<_> = table.matches("libfoo.o").iter().map(|m| *m.1).collect();
        assert_eq!(order, vec!["exact", "lib-o", "first-o", "second-o", "anything"]);

        let (_, value, stem) = table.lookup("bar.o").unwrap();
        assert_eq!(*value, "first-o");
        assert_eq!(stem, "bar");
    }
}
