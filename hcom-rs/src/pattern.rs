//! Name filters used by `disp`, `dipa`, `rmvar`, `rmco`, `ls` and `foreach`.
//!
//! ## Match modes
//!
//! | Mode | Description |
//! |------|-------------|
//! | [`MatchMode::Exact`]    | Literal, case-sensitive comparison |
//! | [`MatchMode::Wildcard`] | `*` matches any run of characters; everything else literal |
//!
//! Wildcards compile to an anchored [`regex`] with each literal segment passed
//! through [`regex::escape`], so dots, `#`, `@` and parentheses in variable
//! names never act as metacharacters.

use std::sync::Arc;

use regex::Regex;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Wildcard,
}

/// Error returned when a pattern cannot be compiled.
#[derive(Debug)]
pub enum PatternError {
    InvalidRegex(regex::Error),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::InvalidRegex(e) => write!(f, "pattern error: {e}"),
        }
    }
}

impl std::error::Error for PatternError {}

#[derive(Clone)]
enum Compiled {
    Exact,
    Regex(Arc<Regex>),
}

/// A compiled filter ready for matching.
#[derive(Clone)]
pub struct Pattern {
    src: String,
    mode: MatchMode,
    compiled: Compiled,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("src", &self.src)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Pattern {
    /// Compile `src` using `mode`.
    pub fn new(src: &str, mode: MatchMode) -> Result<Self, PatternError> {
        let compiled = match mode {
            MatchMode::Exact => Compiled::Exact,
            MatchMode::Wildcard => Compiled::Regex(Arc::new(compile_wildcard(src)?)),
        };
        Ok(Pattern {
            src: src.to_owned(),
            mode,
            compiled,
        })
    }

    /// Wildcard mode when `src` contains `*`, exact otherwise.
    pub fn wildcard(src: &str) -> Result<Self, PatternError> {
        let mode = if src.contains('*') {
            MatchMode::Wildcard
        } else {
            MatchMode::Exact
        };
        Self::new(src, mode)
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.compiled {
            Compiled::Exact => self.src == text,
            Compiled::Regex(re) => re.is_match(text),
        }
    }

    /// Keep the items of `names` this pattern matches, preserving order.
    pub fn filter<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter(|n| self.matches(n))
            .cloned()
            .collect()
    }
}

// ── Compilation ───────────────────────────────────────────────────────────────

fn compile_wildcard(src: &str) -> Result<Regex, PatternError> {
    let body = src
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).map_err(PatternError::InvalidRegex)
}

/// One-shot wildcard test; an uncompilable pattern matches nothing.
pub fn wildcard_match(pat: &str, text: &str) -> bool {
    Pattern::wildcard(pat).map_or(false, |p| p.matches(text))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        let p = Pattern::wildcard("Mass*").unwrap();
        assert_eq!(p.mode(), MatchMode::Wildcard);
        assert!(p.matches("Mass.P1.x"));
        assert!(p.matches("Mass"));
        assert!(!p.matches("TheMass"));
    }

    #[test]
    fn dots_are_literal() {
        let p = Pattern::wildcard("A.*.x").unwrap();
        assert!(p.matches("A.P1.x"));
        assert!(!p.matches("AxP1.x"));
        assert!(!wildcard_match("a.b", "axb"));
    }

    #[test]
    fn case_sensitive() {
        assert!(!wildcard_match("mass*", "Mass.P1.x"));
    }

    #[test]
    fn lone_star_matches_everything() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*", "anything at all"));
    }

    #[test]
    fn exact_without_star() {
        let p = Pattern::wildcard("time").unwrap();
        assert_eq!(p.mode(), MatchMode::Exact);
        assert!(p.matches("time"));
        assert!(!p.matches("time2"));
    }

    #[test]
    fn metacharacters_escaped() {
        assert!(wildcard_match("f(x)*", "f(x)+1"));
        assert!(wildcard_match("[a]*", "[a]b"));
    }

    #[test]
    fn filter_preserves_order() {
        let names = vec!["b.x".to_string(), "a.x".to_string(), "a.v".to_string()];
        let p = Pattern::wildcard("*.x").unwrap();
        assert_eq!(p.filter(&names), vec!["b.x", "a.x"]);
    }
}
