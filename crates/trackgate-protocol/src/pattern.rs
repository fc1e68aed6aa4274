//! Declarative pattern compilation.
//!
//! Text protocols describe their sentences with a [`PatternBuilder`]: a
//! sequence of literal fragments, digit-class wildcards, optional groups,
//! raw sub-expressions and alternations. Compilation produces an anchored
//! matcher plus, via capture-group order, the sequence of typed fields a
//! [`crate::Parser`] cursor walks.
//!
//! In the digit-class syntax accepted by [`PatternBuilder::number`]:
//! - `d` matches one decimal digit
//! - `x` matches one hexadecimal digit
//! - `.` matches a literal dot
//! - everything else (`( ) + * ? | { } [ ] - :` ...) passes through with its
//!   regular-expression meaning
//!
//! Patterns are compiled once per protocol and shared read-only across all
//! connections; compilation is pure and deterministic.

use crate::parser::Parser;
use regex::Regex;

/// Builder assembling pattern fragments in declaration order.
#[derive(Debug, Default)]
pub struct PatternBuilder {
    fragments: Vec<String>,
}

impl PatternBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A literal text fragment; regular-expression metacharacters are
    /// escaped.
    pub fn text(mut self, value: &str) -> Self {
        self.fragments.push(regex::escape(value));
        self
    }

    /// A numeric fragment in the digit-class syntax described at module
    /// level.
    pub fn number(mut self, value: &str) -> Self {
        let mut fragment = String::with_capacity(value.len() * 2);
        for c in value.chars() {
            match c {
                'd' => fragment.push_str(r"\d"),
                'x' => fragment.push_str("[0-9a-fA-F]"),
                '.' => fragment.push_str(r"\."),
                other => fragment.push(other),
            }
        }
        self.fragments.push(fragment);
        self
    }

    /// A raw regular-expression fragment, passed through untouched.
    pub fn expression(mut self, value: &str) -> Self {
        self.fragments.push(value.to_string());
        self
    }

    /// Open a non-capturing group.
    pub fn group_begin(mut self) -> Self {
        self.fragments.push("(?:".to_string());
        self
    }

    /// Close the current group. `suffix` is a repetition suffix such as
    /// `""`, `"?"` or `"+"`.
    pub fn group_end(mut self, suffix: &str) -> Self {
        self.fragments.push(format!("){suffix}"));
        self
    }

    /// Alternation separator inside a group.
    pub fn or(mut self) -> Self {
        self.fragments.push("|".to_string());
        self
    }

    /// Make the previous fragment optional.
    pub fn optional(self) -> Self {
        self.optional_n(1)
    }

    /// Make the previous `count` fragments optional as one unit.
    pub fn optional_n(mut self, count: usize) -> Self {
        assert!(count <= self.fragments.len(), "optional before any fragment");
        let at = self.fragments.len() - count;
        self.fragments.insert(at, "(?:".to_string());
        self.fragments.push(")?".to_string());
        self
    }

    /// Match anything to the end of the input.
    pub fn any(mut self) -> Self {
        self.fragments.push(".*".to_string());
        self
    }

    /// Compile into an immutable, shareable pattern.
    ///
    /// # Panics
    ///
    /// Panics when the assembled fragments do not form a valid regular
    /// expression; pattern specs are compile-time constants of a plugin, so
    /// this is a programming error, not a data error.
    pub fn compile(self) -> Pattern {
        let source = self.fragments.concat();
        let anchored = format!("^(?:{source})$");
        match Regex::new(&anchored) {
            Ok(regex) => Pattern { regex },
            Err(e) => panic!("invalid pattern {source:?}: {e}"),
        }
    }
}

/// A compiled pattern: immutable, built once per protocol, shared read-only
/// across all connections and threads.
#[derive(Debug)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Match the entire input. A partial match is no match.
    ///
    /// On success returns a [`Parser`] cursor positioned before the first
    /// captured group.
    pub fn parse<'a>(&self, input: &'a str) -> Option<Parser<'a>> {
        self.regex.captures(input).map(Parser::from_captures)
    }

    /// The underlying regular expression, mostly useful for diagnostics.
    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }
}
