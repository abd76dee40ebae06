//! Compiled regular expressions used by the gates and account ACLs.
//!
//! [`Pattern`] wraps a single [`Regex`] and round-trips through serde as its
//! source string, so account records can carry ACL expressions directly.
//! [`PatternSet`] compiles a list of sources into one [`RegexSet`]; an empty
//! set never matches.

use std::fmt;

use regex::{Regex, RegexBuilder, RegexSet};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SigilError, SigilResult};

/// A single compiled regular expression.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SigilError::InvalidPattern`] if `source` is not a valid regex.
    pub fn new(source: &str) -> SigilResult<Self> {
        Regex::new(source)
            .map(Self)
            .map_err(|source_err| SigilError::InvalidPattern {
                pattern: source.to_owned(),
                source: source_err,
            })
    }

    /// Compile a case-insensitive pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SigilError::InvalidPattern`] if `source` is not a valid regex.
    pub fn new_case_insensitive(source: &str) -> SigilResult<Self> {
        RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map(Self)
            .map_err(|source_err| SigilError::InvalidPattern {
                pattern: source.to_owned(),
                source: source_err,
            })
    }

    /// Whether the pattern matches anywhere in `haystack`.
    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }

    /// The pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.0.as_str()).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(serde::de::Error::custom)
    }
}

/// A set of patterns matched as a unit: the set matches if any member does.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    set: Option<RegexSet>,
}

impl PatternSet {
    /// Compile a list of pattern sources. Blank entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SigilError::InvalidPattern`] naming the first source that
    /// fails to compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use sigil_core::PatternSet;
    ///
    /// let set = PatternSet::compile(&["^/public/".to_owned(), r"\.css$".to_owned()]).unwrap();
    /// assert!(set.is_match("/public/logo.png"));
    /// assert!(set.is_match("/app/site.css"));
    /// assert!(!set.is_match("/account/get"));
    /// ```
    pub fn compile(sources: &[String]) -> SigilResult<Self> {
        let sources: Vec<&str> = sources
            .iter()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect();

        if sources.is_empty() {
            return Ok(Self::default());
        }

        // Compile one by one first so the error names the culprit.
        for source in &sources {
            Pattern::new(source)?;
        }

        let set = RegexSet::new(&sources).map_err(|source_err| SigilError::InvalidPattern {
            pattern: sources.join(" | "),
            source: source_err,
        })?;

        Ok(Self { set: Some(set) })
    }

    /// An empty set that never matches.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any pattern in the set matches `haystack`.
    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.set.as_ref().is_some_and(|set| set.is_match(haystack))
    }

    /// Whether the set has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_none()
    }
}
