//! `pattern` keyword matcher.
//!
//! A compiled schema holds a single regex, but merging two schemas with
//! different patterns yields a matcher that requires every source pattern to
//! match, so the type keeps a list.
use std::fmt;

use regex::Regex;

#[derive(Clone, Debug)]
pub struct Pattern {
    regexes: Vec<Regex>,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self { regexes: vec![Regex::new(source)?] })
    }

    /// Unanchored search, like the OpenAPI `pattern` keyword.
    pub fn is_match(&self, s: &str) -> bool {
        self.regexes.iter().all(|rx| rx.is_match(s))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.regexes.iter().map(Regex::as_str)
    }

    /// Matcher requiring both patterns; identical sources are kept once.
    pub fn merge(&self, other: &Pattern) -> Pattern {
        let mut regexes = self.regexes.clone();
        for rx in &other.regexes {
            if !regexes.iter().any(|r| r.as_str() == rx.as_str()) {
                regexes.push(rx.clone());
            }
        }
        Pattern { regexes }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.sources().eq(other.sources())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.sources().map(|s| format!("/{s}/")).collect();
        f.write_str(&parts.join(" and "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_patterns_require_every_source() {
        let digits = Pattern::new("^[0-9]+$").unwrap();
        let short = Pattern::new("^.{0,3}$").unwrap();
        let both = digits.merge(&short);
        assert!(both.is_match("123"));
        assert!(!both.is_match("1234"));
        assert!(!both.is_match("ab"));
        assert_eq!(both.to_string(), "/^[0-9]+$/ and /^.{0,3}$/");
        assert_eq!(both.merge(&digits), both);
    }
}
