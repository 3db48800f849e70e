//! Path-aware diagnostics tree.
//!
//! An [`Exception`] collects messages instead of failing fast. Children are
//! either addressed by a path segment ([`Exception::at`]: property names,
//! array indexes, keywords) or nested under their own header
//! ([`Exception::nest`]). A tree "has an exception" when any node in it holds
//! at least one message, so empty branches created along the way are free.
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Exception {
    header: String,
    messages: Vec<String>,
    children: Vec<Child>,
}

#[derive(Clone, Debug, PartialEq)]
enum Child {
    At(String, Exception),
    Nested(Exception),
}

/// One flattened message with the path segments that lead to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: Vec<String>,
    pub message: String,
}

impl Diagnostic {
    /// Path rendered as a JSON-pointer-like string, `/` when at the root.
    pub fn pointer(&self) -> String {
        if self.path.is_empty() {
            return "/".to_string();
        }
        self.path.iter().map(|s| format!("/{s}")).collect()
    }
}

impl Exception {
    pub fn new(header: impl Into<String>) -> Self {
        Self { header: header.into(), ..Self::default() }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Child addressed by `key`; repeated calls with the same key return the
    /// same child.
    pub fn at(&mut self, key: impl fmt::Display) -> &mut Exception {
        let key = key.to_string();
        let index = self.children.iter().position(|c| matches!(c, Child::At(k, _) if *k == key));
        let index = match index {
            Some(i) => i,
            None => {
                self.children.push(Child::At(key, Exception::default()));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            Child::At(_, e) | Child::Nested(e) => e,
        }
    }

    /// Child with its own header; repeated calls with the same header return
    /// the same child.
    pub fn nest(&mut self, header: impl Into<String>) -> &mut Exception {
        let header = header.into();
        let index = self.children.iter().position(|c| matches!(c, Child::Nested(e) if e.header == header));
        let index = match index {
            Some(i) => i,
            None => {
                self.children.push(Child::Nested(Exception::new(header)));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            Child::At(_, e) | Child::Nested(e) => e,
        }
    }

    /// Descendant reached by following `at` segments.
    pub fn get_at(&self, path: &[String]) -> Option<&Exception> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.children.iter().find_map(|c| match c {
            Child::At(key, e) if key == first => e.get_at(rest),
            _ => None,
        })
    }

    pub fn message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Attach a separately built tree as a nested child.
    pub fn push(&mut self, child: Exception) {
        self.children.push(Child::Nested(child));
    }

    pub fn has_exception(&self) -> bool {
        !self.messages.is_empty() || self.children.iter().any(|c| c.exception().has_exception())
    }

    /// Number of messages in the whole tree.
    pub fn count(&self) -> usize {
        self.messages.len() + self.children.iter().map(|c| c.exception().count()).sum::<usize>()
    }

    /// Every message paired with its `at` path. Nested headers do not
    /// contribute path segments.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        self.collect(&mut Vec::new(), &mut out);
        out
    }

    fn collect(&self, path: &mut Vec<String>, out: &mut Vec<Diagnostic>) {
        for message in &self.messages {
            out.push(Diagnostic { path: path.clone(), message: message.clone() });
        }
        for child in &self.children {
            match child {
                Child::At(key, e) => {
                    path.push(key.clone());
                    e.collect(path, out);
                    path.pop();
                }
                Child::Nested(e) => e.collect(path, out),
            }
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{prefix}{message}")?;
        }
        for child in &self.children {
            if !child.exception().has_exception() {
                continue;
            }
            match child {
                Child::At(key, e) => {
                    // collapse single-branch chains into `at: a > b`
                    let mut keys = vec![key.as_str()];
                    let mut node = e;
                    while node.messages.is_empty() && node.children.len() == 1 {
                        match &node.children[0] {
                            Child::At(k, next) => {
                                keys.push(k);
                                node = next;
                            }
                            Child::Nested(_) => break,
                        }
                    }
                    writeln!(f, "{prefix}at: {}", keys.join(" > "))?;
                    node.render(f, &format!("{prefix}  "))?;
                }
                Child::Nested(e) => {
                    if e.header.is_empty() {
                        e.render(f, prefix)?;
                    } else {
                        writeln!(f, "{prefix}{}", e.header)?;
                        e.render(f, &format!("{prefix}  "))?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Child {
    fn exception(&self) -> &Exception {
        match self {
            Child::At(_, e) | Child::Nested(e) => e,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        self.render(f, "  ")
    }
}

impl std::error::Error for Exception {}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_branches_do_not_count() {
        let mut e = Exception::new("Invalid value");
        e.at("a").at(0);
        e.nest("Error with properties");
        assert!(!e.has_exception());
        assert_eq!(e.count(), 0);
    }

    #[test]
    fn at_reuses_children_and_paths_are_reported() {
        let mut e = Exception::new("Invalid value");
        e.at("pets").at(1).message("Expected a string");
        e.at("pets").at(2).message("Expected a number");
        e.message("root problem");
        assert!(e.has_exception());
        assert_eq!(e.count(), 3);
        let diags = e.diagnostics();
        assert_eq!(diags[0].pointer(), "/");
        assert_eq!(diags[1].pointer(), "/pets/1");
        assert_eq!(diags[2].pointer(), "/pets/2");
    }

    #[test]
    fn display_renders_an_indented_tree() {
        let mut e = Exception::new("Invalid value");
        e.nest("Error with properties").at("a").at("b").message("Expected a string");
        let text = e.to_string();
        assert_eq!(
            text,
            "Invalid value\n  Error with properties\n    at: a > b\n      Expected a string\n"
        );
    }

    #[test]
    fn nest_reuses_headers_and_get_at_follows_keys() {
        let mut e = Exception::new("Invalid value");
        e.nest("Error with properties").at("a").message("one");
        e.nest("Error with properties").at("b").message("two");
        e.at("x").at("y").message("three");
        assert_eq!(e.to_string().matches("Error with properties").count(), 1);
        let path = ["x".to_string(), "y".to_string()];
        assert_eq!(e.get_at(&path).map(Exception::count), Some(1));
        assert!(e.get_at(&["z".to_string()]).is_none());
    }

    #[test]
    fn pushed_trees_keep_their_header() {
        let mut child = Exception::new("Did not validate against exactly one oneOf schema");
        child.message("Validated against schema at index 0");
        let mut e = Exception::new("Invalid value");
        e.push(child);
        assert!(e.to_string().contains("  Did not validate against exactly one oneOf schema\n"));
    }
}
