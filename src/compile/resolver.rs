//! `$ref` resolution seam.
//!
//! The compiler never fetches anything itself: it asks a
//! [`ReferenceResolver`] for the raw definition behind a reference and uses
//! the returned key to memoize compiled nodes.
use serde_json::Value as JsonValue;

use crate::schema::Major;

/// A resolved reference: canonical key plus the raw definition it points at.
#[derive(Clone, Debug)]
pub struct Resolved<'a> {
    pub key: String,
    pub definition: &'a JsonValue,
}

pub trait ReferenceResolver {
    fn resolve(&self, reference: &str) -> Option<Resolved<'_>>;
}

/// Resolves local `#/...` JSON pointers against one in-memory document.
/// Remote references resolve to nothing.
#[derive(Clone, Copy, Debug)]
pub struct DocumentResolver<'d> {
    document: &'d JsonValue,
}

impl<'d> DocumentResolver<'d> {
    pub fn new(document: &'d JsonValue) -> Self {
        Self { document }
    }
}

impl ReferenceResolver for DocumentResolver<'_> {
    fn resolve(&self, reference: &str) -> Option<Resolved<'_>> {
        let pointer = reference.strip_prefix('#')?;
        let definition = self.document.pointer(pointer)?;
        Some(Resolved { key: format!("#{pointer}"), definition })
    }
}

/// Reference a discriminator mapping value stands for: paths and URLs are
/// used as written, bare names point into the component schemas.
pub fn mapping_reference(value: &str, major: Major) -> String {
    if value.contains('/') || value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }
    match major {
        Major::V2 => format!("#/definitions/{}", escape(value)),
        Major::V3 => format!("#/components/schemas/{}", escape(value)),
    }
}

/// Component name a reference key registers under, if it names one.
pub(crate) fn component_name(key: &str) -> Option<String> {
    let rest = key
        .strip_prefix("#/components/schemas/")
        .or_else(|| key.strip_prefix("#/definitions/"))?;
    (!rest.contains('/')).then(|| unescape(rest))
}

/// Path segments of a local pointer, used to address compile diagnostics.
pub(crate) fn pointer_path(key: &str) -> Vec<String> {
    match key.strip_prefix("#/") {
        Some(pointer) => pointer.split('/').map(unescape).collect(),
        None => vec![key.to_string()],
    }
}

pub(crate) fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_pointers_resolve_and_remote_ones_do_not() {
        let doc = json!({"components": {"schemas": {"a/b": {"type": "string"}}}});
        let resolver = DocumentResolver::new(&doc);
        let found = resolver.resolve("#/components/schemas/a~1b").unwrap();
        assert_eq!(found.definition, &json!({"type": "string"}));
        assert_eq!(component_name(&found.key).as_deref(), Some("a/b"));
        assert!(resolver.resolve("#/components/schemas/missing").is_none());
        assert!(resolver.resolve("https://example.com/schema.json").is_none());
    }

    #[test]
    fn mapping_values_follow_the_version() {
        assert_eq!(mapping_reference("Cat", Major::V3), "#/components/schemas/Cat");
        assert_eq!(mapping_reference("Cat", Major::V2), "#/definitions/Cat");
        assert_eq!(mapping_reference("#/x/Cat", Major::V3), "#/x/Cat");
        assert_eq!(pointer_path("#/components/schemas/Cat"), ["components", "schemas", "Cat"]);
    }
}
