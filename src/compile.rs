//! Schema definition compiler.
//!
//! Turns raw OpenAPI Schema Objects into nodes of a [`SchemaSet`]. Keywords
//! are checked against the declarative table in [`keywords`] and every
//! problem is accumulated in an [`Exception`] tree addressed by definition
//! path; a compile always yields a usable set, and callers decide what to do
//! with the diagnostics.
//!
//! Compilation happens in two passes. The first walks definitions top-down,
//! memoizing `$ref` targets by their resolved key so recursive references
//! become arena cycles. [`Compiler::finish`] then resolves discriminator
//! mappings (targets may be forward references), deserializes bounds,
//! `enum`, `default` and `example` through the finished schemas, and runs
//! data type compile hooks.
mod finish;
mod keywords;
pub mod resolver;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::data_type::{self, DataTypes};
use crate::exception::Exception;
use crate::schema::{
    Additional, Bound, Composite, Discriminator, Items, Kind, Major, Mapping, Numeric, Pattern, Properties,
    Schema, SchemaId, SchemaNode, SchemaSet, Text, Type,
};
use crate::value::Value;

use keywords::{Context, KEYWORDS};
pub use resolver::{mapping_reference, DocumentResolver, ReferenceResolver, Resolved};

// ————————————————————————————————————————————————————————————————————————————
// OPTIONS & RESULTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub major: Major,
    /// Resolve discriminator mapping references once everything is
    /// compiled. When off, discriminators dispatch through the component
    /// name table only.
    pub resolve_references: bool,
    /// Data type table; the sealed process-wide registry when `None`.
    pub data_types: Option<Arc<DataTypes>>,
}

impl CompileOptions {
    pub fn new(major: Major) -> Self {
        Self { major, resolve_references: true, data_types: None }
    }

    pub fn with_data_types(mut self, data_types: Arc<DataTypes>) -> Self {
        self.data_types = Some(data_types);
        self
    }
}

/// A single compiled definition.
#[derive(Clone, Debug)]
pub struct Compiled {
    pub schemas: SchemaSet,
    pub root: SchemaId,
    pub errors: Option<Exception>,
    pub warnings: Option<Exception>,
}

impl Compiled {
    pub fn schema(&self) -> Schema<'_> {
        self.schemas.schema(self.root)
    }
}

/// Everything a [`Compiler`] produced.
#[derive(Clone, Debug)]
pub struct Compilation {
    pub schemas: SchemaSet,
    pub errors: Option<Exception>,
    pub warnings: Option<Exception>,
}

/// Compile one definition. Local `#/...` references resolve against the
/// definition itself.
pub fn compile(definition: &JsonValue, options: CompileOptions) -> Compiled {
    let resolver = DocumentResolver::new(definition);
    let mut compiler = Compiler::new(&resolver, options);
    let root = compiler.compile(definition);
    let Compilation { schemas, errors, warnings } = compiler.finish();
    Compiled { schemas, root, errors, warnings }
}

/// Compile every component schema of an OpenAPI document
/// (`components.schemas` in v3, `definitions` in v2).
pub fn compile_document(document: &JsonValue, options: CompileOptions) -> Compilation {
    compile_document_at(document, &[], options).0
}

/// [`compile_document`] plus the schemas at `pointers`, JSON pointers into
/// the document such as `/paths/~1pets/get/responses/200/schema`. Yields one
/// id per pointer, `None` where it does not resolve.
pub fn compile_document_at(
    document: &JsonValue,
    pointers: &[&str],
    options: CompileOptions,
) -> (Compilation, Vec<Option<SchemaId>>) {
    let resolver = DocumentResolver::new(document);
    let (prefix, components) = match options.major {
        Major::V2 => ("#/definitions/", document.get("definitions")),
        Major::V3 => ("#/components/schemas/", document.pointer("/components/schemas")),
    };
    let mut compiler = Compiler::new(&resolver, options);
    if let Some(JsonValue::Object(components)) = components {
        for name in components.keys() {
            let reference = format!("{prefix}{}", resolver::escape(name));
            if compiler.compile_reference(&reference).is_none() {
                let path = resolver::pointer_path(&reference);
                compiler.error(&path).message(format!("Reference cannot be resolved: {reference}"));
            }
        }
    }
    let ids = pointers
        .iter()
        .map(|pointer| {
            let reference = format!("#{pointer}");
            let id = compiler.compile_reference(&reference);
            if id.is_none() {
                compiler.error(&[]).message(format!("Reference cannot be resolved: {reference}"));
            }
            id
        })
        .collect();
    (compiler.finish(), ids)
}

// ————————————————————————————————————————————————————————————————————————————
// COMPILER
// ————————————————————————————————————————————————————————————————————————————

/// Where a definition sits relative to its parent.
#[derive(Clone, Copy, Debug, Default)]
struct Position {
    is_property: bool,
    /// Listed in the parent's `required`.
    required: bool,
    /// Reached through `$ref`, so its parent is unknown.
    referenced: bool,
}

/// Raw constants that can only be deserialized once every schema exists.
struct Deferred {
    id: SchemaId,
    enumeration: Option<Vec<JsonValue>>,
    default: Option<JsonValue>,
    example: Option<JsonValue>,
}

pub struct Compiler<'r> {
    resolver: &'r dyn ReferenceResolver,
    resolve_references: bool,
    set: SchemaSet,
    memo: HashMap<String, SchemaId>,
    aliasing: HashSet<String>,
    /// Definition path of every node, indexed by id.
    paths: Vec<Vec<String>>,
    deferred: Vec<Deferred>,
    errors: Exception,
    warnings: Exception,
}

impl fmt::Debug for Compiler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler").field("set", &self.set).field("memo", &self.memo).finish()
    }
}

impl<'r> Compiler<'r> {
    pub fn new(resolver: &'r dyn ReferenceResolver, options: CompileOptions) -> Self {
        let data_types = options.data_types.unwrap_or_else(data_type::global);
        Self {
            resolver,
            resolve_references: options.resolve_references,
            set: SchemaSet::new(options.major, data_types),
            memo: HashMap::new(),
            aliasing: HashSet::new(),
            paths: Vec::new(),
            deferred: Vec::new(),
            errors: Exception::new("One or more errors exist in the Schema definition"),
            warnings: Exception::new("One or more warnings exist in the Schema definition"),
        }
    }

    /// Compile a definition whose diagnostics are addressed from the root.
    pub fn compile(&mut self, definition: &JsonValue) -> SchemaId {
        self.node(definition, &[], Position::default())
    }

    /// Compile (or look up) the schema behind a reference. `None` when the
    /// resolver cannot resolve it.
    pub fn compile_reference(&mut self, reference: &str) -> Option<SchemaId> {
        let resolver = self.resolver;
        let Resolved { key, definition } = resolver.resolve(reference)?;
        if let Some(id) = self.memo.get(&key) {
            return Some(*id);
        }

        // `$ref` to a `$ref`: follow the chain, refusing to loop
        if let Some(next) = definition.get("$ref").and_then(JsonValue::as_str) {
            if !self.aliasing.insert(key.clone()) {
                return None;
            }
            let target = self.compile_reference(next);
            self.aliasing.remove(&key);
            if let Some(id) = target {
                self.remember(key, id);
            }
            return target;
        }

        tracing::debug!(reference = %key, "compiling referenced schema");
        let path = resolver::pointer_path(&key);
        let id = self.reserve(&path);
        self.remember(key.clone(), id);
        let position = Position { referenced: true, ..Position::default() };
        let mut node = self.build(id, definition, &path, position);
        node.key = Some(key);
        *self.set.node_mut(id) = node;
        Some(id)
    }

    fn remember(&mut self, key: String, id: SchemaId) {
        if let Some(name) = resolver::component_name(&key) {
            self.set.named.insert(name, id);
        }
        self.memo.insert(key, id);
    }

    fn reserve(&mut self, path: &[String]) -> SchemaId {
        self.paths.push(path.to_vec());
        self.set.push(SchemaNode::default())
    }

    fn error(&mut self, path: &[String]) -> &mut Exception {
        locate(&mut self.errors, path)
    }

    fn warning(&mut self, path: &[String]) -> &mut Exception {
        locate(&mut self.warnings, path)
    }

    fn node(&mut self, definition: &JsonValue, path: &[String], position: Position) -> SchemaId {
        if let Some(reference) = definition.get("$ref") {
            let Some(reference) = reference.as_str() else {
                self.error(&join(path, "$ref")).message(format!("Value must be a string. Received: {reference}"));
                return self.reserve(path);
            };
            return match self.compile_reference(reference) {
                Some(id) => id,
                None => {
                    self.error(path).message(format!("Reference cannot be resolved: {reference}"));
                    self.reserve(path)
                }
            };
        }
        let id = self.reserve(path);
        let node = self.build(id, definition, path, position);
        *self.set.node_mut(id) = node;
        id
    }

    fn build(&mut self, id: SchemaId, definition: &JsonValue, path: &[String], position: Position) -> SchemaNode {
        let mut node = SchemaNode::default();
        let Some(map) = definition.as_object() else {
            self.error(path).message(format!("Value must be a plain object. Received: {definition}"));
            return node;
        };

        let ty = map.get("type").and_then(JsonValue::as_str).and_then(Type::parse);
        let format = map.get("format").and_then(JsonValue::as_str);
        let numericish = match (ty, format) {
            (Some(Type::Integer | Type::Number), _) => true,
            (Some(Type::String), Some("date" | "date-time")) => true,
            (Some(ty), Some(format)) => self.set.data_types.get(ty, format).is_some_and(|dt| dt.is_numeric()),
            _ => false,
        };
        let context = Context {
            major: self.set.major,
            definition: map,
            ty,
            is_property: position.is_property || position.referenced,
            numericish,
        };

        for (key, value) in map {
            if key.starts_with("x-") {
                node.extensions.insert(key.clone(), value.clone());
            } else if keywords::lookup(key).is_none() {
                self.error(path).message(format!("Property not allowed: {key}"));
            }
        }

        let mut deferred = Deferred { id, enumeration: None, default: None, example: None };
        for keyword in KEYWORDS {
            let Some(value) = map.get(keyword.name) else {
                if (keyword.required)(&context) {
                    self.error(path).message(format!("Missing required property: {}", keyword.name));
                }
                continue;
            };
            if !(keyword.allowed)(&context) {
                self.error(path).message(format!("Property not allowed: {}", keyword.name));
                continue;
            }
            let expects = (keyword.expects)(&context);
            if !expects.matches(value) {
                self.error(&join(path, keyword.name))
                    .message(format!("Value must be {}. Received: {value}", expects.describe()));
                continue;
            }
            self.apply(&mut node, &mut deferred, &context, position, keyword.name, value, path);
        }

        self.cross_check(&node, map, path);
        if deferred.enumeration.is_some() || deferred.default.is_some() || deferred.example.is_some() {
            self.deferred.push(deferred);
        }
        node
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &mut self,
        node: &mut SchemaNode,
        deferred: &mut Deferred,
        context: &Context<'_>,
        position: Position,
        name: &str,
        value: &JsonValue,
        path: &[String],
    ) {
        let here = join(path, name);
        match name {
            "type" => match value.as_str().and_then(Type::parse) {
                Some(ty) => node.kind = Some(Kind::empty(ty)),
                None => self.error(&here).message(format!(
                    "Value must be one of: {}",
                    Type::ALL.map(Type::as_str).join(", ")
                )),
            },
            "format" => {
                let format = value.as_str().unwrap_or_default();
                if let Some(ty) = context.ty {
                    let standard = keywords::standard_formats(ty).contains(&format);
                    if !standard && !self.set.data_types.contains(ty, format) {
                        self.warning(&here).message(format!("Non standard format used: {format}"));
                    }
                }
                node.format = Some(format.to_string());
            }
            "maximum" | "minimum" => {
                let flag = if name == "maximum" { "exclusiveMaximum" } else { "exclusiveMinimum" };
                let exclusive = context.definition.get(flag).and_then(JsonValue::as_bool).unwrap_or(false);
                let bound = Bound { value: Value::from_json(value), exclusive };
                if let Some(range) = node.kind.as_mut().and_then(Kind::range_mut) {
                    if name == "maximum" {
                        range.maximum = Some(bound);
                    } else {
                        range.minimum = Some(bound);
                    }
                }
            }
            "enum" => deferred.enumeration = value.as_array().cloned(),
            // read together with the bounds they qualify
            "exclusiveMaximum" | "exclusiveMinimum" => {}
            "multipleOf" => match value.as_f64() {
                Some(n) if n > 0.0 => {
                    if let Some(numeric) = numeric(node) {
                        numeric.multiple_of = Some(n);
                    }
                }
                _ => self.error(&here).message("Value must be greater than zero"),
            },
            "maxLength" | "minLength" => {
                let count = self.count(&here, value);
                if let Some(text) = text(node) {
                    if name == "maxLength" { text.max_length = count } else { text.min_length = count }
                }
            }
            "pattern" => {
                let source = value.as_str().unwrap_or_default();
                if source.is_empty() {
                    self.error(&here).message("Value must be a non-empty string");
                    return;
                }
                match Pattern::new(source) {
                    Ok(pattern) => {
                        if let Some(text) = text(node) {
                            text.pattern = Some(pattern);
                        }
                    }
                    Err(err) => self.error(&here).message(format!("Invalid regular expression: {err}")),
                }
            }
            "items" => {
                let id = self.node(value, &here, Position::default());
                if let Some(items) = items(node) {
                    items.items = Some(id);
                }
            }
            "maxItems" | "minItems" => {
                let count = self.count(&here, value);
                if let Some(items) = items(node) {
                    if name == "maxItems" { items.max_items = count } else { items.min_items = count }
                }
            }
            "uniqueItems" => {
                if let Some(items) = items(node) {
                    items.unique_items = value.as_bool().unwrap_or(false);
                }
            }
            "properties" => {
                let required = context.definition.get("required").and_then(JsonValue::as_array);
                let mut compiled = IndexMap::new();
                for (key, definition) in value.as_object().into_iter().flatten() {
                    let position = Position {
                        is_property: true,
                        required: required.is_some_and(|r| r.iter().any(|v| v.as_str() == Some(key))),
                        referenced: false,
                    };
                    let at = join(&here, key);
                    let flagged = |k: &str| definition.get(k).and_then(JsonValue::as_bool).unwrap_or(false);
                    if flagged("readOnly") && flagged("writeOnly") {
                        self.error(&at).message("Cannot be marked as both readOnly and writeOnly");
                    }
                    compiled.insert(key.clone(), self.node(definition, &at, position));
                }
                if let Some(props) = properties(node) {
                    props.properties = compiled;
                }
            }
            "required" => {
                let mut names = Vec::new();
                for (index, entry) in value.as_array().into_iter().flatten().enumerate() {
                    match entry.as_str() {
                        Some(s) if !names.iter().any(|n| n == s) => names.push(s.to_string()),
                        Some(_) => {}
                        None => self.error(&join(&here, index)).message(format!("Value must be a string. Received: {entry}")),
                    }
                }
                if let Some(props) = properties(node) {
                    props.required = names;
                }
            }
            "additionalProperties" => {
                let additional = match value {
                    JsonValue::Bool(allowed) => Additional::Allowed(*allowed),
                    schema => Additional::Schema(self.node(schema, &here, Position::default())),
                };
                if let Some(props) = properties(node) {
                    props.additional = additional;
                }
            }
            "maxProperties" | "minProperties" => {
                let count = self.count(&here, value);
                if let Some(props) = properties(node) {
                    if name == "maxProperties" { props.max_properties = count } else { props.min_properties = count }
                }
            }
            "discriminator" => node.discriminator = self.discriminator(context, value, &here),
            "allOf" | "anyOf" | "oneOf" => {
                let ids: Vec<SchemaId> = value
                    .as_array()
                    .into_iter()
                    .flatten()
                    .enumerate()
                    .map(|(index, child)| self.node(child, &join(&here, index), Position::default()))
                    .collect();
                if node.composite.is_none() {
                    node.composite = Some(match name {
                        "allOf" => Composite::AllOf(ids),
                        "anyOf" => Composite::AnyOf(ids),
                        _ => Composite::OneOf(ids),
                    });
                }
            }
            "not" => {
                let id = self.node(value, &here, Position::default());
                if node.composite.is_none() {
                    node.composite = Some(Composite::Not(id));
                }
            }
            "nullable" => node.nullable = value.as_bool().unwrap_or(false),
            "deprecated" => node.deprecated = value.as_bool().unwrap_or(false),
            "readOnly" => {
                node.read_only = value.as_bool().unwrap_or(false);
                if node.read_only && position.required && context.major == Major::V2 {
                    self.warning(path).message("Property should not be marked as both read only and required");
                }
            }
            "writeOnly" => node.write_only = value.as_bool().unwrap_or(false),
            "title" => node.title = value.as_str().map(str::to_string),
            "description" => node.description = value.as_str().map(str::to_string),
            "default" => deferred.default = Some(value.clone()),
            "example" => deferred.example = Some(value.clone()),
            "xml" => node.xml = Some(value.clone()),
            "externalDocs" => node.external_docs = Some(value.clone()),
            other => unreachable!("keyword {other} has no handler"),
        }
    }

    fn count(&mut self, path: &[String], value: &JsonValue) -> Option<u64> {
        let count = value.as_u64();
        if count.is_none() {
            self.error(path).message("Value must be a non-negative integer");
        }
        count
    }

    fn discriminator(&mut self, context: &Context<'_>, value: &JsonValue, here: &[String]) -> Option<Discriminator> {
        let mut mapping = IndexMap::new();
        let property_name = match context.major {
            Major::V2 => value.as_str()?.to_string(),
            Major::V3 => {
                let Some(property) = value.get("propertyName").and_then(JsonValue::as_str) else {
                    self.error(here).message("Missing required property: propertyName");
                    return None;
                };
                match value.get("mapping") {
                    None => {}
                    Some(JsonValue::Object(entries)) => {
                        for (key, reference) in entries {
                            match reference.as_str() {
                                Some(reference) => {
                                    let reference = reference.to_string();
                                    mapping.insert(key.clone(), Mapping { reference, target: None });
                                }
                                None => self
                                    .error(&join(&join(here, "mapping"), key))
                                    .message(format!("Value must be a string. Received: {reference}")),
                            }
                        }
                    }
                    Some(other) => self
                        .error(&join(here, "mapping"))
                        .message(format!("Value must be a plain object. Received: {other}")),
                }
                property.to_string()
            }
        };

        if context.ty == Some(Type::Object) {
            let definition = context.definition;
            let required = definition
                .get("required")
                .and_then(JsonValue::as_array)
                .is_some_and(|r| r.iter().any(|v| v.as_str() == Some(&property_name)));
            if !required {
                self.error(here).message(format!(
                    "Value \"{property_name}\" must be found in the parent's required properties list."
                ));
            }
            let declared = definition
                .get("properties")
                .and_then(JsonValue::as_object)
                .is_some_and(|p| p.contains_key(&property_name));
            if !declared {
                self.error(here).message(format!(
                    "Value \"{property_name}\" must be found in the parent's properties definition."
                ));
            }
        }
        Some(Discriminator { property_name, mapping })
    }

    /// Schema-level conflicts between keywords.
    fn cross_check(&mut self, node: &SchemaNode, map: &serde_json::Map<String, JsonValue>, path: &[String]) {
        let composites: Vec<&str> = ["allOf", "anyOf", "oneOf", "not"]
            .into_iter()
            .filter(|k| map.contains_key(*k))
            .collect();
        if composites.len() > 1 {
            self.error(path).message(format!("Cannot have multiple composites: {}", composites.join(", ")));
        }

        let pairs = match &node.kind {
            Some(Kind::String(t)) => vec![("minLength", "maxLength", t.min_length, t.max_length)],
            Some(Kind::Array(i)) => vec![("minItems", "maxItems", i.min_items, i.max_items)],
            Some(Kind::Object(p)) => vec![("minProperties", "maxProperties", p.min_properties, p.max_properties)],
            _ => Vec::new(),
        };
        for (min_name, max_name, min, max) in pairs {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    self.error(path).message(format!(
                        "Property \"{min_name}\" must be less than or equal to \"{max_name}\""
                    ));
                }
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn locate<'e>(mut exception: &'e mut Exception, path: &[String]) -> &'e mut Exception {
    for segment in path {
        exception = exception.at(segment);
    }
    exception
}

fn join(path: &[String], segment: impl fmt::Display) -> Vec<String> {
    let mut joined = path.to_vec();
    joined.push(segment.to_string());
    joined
}

fn numeric(node: &mut SchemaNode) -> Option<&mut Numeric> {
    match &mut node.kind {
        Some(Kind::Integer(n) | Kind::Number(n)) => Some(n),
        _ => None,
    }
}

fn text(node: &mut SchemaNode) -> Option<&mut Text> {
    match &mut node.kind {
        Some(Kind::String(t)) => Some(t),
        _ => None,
    }
}

fn items(node: &mut SchemaNode) -> Option<&mut Items> {
    match &mut node.kind {
        Some(Kind::Array(i)) => Some(i),
        _ => None,
    }
}

fn properties(node: &mut SchemaNode) -> Option<&mut Properties> {
    match &mut node.kind {
        Some(Kind::Object(p)) => Some(p),
        _ => None,
    }
}

// ------------------------------- Tests ------------------------------------ //
