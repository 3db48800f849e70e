//! Compiled schemas.
//!
//! Schemas live in an arena ([`SchemaSet`]) and refer to each other by
//! [`SchemaId`], so self-referential and mutually recursive definitions are
//! plain index cycles. A [`Schema`] is a cheap borrowed view of one node that
//! carries the set along, which is what the validator, the transforms and the
//! merge engine walk.
pub mod pattern;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data_type::{DataType, DataTypes};
use crate::exception::Exception;
use crate::guard::Guard;
use crate::outcome::Outcome;
use crate::populate::PopulateOptions;
use crate::value::{Map, Value};
use crate::{definition, populate, transform, validate};

pub use pattern::Pattern;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub(crate) usize);

/// OpenAPI major version a schema was compiled under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Major {
    V2,
    V3,
}

impl TryFrom<u8> for Major {
    type Error = String;
    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            2 => Ok(Major::V2),
            3 => Ok(Major::V3),
            other => Err(format!("unsupported OpenAPI major version: {other}")),
        }
    }
}

impl From<Major> for u8 {
    fn from(major: Major) -> u8 {
        match major {
            Major::V2 => 2,
            Major::V3 => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Array,
    Boolean,
    Integer,
    Number,
    Object,
    String,
}

impl Type {
    pub const ALL: [Type; 6] = [
        Type::Array, Type::Boolean, Type::Integer, Type::Number, Type::Object, Type::String,
    ];

    pub fn parse(s: &str) -> Option<Type> {
        Type::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Type::Array => "array",
            Type::Boolean => "boolean",
            Type::Integer => "integer",
            Type::Number => "number",
            Type::Object => "object",
            Type::String => "string",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most one composite keyword per node.
#[derive(Clone, Debug)]
pub enum Composite {
    AllOf(Vec<SchemaId>),
    AnyOf(Vec<SchemaId>),
    OneOf(Vec<SchemaId>),
    Not(SchemaId),
}

impl Composite {
    pub fn keyword(&self) -> &'static str {
        match self {
            Composite::AllOf(_) => "allOf",
            Composite::AnyOf(_) => "anyOf",
            Composite::OneOf(_) => "oneOf",
            Composite::Not(_) => "not",
        }
    }
}

/// Type-specific keywords. Which variant a node carries follows its `type`.
#[derive(Clone, Debug)]
pub enum Kind {
    Boolean,
    Integer(Numeric),
    Number(Numeric),
    String(Text),
    Array(Items),
    Object(Properties),
}

impl Kind {
    pub fn empty(ty: Type) -> Kind {
        match ty {
            Type::Boolean => Kind::Boolean,
            Type::Integer => Kind::Integer(Numeric::default()),
            Type::Number => Kind::Number(Numeric::default()),
            Type::String => Kind::String(Text::default()),
            Type::Array => Kind::Array(Items::default()),
            Type::Object => Kind::Object(Properties::default()),
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Kind::Boolean => Type::Boolean,
            Kind::Integer(_) => Type::Integer,
            Kind::Number(_) => Type::Number,
            Kind::String(_) => Type::String,
            Kind::Array(_) => Type::Array,
            Kind::Object(_) => Type::Object,
        }
    }

    /// Bounds for numeric-ish kinds: numbers, and strings whose format
    /// deserializes into something ordered (dates).
    pub fn range(&self) -> Option<&Range> {
        match self {
            Kind::Integer(n) | Kind::Number(n) => Some(&n.range),
            Kind::String(t) => Some(&t.range),
            _ => None,
        }
    }

    pub fn range_mut(&mut self) -> Option<&mut Range> {
        match self {
            Kind::Integer(n) | Kind::Number(n) => Some(&mut n.range),
            Kind::String(t) => Some(&mut t.range),
            _ => None,
        }
    }
}

/// A deserialized bound and its exclusivity flag.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub exclusive: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Range {
    pub minimum: Option<Bound>,
    pub maximum: Option<Bound>,
}

#[derive(Clone, Debug, Default)]
pub struct Numeric {
    pub range: Range,
    pub multiple_of: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct Text {
    pub range: Range,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<Pattern>,
}

#[derive(Clone, Debug, Default)]
pub struct Items {
    pub items: Option<SchemaId>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
}

#[derive(Clone, Debug)]
pub struct Properties {
    pub properties: IndexMap<String, SchemaId>,
    pub additional: Additional,
    pub required: Vec<String>,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            properties: IndexMap::new(),
            additional: Additional::Allowed(true),
            required: Vec::new(),
            min_properties: None,
            max_properties: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Additional {
    Allowed(bool),
    Schema(SchemaId),
}

#[derive(Clone, Debug)]
pub struct Discriminator {
    pub property_name: String,
    pub mapping: IndexMap<String, Mapping>,
}

/// One discriminator mapping entry: the reference as written plus the
/// schema it resolved to once the whole document was compiled.
#[derive(Clone, Debug)]
pub struct Mapping {
    pub reference: String,
    pub target: Option<SchemaId>,
}

#[derive(Clone, Debug, Default)]
pub struct SchemaNode {
    /// Canonical reference key when the node was reached through `$ref`.
    pub key: Option<String>,
    pub composite: Option<Composite>,
    pub kind: Option<Kind>,
    pub format: Option<String>,
    pub enumeration: Option<Arc<[Value]>>,
    pub default: Option<Value>,
    pub example: Option<Value>,
    pub discriminator: Option<Discriminator>,
    pub nullable: bool,
    pub read_only: bool,
    pub write_only: bool,
    pub deprecated: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub xml: Option<serde_json::Value>,
    pub external_docs: Option<serde_json::Value>,
    pub extensions: IndexMap<String, serde_json::Value>,
    /// Diagnostics of this node's own subtree from compilation.
    pub(crate) errors: Option<Exception>,
}

impl SchemaNode {
    pub fn ty(&self) -> Option<Type> {
        self.kind.as_ref().map(Kind::ty)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ARENA
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone)]
pub struct SchemaSet {
    pub(crate) nodes: Vec<SchemaNode>,
    pub(crate) named: IndexMap<String, SchemaId>,
    pub(crate) major: Major,
    pub(crate) data_types: Arc<DataTypes>,
}

impl fmt::Debug for SchemaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaSet")
            .field("major", &self.major)
            .field("nodes", &self.nodes.len())
            .field("named", &self.named)
            .finish()
    }
}

impl SchemaSet {
    pub(crate) fn new(major: Major, data_types: Arc<DataTypes>) -> Self {
        Self { nodes: Vec::new(), named: IndexMap::new(), major, data_types }
    }

    pub(crate) fn push(&mut self, node: SchemaNode) -> SchemaId {
        self.nodes.push(node);
        SchemaId(self.nodes.len() - 1)
    }

    pub(crate) fn node_mut(&mut self, id: SchemaId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    pub fn schema(&self, id: SchemaId) -> Schema<'_> {
        assert!(id.0 < self.nodes.len(), "schema id {} does not belong to this set", id.0);
        Schema { set: self, id }
    }

    /// Component schema by name (`#/components/schemas/<name>` in v3,
    /// `#/definitions/<name>` in v2).
    pub fn named(&self, name: &str) -> Option<Schema<'_>> {
        self.named.get(name).map(|id| self.schema(*id))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }

    pub fn major(&self) -> Major {
        self.major
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VIEW
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Copy)]
pub struct Schema<'a> {
    set: &'a SchemaSet,
    id: SchemaId,
}

impl<'a> Deref for Schema<'a> {
    type Target = SchemaNode;
    fn deref(&self) -> &SchemaNode {
        &self.set.nodes[self.id.0]
    }
}

impl PartialEq for Schema<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.set, other.set) && self.id == other.id
    }
}

impl fmt::Debug for Schema<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &self.id.0)
            .field("key", &self.key)
            .field("type", &self.ty())
            .finish()
    }
}

impl<'a> Schema<'a> {
    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn set(&self) -> &'a SchemaSet {
        self.set
    }

    pub fn node(&self) -> &'a SchemaNode {
        &self.set.nodes[self.id.0]
    }

    pub fn major(&self) -> Major {
        self.set.major
    }

    pub(crate) fn child(&self, id: SchemaId) -> Schema<'a> {
        Schema { set: self.set, id }
    }

    pub fn items(&self) -> Option<Schema<'a>> {
        match &self.node().kind {
            Some(Kind::Array(items)) => items.items.map(|id| self.child(id)),
            _ => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<Schema<'a>> {
        match &self.node().kind {
            Some(Kind::Object(props)) => props.properties.get(name).map(|id| self.child(*id)),
            _ => None,
        }
    }

    /// Compile diagnostics of this schema's subtree, if it had any.
    pub fn exception(&self) -> Option<&'a Exception> {
        self.node().errors.as_ref()
    }

    /// Registered data type for this schema's `(type, format)` pair.
    pub fn data_type(&self) -> Option<&'a dyn DataType> {
        let node = self.node();
        let format = node.format.as_deref()?;
        self.set.data_types.get(node.ty()?, format)
    }

    /// Whether `minimum`/`maximum` apply: numbers, dates and registered
    /// numeric data types.
    pub fn is_numericish(&self) -> bool {
        match self.ty() {
            Some(Type::Integer | Type::Number) => true,
            Some(Type::String) if matches!(self.format.as_deref(), Some("date" | "date-time")) => true,
            _ => self.data_type().is_some_and(|dt| dt.is_numeric()),
        }
    }

    /// Check `value` against this schema. `None` means the value is valid.
    pub fn validate(&self, value: &Value) -> Option<Exception> {
        let mut exception = Exception::new("Invalid value");
        validate::run(&mut exception, &mut Guard::default(), *self, value, validate::Options::default());
        exception.has_exception().then_some(exception)
    }

    /// Convert a wire value (dates, bytes as strings) into its native form.
    pub fn deserialize(&self, value: &Value) -> Outcome<Value> {
        let mut exception = Exception::new("Unable to deserialize value");
        let value = transform::run(
            transform::Direction::Deserialize, &mut exception, &mut Guard::default(), *self, value,
        );
        Outcome::new(value, exception, None)
    }

    /// Convert a native value back into its wire form.
    pub fn serialize(&self, value: &Value) -> Outcome<Value> {
        let mut exception = Exception::new("Unable to serialize value");
        let value = transform::run(
            transform::Direction::Serialize, &mut exception, &mut Guard::default(), *self, value,
        );
        Outcome::new(value, exception, None)
    }

    /// Discriminator key read off `value` and the schema it selects.
    ///
    /// The explicit mapping is consulted first, then the component schema
    /// with the same name.
    pub fn discriminate(&self, value: &Value) -> Option<(String, Schema<'a>)> {
        let property = match &self.node().discriminator {
            Some(d) => &d.property_name,
            None => return None,
        };
        let key = discriminator_key(value, property)?;
        self.discriminator_target(&key).map(|schema| (key, schema))
    }

    pub(crate) fn discriminator_target(&self, key: &str) -> Option<Schema<'a>> {
        let discriminator = self.node().discriminator.as_ref()?;
        if let Some(mapping) = discriminator.mapping.get(key) {
            return mapping.target.map(|id| self.child(id));
        }
        self.set.named(key)
    }

    /// Fill in `value` from defaults, `x-variable`/`x-template` extensions and
    /// `params`.
    pub fn populate(&self, params: &Map, value: Option<Value>, options: &PopulateOptions) -> Outcome<Option<Value>> {
        populate::run(*self, params, value, options)
    }

    /// Render back into a raw definition.
    pub fn to_definition(&self) -> serde_json::Value {
        definition::render(*self)
    }
}

/// Discriminator value of `value` as a string, if it is an object carrying
/// the property.
pub(crate) fn discriminator_key(value: &Value, property: &str) -> Option<String> {
    let found = value.as_object()?.get(property)?;
    match found.inner() {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
