//! Declarative keyword table.
//!
//! Each entry says when a keyword may appear, what JSON shape it must have
//! and whether it is mandatory, all as pure functions of the [`Context`]
//! built from the node's raw definition. Entries are listed in processing
//! order: `type`, `format`, bounds and `enum` come first because the rules
//! of later keywords depend on them.
use serde_json::Value as JsonValue;

use crate::schema::{Major, Type};

pub(super) struct Context<'a> {
    pub major: Major,
    pub definition: &'a serde_json::Map<String, JsonValue>,
    pub ty: Option<Type>,
    /// Schema is the value of a `properties` entry.
    pub is_property: bool,
    /// `minimum`/`maximum` apply (numbers, dates, numeric data types).
    pub numericish: bool,
}

impl Context<'_> {
    fn has(&self, keyword: &str) -> bool {
        self.definition.contains_key(keyword)
    }

    fn is(&self, ty: Type) -> bool {
        self.ty == Some(ty)
    }

    fn v3(&self) -> bool {
        self.major == Major::V3
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Expect {
    Boolean,
    Number,
    String,
    Array,
    Object,
    /// Boolean or schema object (`additionalProperties`).
    BooleanOrObject,
    Any,
}

impl Expect {
    pub fn matches(self, value: &JsonValue) -> bool {
        match self {
            Expect::Boolean => value.is_boolean(),
            Expect::Number => value.is_number(),
            Expect::String => value.is_string(),
            Expect::Array => value.is_array(),
            Expect::Object => value.is_object(),
            Expect::BooleanOrObject => value.is_boolean() || value.is_object(),
            Expect::Any => true,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Expect::Boolean => "a boolean",
            Expect::Number => "a number",
            Expect::String => "a string",
            Expect::Array => "an array",
            Expect::Object => "a plain object",
            Expect::BooleanOrObject => "a boolean or a plain object",
            Expect::Any => "any value",
        }
    }
}

pub(super) struct Keyword {
    pub name: &'static str,
    pub allowed: fn(&Context) -> bool,
    pub expects: fn(&Context) -> Expect,
    pub required: fn(&Context) -> bool,
}

fn always(_: &Context) -> bool {
    true
}

fn never(_: &Context) -> bool {
    false
}

fn v3(c: &Context) -> bool {
    c.v3()
}

fn array(c: &Context) -> bool {
    c.is(Type::Array)
}

fn object(c: &Context) -> bool {
    c.is(Type::Object)
}

fn numericish(c: &Context) -> bool {
    c.numericish
}

fn boolean(_: &Context) -> Expect {
    Expect::Boolean
}

fn number(_: &Context) -> Expect {
    Expect::Number
}

fn string(_: &Context) -> Expect {
    Expect::String
}

fn list(_: &Context) -> Expect {
    Expect::Array
}

fn map(_: &Context) -> Expect {
    Expect::Object
}

fn any(_: &Context) -> Expect {
    Expect::Any
}

/// Bounds are written in the wire form of the schema: strings for dates,
/// numbers otherwise.
fn bound(c: &Context) -> Expect {
    match c.ty {
        Some(Type::String) => Expect::String,
        Some(Type::Boolean) => Expect::Boolean,
        _ => Expect::Number,
    }
}

pub(super) static KEYWORDS: &[Keyword] = &[
    Keyword {
        name: "type",
        allowed: always,
        expects: string,
        required: |c| !["allOf", "anyOf", "oneOf", "not"].iter().any(|k| c.has(k)),
    },
    Keyword {
        name: "format",
        allowed: |c| matches!(c.ty, Some(Type::Integer | Type::Number | Type::String)),
        expects: string,
        required: never,
    },
    Keyword { name: "maximum", allowed: numericish, expects: bound, required: never },
    Keyword { name: "minimum", allowed: numericish, expects: bound, required: never },
    Keyword { name: "enum", allowed: always, expects: list, required: never },
    Keyword { name: "exclusiveMaximum", allowed: numericish, expects: boolean, required: never },
    Keyword { name: "exclusiveMinimum", allowed: numericish, expects: boolean, required: never },
    Keyword {
        name: "multipleOf",
        allowed: |c| matches!(c.ty, Some(Type::Integer | Type::Number)),
        expects: number,
        required: never,
    },
    Keyword {
        name: "maxLength",
        allowed: |c| c.is(Type::String) && !c.numericish,
        expects: number,
        required: never,
    },
    Keyword {
        name: "minLength",
        allowed: |c| c.is(Type::String) && !c.numericish,
        expects: number,
        required: never,
    },
    Keyword { name: "pattern", allowed: |c| c.is(Type::String), expects: string, required: never },
    Keyword { name: "items", allowed: array, expects: map, required: array },
    Keyword { name: "maxItems", allowed: array, expects: number, required: never },
    Keyword { name: "minItems", allowed: array, expects: number, required: never },
    Keyword { name: "uniqueItems", allowed: array, expects: boolean, required: never },
    Keyword { name: "properties", allowed: object, expects: map, required: never },
    Keyword { name: "required", allowed: object, expects: list, required: never },
    Keyword {
        name: "additionalProperties",
        allowed: object,
        expects: |_| Expect::BooleanOrObject,
        required: never,
    },
    Keyword { name: "maxProperties", allowed: object, expects: number, required: never },
    Keyword { name: "minProperties", allowed: object, expects: number, required: never },
    Keyword {
        name: "discriminator",
        allowed: |c| c.is(Type::Object) || c.has("anyOf") || c.has("oneOf"),
        expects: |c| if c.v3() { Expect::Object } else { Expect::String },
        required: never,
    },
    Keyword { name: "allOf", allowed: always, expects: list, required: never },
    Keyword { name: "anyOf", allowed: v3, expects: list, required: never },
    Keyword { name: "oneOf", allowed: v3, expects: list, required: never },
    Keyword { name: "not", allowed: v3, expects: map, required: never },
    Keyword { name: "nullable", allowed: v3, expects: boolean, required: never },
    Keyword { name: "deprecated", allowed: v3, expects: boolean, required: never },
    Keyword { name: "readOnly", allowed: |c| c.is_property, expects: boolean, required: never },
    Keyword { name: "writeOnly", allowed: |c| c.v3() && c.is_property, expects: boolean, required: never },
    Keyword { name: "title", allowed: always, expects: string, required: never },
    Keyword { name: "description", allowed: always, expects: string, required: never },
    Keyword { name: "default", allowed: always, expects: any, required: never },
    Keyword { name: "example", allowed: always, expects: any, required: never },
    Keyword { name: "xml", allowed: always, expects: map, required: never },
    Keyword { name: "externalDocs", allowed: always, expects: map, required: never },
];

pub(super) fn lookup(name: &str) -> Option<&'static Keyword> {
    KEYWORDS.iter().find(|k| k.name == name)
}

/// Standard `format` values per type; anything else is a warning unless a
/// data type is registered for it.
pub(super) fn standard_formats(ty: Type) -> &'static [&'static str] {
    match ty {
        Type::Integer => &["int32", "int64"],
        Type::Number => &["float", "double"],
        Type::String => &["binary", "byte", "date", "date-time", "password"],
        _ => &[],
    }
}
