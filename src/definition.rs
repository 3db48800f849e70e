//! Render a compiled (or merged) schema back into a raw definition.
//!
//! Bounds, `enum`, `default` and `example` are serialized through the schema
//! so native dates and bytes come back as wire strings. A node met again
//! while it is still being rendered becomes `{"$ref": key}` when it was
//! reached through a reference, and `{"x-recursive": true}` otherwise.
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::schema::{Additional, Composite, Kind, Major, Range, Schema, SchemaId};
use crate::value::Value;

pub(crate) fn render(schema: Schema<'_>) -> JsonValue {
    Renderer { active: Vec::new() }.node(schema)
}

struct Renderer {
    active: Vec<SchemaId>,
}

impl Renderer {
    fn node(&mut self, schema: Schema<'_>) -> JsonValue {
        if self.active.contains(&schema.id()) {
            return match &schema.key {
                Some(key) => json!({ "$ref": key }),
                None => json!({ "x-recursive": true }),
            };
        }
        self.active.push(schema.id());
        let mut out = JsonMap::new();
        self.body(schema, &mut out);
        self.active.pop();
        JsonValue::Object(out)
    }

    fn body(&mut self, schema: Schema<'_>, out: &mut JsonMap<String, JsonValue>) {
        if let Some(kind) = &schema.kind {
            out.insert("type".into(), kind.ty().as_str().into());
        }
        if let Some(format) = &schema.format {
            out.insert("format".into(), format.as_str().into());
        }
        match &schema.kind {
            Some(Kind::Integer(numeric) | Kind::Number(numeric)) => {
                range(schema, &numeric.range, out);
                if let Some(multiple) = numeric.multiple_of {
                    out.insert("multipleOf".into(), Value::from_f64(multiple).to_json());
                }
            }
            Some(Kind::String(text)) => {
                range(schema, &text.range, out);
                insert_count(out, "maxLength", text.max_length);
                insert_count(out, "minLength", text.min_length);
                if let Some(pattern) = &text.pattern {
                    let mut sources = pattern.sources();
                    if let Some(first) = sources.next() {
                        out.insert("pattern".into(), first.into());
                    }
                    // the keyword holds one regex; any further ones become allOf members
                    let rest: Vec<JsonValue> = sources.map(|s| json!({ "type": "string", "pattern": s })).collect();
                    if !rest.is_empty() {
                        out.insert("allOf".into(), JsonValue::Array(rest));
                    }
                }
            }
            Some(Kind::Array(items)) => {
                if let Some(id) = items.items {
                    out.insert("items".into(), self.node(schema.child(id)));
                }
                insert_count(out, "maxItems", items.max_items);
                insert_count(out, "minItems", items.min_items);
                if items.unique_items {
                    out.insert("uniqueItems".into(), true.into());
                }
            }
            Some(Kind::Object(props)) => {
                if !props.properties.is_empty() {
                    let properties: JsonMap<String, JsonValue> = props
                        .properties
                        .iter()
                        .map(|(name, id)| (name.clone(), self.node(schema.child(*id))))
                        .collect();
                    out.insert("properties".into(), JsonValue::Object(properties));
                }
                if !props.required.is_empty() {
                    out.insert("required".into(), props.required.clone().into());
                }
                match props.additional {
                    Additional::Allowed(true) => {}
                    Additional::Allowed(false) => {
                        out.insert("additionalProperties".into(), false.into());
                    }
                    Additional::Schema(id) => {
                        out.insert("additionalProperties".into(), self.node(schema.child(id)));
                    }
                }
                insert_count(out, "maxProperties", props.max_properties);
                insert_count(out, "minProperties", props.min_properties);
            }
            Some(Kind::Boolean) | None => {}
        }

        if let Some(discriminator) = &schema.discriminator {
            let rendered = match schema.major() {
                Major::V2 => discriminator.property_name.clone().into(),
                Major::V3 => {
                    let mut d = JsonMap::new();
                    d.insert("propertyName".into(), discriminator.property_name.clone().into());
                    if !discriminator.mapping.is_empty() {
                        let mapping: JsonMap<String, JsonValue> = discriminator
                            .mapping
                            .iter()
                            .map(|(key, m)| (key.clone(), m.reference.clone().into()))
                            .collect();
                        d.insert("mapping".into(), JsonValue::Object(mapping));
                    }
                    JsonValue::Object(d)
                }
            };
            out.insert("discriminator".into(), rendered);
        }

        match &schema.composite {
            Some(Composite::AllOf(ids) | Composite::AnyOf(ids) | Composite::OneOf(ids)) => {
                let children: Vec<JsonValue> = ids.iter().map(|id| self.node(schema.child(*id))).collect();
                let keyword = schema.composite.as_ref().map(Composite::keyword).unwrap_or("allOf");
                out.insert(keyword.into(), JsonValue::Array(children));
            }
            Some(Composite::Not(id)) => {
                out.insert("not".into(), self.node(schema.child(*id)));
            }
            None => {}
        }

        if let Some(members) = &schema.enumeration {
            let members: Vec<JsonValue> = members.iter().map(|m| wire(schema, m)).collect();
            out.insert("enum".into(), JsonValue::Array(members));
        }
        if let Some(default) = &schema.default {
            out.insert("default".into(), wire(schema, default));
        }
        if let Some(example) = &schema.example {
            out.insert("example".into(), wire(schema, example));
        }
        for (flag, set) in [
            ("nullable", schema.nullable),
            ("readOnly", schema.read_only),
            ("writeOnly", schema.write_only),
            ("deprecated", schema.deprecated),
        ] {
            if set {
                out.insert(flag.into(), true.into());
            }
        }
        if let Some(title) = &schema.title {
            out.insert("title".into(), title.as_str().into());
        }
        if let Some(description) = &schema.description {
            out.insert("description".into(), description.as_str().into());
        }
        if let Some(xml) = &schema.xml {
            out.insert("xml".into(), xml.clone());
        }
        if let Some(docs) = &schema.external_docs {
            out.insert("externalDocs".into(), docs.clone());
        }
        for (name, value) in &schema.extensions {
            out.insert(name.clone(), value.clone());
        }
    }
}

fn range(schema: Schema<'_>, range: &Range, out: &mut JsonMap<String, JsonValue>) {
    for (name, exclusive_name, bound) in [
        ("maximum", "exclusiveMaximum", &range.maximum),
        ("minimum", "exclusiveMinimum", &range.minimum),
    ] {
        let Some(bound) = bound else { continue };
        out.insert(name.into(), wire(schema, &bound.value));
        if bound.exclusive {
            out.insert(exclusive_name.into(), true.into());
        }
    }
}

fn insert_count(out: &mut JsonMap<String, JsonValue>, name: &str, count: Option<u64>) {
    if let Some(count) = count {
        out.insert(name.into(), count.into());
    }
}

/// Wire form of a stored constant. Serialization problems cannot occur for
/// values that passed compilation, so the plain JSON form is the fallback.
fn wire(schema: Schema<'_>, value: &Value) -> JsonValue {
    let outcome = schema.serialize(value);
    match outcome.error {
        None => outcome.value.to_json(),
        Some(_) => value.to_json(),
    }
}

// ------------------------------- Tests ------------------------------------ //
