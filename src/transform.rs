//! Deserialize/serialize walkers.
//!
//! Both directions share one walker that follows the schema the way the
//! validator does: `allOf` folds the value through every child, `anyOf` and
//! `oneOf` dispatch on the discriminator or pick the first child the value
//! converts and validates against, arrays and objects convert element-wise,
//! and string primitives go through the format codecs or a registered data
//! type. Containers are rebuilt only when something inside them changed, so
//! an untouched value keeps its identity.
pub(crate) mod format;

use crate::exception::Exception;
use crate::guard::Guard;
use crate::schema::{Additional, Composite, Kind, Schema, SchemaId};
use crate::value::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Deserialize,
    Serialize,
}

pub(crate) fn run(direction: Direction, exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, value: &Value) -> Value {
    let (attributes, inner) = value.attributes();
    let enabled = match direction {
        Direction::Deserialize => attributes.deserialize,
        Direction::Serialize => attributes.serialize,
    };
    if !enabled || inner.is_null() || !guard.enter(inner, schema.id()) {
        return value.clone();
    }
    let converted = walk(direction, exception, guard, schema, inner);
    guard.leave(inner, schema.id());

    if converted.is_same_node(inner) {
        value.clone()
    } else if matches!(value, Value::Attributed(_)) {
        Value::with_attributes(converted, attributes)
    } else {
        converted
    }
}

fn walk(direction: Direction, exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, value: &Value) -> Value {
    match &schema.composite {
        Some(Composite::AllOf(ids)) => ids.iter().fold(value.clone(), |current, id| {
            run(direction, exception, guard, schema.child(*id), &current)
        }),
        Some(Composite::AnyOf(ids) | Composite::OneOf(ids)) => {
            if schema.discriminator.is_some() {
                discriminated(direction, exception, guard, schema, value)
            } else {
                first_match(direction, guard, schema, ids, value)
            }
        }
        Some(Composite::Not(_)) => value.clone(),
        None => match &schema.node().kind {
            Some(Kind::Array(items)) => match (items.items, value.as_array()) {
                (Some(id), Some(elements)) => array(direction, exception, guard, schema.child(id), elements, value),
                _ => value.clone(),
            },
            Some(Kind::Object(props)) => {
                let converted = match value.as_object() {
                    Some(map) => object(direction, exception, guard, schema, &props.properties, props.additional, map, value),
                    None => value.clone(),
                };
                match schema.discriminate(&converted) {
                    Some((_, target)) => run(direction, exception, guard, target, &converted),
                    None => converted,
                }
            }
            Some(_) => primitive(direction, exception, schema, value),
            None => value.clone(),
        },
    }
}

fn discriminated(direction: Direction, exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, value: &Value) -> Value {
    match schema.discriminate(value) {
        Some((key, target)) => run(direction, exception.at(&key), guard, target, value),
        None => {
            let property = schema.discriminator.as_ref().map(|d| d.property_name.as_str()).unwrap_or_default();
            let found = value.as_object().and_then(|m| m.get(property));
            let shown = found.map(Value::to_string).unwrap_or_else(|| "undefined".to_string());
            exception.message(format!("Discriminator property \"{property}\" as {shown} did not map to a schema"));
            value.clone()
        }
    }
}

/// First child the value converts cleanly for and then validates against.
/// Without one the value is left as is for the validator to report.
fn first_match(direction: Direction, guard: &mut Guard, schema: Schema<'_>, ids: &[SchemaId], value: &Value) -> Value {
    for id in ids {
        let child = schema.child(*id);
        let mut trial = Exception::default();
        let converted = run(direction, &mut trial, guard, child, value);
        if trial.has_exception() {
            continue;
        }
        let candidate = match direction {
            Direction::Deserialize => &converted,
            Direction::Serialize => value,
        };
        if child.validate(candidate).is_none() {
            return converted;
        }
    }
    value.clone()
}

fn array(direction: Direction, exception: &mut Exception, guard: &mut Guard, items: Schema<'_>, elements: &[Value], original: &Value) -> Value {
    let converted: Vec<Value> = elements
        .iter()
        .enumerate()
        .map(|(index, element)| run(direction, exception.at(index), guard, items, element))
        .collect();
    let unchanged = converted.iter().zip(elements).all(|(a, b)| a.is_same_node(b));
    if unchanged { original.clone() } else { Value::array(converted) }
}

#[allow(clippy::too_many_arguments)]
fn object(
    direction: Direction,
    exception: &mut Exception,
    guard: &mut Guard,
    schema: Schema<'_>,
    properties: &indexmap::IndexMap<String, SchemaId>,
    additional: Additional,
    map: &Map,
    original: &Value,
) -> Value {
    let mut changed = false;
    let mut converted = Map::with_capacity(map.len());
    for (key, property) in map {
        let target = match (properties.get(key), additional) {
            (Some(id), _) => Some(schema.child(*id)),
            (None, Additional::Schema(id)) => Some(schema.child(id)),
            (None, Additional::Allowed(_)) => None,
        };
        let value = match target {
            Some(target) => run(direction, exception.at(key), guard, target, property),
            None => property.clone(),
        };
        changed |= !value.is_same_node(property);
        converted.insert(key.clone(), value);
    }
    if changed { Value::object(converted) } else { original.clone() }
}

fn primitive(direction: Direction, exception: &mut Exception, schema: Schema<'_>, value: &Value) -> Value {
    let result = match (schema.data_type(), direction) {
        (Some(data_type), Direction::Deserialize) => data_type.deserialize(schema, value),
        (Some(data_type), Direction::Serialize) => data_type.serialize(schema, value),
        (None, _) if !matches!(schema.node().kind, Some(Kind::String(_))) => Ok(value.clone()),
        (None, Direction::Deserialize) => format::deserialize(schema.format.as_deref(), value),
        (None, Direction::Serialize) => format::serialize(schema.format.as_deref(), value),
    };
    result.unwrap_or_else(|message| {
        exception.message(message);
        value.clone()
    })
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::compile::{compile, compile_document, CompileOptions};
    use crate::schema::Major;
    use crate::value::{Attributes, Value};

    fn schema(definition: serde_json::Value) -> crate::compile::Compiled {
        let compiled = compile(&definition, CompileOptions::new(Major::V3));
        assert!(compiled.errors.is_none(), "{:?}", compiled.errors);
        compiled
    }

    #[test]
    fn nested_formats_convert_both_ways() {
        let compiled = schema(json!({
            "type": "object",
            "properties": {
                "born": {"type": "string", "format": "date"},
                "seen": {"type": "array", "items": {"type": "string", "format": "date-time"}},
                "blob": {"type": "string", "format": "byte"}
            }
        }));
        let wire = Value::from(json!({
            "born": "2000-01-02",
            "seen": ["2020-01-01T00:00:00Z"],
            "blob": "AQI=",
            "other": "x"
        }));
        let native = compiled.schema().deserialize(&wire).into_result().unwrap();
        assert!(matches!(native.as_object().unwrap()["born"], Value::Date(_)));
        assert!(matches!(native.as_object().unwrap()["seen"].as_array().unwrap()[0], Value::DateTime(_)));
        assert_eq!(native.as_object().unwrap()["blob"], Value::binary(vec![1, 2]));
        let back = compiled.schema().serialize(&native).into_result().unwrap();
        assert_eq!(back.to_json(), wire.to_json());
    }

    #[test]
    fn failures_are_reported_per_path_and_siblings_continue() {
        let compiled = schema(json!({
            "type": "array",
            "items": {"type": "string", "format": "date"}
        }));
        let outcome = compiled.schema().deserialize(&Value::from(json!(["bad", "2000-01-01", "worse"])));
        let error = outcome.error.unwrap();
        let paths: Vec<String> = error.diagnostics().iter().map(|d| d.pointer()).collect();
        assert_eq!(paths, ["/0", "/2"]);
        assert!(matches!(outcome.value.as_array().unwrap()[1], Value::Date(_)));
    }

    #[test]
    fn untouched_values_keep_their_identity() {
        let compiled = schema(json!({
            "type": "object",
            "properties": {"a": {"type": "array", "items": {"type": "string"}}}
        }));
        let wire = Value::from(json!({"a": ["x"], "b": 1}));
        let native = compiled.schema().deserialize(&wire).value;
        assert!(native.is_same_node(&wire));
    }

    #[test]
    fn attributes_can_opt_out() {
        let compiled = schema(json!({"type": "string", "format": "date"}));
        let mut attributes = Attributes::default();
        attributes.deserialize = false;
        let wire = Value::with_attributes(Value::from("nope"), attributes);
        let outcome = compiled.schema().deserialize(&wire);
        assert!(outcome.error.is_none());
        assert!(outcome.value.is_same_node(&wire));
    }

    #[test]
    fn all_of_folds_and_one_of_picks_the_valid_branch() {
        let compiled = schema(json!({
            "allOf": [
                {"type": "object", "properties": {"a": {"type": "string", "format": "date"}}},
                {"type": "object", "properties": {"b": {"type": "string", "format": "byte"}}}
            ]
        }));
        let native = compiled.schema().deserialize(&Value::from(json!({"a": "2000-01-01", "b": "AA=="}))).value;
        let map = native.as_object().unwrap();
        assert!(matches!(map["a"], Value::Date(_)));
        assert!(matches!(map["b"], Value::Binary(_)));

        let compiled = schema(json!({
            "oneOf": [
                {"type": "string", "format": "date"},
                {"type": "string", "format": "date-time"}
            ]
        }));
        let native = compiled.schema().deserialize(&Value::from("2000-01-01T10:00:00Z")).value;
        assert!(matches!(native, Value::DateTime(_)));
    }

    #[test]
    fn discriminated_objects_convert_through_their_target() {
        let document = json!({
            "components": {"schemas": {
                "Base": {
                    "type": "object",
                    "required": ["kind"],
                    "properties": {"kind": {"type": "string"}},
                    "discriminator": {"propertyName": "kind"}
                },
                "Dated": {
                    "allOf": [
                        {"$ref": "#/components/schemas/Base"},
                        {"type": "object", "properties": {"on": {"type": "string", "format": "date"}}}
                    ]
                }
            }}
        });
        let compiled = compile_document(&document, CompileOptions::new(Major::V3));
        assert!(compiled.errors.is_none(), "{:?}", compiled.errors);
        let base = compiled.schemas.named("Base").unwrap();
        let wire = Value::from(json!({"kind": "Dated", "on": "2000-01-01"}));
        let native = base.deserialize(&wire).into_result().unwrap();
        assert!(matches!(native.as_object().unwrap()["on"], Value::Date(_)));
        assert!(base.validate(&native).is_none());
        let back = base.serialize(&native).into_result().unwrap();
        assert_eq!(back.to_json(), wire.to_json());
    }
}
