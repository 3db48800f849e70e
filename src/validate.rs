//! Structural value validation.
//!
//! Dispatch order per node: `nullable` short-circuit, then the composite
//! keyword if any (`allOf`, `anyOf`, `oneOf`, `not`), otherwise the kind
//! (`array`, `object`, primitives), then `enum` membership. Problems are
//! collected in the exception tree, addressed by value path.
use crate::exception::Exception;
use crate::guard::Guard;
use crate::schema::{Additional, Composite, Items, Kind, Numeric, Properties, Range, Schema, SchemaId, Text};
use crate::value::Value;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Options {
    /// Check `enum` membership. Off while validating the enum entries
    /// themselves.
    pub enumeration: bool,
    /// Check `minimum`/`maximum`. Off while validating the bounds themselves.
    pub bounds: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { enumeration: true, bounds: true }
    }
}

pub(crate) fn run(exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, value: &Value, options: Options) {
    let (attributes, inner) = value.attributes();
    if !attributes.validate {
        return;
    }
    if !guard.enter(inner, schema.id()) {
        return;
    }
    check(exception, guard, schema, inner, options);
    guard.leave(inner, schema.id());
}

fn check(exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, value: &Value, options: Options) {
    if schema.nullable && value.is_null() {
        return;
    }

    match &schema.composite {
        Some(Composite::AllOf(ids)) => {
            let child = exception.nest("Did not validate against allOf schemas");
            for (index, id) in ids.iter().enumerate() {
                run(child.at(index), guard, schema.child(*id), value, options);
            }
        }
        Some(Composite::AnyOf(ids)) => {
            if schema.discriminator.is_some() {
                discriminated(exception, guard, schema, value, options);
            } else {
                any_of(exception, guard, schema, ids, value, options);
            }
        }
        Some(Composite::OneOf(ids)) => {
            if schema.discriminator.is_some() {
                discriminated(exception, guard, schema, value, options);
            } else {
                one_of(exception, guard, schema, ids, value, options);
            }
        }
        Some(Composite::Not(id)) => {
            let mut child = Exception::default();
            run(&mut child, guard, schema.child(*id), value, options);
            if !child.has_exception() {
                exception.message("Value should not validate against schema");
            }
        }
        None => {
            match &schema.node().kind {
                Some(Kind::Array(items)) => array(exception, guard, schema, items, value, options),
                Some(Kind::Object(props)) => object(exception, guard, schema, props, value, options),
                Some(kind) => primitive(exception, schema, kind, value, options),
                None => {}
            }
            if options.enumeration {
                enumeration(exception, schema, value);
            }
        }
    }
}

// ------------------------------ Composites -------------------------------- //

fn discriminated(exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, value: &Value, options: Options) {
    let property = schema.discriminator.as_ref().map(|d| d.property_name.as_str()).unwrap_or_default();
    match schema.discriminate(value) {
        Some((key, target)) => run(exception.at(&key), guard, target, value, options),
        None => {
            let found = value.as_object().and_then(|m| m.get(property));
            let shown = found.map(Value::to_string).unwrap_or_else(|| "undefined".to_string());
            exception.message(format!(
                "Discriminator property \"{property}\" as {shown} did not map to a schema"
            ));
        }
    }
}

fn any_of(exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, ids: &[SchemaId], value: &Value, options: Options) {
    let mut failures = Exception::new("Did not validate against one or more anyOf schemas");
    for (index, id) in ids.iter().enumerate() {
        let child = failures.at(index);
        run(child, guard, schema.child(*id), value, options);
        if !child.has_exception() {
            return;
        }
    }
    exception.push(failures);
}

fn one_of(exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, ids: &[SchemaId], value: &Value, options: Options) {
    let mut outcomes = Exception::new("Did not validate against exactly one oneOf schema");
    let mut valid = 0;
    for (index, id) in ids.iter().enumerate() {
        let mut child = Exception::new(format!("Did not validate against schema at index {index}"));
        run(&mut child, guard, schema.child(*id), value, options);
        if child.has_exception() {
            outcomes.push(child);
        } else {
            valid += 1;
            outcomes.message(format!("Validated against schema at index {index}"));
        }
    }
    if valid != 1 {
        exception.push(outcomes);
    }
}

// -------------------------------- Kinds ----------------------------------- //

fn array(exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, items: &Items, value: &Value, options: Options) {
    let Some(elements) = value.as_array() else {
        exception.message(format!("Expected an array. Received: {value}"));
        return;
    };
    let length = elements.len() as u64;
    if let Some(max) = items.max_items.filter(|max| *max < length) {
        exception.message(format!("Too many items in the array. Maximum of {max}. Found {length} items"));
    }
    if let Some(min) = items.min_items.filter(|min| *min > length) {
        exception.message(format!("Too few items in the array. Minimum of {min}. Found {length} items"));
    }
    if items.unique_items {
        let mut singles: Vec<&Value> = Vec::new();
        for (index, element) in elements.iter().enumerate() {
            if singles.iter().any(|seen| *seen == element) {
                exception.message(format!("Array items must be unique. Value is not unique at index {index}"));
            } else {
                singles.push(element);
            }
        }
    }
    if let Some(id) = items.items {
        for (index, element) in elements.iter().enumerate() {
            run(exception.at(index), guard, schema.child(id), element, options);
        }
    }
}

fn object(exception: &mut Exception, guard: &mut Guard, schema: Schema<'_>, props: &Properties, value: &Value, options: Options) {
    let Some(map) = value.as_object() else {
        exception.message(format!("Expected a non-null object. Received: {value}"));
        return;
    };

    let mut missing: Vec<&str> = props.required.iter().map(String::as_str).collect();
    for (key, property) in map {
        missing.retain(|name| name != key);
        if let Some(id) = props.properties.get(key) {
            let known = exception.nest("Error with properties");
            run(known.at(key), guard, schema.child(*id), property, options);
        } else {
            match props.additional {
                Additional::Allowed(false) => exception.message(format!("Property not allowed: {key}")),
                Additional::Allowed(true) => {}
                Additional::Schema(id) => {
                    let additional = exception.nest("Error with additional properties");
                    run(additional.at(key), guard, schema.child(id), property, options);
                }
            }
        }
    }
    if !missing.is_empty() {
        exception.message(format!("One or more required properties missing: {}", missing.join(", ")));
    }

    let count = map.len() as u64;
    if let Some(max) = props.max_properties.filter(|max| count > *max) {
        exception.message(format!("Expected object property count to be less than or equal to {max}. Received: {count}"));
    }
    if let Some(min) = props.min_properties.filter(|min| count < *min) {
        exception.message(format!("Expected object property count to be greater than or equal to {min}. Received: {count}"));
    }

    if schema.discriminator.is_some() {
        match schema.discriminate(value) {
            Some((_, target)) => run(exception, guard, target, value, options),
            None => exception.message("Unable to map discriminator schema"),
        }
    }
}

fn primitive(exception: &mut Exception, schema: Schema<'_>, kind: &Kind, value: &Value, options: Options) {
    if let Some(data_type) = schema.data_type() {
        data_type.validate(schema, value, exception);
        return;
    }
    match kind {
        Kind::Boolean => {
            if value.as_bool().is_none() {
                exception.message(format!("Expected a boolean. Received: {value}"));
            }
        }
        Kind::Integer(numeric) => match value.as_f64() {
            Some(n) if n.fract() == 0.0 => number(exception, schema, "integer", numeric, value, n, options),
            _ => exception.message(format!("Expected an integer. Received: {value}")),
        },
        Kind::Number(numeric) => match value.as_f64() {
            Some(n) => number(exception, schema, "number", numeric, value, n, options),
            None => exception.message(format!("Expected a number. Received: {value}")),
        },
        Kind::String(text) => string(exception, schema, text, value, options),
        Kind::Array(_) | Kind::Object(_) => unreachable!("containers are dispatched before primitives"),
    }
}

fn number(exception: &mut Exception, schema: Schema<'_>, label: &str, numeric: &Numeric, value: &Value, n: f64, options: Options) {
    if options.bounds {
        bounds(exception, schema, label, &numeric.range, value);
    }
    if let Some(multiple) = numeric.multiple_of {
        let quotient = n / multiple;
        if (quotient - quotient.round()).abs() > 1e-9 {
            exception.message(format!("Expected a multiple of {}. Received: {value}", Value::from_f64(multiple)));
        }
    }
}

fn string(exception: &mut Exception, schema: Schema<'_>, text: &Text, value: &Value, options: Options) {
    match (schema.format.as_deref(), value.inner()) {
        (Some("date"), Value::Date(_)) | (Some("date-time"), Value::DateTime(_)) => {
            if options.bounds {
                bounds(exception, schema, "date", &text.range, value);
            }
        }
        (Some("date"), _) => exception.message(format!("Expected a valid date object. Received: {value}")),
        (Some("date-time"), _) => exception.message(format!("Expected a valid date-time object. Received: {value}")),
        (Some("byte" | "binary"), Value::Binary(bytes)) => {
            lengths(exception, text, bytes.len() as u64, value);
        }
        (Some("byte" | "binary"), _) => exception.message(format!("Expected a binary value. Received: {value}")),
        (_, Value::String(s)) => {
            lengths(exception, text, s.chars().count() as u64, value);
            if let Some(pattern) = text.pattern.as_ref().filter(|p| !p.is_match(s)) {
                exception.message(format!("String does not match required pattern {pattern} with value: {value}"));
            }
        }
        _ => exception.message(format!("Expected a string. Received: {value}")),
    }
}

fn lengths(exception: &mut Exception, text: &Text, length: u64, value: &Value) {
    if let Some(max) = text.max_length.filter(|max| length > *max) {
        exception.message(format!("String too long. {value} ({length}) exceeds maximum length of {max}"));
    }
    if let Some(min) = text.min_length.filter(|min| length < *min) {
        exception.message(format!("String too short. {value} ({length}) exceeds minimum length of {min}"));
    }
}

/// `minimum`/`maximum` with exclusivity. Bounds are compared natively and
/// shown in their serialized form.
fn bounds(exception: &mut Exception, schema: Schema<'_>, label: &str, range: &Range, value: &Value) {
    let shown = |v: &Value| {
        let wire = schema.serialize(v).value;
        wire.as_str().map(str::to_string).unwrap_or_else(|| wire.to_string())
    };
    if let Some(max) = &range.maximum {
        if let Some(ord) = value.compare(&max.value) {
            if max.exclusive && ord.is_ge() {
                exception.message(format!(
                    "Expected {label} to be less than {}. Received: {}", shown(&max.value), shown(value)
                ));
            } else if ord.is_gt() {
                exception.message(format!(
                    "Expected {label} to be less than or equal to {}. Received: {}", shown(&max.value), shown(value)
                ));
            }
        }
    }
    if let Some(min) = &range.minimum {
        if let Some(ord) = value.compare(&min.value) {
            if min.exclusive && ord.is_le() {
                exception.message(format!(
                    "Expected {label} to be greater than {}. Received: {}", shown(&min.value), shown(value)
                ));
            } else if ord.is_lt() {
                exception.message(format!(
                    "Expected {label} to be greater than or equal to {}. Received: {}", shown(&min.value), shown(value)
                ));
            }
        }
    }
}

fn enumeration(exception: &mut Exception, schema: Schema<'_>, value: &Value) {
    if let Some(members) = &schema.enumeration {
        if !members.iter().any(|member| member == value) {
            exception.message(format!("Value {value} did not meet enum requirements"));
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::compile::{compile, compile_document, CompileOptions};
    use crate::schema::Major;
    use crate::value::{Attributes, Value};

    fn messages(definition: serde_json::Value, value: serde_json::Value) -> Vec<String> {
        let compiled = compile(&definition, CompileOptions::new(Major::V3));
        assert!(compiled.errors.is_none(), "{:?}", compiled.errors);
        let schema = compiled.schema();
        let native = schema.deserialize(&Value::from(value)).value;
        schema.validate(&native)
            .map(|e| e.diagnostics().into_iter().map(|d| d.message).collect())
            .unwrap_or_default()
    }

    #[test]
    fn integer_bounds_honor_exclusivity() {
        let schema = json!({"type": "integer", "minimum": 5, "maximum": 5});
        assert!(messages(schema.clone(), json!(5)).is_empty());
        assert_eq!(messages(schema, json!(6)), ["Expected integer to be less than or equal to 5. Received: 6"]);

        let schema = json!({"type": "integer", "minimum": 1, "exclusiveMinimum": true});
        assert_eq!(messages(schema.clone(), json!(1)), ["Expected integer to be greater than 1. Received: 1"]);
        assert!(messages(schema, json!(2)).is_empty());
    }

    #[test]
    fn primitives_check_their_type() {
        assert_eq!(messages(json!({"type": "integer"}), json!(1.5)), ["Expected an integer. Received: 1.5"]);
        assert_eq!(messages(json!({"type": "boolean"}), json!("true")), ["Expected a boolean. Received: \"true\""]);
        assert!(messages(json!({"type": "number", "multipleOf": 0.5}), json!(2.5)).is_empty());
        assert_eq!(messages(json!({"type": "integer", "multipleOf": 3}), json!(4)), ["Expected a multiple of 3. Received: 4"]);
    }

    #[test]
    fn strings_check_length_and_pattern() {
        let schema = json!({"type": "string", "minLength": 2, "maxLength": 3, "pattern": "^a"});
        assert!(messages(schema.clone(), json!("ab")).is_empty());
        assert_eq!(messages(schema.clone(), json!("abcd")).len(), 1);
        assert_eq!(
            messages(schema, json!("b")),
            [
                "String too short. \"b\" (1) exceeds minimum length of 2",
                "String does not match required pattern /^a/ with value: \"b\"",
            ]
        );
    }

    #[test]
    fn dates_are_validated_after_deserialization() {
        let schema = json!({"type": "string", "format": "date", "maximum": "2000-01-01"});
        assert!(messages(schema.clone(), json!("1999-12-31")).is_empty());
        assert_eq!(
            messages(schema, json!("2000-01-02")),
            ["Expected date to be less than or equal to 2000-01-01. Received: 2000-01-02"]
        );
    }

    #[test]
    fn arrays_report_duplicates_and_item_paths() {
        let schema = json!({"type": "array", "maxItems": 3, "uniqueItems": true, "items": {"type": "integer"}});
        let compiled = compile(&schema, CompileOptions::new(Major::V3));
        let error = compiled.schema().validate(&Value::from(json!([1, 2, 1, "x"]))).unwrap();
        let diags = error.diagnostics();
        let found: Vec<(String, &str)> = diags.iter().map(|d| (d.pointer(), d.message.as_str())).collect();
        assert_eq!(found, [
            ("/".to_string(), "Too many items in the array. Maximum of 3. Found 4 items"),
            ("/".to_string(), "Array items must be unique. Value is not unique at index 2"),
            ("/3".to_string(), "Expected an integer. Received: \"x\""),
        ]);
    }

    #[test]
    fn objects_check_properties_required_and_additional() {
        let schema = json!({
            "type": "object",
            "required": ["a", "b", "c"],
            "properties": {"a": {"type": "string"}},
            "additionalProperties": false,
            "maxProperties": 1
        });
        let found = messages(schema, json!({"a": 1, "z": true}));
        assert_eq!(found, [
            "Property not allowed: z",
            "One or more required properties missing: b, c",
            "Expected object property count to be less than or equal to 1. Received: 2",
            "Expected a string. Received: 1",
        ]);
    }

    #[test]
    fn additional_properties_schema_applies_to_unknown_keys() {
        let schema = json!({"type": "object", "additionalProperties": {"type": "integer"}});
        assert!(messages(schema.clone(), json!({"x": 1})).is_empty());
        assert_eq!(messages(schema, json!({"x": "1"})), ["Expected an integer. Received: \"1\""]);
    }

    #[test]
    fn nullable_skips_everything() {
        assert!(messages(json!({"type": "string", "nullable": true, "enum": ["a"]}), json!(null)).is_empty());
        assert_eq!(messages(json!({"type": "string"}), json!(null)), ["Expected a string. Received: null"]);
    }

    #[test]
    fn enum_membership_uses_deep_equality() {
        let schema = json!({"type": "object", "enum": [{"a": 1}]});
        assert!(messages(schema.clone(), json!({"a": 1.0})).is_empty());
        assert_eq!(messages(schema, json!({"a": 2})), ["Value {\"a\":2} did not meet enum requirements"]);
    }

    #[test]
    fn one_of_requires_exactly_one_match() {
        let schema = json!({"oneOf": [{"type": "string"}, {"type": "number"}]});
        assert!(messages(schema.clone(), json!("x")).is_empty());
        assert!(messages(schema.clone(), json!(5)).is_empty());
        assert!(!messages(schema, json!(true)).is_empty());

        let ambiguous = json!({"oneOf": [{"type": "number"}, {"type": "integer"}]});
        let found = messages(ambiguous, json!(3));
        assert_eq!(found, ["Validated against schema at index 0", "Validated against schema at index 1"]);
    }

    #[test]
    fn any_of_short_circuits_and_not_inverts() {
        let schema = json!({"anyOf": [{"type": "string"}, {"type": "integer", "minimum": 0}]});
        assert!(messages(schema.clone(), json!(1)).is_empty());
        assert_eq!(messages(schema, json!(-1)).len(), 2);

        let not = json!({"not": {"type": "string"}});
        assert!(messages(not.clone(), json!(1)).is_empty());
        assert_eq!(messages(not, json!("a")), ["Value should not validate against schema"]);
    }

    #[test]
    fn all_of_nests_failures_by_index() {
        let schema = json!({"allOf": [{"type": "integer"}, {"type": "integer", "maximum": 2}]});
        let compiled = compile(&schema, CompileOptions::new(Major::V3));
        let error = compiled.schema().validate(&Value::from(3)).unwrap();
        let diags = error.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].pointer(), "/1");
        assert!(error.to_string().contains("Did not validate against allOf schemas"));
    }

    #[test]
    fn discriminator_dispatches_to_the_mapped_schema_only() {
        let document = json!({
            "openapi": "3.0.0",
            "components": {"schemas": {
                "Pet": {
                    "oneOf": [{"$ref": "#/components/schemas/A"}, {"$ref": "#/components/schemas/B"}],
                    "discriminator": {"propertyName": "kind", "mapping": {"a": "A", "b": "#/components/schemas/B"}}
                },
                "A": {"type": "object", "required": ["kind"], "properties": {"kind": {"type": "string"}, "size": {"type": "integer"}}},
                "B": {"type": "object", "required": ["kind"], "properties": {"kind": {"type": "string"}, "size": {"type": "string"}}}
            }}
        });
        let compiled = compile_document(&document, CompileOptions::new(Major::V3));
        assert!(compiled.errors.is_none(), "{:?}", compiled.errors);
        let pet = compiled.schemas.named("Pet").unwrap();

        assert!(pet.validate(&Value::from(json!({"kind": "a", "size": 1}))).is_none());
        let error = pet.validate(&Value::from(json!({"kind": "a", "size": "big"}))).unwrap();
        assert_eq!(error.diagnostics()[0].pointer(), "/a/size");
        let error = pet.validate(&Value::from(json!({"kind": "c"}))).unwrap();
        assert_eq!(error.diagnostics()[0].message, "Discriminator property \"kind\" as \"c\" did not map to a schema");
    }

    #[test]
    fn recursive_schemas_terminate() {
        let document = json!({
            "openapi": "3.0.0",
            "components": {"schemas": {
                "Loop": {"allOf": [{"$ref": "#/components/schemas/Loop"}]},
                "Tree": {
                    "type": "array",
                    "items": {"$ref": "#/components/schemas/Tree"}
                }
            }}
        });
        let compiled = compile_document(&document, CompileOptions::new(Major::V3));
        assert!(compiled.errors.is_none(), "{:?}", compiled.errors);
        let looped = compiled.schemas.named("Loop").unwrap();
        assert!(looped.validate(&Value::from(json!({"x": 1}))).is_none());
        assert!(looped.validate(&Value::from(1)).is_none());

        let shared = Value::from(json!([[], [[]]]));
        let tree = Value::array(vec![shared.clone(), shared.clone(), shared]);
        let schema = compiled.schemas.named("Tree").unwrap();
        assert!(schema.validate(&tree).is_none());
        assert!(schema.validate(&Value::from(json!([[1]]))).is_some());
    }

    #[test]
    fn validation_is_idempotent() {
        let compiled = compile(&json!({"type": "array", "items": {"type": "string"}}), CompileOptions::new(Major::V3));
        let value = Value::from(json!(["a", 1, 2]));
        assert_eq!(compiled.schema().validate(&value), compiled.schema().validate(&value));
    }

    #[test]
    fn values_marked_validated_are_skipped() {
        let compiled = compile(&json!({"type": "string"}), CompileOptions::new(Major::V3));
        let value = Value::with_attributes(Value::from(1), Attributes::validated());
        assert!(compiled.schema().validate(&value).is_none());
    }
}
