use schema_enforcer::{compile, compile_document, merge, CompileOptions, Compilation, Major, MergeOptions, Value};
use serde_json::{json, Value as JsonValue};

fn document(schemas: JsonValue) -> Compilation {
    let compiled = compile_document(&json!({"openapi": "3.0.0", "components": {"schemas": schemas}}), CompileOptions::new(Major::V3));
    assert!(compiled.errors.is_none(), "{:?}", compiled.errors);
    compiled
}

fn valid(compiled: &Compilation, name: &str, value: JsonValue) -> bool {
    let schema = compiled.schemas.named(name).unwrap();
    let native = schema.deserialize(&Value::from(value)).into_result().unwrap();
    schema.validate(&native).is_none()
}

#[test]
fn one_of_requires_exactly_one_match() {
    let compiled = document(json!({
        "Either": {"oneOf": [
            {"type": "integer", "minimum": 0},
            {"type": "integer", "maximum": 10}
        ]}
    }));
    assert!(valid(&compiled, "Either", json!(20)));
    assert!(valid(&compiled, "Either", json!(-5)));
    assert!(!valid(&compiled, "Either", json!(5)));
}

#[test]
fn bounds_are_inclusive_unless_marked_exclusive() {
    let compiled = document(json!({
        "Closed": {"type": "number", "minimum": 1, "maximum": 2},
        "Open": {"type": "number", "minimum": 1, "maximum": 2, "exclusiveMinimum": true, "exclusiveMaximum": true},
        "Since": {"type": "string", "format": "date", "minimum": "2020-01-01"}
    }));
    assert!(valid(&compiled, "Closed", json!(1)));
    assert!(valid(&compiled, "Closed", json!(2)));
    assert!(!valid(&compiled, "Open", json!(1)));
    assert!(!valid(&compiled, "Open", json!(2)));
    assert!(valid(&compiled, "Open", json!(1.5)));
    assert!(valid(&compiled, "Since", json!("2020-01-01")));
    assert!(!valid(&compiled, "Since", json!("2019-12-31")));
}

#[test]
fn discriminators_dispatch_to_the_named_schema() {
    let compiled = document(json!({
        "Pet": {
            "type": "object",
            "required": ["petType"],
            "properties": {"petType": {"type": "string"}},
            "discriminator": {"propertyName": "petType", "mapping": {"hound": "Dog"}}
        },
        "Cat": {"allOf": [
            {"$ref": "#/components/schemas/Pet"},
            {"type": "object", "required": ["lives"], "properties": {"lives": {"type": "integer"}}}
        ]},
        "Dog": {"allOf": [
            {"$ref": "#/components/schemas/Pet"},
            {"type": "object", "required": ["bark"], "properties": {"bark": {"type": "boolean"}}}
        ]}
    }));
    assert!(valid(&compiled, "Pet", json!({"petType": "Cat", "lives": 9})));
    assert!(!valid(&compiled, "Pet", json!({"petType": "Cat", "bark": true})));
    assert!(valid(&compiled, "Pet", json!({"petType": "hound", "bark": true})));
    assert!(!valid(&compiled, "Pet", json!({"petType": "Fish"})));

    let pet = compiled.schemas.named("Pet").unwrap();
    let (key, target) = pet.discriminate(&Value::from(json!({"petType": "hound"}))).unwrap();
    assert_eq!(key, "hound");
    assert_eq!(target, compiled.schemas.named("Dog").unwrap());
}

#[test]
fn merging_intersects_and_is_idempotent() {
    let compiled = document(json!({
        "Wide": {"type": "integer", "minimum": 0, "maximum": 100, "multipleOf": 2},
        "Narrow": {"type": "integer", "minimum": 12, "maximum": 48, "multipleOf": 3}
    }));
    let wide = compiled.schemas.named("Wide").unwrap();
    let narrow = compiled.schemas.named("Narrow").unwrap();

    let forward = merge(&[wide, narrow], MergeOptions::default()).unwrap().value.unwrap();
    let backward = merge(&[narrow, wide], MergeOptions::default()).unwrap().value.unwrap();
    let expected = json!({"type": "integer", "minimum": 12, "maximum": 48, "multipleOf": 6});
    assert_eq!(forward.schema().to_definition(), expected);
    assert_eq!(backward.schema().to_definition(), expected);

    let twice = merge(&[wide, wide], MergeOptions::default()).unwrap().value.unwrap();
    assert_eq!(twice.schema().to_definition(), wide.to_definition());

    let recompiled = compile(&forward.schema().to_definition(), CompileOptions::new(Major::V3));
    assert!(recompiled.errors.is_none());
    assert!(recompiled.schema().validate(&Value::from(18)).is_none());
    assert!(recompiled.schema().validate(&Value::from(16)).is_some());
    assert!(recompiled.schema().validate(&Value::from(54)).is_some());
}

#[test]
fn formats_round_trip_through_the_schema() {
    let compiled = document(json!({
        "Record": {
            "type": "object",
            "properties": {
                "day": {"type": "string", "format": "date"},
                "at": {"type": "string", "format": "date-time"},
                "blob": {"type": "string", "format": "byte"},
                "bits": {"type": "string", "format": "binary"}
            }
        }
    }));
    let record = compiled.schemas.named("Record").unwrap();
    let wire = json!({"day": "2021-03-04", "at": "2021-03-04T05:06:07.500Z", "blob": "3q2+7w==", "bits": "0000111100001111"});
    let native = record.deserialize(&Value::from(wire.clone())).into_result().unwrap();
    assert!(record.validate(&native).is_none());
    assert!(record.validate(&Value::from(wire.clone())).is_some());
    let back = record.serialize(&native).into_result().unwrap();
    assert_eq!(back.to_json(), wire);

    // deserializing an already native value changes nothing
    let again = record.deserialize(&native).into_result().unwrap();
    assert_eq!(again, native);
}

#[test]
fn stored_constants_are_native_and_shared() {
    let compiled = document(json!({
        "Day": {"type": "string", "format": "date", "enum": ["2020-01-01", "2020-12-31"], "default": "2020-01-01"}
    }));
    let day = compiled.schemas.named("Day").unwrap();
    let members = day.enumeration.clone().unwrap();
    assert!(matches!(members[0], Value::Date(_)));
    assert_eq!(day.default.as_ref(), Some(&members[0]));
    assert!(std::sync::Arc::ptr_eq(&members, day.enumeration.as_ref().unwrap()));
    assert!(day.validate(&members[1]).is_none());
}

#[test]
fn recursive_schemas_terminate() {
    let compiled = document(json!({
        "Tree": {
            "type": "object",
            "properties": {
                "value": {"type": "integer"},
                "children": {"type": "array", "items": {"$ref": "#/components/schemas/Tree"}}
            }
        },
        "Loop": {"allOf": [{"$ref": "#/components/schemas/Loop"}, {"type": "string"}]}
    }));
    let leaf = json!({"value": 1, "children": []});
    let tree = json!({"value": 0, "children": [leaf.clone(), {"value": 2, "children": [leaf]}]});
    assert!(valid(&compiled, "Tree", tree));
    assert!(!valid(&compiled, "Tree", json!({"children": [{"value": "x"}]})));

    let looping = compiled.schemas.named("Loop").unwrap();
    assert!(looping.validate(&Value::from("fine")).is_none());
    assert!(looping.validate(&Value::from(1)).is_some());
}

#[test]
fn validation_is_repeatable() {
    let compiled = document(json!({"Name": {"type": "string", "maxLength": 3}}));
    let name = compiled.schemas.named("Name").unwrap();
    let value = Value::from("long");
    let first = name.validate(&value).unwrap();
    let second = name.validate(&value).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.diagnostics().len(), 1);
}
