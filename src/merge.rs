//! Schema merge engine.
//!
//! Combines several schemas of one [`SchemaSet`] into a single equivalent
//! schema: `allOf` children are flattened, bounds intersect, `multipleOf`
//! values combine through their least common multiple, patterns stack, and
//! nested `items`/`properties`/`additionalProperties` merge recursively.
//! The result is appended to a copy of the input set, so references the
//! merge does not rewrite (discriminator targets, untouched children) keep
//! pointing at valid nodes.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exception::Exception;
use crate::outcome::Outcome;
use crate::schema::{Additional, Bound, Composite, Items, Kind, Numeric, Properties, Range, Schema, SchemaId, SchemaNode, SchemaSet, Text};
use crate::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MergeOptions {
    /// Let a later discriminator replace an earlier one instead of failing.
    pub overwrite_discriminator: bool,
}

/// A merged schema and the set it lives in.
#[derive(Clone, Debug)]
pub struct Merged {
    pub schemas: SchemaSet,
    pub root: SchemaId,
}

impl Merged {
    pub fn schema(&self) -> Schema<'_> {
        self.schemas.schema(self.root)
    }
}

/// Merge `schemas` in order.
///
/// Fails outright when the inputs are empty or come from different sets.
/// Every input must have compiled cleanly; merge problems are reported in
/// the outcome's error, in which case no schema is produced.
pub fn merge(schemas: &[Schema<'_>], options: MergeOptions) -> Result<Outcome<Option<Merged>>> {
    let first = schemas.first().ok_or(Error::EmptyMerge)?;
    if schemas.iter().any(|s| !std::ptr::eq(s.set(), first.set())) {
        return Err(Error::ForeignSchema);
    }

    let mut exception = Exception::new("Unable to merge schemas");
    for (index, schema) in schemas.iter().enumerate() {
        if let Some(error) = schema.exception() {
            exception.nest(format!("One or more errors with schema at index {index}")).push(error.clone());
        }
    }
    if exception.has_exception() {
        return Ok(Outcome::new(None, exception, None));
    }

    tracing::debug!(inputs = schemas.len(), "merging schemas");
    let mut merger = Merger { set: first.set().clone(), options, memo: HashMap::new() };
    let root = merger.merge(&mut exception, schemas.iter().map(Schema::id).collect());
    let merged = (!exception.has_exception()).then(|| Merged { schemas: merger.set, root });
    Ok(Outcome::new(merged, exception, None))
}

struct Merger {
    set: SchemaSet,
    options: MergeOptions,
    /// Input lists already merged or being merged, keyed by their ids.
    memo: HashMap<Vec<SchemaId>, SchemaId>,
}

/// Node under construction.
#[derive(Default)]
struct Accumulator {
    node: SchemaNode,
    /// `null` is accepted only if every input accepts it.
    nullable: Option<bool>,
}

impl Merger {
    fn merge(&mut self, exception: &mut Exception, ids: Vec<SchemaId>) -> SchemaId {
        if let Some(id) = self.memo.get(&ids) {
            return *id;
        }
        let result = self.set.push(SchemaNode::default());
        self.memo.insert(ids.clone(), result);

        let mut acc = Accumulator::default();
        for id in ids {
            self.absorb(exception, &mut acc, id);
        }
        acc.node.nullable = acc.nullable.unwrap_or(false);
        *self.set.node_mut(result) = acc.node;
        result
    }

    fn absorb(&mut self, exception: &mut Exception, acc: &mut Accumulator, id: SchemaId) {
        let source = self.set.nodes[id.0].clone();
        match &source.composite {
            Some(Composite::AllOf(children)) => {
                let flattened = self.merge(exception.nest("allOf"), children.clone());
                self.absorb(exception, acc, flattened);
                return;
            }
            Some(_) => {
                exception.message("Cannot merge the modifiers anyOf, oneOf, or not");
                return;
            }
            None => {}
        }

        if let Some(kind) = &source.kind {
            if !self.unify(exception, &mut acc.node, kind, source.format.as_deref()) {
                return;
            }
            let node = &mut acc.node;
            match (node.kind.as_mut(), kind) {
                (Some(Kind::Integer(n) | Kind::Number(n)), Kind::Integer(s) | Kind::Number(s)) => numeric(exception, n, s),
                (Some(Kind::String(t)), Kind::String(s)) => text(t, s),
                (Some(Kind::Array(i)), Kind::Array(s)) => self.items(exception, i, s),
                (Some(Kind::Object(p)), Kind::Object(s)) => self.properties(exception, p, s),
                _ => {}
            }
        }

        let node = &mut acc.node;
        if let Some(discriminator) = &source.discriminator {
            if node.discriminator.is_none() || self.options.overwrite_discriminator {
                node.discriminator = Some(discriminator.clone());
            } else {
                exception.message(
                    "Cannot merge objects with competing discriminators (unless option.overwriteDiscriminator is set to true)",
                );
            }
        }
        if let Some(members) = &source.enumeration {
            node.enumeration = Some(match &node.enumeration {
                None => members.clone(),
                Some(existing) => {
                    let mut union = existing.to_vec();
                    for member in members.iter() {
                        if !union.contains(member) {
                            union.push(member.clone());
                        }
                    }
                    Arc::from(union)
                }
            });
        }
        acc.nullable = Some(acc.nullable.unwrap_or(true) && source.nullable);
        if source.default.is_some() {
            node.default = source.default.clone();
        }
        if source.example.is_some() {
            node.example = source.example.clone();
        }
        node.read_only |= source.read_only;
        node.write_only |= source.write_only;
        node.deprecated |= source.deprecated;
        if source.title.is_some() {
            node.title = source.title.clone();
        }
        if source.description.is_some() {
            node.description = source.description.clone();
        }
        node.extensions.extend(source.extensions.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Type and format compatibility. `integer` and `number` unify to
    /// `integer`; any other mismatch drops this input.
    fn unify(&self, exception: &mut Exception, node: &mut SchemaNode, kind: &Kind, format: Option<&str>) -> bool {
        let incoming = kind.ty();
        let replacement = match &node.kind {
            None => Some(Kind::empty(incoming)),
            Some(Kind::Number(n)) if matches!(kind, Kind::Integer(_)) => Some(Kind::Integer(n.clone())),
            Some(Kind::Integer(_)) if matches!(kind, Kind::Number(_)) => None,
            Some(existing) if existing.ty() == incoming => None,
            Some(existing) => {
                exception.message(format!("Incompatible types: {incoming} and {}", existing.ty()));
                return false;
            }
        };
        if replacement.is_some() {
            node.kind = replacement;
        }
        match (node.format.as_deref(), format) {
            (Some(current), Some(incoming)) if current != incoming => {
                exception.message(format!("Incompatible formats: {incoming} and {current}"));
                false
            }
            (None, Some(incoming)) => {
                node.format = Some(incoming.to_string());
                true
            }
            _ => true,
        }
    }

    fn items(&mut self, exception: &mut Exception, target: &mut Items, source: &Items) {
        target.max_items = lowest(target.max_items, source.max_items);
        target.min_items = highest(target.min_items, source.min_items);
        target.unique_items |= source.unique_items;
        target.items = match (target.items, source.items) {
            (Some(current), Some(incoming)) => Some(self.merge(exception.nest("items"), vec![current, incoming])),
            (current, incoming) => current.or(incoming),
        };
    }

    fn properties(&mut self, exception: &mut Exception, target: &mut Properties, source: &Properties) {
        target.max_properties = lowest(target.max_properties, source.max_properties);
        target.min_properties = highest(target.min_properties, source.min_properties);
        for name in &source.required {
            if !target.required.contains(name) {
                target.required.push(name.clone());
            }
        }
        for (key, incoming) in &source.properties {
            let merged = match target.properties.get(key) {
                Some(current) => {
                    let child = exception.nest(format!("Could not merge \"properties\" key: {key}"));
                    self.merge(child, vec![*current, *incoming])
                }
                None => *incoming,
            };
            target.properties.insert(key.clone(), merged);
        }
        target.additional = match (target.additional, source.additional) {
            (Additional::Allowed(false), _) | (_, Additional::Allowed(false)) => Additional::Allowed(false),
            (Additional::Allowed(true), other) | (other, Additional::Allowed(true)) => other,
            (Additional::Schema(current), Additional::Schema(incoming)) => {
                let child = exception.nest("Could not merge additionalProperties");
                Additional::Schema(self.merge(child, vec![current, incoming]))
            }
        };
    }
}

fn numeric(exception: &mut Exception, target: &mut Numeric, source: &Numeric) {
    intersect(&mut target.range, &source.range);
    target.multiple_of = match (target.multiple_of, source.multiple_of) {
        (Some(a), Some(b)) => match least_common_multiple(a, b) {
            Some(lcm) => Some(lcm),
            None => {
                exception.message(format!(
                    "Unable to merge multipleOf values {} and {}: the least common multiple cannot be represented exactly",
                    Value::from_f64(a),
                    Value::from_f64(b)
                ));
                Some(a)
            }
        },
        (a, b) => a.or(b),
    };
}

fn text(target: &mut Text, source: &Text) {
    intersect(&mut target.range, &source.range);
    target.max_length = lowest(target.max_length, source.max_length);
    target.min_length = highest(target.min_length, source.min_length);
    target.pattern = match (&target.pattern, &source.pattern) {
        (Some(a), Some(b)) => Some(a.merge(b)),
        (a, b) => a.clone().or_else(|| b.clone()),
    };
}

/// Keep the larger minimum and the smaller maximum. On a tie the bound is
/// exclusive if either side is.
fn intersect(target: &mut Range, source: &Range) {
    tighten(&mut target.maximum, source.maximum.as_ref(), Ordering::Less);
    tighten(&mut target.minimum, source.minimum.as_ref(), Ordering::Greater);
}

fn tighten(current: &mut Option<Bound>, incoming: Option<&Bound>, wins: Ordering) {
    let Some(incoming) = incoming else { return };
    match current {
        None => *current = Some(incoming.clone()),
        Some(bound) => match incoming.value.compare(&bound.value) {
            Some(Ordering::Equal) => bound.exclusive |= incoming.exclusive,
            Some(ordering) if ordering == wins => *bound = incoming.clone(),
            _ => {}
        },
    }
}

fn lowest(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn highest(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Most fractional digits a `multipleOf` may carry and still be merged.
const MAX_DECIMALS: u32 = 12;

/// Largest integer an `f64` holds exactly.
const EXACT_LIMIT: u128 = 1 << 53;

/// LCM of two positive decimals, computed on integers scaled by the longer
/// fractional part. `None` when a scaled operand or the result cannot be
/// held exactly.
fn least_common_multiple(a: f64, b: f64) -> Option<f64> {
    let decimals = |n: f64| n.to_string().split_once('.').map_or(0, |(_, fraction)| fraction.len() as u32);
    let places = decimals(a).max(decimals(b));
    if places > MAX_DECIMALS {
        return None;
    }
    let scale = 10u128.pow(places);
    let scaled = |n: f64| {
        let n = (n * scale as f64).round();
        (n >= 1.0 && n < EXACT_LIMIT as f64).then_some(n as u128)
    };
    let (x, y) = (scaled(a)?, scaled(b)?);
    let mut gcd = (x, y);
    while gcd.1 != 0 {
        gcd = (gcd.1, gcd.0 % gcd.1);
    }
    let lcm = (x / gcd.0).checked_mul(y)?;
    (lcm < EXACT_LIMIT).then(|| lcm as f64 / scale as f64)
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_document, Compilation, CompileOptions};
    use crate::schema::{Major, Type};
    use serde_json::json;

    fn document(schemas: serde_json::Value) -> Compilation {
        let compiled = compile_document(&json!({"components": {"schemas": schemas}}), CompileOptions::new(Major::V3));
        assert!(compiled.errors.is_none(), "{:?}", compiled.errors);
        compiled
    }

    fn merged(compiled: &Compilation, names: &[&str], options: MergeOptions) -> Outcome<Option<Merged>> {
        let schemas: Vec<Schema<'_>> = names.iter().map(|n| compiled.schemas.named(n).unwrap()).collect();
        merge(&schemas, options).unwrap()
    }

    fn messages(outcome: &Outcome<Option<Merged>>) -> Vec<String> {
        outcome.error.as_ref().map(|e| e.diagnostics().into_iter().map(|d| d.message).collect()).unwrap_or_default()
    }

    #[test]
    fn numeric_bounds_intersect() {
        let compiled = document(json!({
            "A": {"type": "integer", "maximum": 24, "minimum": 0, "multipleOf": 4},
            "B": {"type": "number", "maximum": 12, "minimum": 0, "exclusiveMinimum": true, "multipleOf": 6}
        }));
        let outcome = merged(&compiled, &["A", "B"], MergeOptions::default());
        let merged = outcome.value.unwrap();
        let schema = merged.schema();
        let Some(Kind::Integer(numeric)) = &schema.kind else { panic!("expected an integer") };
        assert_eq!(numeric.range.maximum, Some(Bound { value: Value::from(12), exclusive: false }));
        assert_eq!(numeric.range.minimum, Some(Bound { value: Value::from(0), exclusive: true }));
        assert_eq!(numeric.multiple_of, Some(12.0));
    }

    #[test]
    fn decimal_multiples_combine() {
        assert_eq!(least_common_multiple(0.5, 0.3), Some(1.5));
        assert_eq!(least_common_multiple(4.0, 6.0), Some(12.0));
        assert_eq!(least_common_multiple(1e-20, 3.0), None);
        assert_eq!(least_common_multiple(10_000_000_019.0, 10_000_000_033.0), None);
    }

    #[test]
    fn unrepresentable_multiples_are_merge_errors() {
        let compiled = document(json!({
            "A": {"type": "integer", "multipleOf": 10000000019u64},
            "B": {"type": "integer", "multipleOf": 10000000033u64},
            "Tiny": {"type": "number", "multipleOf": 1e-20}
        }));
        let outcome = merged(&compiled, &["A", "B"], MergeOptions::default());
        assert!(outcome.value.is_none());
        assert_eq!(messages(&outcome), [
            "Unable to merge multipleOf values 10000000019 and 10000000033: the least common multiple cannot be represented exactly"
        ]);

        let outcome = merged(&compiled, &["Tiny", "A"], MergeOptions::default());
        assert!(outcome.value.is_none());
        assert_eq!(messages(&outcome).len(), 1);
    }

    #[test]
    fn incompatible_types_and_formats_fail() {
        let compiled = document(json!({
            "S": {"type": "string"},
            "I": {"type": "integer"},
            "D": {"type": "string", "format": "date"},
            "T": {"type": "string", "format": "date-time"}
        }));
        let outcome = merged(&compiled, &["S", "I"], MergeOptions::default());
        assert!(outcome.value.is_none());
        assert_eq!(messages(&outcome), ["Incompatible types: integer and string"]);

        let outcome = merged(&compiled, &["D", "T"], MergeOptions::default());
        assert_eq!(messages(&outcome), ["Incompatible formats: date-time and date"]);

        assert!(merged(&compiled, &["S", "D"], MergeOptions::default()).is_ok());
    }

    #[test]
    fn objects_merge_properties_required_and_additional() {
        let compiled = document(json!({
            "A": {
                "type": "object",
                "required": ["a"],
                "properties": {"a": {"type": "string", "maxLength": 10}, "shared": {"type": "integer", "maximum": 9}}
            },
            "B": {
                "type": "object",
                "required": ["b", "a"],
                "additionalProperties": false,
                "properties": {"b": {"type": "boolean"}, "shared": {"type": "integer", "maximum": 3}}
            }
        }));
        let outcome = merged(&compiled, &["A", "B"], MergeOptions::default());
        let merged = outcome.value.unwrap();
        let schema = merged.schema();
        let Some(Kind::Object(props)) = &schema.kind else { panic!("expected an object") };
        assert_eq!(props.required, ["a", "b"]);
        assert_eq!(props.properties.keys().collect::<Vec<_>>(), ["a", "shared", "b"]);
        assert_eq!(props.additional, Additional::Allowed(false));
        assert!(schema.validate(&Value::from(json!({"a": "x", "b": true, "shared": 3}))).is_none());
        assert!(schema.validate(&Value::from(json!({"a": "x", "b": true, "shared": 4}))).is_some());
        assert!(schema.validate(&Value::from(json!({"a": "x", "b": true, "z": 1}))).is_some());
    }

    #[test]
    fn all_of_is_flattened_and_other_composites_refused() {
        let compiled = document(json!({
            "Both": {"allOf": [
                {"type": "string", "minLength": 2, "pattern": "^a"},
                {"type": "string", "maxLength": 4, "pattern": "b$"}
            ]},
            "Either": {"oneOf": [{"type": "string"}, {"type": "integer"}]}
        }));
        let outcome = merged(&compiled, &["Both"], MergeOptions::default());
        let flattened = outcome.value.unwrap();
        let schema = flattened.schema();
        assert_eq!(schema.ty(), Some(Type::String));
        assert!(schema.validate(&Value::from("ab")).is_none());
        assert!(schema.validate(&Value::from("abc")).is_some());
        assert!(schema.validate(&Value::from("abbbb")).is_some());

        let outcome = merged(&compiled, &["Both", "Either"], MergeOptions::default());
        assert_eq!(messages(&outcome), ["Cannot merge the modifiers anyOf, oneOf, or not"]);
    }

    #[test]
    fn competing_discriminators_need_the_overwrite_option() {
        let compiled = document(json!({
            "A": {"type": "object", "required": ["a"], "properties": {"a": {"type": "string"}}, "discriminator": {"propertyName": "a"}},
            "B": {"type": "object", "required": ["b"], "properties": {"b": {"type": "string"}}, "discriminator": {"propertyName": "b"}}
        }));
        let outcome = merged(&compiled, &["A", "B"], MergeOptions::default());
        assert_eq!(messages(&outcome), [
            "Cannot merge objects with competing discriminators (unless option.overwriteDiscriminator is set to true)"
        ]);
        let outcome = merged(&compiled, &["A", "B"], MergeOptions { overwrite_discriminator: true });
        let merged = outcome.value.unwrap();
        assert_eq!(merged.schema().discriminator.as_ref().unwrap().property_name, "b");
    }

    #[test]
    fn enums_union_and_the_last_default_wins() {
        let compiled = document(json!({
            "A": {"type": "string", "enum": ["a", "b"], "default": "a"},
            "B": {"type": "string", "enum": ["b", "c"], "default": "c"}
        }));
        let merged = merged(&compiled, &["A", "B"], MergeOptions::default()).value.unwrap();
        let schema = merged.schema();
        let members: Vec<String> = schema.enumeration.as_ref().unwrap().iter().map(|v| v.to_string()).collect();
        assert_eq!(members, ["\"a\"", "\"b\"", "\"c\""]);
        assert_eq!(schema.default, Some(Value::from("c")));
    }

    #[test]
    fn recursive_schemas_merge_to_cycles() {
        let compiled = document(json!({
            "Node": {
                "type": "object",
                "properties": {"next": {"$ref": "#/components/schemas/Node"}}
            },
            "Other": {
                "type": "object",
                "properties": {"next": {"$ref": "#/components/schemas/Other"}, "v": {"type": "integer"}}
            }
        }));
        let merged = merged(&compiled, &["Node", "Other"], MergeOptions::default()).value.unwrap();
        let schema = merged.schema();
        let next = schema.property("next").unwrap();
        assert_eq!(next.property("next").unwrap(), next);
        assert!(schema.validate(&Value::from(json!({"next": {"next": {"v": 1}}}))).is_none());
        assert!(schema.validate(&Value::from(json!({"next": {"v": "x"}}))).is_some());
    }

    #[test]
    fn inputs_must_be_clean_and_share_a_set() {
        let broken = compile_document(
            &json!({"components": {"schemas": {"Bad": {"type": "string", "maxItems": 1}}}}),
            CompileOptions::new(Major::V3),
        );
        let bad = broken.schemas.named("Bad").unwrap();
        let outcome = merge(&[bad], MergeOptions::default()).unwrap();
        assert!(outcome.value.is_none());
        assert!(outcome.error.unwrap().to_string().contains("One or more errors with schema at index 0"));

        let clean = document(json!({"A": {"type": "string"}}));
        let a = clean.schemas.named("A").unwrap();
        assert_eq!(merge(&[a, bad], MergeOptions::default()).unwrap_err(), Error::ForeignSchema);
        assert_eq!(merge(&[], MergeOptions::default()).unwrap_err(), Error::EmptyMerge);
    }
}
