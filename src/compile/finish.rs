//! Second compile pass, run once every definition has a node.
use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{join, resolver, Compilation, Compiler};
use crate::exception::Exception;
use crate::guard::Guard;
use crate::schema::{Bound, Composite, Kind, Range, Schema, SchemaId};
use crate::validate::{self, Options};
use crate::value::Value;

impl Compiler<'_> {
    pub fn finish(mut self) -> Compilation {
        if self.resolve_references {
            self.resolve_mappings();
        }
        self.bounds();
        self.constants();
        self.data_type_hooks();
        self.record_node_errors();

        let errors = self.errors.has_exception().then_some(self.errors);
        let warnings = self.warnings.has_exception().then_some(self.warnings);
        tracing::debug!(nodes = self.set.len(), named = self.set.named.len(), "compiled schema set");
        if let Some(errors) = &errors {
            tracing::warn!(count = errors.count(), "schema definition compiled with errors");
        }
        Compilation { schemas: self.set, errors, warnings }
    }

    /// Point discriminator mappings at their compiled targets. Resolving a
    /// mapping can compile new nodes carrying their own discriminators, so
    /// the scan runs until it reaches the end of the growing arena.
    fn resolve_mappings(&mut self) {
        let mut next = 0;
        while next < self.set.len() {
            let id = SchemaId(next);
            next += 1;
            let pending: Vec<(String, String)> = match &self.set.nodes[id.0].discriminator {
                Some(d) => d
                    .mapping
                    .iter()
                    .filter(|(_, m)| m.target.is_none())
                    .map(|(key, m)| (key.clone(), m.reference.clone()))
                    .collect(),
                None => continue,
            };
            let path = self.paths[id.0].clone();
            for (key, written) in pending {
                let here = join(&join(&join(&path, "discriminator"), "mapping"), &key);
                let reference = resolver::mapping_reference(&written, self.set.major);
                let Some(target) = self.compile_reference(&reference) else {
                    self.error(&here).message(format!("Reference cannot be resolved: {written}"));
                    continue;
                };
                let outside = match &self.set.nodes[id.0].composite {
                    Some(Composite::AnyOf(ids)) if !ids.contains(&target) => Some("anyOf"),
                    Some(Composite::OneOf(ids)) if !ids.contains(&target) => Some("oneOf"),
                    _ => None,
                };
                if let Some(keyword) = outside {
                    self.error(&here).message(format!("Mapping reference must exist in {keyword}: {written}"));
                }
                if let Some(mapping) = self
                    .set
                    .node_mut(id)
                    .discriminator
                    .as_mut()
                    .and_then(|d| d.mapping.get_mut(&key))
                {
                    mapping.target = Some(target);
                }
            }
        }
    }

    /// Deserialize `minimum`/`maximum` into native values and check that
    /// they describe a non-empty interval.
    fn bounds(&mut self) {
        for index in 0..self.set.len() {
            let id = SchemaId(index);
            let range = match self.set.nodes[index].kind.as_ref().and_then(Kind::range) {
                Some(range) if range.minimum.is_some() || range.maximum.is_some() => range.clone(),
                _ => continue,
            };
            let schema = self.set.schema(id);
            let options = Options { enumeration: false, bounds: false };
            let mut problems = Vec::new();
            let mut native = |name: &'static str, bound: Option<Bound>| {
                let bound = bound?;
                let (value, problem) = convert(schema, &bound.value, options);
                if let Some(problem) = problem {
                    problems.push((name, problem));
                }
                Some(Bound { value, exclusive: bound.exclusive })
            };
            let converted = Range {
                minimum: native("minimum", range.minimum),
                maximum: native("maximum", range.maximum),
            };

            let path = self.paths[index].clone();
            for (name, problem) in problems {
                self.error(&join(&path, name)).push(problem);
            }
            if let (Some(min), Some(max)) = (&converted.minimum, &converted.maximum) {
                let exclusive = min.exclusive || max.exclusive;
                match min.value.compare(&max.value) {
                    Some(Ordering::Greater) if !exclusive => self
                        .error(&path)
                        .message("Property \"minimum\" must be less than or equal to \"maximum\""),
                    Some(Ordering::Greater | Ordering::Equal) if exclusive => {
                        self.error(&path).message("Property \"minimum\" must be less than \"maximum\"")
                    }
                    _ => {}
                }
            }
            if let Some(range) = self.set.node_mut(id).kind.as_mut().and_then(Kind::range_mut) {
                *range = converted;
            }
        }
    }

    /// Deserialize and check `enum`, then `default` and `example`. Enum
    /// entries are stored first so the other two are checked against them.
    fn constants(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);

        for item in &deferred {
            let Some(entries) = &item.enumeration else { continue };
            let schema = self.set.schema(item.id);
            let options = Options { enumeration: false, bounds: true };
            let converted: Vec<(Value, Option<Exception>)> = entries
                .iter()
                .map(|raw| convert(schema, &Value::from_json(raw), options))
                .collect();
            let path = join(&self.paths[item.id.0], "enum");
            let mut members = Vec::with_capacity(converted.len());
            for (index, (value, problem)) in converted.into_iter().enumerate() {
                if let Some(problem) = problem {
                    self.error(&join(&path, index)).push(problem);
                }
                members.push(value);
            }
            self.set.node_mut(item.id).enumeration = Some(Arc::from(members));
        }

        for item in &deferred {
            let path = self.paths[item.id.0].clone();
            let default = item.default.as_ref().map(|raw| self.constant(item.id, raw));
            if let Some((value, problem)) = default {
                if let Some(problem) = problem {
                    self.error(&join(&path, "default")).push(problem);
                }
                self.set.node_mut(item.id).default = Some(value);
            }
            let example = item.example.as_ref().map(|raw| self.constant(item.id, raw));
            if let Some((value, problem)) = example {
                if let Some(problem) = problem {
                    self.warning(&join(&path, "example")).push(problem);
                }
                self.set.node_mut(item.id).example = Some(value);
            }
        }
    }

    fn constant(&self, id: SchemaId, raw: &JsonValue) -> (Value, Option<Exception>) {
        convert(self.set.schema(id), &Value::from_json(raw), Options::default())
    }

    fn data_type_hooks(&mut self) {
        for index in 0..self.set.len() {
            let schema = self.set.schema(SchemaId(index));
            let Some(data_type) = schema.data_type() else { continue };
            let mut exception = Exception::default();
            data_type.compile(schema, &mut exception);
            if exception.has_exception() {
                let path = self.paths[index].clone();
                self.error(&path).push(exception);
            }
        }
    }

    /// Each node keeps the diagnostics found under its own definition path.
    fn record_node_errors(&mut self) {
        for (index, path) in self.paths.iter().enumerate() {
            let errors = self.errors.get_at(path).filter(|e| e.has_exception()).cloned();
            self.set.nodes[index].errors = errors;
        }
    }
}

/// Deserialize a wire constant through `schema` and validate the result.
fn convert(schema: Schema<'_>, raw: &Value, options: Options) -> (Value, Option<Exception>) {
    let outcome = schema.deserialize(raw);
    if let Some(error) = outcome.error {
        return (outcome.value, Some(error));
    }
    let mut exception = Exception::new("Invalid value");
    validate::run(&mut exception, &mut Guard::default(), schema, &outcome.value, options);
    let problem = exception.has_exception().then_some(exception);
    (outcome.value, problem)
}
