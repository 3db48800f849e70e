//! Template-driven value population.
//!
//! Walks a schema and fills in whatever the value is missing: `x-variable`
//! copies a parameter, `x-template` injects parameters into a string, and
//! `default` is used otherwise. `x-condition` names a parameter that must be
//! truthy for the node to be populated at all. Values the caller already
//! supplied are kept and only descended into.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exception::Exception;
use crate::guard::Guard;
use crate::outcome::Outcome;
use crate::schema::{Composite, Kind, Schema, Type};
use crate::value::{Map, Value};

static COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i):([_$a-z][_$a-z0-9]*)").expect("Invalid regex"));
static DOUBLE_HANDLEBAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{\{([_$a-z][_$a-z0-9]*)\}\}").expect("Invalid regex"));
static HANDLEBAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\{([_$a-z][_$a-z0-9]*)\}").expect("Invalid regex"));

// ————————————————————————————————————————————————————————————————————————————
// OPTIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PopulateOptions {
    /// Honor `x-condition`.
    pub conditions: bool,
    /// Use `default` values.
    pub defaults: bool,
    /// Maximum number of schema levels to descend.
    pub depth: usize,
    pub replacement: Replacement,
    /// Inject parameters into string defaults.
    pub template_defaults: bool,
    /// Honor `x-template`.
    pub templates: bool,
    /// Honor `x-variable`.
    pub variables: bool,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            conditions: true,
            defaults: true,
            depth: 100,
            replacement: Replacement::default(),
            template_defaults: true,
            templates: true,
            variables: true,
        }
    }
}

/// Placeholder syntax used by templates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Replacement {
    /// `:name`
    Colon,
    /// `{{name}}`
    DoubleHandlebar,
    /// `{name}`
    #[default]
    Handlebar,
}

impl Replacement {
    fn regex(self) -> &'static Regex {
        match self {
            Replacement::Colon => &COLON,
            Replacement::DoubleHandlebar => &DOUBLE_HANDLEBAR,
            Replacement::Handlebar => &HANDLEBAR,
        }
    }

    /// Replace every placeholder naming a known parameter. Placeholders for
    /// unknown parameters are left as written.
    pub fn inject(self, template: &str, params: &Map) -> String {
        self.regex()
            .replace_all(template, |caps: &Captures<'_>| match params.get(&caps[1]) {
                Some(value) => match value.inner() {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Parameters from a JSON document; anything but an object (or `null`) is
/// rejected.
pub fn params_from_json(json: &serde_json::Value) -> Result<Map> {
    match json {
        serde_json::Value::Null => Ok(Map::new()),
        serde_json::Value::Object(_) => match Value::from_json(json) {
            Value::Object(map) => Ok(map.as_ref().clone()),
            _ => Err(Error::InvalidParams),
        },
        _ => Err(Error::InvalidParams),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RUN
// ————————————————————————————————————————————————————————————————————————————

pub(crate) fn run(schema: Schema<'_>, params: &Map, value: Option<Value>, options: &PopulateOptions) -> Outcome<Option<Value>> {
    let mut error = Exception::new("Unable to populate value");
    let mut warning = Exception::new("One or more warnings found while populating value");
    let mut populator = Populator { params, options, guard: Guard::default() };
    let value = populator.populate(&mut error, &mut warning, schema, value, options.depth);
    if let Some(invalid) = value.as_ref().and_then(|v| schema.validate(v)) {
        error.push(invalid);
    }
    Outcome::new(value, error, Some(warning))
}

struct Populator<'p> {
    params: &'p Map,
    options: &'p PopulateOptions,
    guard: Guard,
}

impl Populator<'_> {
    fn populate(
        &mut self,
        error: &mut Exception,
        warning: &mut Exception,
        schema: Schema<'_>,
        value: Option<Value>,
        depth: usize,
    ) -> Option<Value> {
        let Some(value) = value else {
            return self.fill(error, warning, schema, None, depth);
        };
        let (attributes, inner) = value.attributes();
        if !attributes.populate {
            return Some(value);
        }
        let inner = inner.clone();
        match self.fill(error, warning, schema, Some(inner.clone()), depth) {
            Some(populated) if populated.is_same_node(&inner) => Some(value),
            Some(populated) if matches!(value, Value::Attributed(_)) => Some(Value::with_attributes(populated, attributes)),
            populated => populated,
        }
    }

    fn fill(
        &mut self,
        error: &mut Exception,
        warning: &mut Exception,
        schema: Schema<'_>,
        value: Option<Value>,
        depth: usize,
    ) -> Option<Value> {
        if depth == 0 {
            warning.message(format!("Reached the maximum populate depth of {}", self.options.depth));
            return value;
        }
        if self.options.conditions {
            if let Some(name) = schema.extensions.get("x-condition").and_then(serde_json::Value::as_str) {
                if !self.params.get(name).is_some_and(Value::is_truthy) {
                    return value;
                }
            }
        }

        let Some(value) = value.or_else(|| self.initial(error, schema)) else {
            return self.walk(error, warning, schema, None, depth);
        };
        if !self.guard.enter(&value, schema.id()) {
            return Some(value);
        }
        let populated = self.walk(error, warning, schema, Some(value.clone()), depth);
        self.guard.leave(&value, schema.id());
        populated
    }

    /// Value for a node the caller left empty.
    fn initial(&self, error: &mut Exception, schema: Schema<'_>) -> Option<Value> {
        let extension = |name: &str| schema.extensions.get(name).and_then(serde_json::Value::as_str);
        if self.options.variables {
            if let Some(found) = extension("x-variable").and_then(|name| self.params.get(name)) {
                return Some(found.clone());
            }
        }
        if self.options.templates && schema.ty() == Some(Type::String) {
            if let Some(template) = extension("x-template") {
                return Some(self.wire(error, schema, template));
            }
        }
        if !self.options.defaults {
            return None;
        }
        let default = schema.default.as_ref()?;
        match default.inner() {
            Value::String(template) if self.options.template_defaults => Some(self.wire(error, schema, template)),
            _ => Some(default.clone()),
        }
    }

    /// Inject parameters into `template` and deserialize the result, so a
    /// `date` template yields a date.
    fn wire(&self, error: &mut Exception, schema: Schema<'_>, template: &str) -> Value {
        let injected = Value::String(self.options.replacement.inject(template, self.params));
        let outcome = schema.deserialize(&injected);
        if let Some(problem) = outcome.error {
            error.push(problem);
        }
        outcome.value
    }

    fn walk(
        &mut self,
        error: &mut Exception,
        warning: &mut Exception,
        schema: Schema<'_>,
        value: Option<Value>,
        depth: usize,
    ) -> Option<Value> {
        match &schema.node().composite {
            Some(Composite::AllOf(ids)) => ids.iter().fold(value, |current, id| {
                self.populate(error, warning, schema.child(*id), current, depth - 1)
            }),
            Some(Composite::AnyOf(_) | Composite::OneOf(_)) => self.dispatch(error, warning, schema, value, depth),
            Some(Composite::Not(_)) => value,
            None => match &schema.node().kind {
                Some(Kind::Object(props)) => {
                    let populated = self.object(error, warning, schema, &props.properties, value, depth);
                    self.dispatch(error, warning, schema, populated, depth)
                }
                Some(Kind::Array(items)) => match (items.items, value) {
                    (Some(id), Some(value)) => Some(self.array(error, warning, schema.child(id), value, depth)),
                    (_, value) => value,
                },
                _ => value,
            },
        }
    }

    /// Continue into the schema the discriminator selects, if any.
    fn dispatch(
        &mut self,
        error: &mut Exception,
        warning: &mut Exception,
        schema: Schema<'_>,
        value: Option<Value>,
        depth: usize,
    ) -> Option<Value> {
        let target = value.as_ref().and_then(|v| schema.discriminate(v)).map(|(_, target)| target);
        match target {
            Some(target) => self.populate(error, warning, target, value, depth - 1),
            None => value,
        }
    }

    fn object(
        &mut self,
        error: &mut Exception,
        warning: &mut Exception,
        schema: Schema<'_>,
        properties: &indexmap::IndexMap<String, crate::schema::SchemaId>,
        value: Option<Value>,
        depth: usize,
    ) -> Option<Value> {
        let mut map = match value.as_ref().map(Value::as_object) {
            Some(None) => return value,
            Some(Some(map)) => map.clone(),
            None => Map::new(),
        };
        let mut changed = false;
        for (key, id) in properties {
            let current = map.get(key).cloned();
            let populated = self.populate(error.at(key), warning.at(key), schema.child(*id), current.clone(), depth - 1);
            match (current, populated) {
                (Some(before), Some(after)) if before.is_same_node(&after) => {}
                (_, Some(after)) => {
                    map.insert(key.clone(), after);
                    changed = true;
                }
                (_, None) => {}
            }
        }
        match value {
            Some(original) if !changed => Some(original),
            None if map.is_empty() => None,
            _ => Some(Value::object(map)),
        }
    }

    fn array(&mut self, error: &mut Exception, warning: &mut Exception, items: Schema<'_>, value: Value, depth: usize) -> Value {
        let Some(elements) = value.as_array() else {
            return value;
        };
        let mut changed = false;
        let populated: Vec<Value> = elements
            .iter()
            .enumerate()
            .map(|(index, element)| {
                let after = self
                    .populate(error.at(index), warning.at(index), items, Some(element.clone()), depth - 1)
                    .unwrap_or_else(|| element.clone());
                changed |= !after.is_same_node(element);
                after
            })
            .collect();
        if changed { Value::array(populated) } else { value }
    }
}

// ------------------------------- Tests ------------------------------------ //
