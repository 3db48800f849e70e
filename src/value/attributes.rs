//! Out-of-band metadata attached to a value without changing its shape.
//!
//! A walker checks the attribute for its own phase before touching a value:
//! a value marked `validate: false` is accepted as-is by the validator, one
//! marked `deserialize: false` passes through deserialization untouched, etc.
use std::sync::Arc;

use super::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub serialize: bool,
    pub deserialize: bool,
    pub validate: bool,
    pub populate: bool,
}

impl Default for Attributes {
    fn default() -> Self {
        Self { serialize: true, deserialize: true, validate: true, populate: true }
    }
}

impl Attributes {
    /// Everything enabled except validation; for values the caller already
    /// produced through a schema.
    pub fn validated() -> Self {
        Self { validate: false, ..Self::default() }
    }

    /// Each flag stays enabled only if both sides enable it.
    fn and(self, other: Self) -> Self {
        Self {
            serialize: self.serialize && other.serialize,
            deserialize: self.deserialize && other.deserialize,
            validate: self.validate && other.validate,
            populate: self.populate && other.populate,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Attributed {
    pub value: Value,
    pub attributes: Attributes,
}

impl Value {
    /// Wrap a value with attributes. Wrapping an already wrapped value
    /// replaces the outer attributes rather than stacking another layer.
    pub fn with_attributes(value: Value, attributes: Attributes) -> Value {
        let value = match value {
            Value::Attributed(a) => a.value.clone(),
            other => other,
        };
        Value::Attributed(Arc::new(Attributed { value, attributes }))
    }

    /// Attributes in effect for this value plus the unwrapped value itself.
    pub fn attributes(&self) -> (Attributes, &Value) {
        match self {
            Value::Attributed(a) => {
                let (inner, value) = a.value.attributes();
                (a.attributes.and(inner), value)
            }
            other => (Attributes::default(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_have_everything_enabled() {
        let v = Value::from(3);
        let (attrs, inner) = v.attributes();
        assert_eq!(attrs, Attributes::default());
        assert_eq!(inner, &v);
    }

    #[test]
    fn wrapping_does_not_change_equality_or_stack() {
        let v = Value::with_attributes(Value::from("x"), Attributes::validated());
        let v = Value::with_attributes(v, Attributes { populate: false, ..Attributes::default() });
        let (attrs, inner) = v.attributes();
        assert!(attrs.validate);
        assert!(!attrs.populate);
        assert_eq!(inner.as_str(), Some("x"));
        assert_eq!(v, Value::from("x"));
    }
}
