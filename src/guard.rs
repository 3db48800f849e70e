//! Per-call cycle guard shared by the recursive walkers.
//!
//! A `(value identity, schema)` pair is *active* while the walker is inside
//! it. Re-entering an active pair can only happen through a cycle in the
//! schema graph (or value graph), so the walker treats it as a no-op.
use std::collections::HashSet;

use crate::schema::SchemaId;
use crate::value::{Identity, Value};

#[derive(Debug, Default)]
pub(crate) struct Guard {
    active: HashSet<(Identity, SchemaId)>,
}

impl Guard {
    /// Returns false when the pair is already active.
    pub fn enter(&mut self, value: &Value, schema: SchemaId) -> bool {
        let entered = self.active.insert((value.identity(), schema));
        if !entered {
            tracing::trace!(schema = schema.0, "cycle detected, skipping re-entry");
        }
        entered
    }

    pub fn leave(&mut self, value: &Value, schema: SchemaId) {
        self.active.remove(&(value.identity(), schema));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reentry_is_refused_until_left() {
        let mut guard = Guard::default();
        let v = Value::from(json!({"a": 1}));
        assert!(guard.enter(&v, SchemaId(0)));
        assert!(!guard.enter(&v.clone(), SchemaId(0)));
        assert!(guard.enter(&v, SchemaId(1)));
        guard.leave(&v, SchemaId(0));
        assert!(guard.enter(&v, SchemaId(0)));
    }
}
