//! Purpose: Per-entity-type field renaming applied while records are materialized.
//! Exports: `FieldMap`, `FieldRule`, `FieldTransform`.
//! Role: Immutable table built once by the application and shared by materializers.
//! Invariants: Rules are keyed by the raw service field name.
//! Invariants: Fields without a rule keep their raw name and value.
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type FieldTransform = dyn Fn(Value) -> (String, Value) + Send + Sync;

#[derive(Clone)]
pub enum FieldRule {
    Rename(String),
    /// Produces the destination name and value from the raw value.
    Transform(Arc<FieldTransform>),
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRule::Rename(name) => f.debug_tuple("Rename").field(name).finish(),
            FieldRule::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldMap {
    rules: BTreeMap<String, FieldRule>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, raw: impl Into<String>, name: impl Into<String>) -> Self {
        self.rules.insert(raw.into(), FieldRule::Rename(name.into()));
        self
    }

    pub fn transform<F>(mut self, raw: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Value) -> (String, Value) + Send + Sync + 'static,
    {
        self.rules
            .insert(raw.into(), FieldRule::Transform(Arc::new(transform)));
        self
    }

    pub fn rule(&self, raw: &str) -> Option<&FieldRule> {
        self.rules.get(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, raw: &str, value: Value) -> (String, Value) {
        match self.rules.get(raw) {
            Some(FieldRule::Rename(name)) => (name.clone(), value),
            Some(FieldRule::Transform(transform)) => transform(value),
            None => (raw.to_string(), value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FieldMap;
    use serde_json::json;

    #[test]
    fn unmapped_fields_pass_through() {
        let map = FieldMap::new().rename("Item_Number", "sku");
        assert_eq!(map.apply("Item_Desc", json!("Bolt")), ("Item_Desc".to_string(), json!("Bolt")));
        assert_eq!(map.apply("Item_Number", json!("B-1")), ("sku".to_string(), json!("B-1")));
    }

    #[test]
    fn transform_chooses_name_and_value() {
        let map = FieldMap::new().transform("Qty_Available", |value| {
            let qty = value.as_f64().unwrap_or_default();
            ("in_stock".to_string(), json!(qty > 0.0))
        });
        assert_eq!(
            map.apply("Qty_Available", json!(3.0)),
            ("in_stock".to_string(), json!(true))
        );
    }
}
