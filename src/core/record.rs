//! Purpose: Common record container for every entity type the service returns.
//! Exports: `EntityType`, `Record`.
//! Role: Target of the entity materializer; holds trimmed, mapped field values.
//! Invariants: Records are built only through a materializer (crate-private constructor).
//! Invariants: Every raw key remembers its mapped name and JSON type for `unmapped`.
use crate::core::fields::FieldMap;
use crate::core::page::Row;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const USER_FIELD_NAMES: &str = "UserFieldNames";
const USER_FIELD_DATA: &str = "UserFieldData";

/// Endpoint path, identifier field and display name of one entity type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EntityType {
    endpoint: &'static str,
    id_key: &'static str,
    short_name: &'static str,
}

impl EntityType {
    pub const fn new(
        endpoint: &'static str,
        id_key: &'static str,
        short_name: &'static str,
    ) -> Self {
        Self {
            endpoint,
            id_key,
            short_name,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    pub fn id_key(&self) -> &'static str {
        self.id_key
    }

    pub fn short_name(&self) -> &'static str {
        self.short_name
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ApiType {
    Null,
    Bool,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl ApiType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => ApiType::Null,
            Value::Bool(_) => ApiType::Bool,
            Value::Number(number) if number.is_f64() => ApiType::Float,
            Value::Number(_) => ApiType::Integer,
            Value::String(_) => ApiType::String,
            Value::Array(_) => ApiType::Array,
            Value::Object(_) => ApiType::Object,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct FieldOrigin {
    property: String,
    api_type: ApiType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    short_name: &'static str,
    id: Option<String>,
    fields: Map<String, Value>,
    origins: BTreeMap<String, FieldOrigin>,
}

impl Record {
    pub(crate) fn from_row(kind: &EntityType, field_map: &FieldMap, row: Row) -> Self {
        let mut record = Self {
            short_name: kind.short_name,
            id: None,
            fields: Map::new(),
            origins: BTreeMap::new(),
        };
        for (key, value) in merge_user_fields(row) {
            let value = trim_strings(value);
            if key == kind.id_key {
                record.id = Some(render(&value));
            }
            record.set_mapped(field_map, key, value);
        }
        record
    }

    fn set_mapped(&mut self, field_map: &FieldMap, raw_key: String, value: Value) {
        let api_type = ApiType::of(&value);
        let (property, value) = field_map.apply(&raw_key, value);
        self.origins
            .entry(raw_key)
            .or_insert_with(|| FieldOrigin {
                property: property.clone(),
                api_type,
            });
        self.fields.insert(property, value);
    }

    pub fn short_name(&self) -> &'static str {
        self.short_name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.fields.get(property)
    }

    pub fn get_str(&self, property: &str) -> Option<&str> {
        self.fields.get(property).and_then(Value::as_str)
    }

    /// Stores `value` under `property` verbatim; field maps are not consulted.
    pub fn set(&mut self, property: impl Into<String>, value: Value) {
        self.fields.insert(property.into(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Returns the value received under the raw service name `raw_key`,
    /// converted back to the JSON type the service used for it.
    ///
    /// Lets code that talks to the service keep working after the
    /// application renamed or transformed the field.
    pub fn unmapped(&self, raw_key: &str) -> Option<Value> {
        let origin = self.origins.get(raw_key)?;
        let value = self.fields.get(&origin.property)?;
        if value.is_null() {
            return None;
        }
        Some(coerce(value, origin.api_type))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.short_name, self.id.as_deref().unwrap_or(""))?;
        let width = self.fields.keys().map(String::len).max().unwrap_or(0);
        for (key, value) in &self.fields {
            write!(f, "\n{key:>width$}: {}", render(value))?;
        }
        Ok(())
    }
}

fn merge_user_fields(mut row: Row) -> Row {
    let names = match row.get(USER_FIELD_NAMES) {
        Some(Value::Array(names)) => names.clone(),
        _ => return row,
    };
    let Some(Value::Array(data)) = row.remove(USER_FIELD_DATA) else {
        return row;
    };
    row.remove(USER_FIELD_NAMES);
    for (name, value) in names.iter().zip(data) {
        row.insert(render(name), value);
    }
    row
}

fn trim_strings(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.trim().to_string()),
        Value::Array(values) => Value::Array(values.into_iter().map(trim_strings).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, trim_strings(value)))
                .collect(),
        ),
        other => other,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn coerce(value: &Value, api_type: ApiType) -> Value {
    match (api_type, value) {
        (ApiType::Integer, Value::Number(number)) => number
            .as_i64()
            .map(Value::from)
            .or_else(|| number.as_f64().map(|float| Value::from(float.trunc() as i64)))
            .unwrap_or_else(|| value.clone()),
        (ApiType::Integer, Value::String(text)) => {
            let text = text.trim();
            text.parse::<i64>()
                .map(Value::from)
                .or_else(|_| text.parse::<f64>().map(|float| Value::from(float.trunc() as i64)))
                .unwrap_or_else(|_| value.clone())
        }
        (ApiType::Integer, Value::Bool(flag)) => Value::from(i64::from(*flag)),
        (ApiType::Float, Value::Number(number)) => {
            number.as_f64().map(Value::from).unwrap_or_else(|| value.clone())
        }
        (ApiType::Float, Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        (ApiType::Bool, Value::String(text)) => {
            let text = text.trim();
            Value::Bool(!text.is_empty() && !text.eq_ignore_ascii_case("false"))
        }
        (ApiType::Bool, Value::Number(number)) => {
            Value::Bool(number.as_f64().is_some_and(|float| float != 0.0))
        }
        (ApiType::String, Value::String(_)) => value.clone(),
        (ApiType::String, other) => Value::String(render(other)),
        _ => value.clone(),
    }
}
