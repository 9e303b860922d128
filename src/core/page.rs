//! Purpose: Wire-level page vocabulary shared by sequences, loaders and entities.
//! Exports: `Row`, `Params`, the `$top`/`$skip`/`$filter` names, page helpers.
//! Role: Keeps the `{"Items": [...]}` envelope and offset parameters in one place.
//! Invariants: List bodies are `{"Items": [object, ...]}`; anything else is a protocol error.
//! Invariants: Parameter maps are ordered so requests are reproducible.
use crate::core::error::{ApiResult, Error, ErrorKind};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One raw row as returned inside `Items`.
pub type Row = Map<String, Value>;

/// Query-string parameters for one request.
pub type Params = BTreeMap<String, String>;

pub const TOP: &str = "$top";
pub const SKIP: &str = "$skip";
pub const FILTER: &str = "$filter";

const ITEMS: &str = "Items";

pub fn search_params(page_size: usize, filter: &str) -> Params {
    let mut params = Params::new();
    params.insert(TOP.to_string(), page_size.to_string());
    if !filter.is_empty() {
        params.insert(FILTER.to_string(), filter.to_string());
    }
    params
}

pub fn with_skip(base: &Params, skip: usize) -> Params {
    let mut params = base.clone();
    params.insert(SKIP.to_string(), skip.to_string());
    params
}

/// Builds `<field> eq '<value>'`, doubling embedded single quotes.
pub fn eq_filter(field: &str, value: &str) -> String {
    format!("{field} eq '{}'", value.replace('\'', "''"))
}

pub fn take_items(body: Value, endpoint: &str) -> ApiResult<Vec<Row>> {
    let Value::Object(mut envelope) = body else {
        return Err(unexpected_shape(endpoint, "response body is not a json object"));
    };
    let Some(items) = envelope.remove(ITEMS) else {
        return Err(unexpected_shape(endpoint, "response body has no Items list"));
    };
    let Value::Array(items) = items else {
        return Err(unexpected_shape(endpoint, "Items is not a list"));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(row) => Ok(row),
            _ => Err(unexpected_shape(endpoint, "Items entry is not an object").with_index(index)),
        })
        .collect()
}

fn unexpected_shape(endpoint: &str, message: &str) -> Error {
    Error::new(ErrorKind::Protocol)
        .with_message(message)
        .with_endpoint(endpoint)
}

#[cfg(test)]
mod tests {
    use super::{FILTER, SKIP, TOP, eq_filter, search_params, take_items, with_skip};
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn search_params_omit_empty_filter() {
        let params = search_params(100, "");
        assert_eq!(params.get(TOP).map(String::as_str), Some("100"));
        assert!(!params.contains_key(FILTER));

        let params = search_params(25, "Item_Class eq 'HW'");
        assert_eq!(params.get(FILTER).map(String::as_str), Some("Item_Class eq 'HW'"));
    }

    #[test]
    fn with_skip_leaves_base_untouched() {
        let base = search_params(10, "");
        let next = with_skip(&base, 30);
        assert_eq!(next.get(SKIP).map(String::as_str), Some("30"));
        assert!(!base.contains_key(SKIP));
    }

    #[test]
    fn eq_filter_doubles_quotes() {
        assert_eq!(eq_filter("Customer_Num", "O'HARA"), "Customer_Num eq 'O''HARA'");
    }

    #[test]
    fn take_items_returns_rows_in_order() {
        let rows = take_items(json!({"Items": [{"a": 1}, {"a": 2}]}), "/api/Customer")
            .expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("a"), Some(&json!(2)));
    }

    #[test]
    fn take_items_rejects_missing_envelope() {
        let err = take_items(json!({"Messages": []}), "/api/Customer").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.endpoint(), Some("/api/Customer"));
    }

    #[test]
    fn take_items_rejects_scalar_rows() {
        let err = take_items(json!({"Items": [{"a": 1}, 7]}), "/api/Item").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.index(), Some(1));
    }
}
