//! Purpose: Reassemble entities that the service flattens into one row per sub-record.
//! Exports: `Squash`, `RowGroup`.
//! Role: Page post-processor for callback-mode sequences (inventory by location).
//! Invariants: Groups keep first-seen order; member rows keep page order.
//! Invariants: On a full page the last group is deferred and its rows are not counted.
//! Invariants: The cursor advances by rows consumed, never by groups.
//! Notes: Each call stands alone. A deferred group comes back whole on the next
//! page because the next `$skip` starts at its first row; nothing is merged across calls.
use crate::core::cursor::{CursorId, CursorRegistry};
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::page::Row;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct RowGroup {
    join_key: String,
    member_rows: Vec<Row>,
    positions: Vec<usize>,
}

impl RowGroup {
    pub fn join_key(&self) -> &str {
        &self.join_key
    }

    pub fn member_rows(&self) -> &[Row] {
        &self.member_rows
    }

    pub fn len(&self) -> usize {
        self.member_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_rows.is_empty()
    }

    /// Fields whose value is identical in every member row, in the first row's order.
    pub fn shared_fields(&self, join_field: &str) -> Row {
        let Some((first, rest)) = self.member_rows.split_first() else {
            return Row::new();
        };
        first
            .iter()
            .filter(|(key, value)| {
                key.as_str() == join_field
                    || rest.iter().all(|row| row.get(key.as_str()) == Some(*value))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// One entry per member row holding the fields that are not shared.
    pub fn varying_fields(&self, shared: &Row) -> Vec<Row> {
        self.member_rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|(key, _)| !shared.contains_key(key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }

    fn into_record(self, join_field: &str, group_field: &str) -> Row {
        let mut record = self.shared_fields(join_field);
        let varying = self
            .varying_fields(&record)
            .into_iter()
            .map(Value::Object)
            .collect();
        record.insert(group_field.to_string(), Value::Array(varying));
        record
    }

    fn is_trailing_run(&self, page_len: usize) -> bool {
        let start = page_len - self.positions.len();
        self.positions.iter().all(|position| *position >= start)
    }
}

#[derive(Clone, Debug)]
pub struct Squash {
    join_field: String,
    group_field: String,
}

impl Squash {
    pub fn new(join_field: impl Into<String>, group_field: impl Into<String>) -> Self {
        Self {
            join_field: join_field.into(),
            group_field: group_field.into(),
        }
    }

    pub fn join_field(&self) -> &str {
        &self.join_field
    }

    pub fn group_field(&self) -> &str {
        &self.group_field
    }

    /// Groups `rows` by the join field in first-seen order.
    pub fn group(&self, rows: Vec<Row>) -> ApiResult<Vec<RowGroup>> {
        let mut groups: Vec<RowGroup> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        for (position, row) in rows.into_iter().enumerate() {
            let key = match row.get(&self.join_field) {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => {
                    return Err(Error::new(ErrorKind::Protocol)
                        .with_message(format!("row has no {} field", self.join_field))
                        .with_index(position));
                }
                Some(other) => other.to_string(),
            };
            let slot = *by_key.entry(key.clone()).or_insert_with(|| {
                groups.push(RowGroup {
                    join_key: key,
                    member_rows: Vec::new(),
                    positions: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].member_rows.push(row);
            groups[slot].positions.push(position);
        }
        Ok(groups)
    }

    /// Squashes one page and advances `cursor` by the rows consumed.
    ///
    /// A page of `page_size` rows or more may end in the middle of an entity,
    /// so its last group is held back and will be re-read from the next page.
    /// A shorter page is final and every group is emitted.
    pub fn squash(
        &self,
        registry: &CursorRegistry,
        cursor: &CursorId,
        rows: Vec<Row>,
        page_size: usize,
    ) -> ApiResult<Vec<Row>> {
        if page_size == 0 {
            return Err(
                Error::new(ErrorKind::Configuration).with_message("squash page size must be positive")
            );
        }
        if !registry.contains(cursor) {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("internal cursor not found: {cursor}")));
        }
        let page_len = rows.len();
        let mut groups = self.group(rows)?;

        if page_len >= page_size {
            if groups.len() > 1 {
                if let Some(deferred) = groups.pop() {
                    if !deferred.is_trailing_run(page_len) {
                        tracing::warn!(
                            cursor = %cursor,
                            key = %deferred.join_key,
                            "deferred group is not a trailing run of the page; rows may repeat"
                        );
                    }
                    tracing::debug!(
                        cursor = %cursor,
                        key = %deferred.join_key,
                        rows = deferred.len(),
                        "deferring last group to next page"
                    );
                }
            } else if let Some(only) = groups.first() {
                tracing::warn!(
                    cursor = %cursor,
                    key = %only.join_key,
                    rows = only.len(),
                    "full page holds a single group; emitting it without deferral"
                );
            }
        }

        let consumed: usize = groups.iter().map(RowGroup::len).sum();
        let records: Vec<Row> = groups
            .into_iter()
            .map(|group| group.into_record(&self.join_field, &self.group_field))
            .collect();
        registry.advance(cursor, consumed)?;
        tracing::debug!(
            cursor = %cursor,
            rows = page_len,
            consumed,
            records = records.len(),
            "squashed page"
        );
        Ok(records)
    }
}
