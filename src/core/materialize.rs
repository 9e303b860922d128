//! Purpose: Turn raw rows into the element type a paginated sequence yields.
//! Exports: `Materializer`, `EntityMaterializer`.
//! Role: One capability for both entity construction and plain transforms.
//! Invariants: Materializers are pure per row; they never fetch.
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::fields::FieldMap;
use crate::core::page::Row;
use crate::core::record::{EntityType, Record};
use std::sync::Arc;

pub trait Materializer<T>: Send + Sync {
    fn materialize(&self, row: Row) -> ApiResult<T>;

    /// Checked once when a sequence is built.
    fn validate(&self) -> ApiResult<()> {
        Ok(())
    }
}

impl<T, F> Materializer<T> for F
where
    F: Fn(Row) -> ApiResult<T> + Send + Sync,
{
    fn materialize(&self, row: Row) -> ApiResult<T> {
        self(row)
    }
}

/// Builds [`Record`]s for one entity type under its field map.
#[derive(Clone, Debug)]
pub struct EntityMaterializer {
    kind: EntityType,
    field_map: Arc<FieldMap>,
}

impl EntityMaterializer {
    pub fn new(kind: EntityType, field_map: Arc<FieldMap>) -> Self {
        Self { kind, field_map }
    }

    pub fn kind(&self) -> EntityType {
        self.kind
    }
}

impl Materializer<Record> for EntityMaterializer {
    fn materialize(&self, row: Row) -> ApiResult<Record> {
        Ok(Record::from_row(&self.kind, &self.field_map, row))
    }

    fn validate(&self) -> ApiResult<()> {
        if self.kind.id_key().is_empty() {
            return Err(Error::new(ErrorKind::Configuration)
                .with_message(format!(
                    "entity type {} has no identifier field",
                    self.kind.short_name()
                ))
                .with_endpoint(self.kind.endpoint()));
        }
        Ok(())
    }
}
