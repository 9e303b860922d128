//! Purpose: Search and look up the service's entity collections.
//! Exports: `Entities`, the built-in `EntityType` constants.
//! Role: Pairs an entity type and field map with a session; yields lazy record sequences.
//! Invariants: Searches fetch the first page eagerly; later pages follow `$skip`.
//! Invariants: A lookup by id yields zero or one record; more is an `Ambiguous` error.
use crate::api::session::Session;
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::fields::FieldMap;
use crate::core::materialize::EntityMaterializer;
use crate::core::page::{eq_filter, search_params, take_items};
use crate::core::record::{EntityType, Record};
use crate::core::sequence::{PageSource, PagedSequence};
use serde_json::Value;
use std::sync::Arc;

pub const ITEM: EntityType = EntityType::new("/api/ItemMaster", "Item_Number", "Item");
pub const CUSTOMER: EntityType = EntityType::new("/api/Customer", "Customer_Num", "Customer");
pub const CUSTOMER_ADDRESS: EntityType =
    EntityType::new("/api/CustomerAddr", "Address_Code", "CustomerAddress");
pub const SALES_DOCUMENT: EntityType =
    EntityType::new("/api/SalesDocument", "Sales_Doc_Num", "SalesDocument");
pub const SALES_LINE_ITEM: EntityType =
    EntityType::new("/api/SalesLineItem", "Line_Num", "SalesLineItem");

pub const ENTITY_TYPES: [EntityType; 5] = [
    ITEM,
    CUSTOMER,
    CUSTOMER_ADDRESS,
    SALES_DOCUMENT,
    SALES_LINE_ITEM,
];

/// Case-insensitive lookup by short name, e.g. `customer`.
pub fn entity_type(name: &str) -> Option<EntityType> {
    ENTITY_TYPES
        .into_iter()
        .find(|kind| kind.short_name().eq_ignore_ascii_case(name))
}

#[derive(Clone, Debug)]
pub struct Entities {
    session: Session,
    kind: EntityType,
    field_map: Arc<FieldMap>,
}

impl Entities {
    pub fn new(session: Session, kind: EntityType) -> Self {
        Self {
            session,
            kind,
            field_map: Arc::new(FieldMap::new()),
        }
    }

    pub fn with_field_map(mut self, field_map: FieldMap) -> Self {
        self.field_map = Arc::new(field_map);
        self
    }

    pub fn kind(&self) -> EntityType {
        self.kind
    }

    pub fn materializer(&self) -> EntityMaterializer {
        EntityMaterializer::new(self.kind, Arc::clone(&self.field_map))
    }

    /// Lazily pages through every record matching `filter`; an empty filter matches all.
    pub fn search(&self, filter: &str) -> ApiResult<PagedSequence<Record>> {
        let endpoint = self.kind.endpoint();
        let params = search_params(self.session.page_size(), filter);
        let rows = take_items(self.session.get(endpoint, &params)?, endpoint)?;
        tracing::debug!(endpoint, filter, rows = rows.len(), "search first page");
        let gateway = Arc::new(self.session.clone());
        PagedSequence::new(
            PageSource::endpoint(gateway, endpoint),
            params,
            self.materializer(),
            rows,
        )
    }

    /// Fetches the record whose identifier field equals `id`.
    pub fn get(&self, id: &str) -> ApiResult<Option<Record>> {
        let endpoint = self.kind.endpoint();
        let params = search_params(2, &eq_filter(self.kind.id_key(), id));
        let rows = take_items(self.session.get(endpoint, &params)?, endpoint)?;
        if rows.len() > 1 {
            return Err(Error::new(ErrorKind::Ambiguous)
                .with_message(format!(
                    "multiple results for {} {id}",
                    self.kind.short_name()
                ))
                .with_endpoint(endpoint));
        }
        let mut found: PagedSequence<Record> =
            PagedSequence::new(PageSource::Closed, params, self.materializer(), rows)?;
        Ok(found.pop())
    }

    /// Records of this type whose `key` equals the parent's raw `key` value.
    pub fn related_to(&self, parent: &Record, key: &str) -> ApiResult<PagedSequence<Record>> {
        let value = parent.unmapped(key).ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!(
                "{} record has no {key} value",
                parent.short_name()
            ))
        })?;
        let value = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.search(&eq_filter(key, &value))
    }
}

impl Session {
    pub fn entities(&self, kind: EntityType) -> Entities {
        Entities::new(self.clone(), kind)
    }

    /// Every address on file for `customer`.
    pub fn customer_addresses(&self, customer: &Record) -> ApiResult<Vec<Record>> {
        if customer.short_name() != CUSTOMER.short_name() {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "addresses belong to customers, not {}",
                customer.short_name()
            )));
        }
        let mut addresses = self
            .entities(CUSTOMER_ADDRESS)
            .related_to(customer, CUSTOMER.id_key())?;
        addresses.fetch_all()?;
        Ok(addresses.into_vec())
    }
}
