//! Purpose: Inventory search that yields one item per entity with its per-location rows.
//! Exports: `Inventory`, `INVENTORY_ENDPOINT`.
//! Role: Wires the cursor registry and the squash engine into a loader-mode sequence.
//! Invariants: Each search owns one cursor lease; dropping the sequence closes it.
//! Invariants: The squash page size equals the `$top` sent, so deferral sees full pages.
use crate::api::entity::ITEM;
use crate::api::session::Session;
use crate::core::cursor::{CursorId, CursorLease, CursorRegistry};
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::fields::FieldMap;
use crate::core::materialize::EntityMaterializer;
use crate::core::page::{Params, Row, search_params, take_items};
use crate::core::record::Record;
use crate::core::sequence::{PageLoader, PageSource, PagedSequence};
use crate::core::squash::Squash;
use std::sync::Arc;

pub const INVENTORY_ENDPOINT: &str = "/api/InventorySearch";
pub const CURSOR_PARAM: &str = "cursor";

const JOIN_FIELD: &str = "Item_Number";
const GROUP_FIELD: &str = "Locations";

#[derive(Clone, Debug)]
pub struct Inventory {
    session: Session,
    registry: CursorRegistry,
    field_map: Arc<FieldMap>,
    squash: Squash,
}

impl Inventory {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            registry: CursorRegistry::new(),
            field_map: Arc::new(FieldMap::new()),
            squash: Squash::new(JOIN_FIELD, GROUP_FIELD),
        }
    }

    /// Shares `registry` with other searches instead of a private one.
    pub fn with_registry(mut self, registry: CursorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_field_map(mut self, field_map: FieldMap) -> Self {
        self.field_map = Arc::new(field_map);
        self
    }

    pub fn registry(&self) -> &CursorRegistry {
        &self.registry
    }

    pub fn search(&self, filter: &str) -> ApiResult<PagedSequence<Record>> {
        let page_size = self.session.page_size();
        let base = search_params(page_size, filter);
        let rows = take_items(self.session.get(INVENTORY_ENDPOINT, &base)?, INVENTORY_ENDPOINT)?;
        let lease = self.registry.lease(base)?;
        let items = self.squash.squash(&self.registry, lease.id(), rows, page_size)?;
        tracing::debug!(
            cursor = %lease.id(),
            filter,
            items = items.len(),
            "inventory search first page"
        );

        let mut params = Params::new();
        params.insert(CURSOR_PARAM.to_string(), lease.id().to_string());
        let loader = InventoryLoader {
            session: self.session.clone(),
            squash: self.squash.clone(),
            page_size,
            lease,
        };
        PagedSequence::new(
            PageSource::loader(loader),
            params,
            EntityMaterializer::new(ITEM, Arc::clone(&self.field_map)),
            items,
        )
    }
}

struct InventoryLoader {
    session: Session,
    squash: Squash,
    page_size: usize,
    lease: CursorLease,
}

impl PageLoader for InventoryLoader {
    fn load_page(&mut self, params: &Params) -> ApiResult<Vec<Row>> {
        let cursor = params
            .get(CURSOR_PARAM)
            .map(|id| CursorId::from(id.as_str()))
            .ok_or_else(|| {
                Error::new(ErrorKind::Configuration)
                    .with_message("inventory loader did not receive a cursor key")
                    .with_endpoint(INVENTORY_ENDPOINT)
            })?;
        let registry = self.lease.registry();
        let request = registry.parameters_for_next_page(&cursor)?;
        let rows = take_items(self.session.get(INVENTORY_ENDPOINT, &request)?, INVENTORY_ENDPOINT)?;
        self.squash.squash(registry, &cursor, rows, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::{CURSOR_PARAM, INVENTORY_ENDPOINT, Inventory, InventoryLoader};
    use crate::api::testing::FakeTransport;
    use crate::core::cursor::CursorRegistry;
    use crate::core::error::ErrorKind;
    use crate::core::page::{Params, search_params};
    use crate::core::record::Record;
    use crate::core::sequence::PageLoader;
    use crate::core::squash::Squash;
    use serde_json::{Value, json};

    fn stock() -> Vec<Value> {
        let mut rows = Vec::new();
        for (item, locations) in [("A", 3), ("B", 3), ("C", 2), ("D", 1)] {
            for n in 0..locations {
                rows.push(json!({
                    "Item_Number": item,
                    "Item_Description": format!("{item} widget"),
                    "Location": format!("LOC{n}"),
                    "Qty_Available": n,
                }));
            }
        }
        rows
    }

    fn summary(record: &Record) -> (String, usize) {
        let locations = record
            .get("Locations")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        (record.id().unwrap_or("").to_string(), locations)
    }

    #[test]
    fn items_split_across_pages_come_back_whole() {
        let transport = FakeTransport::new().paged(INVENTORY_ENDPOINT, stock());
        let inventory = Inventory::new(transport.session(4));
        let mut items = inventory.search("").expect("search");
        let all: Vec<_> = items.fetch_all().expect("all").iter().map(summary).collect();
        assert_eq!(
            all,
            vec![
                ("A".to_string(), 3),
                ("B".to_string(), 3),
                ("C".to_string(), 2),
                ("D".to_string(), 1),
            ]
        );

        let skips: Vec<Option<String>> = transport
            .seen_for(INVENTORY_ENDPOINT)
            .into_iter()
            .map(|request| request.query.get("$skip").cloned())
            .collect();
        assert_eq!(
            skips,
            vec![
                None,
                Some("3".to_string()),
                Some("6".to_string()),
                Some("9".to_string()),
            ]
        );
    }

    #[test]
    fn interleaved_searches_keep_separate_offsets() {
        let transport = FakeTransport::new().paged(INVENTORY_ENDPOINT, stock());
        let inventory = Inventory::new(transport.session(4));
        let mut first = inventory.search("").expect("search");
        let mut second = inventory.search("").expect("search");
        assert_eq!(inventory.registry().len(), 2);

        assert_eq!(first.get(1).map(summary).expect("first"), ("B".to_string(), 3));
        assert_eq!(second.get(2).map(summary).expect("second"), ("C".to_string(), 2));
        assert_eq!(first.fetch_all().expect("all").len(), 4);
        assert_eq!(second.fetch_all().expect("all").len(), 4);
    }

    #[test]
    fn dropping_the_sequence_closes_its_cursor() {
        let transport = FakeTransport::new().paged(INVENTORY_ENDPOINT, stock());
        let registry = CursorRegistry::new();
        let inventory = Inventory::new(transport.session(4)).with_registry(registry.clone());
        let items = inventory.search("Location eq 'LOC0'").expect("search");
        assert_eq!(registry.len(), 1);
        drop(items);
        assert!(registry.is_empty());
    }

    #[test]
    fn filter_is_forwarded_on_every_page() {
        let transport = FakeTransport::new().paged(INVENTORY_ENDPOINT, stock());
        let inventory = Inventory::new(transport.session(4));
        inventory
            .search("Item_Class eq 'HW'")
            .expect("search")
            .fetch_all()
            .expect("all");
        for request in transport.seen_for(INVENTORY_ENDPOINT) {
            assert_eq!(
                request.query.get("$filter").map(String::as_str),
                Some("Item_Class eq 'HW'")
            );
            assert_eq!(request.query.get("$top").map(String::as_str), Some("4"));
        }
    }

    #[test]
    fn loader_without_cursor_is_configuration_error() {
        let transport = FakeTransport::new().paged(INVENTORY_ENDPOINT, stock());
        let registry = CursorRegistry::new();
        let mut loader = InventoryLoader {
            session: transport.session(4),
            squash: Squash::new("Item_Number", "Locations"),
            page_size: 4,
            lease: registry.lease(search_params(4, "")).expect("lease"),
        };
        let err = loader.load_page(&Params::new()).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut stale = Params::new();
        stale.insert(CURSOR_PARAM.to_string(), "0000000000000000".to_string());
        let err = loader.load_page(&stale).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
