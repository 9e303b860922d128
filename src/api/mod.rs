//! Purpose: Public surface for talking to a SalesPad service.
//! Exports: Session, entity and inventory clients plus the core types they return.
//! Role: Stable entry point for applications and the CLI.
//! Invariants: Everything here is read-only; the session refuses non-GET calls.

mod config;
mod entity;
mod inventory;
mod price_level;
mod session;
#[cfg(test)]
mod testing;
mod transport;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::cursor::{CursorId, CursorLease, CursorRegistry};
pub use crate::core::error::{ApiResult, Error, ErrorKind};
pub use crate::core::fields::{FieldMap, FieldRule};
pub use crate::core::materialize::{EntityMaterializer, Materializer};
pub use crate::core::page::{Params, Row};
pub use crate::core::record::{EntityType, Record};
pub use crate::core::sequence::{Gateway, PageLoader, PageSource, PagedSequence};
pub use crate::core::squash::{RowGroup, Squash};
pub use config::{
    ClientConfig, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, ENV_HOST,
    ENV_PAGE_SIZE, ENV_TIMEOUT_SECS, ENV_TLS_CA_FILE,
};
pub use entity::{
    CUSTOMER, CUSTOMER_ADDRESS, ENTITY_TYPES, Entities, ITEM, SALES_DOCUMENT, SALES_LINE_ITEM,
    entity_type,
};
pub use inventory::{INVENTORY_ENDPOINT, Inventory};
pub use price_level::{PRICE_LEVEL_ENDPOINT, PriceLevel, PriceLevels};
pub use session::{SESSION_HEADER, Session, SessionKind};
pub use transport::{Headers, HttpResponse, Request, Transport, UreqTransport};
