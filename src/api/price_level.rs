//! Purpose: Cached price level catalogue.
//! Exports: `PriceLevels`, `PriceLevel`, `PRICE_LEVEL_ENDPOINT`.
//! Role: Loads the whole catalogue once per handle and answers name lookups from memory.
//! Invariants: Names and descriptions are trimmed; lookups ignore case.
use crate::api::session::Session;
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::page::{Params, Row, take_items};
use crate::core::sequence::{PageSource, PagedSequence};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

pub const PRICE_LEVEL_ENDPOINT: &str = "/api/PriceLevel";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PriceLevel {
    name: String,
    description: String,
}

impl PriceLevel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn from_row(row: Row) -> ApiResult<Self> {
        let text = |key: &str| -> Option<String> {
            row.get(key).and_then(Value::as_str).map(|s| s.trim().to_string())
        };
        let name = text("Price_Level").ok_or_else(|| {
            Error::new(ErrorKind::Protocol)
                .with_message("price level row has no Price_Level")
                .with_endpoint(PRICE_LEVEL_ENDPOINT)
        })?;
        Ok(Self {
            name,
            description: text("Description").unwrap_or_default(),
        })
    }
}

#[derive(Debug)]
pub struct PriceLevels {
    session: Session,
    cache: Mutex<Option<Vec<PriceLevel>>>,
}

impl PriceLevels {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            cache: Mutex::new(None),
        }
    }

    pub fn get(&self, name: &str) -> ApiResult<Option<PriceLevel>> {
        let name = name.trim();
        let levels = self.load()?;
        Ok(levels
            .iter()
            .flatten()
            .find(|level| level.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    /// Every price level in service order.
    pub fn all(&self) -> ApiResult<Vec<PriceLevel>> {
        Ok(self.load()?.iter().flatten().cloned().collect())
    }

    /// Drops the cached catalogue; the next lookup reloads it.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn load(&self) -> ApiResult<MutexGuard<'_, Option<Vec<PriceLevel>>>> {
        let mut cache = self.lock();
        if cache.is_none() {
            let params = Params::new();
            let rows = take_items(
                self.session.get(PRICE_LEVEL_ENDPOINT, &params)?,
                PRICE_LEVEL_ENDPOINT,
            )?;
            let levels = PagedSequence::new(PageSource::Closed, params, PriceLevel::from_row, rows)?;
            tracing::debug!(count = levels.len(), "loaded price levels");
            *cache = Some(levels.into_vec());
        }
        Ok(cache)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<PriceLevel>>> {
        self.cache
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
