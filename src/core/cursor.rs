//! Purpose: Per-query offset bookkeeping for endpoints that only offer `$skip`.
//! Exports: `CursorRegistry`, `CursorId`, `CursorLease`.
//! Role: Lets independent sequences share one paginated endpoint without sharing offsets.
//! Invariants: A cursor id is never reissued while its entry is live.
//! Invariants: `received` only grows; base parameters are frozen at `open`.
//! Invariants: All mutations go through one mutex, so handles may cross threads.
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::page::{Params, with_skip};
use getrandom::fill as fill_random;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

const CURSOR_ID_BYTES: usize = 8;

#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct CursorId(String);

impl CursorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CursorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct CursorEntry {
    base: Params,
    received: usize,
}

#[derive(Clone, Debug, Default)]
pub struct CursorRegistry {
    entries: Arc<Mutex<HashMap<CursorId, CursorEntry>>>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, base: Params) -> ApiResult<CursorId> {
        let mut entries = self.lock();
        let id = loop {
            let id = random_cursor_id()?;
            if !entries.contains_key(&id) {
                break id;
            }
        };
        entries.insert(id.clone(), CursorEntry { base, received: 0 });
        tracing::debug!(cursor = %id, "opened cursor");
        Ok(id)
    }

    /// Opens a cursor that is released when the lease is dropped.
    pub fn lease(&self, base: Params) -> ApiResult<CursorLease> {
        let id = self.open(base)?;
        Ok(CursorLease {
            registry: self.clone(),
            id,
        })
    }

    pub fn advance(&self, id: &CursorId, delta: usize) -> ApiResult<()> {
        let mut entries = self.lock();
        let entry = entries.get_mut(id).ok_or_else(|| unknown_cursor(id))?;
        entry.received += delta;
        Ok(())
    }

    pub fn received(&self, id: &CursorId) -> ApiResult<usize> {
        let entries = self.lock();
        entries
            .get(id)
            .map(|entry| entry.received)
            .ok_or_else(|| unknown_cursor(id))
    }

    pub fn parameters_for_next_page(&self, id: &CursorId) -> ApiResult<Params> {
        let entries = self.lock();
        let entry = entries.get(id).ok_or_else(|| unknown_cursor(id))?;
        Ok(with_skip(&entry.base, entry.received))
    }

    pub fn contains(&self, id: &CursorId) -> bool {
        self.lock().contains_key(id)
    }

    /// Returns whether an entry was removed.
    pub fn close(&self, id: &CursorId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            tracing::debug!(cursor = %id, "closed cursor");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CursorId, CursorEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Owns one registry entry for the lifetime of a query.
#[derive(Debug)]
pub struct CursorLease {
    registry: CursorRegistry,
    id: CursorId,
}

impl CursorLease {
    pub fn id(&self) -> &CursorId {
        &self.id
    }

    pub fn registry(&self) -> &CursorRegistry {
        &self.registry
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        self.registry.close(&self.id);
    }
}

fn random_cursor_id() -> ApiResult<CursorId> {
    let mut bytes = [0u8; CURSOR_ID_BYTES];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to generate cursor id: {err}"))
    })?;
    Ok(CursorId(hex_encode(&bytes)))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

fn unknown_cursor(id: &CursorId) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("internal cursor not found: {id}"))
}
