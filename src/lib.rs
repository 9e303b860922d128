//! Purpose: Read-only client library for the SalesPad web api.
//! Exports: `core` (paging engine, cursors, squash, records, errors) and `api` (session, entities).
//! Role: Library backing the `salespad` CLI and integration tests.
//! Invariants: `core` never performs I/O on its own; every request goes through a `Gateway` or `PageLoader`.
//! Invariants: Pages are fetched lazily and only ever forward.
pub mod api;
pub mod core;
