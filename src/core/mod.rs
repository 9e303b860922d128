// Paging engine, offset bookkeeping, row squashing and the record model.
pub mod cursor;
pub mod error;
pub mod fields;
pub mod materialize;
pub mod page;
pub mod record;
pub mod sequence;
pub mod squash;
