//! Table driver implementations.
//!
//! - [`dbf`]: dBase III / FoxPro `.dbf` tables
//!
//! Each driver implements [`RecordStore`](crate::core::RecordStore) and
//! [`TableOpener`](crate::core::TableOpener).

pub mod dbf;

pub use dbf::{locate_table, DbfOpener, DbfTable};
