//! # Persistent Storage
//!
//! Disk-backed implementation of the `RecordStore` trait.

mod redb_store;

pub use redb_store::RedbStore;
