//! Database entities for the table-backed key-value store.

pub mod kv_records;
