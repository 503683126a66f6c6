//! TerraMA2 Store - Data manager adapters
//!
//! This crate provides the in-memory data manager used by the collector
//! process and tests, and the catalog file that seeds it.

pub mod catalog;
pub mod memory;

pub use catalog::{Catalog, CatalogSummary};
pub use memory::MemoryDataManager;
