//! Port trait definitions
//!
//! These traits define the interfaces that adapters must implement.

pub mod data_manager;

pub use data_manager::{DataManager, DataManagerEvent, EventKind, EventListener, Subscription};
