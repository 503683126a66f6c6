//! TerraMA2 Core - Domain records, data manager port, and configuration
//!
//! This crate contains the records shared by every TerraMA2 service (data
//! providers, datasets and their items) together with the port through which
//! services observe changes to them.

pub mod config;
pub mod error;
pub mod models;
pub mod ports;

pub use error::{Result, Terrama2Error};
