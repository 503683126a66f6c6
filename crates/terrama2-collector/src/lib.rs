//! TerraMA2 Collector - Collection scheduling and dispatch
//!
//! Datasets are turned into recurring [`DataSetTimer`]s. Every time a timer
//! fires, the [`CollectorService`] queues the dataset on the [`Collector`] of
//! its provider, and a background loop opens, drains and closes collectors,
//! with at most one open collector per provider kind.

pub mod collect_log;
pub mod collector;
pub mod config;
pub mod error;
pub mod factory;
pub mod filter;
pub mod queue;
pub mod retriever;
pub mod service;
pub mod timer;

pub use collect_log::{CollectLog, CollectStatus, LogEntry, MemoryCollectLog, TransferenceData};
pub use collector::Collector;
pub use config::ServiceConfig;
pub use error::{CollectorError, Result};
pub use factory::{Factory, RetrieverBuilder};
pub use filter::{DataFilter, Mask};
pub use retriever::{DataRetriever, FileRetriever, FtpRetriever, HttpRetriever};
pub use service::CollectorService;
pub use timer::{DataSetTimer, TimerCallback, TimerMode};
