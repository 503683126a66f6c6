//! Protocol-specific data access.
//!
//! A [`DataRetriever`] owns the connection to one provider. The
//! [`Collector`](crate::Collector) drives it; retrievers never see the queues.

use async_trait::async_trait;

use terrama2_core::models::DataSetItem;

use crate::collect_log::TransferenceData;
use crate::error::Result;
use crate::filter::DataFilter;

pub mod file;
pub mod ftp;
pub mod http;

pub use file::FileRetriever;
pub use ftp::FtpRetriever;
pub use http::HttpRetriever;

#[async_trait]
pub trait DataRetriever: Send + Sync {
    /// Establish the connection to the provider
    async fn open(&self) -> Result<()>;

    /// Release the connection. Safe to call when not open.
    async fn close(&self);

    fn is_open(&self) -> bool;

    /// Fetch the files of `item` accepted by `filter`
    async fn retrieve(&self, item: &DataSetItem, filter: &DataFilter) -> Result<Vec<TransferenceData>>;
}
