use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use terrama2_core::models::{DataProvider, DataProviderId, DataSetItem};

use super::DataRetriever;
use crate::collect_log::TransferenceData;
use crate::error::{CollectorError, Result};
use crate::filter::DataFilter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Retriever for HTTP based providers (plain HTTP, WFS, WCS and SOS).
///
/// Items name a single remote file: the mask must be free of wildcards since
/// a plain HTTP server cannot be listed.
pub struct HttpRetriever {
    provider: DataProviderId,
    base_url: String,
    download_dir: PathBuf,
    client: Mutex<Option<reqwest::Client>>,
}

impl HttpRetriever {
    /// Files are downloaded to `download_dir/<provider id>/`
    pub fn new(provider: &DataProvider, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider: provider.id(),
            base_url: provider.uri.trim_end_matches('/').to_string(),
            download_dir: download_dir.into().join(provider.id().to_string()),
            client: Mutex::new(None),
        }
    }

    fn client(&self) -> MutexGuard<'_, Option<reqwest::Client>> {
        self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn item_url(&self, item: &DataSetItem) -> String {
        let path = item.path.trim_matches('/');
        if path.is_empty() {
            format!("{}/{}", self.base_url, item.mask)
        } else {
            format!("{}/{}/{}", self.base_url, path, item.mask)
        }
    }
}

#[async_trait]
impl DataRetriever for HttpRetriever {
    async fn open(&self) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CollectorError::UnableToOpenCollector {
                provider: self.provider,
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        *self.client() = Some(client);
        Ok(())
    }

    async fn close(&self) {
        self.client().take();
    }

    fn is_open(&self) -> bool {
        self.client().is_some()
    }

    async fn retrieve(&self, item: &DataSetItem, filter: &DataFilter) -> Result<Vec<TransferenceData>> {
        let client = self
            .client()
            .clone()
            .ok_or(CollectorError::CollectorNotOpen { provider: self.provider })?;

        if filter.mask().has_wildcards() {
            return Err(CollectorError::Retrieval(format!(
                "mask '{}' has wildcards and cannot be listed over HTTP",
                item.mask
            )));
        }
        if !filter.matches_name(&item.mask) {
            return Ok(Vec::new());
        }

        let url = self.item_url(item);
        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CollectorError::Retrieval(format!(
                "GET {} failed ({}): {}",
                url, status, error_text
            )));
        }
        let body = response.bytes().await?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let target = self.download_dir.join(&item.mask);
        tokio::fs::write(&target, &body).await?;

        tracing::debug!(provider_id = %self.provider, url = %url, bytes = body.len(), "Downloaded file");

        Ok(vec![TransferenceData {
            dataset: item.dataset,
            item: item.id,
            uri_origin: url,
            uri_storage: target,
            date_data: filter.mask().timestamp(&item.mask),
            date_collect: Utc::now(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrama2_core::models::{ItemKind, ProviderKind};

    fn retriever() -> HttpRetriever {
        let provider = DataProvider::new("focos", ProviderKind::Http, "http://example.org/dados/").with_id(7);
        HttpRetriever::new(&provider, "/tmp/terrama2")
    }

    #[test]
    fn test_item_url_and_download_dir() {
        let retriever = retriever();
        let mut item = DataSetItem::new(1, ItemKind::FirePoints, "focos.csv");
        assert_eq!(retriever.item_url(&item), "http://example.org/dados/focos.csv");

        item.path = "/diario/".to_string();
        assert_eq!(retriever.item_url(&item), "http://example.org/dados/diario/focos.csv");
        assert_eq!(retriever.download_dir, PathBuf::from("/tmp/terrama2/7"));
    }

    #[tokio::test]
    async fn test_open_close() {
        let retriever = retriever();
        assert!(!retriever.is_open());
        retriever.open().await.unwrap();
        assert!(retriever.is_open());
        retriever.close().await;
        assert!(!retriever.is_open());
    }

    #[tokio::test]
    async fn test_wildcard_mask_is_rejected() {
        let retriever = retriever();
        retriever.open().await.unwrap();
        let item = DataSetItem::new(1, ItemKind::FirePoints, "focos_%A%M%d.csv");
        let filter = DataFilter::new(&item, None).unwrap();

        let err = retriever.retrieve(&item, &filter).await.unwrap_err();
        assert!(matches!(err, CollectorError::Retrieval(_)));
    }
}
