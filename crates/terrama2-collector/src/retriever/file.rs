use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use terrama2_core::models::{DataProvider, DataProviderId, DataSetItem};

use super::DataRetriever;
use crate::collect_log::TransferenceData;
use crate::error::{CollectorError, Result};
use crate::filter::DataFilter;

/// Retriever for providers on a local or mounted file system
pub struct FileRetriever {
    provider: DataProviderId,
    root: PathBuf,
    open: AtomicBool,
}

impl FileRetriever {
    pub fn new(provider: &DataProvider) -> Self {
        Self {
            provider: provider.id(),
            root: uri_to_path(&provider.uri),
            open: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Accepts plain paths and `file://` URIs
fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

#[async_trait]
impl DataRetriever for FileRetriever {
    async fn open(&self) -> Result<()> {
        let is_dir = tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if !is_dir {
            return Err(CollectorError::UnableToOpenCollector {
                provider: self.provider,
                reason: format!("{} is not a directory", self.root.display()),
            });
        }

        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn retrieve(&self, item: &DataSetItem, filter: &DataFilter) -> Result<Vec<TransferenceData>> {
        if !self.is_open() {
            return Err(CollectorError::CollectorNotOpen { provider: self.provider });
        }

        let dir = self.root.join(item.path.trim_start_matches('/'));
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let now = Utc::now();
        let data = filter
            .filter_names(&names)
            .into_iter()
            .map(|name| {
                let path = dir.join(&name);
                TransferenceData {
                    dataset: item.dataset,
                    item: item.id,
                    uri_origin: format!("file://{}", path.display()),
                    date_data: filter.mask().timestamp(&name),
                    uri_storage: path,
                    date_collect: now,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            provider_id = %self.provider,
            item_id = %item.id,
            dir = %dir.display(),
            listed = names.len(),
            accepted = data.len(),
            "Listed item directory"
        );
        Ok(data)
    }
}
