//! Connection to one provider, serializing collection attempts against it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use terrama2_core::models::{DataProvider, DataProviderId, DataSet, DataSetItem, ProviderKind};

use crate::collect_log::{CollectLog, CollectStatus, TransferenceData};
use crate::error::{CollectorError, Result};
use crate::filter::DataFilter;
use crate::retriever::DataRetriever;

/// A provider connection.
///
/// The retriever does the protocol work; the collector guarantees that at
/// most one `collect` runs at a time and keeps the collect log up to date.
pub struct Collector {
    provider: DataProvider,
    retriever: Box<dyn DataRetriever>,
    collect_log: Arc<dyn CollectLog>,
    in_flight: Mutex<()>,
}

struct Outcome {
    data: Vec<TransferenceData>,
    failed: usize,
    total: usize,
}

impl Collector {
    pub fn new(
        provider: DataProvider,
        retriever: Box<dyn DataRetriever>,
        collect_log: Arc<dyn CollectLog>,
    ) -> Self {
        Self {
            provider,
            retriever,
            collect_log,
            in_flight: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &DataProvider {
        &self.provider
    }

    pub fn provider_id(&self) -> DataProviderId {
        self.provider.id()
    }

    /// Scheduling partition key
    pub fn kind(&self) -> ProviderKind {
        self.provider.kind
    }

    pub async fn open(&self) -> Result<()> {
        self.retriever.open().await
    }

    pub async fn close(&self) {
        self.retriever.close().await
    }

    pub fn is_open(&self) -> bool {
        self.retriever.is_open()
    }

    /// True while a `collect` call is in progress
    pub fn is_collecting(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Collect every active item of `dataset`.
    ///
    /// Returns `Ok(false)` without doing anything when another collection is
    /// in progress on this connection. Item failures do not stop the other
    /// items; they are reported together as [`CollectorError::PartialCollect`].
    pub async fn collect(&self, dataset: &DataSet) -> Result<bool> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!(provider_id = %self.provider_id(), dataset_id = %dataset.id(), "Collector busy");
            return Ok(false);
        };

        if !self.is_open() {
            return Err(CollectorError::CollectorNotOpen {
                provider: self.provider_id(),
            });
        }

        let work = self.collect_items(dataset);
        let outcome = if dataset.schedule_timeout.is_zero() {
            work.await
        } else {
            tokio::time::timeout(dataset.schedule_timeout, work)
                .await
                .map_err(|_| CollectorError::CollectTimeout {
                    dataset: dataset.id(),
                    seconds: dataset.schedule_timeout.as_secs(),
                })?
        };

        self.collect_log.record(&outcome.data, CollectStatus::Imported);
        tracing::info!(
            provider_id = %self.provider_id(),
            dataset_id = %dataset.id(),
            files = outcome.data.len(),
            "Dataset collected"
        );

        if outcome.failed > 0 {
            return Err(CollectorError::PartialCollect {
                dataset: dataset.id(),
                failed: outcome.failed,
                total: outcome.total,
            });
        }
        Ok(true)
    }

    async fn collect_items(&self, dataset: &DataSet) -> Outcome {
        if dataset.items.is_empty() {
            tracing::warn!(dataset_id = %dataset.id(), dataset = %dataset.name, "Dataset has no items");
        }

        let mut outcome = Outcome {
            data: Vec::new(),
            failed: 0,
            total: 0,
        };
        for item in dataset.active_items() {
            outcome.total += 1;
            match self.collect_item(item).await {
                Ok(data) => outcome.data.extend(data),
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        dataset_id = %dataset.id(),
                        item_id = %item.id,
                        error = %e,
                        "Failed to collect dataset item"
                    );
                }
            }
        }
        outcome
    }

    async fn collect_item(&self, item: &DataSetItem) -> Result<Vec<TransferenceData>> {
        let filter = DataFilter::new(item, self.collect_log.last_collected(item.id))?;
        let data = self.retriever.retrieve(item, &filter).await?;
        self.collect_log.record(&data, CollectStatus::Downloaded);
        Ok(data)
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("provider", &self.provider_id())
            .field("kind", &self.kind())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect_log::MemoryCollectLog;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use terrama2_core::models::{DataSetKind, ItemKind, Status};

    /// Returns one file per item after `delay`; items with mask "broken" fail
    struct SlowRetriever {
        delay: Duration,
        open: AtomicBool,
    }

    impl SlowRetriever {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                open: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DataRetriever for SlowRetriever {
        async fn open(&self) -> Result<()> {
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn retrieve(&self, item: &DataSetItem, _filter: &DataFilter) -> Result<Vec<TransferenceData>> {
            tokio::time::sleep(self.delay).await;
            if item.mask == "broken" {
                return Err(CollectorError::Retrieval("connection reset".to_string()));
            }
            Ok(vec![TransferenceData {
                dataset: item.dataset,
                item: item.id,
                uri_origin: format!("mock://{}", item.mask),
                uri_storage: PathBuf::from(&item.mask),
                date_data: Some(Utc.with_ymd_and_hms(2015, 8, 15, 0, 0, 0).unwrap()),
                date_collect: Utc::now(),
            }])
        }
    }

    fn collector(delay: Duration) -> (Collector, Arc<MemoryCollectLog>) {
        let log = Arc::new(MemoryCollectLog::new());
        let provider = DataProvider::new("mock", ProviderKind::Ftp, "ftp://example.org").with_id(1);
        let collector = Collector::new(provider, Box::new(SlowRetriever::new(delay)), log.clone());
        (collector, log)
    }

    fn dataset(masks: &[&str]) -> DataSet {
        let mut dataset = DataSet::new("pcd", DataSetKind::Pcd, DataProviderId(1))
            .with_id(1)
            .with_frequency(Duration::from_secs(60));
        for (i, mask) in masks.iter().enumerate() {
            dataset.items.push(DataSetItem::new(i as u64 + 1, ItemKind::PcdInpe, *mask));
        }
        dataset
    }

    #[tokio::test]
    async fn test_concurrent_collect_is_single_flight() {
        let (collector, _) = collector(Duration::from_millis(100));
        collector.open().await.unwrap();
        let ds = dataset(&["a.txt"]);

        let (first, second) = tokio::join!(collector.collect(&ds), collector.collect(&ds));
        let started = [first.unwrap(), second.unwrap()];
        assert_eq!(started.iter().filter(|s| **s).count(), 1);
        assert!(!collector.is_collecting());
    }

    #[tokio::test]
    async fn test_is_collecting_during_collect() {
        let (collector, _) = collector(Duration::from_millis(100));
        collector.open().await.unwrap();
        let ds = dataset(&["a.txt"]);

        let probe = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            collector.is_collecting()
        };
        let (result, busy) = tokio::join!(collector.collect(&ds), probe);
        assert!(result.unwrap());
        assert!(busy);
        assert!(!collector.is_collecting());
    }

    #[tokio::test]
    async fn test_collect_requires_open() {
        let (collector, _) = collector(Duration::ZERO);
        let err = collector.collect(&dataset(&["a.txt"])).await.unwrap_err();
        assert!(matches!(err, CollectorError::CollectorNotOpen { .. }));
        assert!(!collector.is_collecting());
    }

    #[tokio::test]
    async fn test_failed_item_does_not_stop_siblings() {
        let (collector, log) = collector(Duration::ZERO);
        collector.open().await.unwrap();
        let mut ds = dataset(&["a.txt", "broken", "c.txt", "d.txt"]);
        ds.items[3].status = Status::Inactive;

        let err = collector.collect(&ds).await.unwrap_err();
        assert!(matches!(err, CollectorError::PartialCollect { failed: 1, total: 3, .. }));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == CollectStatus::Imported));
    }

    #[tokio::test]
    async fn test_schedule_timeout() {
        let (collector, log) = collector(Duration::from_millis(200));
        collector.open().await.unwrap();
        let mut ds = dataset(&["a.txt"]);
        ds.schedule_timeout = Duration::from_millis(20);

        let err = collector.collect(&ds).await.unwrap_err();
        assert!(matches!(err, CollectorError::CollectTimeout { .. }));
        assert!(log.is_empty());
        assert!(!collector.is_collecting());
    }

    #[tokio::test]
    async fn test_dataset_without_items() {
        let (collector, log) = collector(Duration::ZERO);
        collector.open().await.unwrap();
        assert!(collector.collect(&dataset(&[])).await.unwrap());
        assert!(log.is_empty());
    }
}
