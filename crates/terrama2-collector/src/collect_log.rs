//! Record of collected files.
//!
//! Every file handed over by a retriever is logged as
//! [`CollectStatus::Downloaded`] and promoted to [`CollectStatus::Imported`]
//! once its item finished. The newest imported timestamp of an item is fed
//! back into its [`DataFilter`](crate::DataFilter) so old data is not
//! collected twice.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use terrama2_core::models::{DataSetId, DataSetItemId};

/// One file moved from a provider to local storage
#[derive(Debug, Clone, PartialEq)]
pub struct TransferenceData {
    pub dataset: DataSetId,
    pub item: DataSetItemId,

    /// Where the file came from
    pub uri_origin: String,

    /// Where the file is now
    pub uri_storage: PathBuf,

    /// Timestamp of the data, read from the file name
    pub date_data: Option<DateTime<Utc>>,

    /// When it was collected
    pub date_collect: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStatus {
    Downloaded,
    Imported,
}

/// Port for the collect log
pub trait CollectLog: Send + Sync {
    /// Record `data` with `status`, replacing the status of files already logged
    fn record(&self, data: &[TransferenceData], status: CollectStatus);

    /// Newest data timestamp imported for `item`
    fn last_collected(&self, item: DataSetItemId) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub data: TransferenceData,
    pub status: CollectStatus,
}

/// In-process collect log
#[derive(Debug, Default)]
pub struct MemoryCollectLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryCollectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CollectLog for MemoryCollectLog {
    fn record(&self, data: &[TransferenceData], status: CollectStatus) {
        let mut entries = self.lock();
        for transference in data {
            let existing = entries.iter_mut().find(|e| {
                e.data.item == transference.item && e.data.uri_origin == transference.uri_origin
            });
            match existing {
                Some(entry) => {
                    entry.data = transference.clone();
                    entry.status = status;
                }
                None => entries.push(LogEntry {
                    data: transference.clone(),
                    status,
                }),
            }
        }
    }

    fn last_collected(&self, item: DataSetItemId) -> Option<DateTime<Utc>> {
        self.lock()
            .iter()
            .filter(|e| e.data.item == item && e.status == CollectStatus::Imported)
            .filter_map(|e| e.data.date_data)
            .max()
    }
}
