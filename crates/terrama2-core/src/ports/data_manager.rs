use std::fmt;
use std::sync::Arc;

use crate::models::{DataProvider, DataProviderId, DataSet, DataSetId};

/// Lifecycle notification published by a data manager
#[derive(Debug, Clone, PartialEq)]
pub enum DataManagerEvent {
    ProviderAdded(DataProvider),
    ProviderRemoved(DataProvider),
    ProviderUpdated(DataProvider),
    DataSetAdded(DataSet),
    DataSetRemoved(DataSetId),
    DataSetUpdated(DataSet),
}

impl DataManagerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DataManagerEvent::ProviderAdded(_) => EventKind::ProviderAdded,
            DataManagerEvent::ProviderRemoved(_) => EventKind::ProviderRemoved,
            DataManagerEvent::ProviderUpdated(_) => EventKind::ProviderUpdated,
            DataManagerEvent::DataSetAdded(_) => EventKind::DataSetAdded,
            DataManagerEvent::DataSetRemoved(_) => EventKind::DataSetRemoved,
            DataManagerEvent::DataSetUpdated(_) => EventKind::DataSetUpdated,
        }
    }
}

/// Discriminant of [`DataManagerEvent`], used to subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProviderAdded,
    ProviderRemoved,
    ProviderUpdated,
    DataSetAdded,
    DataSetRemoved,
    DataSetUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::ProviderAdded,
        EventKind::ProviderRemoved,
        EventKind::ProviderUpdated,
        EventKind::DataSetAdded,
        EventKind::DataSetRemoved,
        EventKind::DataSetUpdated,
    ];
}

/// Callback invoked for every event of the subscribed kind.
///
/// Listeners run on the thread that changed the data manager and must not
/// block.
pub type EventListener = Arc<dyn Fn(&DataManagerEvent) + Send + Sync>;

/// Handle of a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Subscription that runs `cancel` when released
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}

/// Port for the registry of providers and datasets.
///
/// Services keep a local cache of what the manager holds and follow its
/// changes through subscriptions; they never write back.
pub trait DataManager: Send + Sync {
    /// All registered providers, with their datasets
    fn providers(&self) -> Vec<DataProvider>;

    /// All registered datasets
    fn datasets(&self) -> Vec<DataSet>;

    /// Look up a provider
    fn provider(&self, id: DataProviderId) -> Option<DataProvider>;

    /// Look up a dataset
    fn dataset(&self, id: DataSetId) -> Option<DataSet>;

    /// Register `listener` for events of `kind`
    fn subscribe(&self, kind: EventKind, listener: EventListener) -> Subscription;
}
