//! In-memory data manager for the collector process and tests.
//!
//! Listeners are invoked after the write lock is released, so a listener may
//! read back from the manager while handling an event.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use terrama2_core::error::{Result, Terrama2Error};
use terrama2_core::models::{DataProvider, DataProviderId, DataSet, DataSetId};
use terrama2_core::ports::{
    DataManager, DataManagerEvent, EventKind, EventListener, Subscription,
};

type ListenerMap = HashMap<EventKind, Vec<(u64, EventListener)>>;

/// In-memory implementation of [`DataManager`]
#[derive(Clone, Default)]
pub struct MemoryDataManager {
    providers: Arc<RwLock<BTreeMap<DataProviderId, DataProvider>>>,
    listeners: Arc<RwLock<ListenerMap>>,
    next_provider_id: Arc<AtomicU64>,
    next_dataset_id: Arc<AtomicU64>,
    next_listener_id: Arc<AtomicU64>,
}

impl MemoryDataManager {
    /// Create an empty data manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider and the datasets it carries.
    ///
    /// Providers and datasets with id zero get a fresh one. Emits
    /// `ProviderAdded` and then `DataSetAdded` for every owned dataset.
    pub fn add_provider(&self, mut provider: DataProvider) -> Result<DataProviderId> {
        let mut events = Vec::new();
        let id = {
            let mut providers = write(&self.providers);

            if provider.name.trim().is_empty() {
                return Err(Terrama2Error::InvalidProvider {
                    reason: "provider name is empty".to_string(),
                });
            }
            if providers.values().any(|p| p.name == provider.name) {
                return Err(Terrama2Error::ProviderNameTaken {
                    name: provider.name.clone(),
                });
            }

            let id = if provider.id().is_valid() {
                if providers.contains_key(&provider.id()) {
                    return Err(Terrama2Error::InvalidProvider {
                        reason: format!("provider id {} already registered", provider.id()),
                    });
                }
                bump(&self.next_provider_id, provider.id().0);
                provider.id()
            } else {
                let id = DataProviderId(next(&self.next_provider_id));
                provider.assign_id(id)?;
                id
            };

            let existing_datasets: Vec<DataSetId> =
                providers.values().flat_map(|p| p.datasets.iter().map(|d| d.id())).collect();
            for dataset in &mut provider.datasets {
                dataset.provider = id;
                if dataset.id().is_valid() {
                    if existing_datasets.contains(&dataset.id()) {
                        return Err(Terrama2Error::InvalidDataset {
                            reason: format!("dataset id {} already registered", dataset.id()),
                        });
                    }
                    bump(&self.next_dataset_id, dataset.id().0);
                } else {
                    dataset.assign_id(DataSetId(next(&self.next_dataset_id)))?;
                }
            }

            events.push(DataManagerEvent::ProviderAdded(provider.clone()));
            events.extend(provider.datasets.iter().cloned().map(DataManagerEvent::DataSetAdded));
            providers.insert(id, provider);
            id
        };

        self.emit_all(events);
        Ok(id)
    }

    /// Replace a provider's connection data. Its datasets are kept.
    pub fn update_provider(&self, provider: DataProvider) -> Result<()> {
        let updated = {
            let mut providers = write(&self.providers);
            let stored = providers
                .get_mut(&provider.id())
                .ok_or(Terrama2Error::ProviderNotFound { id: provider.id().0 })?;

            let datasets = std::mem::take(&mut stored.datasets);
            *stored = provider;
            stored.datasets = datasets;
            stored.clone()
        };

        self.emit(DataManagerEvent::ProviderUpdated(updated));
        Ok(())
    }

    /// Remove a provider and, first, every dataset it owns
    pub fn remove_provider(&self, id: DataProviderId) -> Result<DataProvider> {
        let removed = write(&self.providers)
            .remove(&id)
            .ok_or(Terrama2Error::ProviderNotFound { id: id.0 })?;

        let mut events: Vec<DataManagerEvent> =
            removed.datasets.iter().map(|d| DataManagerEvent::DataSetRemoved(d.id())).collect();
        events.push(DataManagerEvent::ProviderRemoved(removed.clone()));
        self.emit_all(events);

        Ok(removed)
    }

    /// Register a dataset under its provider
    pub fn add_dataset(&self, mut dataset: DataSet) -> Result<DataSetId> {
        let added = {
            let mut providers = write(&self.providers);

            if dataset.name.trim().is_empty() {
                return Err(Terrama2Error::InvalidDataset {
                    reason: "dataset name is empty".to_string(),
                });
            }
            if dataset.id().is_valid() && find_dataset(&providers, dataset.id()).is_some() {
                return Err(Terrama2Error::InvalidDataset {
                    reason: format!("dataset id {} already registered", dataset.id()),
                });
            }

            let provider = providers
                .get_mut(&dataset.provider)
                .ok_or(Terrama2Error::ProviderNotFound { id: dataset.provider.0 })?;

            if dataset.id().is_valid() {
                bump(&self.next_dataset_id, dataset.id().0);
            } else {
                dataset.assign_id(DataSetId(next(&self.next_dataset_id)))?;
            }

            provider.datasets.push(dataset.clone());
            dataset
        };

        let id = added.id();
        self.emit(DataManagerEvent::DataSetAdded(added));
        Ok(id)
    }

    /// Replace a dataset, moving it when its provider changed
    pub fn update_dataset(&self, dataset: DataSet) -> Result<()> {
        {
            let mut providers = write(&self.providers);

            if !providers.contains_key(&dataset.provider) {
                return Err(Terrama2Error::ProviderNotFound { id: dataset.provider.0 });
            }

            let owner = find_dataset(&providers, dataset.id())
                .ok_or(Terrama2Error::DatasetNotFound { id: dataset.id().0 })?;
            if let Some(provider) = providers.get_mut(&owner) {
                provider.datasets.retain(|d| d.id() != dataset.id());
            }
            if let Some(provider) = providers.get_mut(&dataset.provider) {
                provider.datasets.push(dataset.clone());
            }
        }

        self.emit(DataManagerEvent::DataSetUpdated(dataset));
        Ok(())
    }

    /// Remove a dataset
    pub fn remove_dataset(&self, id: DataSetId) -> Result<()> {
        {
            let mut providers = write(&self.providers);
            let owner =
                find_dataset(&providers, id).ok_or(Terrama2Error::DatasetNotFound { id: id.0 })?;
            if let Some(provider) = providers.get_mut(&owner) {
                provider.datasets.retain(|d| d.id() != id);
            }
        }

        self.emit(DataManagerEvent::DataSetRemoved(id));
        Ok(())
    }

    /// Number of listeners currently registered
    pub fn listener_count(&self) -> usize {
        read(&self.listeners).values().map(Vec::len).sum()
    }

    fn emit(&self, event: DataManagerEvent) {
        self.emit_all(vec![event]);
    }

    fn emit_all(&self, events: Vec<DataManagerEvent>) {
        for event in events {
            let listeners: Vec<EventListener> = read(&self.listeners)
                .get(&event.kind())
                .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default();

            tracing::debug!(event = ?event.kind(), listeners = listeners.len(), "Emitting data manager event");
            for listener in listeners {
                listener(&event);
            }
        }
    }
}

impl DataManager for MemoryDataManager {
    fn providers(&self) -> Vec<DataProvider> {
        read(&self.providers).values().cloned().collect()
    }

    fn datasets(&self) -> Vec<DataSet> {
        read(&self.providers).values().flat_map(|p| p.datasets.iter().cloned()).collect()
    }

    fn provider(&self, id: DataProviderId) -> Option<DataProvider> {
        read(&self.providers).get(&id).cloned()
    }

    fn dataset(&self, id: DataSetId) -> Option<DataSet> {
        read(&self.providers).values().find_map(|p| p.dataset(id).cloned())
    }

    fn subscribe(&self, kind: EventKind, listener: EventListener) -> Subscription {
        let listener_id = next(&self.next_listener_id);
        write(&self.listeners).entry(kind).or_default().push((listener_id, listener));

        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                if let Some(entries) = write(&listeners).get_mut(&kind) {
                    entries.retain(|(id, _)| *id != listener_id);
                }
            }
        })
    }
}

fn find_dataset(
    providers: &BTreeMap<DataProviderId, DataProvider>,
    id: DataSetId,
) -> Option<DataProviderId> {
    providers.values().find(|p| p.dataset(id).is_some()).map(|p| p.id())
}

fn next(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

/// Keep generated ids above an explicitly restored one
fn bump(counter: &AtomicU64, used: u64) {
    counter.fetch_max(used, Ordering::SeqCst);
}

// The maps are only mutated in place under the lock and stay consistent if a
// listener panics elsewhere, so a poisoned lock is still usable.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use terrama2_core::models::{DataSetKind, ProviderKind};

    fn recorder(manager: &MemoryDataManager) -> (Arc<Mutex<Vec<DataManagerEvent>>>, Vec<Subscription>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = EventKind::ALL
            .iter()
            .map(|kind| {
                let events = events.clone();
                manager.subscribe(
                    *kind,
                    Arc::new(move |event: &DataManagerEvent| {
                        events.lock().unwrap().push(event.clone())
                    }),
                )
            })
            .collect();
        (events, subscriptions)
    }

    #[test]
    fn test_add_provider_assigns_ids() {
        let manager = MemoryDataManager::new();
        let mut provider = DataProvider::new("local", ProviderKind::File, "/data");
        provider.datasets.push(DataSet::new("pcd", DataSetKind::Pcd, DataProviderId(0)));

        let id = manager.add_provider(provider).unwrap();
        assert_eq!(id, DataProviderId(1));

        let datasets = manager.datasets();
        assert_eq!(datasets.len(), 1);
        assert!(datasets[0].id().is_valid());
        assert_eq!(datasets[0].provider, id);
    }

    #[test]
    fn test_duplicate_provider_name_is_rejected() {
        let manager = MemoryDataManager::new();
        manager.add_provider(DataProvider::new("inpe", ProviderKind::Ftp, "ftp://a")).unwrap();
        let result = manager.add_provider(DataProvider::new("inpe", ProviderKind::Http, "http://b"));
        assert!(matches!(result, Err(Terrama2Error::ProviderNameTaken { .. })));
    }

    #[test]
    fn test_restored_ids_are_kept_and_counters_bumped() {
        let manager = MemoryDataManager::new();
        manager
            .add_provider(DataProvider::new("old", ProviderKind::File, "/old").with_id(10))
            .unwrap();
        let id = manager.add_provider(DataProvider::new("new", ProviderKind::File, "/new")).unwrap();
        assert_eq!(id, DataProviderId(11));
    }

    #[test]
    fn test_events_are_emitted_in_order() {
        let manager = MemoryDataManager::new();
        let (events, _subscriptions) = recorder(&manager);

        let provider_id =
            manager.add_provider(DataProvider::new("local", ProviderKind::File, "/data")).unwrap();
        let dataset_id =
            manager.add_dataset(DataSet::new("grid", DataSetKind::Grid, provider_id)).unwrap();
        manager.remove_provider(provider_id).unwrap();

        let kinds: Vec<EventKind> = events.lock().unwrap().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ProviderAdded,
                EventKind::DataSetAdded,
                EventKind::DataSetRemoved,
                EventKind::ProviderRemoved,
            ]
        );
        assert_eq!(events.lock().unwrap()[2], DataManagerEvent::DataSetRemoved(dataset_id));
    }

    #[test]
    fn test_dropping_subscription_stops_delivery() {
        let manager = MemoryDataManager::new();
        let (events, subscriptions) = recorder(&manager);
        assert_eq!(manager.listener_count(), 6);

        drop(subscriptions);
        assert_eq!(manager.listener_count(), 0);

        manager.add_provider(DataProvider::new("local", ProviderKind::File, "/data")).unwrap();
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dataset_requires_known_provider() {
        let manager = MemoryDataManager::new();
        let result = manager.add_dataset(DataSet::new("pcd", DataSetKind::Pcd, DataProviderId(99)));
        assert!(matches!(result, Err(Terrama2Error::ProviderNotFound { id: 99 })));
    }

    #[test]
    fn test_update_provider_keeps_datasets() {
        let manager = MemoryDataManager::new();
        let id = manager.add_provider(DataProvider::new("srv", ProviderKind::Http, "http://a")).unwrap();
        manager.add_dataset(DataSet::new("pcd", DataSetKind::Pcd, id)).unwrap();

        let mut changed = manager.provider(id).unwrap();
        changed.uri = "http://b".to_string();
        changed.datasets.clear();
        manager.update_provider(changed).unwrap();

        let stored = manager.provider(id).unwrap();
        assert_eq!(stored.uri, "http://b");
        assert_eq!(stored.datasets.len(), 1);
    }

    #[test]
    fn test_update_dataset_moves_between_providers() {
        let manager = MemoryDataManager::new();
        let a = manager.add_provider(DataProvider::new("a", ProviderKind::File, "/a")).unwrap();
        let b = manager.add_provider(DataProvider::new("b", ProviderKind::File, "/b")).unwrap();
        let id = manager.add_dataset(DataSet::new("pcd", DataSetKind::Pcd, a)).unwrap();

        let mut dataset = manager.dataset(id).unwrap();
        dataset.provider = b;
        manager.update_dataset(dataset).unwrap();

        assert!(manager.provider(a).unwrap().datasets.is_empty());
        assert_eq!(manager.provider(b).unwrap().datasets.len(), 1);
    }

    #[test]
    fn test_remove_unknown_dataset() {
        let manager = MemoryDataManager::new();
        assert!(matches!(
            manager.remove_dataset(DataSetId(5)),
            Err(Terrama2Error::DatasetNotFound { id: 5 })
        ));
    }
}
