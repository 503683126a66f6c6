//! Scheduler state shared by the service, its timers and its workers.
//!
//! Everything mutable lives in [`SchedulerState`] behind the single lock of
//! [`SharedState`]. The lock is only held to read caches or move queue
//! entries, never across an await point.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use terrama2_core::models::{DataProvider, DataProviderId, DataSet, DataSetId, ProviderKind};

use crate::collector::Collector;
use crate::timer::DataSetTimer;

/// Caches, timers and work queues of a collector service
#[derive(Debug, Default)]
pub struct SchedulerState {
    pub providers: HashMap<DataProviderId, DataProvider>,
    pub datasets: HashMap<DataSetId, DataSet>,
    pub timers: HashMap<DataSetId, DataSetTimer>,

    /// Collectors with pending work, per provider kind
    collector_queues: BTreeMap<ProviderKind, VecDeque<Arc<Collector>>>,

    /// Pending datasets, per provider
    dataset_queues: HashMap<DataProviderId, VecDeque<DataSetId>>,

    /// Kinds whose head collector is being worked on
    busy: HashSet<ProviderKind>,

    /// Providers with a worker, whatever kind they were claimed under
    busy_providers: HashSet<DataProviderId>,
}

impl SchedulerState {
    /// Queue `dataset` on `collector`.
    ///
    /// Neither the collector nor the dataset is queued twice. Returns whether
    /// the dataset was added.
    pub fn enqueue(&mut self, collector: Arc<Collector>, dataset: DataSetId) -> bool {
        let provider = collector.provider_id();
        let queue = self.collector_queues.entry(collector.kind()).or_default();
        if !queue.iter().any(|c| c.provider_id() == provider) {
            queue.push_back(collector);
        }

        let datasets = self.dataset_queues.entry(provider).or_default();
        if datasets.contains(&dataset) {
            return false;
        }
        datasets.push_back(dataset);
        true
    }

    /// Put `dataset` back at the front of its provider queue
    pub fn requeue_front(&mut self, provider: DataProviderId, dataset: DataSetId) {
        let datasets = self.dataset_queues.entry(provider).or_default();
        if !datasets.contains(&dataset) {
            datasets.push_front(dataset);
        }
    }

    /// Mark every idle kind with pending work busy and hand out its first
    /// collector whose provider is not already being worked on
    pub fn claim_ready(&mut self) -> Vec<Arc<Collector>> {
        let mut claimed = Vec::new();
        for (kind, queue) in &self.collector_queues {
            if self.busy.contains(kind) {
                continue;
            }
            if let Some(next) = queue
                .iter()
                .find(|c| !self.busy_providers.contains(&c.provider_id()))
            {
                claimed.push(next.clone());
            }
        }
        for collector in &claimed {
            self.busy.insert(collector.kind());
            self.busy_providers.insert(collector.provider_id());
        }
        claimed
    }

    /// Next pending dataset of `provider`, in arrival order
    pub fn pop_dataset(&mut self, provider: DataProviderId) -> Option<DataSetId> {
        self.dataset_queues.get_mut(&provider)?.pop_front()
    }

    /// End of a worker pass over `provider`.
    ///
    /// The collector leaves its kind queue only if nothing was queued for it
    /// meanwhile; otherwise it stays at the head for the next pass.
    pub fn release(&mut self, kind: ProviderKind, provider: DataProviderId) {
        let drained = self
            .dataset_queues
            .get(&provider)
            .map(|q| q.is_empty())
            .unwrap_or(true);

        if drained {
            self.dataset_queues.remove(&provider);
            self.remove_from_kind_queues(provider);
        }
        self.busy.remove(&kind);
        self.busy_providers.remove(&provider);
    }

    /// Drop `provider` and its pending datasets from the queues and free its kind
    pub fn discard(&mut self, kind: ProviderKind, provider: DataProviderId) {
        self.dataset_queues.remove(&provider);
        self.remove_from_kind_queues(provider);
        self.busy.remove(&kind);
        self.busy_providers.remove(&provider);
    }

    /// Forget all queued work of `provider` without touching busy flags
    pub fn purge_provider(&mut self, provider: DataProviderId) -> Vec<DataSetId> {
        self.remove_from_kind_queues(provider);
        self.dataset_queues
            .remove(&provider)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Forget `dataset` wherever it is queued
    pub fn purge_dataset(&mut self, dataset: DataSetId) {
        for queue in self.dataset_queues.values_mut() {
            queue.retain(|d| *d != dataset);
        }
    }

    /// Swap the queued collector of a provider for `collector`, keeping its
    /// pending datasets.
    ///
    /// A worker still holding the old collector keeps the provider claimed,
    /// so the new one is not handed out before that worker releases it.
    pub fn replace_collector(&mut self, collector: Arc<Collector>) {
        let provider = collector.provider_id();
        self.remove_from_kind_queues(provider);

        let pending = self
            .dataset_queues
            .get(&provider)
            .map(|q| !q.is_empty())
            .unwrap_or(false);
        if pending {
            self.collector_queues
                .entry(collector.kind())
                .or_default()
                .push_back(collector);
        }
    }

    /// Drop the timer and cached dataset of `dataset` and any queued entry
    pub fn deregister(&mut self, dataset: DataSetId) -> bool {
        let had_timer = self.timers.remove(&dataset).is_some();
        let had_dataset = self.datasets.remove(&dataset).is_some();
        self.purge_dataset(dataset);
        had_timer || had_dataset
    }

    pub fn queued_collectors(&self, kind: ProviderKind) -> Vec<DataProviderId> {
        self.collector_queues
            .get(&kind)
            .map(|q| q.iter().map(|c| c.provider_id()).collect())
            .unwrap_or_default()
    }

    pub fn queued_datasets(&self, provider: DataProviderId) -> Vec<DataSetId> {
        self.dataset_queues
            .get(&provider)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn is_busy(&self, kind: ProviderKind) -> bool {
        self.busy.contains(&kind)
    }

    #[cfg(test)]
    fn is_provider_busy(&self, provider: DataProviderId) -> bool {
        self.busy_providers.contains(&provider)
    }

    /// Providers may change kind while queued, so every kind queue is searched
    fn remove_from_kind_queues(&mut self, provider: DataProviderId) {
        for queue in self.collector_queues.values_mut() {
            queue.retain(|c| c.provider_id() != provider);
        }
        self.collector_queues.retain(|_, q| !q.is_empty());
    }
}

/// The one lock around [`SchedulerState`]
#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<SchedulerState>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the state locked
    pub fn with<R>(&self, f: impl FnOnce(&mut SchedulerState) -> R) -> R {
        let mut state = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }
}

/// Claim on a provider kind held by a worker.
///
/// Dropping an unfinished lease (a panicking worker) releases the kind so the
/// scheduler keeps going.
pub struct KindLease {
    state: Arc<SharedState>,
    kind: ProviderKind,
    provider: DataProviderId,
    done: bool,
}

impl KindLease {
    pub fn new(state: Arc<SharedState>, collector: &Collector) -> Self {
        Self {
            state,
            kind: collector.kind(),
            provider: collector.provider_id(),
            done: false,
        }
    }

    pub fn release(mut self) {
        self.done = true;
        self.state.with(|s| s.release(self.kind, self.provider));
    }

    pub fn discard(mut self) {
        self.done = true;
        self.state.with(|s| s.discard(self.kind, self.provider));
    }
}

impl Drop for KindLease {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!(kind = %self.kind, provider_id = %self.provider, "Worker ended abnormally, releasing kind");
            self.state.with(|s| s.release(self.kind, self.provider));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect_log::MemoryCollectLog;
    use crate::retriever::FileRetriever;
    use terrama2_core::models::DataProvider;

    fn collector(id: u64, kind: ProviderKind) -> Arc<Collector> {
        let provider = DataProvider::new(format!("p{}", id), kind, "/data").with_id(id);
        let retriever = Box::new(FileRetriever::new(&provider));
        Arc::new(Collector::new(provider, retriever, Arc::new(MemoryCollectLog::new())))
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut state = SchedulerState::default();
        let c1 = collector(1, ProviderKind::File);

        assert!(state.enqueue(c1.clone(), DataSetId(1)));
        assert!(!state.enqueue(c1.clone(), DataSetId(1)));
        assert!(state.enqueue(c1, DataSetId(2)));

        assert_eq!(state.queued_collectors(ProviderKind::File), vec![DataProviderId(1)]);
        assert_eq!(state.queued_datasets(DataProviderId(1)), vec![DataSetId(1), DataSetId(2)]);
    }

    #[test]
    fn test_one_claim_per_kind() {
        let mut state = SchedulerState::default();
        state.enqueue(collector(1, ProviderKind::Ftp), DataSetId(1));
        state.enqueue(collector(2, ProviderKind::Ftp), DataSetId(2));
        state.enqueue(collector(3, ProviderKind::File), DataSetId(3));

        let claimed: Vec<_> = state.claim_ready().iter().map(|c| c.provider_id()).collect();
        assert_eq!(claimed.len(), 2);
        assert!(claimed.contains(&DataProviderId(1)));
        assert!(claimed.contains(&DataProviderId(3)));
        assert!(state.claim_ready().is_empty());

        state.pop_dataset(DataProviderId(1));
        state.release(ProviderKind::Ftp, DataProviderId(1));
        let claimed: Vec<_> = state.claim_ready().iter().map(|c| c.provider_id()).collect();
        assert_eq!(claimed, vec![DataProviderId(2)]);
    }

    #[test]
    fn test_release_keeps_collector_with_new_work() {
        let mut state = SchedulerState::default();
        let c1 = collector(1, ProviderKind::File);
        state.enqueue(c1.clone(), DataSetId(1));
        state.claim_ready();

        assert_eq!(state.pop_dataset(DataProviderId(1)), Some(DataSetId(1)));
        state.enqueue(c1, DataSetId(2));
        state.release(ProviderKind::File, DataProviderId(1));

        assert!(!state.is_busy(ProviderKind::File));
        assert_eq!(state.queued_collectors(ProviderKind::File), vec![DataProviderId(1)]);
        assert_eq!(state.queued_datasets(DataProviderId(1)), vec![DataSetId(2)]);
    }

    #[test]
    fn test_discard_drops_pending_work() {
        let mut state = SchedulerState::default();
        state.enqueue(collector(1, ProviderKind::Ftp), DataSetId(1));
        state.claim_ready();
        state.discard(ProviderKind::Ftp, DataProviderId(1));

        assert!(state.queued_collectors(ProviderKind::Ftp).is_empty());
        assert!(state.queued_datasets(DataProviderId(1)).is_empty());
        assert!(!state.is_busy(ProviderKind::Ftp));
    }

    #[test]
    fn test_replace_collector_moves_kind() {
        let mut state = SchedulerState::default();
        state.enqueue(collector(1, ProviderKind::Ftp), DataSetId(1));
        state.replace_collector(collector(1, ProviderKind::File));

        assert!(state.queued_collectors(ProviderKind::Ftp).is_empty());
        assert_eq!(state.queued_collectors(ProviderKind::File), vec![DataProviderId(1)]);
        assert_eq!(state.queued_datasets(DataProviderId(1)), vec![DataSetId(1)]);
    }

    #[test]
    fn test_kind_change_waits_for_running_worker() {
        let mut state = SchedulerState::default();
        state.enqueue(collector(1, ProviderKind::Ftp), DataSetId(1));
        state.enqueue(collector(1, ProviderKind::Ftp), DataSetId(2));
        let claimed = state.claim_ready();
        assert_eq!(claimed.len(), 1);
        assert_eq!(state.pop_dataset(DataProviderId(1)), Some(DataSetId(1)));

        // The provider moves to FILE while its FTP worker is still draining
        state.replace_collector(collector(1, ProviderKind::File));
        assert_eq!(state.queued_collectors(ProviderKind::File), vec![DataProviderId(1)]);
        assert!(state.claim_ready().is_empty());
        assert!(state.is_provider_busy(DataProviderId(1)));

        state.release(ProviderKind::Ftp, DataProviderId(1));
        assert!(!state.is_busy(ProviderKind::Ftp));
        let claimed = state.claim_ready();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].kind(), ProviderKind::File);
        assert_eq!(state.pop_dataset(DataProviderId(1)), Some(DataSetId(2)));
    }

    #[test]
    fn test_busy_provider_does_not_block_its_new_kind() {
        let mut state = SchedulerState::default();
        state.enqueue(collector(1, ProviderKind::Ftp), DataSetId(1));
        state.claim_ready();
        state.replace_collector(collector(1, ProviderKind::File));
        state.enqueue(collector(2, ProviderKind::File), DataSetId(2));

        let claimed: Vec<_> = state.claim_ready().iter().map(|c| c.provider_id()).collect();
        assert_eq!(claimed, vec![DataProviderId(2)]);
    }

    #[test]
    fn test_dropped_lease_releases_kind() {
        let state = Arc::new(SharedState::new());
        let c1 = collector(1, ProviderKind::File);
        state.with(|s| s.enqueue(c1.clone(), DataSetId(1)));
        state.with(|s| s.claim_ready());

        let lease = KindLease::new(state.clone(), &c1);
        drop(lease);
        assert!(!state.with(|s| s.is_busy(ProviderKind::File)));
        assert!(!state.with(|s| s.is_provider_busy(DataProviderId(1))));
    }
}
