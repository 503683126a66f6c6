//! The collector service: keeps one timer per dataset, queues datasets when
//! their timer fires and drains the queues in the background.
//!
//! Every provider kind is worked on by at most one task at a time. A task
//! opens the head collector of its kind, collects its pending datasets in
//! arrival order and closes it, so a slow or broken provider never holds up
//! providers of other kinds.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use terrama2_core::models::{DataProvider, DataProviderId, DataSet, DataSetId, ProviderKind};
use terrama2_core::ports::{DataManager, DataManagerEvent, EventKind, EventListener, Subscription};

use crate::collector::Collector;
use crate::config::ServiceConfig;
use crate::error::{CollectorError, Result};
use crate::factory::Factory;
use crate::queue::{KindLease, SchedulerState, SharedState};
use crate::timer::{DataSetTimer, TimerCallback, TimerMode};

struct Inner {
    factory: Arc<Factory>,
    config: ServiceConfig,
    state: Arc<SharedState>,
    wakeup: Notify,
}

struct Worker {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// Collection scheduler.
///
/// Must be created inside a tokio runtime: dataset timers are tokio tasks.
pub struct CollectorService {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
    _subscriptions: Vec<Subscription>,
}

impl CollectorService {
    /// Subscribe to `data_manager` and register what it already holds
    pub fn new(data_manager: Arc<dyn DataManager>, factory: Arc<Factory>, config: ServiceConfig) -> Self {
        let inner = Arc::new(Inner {
            factory,
            config,
            state: Arc::new(SharedState::new()),
            wakeup: Notify::new(),
        });

        let weak = Arc::downgrade(&inner);
        let listener: EventListener = Arc::new(move |event: &DataManagerEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        });
        let subscriptions = EventKind::ALL
            .iter()
            .map(|kind| data_manager.subscribe(*kind, listener.clone()))
            .collect();

        for provider in data_manager.providers() {
            inner.add_provider(provider);
        }
        for dataset in data_manager.datasets() {
            inner.add_dataset(dataset);
        }

        Self {
            inner,
            worker: Mutex::new(None),
            _subscriptions: subscriptions,
        }
    }

    /// Launch the scheduling loop on the current runtime
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Err(CollectorError::ServiceAlreadyRunning);
        }

        let runtime = Handle::try_current().map_err(|e| CollectorError::UnableToStartService(e.to_string()))?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(processing_loop(self.inner.clone(), stop_rx));
        *worker = Some(Worker { handle, stop_tx });

        tracing::info!(loop_interval_ms = self.inner.config.loop_interval.as_millis() as u64, "Collector service started");
        Ok(())
    }

    /// Stop the loop and wait for in-flight collections. No-op when not running.
    pub async fn stop(&self) {
        let Some(worker) = self.worker().take() else {
            return;
        };

        let _ = worker.stop_tx.send(true);
        if let Err(e) = worker.handle.await {
            tracing::error!(error = %e, "Collector service loop ended abnormally");
        }
        tracing::info!("Collector service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker().as_ref().is_some_and(|w| !w.handle.is_finished())
    }

    pub fn add_provider(&self, provider: DataProvider) {
        self.inner.add_provider(provider);
    }

    pub fn remove_provider(&self, provider: &DataProvider) {
        self.inner.remove_provider(provider);
    }

    pub fn update_provider(&self, provider: DataProvider) {
        self.inner.update_provider(provider);
    }

    /// Register a timer for `dataset`; `None` when the dataset cannot be scheduled
    pub fn add_dataset(&self, dataset: DataSet) -> Option<TimerMode> {
        self.inner.add_dataset(dataset)
    }

    pub fn remove_dataset(&self, dataset: &DataSet) {
        self.inner.remove_dataset(dataset.id());
    }

    pub fn remove_dataset_by_id(&self, id: DataSetId) {
        self.inner.remove_dataset(id);
    }

    pub fn update_dataset(&self, dataset: DataSet) -> Option<TimerMode> {
        self.inner.update_dataset(dataset)
    }

    /// Queue `id` for collection, as its timer does when it fires
    pub fn add_to_queue(&self, id: DataSetId) {
        self.inner.add_to_queue(id);
    }

    /// Claim every ready provider kind, run its worker and wait for all of them
    pub async fn run_pass(&self) {
        let mut workers = JoinSet::new();
        dispatch(&self.inner, &mut workers);
        while let Some(result) = workers.join_next().await {
            log_join(result);
        }
    }

    pub fn timer_count(&self) -> usize {
        self.inner.state.with(|s| s.timers.len())
    }

    pub fn has_timer(&self, id: DataSetId) -> bool {
        self.inner.state.with(|s| s.timers.contains_key(&id))
    }

    pub fn has_provider(&self, id: DataProviderId) -> bool {
        self.inner.state.with(|s| s.providers.contains_key(&id))
    }

    pub fn queued_collectors(&self, kind: ProviderKind) -> Vec<DataProviderId> {
        self.inner.state.with(|s| s.queued_collectors(kind))
    }

    pub fn queued_datasets(&self, provider: DataProviderId) -> Vec<DataSetId> {
        self.inner.state.with(|s| s.queued_datasets(provider))
    }

    pub fn factory(&self) -> &Arc<Factory> {
        &self.inner.factory
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CollectorService {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            let _ = worker.stop_tx.send(true);
            worker.handle.abort();
        }
    }
}

impl Inner {
    fn handle_event(self: &Arc<Self>, event: &DataManagerEvent) {
        match event {
            DataManagerEvent::ProviderAdded(provider) => self.add_provider(provider.clone()),
            DataManagerEvent::ProviderRemoved(provider) => self.remove_provider(provider),
            DataManagerEvent::ProviderUpdated(provider) => self.update_provider(provider.clone()),
            DataManagerEvent::DataSetAdded(dataset) => {
                self.add_dataset(dataset.clone());
            }
            DataManagerEvent::DataSetRemoved(id) => self.remove_dataset(*id),
            DataManagerEvent::DataSetUpdated(dataset) => {
                self.update_dataset(dataset.clone());
            }
        }
    }

    fn add_provider(&self, provider: DataProvider) {
        let id = provider.id();
        if !id.is_valid() {
            tracing::warn!(provider = %provider.name, "Ignoring provider without id");
            return;
        }

        tracing::debug!(provider_id = %id, provider = %provider.name, kind = %provider.kind, "Provider registered");
        let waiting = self.state.with(|s| {
            let known = s.providers.insert(id, provider).is_some();
            if known {
                Vec::new()
            } else {
                waiting_datasets(s, id)
            }
        });
        self.queue_waiting(id, waiting);
    }

    /// Datasets registered before their provider get their first collection
    /// once it arrives
    fn queue_waiting(&self, provider: DataProviderId, waiting: Vec<DataSetId>) {
        if !self.config.collect_on_register || waiting.is_empty() {
            return;
        }
        tracing::debug!(provider_id = %provider, datasets = waiting.len(), "Queueing datasets waiting for their provider");
        for dataset in waiting {
            self.add_to_queue(dataset);
        }
    }

    fn remove_provider(&self, provider: &DataProvider) {
        let id = provider.id();
        let removed = self.state.with(|s| {
            let mut datasets: Vec<DataSetId> = s
                .datasets
                .values()
                .filter(|d| d.provider == id)
                .map(|d| d.id())
                .collect();
            datasets.extend(provider.datasets.iter().map(|d| d.id()));
            datasets.sort();
            datasets.dedup();

            for dataset in &datasets {
                s.deregister(*dataset);
            }
            s.purge_provider(id);
            s.providers.remove(&id);
            datasets
        });

        self.factory.remove_collector(id);
        tracing::info!(provider_id = %id, datasets = removed.len(), "Provider removed");
    }

    fn update_provider(&self, provider: DataProvider) {
        let id = provider.id();
        if !id.is_valid() {
            tracing::warn!(provider = %provider.name, "Ignoring provider without id");
            return;
        }

        // Evict, recreate and cache under the state lock so a timer firing
        // meanwhile cannot rebuild the collector from the old provider
        let active = provider.is_active();
        let waiting = self.state.with(|s| {
            self.factory.remove_collector(id);
            if active {
                match self.factory.get_collector(&provider) {
                    Ok(collector) => s.replace_collector(collector),
                    Err(e) => {
                        tracing::warn!(provider_id = %id, error = %e, "Unable to recreate collector");
                        s.purge_provider(id);
                    }
                }
            } else {
                s.purge_provider(id);
            }

            let known = s.providers.insert(id, provider).is_some();
            if known {
                Vec::new()
            } else {
                waiting_datasets(s, id)
            }
        });
        tracing::info!(provider_id = %id, active, "Provider updated");
        self.queue_waiting(id, waiting);
        self.wakeup.notify_one();
    }

    fn add_dataset(self: &Arc<Self>, dataset: DataSet) -> Option<TimerMode> {
        let id = dataset.id();
        if !id.is_valid() {
            tracing::debug!(dataset = %dataset.name, "Ignoring dataset without id");
            return None;
        }
        if !dataset.is_active() {
            tracing::debug!(dataset_id = %id, "Ignoring inactive dataset");
            return None;
        }

        let weak: Weak<Inner> = Arc::downgrade(self);
        let callback: TimerCallback = Arc::new(move |dataset| {
            if let Some(inner) = weak.upgrade() {
                inner.add_to_queue(dataset);
            }
        });

        let timer = match DataSetTimer::new(&dataset, self.config.schedule_check, callback) {
            Ok(timer) => timer,
            Err(e) => {
                tracing::error!(dataset_id = %id, dataset = %dataset.name, error = %e, "Unable to schedule dataset");
                return None;
            }
        };
        let mode = timer.mode();
        let provider = dataset.provider;

        tracing::info!(dataset_id = %id, dataset = %dataset.name, mode = %mode, "Dataset scheduled");
        let provider_known = self.state.with(|s| {
            s.datasets.insert(id, dataset);
            s.timers.insert(id, timer);
            s.providers.contains_key(&provider)
        });

        if !provider_known {
            tracing::debug!(dataset_id = %id, provider_id = %provider, "Provider not registered yet, dataset waits for it");
        } else if self.config.collect_on_register {
            self.add_to_queue(id);
        }
        Some(mode)
    }

    fn remove_dataset(&self, id: DataSetId) {
        if self.state.with(|s| s.deregister(id)) {
            tracing::info!(dataset_id = %id, "Dataset unscheduled");
        }
    }

    fn update_dataset(self: &Arc<Self>, dataset: DataSet) -> Option<TimerMode> {
        self.remove_dataset(dataset.id());
        self.add_dataset(dataset)
    }

    fn add_to_queue(&self, id: DataSetId) {
        let queued = self.state.with(|s| {
            let Some(provider_id) = s.datasets.get(&id).map(|d| d.provider) else {
                tracing::warn!(dataset_id = %id, "Unknown dataset fired, unscheduling it");
                s.deregister(id);
                return false;
            };
            let Some(provider) = s.providers.get(&provider_id) else {
                tracing::warn!(dataset_id = %id, provider_id = %provider_id, "Dataset provider not found, unscheduling it");
                s.deregister(id);
                return false;
            };
            if !provider.is_active() {
                tracing::info!(dataset_id = %id, provider_id = %provider_id, "Provider inactive, dataset not queued");
                return false;
            }

            match self.factory.get_collector(provider) {
                Ok(collector) => s.enqueue(collector, id),
                Err(CollectorError::InvalidArgument(reason)) => {
                    tracing::warn!(dataset_id = %id, reason = %reason, "Invalid provider, unscheduling dataset");
                    s.deregister(id);
                    false
                }
                Err(e) => {
                    tracing::warn!(dataset_id = %id, provider_id = %provider_id, error = %e, "Dataset not queued");
                    false
                }
            }
        });

        if queued {
            tracing::debug!(dataset_id = %id, "Dataset queued");
            self.wakeup.notify_one();
        }
    }
}

async fn processing_loop(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    let mut workers = JoinSet::new();
    loop {
        if *stop_rx.borrow() {
            break;
        }

        dispatch(&inner, &mut workers);

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = inner.wakeup.notified() => {}
            Some(result) = workers.join_next() => log_join(result),
            _ = tokio::time::sleep(inner.config.loop_interval) => {}
        }
    }

    while let Some(result) = workers.join_next().await {
        log_join(result);
    }
}

/// Cached datasets of `provider`
fn waiting_datasets(state: &SchedulerState, provider: DataProviderId) -> Vec<DataSetId> {
    let mut datasets: Vec<DataSetId> = state
        .datasets
        .values()
        .filter(|d| d.provider == provider)
        .map(|d| d.id())
        .collect();
    datasets.sort();
    datasets
}

fn dispatch(inner: &Arc<Inner>, workers: &mut JoinSet<()>) {
    let claimed = inner.state.with(|s| s.claim_ready());
    for collector in claimed {
        let lease = KindLease::new(inner.state.clone(), &collector);
        workers.spawn(drain(inner.clone(), collector, lease));
    }
}

/// Open, drain and close one collector
async fn drain(inner: Arc<Inner>, collector: Arc<Collector>, lease: KindLease) {
    let provider = collector.provider_id();

    if let Err(e) = collector.open().await {
        tracing::warn!(provider_id = %provider, kind = %collector.kind(), error = %e, "Unable to open collector");
        collector.close().await;
        lease.discard();
        return;
    }
    tracing::debug!(provider_id = %provider, "Collector opened");

    while !collector.is_collecting() {
        if !is_current(&inner, &collector) {
            tracing::debug!(provider_id = %provider, "Collector replaced, leaving the rest to the new one");
            break;
        }
        let Some(id) = inner.state.with(|s| s.pop_dataset(provider)) else {
            break;
        };
        let Some(dataset) = inner.state.with(|s| s.datasets.get(&id).cloned()) else {
            tracing::debug!(dataset_id = %id, "Dataset removed while queued");
            continue;
        };

        match collector.collect(&dataset).await {
            Ok(true) => {}
            Ok(false) => {
                inner.state.with(|s| s.requeue_front(provider, id));
                break;
            }
            Err(e) => {
                tracing::warn!(provider_id = %provider, dataset_id = %id, error = %e, "Dataset collection failed");
            }
        }
    }

    collector.close().await;
    lease.release();
    tracing::debug!(provider_id = %provider, "Collector closed");
}

/// Whether `collector` is still the one the factory hands out for its provider
fn is_current(inner: &Inner, collector: &Arc<Collector>) -> bool {
    inner
        .factory
        .collector(collector.provider_id())
        .is_some_and(|current| Arc::ptr_eq(&current, collector))
}

fn log_join(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Unknown error in collector worker");
        }
    }
}
