//! One collector per provider, created on demand.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use terrama2_core::models::{DataProvider, DataProviderId, ProviderKind};

use crate::collect_log::{CollectLog, MemoryCollectLog};
use crate::collector::Collector;
use crate::error::{CollectorError, Result};
use crate::retriever::{DataRetriever, FileRetriever, FtpRetriever, HttpRetriever};

/// Builds the retriever of a provider
pub type RetrieverBuilder = Arc<dyn Fn(&DataProvider) -> Result<Box<dyn DataRetriever>> + Send + Sync>;

/// Registry of live collectors keyed by provider id
pub struct Factory {
    builders: HashMap<ProviderKind, RetrieverBuilder>,
    collectors: Mutex<HashMap<DataProviderId, Arc<Collector>>>,
    collect_log: Arc<dyn CollectLog>,
}

impl Factory {
    /// Factory with the built-in retrievers.
    ///
    /// FILE providers are read in place; FTP, HTTP, WFS, WCS and SOS providers
    /// are downloaded under `download_dir`.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        let download_dir = download_dir.into();
        let mut factory = Self::empty().with_builder(ProviderKind::File, |provider| {
            Ok(Box::new(FileRetriever::new(provider)) as Box<dyn DataRetriever>)
        });

        let dir = download_dir.clone();
        factory = factory.with_builder(ProviderKind::Ftp, move |provider| {
            Ok(Box::new(FtpRetriever::new(provider, dir.clone())) as Box<dyn DataRetriever>)
        });

        for kind in [ProviderKind::Http, ProviderKind::Wfs, ProviderKind::Wcs, ProviderKind::Sos] {
            let dir = download_dir.clone();
            factory = factory.with_builder(kind, move |provider| {
                Ok(Box::new(HttpRetriever::new(provider, dir.clone())) as Box<dyn DataRetriever>)
            });
        }
        factory
    }

    /// Factory without any retriever
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
            collectors: Mutex::new(HashMap::new()),
            collect_log: Arc::new(MemoryCollectLog::new()),
        }
    }

    /// Use `builder` for providers of `kind`, replacing any previous one
    pub fn with_builder<F>(mut self, kind: ProviderKind, builder: F) -> Self
    where
        F: Fn(&DataProvider) -> Result<Box<dyn DataRetriever>> + Send + Sync + 'static,
    {
        self.builders.insert(kind, Arc::new(builder));
        self
    }

    pub fn with_collect_log(mut self, collect_log: Arc<dyn CollectLog>) -> Self {
        self.collect_log = collect_log;
        self
    }

    pub fn supports(&self, kind: ProviderKind) -> bool {
        self.builders.contains_key(&kind)
    }

    pub fn collect_log(&self) -> Arc<dyn CollectLog> {
        self.collect_log.clone()
    }

    /// The collector of `provider`, created if needed
    pub fn get_collector(&self, provider: &DataProvider) -> Result<Arc<Collector>> {
        let id = provider.id();
        if !id.is_valid() {
            return Err(CollectorError::InvalidArgument(format!(
                "provider '{}' has no id",
                provider.name
            )));
        }

        let mut collectors = self.lock();
        if let Some(collector) = collectors.get(&id) {
            return Ok(collector.clone());
        }

        let builder = self
            .builders
            .get(&provider.kind)
            .ok_or(CollectorError::UnsupportedProviderKind { kind: provider.kind })?;
        let retriever = builder(provider)?;
        let collector = Arc::new(Collector::new(provider.clone(), retriever, self.collect_log.clone()));
        collectors.insert(id, collector.clone());

        tracing::debug!(provider_id = %id, kind = %provider.kind, "Collector created");
        Ok(collector)
    }

    /// Registered collector of `id`, if any
    pub fn collector(&self, id: DataProviderId) -> Option<Arc<Collector>> {
        self.lock().get(&id).cloned()
    }

    /// Forget the collector of `id`.
    ///
    /// Queued or in-flight users keep their handle until they are done with it.
    pub fn remove_collector(&self, id: DataProviderId) -> Option<Arc<Collector>> {
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            tracing::debug!(provider_id = %id, "Collector removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DataProviderId, Arc<Collector>>> {
        self.collectors.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("terrama2"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_is_reused() {
        let factory = Factory::default();
        let provider = DataProvider::new("local", ProviderKind::File, "/data").with_id(1);

        let first = factory.get_collector(&provider).unwrap();
        let second = factory.get_collector(&provider).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.len(), 1);
        assert_eq!(first.kind(), ProviderKind::File);
    }

    #[test]
    fn test_remove_then_recreate() {
        let factory = Factory::default();
        let provider = DataProvider::new("local", ProviderKind::File, "/data").with_id(1);

        let first = factory.get_collector(&provider).unwrap();
        assert!(factory.remove_collector(provider.id()).is_some());
        assert!(factory.collector(provider.id()).is_none());
        assert!(factory.remove_collector(provider.id()).is_none());

        let second = factory.get_collector(&provider).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalid_and_unsupported_providers() {
        let factory = Factory::default();

        let no_id = DataProvider::new("local", ProviderKind::File, "/data");
        assert!(matches!(
            factory.get_collector(&no_id),
            Err(CollectorError::InvalidArgument(_))
        ));

        let unknown = DataProvider::new("legacy", ProviderKind::Unknown, "sftp://example.org").with_id(2);
        assert!(!factory.supports(ProviderKind::Unknown));
        assert!(matches!(
            factory.get_collector(&unknown),
            Err(CollectorError::UnsupportedProviderKind { kind: ProviderKind::Unknown })
        ));
        assert!(factory.is_empty());
    }

    #[test]
    fn test_builtin_transports() {
        let factory = Factory::new("/tmp/terrama2");
        for kind in [
            ProviderKind::File,
            ProviderKind::Ftp,
            ProviderKind::Http,
            ProviderKind::Wfs,
            ProviderKind::Wcs,
            ProviderKind::Sos,
        ] {
            assert!(factory.supports(kind), "{} should be supported", kind);
        }

        let ftp = DataProvider::new("cptec", ProviderKind::Ftp, "ftp://ftp.example.org/pub").with_id(3);
        let collector = factory.get_collector(&ftp).unwrap();
        assert_eq!(collector.kind(), ProviderKind::Ftp);
        assert!(!collector.is_open());
        assert!(Factory::empty().is_empty());
    }
}
