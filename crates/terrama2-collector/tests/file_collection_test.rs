//! End-to-end collection from a local directory

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use terrama2_collector::{CollectLog, CollectStatus, CollectorService, Factory, MemoryCollectLog, ServiceConfig};
use terrama2_core::models::{DataProvider, DataSet, DataSetItem, DataSetKind, ItemKind, ProviderKind};
use terrama2_store::MemoryDataManager;

async fn wait_for_entries(log: &MemoryCollectLog, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while log.entries().iter().filter(|e| e.status == CollectStatus::Imported).count() < expected
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_collects_new_files_only() {
    let data_dir = TempDir::new().unwrap();
    let pcd = data_dir.path().join("pcd");
    fs::create_dir(&pcd).unwrap();
    fs::write(pcd.join("30885_20150815_1200.txt"), "t=21.5").unwrap();
    fs::write(pcd.join("30885_20150815_1300.txt"), "t=22.0").unwrap();
    fs::write(pcd.join("30885.md"), "station notes").unwrap();

    let manager = MemoryDataManager::new();
    let uri = format!("file://{}", data_dir.path().display());
    let provider = manager
        .add_provider(DataProvider::new("local-pcd", ProviderKind::File, uri))
        .unwrap();

    let mut dataset = DataSet::new("pcd-30885", DataSetKind::Pcd, provider).with_frequency(Duration::from_millis(300));
    let mut item = DataSetItem::new(1, ItemKind::PcdInpe, "30885_%A%M%d_%h%m.txt");
    item.path = "pcd".to_string();
    dataset.items.push(item);
    manager.add_dataset(dataset).unwrap();

    let log = Arc::new(MemoryCollectLog::new());
    let download_dir = TempDir::new().unwrap();
    let factory = Arc::new(Factory::new(download_dir.path()).with_collect_log(log.clone()));
    let config = ServiceConfig {
        loop_interval: Duration::from_millis(50),
        schedule_check: Duration::from_secs(60),
        collect_on_register: true,
        download_dir: download_dir.path().to_path_buf(),
    };

    let service = CollectorService::new(Arc::new(manager.clone()), factory, config);
    service.start().unwrap();

    wait_for_entries(&log, 2).await;
    assert_eq!(log.len(), 2);

    // only data newer than what was already imported is picked up
    fs::write(pcd.join("30885_20150815_1100.txt"), "t=20.0").unwrap();
    fs::write(pcd.join("30885_20150815_1400.txt"), "t=23.1").unwrap();
    wait_for_entries(&log, 3).await;
    service.stop().await;

    let mut names: Vec<String> = log
        .entries()
        .iter()
        .map(|e| e.data.uri_storage.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "30885_20150815_1200.txt",
            "30885_20150815_1300.txt",
            "30885_20150815_1400.txt"
        ]
    );

    let item_id = log.entries()[0].data.item;
    let last = log.last_collected(item_id).unwrap();
    assert_eq!(last.to_rfc3339(), "2015-08-15T14:00:00+00:00");
}

#[tokio::test]
async fn test_missing_directory_does_not_stop_service() {
    let manager = MemoryDataManager::new();
    let provider = manager
        .add_provider(DataProvider::new("gone", ProviderKind::File, "/nonexistent/terrama2"))
        .unwrap();
    let mut dataset = DataSet::new("gone", DataSetKind::Pcd, provider).with_frequency(Duration::from_secs(3600));
    dataset.items.push(DataSetItem::new(1, ItemKind::PcdInpe, "*.txt"));
    manager.add_dataset(dataset).unwrap();

    let service = CollectorService::new(
        Arc::new(manager.clone()),
        Arc::new(Factory::default()),
        ServiceConfig {
            collect_on_register: true,
            ..ServiceConfig::default()
        },
    );
    assert_eq!(service.queued_collectors(ProviderKind::File), vec![provider]);

    service.run_pass().await;
    assert!(service.queued_collectors(ProviderKind::File).is_empty());
    assert_eq!(service.timer_count(), 1);
}
