//! Shared setup for grid-core integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use grid_core::sync::RetryPolicy;
use grid_core::{
    CycleOutcome, CycleReport, MemoryRemote, StaticCredential, SyncEvent, SyncEventHandler,
    SyncOptions, SyncService,
};
use grid_test_utils::TestWorkspace;

pub const API_KEY: &str = "grid_test_key";

/// Collects every event for later assertions.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncEventHandler for RecordingHandler {
    fn on_event(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn options() -> SyncOptions {
    SyncOptions {
        create_if_missing: true,
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(3).with_initial_interval(Duration::from_millis(1)),
        ..SyncOptions::default()
    }
}

pub fn client(ws: &TestWorkspace, remote: &Arc<MemoryRemote>) -> SyncService {
    client_with(ws, remote, options())
}

pub fn client_with(ws: &TestWorkspace, remote: &Arc<MemoryRemote>, options: SyncOptions) -> SyncService {
    SyncService::open(
        ws.root(),
        remote.clone(),
        Arc::new(StaticCredential(Some(API_KEY.to_string()))),
        options,
    )
    .unwrap()
}

/// Run a cycle and return its report, failing the test if it did not run.
pub async fn sync(service: &SyncService) -> CycleReport {
    match service.sync_now().await {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

/// Run a cycle that must succeed.
pub async fn sync_ok(service: &SyncService) -> CycleReport {
    let report = sync(service).await;
    assert!(report.is_success(), "cycle failed: {:?}", report.failure);
    report
}
