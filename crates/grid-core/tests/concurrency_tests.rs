//! Single-flight cycles, retries, timeouts and the auto-sync timer

mod common;

use std::sync::Arc;
use std::time::Duration;

use grid_core::sync::RetryPolicy;
use grid_core::{
    AuthService, AutoSync, CycleOutcome, MemoryCredentialStore, MemoryRemote, SyncErrorKind,
    SyncEvent, SyncOptions, SyncService,
};
use grid_test_utils::TestWorkspace;
use pretty_assertions::assert_eq;

use common::{API_KEY, RecordingHandler, client, client_with, options, sync, sync_ok};

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

mod single_flight {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let ws = TestWorkspace::new();
        ws.write("a.md", "alpha");
        let remote = Arc::new(MemoryRemote::new());
        remote.set_latency(Duration::from_millis(100));
        let handler = Arc::new(RecordingHandler::default());
        let service = client(&ws, &remote).with_handler(handler.clone());

        let (first, second) = tokio::join!(service.sync_now(), service.sync_now());

        assert!(matches!(first, CycleOutcome::Completed(_)));
        assert_eq!(second, CycleOutcome::Skipped);
        assert_eq!(remote.sync_calls(), 1);
        assert!(handler.events().contains(&SyncEvent::CycleSkipped));
    }

    #[tokio::test]
    async fn test_binding_holds_the_gate() {
        let ws = TestWorkspace::new();
        ws.write("a.md", "alpha");
        let remote = Arc::new(MemoryRemote::new());
        remote.set_latency(Duration::from_millis(100));
        let service = client(&ws, &remote);

        let (bound, cycle) = tokio::join!(service.bind_workspace(), service.sync_now());

        assert_eq!(bound.unwrap().name, "workspace");
        assert_eq!(cycle, CycleOutcome::Skipped);
        assert_eq!(remote.sync_calls(), 0);

        // Once bound, the next cycle goes straight to the round trip
        sync_ok(&service).await;
        assert_eq!(remote.sync_calls(), 1);
    }

    #[tokio::test]
    async fn test_gate_reopens_after_cycle() {
        let ws = TestWorkspace::new();
        let remote = Arc::new(MemoryRemote::new());
        let service = client(&ws, &remote);

        sync_ok(&service).await;
        sync_ok(&service).await;
        assert_eq!(remote.sync_calls(), 2);
    }

    #[tokio::test]
    async fn test_events_bracket_each_cycle() {
        let ws = TestWorkspace::new();
        ws.write("a.md", "alpha");
        let remote = Arc::new(MemoryRemote::new());
        let handler = Arc::new(RecordingHandler::default());
        let service = client(&ws, &remote).with_handler(handler.clone());

        sync_ok(&service).await;

        let events = handler.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SyncEvent::CycleStarted);
        assert!(matches!(
            events[1],
            SyncEvent::CycleSucceeded {
                accepted: 1,
                downloaded: 0,
                ..
            }
        ));
    }
}

mod retries {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let ws = TestWorkspace::new();
        ws.write("a.md", "alpha");
        let remote = Arc::new(MemoryRemote::new());
        remote.fail_network(2);
        let service = client(&ws, &remote);

        let report = sync_ok(&service).await;
        assert_eq!(report.accepted, vec!["a.md".to_string()]);
        assert_eq!(remote.sync_calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_without_state_change() {
        let ws = TestWorkspace::new();
        ws.write("a.md", "alpha");
        let remote = Arc::new(MemoryRemote::new());
        remote.fail_network(10);
        let handler = Arc::new(RecordingHandler::default());
        let service = client(&ws, &remote).with_handler(handler.clone());

        let report = sync(&service).await;
        let failure = report.failure.unwrap();
        assert_eq!(failure.kind, SyncErrorKind::Network);
        assert_eq!(remote.sync_calls(), 3);
        assert_eq!(remote.revision(), 0);

        let status = service.status().await.unwrap();
        assert_eq!(status.cursor, None);
        assert_eq!(status.tracked, 0);
        assert!(matches!(
            handler.events().last(),
            Some(SyncEvent::CycleFailed {
                kind: SyncErrorKind::Network,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_auth_denial_is_not_retried() {
        let ws = TestWorkspace::new();
        let remote = Arc::new(MemoryRemote::new());
        let service = client(&ws, &remote);
        sync_ok(&service).await;

        remote.deny_access("Upgrade to Pro to use this feature");
        let report = sync(&service).await;

        let failure = report.failure.unwrap();
        assert_eq!(failure.kind, SyncErrorKind::Auth);
        assert!(failure.message.contains("Upgrade to Pro"));
        assert_eq!(remote.sync_calls(), 2);
    }

    #[tokio::test]
    async fn test_slow_round_trip_times_out() {
        let ws = TestWorkspace::new();
        let remote = Arc::new(MemoryRemote::new());
        remote.set_latency(Duration::from_millis(500));
        let service = client_with(
            &ws,
            &remote,
            SyncOptions {
                request_timeout: Duration::from_millis(50),
                retry: RetryPolicy::new(1),
                ..options()
            },
        );

        let report = sync(&service).await;
        let failure = report.failure.unwrap();
        assert_eq!(failure.kind, SyncErrorKind::Network);
        assert!(failure.message.contains("timed out"));
    }
}

mod auto_sync {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_timer_runs_cycles_until_logout() {
        let ws = TestWorkspace::new();
        ws.write("a.md", "alpha");
        let remote = Arc::new(MemoryRemote::new());
        let auth = Arc::new(AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            remote.clone(),
        ));
        auth.login(API_KEY).await.unwrap();

        let service =
            Arc::new(SyncService::open(ws.root(), remote.clone(), auth.clone(), options()).unwrap());
        let auto = AutoSync::start(service, Duration::from_millis(20));
        let watcher = auto.stop_on_logout(auth.subscribe());

        wait_for(|| remote.sync_calls() >= 2).await;
        auth.logout().unwrap();
        watcher.await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), auto.join())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = remote.sync_calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(remote.sync_calls(), calls);
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let ws = TestWorkspace::new();
        ws.write("a.md", "alpha");
        let remote = Arc::new(MemoryRemote::new());
        remote.set_latency(Duration::from_millis(100));
        let service = Arc::new(client(&ws, &remote));

        let auto = AutoSync::start(Arc::clone(&service), Duration::from_millis(10));
        wait_for(|| remote.sync_calls() >= 1).await;
        auto.stop();
        auto.join().await;

        // The cycle already talking to the server still commits
        wait_for(|| remote.revision() == 1).await;
        let status = loop {
            let status = service.status().await.unwrap();
            if status.cursor.is_some() {
                break status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(status.cursor.as_deref(), Some("rev-1"));
        assert_eq!(status.tracked, 1);
    }

    #[tokio::test]
    async fn test_first_cycle_waits_one_interval() {
        let ws = TestWorkspace::new();
        let remote = Arc::new(MemoryRemote::new());
        let service = Arc::new(client(&ws, &remote));

        let auto = AutoSync::start(service, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.sync_calls(), 0);

        auto.stop();
        auto.join().await;
    }
}
