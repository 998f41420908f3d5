//! Periodic sync scheduling

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::auth::AuthEvent;
use crate::sync::SyncService;

/// Default period between automatic cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Runs [`SyncService::sync_now`] on a fixed interval.
///
/// Each tick spawns its cycle as a separate task, so stopping the timer never
/// interrupts a cycle already in flight. Ticks that land on a running cycle
/// are coalesced by the service itself.
pub struct AutoSync {
    stop: Arc<watch::Sender<bool>>,
    timer: JoinHandle<()>,
}

impl AutoSync {
    /// Start the timer; the first cycle runs one `interval` from now.
    pub fn start(service: Arc<SyncService>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let service = Arc::clone(&service);
                        tokio::spawn(async move {
                            service.sync_now().await;
                        });
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Auto sync stopped");
        });

        tracing::info!(interval_secs = interval.as_secs(), "Auto sync started");
        Self {
            stop: Arc::new(stop),
            timer,
        }
    }

    /// Stop scheduling further cycles.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Whether the timer task has exited.
    pub fn is_finished(&self) -> bool {
        self.timer.is_finished()
    }

    /// Stop the timer on the first logout announced on `events`.
    pub fn stop_on_logout(&self, mut events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        let stop = Arc::clone(&self.stop);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::Logout) => {
                        tracing::info!("Logged out, stopping auto sync");
                        stop.send_replace(true);
                        break;
                    }
                    Ok(AuthEvent::Login(_)) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Wait for the timer task to exit after [`AutoSync::stop`].
    pub async fn join(self) {
        if let Err(e) = self.timer.await {
            tracing::warn!(error = %e, "Auto sync task ended abnormally");
        }
    }
}
