//! The background loop: drains on the online edge, after enqueues while
//! online, and when the retry timer fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use tether_core::errors::{SyncError, TetherResult};
use tether_core::traits::{IIdMappingStore, IQueueStore, MutationTransport};

use super::SyncEngine;
use crate::network::NetworkState;

/// Handle to a running sync loop. Dropping it stops the loop.
pub struct SyncHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the loop. An in-flight request is allowed to finish first.
    pub async fn shutdown(mut self) -> TetherResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.task).await.map_err(|_| SyncError::Shutdown.into())
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<S, T> SyncEngine<S, T>
where
    S: IQueueStore + IIdMappingStore + 'static,
    T: MutationTransport,
{
    /// Run the drive loop on the current tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> SyncHandle {
        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move { engine.run(rx).await });
        SyncHandle {
            shutdown: Some(tx),
            task,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        let mut network = self.network.subscribe();
        info!("sync loop started");
        let mut trigger = "startup";

        loop {
            if self.network.is_online() {
                if let Err(e) = self.drain_with(trigger).await {
                    error!(error = %e, trigger, "drain failed");
                }
            }
            let badge_expiry = self.next_badge_expiry();

            tokio::select! {
                _ = &mut shutdown => break,
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *network.borrow_and_update();
                    if let Err(e) = self.publish() {
                        error!(error = %e, "status publish failed");
                    }
                    if state == NetworkState::Offline {
                        self.cancel_timer();
                    }
                    trigger = "online";
                }
                _ = self.wake.notified() => trigger = "wake",
                _ = sleep_or_forever(badge_expiry) => {
                    if let Err(e) = self.publish() {
                        error!(error = %e, "status publish failed");
                    }
                    trigger = "badge-expiry";
                }
            }
        }

        self.cancel_timer();
        info!("sync loop stopped");
    }
}

async fn sleep_or_forever(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
