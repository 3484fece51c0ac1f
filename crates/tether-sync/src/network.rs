//! Connectivity state, fed by the embedding app.
//!
//! The monitor only reports. It never retries, and failed requests do not
//! flip it offline.

use std::sync::Arc;

use tokio::sync::watch;
use tether_observability::events;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Online,
    Offline,
}

#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<NetworkState>>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Returns true on an offline → online transition.
    pub fn set_online(&self) -> bool {
        self.set(NetworkState::Online)
    }

    /// Returns true on an online → offline transition.
    pub fn set_offline(&self) -> bool {
        self.set(NetworkState::Offline)
    }

    fn set(&self, state: NetworkState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            events::connectivity_changed(state == NetworkState::Online);
        }
        changed
    }

    pub fn state(&self) -> NetworkState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == NetworkState::Online
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }

    /// Resolve once the monitor reports online. Returns immediately if it
    /// already does.
    pub async fn wait_for_online_edge(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state == NetworkState::Online).await;
    }
}
