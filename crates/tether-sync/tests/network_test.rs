use std::time::Duration;

use tether_sync::{NetworkMonitor, NetworkState};

#[test]
fn transitions_are_reported_once() {
    let monitor = NetworkMonitor::new(NetworkState::Offline);
    assert!(!monitor.is_online());
    assert!(monitor.set_online());
    assert!(!monitor.set_online());
    assert!(monitor.set_offline());
    assert!(!monitor.set_offline());
}

#[tokio::test]
async fn subscribers_see_each_transition() {
    let monitor = NetworkMonitor::new(NetworkState::Offline);
    let mut rx = monitor.subscribe();
    monitor.set_online();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), NetworkState::Online);

    // Repeating the current state does not notify.
    monitor.set_online();
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn wait_for_online_edge_resolves_on_transition() {
    let monitor = NetworkMonitor::new(NetworkState::Offline);
    let waiter = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.wait_for_online_edge().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());

    monitor.set_online();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should finish")
        .unwrap();
}

#[tokio::test]
async fn wait_for_online_edge_returns_when_already_online() {
    let monitor = NetworkMonitor::new(NetworkState::Online);
    monitor.wait_for_online_edge().await;
}
