//! Integration tests for reconnection timing and retry policies

mod common;

use common::{settle, MockConnector};
use std::time::Duration;
use wsrooms::{ConnectionManager, FixedDelay, ManagerState, ReconnectionStrategy};

#[test]
fn test_fixed_delay_consistency() {
    let strategy = FixedDelay::unbounded(Duration::from_millis(2000));

    for attempt in 0..100 {
        assert_eq!(
            strategy.next_delay(attempt),
            Some(Duration::from_millis(2000))
        );
        assert!(strategy.should_reconnect(attempt));
    }
}

#[test]
fn test_fixed_delay_max_attempts() {
    let strategy = FixedDelay::new(Duration::from_millis(100), Some(3));

    assert!(strategy.next_delay(0).is_some());
    assert!(strategy.next_delay(2).is_some());
    assert_eq!(strategy.next_delay(3), None);
    assert!(!strategy.should_reconnect(10));
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_is_constant_across_failures() {
    let delay = Duration::from_millis(300);
    let connector = MockConnector::refusing();
    let manager = ConnectionManager::builder("mock://down")
        .retry_delay(delay)
        .connector(connector.clone())
        .build()
        .unwrap();

    manager.connect();
    tokio::time::sleep(delay * 4 + Duration::from_millis(10)).await;

    let times = connector.attempt_times();
    verbose_println!("  {} attempts", times.len());
    assert!(times.len() >= 4, "expected at least 4 dials, got {}", times.len());

    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= delay, "gap {:?} shorter than retry delay", gap);
        assert!(
            gap < delay + Duration::from_millis(20),
            "gap {:?} grew beyond retry delay",
            gap
        );
    }

    assert_eq!(manager.state(), ManagerState::Connecting);
    manager.close();
}

#[tokio::test(start_paused = true)]
async fn test_bounded_strategy_gives_up() {
    let delay = Duration::from_millis(100);
    let connector = MockConnector::refusing();
    let manager = ConnectionManager::builder("mock://down")
        .connector(connector.clone())
        .reconnect_strategy(FixedDelay::new(delay, Some(2)))
        .build()
        .unwrap();

    manager.connect();
    tokio::time::sleep(delay * 10).await;

    // First dial plus two retries
    assert_eq!(connector.attempts(), 3);
    assert_eq!(manager.state(), ManagerState::Disconnected);

    // connect() starts a fresh budget
    manager.connect();
    tokio::time::sleep(delay * 10).await;
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_retry_budget() {
    let delay = Duration::from_millis(100);
    let connector = MockConnector::new();
    let manager = ConnectionManager::builder("mock://flaky")
        .connector(connector.clone())
        .reconnect_strategy(FixedDelay::new(delay, Some(1)))
        .build()
        .unwrap();

    manager.connect();
    settle().await;

    // Every drop is followed by a good dial, so the single retry is never used up
    for index in 0..3 {
        connector.peer(index).disconnect();
        tokio::time::sleep(delay + Duration::from_millis(5)).await;
        assert!(manager.is_connected(), "not reconnected after drop {}", index);
    }

    connector.set_refuse(true);
    connector.peer(3).disconnect();
    tokio::time::sleep(delay * 5).await;

    assert_eq!(manager.state(), ManagerState::Disconnected);
    assert_eq!(manager.metrics().successful_opens, 4);
}

#[tokio::test(start_paused = true)]
async fn test_server_coming_back_is_picked_up() {
    let delay = Duration::from_millis(200);
    let connector = MockConnector::refusing();
    let manager = ConnectionManager::builder("mock://later")
        .retry_delay(delay)
        .connector(connector.clone())
        .build()
        .unwrap();

    manager.connect();
    tokio::time::sleep(delay * 2 + Duration::from_millis(10)).await;
    assert!(!manager.is_connected());

    connector.set_refuse(false);
    tokio::time::sleep(delay).await;
    settle().await;

    assert!(manager.is_connected());
    assert_eq!(connector.peer_count(), 1);
}
