//! Poller behavior against the mock connector, on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use prana_core::{DeviceEvent, Error, MockConnector, PollOptions, Poller, Session};

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

fn start(options: PollOptions) -> (MockConnector, Poller<MockConnector>) {
    let mock = MockConnector::new();
    let session = Arc::new(Session::new(mock.clone(), ADDRESS));
    let poller = Poller::spawn(session, options).unwrap();
    (mock, poller)
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_runs_immediately() {
    let (mock, poller) = start(PollOptions::default());
    settle().await;

    assert!(poller.last_state().is_some());
    assert!(!poller.is_stale());
    assert_eq!(poller.health().polls, 1);
    assert!(poller.health().is_healthy());
    assert_eq!(mock.state_request_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_polls_on_interval() {
    let (mock, poller) = start(PollOptions::with_interval(Duration::from_secs(10)));
    settle().await;
    sleep_secs(35).await;

    assert_eq!(mock.state_request_count().await, 4);
    assert_eq!(poller.health().polls, 4);
    assert_eq!(mock.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_keep_last_state_and_turn_stale() {
    let (mock, poller) = start(PollOptions::default());
    settle().await;
    let good = poller.last_state().unwrap();

    mock.set_silent(true);
    sleep_secs(70).await;

    // Two failed polls, but still inside 3 intervals of the last success.
    let health = poller.health();
    assert_eq!(health.consecutive_failures, 2);
    assert!(health.last_error.as_deref().unwrap().contains("No state frame"));
    assert!(!poller.is_stale());

    sleep_secs(30).await;
    assert_eq!(poller.health().consecutive_failures, 3);
    assert!(poller.is_stale());
    assert_eq!(poller.last_state(), Some(good));
    assert!(poller.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_failures() {
    let (mock, poller) = start(PollOptions::with_interval(Duration::from_secs(10)));
    mock.set_silent(true);
    settle().await;
    sleep_secs(15).await;
    assert_eq!(poller.health().consecutive_failures, 2);
    assert!(poller.last_state().is_none());
    assert!(poller.is_stale());

    mock.set_silent(false);
    sleep_secs(10).await;

    let health = poller.health();
    assert!(health.is_healthy());
    assert_eq!(health.last_error, None);
    assert!(poller.last_state().is_some());
    assert!(!poller.is_stale());
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_event() {
    let mock = MockConnector::new();
    mock.set_connect_failures(u32::MAX);
    let session = Arc::new(Session::new(mock.clone(), ADDRESS));
    let mut events = session.subscribe();
    let poller = Poller::spawn(session, PollOptions::default()).unwrap();

    match events.recv().await.unwrap() {
        DeviceEvent::PollFailed {
            device,
            error,
            consecutive_failures,
        } => {
            assert_eq!(device, ADDRESS);
            assert!(error.contains(ADDRESS));
            assert_eq!(consecutive_failures, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(poller.is_stale());
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_polling() {
    let (mock, poller) = start(PollOptions::with_interval(Duration::from_secs(10)));
    settle().await;

    poller.stop();
    settle().await;
    assert!(!poller.is_running());

    sleep_secs(60).await;
    assert_eq!(mock.state_request_count().await, 1);
    // The session itself stays usable.
    assert!(poller.session().request_state().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_session() {
    let (mock, poller) = start(PollOptions::default());
    settle().await;

    poller.shutdown().await;
    settle().await;

    assert!(!poller.is_running());
    assert!(poller.session().is_shut_down());
    assert_eq!(mock.disconnect_count(), 1);
    assert!(matches!(
        poller.session().request_state().await,
        Err(Error::ShuttingDown)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_task() {
    let (mock, poller) = start(PollOptions::with_interval(Duration::from_secs(10)));
    settle().await;
    drop(poller);

    sleep_secs(60).await;
    assert_eq!(mock.state_request_count().await, 1);
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let session = Arc::new(Session::new(MockConnector::new(), ADDRESS));
    let result = Poller::spawn(session, PollOptions::with_interval(Duration::ZERO));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
