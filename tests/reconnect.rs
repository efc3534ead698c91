use std::time::{Duration, Instant};

mod support;

use futures::future::join_all;

use trustrpc::{Error, ReconnectingClient};

use support::{Behavior, DuplexDialer};

const RECONNECT_DELAY: Duration = Duration::from_millis(100);

fn client(dialer: DuplexDialer) -> ReconnectingClient<DuplexDialer> {
    ReconnectingClient::with_dialer(dialer).with_reconnect_delay(RECONNECT_DELAY)
}

async fn echo(client: &ReconnectingClient<DuplexDialer>, text: &str) -> trustrpc::Result<String> {
    client.call("Echo.Echo", text).await
}

/// Kills every served connection and lets the aborted server tasks unwind.
async fn kill_connections(client: &ReconnectingClient<DuplexDialer>) {
    client.dialer().kill_connections();
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn dials_lazily_on_first_call() {
    let client = client(DuplexDialer::new(Behavior::Serve));
    assert_eq!(client.dialer().dials(), 0);
    assert!(!client.is_connected().await);

    assert_eq!(echo(&client, "hi").await.unwrap(), "hi");
    assert_eq!(echo(&client, "again").await.unwrap(), "again");
    assert_eq!(client.dialer().dials(), 1);
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn concurrent_first_calls_share_one_dial() {
    let dialer = DuplexDialer::new(Behavior::Serve).with_dial_delay(Duration::from_millis(50));
    let client = client(dialer);

    let texts: Vec<String> = (0..8).map(|i| format!("call {i}")).collect();
    let results = join_all(texts.iter().map(|text| echo(&client, text))).await;
    for (text, result) in texts.iter().zip(results) {
        assert_eq!(&result.unwrap(), text);
    }
    assert_eq!(client.dialer().dials(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_reconnect() {
    let dialer = DuplexDialer::new(Behavior::Serve).with_dial_delay(Duration::from_millis(50));
    let client = client(dialer);
    echo(&client, "warm up").await.unwrap();

    kill_connections(&client).await;
    let texts: Vec<String> = (0..8).map(|i| format!("call {i}")).collect();
    let results = join_all(texts.iter().map(|text| echo(&client, text))).await;
    for (text, result) in texts.iter().zip(results) {
        assert_eq!(&result.unwrap(), text);
    }
    assert_eq!(client.dialer().dials(), 2);
}

#[tokio::test]
async fn retries_once_after_connection_loss() {
    let client = client(DuplexDialer::new(Behavior::Serve));
    echo(&client, "first").await.unwrap();

    kill_connections(&client).await;
    assert_eq!(echo(&client, "second").await.unwrap(), "second");
    assert_eq!(client.dialer().dials(), 2);
}

#[tokio::test]
async fn returns_retry_failure_without_further_attempts() {
    let client = client(DuplexDialer::new(Behavior::Hangup));

    let err = echo(&client, "nobody home").await.unwrap_err();
    assert!(err.is_shutdown(), "{err:?}");
    assert_eq!(client.dialer().dials(), 2);
}

#[tokio::test]
async fn remote_errors_are_not_retried() {
    let client = client(DuplexDialer::new(Behavior::Serve));

    let err = client.call::<_, String>("Echo.Fail", &()).await.unwrap_err();
    assert!(matches!(err, Error::Remote(_)), "{err:?}");
    assert_eq!(client.dialer().dials(), 1);
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn failed_dial_waits_before_returning() {
    let client = client(DuplexDialer::scripted(&[Behavior::Refuse], Behavior::Serve));

    let started = Instant::now();
    let err = echo(&client, "refused").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err:?}");
    assert!(started.elapsed() >= RECONNECT_DELAY);
    assert!(!client.is_connected().await);

    assert_eq!(echo(&client, "accepted").await.unwrap(), "accepted");
    assert_eq!(client.dialer().dials(), 2);
}

#[tokio::test]
async fn failed_reconnect_clears_connection() {
    let client = client(DuplexDialer::scripted(
        &[Behavior::Serve, Behavior::Refuse],
        Behavior::Serve,
    ));
    echo(&client, "first").await.unwrap();

    kill_connections(&client).await;
    let err = echo(&client, "lost").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err:?}");
    assert!(!client.is_connected().await);

    assert_eq!(echo(&client, "back").await.unwrap(), "back");
    assert_eq!(client.dialer().dials(), 3);
}

#[tokio::test]
async fn close_drops_connection_until_next_call() {
    let client = client(DuplexDialer::new(Behavior::Serve));
    client.close().await.expect("close without connection");

    echo(&client, "first").await.unwrap();
    client.close().await.expect("close");
    assert!(!client.is_connected().await);

    assert_eq!(echo(&client, "second").await.unwrap(), "second");
    assert_eq!(client.dialer().dials(), 2);
}
