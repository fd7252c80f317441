//! Async test helpers
//!
//! Timeout wrappers for notification receivers and polling helpers for
//! state that settles asynchronously inside the mediator task.

use std::future::Future;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

use crate::bridge::BridgeNotification;

/// Default timeout duration for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for tests that expect nothing to happen (100ms)
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Receive with a timeout, mapping lag and close to errors
pub async fn recv_timeout<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    match timeout(duration, rx.recv()).await {
        Err(_) => Err(RecvTimeoutError::Timeout),
        Ok(Err(broadcast::error::RecvError::Closed)) => Err(RecvTimeoutError::Closed),
        Ok(Err(broadcast::error::RecvError::Lagged(n))) => Err(RecvTimeoutError::Lagged(n)),
        Ok(Ok(value)) => Ok(value),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
    Lagged(u64),
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
            RecvTimeoutError::Lagged(n) => write!(f, "receiver lagged by {} messages", n),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Next notification, panicking if none arrives within the default timeout
pub async fn next_notification(
    rx: &mut broadcast::Receiver<BridgeNotification>,
) -> BridgeNotification {
    match recv_timeout(rx, DEFAULT_TEST_TIMEOUT).await {
        Ok(note) => note,
        Err(e) => panic!("Expected a notification: {}", e),
    }
}

/// Skip notifications until one matches `predicate`
pub async fn wait_for_notification<F>(
    rx: &mut broadcast::Receiver<BridgeNotification>,
    mut predicate: F,
) -> BridgeNotification
where
    F: FnMut(&BridgeNotification) -> bool,
{
    assert_completes_within(DEFAULT_TEST_TIMEOUT, async {
        loop {
            let note = next_notification(rx).await;
            if predicate(&note) {
                return note;
            }
        }
    })
    .await
}

/// Assert that no notification arrives for a short while
pub async fn expect_quiet(rx: &mut broadcast::Receiver<BridgeNotification>) {
    if let Ok(note) = recv_timeout(rx, SHORT_TEST_TIMEOUT).await {
        panic!("Expected no notification, got {:?}", note);
    }
}

/// Poll `condition` until it holds, panicking after the default timeout
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + DEFAULT_TEST_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("Condition not met within {:?}", DEFAULT_TEST_TIMEOUT);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Helper to assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PeerIdentity;

    fn lost(name: &str) -> BridgeNotification {
        BridgeNotification::InstanceLost {
            identity: PeerIdentity::new(name),
        }
    }

    #[tokio::test]
    async fn test_recv_timeout_elapses() {
        let (_tx, mut rx) = broadcast::channel::<u32>(4);
        let result = recv_timeout(&mut rx, Duration::from_millis(10)).await;
        assert_eq!(result, Err(RecvTimeoutError::Timeout));
    }

    #[tokio::test]
    async fn test_wait_for_notification_skips_others() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(lost("P1")).unwrap();
        tx.send(lost("P2")).unwrap();

        let note = wait_for_notification(&mut rx, |note| *note == lost("P2")).await;
        assert_eq!(note, lost("P2"));
        expect_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_eventually_sees_late_flag() {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let setter = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        eventually(|| flag.load(std::sync::atomic::Ordering::SeqCst)).await;
    }
}
