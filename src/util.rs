//! Utility functions and helpers.

use tokio::sync::mpsc;

/// Send a value through an unbounded channel, logging if the receiver is gone.
///
/// Background tasks outlive the stream that spawned them only briefly (until
/// they are aborted), so a closed channel is expected during teardown and is
/// logged at debug level.
pub fn send_or_log<T>(tx: &mpsc::UnboundedSender<T>, value: T, context: &str) {
    if let Err(e) = tx.send(value) {
        tracing::debug!("Failed to send {}: {}", context, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_or_log_success() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        send_or_log(&tx, 42, "test value");
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_send_or_log_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel::<i32>();
        drop(rx); // Close the receiver
        // Should not panic, just log
        send_or_log(&tx, 42, "test value");
    }
}
