use super::channel::EventConsumer;
use crossbeam::channel::RecvTimeoutError;
use std::time::Duration;

/// A cancellation signal carries no payload; receiving anything (or the
/// publisher being dropped) means "stop".
pub type CancellationMessage = ();

impl EventConsumer<CancellationMessage> {
    /// `true` if a cancellation message (or channel disconnect) arrived
    /// within `timeout`. Blocks for up to `timeout` otherwise. Every
    /// suspension point in the Updater (§5) polls this between retries
    /// instead of sleeping blindly, so cancellation is observed promptly.
    pub fn is_cancelled(&self, timeout: Duration) -> bool {
        let timed_out = matches!(
            self.as_ref().recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        );
        !timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel::pub_sub;
    use super::*;

    #[test]
    fn not_cancelled_until_signalled() {
        let (_publisher, consumer) = pub_sub::<CancellationMessage>();
        assert!(!consumer.is_cancelled(Duration::from_millis(10)));
    }

    #[test]
    fn cancelled_once_signalled() {
        let (publisher, consumer) = pub_sub::<CancellationMessage>();
        publisher.publish(()).unwrap();
        assert!(consumer.is_cancelled(Duration::from_millis(50)));
    }

    #[test]
    fn cancelled_when_publisher_dropped() {
        let (publisher, consumer) = pub_sub::<CancellationMessage>();
        drop(publisher);
        assert!(consumer.is_cancelled(Duration::from_millis(50)));
    }
}
