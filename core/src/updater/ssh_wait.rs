//! SSH readiness wait (§4.2): poll `uptime` until the node answers, a
//! deadline elapses, or the node is observed terminated.

use super::error::NodeUpdaterError;
use crate::defaults::{CLOUDTIK_NODE_START_WAIT_S, READY_CHECK_INTERVAL, SSH_CHECK_TIMEOUT};
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::provider::{CommandExecutor, RunEnv};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Blocks until `uptime` succeeds on `executor`, or returns an error.
///
/// Connection-refused errors are measured against a separate anchor
/// (the instant of the *first* connection-refused error) rather than the
/// overall start time, so a host that starts out unreachable for another
/// reason and only later begins actively refusing connections doesn't get
/// a fresh deadline from that point. Every other error type is measured
/// against the original start instant.
pub fn wait_for_ssh(
    executor: &dyn CommandExecutor,
    cancel: &EventConsumer<CancellationMessage>,
) -> Result<(), NodeUpdaterError> {
    wait_for_ssh_with_deadline(executor, CLOUDTIK_NODE_START_WAIT_S, cancel)
}

pub(super) fn wait_for_ssh_with_deadline(
    executor: &dyn CommandExecutor,
    deadline: Duration,
    cancel: &EventConsumer<CancellationMessage>,
) -> Result<(), NodeUpdaterError> {
    let start = Instant::now();
    let mut first_refused_at: Option<Instant> = None;

    loop {
        match executor.run(
            "uptime",
            &BTreeMap::new(),
            Some(SSH_CHECK_TIMEOUT),
            RunEnv::Host,
        ) {
            Ok(()) => return Ok(()),
            Err(err) => {
                let anchor = if err.is_connection_refused() {
                    *first_refused_at.get_or_insert_with(Instant::now)
                } else {
                    start
                };
                debug!(?err, elapsed = ?anchor.elapsed(), "ssh not ready yet");
                if anchor.elapsed() >= deadline {
                    return Err(NodeUpdaterError::SshTimeout);
                }
            }
        }

        if cancel.is_cancelled(READY_CHECK_INTERVAL) {
            return Err(NodeUpdaterError::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::channel::pub_sub;
    use crate::provider::CommandError;
    use crate::provider::MockCommandExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn succeeds_on_first_uptime_success() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().times(1).returning(|_, _, _, _| Ok(()));
        let (_publisher, cancel) = pub_sub();

        let result = wait_for_ssh_with_deadline(&executor, Duration::from_secs(5), &cancel);
        assert!(result.is_ok());
    }

    #[test]
    fn recovers_after_a_handful_of_connection_refused_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().returning({
            let attempts = Arc::clone(&attempts);
            move |_, _, _, _| {
                if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(CommandError::ConnectionRefused)
                } else {
                    Ok(())
                }
            }
        });
        let (_publisher, cancel) = pub_sub();

        let result = wait_for_ssh_with_deadline(&executor, Duration::from_secs(5), &cancel);
        assert!(result.is_ok());
        assert!(attempts.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn times_out_when_deadline_elapses() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .returning(|_, _, _, _| Err(CommandError::ConnectionRefused));
        let (_publisher, cancel) = pub_sub();

        let result = wait_for_ssh_with_deadline(&executor, Duration::from_millis(1), &cancel);
        assert!(matches!(result, Err(NodeUpdaterError::SshTimeout)));
    }

    #[test]
    fn cancellation_aborts_the_wait() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .returning(|_, _, _, _| Err(CommandError::Transport("unreachable".to_string())));
        let (publisher, cancel) = pub_sub();
        publisher.publish(()).unwrap();

        let result = wait_for_ssh_with_deadline(&executor, Duration::from_secs(5), &cancel);
        assert!(matches!(result, Err(NodeUpdaterError::Cancelled)));
    }
}
