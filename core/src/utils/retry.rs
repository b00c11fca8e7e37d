use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use std::time::Duration;

/// Retries `f` after `interval` has elapsed, until `max_attempts` is reached.
/// Returns the last error if every attempt fails.
pub fn retry<F, T, E>(max_attempts: usize, interval: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    let mut last_err = None;
    for _ in 0..max_attempts {
        match f() {
            Ok(result) => return Ok(result),
            Err(err) => {
                last_err = Some(err);
                std::thread::sleep(interval);
            }
        }
    }
    Err(last_err.expect("some error must exist at this point"))
}

/// Outcome of a cancellable retry loop: either the operation succeeded, ran
/// out of attempts, or was cancelled mid-wait.
pub enum CancellableOutcome<T, E> {
    Ok(T),
    ExhaustedRetries(E),
    Cancelled,
}

/// Like [`retry`], but the inter-attempt sleep is a cancellation check
/// instead of a blind sleep: a cancellation signal aborts the loop within
/// one retry interval, per §5's cancellation requirement for every
/// suspension point inside an Updater.
pub fn retry_cancellable<F, T, E>(
    max_attempts: usize,
    interval: Duration,
    cancel: &EventConsumer<CancellationMessage>,
    mut f: F,
) -> CancellableOutcome<T, E>
where
    F: FnMut(usize) -> Result<T, E>,
{
    let mut last_err = None;
    for attempt in 0..max_attempts {
        match f(attempt) {
            Ok(result) => return CancellableOutcome::Ok(result),
            Err(err) => {
                last_err = Some(err);
                if cancel.is_cancelled(interval) {
                    return CancellableOutcome::Cancelled;
                }
            }
        }
    }
    CancellableOutcome::ExhaustedRetries(last_err.expect("some error must exist at this point"))
}
