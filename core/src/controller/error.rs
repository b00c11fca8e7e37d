use crate::provider::ProviderError;
use crate::updater::NodeUpdaterError;
use crate::utils::thread_context::ThreadContextStopperError;
use thiserror::Error;

/// Aggregates the component-seam error taxonomy (§7, §10.2) at the one
/// place that drives all of them together: the controller tick.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("node updater error: {0}")]
    Updater(#[from] NodeUpdaterError),

    #[error("failed to stop an updater thread: {0}")]
    ThreadStop(#[from] ThreadContextStopperError),
}
