//! Small pub/sub + cancellation primitives shared by the controller loop and
//! the per-node Updater pool (§5). Kept separate from `utils::thread_context`
//! so either can be used independently in tests.

pub mod cancellation;
pub mod channel;

/// Top-level application lifecycle events, published by the process's signal
/// handler and consumed by the `ClusterController` run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationEvent {
    StopRequested,
}
