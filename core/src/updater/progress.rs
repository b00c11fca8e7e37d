//! Coarse setup progress (§4.2): `NUM_SETUP_STEPS = 8` named steps, tracked
//! for status/logging purposes independent of which ones the idempotence
//! rules skip.

use crate::defaults::NUM_SETUP_STEPS;

/// One of the eight named steps an Updater passes through. A step that is
/// skipped by the idempotence rules still advances the counter so progress
/// percentages stay meaningful across restart-only runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SetupStep {
    WaitingForSsh,
    BootstrappingDataDisks,
    SyncFileMounts,
    RunInitializationCommands,
    RunInit,
    RunSetupCommands,
    RunStartCommands,
    Done,
}

impl SetupStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStep::WaitingForSsh => "waiting-for-ssh",
            SetupStep::BootstrappingDataDisks => "bootstrapping-data-disks",
            SetupStep::SyncFileMounts => "sync-file-mounts",
            SetupStep::RunInitializationCommands => "run-initialization-commands",
            SetupStep::RunInit => "run-init",
            SetupStep::RunSetupCommands => "run-setup-commands",
            SetupStep::RunStartCommands => "run-start-commands",
            SetupStep::Done => "done",
        }
    }

    /// 1-based ordinal among the `NUM_SETUP_STEPS` steps, for percentage
    /// reporting.
    pub fn ordinal(&self) -> u32 {
        match self {
            SetupStep::WaitingForSsh => 1,
            SetupStep::BootstrappingDataDisks => 2,
            SetupStep::SyncFileMounts => 3,
            SetupStep::RunInitializationCommands => 4,
            SetupStep::RunInit => 5,
            SetupStep::RunSetupCommands => 6,
            SetupStep::RunStartCommands => 7,
            SetupStep::Done => 8,
        }
    }
}

/// Tracks the highest step reached so far for one node. Steps are always
/// recorded in order; `advance` is a no-op if called with an earlier step
/// than the one already recorded (can happen when a skipped step is still
/// reported for progress purposes after a later step already ran).
#[derive(Debug, Default)]
pub struct SetupProgress {
    current: Option<SetupStep>,
}

impl SetupProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, step: SetupStep) {
        if self.current.map(|c| step > c).unwrap_or(true) {
            self.current = Some(step);
        }
    }

    pub fn current(&self) -> Option<SetupStep> {
        self.current
    }

    pub fn percent_complete(&self) -> f64 {
        match self.current {
            Some(step) => (step.ordinal() as f64 / NUM_SETUP_STEPS as f64) * 100.0,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_cover_every_setup_step_exactly_once() {
        let steps = [
            SetupStep::WaitingForSsh,
            SetupStep::BootstrappingDataDisks,
            SetupStep::SyncFileMounts,
            SetupStep::RunInitializationCommands,
            SetupStep::RunInit,
            SetupStep::RunSetupCommands,
            SetupStep::RunStartCommands,
            SetupStep::Done,
        ];
        let mut ordinals: Vec<u32> = steps.iter().map(|s| s.ordinal()).collect();
        ordinals.sort();
        assert_eq!(ordinals, (1..=NUM_SETUP_STEPS).collect::<Vec<_>>());
    }

    #[test]
    fn advance_ignores_out_of_order_regression() {
        let mut progress = SetupProgress::new();
        progress.advance(SetupStep::RunSetupCommands);
        progress.advance(SetupStep::WaitingForSsh);
        assert_eq!(progress.current(), Some(SetupStep::RunSetupCommands));
    }

    #[test]
    fn done_is_one_hundred_percent() {
        let mut progress = SetupProgress::new();
        progress.advance(SetupStep::Done);
        assert_eq!(progress.percent_complete(), 100.0);
    }
}
