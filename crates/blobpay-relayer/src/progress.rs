//! Run-phase tracking and poller-facing progress snapshots.
//!
//! The phase enum replaces ad-hoc per-step booleans: a snapshot is
//! derived from the phase on read, so pollers can never observe flags
//! out of order or see one regress mid-run.

use std::sync::RwLock;

use blobpay_types::{RelayStatus, RelayerProgress};

/// Linear phases of one relay run. `Failed` status is tracked alongside;
/// there is no backward phase movement except an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayPhase {
    Idle,
    CostCalculated,
    BridgeCompleted,
    SwapCompleted,
    StorageCompleted,
}

#[derive(Debug, Clone, Copy)]
struct RunFlags {
    phase: RelayPhase,
    status: RelayStatus,
    cancel_requested: bool,
    burn_broadcast: bool,
}

impl RunFlags {
    fn fresh(status: RelayStatus) -> Self {
        Self {
            phase: RelayPhase::Idle,
            status,
            cancel_requested: false,
            burn_broadcast: false,
        }
    }
}

/// Single-writer progress cell shared with concurrent pollers.
pub(crate) struct ProgressCell {
    state: RwLock<RunFlags>,
}

impl ProgressCell {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RunFlags::fresh(RelayStatus::Idle)),
        }
    }

    /// Start a fresh run: Idle phase, Running status, flags cleared.
    pub fn begin(&self) {
        let mut state = self.state.write().expect("progress lock poisoned");
        *state = RunFlags::fresh(RelayStatus::Running);
    }

    /// Move forward to `phase`; the terminal phase marks success.
    pub fn advance(&self, phase: RelayPhase) {
        let mut state = self.state.write().expect("progress lock poisoned");
        debug_assert!(phase > state.phase, "phases only move forward");
        if phase > state.phase {
            state.phase = phase;
        }
        if state.phase == RelayPhase::StorageCompleted {
            state.status = RelayStatus::Succeeded;
        }
    }

    pub fn fail(&self) {
        let mut state = self.state.write().expect("progress lock poisoned");
        state.status = RelayStatus::Failed;
    }

    pub fn reset(&self) {
        let mut state = self.state.write().expect("progress lock poisoned");
        *state = RunFlags::fresh(RelayStatus::Idle);
    }

    pub fn snapshot(&self) -> RelayerProgress {
        let state = self.state.read().expect("progress lock poisoned");
        RelayerProgress {
            calculate_cost: state.phase >= RelayPhase::CostCalculated,
            transfer_stable: state.phase >= RelayPhase::BridgeCompleted,
            swap_to_token: state.phase >= RelayPhase::SwapCompleted,
            store_data: state.phase >= RelayPhase::StorageCompleted,
            status: state.status,
        }
    }

    /// Accept a cancellation only while the burn has not been broadcast.
    pub fn request_cancel(&self) -> bool {
        let mut state = self.state.write().expect("progress lock poisoned");
        if state.burn_broadcast {
            return false;
        }
        state.cancel_requested = true;
        true
    }

    /// Claim the burn-broadcast point. Returns false if a cancellation
    /// arrived first; the two transitions are mutually exclusive under
    /// the same lock.
    pub fn try_mark_burn_broadcast(&self) -> bool {
        let mut state = self.state.write().expect("progress lock poisoned");
        if state.cancel_requested {
            return false;
        }
        state.burn_broadcast = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_flags_follow_phase_order() {
        let cell = ProgressCell::new();
        cell.begin();

        let snap = cell.snapshot();
        assert!(!snap.calculate_cost && !snap.transfer_stable);
        assert_eq!(snap.status, RelayStatus::Running);

        cell.advance(RelayPhase::CostCalculated);
        let snap = cell.snapshot();
        assert!(snap.calculate_cost);
        assert!(!snap.transfer_stable && !snap.swap_to_token && !snap.store_data);

        cell.advance(RelayPhase::BridgeCompleted);
        cell.advance(RelayPhase::SwapCompleted);
        cell.advance(RelayPhase::StorageCompleted);
        let snap = cell.snapshot();
        assert!(snap.calculate_cost && snap.transfer_stable && snap.swap_to_token && snap.store_data);
        assert_eq!(snap.status, RelayStatus::Succeeded);
    }

    #[test]
    fn test_fail_keeps_completed_flags() {
        let cell = ProgressCell::new();
        cell.begin();
        cell.advance(RelayPhase::CostCalculated);
        cell.fail();

        let snap = cell.snapshot();
        assert!(snap.calculate_cost);
        assert!(!snap.transfer_stable);
        assert_eq!(snap.status, RelayStatus::Failed);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let cell = ProgressCell::new();
        cell.begin();
        cell.advance(RelayPhase::CostCalculated);
        cell.fail();
        cell.reset();

        assert_eq!(cell.snapshot(), RelayerProgress::default());
    }

    #[test]
    fn test_cancel_and_burn_broadcast_are_mutually_exclusive() {
        // cancel first: broadcast point must not be claimed
        let cell = ProgressCell::new();
        cell.begin();
        assert!(cell.request_cancel());
        assert!(!cell.try_mark_burn_broadcast());

        // broadcast first: cancellation is rejected
        let cell = ProgressCell::new();
        cell.begin();
        assert!(cell.try_mark_burn_broadcast());
        assert!(!cell.request_cancel());
    }
}
