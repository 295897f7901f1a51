//! Strategic policies plugged into the script executor
//!
//! Architecture: composition instead of executor subclasses
//! - `StrategicPolicy` is the capability set the executor calls into
//! - `PassivePolicy` leaves everything to the script
//! - `AutonomousPolicy` deploys and fires skills on its own between steps

pub mod autonomous;

pub use autonomous::{AutonomousPolicy, RoleQuota, Strategy};

use crate::battle::allocation::PlaceholderMap;
use crate::battle::script::Action;
use crate::battle::state::StateTracker;
use crate::device::Snapshot;

/// Hooks the executor invokes while walking a script
pub trait StrategicPolicy {
    /// Called once at attempt start, after the tracker was reset
    fn prepare(&mut self, _tracker: &mut StateTracker) {}

    /// Called once groups are allocated, before the first step
    fn bind_placeholders(&mut self, _placeholders: &PlaceholderMap) {}

    /// Idle tick while the executor waits; `false` means the battle ended
    fn on_idle(&mut self, _tracker: &mut StateTracker, _snapshot: Option<&Snapshot>) -> bool {
        true
    }

    /// Handle an action kind outside the executor's base set
    fn on_derived_action(
        &mut self,
        _tracker: &mut StateTracker,
        action: &Action,
        _target: &str,
    ) -> bool {
        tracing::error!(kind = action.kind.name(), "action not supported by policy");
        false
    }

    /// Bring the game from the pre-battle screen into the battle
    fn wait_until_start(&mut self, tracker: &mut StateTracker) -> bool {
        tracker.wait_until_start(true)
    }

    /// Keep managing the battle after the last scripted step
    fn waits_until_end(&self) -> bool {
        false
    }
}

/// Default policy: the script alone drives the battle
#[derive(Debug, Clone, Copy, Default)]
pub struct PassivePolicy;

impl StrategicPolicy for PassivePolicy {}
