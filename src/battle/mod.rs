//! Battle automation - scripted copilot runs against a live battle screen
//!
//! Layers, bottom-up:
//! - `roster`, `grid`, `script`: plain data handed over by the config store
//! - `state`: the only owner of live battle counters and unit bookkeeping
//! - `allocation`: placeholder -> concrete unit resolution
//! - `executor`: walks a script, with an injected strategic policy
//! - `stage`: recognizes stages and retries them within a budget

pub mod ai;
pub mod allocation;
pub mod executor;
pub mod grid;
pub mod roster;
pub mod script;
pub mod stage;
pub mod state;

// Re-exports for convenient access
pub use ai::{AutonomousPolicy, PassivePolicy, RoleQuota, StrategicPolicy, Strategy};
pub use allocation::{allocate_groups, PlaceholderMap};
pub use executor::ScriptExecutor;
pub use grid::{Buildable, LayoutStore, StageLayout, TileGrid, TileInfo};
pub use roster::{DeployDirection, DeploymentUnit, KillCount, Role, SkillUsage};
pub use script::{Action, ActionKind, CopilotScript, Group, GroupMember, WaitConditions};
pub use stage::{
    AttemptRunner, ExecutorRunner, RunSummary, StageCatalog, StageManager, StageReport,
    StageScript,
};
pub use state::StateTracker;
