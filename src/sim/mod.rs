//! Simulated battlefield for the CLI and the integration tests

pub mod battlefield;
pub mod scenario;

pub use battlefield::{SimBattlefield, SimInput, SimReport, SimScreen, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use scenario::{SimScenario, SimStage, SimUnit};
