//! Scenario description for the simulated battlefield

use serde::{Deserialize, Serialize};

use crate::battle::roster::Role;

fn default_cost_per_tick() -> i32 {
    1
}

fn default_max_cost() -> i32 {
    99
}

/// A unit the simulated roster panel offers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimUnit {
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub cost: i32,
    /// Cooldown after a retreat, in ticks
    #[serde(default)]
    pub redeploy_ticks: u32,
    /// Ticks on the field until the skill is ready; 0 = no skill
    #[serde(default)]
    pub skill_ticks: u32,
}

impl SimUnit {
    pub fn new(name: &str, role: Role, cost: i32) -> Self {
        Self {
            name: name.to_string(),
            role,
            cost,
            redeploy_ticks: 0,
            skill_ticks: 0,
        }
    }

    pub fn with_skill_ticks(mut self, ticks: u32) -> Self {
        self.skill_ticks = ticks;
        self
    }

    pub fn with_redeploy_ticks(mut self, ticks: u32) -> Self {
        self.redeploy_ticks = ticks;
        self
    }
}

/// One simulated stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimStage {
    /// Text shown on the ready screen
    pub name: String,
    /// Show a "fight directly" screen between start and battle
    #[serde(default)]
    pub prep_screen: bool,
    #[serde(default)]
    pub units: Vec<SimUnit>,
    /// Units handed out one by one by the draw control
    #[serde(default)]
    pub draw_pool: Vec<SimUnit>,
    #[serde(default)]
    pub initial_cost: i32,
    /// Cost change per tick; negative values drain it
    #[serde(default = "default_cost_per_tick")]
    pub cost_per_tick: i32,
    #[serde(default = "default_max_cost")]
    pub max_cost: i32,
    /// Battle is won once this many enemies fell; 0 = no kill goal
    #[serde(default)]
    pub total_kills: i32,
    /// One kill every N ticks while a unit is deployed; 0 = never
    #[serde(default)]
    pub kill_every: u32,
    /// Extra per-tick kill chance while a unit is deployed
    #[serde(default)]
    pub kill_chance: f64,
    /// Battle is won after this many ticks
    #[serde(default)]
    pub end_after_ticks: Option<u64>,
    /// Items offered on the drops screen opened at battle start
    #[serde(default)]
    pub drops: Vec<String>,
}

impl SimStage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prep_screen: false,
            units: Vec::new(),
            draw_pool: Vec::new(),
            initial_cost: 0,
            cost_per_tick: default_cost_per_tick(),
            max_cost: default_max_cost(),
            total_kills: 0,
            kill_every: 0,
            kill_chance: 0.0,
            end_after_ticks: None,
            drops: Vec::new(),
        }
    }

    pub fn with_unit(mut self, unit: SimUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_prep_screen(mut self) -> Self {
        self.prep_screen = true;
        self
    }

    pub fn with_cost(mut self, initial_cost: i32, cost_per_tick: i32) -> Self {
        self.initial_cost = initial_cost;
        self.cost_per_tick = cost_per_tick;
        self
    }

    pub fn with_kills(mut self, total_kills: i32, kill_every: u32) -> Self {
        self.total_kills = total_kills;
        self.kill_every = kill_every;
        self
    }

    pub fn with_end_after_ticks(mut self, ticks: u64) -> Self {
        self.end_after_ticks = Some(ticks);
        self
    }

    pub fn with_draw_pool(mut self, pool: Vec<SimUnit>) -> Self {
        self.draw_pool = pool;
        self
    }

    pub fn with_drops(mut self, drops: &[&str]) -> Self {
        self.drops = drops.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// Sequence of stages met by one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimScenario {
    pub stages: Vec<SimStage>,
    /// Seed for the random kill chance
    #[serde(default)]
    pub seed: u64,
}

impl SimScenario {
    pub fn single(stage: SimStage) -> Self {
        Self {
            stages: vec![stage],
            seed: 0,
        }
    }
}
