//! Autonomous micromanagement policy
//!
//! Runs on every idle tick. Strategies are serviced strictly in declared
//! order: a strategy waiting on a unit that is not ready yet blocks every
//! strategy after it. At most one deployment happens per tick; the next
//! tick sees the changed screen.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::battle::ai::StrategicPolicy;
use crate::battle::allocation::PlaceholderMap;
use crate::battle::roster::{DeployDirection, DeploymentUnit, Role, SkillUsage};
use crate::battle::script::{Action, ActionKind};
use crate::battle::state::StateTracker;
use crate::core::types::GridPoint;
use crate::device::{Snapshot, TextProfile, UiElement};

/// How many disposable units of a role a strategy still wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleQuota {
    pub role: Role,
    pub quantity: i32,
}

/// One ordered deployment rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Key unit deployed once every quota is filled; may be empty
    #[serde(default)]
    pub core: String,
    #[serde(default)]
    pub tool_men: Vec<RoleQuota>,
    pub location: GridPoint,
    #[serde(default)]
    pub direction: DeployDirection,
}

impl Strategy {
    fn quotas_filled(&self) -> bool {
        self.tool_men.iter().all(|q| q.quantity <= 0)
    }
}

/// Outcome of one pass over the strategies
#[derive(Debug, Clone, PartialEq)]
enum Decision {
    Deploy {
        name: String,
        location: GridPoint,
        direction: DeployDirection,
        /// (strategy, quota) to decrement on success
        quota: Option<(usize, usize)>,
    },
    /// A higher-priority rule waits for a unit to become ready
    Wait,
    Nothing,
}

/// Policy that fills strategies with whatever units the roster offers
#[derive(Debug, Clone)]
pub struct AutonomousPolicy {
    template: Vec<Strategy>,
    strategies: Vec<Strategy>,
    cores: BTreeSet<String>,
    /// Deploy targets as written in the script (may be group names)
    deploy_targets: BTreeSet<String>,
    /// Units the script deploys itself; never used as tools
    scripted_units: BTreeSet<String>,
    draw_as_possible: bool,
    order_of_drops: Vec<String>,
}

impl AutonomousPolicy {
    pub fn new(strategies: Vec<Strategy>, actions: &[Action]) -> Self {
        let cores = strategies
            .iter()
            .filter(|s| !s.core.is_empty())
            .map(|s| s.core.clone())
            .collect();
        let deploy_targets: BTreeSet<String> = actions
            .iter()
            .filter(|a| a.kind == ActionKind::Deploy && !a.target.is_empty())
            .map(|a| a.target.clone())
            .collect();

        Self {
            template: strategies.clone(),
            strategies,
            cores,
            scripted_units: deploy_targets.clone(),
            deploy_targets,
            draw_as_possible: false,
            order_of_drops: Vec::new(),
        }
    }

    /// Draw extra units whenever a tick deploys nothing
    pub fn with_draw_as_possible(mut self, enabled: bool) -> Self {
        self.draw_as_possible = enabled;
        self
    }

    /// Preferred drops, best first
    pub fn with_order_of_drops(mut self, order: Vec<String>) -> Self {
        self.order_of_drops = order;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Split the roster into core units and disposable tool units
    fn partition(
        &self,
        roster: &BTreeMap<String, DeploymentUnit>,
    ) -> (Vec<DeploymentUnit>, Vec<DeploymentUnit>) {
        let mut cores = Vec::new();
        let mut tools = Vec::new();
        for (name, unit) in roster {
            if self.cores.contains(name) {
                cores.push(unit.clone());
            } else if !self.scripted_units.contains(name) {
                tools.push(unit.clone());
            }
        }
        (cores, tools)
    }

    fn decide(&self, cores: &[DeploymentUnit], tools: &[DeploymentUnit]) -> Decision {
        for (strategy_index, strategy) in self.strategies.iter().enumerate() {
            if strategy.quotas_filled() && !strategy.core.is_empty() {
                if let Some(core) = cores.iter().find(|u| u.name == strategy.core) {
                    if !core.available {
                        return Decision::Wait;
                    }
                    return Decision::Deploy {
                        name: core.name.clone(),
                        location: strategy.location,
                        direction: strategy.direction,
                        quota: None,
                    };
                }
            }

            for (quota_index, quota) in strategy.tool_men.iter().enumerate() {
                if quota.quantity <= 0 {
                    continue;
                }
                if let Some(unit) = tools
                    .iter()
                    .find(|u| u.available && u.role == quota.role)
                {
                    return Decision::Deploy {
                        name: unit.name.clone(),
                        location: strategy.location,
                        direction: strategy.direction,
                        quota: Some((strategy_index, quota_index)),
                    };
                }
                if tools.iter().any(|u| u.role == quota.role) {
                    return Decision::Wait;
                }
            }
        }
        Decision::Nothing
    }

    fn draw_card(&self, tracker: &StateTracker, with_retry: bool) -> bool {
        let services = tracker.services();
        let attempts = if with_retry {
            services.config.ui_retries
        } else {
            1
        };
        services.click(UiElement::DrawCard, attempts)
    }

    /// Abandon when the expected unit or roster composition is missing
    fn check_abort(&self, tracker: &mut StateTracker, action: &Action, target: &str) -> bool {
        tracker.refresh_now();

        let mut to_abandon = false;
        if !target.is_empty()
            && tracker.unit(target).is_none()
            && !tracker.battlefield().contains_key(target)
        {
            tracing::info!(unit = target, "required unit missing");
            to_abandon = true;
        } else if !action.role_counts.is_empty() {
            let mut counts: BTreeMap<Role, usize> = BTreeMap::new();
            for unit in tracker.roster().values() {
                *counts.entry(unit.role).or_default() += 1;
            }
            to_abandon = action
                .role_counts
                .iter()
                .any(|(role, needed)| counts.get(role).copied().unwrap_or(0) < *needed);
        }

        if to_abandon {
            tracker.abandon();
        }
        true
    }

    /// Pick the best preferred drop, or dismiss the drops screen
    ///
    /// The drops screen may never appear; without it there is nothing to do.
    fn collect_drops(&self, tracker: &StateTracker) -> bool {
        let services = tracker.services();
        let Some(snapshot) = services.capture() else {
            return false;
        };
        let Some(_) = services
            .vision
            .match_template(UiElement::DropsScreen, &snapshot)
        else {
            tracing::debug!("no drops screen");
            return true;
        };

        let candidates = services
            .vision
            .recognize_text(TextProfile::DropItems, &snapshot);
        for preferred in &self.order_of_drops {
            if let Some(candidate) = candidates.iter().find(|c| &c.text == preferred) {
                tracing::info!(drop = %preferred, "collecting drop");
                return services.tap(candidate.rect.center());
            }
        }
        services.click(UiElement::DropsCancel, 1)
    }
}

impl StrategicPolicy for AutonomousPolicy {
    fn prepare(&mut self, _tracker: &mut StateTracker) {
        self.strategies = self.template.clone();
        self.scripted_units = self.deploy_targets.clone();
    }

    fn bind_placeholders(&mut self, placeholders: &PlaceholderMap) {
        self.scripted_units = self
            .deploy_targets
            .iter()
            .map(|target| placeholders.get(target).unwrap_or(target).to_string())
            .collect();
    }

    fn on_idle(&mut self, tracker: &mut StateTracker, snapshot: Option<&Snapshot>) -> bool {
        let snapshot = match snapshot {
            Some(s) => s.clone(),
            None => match tracker.capture() {
                Some(s) => s,
                None => return tracker.in_battle(),
            },
        };
        if !tracker.refresh(&snapshot) {
            return false;
        }

        let (cores, tools) = self.partition(tracker.roster());
        for tool in &tools {
            tracker.seed_skill_usage(&tool.name, SkillUsage::Auto);
        }

        if let Decision::Deploy {
            name,
            location,
            direction,
            quota,
        } = self.decide(&cores, &tools)
        {
            if tracker.deploy(&name, location, direction) {
                if let Some((strategy, quota)) = quota {
                    self.strategies[strategy].tool_men[quota].quantity -= 1;
                }
            }
            return true;
        }

        if self.draw_as_possible {
            self.draw_card(tracker, false);
        }

        tracker.use_all_ready_skills(&snapshot);
        true
    }

    fn on_derived_action(&mut self, tracker: &mut StateTracker, action: &Action, target: &str) -> bool {
        match action.kind {
            ActionKind::DrawCard => self.draw_card(tracker, true),
            ActionKind::CheckAbort => self.check_abort(tracker, action, target),
            ActionKind::CollectDrops => self.collect_drops(tracker),
            other => {
                tracing::error!(kind = other.name(), "unknown action type");
                false
            }
        }
    }

    /// Skip the preparation screen when it shows up, then wait for battle
    fn wait_until_start(&mut self, tracker: &mut StateTracker) -> bool {
        while !tracker.need_exit() {
            if let Some(snapshot) = tracker.capture() {
                if tracker.check_in_battle(&snapshot, true) {
                    return true;
                }
                let services = tracker.services();
                if let Some(rect) = services
                    .vision
                    .match_template(UiElement::FightDirectly, &snapshot)
                {
                    services.tap(rect.center());
                }
            }
            tracker.services().throttle();
        }
        false
    }

    fn waits_until_end(&self) -> bool {
        true
    }
}
