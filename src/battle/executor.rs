//! Script execution loop
//!
//! Per attempt: reset -> grid -> start wait -> full refresh -> group
//! allocation -> actions. Per action: notify -> wait-conditions -> pre-delay
//! -> dispatch -> post-delay. Every wait is a poll loop that runs the policy's
//! idle hook, so the game keeps progressing while the script waits.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::battle::ai::StrategicPolicy;
use crate::battle::allocation::PlaceholderMap;
use crate::battle::grid::{LayoutStore, StageLayout};
use crate::battle::script::{Action, ActionKind, CopilotScript};
use crate::battle::state::StateTracker;
use crate::core::error::{CopilotError, Result};
use crate::device::{Services, Snapshot};
use crate::notify::{AttemptOutcome, CopilotEvent};

/// Walks one script against the live battle
pub struct ScriptExecutor<P: StrategicPolicy> {
    tracker: StateTracker,
    policy: P,
    script: CopilotScript,
    layout: Option<StageLayout>,
    placeholders: PlaceholderMap,
    in_bullet_time: bool,
}

impl<P: StrategicPolicy> ScriptExecutor<P> {
    pub fn new(services: Services, script: CopilotScript, layouts: &LayoutStore, policy: P) -> Self {
        let layout = layouts.get(&script.stage_name).cloned();
        Self {
            tracker: StateTracker::new(services),
            policy,
            script,
            layout,
            placeholders: PlaceholderMap::new(),
            in_bullet_time: false,
        }
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn script(&self) -> &CopilotScript {
        &self.script
    }

    pub fn placeholders(&self) -> &PlaceholderMap {
        &self.placeholders
    }

    pub fn in_bullet_time(&self) -> bool {
        self.in_bullet_time
    }

    fn services(&self) -> &Services {
        self.tracker.services()
    }

    fn need_exit(&self) -> bool {
        self.tracker.need_exit()
    }

    /// Run one full battle attempt
    ///
    /// Only configuration problems are errors; everything that happens on
    /// the battlefield is reported through the outcome.
    pub fn run_attempt(&mut self) -> Result<AttemptOutcome> {
        self.tracker.reset();
        self.placeholders = PlaceholderMap::new();
        self.in_bullet_time = false;

        self.script.validate()?;
        let Some(layout) = self.layout.clone() else {
            tracing::error!(stage = %self.script.stage_name, "no layout for stage");
            self.services().notify(CopilotEvent::UnsupportedStage {
                stage: self.script.stage_name.clone(),
            });
            return Err(CopilotError::UnknownStage(self.script.stage_name.clone()));
        };
        self.tracker.load_grid(&layout);
        self.policy.prepare(&mut self.tracker);

        if !self.policy.wait_until_start(&mut self.tracker) {
            return Ok(if self.need_exit() {
                AttemptOutcome::Cancelled
            } else {
                AttemptOutcome::NotStarted
            });
        }

        self.tracker.refresh_now();
        self.to_group();
        self.policy.bind_placeholders(&self.placeholders);

        let mut failed_step = None;
        for index in 0..self.script.actions.len() {
            if self.need_exit() || !self.tracker.in_battle() {
                break;
            }
            if !self.do_action(index) && self.tracker.in_battle() && !self.need_exit() {
                tracing::warn!(index, "step failed, giving up attempt");
                failed_step = Some(index);
                break;
            }
        }

        if failed_step.is_none()
            && self.policy.waits_until_end()
            && self.tracker.in_battle()
            && !self.need_exit()
        {
            self.idle_until_end();
        }

        let outcome = if self.need_exit() {
            AttemptOutcome::Cancelled
        } else if self.tracker.was_abandoned() {
            AttemptOutcome::Abandoned
        } else if let Some(index) = failed_step {
            AttemptOutcome::StepFailed { index }
        } else {
            AttemptOutcome::Completed
        };
        tracing::info!(stage = %self.script.stage_name, ?outcome, "attempt finished");
        Ok(outcome)
    }

    /// Resolve groups against the roster and seed skill usage from them
    fn to_group(&mut self) {
        let roster_names: BTreeSet<String> = self.tracker.roster().keys().cloned().collect();
        self.placeholders =
            PlaceholderMap::build(&self.script.groups, &roster_names, &self.script.actions);

        for (placeholder, identity) in self.placeholders.iter() {
            let member = self
                .script
                .group(placeholder)
                .and_then(|g| g.member(identity));
            if let Some(member) = member {
                self.tracker
                    .seed_skill_usage(identity, member.skill_usage);
            }
        }
        tracing::debug!(resolved = self.placeholders.len(), "groups allocated");
    }

    fn resolve(&mut self, target: &str) -> String {
        if target.is_empty() {
            String::new()
        } else {
            self.placeholders.resolve(target)
        }
    }

    fn notify_action(&self, action: &Action, target: &str) {
        self.services().notify(CopilotEvent::CopilotAction {
            action: action.kind.name().to_string(),
            target: target.to_string(),
            doc: action.doc.clone(),
            doc_color: action.doc_color.clone(),
        });
    }

    fn do_action(&mut self, index: usize) -> bool {
        let action = self.script.actions[index].clone();
        let name = self.resolve(&action.target);

        self.notify_action(&action, &name);

        if !self.wait_condition(&action, &name) {
            return false;
        }
        if action.pre_delay > 0 {
            self.sleep_and_idle(action.pre_delay);
            // The screen may have changed while sleeping
            self.tracker.refresh_now();
        }

        let ret = match action.kind {
            ActionKind::Deploy => {
                let ok = self.dispatch_deploy(&action, &name);
                if ok {
                    self.in_bullet_time = false;
                }
                ok
            }
            ActionKind::Retreat => {
                let ok = if self.in_bullet_time {
                    self.tracker.click_retreat()
                } else {
                    match action.location {
                        Some(loc) => self.tracker.retreat_at(loc),
                        None => self.tracker.retreat_by_name(&name),
                    }
                };
                if ok && self.in_bullet_time {
                    match action.location {
                        Some(loc) => self.tracker.forget_tile(loc),
                        None => self.tracker.forget_unit(&name),
                    }
                }
                if ok {
                    self.in_bullet_time = false;
                }
                ok
            }
            ActionKind::UseSkill => {
                let ok = if self.in_bullet_time {
                    self.tracker.click_skill(true)
                } else {
                    match action.location {
                        Some(loc) => self.tracker.use_skill_at(loc, true),
                        None => self.tracker.use_skill_by_name(&name, true),
                    }
                };
                if ok {
                    self.in_bullet_time = false;
                }
                ok
            }
            ActionKind::SwitchSpeed => self.tracker.speed_up(),
            ActionKind::BulletTime => {
                let ok = self.enter_bullet_time_for_next_action(index, &action, &name);
                if ok {
                    self.in_bullet_time = true;
                }
                ok
            }
            ActionKind::SkillUsage => {
                self.tracker.set_skill_usage(&name, action.modify_usage);
                true
            }
            ActionKind::Output => true,
            ActionKind::MoveCamera => self.tracker.move_camera(action.distance),
            ActionKind::SkillDaemon => self.tracker.wait_until_end(true),
            ActionKind::DrawCard | ActionKind::CheckAbort | ActionKind::CollectDrops => {
                self.policy
                    .on_derived_action(&mut self.tracker, &action, &name)
            }
        };

        self.sleep_and_idle(action.post_delay);
        ret
    }

    fn dispatch_deploy(&mut self, action: &Action, name: &str) -> bool {
        let Some(loc) = action.location else {
            tracing::warn!(unit = name, "deploy without location");
            return false;
        };
        let placeable = self
            .tracker
            .grid()
            .is_some_and(|g| g.is_placeable(loc));
        if !placeable {
            tracing::warn!(unit = name, x = loc.x, y = loc.y, "tile is not placeable");
            return false;
        }

        if self.in_bullet_time {
            self.tracker
                .deploy_from_known_slot(name, loc, action.direction)
        } else {
            self.tracker.deploy(name, loc, action.direction)
        }
    }

    /// Select the target of the following step while the game is slowed
    fn enter_bullet_time_for_next_action(
        &mut self,
        index: usize,
        action: &Action,
        name: &str,
    ) -> bool {
        let Some(next) = self.script.actions.get(index + 1).cloned() else {
            tracing::error!("bullet time has no following step");
            return false;
        };

        let target = if name.is_empty() {
            self.resolve(&next.target)
        } else {
            name.to_string()
        };

        match next.kind {
            ActionKind::Deploy => self.tracker.select_on_deployment(&target),
            ActionKind::UseSkill | ActionKind::Retreat => {
                match action.location.or(next.location) {
                    Some(loc) => self.tracker.select_at(loc),
                    None => self.tracker.select_on_battlefield(&target),
                }
            }
            other => {
                tracing::error!(
                    next = other.name(),
                    "bullet time must be followed by deploy, skill or retreat"
                );
                false
            }
        }
    }

    /// Evaluate wait-conditions in priority order
    fn wait_condition(&mut self, action: &Action, name: &str) -> bool {
        let cond = action.conditions;

        if cond.cost_changes != 0 {
            self.tracker.refresh_now();
            let start_cost = self.tracker.cost();
            if !self.poll_until(|t| cond.cost_delta_reached(start_cost, t.cost())) {
                return false;
            }
        }

        if cond.kills > 0 && self.tracker.kills() < cond.kills {
            if !self.poll_until(|t| t.kills() >= cond.kills) {
                return false;
            }
        }

        if cond.costs > 0 && !self.poll_until(|t| t.cost() >= cond.costs) {
            return false;
        }

        if let Some(cooling) = cond.cooling {
            if !self.poll_until(|t| t.cooling_count() == cooling) {
                return false;
            }
        }

        // Deploys also wait for cost / cooldown, except in bullet time
        if !self.in_bullet_time && action.kind == ActionKind::Deploy {
            let ready = |t: &StateTracker| t.unit(name).is_some_and(|u| u.available);
            if !self.poll_until(ready) {
                return false;
            }
        }

        true
    }

    /// Refresh, test, idle, repeat
    ///
    /// Fails as soon as the battle screen is gone or cancellation is
    /// requested, whatever the condition says.
    fn poll_until<F>(&mut self, mut satisfied: F) -> bool
    where
        F: FnMut(&StateTracker) -> bool,
    {
        let mut snapshot: Option<Snapshot> = self.tracker.capture();
        loop {
            if self.need_exit() {
                return false;
            }
            let in_battle = match &snapshot {
                Some(s) => self.tracker.refresh(s),
                None => self.tracker.in_battle(),
            };
            if !in_battle {
                return false;
            }
            if satisfied(&self.tracker) {
                return true;
            }
            if !self.policy.on_idle(&mut self.tracker, snapshot.as_ref()) {
                return false;
            }
            self.services().throttle();
            snapshot = self.tracker.capture();
        }
    }

    /// Timed delay that keeps the idle hook running
    fn sleep_and_idle(&mut self, millis: u64) {
        if millis == 0 {
            return;
        }
        let start = Instant::now();
        let delay = Duration::from_millis(millis);
        while !self.need_exit() && start.elapsed() < delay {
            if !self.policy.on_idle(&mut self.tracker, None) {
                break;
            }
            self.services().throttle();
        }
    }

    /// Let the policy manage the battle until it ends
    fn idle_until_end(&mut self) {
        while !self.need_exit() {
            let Some(snapshot) = self.tracker.capture() else {
                self.services().throttle();
                continue;
            };
            if !self.tracker.check_in_battle(&snapshot, true) {
                break;
            }
            if !self.policy.on_idle(&mut self.tracker, Some(&snapshot)) {
                break;
            }
            self.services().throttle();
        }
    }
}
