//! Multi-stage run: recognize the stage on screen, fight it, move on
//!
//! Stages are not scripted in advance. Each loop iteration reads the stage
//! name off the ready screen and picks the matching script. An unknown stage
//! or an exhausted retry budget ends the run through settlement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::battle::ai::{AutonomousPolicy, Strategy};
use crate::battle::executor::ScriptExecutor;
use crate::battle::grid::{LayoutStore, StageLayout};
use crate::battle::script::CopilotScript;
use crate::core::error::Result;
use crate::core::types::AttemptId;
use crate::device::{Services, TextProfile, UiElement};
use crate::notify::{AttemptOutcome, CopilotEvent};

pub const WHY_UNKNOWN_STAGE: &str = "Recognition error or unsupported stage";
pub const WHY_CANNOT_WIN: &str = "Can't win, run!";

/// Script and policy settings for one recognizable stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageScript {
    /// Name as displayed on the ready screen
    pub name: String,
    pub script: CopilotScript,
    /// Extra attempts after the first one
    #[serde(default)]
    pub retry_times: u32,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub draw_as_possible: bool,
    #[serde(default)]
    pub order_of_drops: Vec<String>,
}

impl StageScript {
    pub fn new(name: &str, script: CopilotScript) -> Self {
        Self {
            name: name.to_string(),
            script,
            retry_times: 0,
            strategies: Vec::new(),
            draw_as_possible: false,
            order_of_drops: Vec::new(),
        }
    }

    pub fn with_retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = retry_times;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Fresh policy for one attempt at this stage
    pub fn policy(&self) -> AutonomousPolicy {
        AutonomousPolicy::new(self.strategies.clone(), &self.script.actions)
            .with_draw_as_possible(self.draw_as_possible)
            .with_order_of_drops(self.order_of_drops.clone())
    }
}

/// Every stage a run may meet, with tile layouts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageCatalog {
    #[serde(default)]
    pub stages: BTreeMap<String, StageScript>,
    #[serde(default)]
    pub layouts: LayoutStore,
}

impl StageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: StageScript) -> Self {
        self.stages.insert(stage.name.clone(), stage);
        self
    }

    pub fn with_layout(mut self, layout: StageLayout) -> Self {
        self.layouts.insert(layout);
        self
    }

    pub fn stage(&self, name: &str) -> Option<&StageScript> {
        self.stages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }
}

/// Runs one battle attempt for a stage
pub trait AttemptRunner {
    fn run_attempt(
        &mut self,
        services: &Services,
        stage: &StageScript,
        layouts: &LayoutStore,
    ) -> Result<AttemptOutcome>;
}

/// Default runner: script executor with the autonomous policy
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorRunner;

impl AttemptRunner for ExecutorRunner {
    fn run_attempt(
        &mut self,
        services: &Services,
        stage: &StageScript,
        layouts: &LayoutStore,
    ) -> Result<AttemptOutcome> {
        let mut executor =
            ScriptExecutor::new(services.clone(), stage.script.clone(), layouts, stage.policy());
        executor.run_attempt()
    }
}

/// What happened on one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub attempts: u32,
    pub last_outcome: Option<AttemptOutcome>,
    pub won: bool,
}

/// Result of a whole stage-manager run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    /// Reason the run settled, if it did
    pub settlement: Option<String>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_attempts(&self) -> u32 {
        self.stages.iter().map(|s| s.attempts).sum()
    }
}

/// Outer loop over sequential stages
pub struct StageManager<R: AttemptRunner = ExecutorRunner> {
    services: Services,
    catalog: StageCatalog,
    remaining: BTreeMap<String, u32>,
    runner: R,
}

impl StageManager<ExecutorRunner> {
    pub fn new(services: Services, catalog: StageCatalog) -> Self {
        Self::with_runner(services, catalog, ExecutorRunner)
    }
}

impl<R: AttemptRunner> StageManager<R> {
    pub fn with_runner(services: Services, catalog: StageCatalog, runner: R) -> Self {
        Self {
            services,
            catalog,
            remaining: BTreeMap::new(),
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Retry budget left for a stage
    pub fn remaining(&self, stage: &str) -> Option<u32> {
        self.remaining.get(stage).copied()
    }

    pub fn run(&mut self) -> RunSummary {
        self.remaining = self
            .catalog
            .stages
            .values()
            .map(|s| (s.name.clone(), s.retry_times))
            .collect();

        let mut summary = RunSummary::default();
        while !self.services.need_exit() {
            if !self.confirm_ready() {
                break;
            }

            let Some(name) = self.analyze_stage() else {
                tracing::warn!("unknown stage, settling");
                self.settle(WHY_UNKNOWN_STAGE);
                summary.settlement = Some(WHY_UNKNOWN_STAGE.to_string());
                break;
            };

            let report = match self.fight_stage(&name) {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(stage = %name, error = %e, "stage cannot be run");
                    let why = e.to_string();
                    self.settle(&why);
                    summary.settlement = Some(why);
                    break;
                }
            };

            let won = report.won;
            summary.stages.push(report);
            if self.services.need_exit() {
                break;
            }
            if !won {
                tracing::warn!(stage = %name, "retries exhausted, settling");
                self.settle(WHY_CANNOT_WIN);
                summary.settlement = Some(WHY_CANNOT_WIN.to_string());
                break;
            }
        }

        summary.cancelled = self.services.need_exit();
        summary
    }

    /// Up to budget + 1 attempts; stops at the first success
    fn fight_stage(&mut self, name: &str) -> Result<StageReport> {
        let mut report = StageReport {
            stage: name.to_string(),
            attempts: 0,
            last_outcome: None,
            won: false,
        };
        let Some(stage) = self.catalog.stage(name).cloned() else {
            return Ok(report);
        };

        let times = self.remaining.get(name).copied().unwrap_or(0) + 1;
        for _ in 0..times {
            if self.services.need_exit() {
                break;
            }
            report.attempts += 1;
            tracing::info!(stage = %name, attempt = report.attempts, "try to fight");

            let outcome = if self.click_start_button() {
                self.services.notify(CopilotEvent::AttemptStarted {
                    stage: name.to_string(),
                    attempt: report.attempts,
                    attempt_id: AttemptId::new(),
                });
                let outcome =
                    self.runner
                        .run_attempt(&self.services, &stage, &self.catalog.layouts)?;
                self.services.notify(CopilotEvent::AttemptFinished {
                    stage: name.to_string(),
                    attempt: report.attempts,
                    outcome,
                });
                outcome
            } else {
                AttemptOutcome::NotStarted
            };
            report.last_outcome = Some(outcome);

            if outcome.is_success() && !self.services.need_exit() {
                report.won = true;
                break;
            }
            if let Some(left) = self.remaining.get_mut(name) {
                *left = left.saturating_sub(1);
            }
        }
        Ok(report)
    }

    /// Wait for the ready screen, acknowledging completion screens on the way
    fn confirm_ready(&self) -> bool {
        while !self.services.need_exit() {
            if let Some(snapshot) = self.services.capture() {
                let vision = &self.services.vision;
                if vision.match_template(UiElement::StageReady, &snapshot).is_some() {
                    return true;
                }
                if let Some(rect) = vision.match_template(UiElement::BattleComplete, &snapshot) {
                    self.services.tap(rect.center());
                }
            }
            self.services.throttle();
        }
        false
    }

    /// Best-scored stage name, if it names a known stage exactly
    fn analyze_stage(&self) -> Option<String> {
        let snapshot = self.services.capture()?;
        let candidates = self
            .services
            .vision
            .recognize_text(TextProfile::StageName, &snapshot);
        let best = candidates
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))?;

        if !self.catalog.contains(&best.text) {
            tracing::debug!(text = %best.text, "stage text not in catalog");
            return None;
        }
        self.services.notify(CopilotEvent::StageRecognized {
            stage: best.text.clone(),
        });
        Some(best.text.clone())
    }

    fn click_start_button(&self) -> bool {
        let retries = self.services.config.ui_retries;
        if !self.services.click(UiElement::StartFighting, retries) {
            return false;
        }
        // The tip only shows up sometimes
        self.services.click(UiElement::CloseTip, 1);
        true
    }

    /// Acknowledge the end-of-run screens
    fn settle(&self, why: &str) -> bool {
        self.services.notify(CopilotEvent::Settlement {
            why: why.to_string(),
        });
        let retries = self.services.config.ui_retries;
        self.services.click(UiElement::Settlement, retries)
            && self.services.click(UiElement::BattleComplete, retries)
    }
}
