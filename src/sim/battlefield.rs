//! In-memory battle that answers device and vision calls
//!
//! Every capture advances the battle by one tick. Taps and swipes are
//! interpreted against fixed control positions and the roster panel, the
//! same way a player's input would be. Snapshots carry no pixels; the
//! vision side reads the model directly.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::battle::roster::{DeploymentUnit, KillCount};
use crate::core::config::EngineConfig;
use crate::core::error::{CopilotError, Result};
use crate::core::types::{Point, Rect};
use crate::device::{
    BattleFacts, DeviceController, ScreenState, Services, Snapshot, TextCandidate, TextProfile,
    UiElement, VisionAnalyzer,
};
use crate::notify::NotificationSink;
use crate::sim::scenario::{SimScenario, SimStage, SimUnit};

pub const SCREEN_WIDTH: u32 = 1280;
pub const SCREEN_HEIGHT: u32 = 720;

const SLOT_SIZE: i32 = 90;
const SLOT_GAP: i32 = 10;
const PANEL_TOP: i32 = 620;
/// Tap distance that still selects a deployed unit
const HIT_RADIUS: i32 = 20;

/// Which screen the simulated game shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimScreen {
    Ready,
    Prep,
    Battle,
    Won,
    Settled,
    Done,
}

/// Raw input received from the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimInput {
    Tap(Point),
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u64,
    },
}

/// What the engine made the simulated game do
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimReport {
    pub battles_started: u32,
    pub battles_won: u32,
    pub abandoned: u32,
    pub deployments: Vec<(String, Point)>,
    pub retreats: Vec<String>,
    pub skills_used: Vec<String>,
    pub camera_pans: u32,
    pub speed_toggles: u32,
    pub pause_toggles: u32,
    pub cards_drawn: u32,
    pub drops_taken: Vec<String>,
    pub drops_dismissed: u32,
    pub settled: bool,
    pub frames: u64,
}

#[derive(Debug, Clone)]
struct PanelUnit {
    unit: SimUnit,
    cooldown: u32,
}

#[derive(Debug, Clone)]
struct FieldUnit {
    unit: SimUnit,
    at: Point,
    charge: u32,
}

impl FieldUnit {
    fn skill_ready(&self) -> bool {
        self.unit.skill_ticks > 0 && self.charge >= self.unit.skill_ticks
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Selection {
    Panel(String),
    Field(String),
}

#[derive(Debug)]
struct SimState {
    screen: SimScreen,
    stage_index: usize,
    tick: u64,
    cost: i32,
    kills: i32,
    panel: Vec<PanelUnit>,
    field: BTreeMap<String, FieldUnit>,
    selected: Option<Selection>,
    awaiting_facing: Option<String>,
    abandon_pending: bool,
    paused: bool,
    drawn: usize,
    drops_open: bool,
    rng: ChaCha8Rng,
    inputs: Vec<SimInput>,
    report: SimReport,
}

fn element_rect(element: UiElement) -> Rect {
    match element {
        UiElement::PauseButton => Rect::new(1180, 20, 60, 60),
        UiElement::SpeedButton => Rect::new(1100, 20, 60, 60),
        UiElement::AbandonButton => Rect::new(20, 20, 60, 60),
        UiElement::AbandonConfirm => Rect::new(580, 400, 120, 60),
        UiElement::RetreatButton => Rect::new(480, 260, 60, 60),
        UiElement::SkillButton => Rect::new(740, 260, 60, 60),
        UiElement::StartFighting | UiElement::FightDirectly => Rect::new(1100, 520, 150, 80),
        UiElement::CloseTip => Rect::new(1200, 100, 40, 40),
        UiElement::DrawCard => Rect::new(20, 520, 80, 80),
        UiElement::BattleComplete => Rect::new(540, 560, 200, 80),
        UiElement::StageReady => Rect::new(540, 20, 200, 60),
        UiElement::Settlement => Rect::new(20, 100, 120, 60),
        UiElement::DropsScreen => Rect::new(0, 480, 1280, 140),
        UiElement::DropsCancel => Rect::new(1150, 490, 100, 50),
    }
}

fn slot_rect(index: usize) -> Rect {
    let step = SLOT_SIZE + SLOT_GAP;
    let x = SCREEN_WIDTH as i32 - (index as i32 + 1) * step;
    Rect::new(x, PANEL_TOP, SLOT_SIZE, SLOT_SIZE)
}

fn drop_rect(index: usize) -> Rect {
    Rect::new(200 + index as i32 * 150, 500, 120, 100)
}

fn near(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() <= HIT_RADIUS && (a.y - b.y).abs() <= HIT_RADIUS
}

impl SimState {
    fn new(seed: u64) -> Self {
        Self {
            screen: SimScreen::Ready,
            stage_index: 0,
            tick: 0,
            cost: 0,
            kills: 0,
            panel: Vec::new(),
            field: BTreeMap::new(),
            selected: None,
            awaiting_facing: None,
            abandon_pending: false,
            paused: false,
            drawn: 0,
            drops_open: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
            inputs: Vec::new(),
            report: SimReport::default(),
        }
    }

    fn begin_battle(&mut self, stage: &SimStage) {
        self.screen = SimScreen::Battle;
        self.tick = 0;
        self.cost = stage.initial_cost;
        self.kills = 0;
        self.panel = stage
            .units
            .iter()
            .map(|u| PanelUnit {
                unit: u.clone(),
                cooldown: 0,
            })
            .collect();
        self.field.clear();
        self.selected = None;
        self.awaiting_facing = None;
        self.abandon_pending = false;
        self.paused = false;
        self.drawn = 0;
        self.drops_open = !stage.drops.is_empty();
        self.report.battles_started += 1;
        tracing::debug!(stage = %stage.name, "sim battle started");
    }

    fn leave_battle(&mut self, screen: SimScreen) {
        self.screen = screen;
        self.panel.clear();
        self.field.clear();
        self.selected = None;
        self.awaiting_facing = None;
        self.abandon_pending = false;
        self.drops_open = false;
    }

    fn advance(&mut self, stage: &SimStage) {
        if self.screen != SimScreen::Battle || self.paused {
            return;
        }
        self.tick += 1;
        self.cost = (self.cost + stage.cost_per_tick).clamp(0, stage.max_cost.max(0));
        for slot in &mut self.panel {
            slot.cooldown = slot.cooldown.saturating_sub(1);
        }
        for unit in self.field.values_mut() {
            unit.charge += 1;
        }

        if !self.field.is_empty() {
            if stage.kill_every > 0 && self.tick % stage.kill_every as u64 == 0 {
                self.kills += 1;
            }
            if stage.kill_chance > 0.0 && self.rng.gen_bool(stage.kill_chance.clamp(0.0, 1.0)) {
                self.kills += 1;
            }
            if stage.total_kills > 0 {
                self.kills = self.kills.min(stage.total_kills);
            }
        }

        let kill_goal = stage.total_kills > 0 && self.kills >= stage.total_kills;
        let survived = stage.end_after_ticks.is_some_and(|t| self.tick >= t);
        if kill_goal || survived {
            self.report.battles_won += 1;
            self.leave_battle(SimScreen::Won);
        }
    }

    fn visible(&self, stage: Option<&SimStage>, element: UiElement) -> bool {
        match self.screen {
            SimScreen::Ready => matches!(
                element,
                UiElement::StageReady | UiElement::StartFighting | UiElement::Settlement
            ),
            SimScreen::Prep => element == UiElement::FightDirectly,
            SimScreen::Battle => match element {
                UiElement::PauseButton
                | UiElement::SpeedButton
                | UiElement::AbandonButton
                | UiElement::Settlement => true,
                UiElement::AbandonConfirm => self.abandon_pending,
                UiElement::DrawCard => stage.is_some_and(|s| self.drawn < s.draw_pool.len()),
                UiElement::DropsScreen | UiElement::DropsCancel => self.drops_open,
                UiElement::RetreatButton => self.selected_field().is_some(),
                UiElement::SkillButton => self.selected_field().is_some_and(|u| u.skill_ready()),
                _ => false,
            },
            SimScreen::Won | SimScreen::Settled => element == UiElement::BattleComplete,
            SimScreen::Done => false,
        }
    }

    fn selected_field(&self) -> Option<&FieldUnit> {
        match &self.selected {
            Some(Selection::Field(name)) => self.field.get(name),
            _ => None,
        }
    }

    fn hit(&self, stage: Option<&SimStage>, element: UiElement, at: Point) -> bool {
        self.visible(stage, element) && element_rect(element).contains(at)
    }

    fn tap(&mut self, stage: Option<&SimStage>, at: Point) {
        match self.screen {
            SimScreen::Ready => {
                if self.hit(stage, UiElement::StartFighting, at) {
                    if let Some(stage) = stage {
                        if stage.prep_screen {
                            self.screen = SimScreen::Prep;
                        } else {
                            self.begin_battle(stage);
                        }
                    }
                } else if self.hit(stage, UiElement::Settlement, at) {
                    self.screen = SimScreen::Settled;
                }
            }
            SimScreen::Prep => {
                if self.hit(stage, UiElement::FightDirectly, at) {
                    if let Some(stage) = stage {
                        self.begin_battle(stage);
                    }
                }
            }
            SimScreen::Battle => self.tap_in_battle(stage, at),
            SimScreen::Won => {
                if self.hit(stage, UiElement::BattleComplete, at) {
                    self.stage_index += 1;
                    self.screen = SimScreen::Ready;
                }
            }
            SimScreen::Settled => {
                if self.hit(stage, UiElement::BattleComplete, at) {
                    self.screen = SimScreen::Done;
                    self.report.settled = true;
                }
            }
            SimScreen::Done => {}
        }
    }

    fn tap_in_battle(&mut self, stage: Option<&SimStage>, at: Point) {
        if self.hit(stage, UiElement::AbandonConfirm, at) {
            self.report.abandoned += 1;
            self.leave_battle(SimScreen::Ready);
            return;
        }

        if self.drops_open {
            if let Some(stage) = stage {
                if let Some(item) = (0..stage.drops.len())
                    .find(|i| drop_rect(*i).contains(at))
                    .map(|i| stage.drops[i].clone())
                {
                    self.report.drops_taken.push(item);
                    self.drops_open = false;
                    return;
                }
            }
            if self.hit(stage, UiElement::DropsCancel, at) {
                self.report.drops_dismissed += 1;
                self.drops_open = false;
                return;
            }
        }

        if self.hit(stage, UiElement::RetreatButton, at) {
            if let Some(Selection::Field(name)) = self.selected.take() {
                if let Some(unit) = self.field.remove(&name) {
                    self.panel.push(PanelUnit {
                        cooldown: unit.unit.redeploy_ticks,
                        unit: unit.unit,
                    });
                    self.report.retreats.push(name);
                }
            }
            return;
        }

        if self.hit(stage, UiElement::SkillButton, at) {
            if let Some(Selection::Field(name)) = self.selected.take() {
                if let Some(unit) = self.field.get_mut(&name) {
                    unit.charge = 0;
                    self.report.skills_used.push(name);
                }
            }
            return;
        }

        if self.hit(stage, UiElement::PauseButton, at) {
            self.paused = !self.paused;
            self.report.pause_toggles += 1;
        } else if self.hit(stage, UiElement::SpeedButton, at) {
            self.report.speed_toggles += 1;
        } else if self.hit(stage, UiElement::AbandonButton, at) {
            self.abandon_pending = true;
        } else if self.hit(stage, UiElement::Settlement, at) {
            self.leave_battle(SimScreen::Settled);
        } else if self.hit(stage, UiElement::DrawCard, at) {
            if let Some(unit) = stage.and_then(|s| s.draw_pool.get(self.drawn)) {
                self.panel.push(PanelUnit {
                    unit: unit.clone(),
                    cooldown: 0,
                });
                self.drawn += 1;
                self.report.cards_drawn += 1;
            }
        } else if let Some(index) = (0..self.panel.len()).find(|i| slot_rect(*i).contains(at)) {
            self.selected = Some(Selection::Panel(self.panel[index].unit.name.clone()));
        } else if let Some(name) = self
            .field
            .iter()
            .find(|(_, u)| near(u.at, at))
            .map(|(name, _)| name.clone())
        {
            self.selected = Some(Selection::Field(name));
        } else {
            self.selected = None;
        }
    }

    fn swipe(&mut self, from: Point, to: Point) {
        if self.screen != SimScreen::Battle {
            return;
        }
        self.selected = None;

        if let Some(index) = (0..self.panel.len()).find(|i| slot_rect(*i).contains(from)) {
            let slot = &self.panel[index];
            let on_panel = to.y >= PANEL_TOP;
            if slot.cooldown > 0 || slot.unit.cost > self.cost || on_panel {
                tracing::debug!(unit = %slot.unit.name, "sim rejected deploy");
                return;
            }
            let slot = self.panel.remove(index);
            let name = slot.unit.name.clone();
            self.cost -= slot.unit.cost;
            self.field.insert(
                name.clone(),
                FieldUnit {
                    unit: slot.unit,
                    at: to,
                    charge: 0,
                },
            );
            self.report.deployments.push((name.clone(), to));
            self.awaiting_facing = Some(name);
            return;
        }

        let facing = self
            .awaiting_facing
            .take()
            .and_then(|name| self.field.get(&name))
            .is_some_and(|u| near(u.at, from));
        if facing {
            return;
        }

        let (dx, dy) = (to.x - from.x, to.y - from.y);
        for unit in self.field.values_mut() {
            unit.at = unit.at.offset(dx, dy);
        }
        self.report.camera_pans += 1;
    }

    fn roster(&self) -> Vec<DeploymentUnit> {
        self.panel
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                DeploymentUnit::new(slot.unit.name.clone(), slot.unit.role, slot_rect(i))
                    .with_available(slot.cooldown == 0 && slot.unit.cost <= self.cost)
                    .with_cooling(slot.cooldown > 0)
            })
            .collect()
    }
}

/// Simulated game implementing both device and vision
pub struct SimBattlefield {
    scenario: SimScenario,
    state: Mutex<SimState>,
}

impl SimBattlefield {
    pub fn new(scenario: SimScenario) -> Self {
        let state = SimState::new(scenario.seed);
        Self {
            scenario,
            state: Mutex::new(state),
        }
    }

    /// Engine services wired to this battlefield
    pub fn services(
        self: &Arc<Self>,
        notifier: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Services {
        Services::new(self.clone(), self.clone(), notifier, config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| CopilotError::Device("simulator state poisoned".into()))
    }

    fn stage(&self, state: &SimState) -> Option<&SimStage> {
        self.scenario.stages.get(state.stage_index)
    }

    /// Skip the ready screen and start the current stage's battle
    pub fn start_battle(&self) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        let Some(stage) = self.scenario.stages.get(state.stage_index) else {
            return false;
        };
        state.begin_battle(stage);
        true
    }

    pub fn screen(&self) -> Option<SimScreen> {
        self.lock().ok().map(|s| s.screen)
    }

    pub fn cost(&self) -> i32 {
        self.lock().map(|s| s.cost).unwrap_or(0)
    }

    pub fn report(&self) -> SimReport {
        self.lock().map(|s| s.report.clone()).unwrap_or_default()
    }

    pub fn inputs(&self) -> Vec<SimInput> {
        self.lock().map(|s| s.inputs.clone()).unwrap_or_default()
    }
}

impl DeviceController for SimBattlefield {
    fn capture(&self) -> Result<Snapshot> {
        let mut state = self.lock()?;
        if let Some(stage) = self.scenario.stages.get(state.stage_index) {
            state.advance(stage);
        }
        state.report.frames += 1;
        Ok(Snapshot::blank(state.report.frames, SCREEN_WIDTH, SCREEN_HEIGHT))
    }

    fn tap(&self, at: Point) -> Result<()> {
        let mut state = self.lock()?;
        state.inputs.push(SimInput::Tap(at));
        let stage = self.scenario.stages.get(state.stage_index);
        state.tap(stage, at);
        Ok(())
    }

    fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        let mut state = self.lock()?;
        state.inputs.push(SimInput::Swipe {
            from,
            to,
            duration_ms,
        });
        state.swipe(from, to);
        Ok(())
    }
}

impl VisionAnalyzer for SimBattlefield {
    fn battle_facts(&self, _snapshot: &Snapshot) -> BattleFacts {
        let Ok(state) = self.lock() else {
            return BattleFacts::default();
        };
        if state.screen != SimScreen::Battle {
            return BattleFacts {
                screen: ScreenState::OutOfBattle,
                ..Default::default()
            };
        }
        let total = self.stage(&state).map(|s| s.total_kills).unwrap_or(0);
        BattleFacts {
            screen: ScreenState::InBattle,
            cost: Some(state.cost),
            kills: Some(KillCount {
                kills: state.kills,
                total,
            }),
            roster: Some(state.roster()),
        }
    }

    fn recognize_text(&self, profile: TextProfile, _snapshot: &Snapshot) -> Vec<TextCandidate> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        match profile {
            TextProfile::StageName if state.screen == SimScreen::Ready => self
                .stage(&state)
                .map(|s| TextCandidate {
                    text: s.name.clone(),
                    score: 0.9,
                    rect: element_rect(UiElement::StageReady),
                })
                .into_iter()
                .collect(),
            TextProfile::DropItems if state.drops_open => self
                .stage(&state)
                .map(|s| {
                    s.drops
                        .iter()
                        .enumerate()
                        .map(|(i, item)| TextCandidate {
                            text: item.clone(),
                            score: 0.8,
                            rect: drop_rect(i),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn match_template(&self, element: UiElement, _snapshot: &Snapshot) -> Option<Rect> {
        let state = self.lock().ok()?;
        state
            .visible(self.stage(&state), element)
            .then(|| element_rect(element))
    }

    fn skill_ready(&self, _snapshot: &Snapshot, around: Rect) -> bool {
        let Ok(state) = self.lock() else {
            return false;
        };
        state
            .field
            .values()
            .any(|u| around.contains(u.at) && u.skill_ready())
    }
}
