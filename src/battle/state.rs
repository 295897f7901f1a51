//! Live battle state built from screen snapshots
//!
//! The tracker is the only writer of counters and roster data. Everything
//! else reads through its accessors. Unit actions try the known coordinates
//! first and fall back to a fresh visual lookup when those are missing.

use ahash::AHashMap;
use std::collections::BTreeMap;

use crate::battle::grid::{StageLayout, TileGrid};
use crate::battle::roster::{DeployDirection, DeploymentUnit, KillCount, SkillUsage};
use crate::core::types::{GridPoint, Point, Rect};
use crate::device::{ScreenState, Services, Snapshot, UiElement};

/// Numeric counters read from the battle HUD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct BattleCounters {
    cost: i32,
    kills: KillCount,
    in_battle: bool,
}

/// Battle model owned by the running attempt
pub struct StateTracker {
    services: Services,
    grid: Option<TileGrid>,
    counters: BattleCounters,
    /// Units waiting on the roster panel, by name
    roster: BTreeMap<String, DeploymentUnit>,
    /// Deployed units, by name
    battlefield: BTreeMap<String, GridPoint>,
    used_tiles: BTreeMap<GridPoint, String>,
    skill_usage: AHashMap<String, SkillUsage>,
    unknown_streak: u32,
    camera_moves: u32,
    abandoned: bool,
}

impl StateTracker {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            grid: None,
            counters: BattleCounters::default(),
            roster: BTreeMap::new(),
            battlefield: BTreeMap::new(),
            used_tiles: BTreeMap::new(),
            skill_usage: AHashMap::new(),
            unknown_streak: 0,
            camera_moves: 0,
            abandoned: false,
        }
    }

    /// Forget everything from a previous attempt
    pub fn reset(&mut self) {
        self.grid = None;
        self.counters = BattleCounters::default();
        self.roster.clear();
        self.battlefield.clear();
        self.used_tiles.clear();
        self.skill_usage.clear();
        self.unknown_streak = 0;
        self.camera_moves = 0;
        self.abandoned = false;
    }

    pub fn load_grid(&mut self, layout: &StageLayout) {
        tracing::debug!(stage = %layout.stage, tiles = layout.tiles.len(), "grid loaded");
        self.grid = Some(TileGrid::build(layout));
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn need_exit(&self) -> bool {
        self.services.need_exit()
    }

    // === ACCESSORS ===

    pub fn grid(&self) -> Option<&TileGrid> {
        self.grid.as_ref()
    }

    pub fn cost(&self) -> i32 {
        self.counters.cost
    }

    pub fn kills(&self) -> i32 {
        self.counters.kills.kills
    }

    pub fn in_battle(&self) -> bool {
        self.counters.in_battle
    }

    pub fn roster(&self) -> &BTreeMap<String, DeploymentUnit> {
        &self.roster
    }

    pub fn unit(&self, name: &str) -> Option<&DeploymentUnit> {
        self.roster.get(name)
    }

    pub fn battlefield(&self) -> &BTreeMap<String, GridPoint> {
        &self.battlefield
    }

    pub fn unit_at(&self, loc: GridPoint) -> Option<&str> {
        self.used_tiles.get(&loc).map(String::as_str)
    }

    /// Roster units currently cooling down
    pub fn cooling_count(&self) -> usize {
        self.roster.values().filter(|u| u.cooling).count()
    }

    pub fn was_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn camera_moves(&self) -> u32 {
        self.camera_moves
    }

    pub fn skill_usage(&self, name: &str) -> SkillUsage {
        self.skill_usage.get(name).copied().unwrap_or_default()
    }

    pub fn set_skill_usage(&mut self, name: &str, usage: SkillUsage) {
        self.skill_usage.insert(name.to_string(), usage);
    }

    /// Set a usage only if the unit has none yet
    pub fn seed_skill_usage(&mut self, name: &str, usage: SkillUsage) {
        self.skill_usage.entry(name.to_string()).or_insert(usage);
    }

    // === OBSERVATION ===

    /// Capture a snapshot (absence on device failure)
    pub fn capture(&self) -> Option<Snapshot> {
        self.services.capture()
    }

    /// Apply every fact recognized on a snapshot; returns the in-battle flag
    pub fn refresh(&mut self, snapshot: &Snapshot) -> bool {
        let facts = self.services.vision.battle_facts(snapshot);
        if !self.apply_screen(facts.screen, false) {
            return false;
        }

        if let Some(cost) = facts.cost {
            self.counters.cost = cost;
        }
        if let Some(kills) = facts.kills {
            // Counters never go back within an attempt; a lower read is noise
            let current = &mut self.counters.kills;
            current.kills = current.kills.max(kills.kills);
            current.total = current.total.max(kills.total);
        }
        if let Some(units) = facts.roster {
            self.roster = units.into_iter().map(|u| (u.name.clone(), u)).collect();
        }
        true
    }

    /// Capture and refresh in one go
    pub fn refresh_now(&mut self) -> Option<Snapshot> {
        let snapshot = self.capture()?;
        self.refresh(&snapshot);
        Some(snapshot)
    }

    /// Is the battle screen still showing?
    ///
    /// In weak mode a few unrecognizable frames keep the previous verdict.
    pub fn check_in_battle(&mut self, snapshot: &Snapshot, weak: bool) -> bool {
        let screen = self.services.vision.battle_facts(snapshot).screen;
        self.apply_screen(screen, weak)
    }

    fn apply_screen(&mut self, screen: ScreenState, weak: bool) -> bool {
        match screen {
            ScreenState::InBattle => {
                self.unknown_streak = 0;
                self.counters.in_battle = true;
            }
            ScreenState::OutOfBattle => {
                self.unknown_streak = 0;
                self.counters.in_battle = false;
            }
            ScreenState::Unknown => {
                if weak && self.unknown_streak < self.services.config.weak_grace_polls {
                    self.unknown_streak += 1;
                } else {
                    self.counters.in_battle = false;
                }
            }
        }
        self.counters.in_battle
    }

    /// Poll until the battle screen shows up
    pub fn wait_until_start(&mut self, weak: bool) -> bool {
        while !self.need_exit() {
            if let Some(snapshot) = self.capture() {
                if self.check_in_battle(&snapshot, weak) {
                    return true;
                }
            }
            self.services.throttle();
        }
        false
    }

    /// Keep firing auto skills until the battle screen goes away
    pub fn wait_until_end(&mut self, weak: bool) -> bool {
        while !self.need_exit() {
            let Some(snapshot) = self.capture() else {
                self.services.throttle();
                continue;
            };
            if !self.check_in_battle(&snapshot, weak) {
                break;
            }
            self.use_all_ready_skills(&snapshot);
            self.services.throttle();
        }
        true
    }

    // === UNIT ACTIONS ===

    fn tile_pixel(&self, loc: GridPoint) -> Option<Point> {
        self.grid.as_ref().and_then(|g| g.pixel_of(loc))
    }

    fn tile_rect(&self, loc: GridPoint) -> Option<Rect> {
        self.grid.as_ref().and_then(|g| g.tile_rect(loc))
    }

    /// Roster slot of a unit, re-reading the panel when it is not cached
    fn find_slot(&mut self, name: &str) -> Option<Rect> {
        if let Some(unit) = self.roster.get(name) {
            return Some(unit.rect);
        }
        tracing::debug!(unit = name, "slot unknown, looking it up");
        self.refresh_now()?;
        self.roster.get(name).map(|u| u.rect)
    }

    /// Drag a unit from the roster panel onto a tile and give it a facing
    pub fn deploy(&mut self, name: &str, loc: GridPoint, direction: DeployDirection) -> bool {
        let Some(slot) = self.find_slot(name) else {
            tracing::warn!(unit = name, "unit not on roster panel");
            return false;
        };
        self.drop_unit(name, slot, loc, direction)
    }

    /// Deploy using only the cached slot (paused game, nothing moves)
    pub fn deploy_from_known_slot(
        &mut self,
        name: &str,
        loc: GridPoint,
        direction: DeployDirection,
    ) -> bool {
        let Some(slot) = self.roster.get(name).map(|u| u.rect) else {
            tracing::warn!(unit = name, "no cached slot for unit");
            return false;
        };
        self.drop_unit(name, slot, loc, direction)
    }

    fn drop_unit(
        &mut self,
        name: &str,
        slot: Rect,
        loc: GridPoint,
        direction: DeployDirection,
    ) -> bool {
        let Some(target) = self.tile_pixel(loc) else {
            tracing::warn!(unit = name, x = loc.x, y = loc.y, "tile not on map");
            return false;
        };

        let config = self.services.config.clone();
        if !self
            .services
            .swipe(slot.center(), target, config.deploy_swipe_ms)
        {
            return false;
        }

        if let Some((dx, dy)) = direction.offset() {
            let end = target.offset(dx * config.facing_swipe_px, dy * config.facing_swipe_px);
            if !self.services.swipe(target, end, config.facing_swipe_ms) {
                return false;
            }
        }

        self.roster.remove(name);
        if let Some(previous) = self.used_tiles.insert(loc, name.to_string()) {
            self.battlefield.remove(&previous);
        }
        self.battlefield.insert(name.to_string(), loc);
        tracing::info!(unit = name, x = loc.x, y = loc.y, "deployed");
        true
    }

    /// Tap a unit's roster slot
    pub fn select_on_deployment(&mut self, name: &str) -> bool {
        match self.find_slot(name) {
            Some(slot) => self.services.tap(slot.center()),
            None => {
                tracing::warn!(unit = name, "unit not on roster panel");
                false
            }
        }
    }

    /// Tap a deployed unit by name
    ///
    /// Vision offers no by-name lookup on the battlefield, so the deploy
    /// bookkeeping is the only source; an unrecorded unit is not found.
    pub fn select_on_battlefield(&mut self, name: &str) -> bool {
        match self.battlefield.get(name).copied() {
            Some(loc) => self.select_at(loc),
            None => {
                tracing::warn!(unit = name, "unit not on battlefield");
                false
            }
        }
    }

    /// Tap a tile
    pub fn select_at(&mut self, loc: GridPoint) -> bool {
        match self.tile_pixel(loc) {
            Some(p) => self.services.tap(p),
            None => false,
        }
    }

    /// Tap the retreat control of the selected unit (no recognition wait)
    pub fn click_retreat(&mut self) -> bool {
        self.services
            .click(UiElement::RetreatButton, self.services.config.ui_retries)
    }

    /// Tap the skill control once it shows up
    pub fn click_skill(&mut self, keep_waiting: bool) -> bool {
        let attempts = if keep_waiting {
            self.services.config.skill_button_retries
        } else {
            1
        };
        self.services.click(UiElement::SkillButton, attempts)
    }

    /// Retreat a unit recorded on the battlefield (see `select_on_battlefield`)
    pub fn retreat_by_name(&mut self, name: &str) -> bool {
        if !(self.select_on_battlefield(name) && self.click_retreat()) {
            return false;
        }
        if let Some(loc) = self.battlefield.remove(name) {
            self.used_tiles.remove(&loc);
        }
        true
    }

    pub fn retreat_at(&mut self, loc: GridPoint) -> bool {
        if !(self.select_at(loc) && self.click_retreat()) {
            return false;
        }
        self.forget_tile(loc);
        true
    }

    /// Bookkeeping after a retreat whose target was selected beforehand
    pub fn forget_tile(&mut self, loc: GridPoint) {
        if let Some(name) = self.used_tiles.remove(&loc) {
            self.battlefield.remove(&name);
        }
    }

    pub fn forget_unit(&mut self, name: &str) {
        if let Some(loc) = self.battlefield.remove(name) {
            self.used_tiles.remove(&loc);
        }
    }

    /// Skill of a unit recorded on the battlefield (see `select_on_battlefield`)
    pub fn use_skill_by_name(&mut self, name: &str, keep_waiting: bool) -> bool {
        self.select_on_battlefield(name) && self.click_skill(keep_waiting)
    }

    pub fn use_skill_at(&mut self, loc: GridPoint, keep_waiting: bool) -> bool {
        self.select_at(loc) && self.click_skill(keep_waiting)
    }

    /// Fire the skill of every deployed auto-usage unit whose skill is ready
    pub fn use_all_ready_skills(&mut self, snapshot: &Snapshot) -> bool {
        let candidates: Vec<(String, GridPoint)> = self
            .battlefield
            .iter()
            .filter(|(name, _)| self.skill_usage(name).allows_auto())
            .map(|(name, loc)| (name.clone(), *loc))
            .collect();

        let mut current = snapshot.clone();
        let mut used_any = false;
        for (name, loc) in candidates {
            if self.need_exit() {
                break;
            }
            let Some(rect) = self.tile_rect(loc) else {
                continue;
            };
            if !self.services.vision.skill_ready(&current, rect) {
                continue;
            }
            if self.use_skill_at(loc, false) {
                tracing::debug!(unit = %name, "auto skill");
                used_any = true;
                // The screen changed; later checks need a new frame
                match self.capture() {
                    Some(s) => current = s,
                    None => break,
                }
            }
        }
        used_any
    }

    pub fn pause(&mut self) -> bool {
        self.services
            .click(UiElement::PauseButton, self.services.config.ui_retries)
    }

    pub fn speed_up(&mut self) -> bool {
        self.services
            .click(UiElement::SpeedButton, self.services.config.ui_retries)
    }

    /// Forfeit the battle
    pub fn abandon(&mut self) -> bool {
        let retries = self.services.config.ui_retries;
        let ok = self.services.click(UiElement::AbandonButton, retries)
            && self.services.click(UiElement::AbandonConfirm, retries);
        if ok {
            tracing::info!("battle abandoned");
            self.counters.in_battle = false;
            self.abandoned = true;
        }
        ok
    }

    /// Pan the camera by `delta` tiles and move the tile geometry with it
    pub fn move_camera(&mut self, delta: (f64, f64)) -> bool {
        let Some(tile_size) = self.grid.as_ref().map(|g| g.tile_size()) else {
            return false;
        };
        let Some(snapshot) = self.capture() else {
            return false;
        };

        let dx = (delta.0 * tile_size as f64).round() as i32;
        let dy = (delta.1 * tile_size as f64).round() as i32;
        let center = Point::new(snapshot.width as i32 / 2, snapshot.height as i32 / 2);
        // Dragging the view left moves the camera right
        let end = center.offset(-dx, -dy);
        if !self
            .services
            .swipe(center, end, self.services.config.camera_swipe_ms)
        {
            return false;
        }

        if let Some(grid) = self.grid.as_mut() {
            grid.shift_by(-dx, -dy);
        }
        self.camera_moves += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid::{Buildable, TileInfo};
    use crate::battle::roster::Role;
    use crate::core::config::EngineConfig;
    use crate::core::error::Result;
    use crate::device::{BattleFacts, DeviceController, TextCandidate, TextProfile, VisionAnalyzer};
    use crate::notify::RecordingSink;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Hands out queued facts, repeating the last one
    #[derive(Default)]
    struct ScriptedScreen {
        facts: Mutex<VecDeque<BattleFacts>>,
        swipes: Mutex<Vec<(Point, Point)>>,
        taps: Mutex<Vec<Point>>,
        /// Controls shown besides the retreat button
        controls: Mutex<Vec<(UiElement, Rect)>>,
    }

    impl ScriptedScreen {
        fn push(&self, facts: BattleFacts) {
            self.facts.lock().unwrap().push_back(facts);
        }
    }

    impl DeviceController for ScriptedScreen {
        fn capture(&self) -> Result<Snapshot> {
            Ok(Snapshot::blank(0, 1280, 720))
        }

        fn tap(&self, at: Point) -> Result<()> {
            self.taps.lock().unwrap().push(at);
            Ok(())
        }

        fn swipe(&self, from: Point, to: Point, _duration_ms: u64) -> Result<()> {
            self.swipes.lock().unwrap().push((from, to));
            Ok(())
        }
    }

    impl VisionAnalyzer for ScriptedScreen {
        fn battle_facts(&self, _snapshot: &Snapshot) -> BattleFacts {
            let mut facts = self.facts.lock().unwrap();
            if facts.len() > 1 {
                facts.pop_front().unwrap_or_default()
            } else {
                facts.front().cloned().unwrap_or_default()
            }
        }

        fn recognize_text(&self, _profile: TextProfile, _snapshot: &Snapshot) -> Vec<TextCandidate> {
            Vec::new()
        }

        fn match_template(&self, element: UiElement, _snapshot: &Snapshot) -> Option<Rect> {
            if element == UiElement::RetreatButton {
                return Some(Rect::new(480, 260, 60, 60));
            }
            self.controls
                .lock()
                .unwrap()
                .iter()
                .find(|(e, _)| *e == element)
                .map(|(_, rect)| *rect)
        }

        fn skill_ready(&self, _snapshot: &Snapshot, _around: Rect) -> bool {
            false
        }
    }

    fn in_battle(cost: i32, kills: i32, roster: Option<Vec<DeploymentUnit>>) -> BattleFacts {
        BattleFacts {
            screen: ScreenState::InBattle,
            cost: Some(cost),
            kills: Some(KillCount { kills, total: 10 }),
            roster,
        }
    }

    fn unknown() -> BattleFacts {
        BattleFacts::default()
    }

    fn tracker(screen: &Arc<ScriptedScreen>) -> StateTracker {
        let config = EngineConfig {
            weak_grace_polls: 2,
            poll_interval_ms: 0,
            ..EngineConfig::default()
        };
        let services = Services::new(
            screen.clone(),
            screen.clone(),
            Arc::new(RecordingSink::new()),
            config,
        );
        let mut tracker = StateTracker::new(services);
        tracker.load_grid(&StageLayout {
            stage: "Test".into(),
            tile_size: 50,
            tiles: (0..3)
                .map(|x| TileInfo {
                    loc: GridPoint::new(x, 0),
                    pos: Point::new(100 + x * 100, 300),
                    buildable: Buildable::Any,
                })
                .collect(),
        });
        tracker
    }

    fn panel() -> Vec<DeploymentUnit> {
        vec![
            DeploymentUnit::new("Texas", Role::Warrior, Rect::new(1000, 620, 90, 90))
                .with_available(true),
            DeploymentUnit::new("Myrtle", Role::Pioneer, Rect::new(900, 620, 90, 90))
                .with_available(true),
        ]
    }

    #[test]
    fn test_refresh_keeps_kills_monotonic() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        screen.push(in_battle(12, 4, None));
        screen.push(in_battle(13, 2, None));
        screen.push(BattleFacts {
            screen: ScreenState::InBattle,
            ..Default::default()
        });

        tracker.refresh_now();
        assert_eq!((tracker.cost(), tracker.kills()), (12, 4));
        tracker.refresh_now();
        assert_eq!((tracker.cost(), tracker.kills()), (13, 4));
        // Unreadable counters keep their previous values
        tracker.refresh_now();
        assert_eq!((tracker.cost(), tracker.kills()), (13, 4));
        assert!(tracker.in_battle());
    }

    #[test]
    fn test_weak_check_tolerates_unknown_frames() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        let frame = Snapshot::blank(0, 1280, 720);

        screen.push(in_battle(0, 0, None));
        screen.push(unknown());
        assert!(tracker.check_in_battle(&frame, true));

        assert!(tracker.check_in_battle(&frame, true));
        assert!(tracker.check_in_battle(&frame, true));
        assert!(!tracker.check_in_battle(&frame, true));
    }

    #[test]
    fn test_strong_check_drops_on_unknown() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        let frame = Snapshot::blank(0, 1280, 720);

        screen.push(in_battle(0, 0, None));
        screen.push(unknown());
        assert!(tracker.check_in_battle(&frame, false));
        assert!(!tracker.check_in_battle(&frame, false));
    }

    #[test]
    fn test_deploy_moves_unit_to_battlefield() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        screen.push(in_battle(20, 0, Some(panel())));
        tracker.refresh_now();

        assert!(tracker.deploy("Texas", GridPoint::new(1, 0), DeployDirection::Up));
        assert!(tracker.unit("Texas").is_none());
        assert_eq!(tracker.unit_at(GridPoint::new(1, 0)), Some("Texas"));

        let swipes = screen.swipes.lock().unwrap().clone();
        assert_eq!(swipes.len(), 2);
        assert_eq!(swipes[0], (Point::new(1045, 665), Point::new(200, 300)));
        assert_eq!(swipes[1], (Point::new(200, 300), Point::new(200, 100)));
    }

    #[test]
    fn test_deploy_on_occupied_tile_replaces_unit() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        screen.push(in_battle(20, 0, Some(panel())));
        tracker.refresh_now();

        assert!(tracker.deploy_from_known_slot("Texas", GridPoint::new(0, 0), DeployDirection::None));
        assert!(tracker.deploy_from_known_slot("Myrtle", GridPoint::new(0, 0), DeployDirection::None));

        assert_eq!(tracker.unit_at(GridPoint::new(0, 0)), Some("Myrtle"));
        assert_eq!(tracker.battlefield().len(), 1);
    }

    #[test]
    fn test_deploy_off_map_does_nothing() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        screen.push(in_battle(20, 0, Some(panel())));
        tracker.refresh_now();

        assert!(!tracker.deploy("Texas", GridPoint::new(7, 7), DeployDirection::Right));
        assert!(screen.swipes.lock().unwrap().is_empty());
        assert!(tracker.unit("Texas").is_some());
    }

    #[test]
    fn test_retreat_at_forgets_tile() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        screen.push(in_battle(20, 0, Some(panel())));
        tracker.refresh_now();
        tracker.deploy("Texas", GridPoint::new(2, 0), DeployDirection::None);

        assert!(tracker.retreat_at(GridPoint::new(2, 0)));
        assert!(tracker.battlefield().is_empty());
        let taps = screen.taps.lock().unwrap().clone();
        assert_eq!(taps, vec![Point::new(300, 300), Point::new(510, 290)]);
    }

    #[test]
    fn test_camera_pan_shifts_grid() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);

        assert!(tracker.move_camera((0.5, -1.0)));
        assert_eq!(tracker.camera_moves(), 1);
        assert_eq!(tracker.grid().map(|g| g.shift()), Some((-25, 50)));
        assert_eq!(
            tracker.grid().and_then(|g| g.pixel_of(GridPoint::new(0, 0))),
            Some(Point::new(75, 350))
        );
    }

    #[test]
    fn test_reset_clears_attempt_state() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        screen.push(in_battle(20, 3, Some(panel())));
        tracker.refresh_now();
        tracker.set_skill_usage("Texas", SkillUsage::Auto);

        tracker.reset();
        assert!(tracker.grid().is_none());
        assert!(tracker.roster().is_empty());
        assert_eq!(tracker.kills(), 0);
        assert_eq!(tracker.skill_usage("Texas"), SkillUsage::default());
    }

    #[test]
    fn test_pause_taps_pause_control() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);

        assert!(!tracker.pause());
        assert!(screen.taps.lock().unwrap().is_empty());

        screen
            .controls
            .lock()
            .unwrap()
            .push((UiElement::PauseButton, Rect::new(1180, 20, 60, 60)));
        assert!(tracker.pause());
        assert_eq!(screen.taps.lock().unwrap().clone(), vec![Point::new(1210, 50)]);
    }

    #[test]
    fn test_pause_freezes_simulated_battle() {
        use crate::sim::{SimBattlefield, SimScenario, SimStage};

        let sim = Arc::new(SimBattlefield::new(SimScenario::single(
            SimStage::new("Test").with_cost(0, 1),
        )));
        sim.start_battle();
        let services = sim.services(
            Arc::new(RecordingSink::new()),
            EngineConfig::new().with_poll_interval_ms(0),
        );
        let mut tracker = StateTracker::new(services);

        assert!(tracker.pause());
        let frozen = sim.cost();
        tracker.refresh_now();
        tracker.refresh_now();
        assert_eq!(sim.cost(), frozen);
        assert_eq!(tracker.cost(), frozen);

        // Second toggle resumes
        assert!(tracker.pause());
        tracker.refresh_now();
        assert!(sim.cost() > frozen);
        assert_eq!(sim.report().pause_toggles, 2);
    }

    #[test]
    fn test_unrecorded_unit_is_not_selected() {
        let screen = Arc::new(ScriptedScreen::default());
        let mut tracker = tracker(&screen);
        screen.push(in_battle(20, 0, Some(panel())));
        tracker.refresh_now();

        assert!(!tracker.retreat_by_name("Texas"));
        assert!(!tracker.use_skill_by_name("Texas", false));
        assert!(screen.taps.lock().unwrap().is_empty());
    }
}
