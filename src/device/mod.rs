//! Collaborator interfaces: device control and vision
//!
//! The engine never looks at pixels itself. It captures snapshots through a
//! [`DeviceController`], hands them to a [`VisionAnalyzer`] and acts on the
//! structured facts that come back. Both are synchronous and called from the
//! single engine thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::battle::roster::{DeploymentUnit, KillCount};
use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::core::types::{Point, Rect};
use crate::notify::{CopilotEvent, NotificationSink};

/// One captured screen
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Monotonic capture counter
    pub frame: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl Snapshot {
    /// Snapshot without pixel data (for analyzers that track state themselves)
    pub fn blank(frame: u64, width: u32, height: u32) -> Self {
        Self {
            frame,
            width,
            height,
            pixels: Arc::from(Vec::new()),
        }
    }
}

/// Screen controls located by template matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UiElement {
    PauseButton,
    SpeedButton,
    RetreatButton,
    SkillButton,
    AbandonButton,
    AbandonConfirm,
    StartFighting,
    CloseTip,
    FightDirectly,
    DrawCard,
    BattleComplete,
    StageReady,
    Settlement,
    DropsScreen,
    DropsCancel,
}

/// Text recognition profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextProfile {
    StageName,
    DropItems,
}

/// One ranked text recognition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCandidate {
    pub text: String,
    pub score: f32,
    pub rect: Rect,
}

/// Which screen the snapshot shows, as far as battle is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenState {
    InBattle,
    OutOfBattle,
    #[default]
    Unknown,
}

/// Structured battle facts recognized from one snapshot
///
/// `None` means "not readable on this frame"; the tracker keeps its
/// previous value in that case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BattleFacts {
    pub screen: ScreenState,
    pub cost: Option<i32>,
    pub kills: Option<KillCount>,
    pub roster: Option<Vec<DeploymentUnit>>,
}

/// Input side of the device
pub trait DeviceController: Send + Sync {
    fn capture(&self) -> Result<Snapshot>;
    fn tap(&self, at: Point) -> Result<()>;
    fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()>;
}

/// Recognition side of the device
pub trait VisionAnalyzer: Send + Sync {
    fn battle_facts(&self, snapshot: &Snapshot) -> BattleFacts;

    /// Candidates sorted by descending score
    fn recognize_text(&self, profile: TextProfile, snapshot: &Snapshot) -> Vec<TextCandidate>;

    fn match_template(&self, element: UiElement, snapshot: &Snapshot) -> Option<Rect>;

    /// Skill-ready indicator visible inside the region
    fn skill_ready(&self, snapshot: &Snapshot, around: Rect) -> bool;
}

/// Cooperative cancellation shared between the caller and the engine
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything the engine talks to
#[derive(Clone)]
pub struct Services {
    pub device: Arc<dyn DeviceController>,
    pub vision: Arc<dyn VisionAnalyzer>,
    pub notifier: Arc<dyn NotificationSink>,
    pub cancel: CancelFlag,
    pub config: Arc<EngineConfig>,
}

impl Services {
    pub fn new(
        device: Arc<dyn DeviceController>,
        vision: Arc<dyn VisionAnalyzer>,
        notifier: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            device,
            vision,
            notifier,
            cancel: CancelFlag::new(),
            config: Arc::new(config),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn need_exit(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn notify(&self, event: CopilotEvent) {
        self.notifier.notify(&event);
    }

    /// Capture a snapshot; device errors are logged and reported as absence
    pub fn capture(&self) -> Option<Snapshot> {
        match self.device.capture() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "capture failed");
                None
            }
        }
    }

    pub fn tap(&self, at: Point) -> bool {
        match self.device.tap(at) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, x = at.x, y = at.y, "tap failed");
                false
            }
        }
    }

    pub fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> bool {
        match self.device.swipe(from, to, duration_ms) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "swipe failed");
                false
            }
        }
    }

    /// Scheduler tick between two polls
    pub fn throttle(&self) {
        let interval = self.config.poll_interval();
        if interval.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(interval);
        }
    }

    /// Locate a control on a fresh snapshot and tap it
    ///
    /// Tries up to `attempts` captures; stops early on cancellation.
    pub fn click(&self, element: UiElement, attempts: u32) -> bool {
        for attempt in 0..attempts.max(1) {
            if self.need_exit() {
                return false;
            }
            if attempt > 0 {
                self.throttle();
            }
            let Some(snapshot) = self.capture() else {
                continue;
            };
            if let Some(rect) = self.vision.match_template(element, &snapshot) {
                return self.tap(rect.center());
            }
        }
        tracing::debug!(?element, attempts, "control not found");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingSink;
    use crate::sim::{SimBattlefield, SimScenario, SimScreen, SimStage};

    fn services() -> (Arc<SimBattlefield>, Services) {
        let sim = Arc::new(SimBattlefield::new(SimScenario::single(
            SimStage::new("Test").with_prep_screen(),
        )));
        let services = sim.services(
            Arc::new(RecordingSink::new()),
            EngineConfig::new().with_poll_interval_ms(0),
        );
        (sim, services)
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_click_taps_visible_control() {
        let (sim, services) = services();
        assert!(services.click(UiElement::StartFighting, 1));
        assert_eq!(sim.screen(), Some(SimScreen::Prep));
    }

    #[test]
    fn test_click_gives_up_on_missing_control() {
        let (sim, services) = services();
        assert!(!services.click(UiElement::SkillButton, 3));
        assert!(sim.inputs().is_empty());
    }

    #[test]
    fn test_click_stops_once_cancelled() {
        let (sim, services) = services();
        services.cancel.cancel();
        assert!(services.need_exit());
        assert!(!services.click(UiElement::StartFighting, 5));
        assert_eq!(sim.screen(), Some(SimScreen::Ready));
    }
}
