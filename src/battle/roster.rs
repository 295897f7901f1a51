//! Units as seen on the roster panel and their per-unit settings

use serde::{Deserialize, Serialize};

use crate::core::types::Rect;

/// Unit class as shown by the roster icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Role {
    Caster,
    Medic,
    Pioneer,
    Sniper,
    Special,
    Support,
    Tank,
    Warrior,
    Drone,
    #[default]
    Unknown,
}

/// When a unit's skill may be triggered without an explicit script step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkillUsage {
    Never,
    #[default]
    Manual, // Only through UseSkill actions
    Auto,   // Whenever the skill is ready
}

impl SkillUsage {
    pub fn allows_auto(&self) -> bool {
        matches!(self, SkillUsage::Auto)
    }
}

/// Facing given to a unit right after it is dropped on a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeployDirection {
    #[default]
    Right,
    Down,
    Left,
    Up,
    None,
}

impl DeployDirection {
    /// Unit vector of the facing swipe, screen axes
    pub fn offset(&self) -> Option<(i32, i32)> {
        match self {
            DeployDirection::Right => Some((1, 0)),
            DeployDirection::Down => Some((0, 1)),
            DeployDirection::Left => Some((-1, 0)),
            DeployDirection::Up => Some((0, -1)),
            DeployDirection::None => None,
        }
    }
}

/// A unit waiting on the roster panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    pub name: String,
    pub role: Role,
    /// Enough cost and not cooling down
    pub available: bool,
    pub cooling: bool,
    /// Slot on the roster panel
    pub rect: Rect,
}

impl DeploymentUnit {
    pub fn new(name: impl Into<String>, role: Role, rect: Rect) -> Self {
        Self {
            name: name.into(),
            role,
            available: false,
            cooling: false,
            rect,
        }
    }

    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn with_cooling(mut self, cooling: bool) -> Self {
        self.cooling = cooling;
        self
    }
}

/// Kill counter as displayed: `kills/total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KillCount {
    pub kills: i32,
    pub total: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_usage_default_is_manual() {
        assert_eq!(SkillUsage::default(), SkillUsage::Manual);
        assert!(!SkillUsage::Manual.allows_auto());
        assert!(SkillUsage::Auto.allows_auto());
    }

    #[test]
    fn test_direction_offsets() {
        assert_eq!(DeployDirection::Up.offset(), Some((0, -1)));
        assert_eq!(DeployDirection::None.offset(), None);
    }
}
