//! Scripted battle data: actions, wait-conditions and operator groups
//!
//! Delivered pre-parsed by the script store and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::battle::roster::{DeployDirection, Role, SkillUsage};
use crate::core::error::{CopilotError, Result};
use crate::core::types::GridPoint;

/// Kind of a scripted step
///
/// `DrawCard`, `CheckAbort` and `CollectDrops` are not handled by the
/// executor itself; they are forwarded to the active policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Deploy,
    Retreat,
    UseSkill,
    SwitchSpeed,
    BulletTime,
    SkillUsage,
    Output,
    MoveCamera,
    SkillDaemon,
    DrawCard,
    CheckAbort,
    CollectDrops,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Deploy => "Deploy",
            ActionKind::Retreat => "Retreat",
            ActionKind::UseSkill => "UseSkill",
            ActionKind::SwitchSpeed => "SwitchSpeed",
            ActionKind::BulletTime => "BulletTime",
            ActionKind::SkillUsage => "SkillUsage",
            ActionKind::Output => "Output",
            ActionKind::MoveCamera => "MoveCamera",
            ActionKind::SkillDaemon => "SkillDaemon",
            ActionKind::DrawCard => "DrawCard",
            ActionKind::CheckAbort => "CheckIfStartOver",
            ActionKind::CollectDrops => "CollectDrops",
        }
    }

    /// May follow a BulletTime step
    pub fn accepts_bullet_time(&self) -> bool {
        matches!(
            self,
            ActionKind::Deploy | ActionKind::Retreat | ActionKind::UseSkill
        )
    }
}

/// Conditions that must all hold before an action runs
///
/// Zero / `None` disables a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConditions {
    /// Relative cost change from the moment the wait starts
    pub cost_changes: i32,
    /// Minimum kill count
    pub kills: i32,
    /// Minimum absolute cost
    pub costs: i32,
    /// Exact number of roster units cooling down
    pub cooling: Option<usize>,
}

impl WaitConditions {
    /// Cost-delta target reached; the comparison direction follows the sign
    pub fn cost_delta_reached(&self, start_cost: i32, cost: i32) -> bool {
        let target = start_cost + self.cost_changes;
        if self.cost_changes < 0 {
            cost <= target
        } else {
            cost >= target
        }
    }
}

/// One scripted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Placeholder or concrete unit name; may be empty
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub location: Option<GridPoint>,
    #[serde(default)]
    pub direction: DeployDirection,
    #[serde(default)]
    pub pre_delay: u64,
    #[serde(default)]
    pub post_delay: u64,
    #[serde(default)]
    pub conditions: WaitConditions,
    /// New policy for SkillUsage steps
    #[serde(default)]
    pub modify_usage: SkillUsage,
    /// Camera pan in tiles for MoveCamera steps
    #[serde(default)]
    pub distance: (f64, f64),
    /// Minimum roster composition for CheckAbort steps
    #[serde(default)]
    pub role_counts: Vec<(Role, usize)>,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub doc_color: String,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: String::new(),
            location: None,
            direction: DeployDirection::default(),
            pre_delay: 0,
            post_delay: 0,
            conditions: WaitConditions::default(),
            modify_usage: SkillUsage::default(),
            distance: (0.0, 0.0),
            role_counts: Vec::new(),
            doc: String::new(),
            doc_color: String::new(),
        }
    }

    pub fn deploy(target: &str, location: GridPoint, direction: DeployDirection) -> Self {
        Self::new(ActionKind::Deploy)
            .with_target(target)
            .with_location(location)
            .with_direction(direction)
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    pub fn with_location(mut self, location: GridPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_direction(mut self, direction: DeployDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_delays(mut self, pre_delay: u64, post_delay: u64) -> Self {
        self.pre_delay = pre_delay;
        self.post_delay = post_delay;
        self
    }

    pub fn with_conditions(mut self, conditions: WaitConditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_usage(mut self, usage: SkillUsage) -> Self {
        self.modify_usage = usage;
        self
    }

    pub fn with_doc(mut self, doc: &str, color: &str) -> Self {
        self.doc = doc.to_string();
        self.doc_color = color.to_string();
        self
    }
}

/// A member of an interchangeable group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub name: String,
    #[serde(default)]
    pub skill_usage: SkillUsage,
}

impl GroupMember {
    pub fn new(name: &str, skill_usage: SkillUsage) -> Self {
        Self {
            name: name.to_string(),
            skill_usage,
        }
    }
}

/// Placeholder name backed by a pool of concrete units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<GroupMember>,
}

impl Group {
    pub fn new(name: &str, members: Vec<GroupMember>) -> Self {
        Self {
            name: name.to_string(),
            members,
        }
    }

    pub fn member(&self, name: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Complete script for one battle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopilotScript {
    /// Stage identifier used to pick the tile layout
    pub stage_name: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl CopilotScript {
    pub fn new(stage_name: &str) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            groups: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Reject step sequences that can never execute
    pub fn validate(&self) -> Result<()> {
        for (index, action) in self.actions.iter().enumerate() {
            if action.kind != ActionKind::BulletTime {
                continue;
            }
            match self.actions.get(index + 1) {
                Some(next) if next.kind.accepts_bullet_time() => {}
                Some(next) => {
                    return Err(CopilotError::InvalidAction(format!(
                        "step {} (BulletTime) followed by {}",
                        index,
                        next.kind.name()
                    )))
                }
                None => {
                    return Err(CopilotError::InvalidAction(format!(
                        "step {} (BulletTime) is the last step",
                        index
                    )))
                }
            }
        }
        Ok(())
    }
}
