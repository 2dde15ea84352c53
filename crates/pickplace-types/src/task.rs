//! Pick-and-place task description: what to pick, where to drop it, and the
//! per-object assignments that come out of planning.

use serde::{Deserialize, Serialize};

/// One line of the ordered pick list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListEntry {
    /// Object label to look for (e.g. `"biscuits"`).
    pub name: String,
    /// Drop group the object belongs to (e.g. `"green"`).
    pub group: String,
}

impl PickListEntry {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }
}

/// A placement location for one drop group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropSpec {
    /// Human-readable box name (e.g. `"left"`); informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub group: String,
    /// Drop position in the robot base frame (metres).
    pub position: [f64; 3],
}

impl DropSpec {
    pub fn new(group: impl Into<String>, position: [f64; 3]) -> Self {
        Self {
            name: None,
            group: group.into(),
            position,
        }
    }
}

/// Per-frame task parameters: the pick list and the drop table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    #[serde(default)]
    pub object_list: Vec<PickListEntry>,
    #[serde(default)]
    pub dropbox: Vec<DropSpec>,
}

// ────────────────────────────────────────────────────────────────────────────
// Poses
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<[f64; 3]> for Position {
    fn from(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// Quaternion orientation.  The all-zero default is what the motion layer
/// receives when the planner does not constrain the grasp orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

impl Pose {
    /// Pose at `position` with the default orientation.
    pub fn at(position: impl Into<Position>) -> Self {
        Self {
            position: position.into(),
            orientation: Orientation::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Arm + Assignment
// ────────────────────────────────────────────────────────────────────────────

/// Gripper arm selected for a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmName {
    Left,
    Right,
}

impl ArmName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmName::Left => "left",
            ArmName::Right => "right",
        }
    }
}

impl std::fmt::Display for ArmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pick-and-place request handed to the motion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub scene_id: i32,
    pub arm_name: ArmName,
    pub object_name: String,
    pub pick_pose: Pose,
    pub place_pose: Pose,
}
