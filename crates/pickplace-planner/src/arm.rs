//! Which gripper arm serves which drop group.

use std::collections::BTreeSet;

use pickplace_types::ArmName;
use serde::{Deserialize, Serialize};

/// Maps a drop group to the arm that should carry objects of that group.
pub trait ArmPolicy: Send + Sync {
    fn arm_for_group(&self, group: &str) -> ArmName;
}

/// Groups listed in `right_groups` use the right arm; every other group
/// uses the left arm.  Matching is exact and case-sensitive.
///
/// The default is the two-box workcell layout: `"green"` goes right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupArmPolicy {
    right_groups: BTreeSet<String>,
}

impl GroupArmPolicy {
    pub fn new<I, S>(right_groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            right_groups: right_groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn right_groups(&self) -> impl Iterator<Item = &str> {
        self.right_groups.iter().map(String::as_str)
    }
}

impl Default for GroupArmPolicy {
    fn default() -> Self {
        Self::new(["green"])
    }
}

impl ArmPolicy for GroupArmPolicy {
    fn arm_for_group(&self, group: &str) -> ArmName {
        if self.right_groups.contains(group) {
            ArmName::Right
        } else {
            ArmName::Left
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn green_goes_right_everything_else_left() {
        let policy = GroupArmPolicy::default();
        assert_eq!(policy.arm_for_group("green"), ArmName::Right);
        assert_eq!(policy.arm_for_group("red"), ArmName::Left);
        assert_eq!(policy.arm_for_group("Green"), ArmName::Left);
        assert_eq!(policy.arm_for_group(""), ArmName::Left);
    }

    #[test]
    fn right_groups_are_configurable() {
        let policy = GroupArmPolicy::new(["red", "blue"]);
        assert_eq!(policy.arm_for_group("red"), ArmName::Right);
        assert_eq!(policy.arm_for_group("green"), ArmName::Left);
        assert_eq!(policy.right_groups().collect::<Vec<_>>(), vec!["blue", "red"]);
    }
}
