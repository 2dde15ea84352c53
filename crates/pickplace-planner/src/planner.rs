//! Turn detections into pick-and-place assignments.

use pickplace_types::{Assignment, DetectedObject, Pose, TaskParams};
use tracing::{debug, warn};

use crate::arm::ArmPolicy;

/// Assignments for one frame plus the conditions worth reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    /// One per matched pick-list entry, in pick-list order.
    pub assignments: Vec<Assignment>,
    /// Pick-list names no detection carried.
    pub unmatched: Vec<String>,
    /// Pick-list names matched by more than one detection.
    pub duplicate_labels: Vec<String>,
    /// Groups referenced by a matched entry but absent from the drop table.
    pub missing_drop_groups: Vec<String>,
}

/// Build the assignment list for `scene_id`.
///
/// The pick list is walked in order.  When several detections carry the
/// entry's name the last one wins, and likewise for drop-table rows sharing
/// a group.  An entry without a drop-table row gets the zero place pose.
pub fn plan(
    detections: &[DetectedObject],
    params: &TaskParams,
    scene_id: i32,
    arm_policy: &dyn ArmPolicy,
) -> PlanOutcome {
    let mut outcome = PlanOutcome::default();

    for entry in &params.object_list {
        let matches: Vec<&DetectedObject> = detections.iter().filter(|d| d.label() == entry.name).collect();
        let Some(detection) = matches.last() else {
            debug!(object = %entry.name, "no detection for pick-list entry");
            push_unique(&mut outcome.unmatched, &entry.name);
            continue;
        };
        if matches.len() > 1 {
            warn!(object = %entry.name, count = matches.len(), "label detected more than once; using the last detection");
            push_unique(&mut outcome.duplicate_labels, &entry.name);
        }

        let place_pose = match params.dropbox.iter().rev().find(|d| d.group == entry.group) {
            Some(drop) => Pose::at(drop.position),
            None => {
                warn!(object = %entry.name, group = %entry.group, "no drop location for group");
                push_unique(&mut outcome.missing_drop_groups, &entry.group);
                Pose::default()
            }
        };

        outcome.assignments.push(Assignment {
            scene_id,
            arm_name: arm_policy.arm_for_group(&entry.group),
            object_name: entry.name.clone(),
            pick_pose: Pose::at(detection.centroid()),
            place_pose,
        });
    }

    outcome
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::GroupArmPolicy;
    use pickplace_types::{ArmName, DropSpec, PickListEntry, PointCloud, PointXYZRGB, Position};

    fn detection(label: &str, at: [f32; 3]) -> DetectedObject {
        let cloud: PointCloud = [PointXYZRGB::new(at[0], at[1], at[2])].into_iter().collect();
        DetectedObject::new(label, cloud)
    }

    fn params() -> TaskParams {
        TaskParams {
            object_list: vec![
                PickListEntry::new("biscuits", "green"),
                PickListEntry::new("soap", "green"),
                PickListEntry::new("soap2", "red"),
            ],
            dropbox: vec![
                DropSpec::new("red", [0.0, 0.71, 0.605]),
                DropSpec::new("green", [0.0, -0.71, 0.605]),
            ],
        }
    }

    #[test]
    fn assigns_in_pick_list_order_with_arms() {
        let detections = vec![
            detection("soap2", [0.4, 0.1, 0.7]),
            detection("biscuits", [0.5, -0.2, 0.7]),
        ];
        let out = plan(&detections, &params(), 1, &GroupArmPolicy::default());
        assert_eq!(out.assignments.len(), 2);

        let first = &out.assignments[0];
        assert_eq!(first.object_name, "biscuits");
        assert_eq!(first.arm_name, ArmName::Right);
        assert_eq!(first.scene_id, 1);
        assert_eq!(first.place_pose.position, Position::new(0.0, -0.71, 0.605));

        let second = &out.assignments[1];
        assert_eq!(second.object_name, "soap2");
        assert_eq!(second.arm_name, ArmName::Left);

        assert_eq!(out.unmatched, vec!["soap".to_string()]);
    }

    #[test]
    fn last_duplicate_detection_wins() {
        let params = TaskParams {
            object_list: vec![PickListEntry::new("glue", "red")],
            dropbox: vec![DropSpec::new("red", [0.0, 0.71, 0.605])],
        };
        let detections = vec![detection("glue", [0.1, 0.0, 0.7]), detection("glue", [0.3, 0.2, 0.8])];
        let out = plan(&detections, &params, 3, &GroupArmPolicy::default());

        assert_eq!(out.assignments.len(), 1);
        let pick = out.assignments[0].pick_pose.position;
        assert!((pick.x - 0.3).abs() < 1e-6);
        assert!((pick.y - 0.2).abs() < 1e-6);
        assert_eq!(out.duplicate_labels, vec!["glue".to_string()]);
    }

    #[test]
    fn missing_group_gives_zero_place_pose() {
        let params = TaskParams {
            object_list: vec![PickListEntry::new("book", "blue")],
            dropbox: vec![DropSpec::new("red", [0.0, 0.71, 0.605])],
        };
        let out = plan(&[detection("book", [0.5, 0.0, 0.7])], &params, 2, &GroupArmPolicy::default());
        assert_eq!(out.assignments[0].place_pose, Pose::default());
        assert_eq!(out.missing_drop_groups, vec!["blue".to_string()]);
    }

    #[test]
    fn last_drop_row_for_group_wins() {
        let params = TaskParams {
            object_list: vec![PickListEntry::new("book", "red")],
            dropbox: vec![DropSpec::new("red", [1.0, 1.0, 1.0]), DropSpec::new("red", [2.0, 2.0, 2.0])],
        };
        let out = plan(&[detection("book", [0.5, 0.0, 0.7])], &params, 2, &GroupArmPolicy::default());
        assert_eq!(out.assignments[0].place_pose.position, Position::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn nothing_detected_nothing_assigned() {
        let out = plan(&[], &params(), 1, &GroupArmPolicy::default());
        assert!(out.assignments.is_empty());
        assert_eq!(out.unmatched.len(), 3);
    }

    #[test]
    fn unlisted_detections_are_ignored() {
        let out = plan(&[detection("eraser", [0.0, 0.0, 0.7])], &params(), 1, &GroupArmPolicy::default());
        assert!(out.assignments.is_empty());
    }
}
