//! Everything a frame needs that outlives the frame.
//!
//! A [`PipelineContext`] is assembled once at startup and then only read.
//! Frames never mutate it, so a failed frame cannot leave state behind for
//! the next one.

use std::sync::Arc;

use pickplace_perception::{ClusterConfig, ObjectClassifier, PreprocessConfig, SegmentationConfig};
use pickplace_planner::{ArmPolicy, GroupArmPolicy, ManifestWriter};
use serde::{Deserialize, Serialize};

use crate::params::ParameterSource;

/// Tunables of the geometric stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub clustering: ClusterConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Height of a label above its cluster's first point, in metres.
    #[serde(default = "default_marker_height")]
    pub height: f32,
}

fn default_marker_height() -> f32 {
    0.4
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            height: default_marker_height(),
        }
    }
}

/// Immutable per-process state shared by every frame.
pub struct PipelineContext {
    scene_id: i32,
    config: PipelineConfig,
    classifier: ObjectClassifier,
    params: Arc<dyn ParameterSource>,
    arm_policy: Arc<dyn ArmPolicy>,
    manifest: ManifestWriter,
}

impl PipelineContext {
    /// Context with the default [`GroupArmPolicy`]; see
    /// [`with_arm_policy`](Self::with_arm_policy).
    pub fn new(
        scene_id: i32,
        config: PipelineConfig,
        classifier: ObjectClassifier,
        params: Arc<dyn ParameterSource>,
        manifest: ManifestWriter,
    ) -> Self {
        Self {
            scene_id,
            config,
            classifier,
            params,
            arm_policy: Arc::new(GroupArmPolicy::default()),
            manifest,
        }
    }

    pub fn with_arm_policy(mut self, policy: Arc<dyn ArmPolicy>) -> Self {
        self.arm_policy = policy;
        self
    }

    pub fn scene_id(&self) -> i32 {
        self.scene_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ObjectClassifier {
        &self.classifier
    }

    pub fn params(&self) -> &dyn ParameterSource {
        self.params.as_ref()
    }

    pub fn arm_policy(&self) -> &dyn ArmPolicy {
        self.arm_policy.as_ref()
    }

    pub fn manifest(&self) -> &ManifestWriter {
        &self.manifest
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("scene_id", &self.scene_id)
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}
