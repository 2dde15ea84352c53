//! `pickplace-types` – shared data model for the pick-and-place perception
//! workspace.
//!
//! # Modules
//!
//! - [`cloud`] – [`PointCloud`], [`PointXYZRGB`] and [`ClusterIndices`].
//! - [`detection`] – [`DetectedObject`] and [`LabelMarker`].
//! - [`task`] – pick list, drop table, poses and [`Assignment`]s.
//!
//! The crate root holds the bus [`Event`] envelope and the per-frame
//! [`FrameError`] taxonomy.

pub mod cloud;
pub mod detection;
pub mod task;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use cloud::{Axis, ClusterIndices, PointCloud, PointXYZRGB, pack_rgb, unpack_rgb};
pub use detection::{DetectedObject, LabelMarker};
pub use task::{
    ArmName, Assignment, DropSpec, Orientation, PickListEntry, Pose, Position, TaskParams,
};

/// One raw frame delivered by the sensor transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorFrame {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. the source file name or the sensor topic
    pub origin: String,
    pub cloud: Arc<PointCloud>,
}

impl SensorFrame {
    pub fn new(origin: impl Into<String>, cloud: PointCloud) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            origin: origin.into(),
            cloud: Arc::new(cloud),
        }
    }
}

/// Unified event wrapper for the perception bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "pickplace-runtime::pipeline"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the perception bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Raw input frame.
    SensorFrame(SensorFrame),
    /// Support-surface inliers of the latest frame.
    TableCloud(Arc<PointCloud>),
    /// Everything above the support surface.
    ObjectCloud(Arc<PointCloud>),
    /// Object points recoloured with one colour per cluster.
    ClusterCloud(Arc<PointCloud>),
    DetectedObjects(Arc<Vec<DetectedObject>>),
    ObjectMarkers(Vec<LabelMarker>),
    /// Outcome summary of a frame that ran to completion.
    FrameReport(FrameReport),
    /// A frame was aborted.
    FrameFault { frame_id: Uuid, kind: String, message: String },
}

/// Summary of one completed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_id: Uuid,
    pub scene_id: i32,
    pub input_points: usize,
    pub filtered_points: usize,
    pub table_points: usize,
    pub object_points: usize,
    pub clusters: usize,
    /// Labels in cluster order.
    pub labels: Vec<String>,
    pub assignments: Vec<Assignment>,
    /// Pick-list names with no matching detection.
    pub unmatched: Vec<String>,
    /// Labels carried by more than one detection.
    pub duplicate_labels: Vec<String>,
    /// Groups with no drop-table entry.
    pub missing_drop_groups: Vec<String>,
    pub manifest_path: Option<PathBuf>,
    pub latency_us: u64,
}

/// Conditions that abort the processing of a single frame.
///
/// None of these affect the loaded model or configuration; the next frame is
/// processed normally.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameError {
    #[error("Sensor Input Rejected: {0}")]
    SensorInput(String),

    #[error("Segmentation Failure: best plane supports {inliers} points, {required} required")]
    SegmentationFailure { inliers: usize, required: usize },

    #[error("Classification Service Unavailable: {0}")]
    ClassificationServiceUnavailable(String),

    #[error("Classification Error: {0}")]
    Classification(String),

    #[error("Task Parameters Unavailable: {0}")]
    Parameters(String),

    #[error("Manifest Write Error: {0}")]
    Manifest(String),
}

impl FrameError {
    /// Stable short name, used as a log field and in [`EventPayload::FrameFault`].
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::SensorInput(_) => "sensor_input",
            FrameError::SegmentationFailure { .. } => "segmentation_failure",
            FrameError::ClassificationServiceUnavailable(_) => "classification_service_unavailable",
            FrameError::Classification(_) => "classification",
            FrameError::Parameters(_) => "parameters",
            FrameError::Manifest(_) => "manifest",
        }
    }
}
