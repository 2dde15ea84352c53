//! Support-surface segmentation.
//!
//! A plane is fitted to the filtered cloud with RANSAC.  Its inliers are the
//! table; everything else is a candidate object.

use nalgebra::Vector3;
use pickplace_types::PointCloud;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while fitting the support plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("best plane supports {inliers} points, {required} required")]
    InsufficientSupport { inliers: usize, required: usize },
}

/// Plane `normal · p + d = 0` with a unit-length normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneModel {
    pub normal: Vector3<f64>,
    pub d: f64,
}

impl PlaneModel {
    /// Plane through three points, `None` when they are (nearly) collinear.
    pub fn from_points(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Option<Self> {
        let normal = (b - a).cross(&(c - a));
        let norm = normal.norm();
        if norm < 1e-12 {
            return None;
        }
        let normal = normal / norm;
        Some(Self {
            normal,
            d: -normal.dot(&a),
        })
    }

    /// Unsigned point-to-plane distance.
    pub fn distance(&self, p: &Vector3<f64>) -> f64 {
        (self.normal.dot(p) + self.d).abs()
    }
}

/// RANSAC parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Inlier distance threshold in metres.
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Confidence used for adaptive early termination.
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Smallest inlier count accepted as a support surface.
    #[serde(default = "default_min_inliers")]
    pub min_inliers: usize,
    /// Smallest share of the cloud the support surface must cover.
    #[serde(default = "default_min_inlier_ratio")]
    pub min_inlier_ratio: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_max_distance() -> f64 {
    0.04
}
fn default_max_iterations() -> usize {
    1000
}
fn default_probability() -> f64 {
    0.99
}
fn default_min_inliers() -> usize {
    3
}
fn default_min_inlier_ratio() -> f64 {
    0.1
}
fn default_seed() -> u64 {
    42
}

impl SegmentationConfig {
    /// Inliers a cloud of `points` needs before its plane is accepted.
    pub fn required_inliers(&self, points: usize) -> usize {
        let share = (self.min_inlier_ratio.clamp(0.0, 1.0) * points as f64).ceil() as usize;
        self.min_inliers.max(share)
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            max_iterations: default_max_iterations(),
            probability: default_probability(),
            min_inliers: default_min_inliers(),
            min_inlier_ratio: default_min_inlier_ratio(),
            seed: default_seed(),
        }
    }
}

/// Result of [`segment_plane`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// `None` only for an empty input cloud.
    pub plane: Option<PlaneModel>,
    /// Sorted indices of the plane inliers in the input cloud.
    pub inliers: Vec<usize>,
    pub table: PointCloud,
    pub objects: PointCloud,
}

/// Split `cloud` into the dominant plane and everything else.
///
/// An empty cloud yields two empty clouds.  A non-empty cloud whose best
/// plane has fewer supporters than
/// [`required_inliers`](SegmentationConfig::required_inliers) is an error.
pub fn segment_plane(cloud: &PointCloud, config: &SegmentationConfig) -> Result<Segmentation, SegmentationError> {
    if cloud.is_empty() {
        return Ok(Segmentation {
            plane: None,
            inliers: Vec::new(),
            table: PointCloud::default(),
            objects: PointCloud::default(),
        });
    }

    let positions: Vec<Vector3<f64>> = cloud
        .iter()
        .map(|p| Vector3::new(p.x as f64, p.y as f64, p.z as f64))
        .collect();
    let n = positions.len();
    let mut best: Option<(PlaneModel, Vec<usize>)> = None;

    if n >= 3 {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut budget = config.max_iterations;
        let mut iteration = 0;

        while iteration < budget {
            iteration += 1;
            let sample = rand::seq::index::sample(&mut rng, n, 3);
            let Some(model) = PlaneModel::from_points(
                positions[sample.index(0)],
                positions[sample.index(1)],
                positions[sample.index(2)],
            ) else {
                continue;
            };

            let inliers: Vec<usize> = positions
                .iter()
                .enumerate()
                .filter(|(_, p)| model.distance(p) <= config.max_distance)
                .map(|(i, _)| i)
                .collect();

            let best_len = best.as_ref().map_or(0, |(_, b)| b.len());
            if inliers.len() > best_len {
                budget = budget.min(adaptive_budget(inliers.len(), n, config.probability));
                best = Some((model, inliers));
            }
        }
        debug!(iterations = iteration, points = n, "ransac finished");
    }

    let support = best.as_ref().map_or(0, |(_, b)| b.len());
    let required = config.required_inliers(n);
    match best {
        Some((plane, inliers)) if support >= required => {
            let table = cloud.extract(&inliers);
            let objects = cloud.extract_complement(&inliers);
            Ok(Segmentation {
                plane: Some(plane),
                inliers,
                table,
                objects,
            })
        }
        _ => Err(SegmentationError::InsufficientSupport {
            inliers: support,
            required,
        }),
    }
}

/// Iterations needed to draw one all-inlier sample with `probability`.
fn adaptive_budget(inliers: usize, total: usize, probability: f64) -> usize {
    let w = inliers as f64 / total as f64;
    let all_inliers = w.powi(3);
    if all_inliers >= 1.0 {
        return 1;
    }
    if all_inliers <= 0.0 {
        return usize::MAX;
    }
    let needed = (1.0 - probability).ln() / (1.0 - all_inliers).ln();
    if needed.is_finite() && needed >= 0.0 {
        needed.ceil() as usize
    } else {
        usize::MAX
    }
}
