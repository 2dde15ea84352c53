//! Cloud preprocessing: noise suppression, downsampling and region crops.
//!
//! [`preprocess`] chains the stages in the order the perception node has
//! always used them:
//!
//! 1. drop non-finite points,
//! 2. statistical outlier removal,
//! 3. voxel-grid downsampling,
//! 4. one pass-through crop per configured [`RegionCrop`].
//!
//! None of the stages can fail.  An empty result is a valid cloud and flows
//! through the rest of the pipeline unchanged.

use std::collections::BTreeMap;

use pickplace_types::{Axis, PointCloud, PointXYZRGB, pack_rgb, unpack_rgb};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::octree::{Octree, Point3};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Keep only points whose `axis` coordinate lies in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionCrop {
    pub axis: Axis,
    pub min: f32,
    pub max: f32,
}

impl RegionCrop {
    pub fn new(axis: Axis, min: f32, max: f32) -> Self {
        Self { axis, min, max }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, p: &PointXYZRGB) -> bool {
        let v = p.coord(self.axis);
        v >= self.min && v <= self.max
    }
}

/// Tuning parameters for [`preprocess`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Neighbours considered when estimating local density.
    #[serde(default = "default_outlier_k")]
    pub outlier_k: usize,
    /// Points further than `mean + multiplier * stddev` are discarded.
    #[serde(default = "default_std_dev_multiplier")]
    pub std_dev_multiplier: f32,
    /// Voxel edge length in metres; `0` disables downsampling.
    #[serde(default = "default_leaf_size")]
    pub leaf_size: f32,
    /// Crops applied in order.
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionCrop>,
}

fn default_outlier_k() -> usize {
    50
}
fn default_std_dev_multiplier() -> f32 {
    1.0
}
fn default_leaf_size() -> f32 {
    0.005
}
fn default_regions() -> Vec<RegionCrop> {
    vec![
        RegionCrop::new(Axis::Z, 0.6, 1.1),
        RegionCrop::new(Axis::Y, -0.5, 0.5),
    ]
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            outlier_k: default_outlier_k(),
            std_dev_multiplier: default_std_dev_multiplier(),
            leaf_size: default_leaf_size(),
            regions: default_regions(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stages
// ────────────────────────────────────────────────────────────────────────────

/// Run the full preprocessing chain on `cloud`.
pub fn preprocess(cloud: &PointCloud, config: &PreprocessConfig) -> PointCloud {
    let finite = remove_non_finite(cloud);
    let denoised = statistical_outlier_removal(&finite, config.outlier_k, config.std_dev_multiplier);
    let mut out = voxel_downsample(&denoised, config.leaf_size);
    for crop in &config.regions {
        out = passthrough(&out, crop);
    }
    debug!(
        input = cloud.len(),
        finite = finite.len(),
        denoised = denoised.len(),
        output = out.len(),
        "preprocessed cloud"
    );
    out
}

/// Drop points with NaN or infinite coordinates.
pub fn remove_non_finite(cloud: &PointCloud) -> PointCloud {
    cloud.filter(|p| p.is_finite())
}

/// Statistical outlier removal.
///
/// For every point the mean distance to its `k` nearest neighbours (itself
/// excluded) is computed.  With `μ` and `σ` the mean and sample standard
/// deviation of those values over the cloud, points whose mean distance
/// exceeds `μ + std_dev_multiplier · σ` are removed.  Point order is kept.
pub fn statistical_outlier_removal(cloud: &PointCloud, k: usize, std_dev_multiplier: f32) -> PointCloud {
    if k == 0 || cloud.len() < 2 {
        return cloud.clone();
    }

    let tree = Octree::from_cloud(cloud);
    let mean_distances: Vec<f64> = cloud
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let neighbours: Vec<f64> = tree
                .nearest_k(Point3::from(p), k + 1)
                .into_iter()
                .filter(|&(j, _)| j != i)
                .take(k)
                .map(|(_, d2)| (d2 as f64).sqrt())
                .collect();
            if neighbours.is_empty() {
                0.0
            } else {
                neighbours.iter().sum::<f64>() / neighbours.len() as f64
            }
        })
        .collect();

    let n = mean_distances.len() as f64;
    let sum: f64 = mean_distances.iter().sum();
    let sum_sq: f64 = mean_distances.iter().map(|d| d * d).sum();
    let mean = sum / n;
    let variance = ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0);
    let threshold = mean + std_dev_multiplier as f64 * variance.sqrt();

    cloud
        .iter()
        .zip(&mean_distances)
        .filter(|&(_, &d)| d <= threshold)
        .map(|(p, _)| *p)
        .collect()
}

#[derive(Default)]
struct VoxelAccumulator {
    sum: [f64; 3],
    count: usize,
    rgb_sum: [u64; 3],
    rgb_count: u64,
}

/// Replace the points in each occupied `leaf_size` cube with their centroid.
///
/// Colour channels are averaged over the coloured points of the cube.  The
/// output is ordered by voxel (z, then y, then x), independent of the input
/// order.  A non-positive `leaf_size` returns the cloud unchanged.
pub fn voxel_downsample(cloud: &PointCloud, leaf_size: f32) -> PointCloud {
    if leaf_size <= 0.0 || cloud.is_empty() {
        return cloud.clone();
    }
    let inv = 1.0 / leaf_size as f64;
    let mut voxels: BTreeMap<(i64, i64, i64), VoxelAccumulator> = BTreeMap::new();

    for p in cloud {
        let key = (
            (p.z as f64 * inv).floor() as i64,
            (p.y as f64 * inv).floor() as i64,
            (p.x as f64 * inv).floor() as i64,
        );
        let acc = voxels.entry(key).or_default();
        acc.sum[0] += p.x as f64;
        acc.sum[1] += p.y as f64;
        acc.sum[2] += p.z as f64;
        acc.count += 1;
        if let Some(rgb) = p.rgb {
            let (r, g, b) = unpack_rgb(rgb);
            acc.rgb_sum[0] += r as u64;
            acc.rgb_sum[1] += g as u64;
            acc.rgb_sum[2] += b as u64;
            acc.rgb_count += 1;
        }
    }

    voxels
        .into_values()
        .map(|acc| {
            let n = acc.count as f64;
            let rgb = (acc.rgb_count > 0).then(|| {
                let avg = |s: u64| (s as f64 / acc.rgb_count as f64).round() as u8;
                pack_rgb(avg(acc.rgb_sum[0]), avg(acc.rgb_sum[1]), avg(acc.rgb_sum[2]))
            });
            PointXYZRGB {
                x: (acc.sum[0] / n) as f32,
                y: (acc.sum[1] / n) as f32,
                z: (acc.sum[2] / n) as f32,
                rgb,
            }
        })
        .collect()
}

/// Keep the points inside `crop`.
pub fn passthrough(cloud: &PointCloud, crop: &RegionCrop) -> PointCloud {
    cloud.filter(|p| crop.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(pts: &[[f32; 3]]) -> PointCloud {
        pts.iter()
            .map(|p| PointXYZRGB::new(p[0], p[1], p[2]))
            .collect()
    }

    fn dense_patch() -> Vec<[f32; 3]> {
        let mut pts = Vec::new();
        for ix in 0..10 {
            for iy in 0..10 {
                pts.push([ix as f32 * 0.01, iy as f32 * 0.01, 0.8]);
            }
        }
        pts
    }

    #[test]
    fn vertical_crop_bounds_are_inclusive() {
        let c = cloud(&[
            [0.0, 0.0, 0.59],
            [0.0, 0.0, 0.60],
            [0.0, 0.0, 1.10],
            [0.0, 0.0, 1.11],
        ]);
        let out = passthrough(&c, &RegionCrop::new(Axis::Z, 0.6, 1.1));
        assert_eq!(out.len(), 2);
        assert_eq!(out.points()[0].z, 0.60);
        assert_eq!(out.points()[1].z, 1.10);
    }

    #[test]
    fn crops_commute() {
        let c = cloud(&[[0.0, -0.6, 0.7], [0.0, 0.0, 0.7], [0.0, 0.0, 1.5], [0.0, 0.4, 0.9]]);
        let z = RegionCrop::new(Axis::Z, 0.6, 1.1);
        let y = RegionCrop::new(Axis::Y, -0.5, 0.5);
        let zy = passthrough(&passthrough(&c, &z), &y);
        let yz = passthrough(&passthrough(&c, &y), &z);
        assert_eq!(zy, yz);
        assert_eq!(zy.len(), 2);
    }

    #[test]
    fn outlier_far_from_patch_is_removed() {
        let mut pts = dense_patch();
        pts.push([5.0, 5.0, 5.0]);
        let c = cloud(&pts);
        let out = statistical_outlier_removal(&c, 8, 1.0);
        assert!(out.len() < c.len());
        assert!(out.iter().all(|p| p.x < 1.0), "the isolated point must be dropped");
    }

    #[test]
    fn outlier_removal_passes_tiny_clouds_through() {
        let c = cloud(&[[0.0, 0.0, 0.0]]);
        assert_eq!(statistical_outlier_removal(&c, 50, 1.0), c);
        assert_eq!(statistical_outlier_removal(&PointCloud::default(), 50, 1.0).len(), 0);
    }

    #[test]
    fn voxel_downsample_merges_points_in_same_cube() {
        let c: PointCloud = [
            PointXYZRGB::with_rgb(0.001, 0.001, 0.001, pack_rgb(200, 0, 0)),
            PointXYZRGB::with_rgb(0.003, 0.003, 0.003, pack_rgb(100, 0, 0)),
            PointXYZRGB::new(0.5, 0.5, 0.5),
        ]
        .into_iter()
        .collect();
        let out = voxel_downsample(&c, 0.005);
        assert_eq!(out.len(), 2);
        let merged = out.points()[0];
        assert!((merged.x - 0.002).abs() < 1e-6);
        assert_eq!(merged.rgb.map(unpack_rgb), Some((150, 0, 0)));
        assert!(out.points()[1].rgb.is_none());
    }

    #[test]
    fn voxel_downsample_disabled_for_zero_leaf() {
        let c = cloud(&dense_patch());
        assert_eq!(voxel_downsample(&c, 0.0), c);
    }

    #[test]
    fn non_finite_points_are_dropped() {
        let c = cloud(&[[f32::NAN, 0.0, 0.8], [0.0, 0.0, 0.8], [0.0, f32::INFINITY, 0.8]]);
        assert_eq!(remove_non_finite(&c).len(), 1);
    }

    #[test]
    fn preprocess_of_empty_cloud_is_empty() {
        let out = preprocess(&PointCloud::default(), &PreprocessConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn preprocess_crops_to_workspace() {
        let mut pts = dense_patch();
        // Below the table height; cropped away.
        pts.extend(dense_patch().into_iter().map(|p| [p[0], p[1], 0.3]));
        let c = cloud(&pts);
        let cfg = PreprocessConfig {
            outlier_k: 4,
            ..PreprocessConfig::default()
        };
        let out = preprocess(&c, &cfg);
        assert!(!out.is_empty());
        assert!(out.iter().all(|p| p.z >= 0.6 && p.z <= 1.1));
    }

    #[test]
    fn default_config_matches_tabletop_workspace() {
        let cfg = PreprocessConfig::default();
        assert_eq!(cfg.outlier_k, 50);
        assert_eq!(cfg.regions.len(), 2);
        assert_eq!(cfg.regions[0], RegionCrop::new(Axis::Z, 0.6, 1.1));
    }
}
