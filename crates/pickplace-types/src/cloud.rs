//! Point cloud containers shared by every pipeline stage.
//!
//! A [`PointCloud`] is never mutated once a stage has produced it: filters,
//! segmenters and extractors always build a fresh cloud.  Index sets that
//! refer back into a cloud are carried as [`ClusterIndices`].

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Colour packing
// ────────────────────────────────────────────────────────────────────────────

/// Pack 8-bit channels into the `0x00RRGGBB` layout used by RGB point clouds.
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Split a packed `0x00RRGGBB` value into its channels.
pub fn unpack_rgb(rgb: u32) -> (u8, u8, u8) {
    (
        ((rgb >> 16) & 0xFF) as u8,
        ((rgb >> 8) & 0xFF) as u8,
        (rgb & 0xFF) as u8,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Axis
// ────────────────────────────────────────────────────────────────────────────

/// Cartesian axis selector used by region crops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PointXYZRGB
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D point with an optional packed colour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointXYZRGB {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Packed `0x00RRGGBB` colour, absent for XYZ-only sensors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgb: Option<u32>,
}

impl PointXYZRGB {
    /// Create an uncoloured point.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, rgb: None }
    }

    /// Create a coloured point.
    pub fn with_rgb(x: f32, y: f32, z: f32, rgb: u32) -> Self {
        Self {
            x,
            y,
            z,
            rgb: Some(rgb),
        }
    }

    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Coordinate along `axis`.
    pub fn coord(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// True when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn distance_squared(&self, other: &PointXYZRGB) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PointCloud
// ────────────────────────────────────────────────────────────────────────────

/// An ordered, immutable collection of points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    points: Vec<PointXYZRGB>,
}

impl PointCloud {
    pub fn new(points: Vec<PointXYZRGB>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[PointXYZRGB] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PointXYZRGB> {
        self.points.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PointXYZRGB> {
        self.points.iter()
    }

    /// Build a new cloud holding the points at `indices`, in the given order.
    ///
    /// Indices outside the cloud are skipped.
    pub fn extract(&self, indices: &[usize]) -> PointCloud {
        indices
            .iter()
            .filter_map(|&i| self.points.get(i).copied())
            .collect()
    }

    /// Build a new cloud holding every point *not* listed in `indices`.
    pub fn extract_complement(&self, indices: &[usize]) -> PointCloud {
        let mut keep = vec![true; self.points.len()];
        for &i in indices {
            if let Some(k) = keep.get_mut(i) {
                *k = false;
            }
        }
        self.points
            .iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(*p))
            .collect()
    }

    /// Build a new cloud from the points matching `predicate`.
    pub fn filter<F>(&self, mut predicate: F) -> PointCloud
    where
        F: FnMut(&PointXYZRGB) -> bool,
    {
        self.points.iter().filter(|p| predicate(p)).copied().collect()
    }

    /// Arithmetic mean of the point coordinates, accumulated in `f64`.
    ///
    /// Returns `None` for an empty cloud.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let mut sum = [0.0f64; 3];
        for p in &self.points {
            sum[0] += p.x as f64;
            sum[1] += p.y as f64;
            sum[2] += p.z as f64;
        }
        let n = self.points.len() as f64;
        Some([sum[0] / n, sum[1] / n, sum[2] / n])
    }
}

impl FromIterator<PointXYZRGB> for PointCloud {
    fn from_iter<I: IntoIterator<Item = PointXYZRGB>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a PointXYZRGB;
    type IntoIter = std::slice::Iter<'a, PointXYZRGB>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ClusterIndices
// ────────────────────────────────────────────────────────────────────────────

/// Indices of the points that make up one candidate object.
///
/// Stored sorted ascending and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIndices(Vec<usize>);

impl ClusterIndices {
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self(indices)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.0.first().copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(pts: &[[f32; 3]]) -> PointCloud {
        pts.iter()
            .map(|p| PointXYZRGB::new(p[0], p[1], p[2]))
            .collect()
    }

    #[test]
    fn rgb_pack_unpack() {
        let packed = pack_rgb(0x12, 0x34, 0x56);
        assert_eq!(packed, 0x0012_3456);
        assert_eq!(unpack_rgb(packed), (0x12, 0x34, 0x56));
    }

    #[test]
    fn extract_keeps_requested_order() {
        let c = cloud(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        let sub = c.extract(&[2, 0]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.points()[0].x, 2.0);
        assert_eq!(sub.points()[1].x, 0.0);
    }

    #[test]
    fn extract_skips_out_of_range_indices() {
        let c = cloud(&[[0.0, 0.0, 0.0]]);
        assert_eq!(c.extract(&[0, 7]).len(), 1);
    }

    #[test]
    fn extract_and_complement_partition_cloud() {
        let c = cloud(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0]]);
        let inliers = c.extract(&[1, 3]);
        let outliers = c.extract_complement(&[1, 3]);
        assert_eq!(inliers.len() + outliers.len(), c.len());
        assert_eq!(outliers.points()[0].x, 0.0);
        assert_eq!(outliers.points()[1].x, 2.0);
    }

    #[test]
    fn centroid_is_arithmetic_mean() {
        let c = cloud(&[[0.0, 0.0, 0.0], [2.0, 4.0, 6.0]]);
        let centroid = c.centroid().expect("non-empty");
        assert!((centroid[0] - 1.0).abs() < 1e-9);
        assert!((centroid[1] - 2.0).abs() < 1e-9);
        assert!((centroid[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn centroid_of_empty_cloud_is_none() {
        assert!(PointCloud::default().centroid().is_none());
    }

    #[test]
    fn cluster_indices_are_sorted_and_deduplicated() {
        let idx = ClusterIndices::new(vec![5, 1, 3, 1]);
        assert_eq!(idx.as_slice(), &[1, 3, 5]);
        assert_eq!(idx.first(), Some(1));
    }

    #[test]
    fn point_without_colour_omits_rgb_in_json() {
        let json = serde_json::to_string(&PointXYZRGB::new(1.0, 2.0, 3.0)).unwrap();
        assert!(!json.contains("rgb"));
    }
}
