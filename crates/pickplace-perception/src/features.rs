//! Per-cluster feature vectors: colour histogram followed by normal
//! histogram, each normalised to sum to one.

use nalgebra::Vector3;
use pickplace_types::{PointCloud, unpack_rgb};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Histogram bins per channel / per normal component.
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Histogram HSV instead of raw RGB.
    #[serde(default = "default_using_hsv")]
    pub using_hsv: bool,
}

fn default_bins() -> usize {
    32
}
fn default_using_hsv() -> bool {
    true
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
            using_hsv: default_using_hsv(),
        }
    }
}

impl FeatureConfig {
    /// Length of the vector produced by [`feature_vector`].
    pub fn dimension(&self) -> usize {
        6 * self.bins
    }
}

/// RGB to HSV with every channel scaled to `[0, 255]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [f32; 3] {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    [hue * 255.0, saturation * 255.0, max * 255.0]
}

/// Normalised per-channel histogram over `[0, 256)`.
///
/// Points without colour are skipped.  All zeros when no point is coloured.
pub fn color_histogram(cloud: &PointCloud, config: &FeatureConfig) -> Vec<f32> {
    let bins = config.bins.max(1);
    let mut hist = vec![0f32; 3 * bins];
    for rgb in cloud.iter().filter_map(|p| p.rgb) {
        let (r, g, b) = unpack_rgb(rgb);
        let channels = if config.using_hsv {
            rgb_to_hsv(r, g, b)
        } else {
            [r as f32, g as f32, b as f32]
        };
        for (c, value) in channels.into_iter().enumerate() {
            hist[c * bins + bin_of(value, 0.0, 256.0, bins)] += 1.0;
        }
    }
    normalise(&mut hist);
    hist
}

/// Normalised per-component histogram of unit normals over `[-1, 1]`.
///
/// Non-finite and zero normals are skipped.
pub fn normal_histogram(normals: &[Vector3<f32>], config: &FeatureConfig) -> Vec<f32> {
    let bins = config.bins.max(1);
    let mut hist = vec![0f32; 3 * bins];
    for n in normals.iter().filter(|n| n.iter().all(|v| v.is_finite()) && n.norm_squared() > 0.0) {
        for (c, value) in n.iter().enumerate() {
            hist[c * bins + bin_of(*value, -1.0, 1.0, bins)] += 1.0;
        }
    }
    normalise(&mut hist);
    hist
}

/// Colour histogram concatenated with the normal histogram.
pub fn feature_vector(cloud: &PointCloud, normals: &[Vector3<f32>], config: &FeatureConfig) -> Vec<f32> {
    let mut features = color_histogram(cloud, config);
    features.extend(normal_histogram(normals, config));
    features
}

/// Bin index for `value` in `[lo, hi]`; `hi` itself lands in the last bin.
fn bin_of(value: f32, lo: f32, hi: f32, bins: usize) -> usize {
    let t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
    ((t * bins as f32) as usize).min(bins - 1)
}

fn normalise(hist: &mut [f32]) {
    let total: f32 = hist.iter().sum();
    if total > 0.0 {
        hist.iter_mut().for_each(|v| *v /= total);
    }
}
