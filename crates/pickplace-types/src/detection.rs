//! Classified clusters and their visualization markers.

use serde::{Deserialize, Serialize};

use crate::cloud::PointCloud;

/// A recognised object: its label, its own points, and where it sits.
///
/// The centroid is computed once on construction and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    label: String,
    cloud: PointCloud,
    centroid: [f64; 3],
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, cloud: PointCloud) -> Self {
        let centroid = cloud.centroid().unwrap_or([0.0; 3]);
        Self {
            label: label.into(),
            cloud,
            centroid,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn centroid(&self) -> [f64; 3] {
        self.centroid
    }
}

/// Text marker floating above a detection in the visualizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMarker {
    pub id: usize,
    pub text: String,
    pub position: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::PointXYZRGB;

    #[test]
    fn centroid_is_fixed_at_construction() {
        let cloud: PointCloud = [
            PointXYZRGB::new(1.0, 1.0, 1.0),
            PointXYZRGB::new(3.0, 1.0, 1.0),
        ]
        .into_iter()
        .collect();
        let det = DetectedObject::new("soap", cloud);
        assert_eq!(det.label(), "soap");
        assert!((det.centroid()[0] - 2.0).abs() < 1e-9);
        assert_eq!(det.cloud().len(), 2);
    }
}
