//! Cluster classification.
//!
//! The model is trained offline and shipped as a JSON artifact:
//!
//! ```json
//! {
//!   "classes": ["biscuits", "soap", "soap2"],
//!   "scaler": { "mean": [...], "scale": [...] },
//!   "classifier": { "kind": "linear", "coef": [[...], ...], "intercept": [...] }
//! }
//! ```
//!
//! It is loaded once, validated, and then shared read-only.

use std::path::Path;
use std::sync::Arc;

use nalgebra::Vector3;
use pickplace_types::PointCloud;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::features::{FeatureConfig, feature_vector};
use crate::normals::{NormalEstimationError, NormalEstimator};

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model Parse Error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid Model: {0}")]
    Invalid(String),

    #[error("Feature dimension mismatch: model expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Normals(#[from] NormalEstimationError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

// ────────────────────────────────────────────────────────────────────────────
// Model artifact
// ────────────────────────────────────────────────────────────────────────────

/// Per-feature standardisation: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    pub fn transform(&self, x: &[f32]) -> Result<Vec<f32>, ModelError> {
        if x.len() != self.mean.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.mean.len(),
                got: x.len(),
            });
        }
        Ok(x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            // Constant features were fitted with scale 0.
            .map(|(v, (m, s))| if *s == 0.0 { v - m } else { (v - m) / s })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predictor {
    /// One-vs-rest linear decision functions, one row per class.  A binary
    /// model may carry a single row scoring the second class.
    Linear { coef: Vec<Vec<f32>>, intercept: Vec<f32> },
    /// Label of the closest centroid in scaled feature space.
    NearestCentroid { centroids: Vec<Vec<f32>> },
}

impl Predictor {
    fn rows(&self) -> &[Vec<f32>] {
        match self {
            Predictor::Linear { coef, .. } => coef,
            Predictor::NearestCentroid { centroids } => centroids,
        }
    }

    /// Index into the class list.  Ties go to the lower index.
    fn predict(&self, x: &[f32]) -> usize {
        match self {
            Predictor::Linear { coef, intercept } => {
                let scores: Vec<f32> = coef
                    .iter()
                    .zip(intercept)
                    .map(|(w, b)| dot(w, x) + b)
                    .collect();
                if scores.len() == 1 {
                    return usize::from(scores[0] > 0.0);
                }
                argbest(&scores, |a, b| a > b)
            }
            Predictor::NearestCentroid { centroids } => {
                let distances: Vec<f32> = centroids
                    .iter()
                    .map(|c| c.iter().zip(x).map(|(a, b)| (a - b) * (a - b)).sum())
                    .collect();
                argbest(&distances, |a, b| a < b)
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn argbest(values: &[f32], better: impl Fn(f32, f32) -> bool) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if better(v, values[best]) {
            best = i;
        }
    }
    best
}

/// Scaler, predictor and label vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub classes: Vec<String>,
    pub scaler: StandardScaler,
    pub classifier: Predictor,
}

impl ClassifierModel {
    /// Read and validate a JSON model artifact.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        let model: ClassifierModel = serde_json::from_str(&text)?;
        model.validate()?;
        info!(path = %path.display(), classes = model.classes.len(), dimension = model.dimension(), "classifier model loaded");
        Ok(model)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ModelError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Feature dimension the model was trained on.
    pub fn dimension(&self) -> usize {
        self.scaler.mean.len()
    }

    /// Check internal consistency of the artifact.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.classes.is_empty() {
            return Err(ModelError::Invalid("empty class list".into()));
        }
        if self.scaler.scale.len() != self.scaler.mean.len() {
            return Err(ModelError::Invalid(format!(
                "scaler mean has {} entries but scale has {}",
                self.scaler.mean.len(),
                self.scaler.scale.len()
            )));
        }
        let rows = self.classifier.rows();
        // A single linear row separates two classes by its sign.
        let binary = matches!(self.classifier, Predictor::Linear { .. }) && self.classes.len() == 2 && rows.len() == 1;
        if rows.len() != self.classes.len() && !binary {
            return Err(ModelError::Invalid(format!(
                "{} predictor rows for {} classes",
                rows.len(),
                self.classes.len()
            )));
        }
        if let Predictor::Linear { intercept, .. } = &self.classifier
            && intercept.len() != rows.len()
        {
            return Err(ModelError::Invalid(format!(
                "{} intercepts for {} coefficient rows",
                intercept.len(),
                rows.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != self.dimension()) {
            return Err(ModelError::DimensionMismatch {
                expected: self.dimension(),
                got: row.len(),
            });
        }
        Ok(())
    }

    /// Scale `features` and decode the predicted class.
    pub fn predict_label(&self, features: &[f32]) -> Result<&str, ModelError> {
        let scaled = self.scaler.transform(features)?;
        let index = self.classifier.predict(&scaled);
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| ModelError::Invalid(format!("predicted class {index} out of range")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObjectClassifier
// ────────────────────────────────────────────────────────────────────────────

/// Labels a cluster cloud: normals, features, model.
#[derive(Clone)]
pub struct ObjectClassifier {
    model: Arc<ClassifierModel>,
    normals: Arc<dyn NormalEstimator>,
    features: FeatureConfig,
}

impl std::fmt::Debug for ObjectClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectClassifier")
            .field("classes", &self.model.classes)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl ObjectClassifier {
    /// Fails when the feature configuration does not produce vectors of the
    /// model's dimension.
    pub fn new(
        model: Arc<ClassifierModel>,
        normals: Arc<dyn NormalEstimator>,
        features: FeatureConfig,
    ) -> Result<Self, ModelError> {
        if features.dimension() != model.dimension() {
            return Err(ModelError::DimensionMismatch {
                expected: model.dimension(),
                got: features.dimension(),
            });
        }
        Ok(Self {
            model,
            normals,
            features,
        })
    }

    pub fn model(&self) -> &ClassifierModel {
        &self.model
    }

    /// Clusters too small for normal estimation are scored on colour alone.
    pub fn classify(&self, cluster: &PointCloud) -> Result<String, ClassifyError> {
        let normals = match self.normals.estimate(cluster) {
            Ok(normals) => normals,
            Err(NormalEstimationError::TooFewPoints { points, .. }) => {
                debug!(points, "cluster too small for normals, using an empty normal histogram");
                vec![Vector3::zeros(); cluster.len()]
            }
            Err(e) => return Err(e.into()),
        };
        let features = feature_vector(cluster, &normals, &self.features);
        let label = self.model.predict_label(&features)?;
        debug!(points = cluster.len(), label, "cluster classified");
        Ok(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normals::PcaNormalEstimator;
    use pickplace_types::{PointXYZRGB, pack_rgb};

    /// Nearest-centroid model separating red from blue clusters on the hue
    /// histogram alone.
    fn red_blue_model(cfg: &FeatureConfig) -> ClassifierModel {
        let dim = cfg.dimension();
        let mut red = vec![0.0; dim];
        let mut blue = vec![0.0; dim];
        red[0] = 1.0;
        // Blue hue is 2/3 of the circle.
        blue[(cfg.bins * 2) / 3] = 1.0;
        ClassifierModel {
            classes: vec!["soap".into(), "glue".into()],
            scaler: StandardScaler {
                mean: vec![0.0; dim],
                scale: vec![1.0; dim],
            },
            classifier: Predictor::NearestCentroid {
                centroids: vec![red, blue],
            },
        }
    }

    fn patch(rgb: u32) -> PointCloud {
        let mut pts = Vec::new();
        for ix in 0..5 {
            for iy in 0..5 {
                pts.push(PointXYZRGB::with_rgb(ix as f32 * 0.01, iy as f32 * 0.01, 0.8, rgb));
            }
        }
        pts.into_iter().collect()
    }

    struct OfflineNormals;

    impl NormalEstimator for OfflineNormals {
        fn estimate(&self, _cloud: &PointCloud) -> Result<Vec<nalgebra::Vector3<f32>>, NormalEstimationError> {
            Err(NormalEstimationError::Unavailable("service down".into()))
        }
    }

    #[test]
    fn classifies_by_colour() {
        let cfg = FeatureConfig::default();
        let classifier = ObjectClassifier::new(
            Arc::new(red_blue_model(&cfg)),
            Arc::new(PcaNormalEstimator::default()),
            cfg,
        )
        .unwrap();
        assert_eq!(classifier.classify(&patch(pack_rgb(250, 10, 10))).unwrap(), "soap");
        assert_eq!(classifier.classify(&patch(pack_rgb(10, 10, 250))).unwrap(), "glue");
    }

    #[test]
    fn normal_failure_surfaces_as_normals_error() {
        let cfg = FeatureConfig::default();
        let classifier =
            ObjectClassifier::new(Arc::new(red_blue_model(&cfg)), Arc::new(OfflineNormals), cfg).unwrap();
        let err = classifier.classify(&patch(pack_rgb(250, 0, 0))).unwrap_err();
        assert!(matches!(err, ClassifyError::Normals(_)));
    }

    #[test]
    fn tiny_cluster_is_classified_on_colour() {
        let cfg = FeatureConfig::default();
        let classifier = ObjectClassifier::new(
            Arc::new(red_blue_model(&cfg)),
            Arc::new(PcaNormalEstimator::default()),
            cfg,
        )
        .unwrap();
        let pair: PointCloud = [
            PointXYZRGB::with_rgb(0.0, 0.0, 0.8, pack_rgb(250, 10, 10)),
            PointXYZRGB::with_rgb(0.01, 0.0, 0.8, pack_rgb(250, 10, 10)),
        ]
        .into_iter()
        .collect();
        assert_eq!(classifier.classify(&pair).unwrap(), "soap");
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let model = red_blue_model(&FeatureConfig::default());
        let err = ObjectClassifier::new(
            Arc::new(model),
            Arc::new(PcaNormalEstimator::default()),
            FeatureConfig { bins: 8, using_hsv: true },
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::DimensionMismatch { expected: 192, got: 48 }));
    }

    #[test]
    fn linear_binary_model_uses_sign() {
        let model = ClassifierModel {
            classes: vec!["biscuits".into(), "book".into()],
            scaler: StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 0.0],
            },
            classifier: Predictor::Linear {
                coef: vec![vec![1.0, 0.0]],
                intercept: vec![0.0],
            },
        };
        model.validate().unwrap();
        assert_eq!(model.predict_label(&[2.0, 5.0]).unwrap(), "book");
        assert_eq!(model.predict_label(&[-2.0, 5.0]).unwrap(), "biscuits");
        assert!(matches!(
            model.predict_label(&[1.0]),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn validate_rejects_row_count() {
        let model = ClassifierModel {
            classes: vec!["a".into(), "b".into(), "c".into()],
            scaler: StandardScaler {
                mean: vec![0.0],
                scale: vec![1.0],
            },
            classifier: Predictor::NearestCentroid {
                centroids: vec![vec![0.0]],
            },
        };
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn single_centroid_cannot_cover_two_classes() {
        let model = ClassifierModel {
            classes: vec!["soap".into(), "glue".into()],
            scaler: StandardScaler {
                mean: vec![0.0],
                scale: vec![1.0],
            },
            classifier: Predictor::NearestCentroid {
                centroids: vec![vec![0.0]],
            },
        };
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn load_roundtrips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = red_blue_model(&FeatureConfig::default());
        model.save_to(&path).unwrap();
        let loaded = ClassifierModel::load(&path).unwrap();
        assert_eq!(loaded, model);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"kind\": \"nearest_centroid\""));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClassifierModel::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
    }
}
