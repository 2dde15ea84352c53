//! `pickplace-perception` – from a raw tabletop cloud to labelled objects.
//!
//! # Modules
//!
//! - [`filter`] – outlier removal, voxel downsampling and region crops
//!   ([`preprocess`][filter::preprocess]).
//! - [`segmentation`] – RANSAC support-plane fit splitting table from objects.
//! - [`clustering`] – Euclidean cluster extraction over the object cloud.
//! - [`octree`] – [`Octree`][octree::Octree] spatial index shared by the
//!   stages above for radius and k-nearest queries.
//! - [`normals`] – the [`NormalEstimator`][normals::NormalEstimator]
//!   capability and its local PCA implementation.
//! - [`features`] – colour and normal histograms.
//! - [`classifier`] – the JSON model artifact and
//!   [`ObjectClassifier`][classifier::ObjectClassifier].

pub mod classifier;
pub mod clustering;
pub mod features;
pub mod filter;
pub mod normals;
pub mod octree;
pub mod segmentation;

pub use classifier::{ClassifierModel, ClassifyError, ModelError, ObjectClassifier, Predictor, StandardScaler};
pub use clustering::{ClusterConfig, euclidean_clusters};
pub use features::FeatureConfig;
pub use filter::{PreprocessConfig, RegionCrop, preprocess};
pub use normals::{NormalEstimationError, NormalEstimator, PcaNormalEstimator};
pub use segmentation::{Segmentation, SegmentationConfig, SegmentationError, segment_plane};
