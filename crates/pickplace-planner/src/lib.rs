//! `pickplace-planner` – pick list × detections × drop table → manifest.
//!
//! # Modules
//!
//! - [`arm`] – [`ArmPolicy`] and the configurable [`GroupArmPolicy`].
//! - [`planner`] – [`plan`], producing the per-frame [`PlanOutcome`].
//! - [`manifest`] – [`ManifestWriter`], atomic YAML / JSON persistence.

pub mod arm;
pub mod manifest;
pub mod planner;

pub use arm::{ArmPolicy, GroupArmPolicy};
pub use manifest::{Manifest, ManifestEntry, ManifestError, ManifestFormat, ManifestWriter, read_manifest};
pub use planner::{PlanOutcome, plan};
