//! Workspace configuration – reads/writes `pickplace.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use pickplace_perception::{FeatureConfig, PcaNormalEstimator};
use pickplace_planner::{GroupArmPolicy, ManifestFormat};
use pickplace_runtime::PipelineConfig;
use pickplace_types::{DropSpec, PickListEntry, TaskParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pickplace.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Normal estimation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalsConfig {
    #[serde(default = "default_normal_k")]
    pub k: usize,
    /// Sensor position the normals are oriented towards.
    #[serde(default)]
    pub viewpoint: [f32; 3],
}

fn default_normal_k() -> usize {
    15
}

impl Default for NormalsConfig {
    fn default() -> Self {
        Self {
            k: default_normal_k(),
            viewpoint: [0.0; 3],
        }
    }
}

impl NormalsConfig {
    pub fn estimator(&self) -> PcaNormalEstimator {
        PcaNormalEstimator {
            k: self.k,
            viewpoint: self.viewpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    /// Drop groups served by the right arm; all others use the left.
    #[serde(default = "default_right_groups")]
    pub right_groups: Vec<String>,
}

fn default_right_groups() -> Vec<String> {
    vec!["green".to_string()]
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            right_groups: default_right_groups(),
        }
    }
}

impl ArmConfig {
    pub fn policy(&self) -> GroupArmPolicy {
        GroupArmPolicy::new(self.right_groups.iter().cloned())
    }
}

/// Contents of `pickplace.toml`.
///
/// Scalars come first so the file serialises with every table after them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Test scene number written into every manifest record.
    #[serde(default = "default_scene")]
    pub scene: i32,

    /// JSON classifier artifact.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Directory receiving `output_<scene>.<ext>`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub manifest_format: ManifestFormat,

    /// Sensor frame queue depth.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// When set, the pick list and drop table are re-read from this TOML
    /// file on every frame instead of using `[task]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_file: Option<PathBuf>,

    #[serde(default = "default_task")]
    pub task: TaskParams,

    #[serde(default)]
    pub arms: ArmConfig,

    #[serde(default)]
    pub normals: NormalsConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_scene() -> i32 {
    2
}
fn default_model_path() -> PathBuf {
    PathBuf::from("model.json")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_queue_capacity() -> usize {
    16
}

/// Pick list of test scene 2 and the two drop boxes of the workcell.
fn default_task() -> TaskParams {
    TaskParams {
        object_list: vec![
            PickListEntry::new("biscuits", "green"),
            PickListEntry::new("soap", "green"),
            PickListEntry::new("book", "red"),
            PickListEntry::new("soap2", "red"),
            PickListEntry::new("glue", "red"),
        ],
        dropbox: vec![
            DropSpec {
                name: Some("left".into()),
                group: "red".into(),
                position: [0.0, 0.71, 0.605],
            },
            DropSpec {
                name: Some("right".into()),
                group: "green".into(),
                position: [0.0, -0.71, 0.605],
            },
        ],
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scene: default_scene(),
            model_path: default_model_path(),
            output_dir: default_output_dir(),
            manifest_format: ManifestFormat::default(),
            queue_capacity: default_queue_capacity(),
            params_file: None,
            task: default_task(),
            arms: ArmConfig::default(),
            normals: NormalsConfig::default(),
            features: FeatureConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PICKPLACE_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `PICKPLACE_MODEL_PATH` | `model_path` |
/// | `PICKPLACE_OUTPUT_DIR` | `output_dir` |
/// | `PICKPLACE_SCENE` | `scene` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PICKPLACE_MODEL_PATH") {
        cfg.model_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PICKPLACE_OUTPUT_DIR") {
        cfg.output_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PICKPLACE_SCENE")
        && let Ok(scene) = v.trim().parse::<i32>()
    {
        cfg.scene = scene;
    }
}

/// Save the config to `path`, creating parent directories if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickplace_types::ArmName;
    use pickplace_planner::ArmPolicy;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.task, cfg.task);
        assert_eq!(loaded.pipeline, cfg.pipeline);
        assert_eq!(loaded.manifest_format, ManifestFormat::Yaml);
        assert_eq!(loaded.task.object_list.len(), 5);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let result = load_from(&dir.path().join(DEFAULT_CONFIG_FILE)).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
manifest_format = "json"

[pipeline.clustering]
tolerance = 0.05

[arms]
right_groups = ["red"]
"#,
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.manifest_format, ManifestFormat::Json);
        assert!((cfg.pipeline.clustering.tolerance - 0.05).abs() < 1e-6);
        assert_eq!(cfg.pipeline.clustering.min_size, 30);
        assert_eq!(cfg.pipeline.preprocess.leaf_size, 0.005);
        assert_eq!(cfg.arms.policy().arm_for_group("red"), ArmName::Right);
        assert_eq!(cfg.task.dropbox.len(), 2);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "scene = \"two\"\n").expect("write");
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    // All environment manipulation lives in one test so parallel tests never
    // observe each other's variables.
    #[test]
    fn apply_env_overrides_replaces_selected_fields() {
        // SAFETY: only this test touches PICKPLACE_* variables.
        unsafe {
            std::env::set_var("PICKPLACE_MODEL_PATH", "/models/svm.json");
            std::env::set_var("PICKPLACE_OUTPUT_DIR", "/tmp/manifests");
            std::env::set_var("PICKPLACE_SCENE", "3");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.model_path, PathBuf::from("/models/svm.json"));
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/manifests"));
        assert_eq!(cfg.scene, 3);

        unsafe { std::env::set_var("PICKPLACE_SCENE", "not-a-scene") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.scene, 2);

        unsafe {
            std::env::remove_var("PICKPLACE_MODEL_PATH");
            std::env::remove_var("PICKPLACE_OUTPUT_DIR");
            std::env::remove_var("PICKPLACE_SCENE");
        }
    }
}
