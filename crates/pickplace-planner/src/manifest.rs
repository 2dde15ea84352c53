//! Manifest persistence for the motion layer.
//!
//! One file per scene, `output_<scene>.yaml` (or `.json`), rewritten on every
//! frame.  The file is written to a temporary file next to its final
//! location and persisted into place, so a reader never observes a
//! half-written manifest and a failed write leaves nothing behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use pickplace_types::{Assignment, Pose};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest YAML Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Manifest JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    #[default]
    Yaml,
    Json,
}

impl ManifestFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ManifestFormat::Yaml => "yaml",
            ManifestFormat::Json => "json",
        }
    }
}

/// On-disk record of one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub test_scene_num: i32,
    pub arm_name: String,
    pub object_name: String,
    pub pick_pose: Pose,
    pub place_pose: Pose,
}

impl From<&Assignment> for ManifestEntry {
    fn from(a: &Assignment) -> Self {
        Self {
            test_scene_num: a.scene_id,
            arm_name: a.arm_name.as_str().to_string(),
            object_name: a.object_name.clone(),
            pick_pose: a.pick_pose,
            place_pose: a.place_pose,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub object_list: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn from_assignments(assignments: &[Assignment]) -> Self {
        Self {
            object_list: assignments.iter().map(ManifestEntry::from).collect(),
        }
    }
}

/// Writes manifests into a fixed output directory.
#[derive(Debug, Clone)]
pub struct ManifestWriter {
    dir: PathBuf,
    format: ManifestFormat,
}

impl ManifestWriter {
    pub fn new(dir: impl Into<PathBuf>, format: ManifestFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// Final path of the manifest for `scene_id`.
    pub fn path_for(&self, scene_id: i32) -> PathBuf {
        self.dir.join(format!("output_{scene_id}.{}", self.format.extension()))
    }

    /// Serialise `assignments` and atomically replace the scene's manifest.
    ///
    /// An empty slice still produces a file with an empty `object_list`.
    pub fn emit(&self, scene_id: i32, assignments: &[Assignment]) -> Result<PathBuf, ManifestError> {
        let manifest = Manifest::from_assignments(assignments);
        let body = match self.format {
            ManifestFormat::Yaml => serde_yaml::to_string(&manifest)?,
            ManifestFormat::Json => serde_json::to_string_pretty(&manifest)?,
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(scene_id);
        // Dropped on any error below, which removes the temporary file.
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".output_{scene_id}."))
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        info!(path = %path.display(), entries = manifest.object_list.len(), "manifest written");
        Ok(path)
    }
}

/// Read a manifest back, picking the parser from the file extension.
pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let text = fs::read_to_string(path)?;
    if path.extension().is_some_and(|e| e == "json") {
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickplace_types::{ArmName, Position};

    fn assignment(name: &str) -> Assignment {
        Assignment {
            scene_id: 2,
            arm_name: ArmName::Right,
            object_name: name.to_string(),
            pick_pose: Pose::at([0.5, -0.2, 0.7]),
            place_pose: Pose::at([0.0, -0.71, 0.605]),
        }
    }

    #[test]
    fn yaml_manifest_has_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path(), ManifestFormat::Yaml);
        let path = writer.emit(2, &[assignment("biscuits"), assignment("soap")]).unwrap();

        assert_eq!(path.file_name().unwrap(), "output_2.yaml");
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("object_list:"));
        assert!(raw.contains("test_scene_num: 2"));
        assert!(raw.contains("arm_name: right"));

        let back = read_manifest(&path).unwrap();
        assert_eq!(back.object_list.len(), 2);
        assert_eq!(back.object_list[0].object_name, "biscuits");
        assert_eq!(back.object_list[1].place_pose.position, Position::new(0.0, -0.71, 0.605));
    }

    #[test]
    fn empty_assignment_list_writes_empty_object_list() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path(), ManifestFormat::Yaml);
        let path = writer.emit(1, &[]).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.trim(), "object_list: []");
        assert!(read_manifest(&path).unwrap().object_list.is_empty());
    }

    #[test]
    fn emit_overwrites_previous_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path(), ManifestFormat::Json);
        writer.emit(3, &[assignment("glue"), assignment("book")]).unwrap();
        let path = writer.emit(3, &[assignment("eraser")]).unwrap();

        let back = read_manifest(&path).unwrap();
        assert_eq!(back.object_list.len(), 1);
        assert_eq!(back.object_list[0].object_name, "eraser");
        // No temp file left behind.
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, vec![std::ffi::OsString::from("output_3.json")]);
    }

    #[test]
    fn failed_write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path(), ManifestFormat::Yaml);
        // A directory in the manifest's place cannot be replaced by a file.
        fs::create_dir(writer.path_for(2)).unwrap();

        let err = writer.emit(2, &[assignment("biscuits")]).unwrap_err();
        assert!(matches!(err, ManifestError::Io(_)));
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, vec![std::ffi::OsString::from("output_2.yaml")]);
    }

    #[test]
    fn creates_missing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path().join("nested/out"), ManifestFormat::Yaml);
        assert!(writer.emit(1, &[]).unwrap().exists());
    }
}
