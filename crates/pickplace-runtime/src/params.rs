//! Where the pick list and drop table come from.
//!
//! Task parameters are read once per frame, so an operator can edit the
//! parameter file between frames without restarting the pipeline.

use std::path::{Path, PathBuf};

use pickplace_types::TaskParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("cannot read task parameters from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task parameters in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Supplies the current pick list and drop table.
pub trait ParameterSource: Send + Sync {
    fn load(&self) -> Result<TaskParams, ParamError>;
}

/// Parameters fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticParams(TaskParams);

impl StaticParams {
    pub fn new(params: TaskParams) -> Self {
        Self(params)
    }
}

impl ParameterSource for StaticParams {
    fn load(&self) -> Result<TaskParams, ParamError> {
        Ok(self.0.clone())
    }
}

/// A TOML file with `[[object_list]]` and `[[dropbox]]` tables, re-read on
/// every call.
///
/// ```toml
/// [[object_list]]
/// name = "biscuits"
/// group = "green"
///
/// [[dropbox]]
/// name = "right"
/// group = "green"
/// position = [0.0, -0.71, 0.605]
/// ```
#[derive(Debug, Clone)]
pub struct TomlParamFile {
    path: PathBuf,
}

impl TomlParamFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParameterSource for TomlParamFile {
    fn load(&self) -> Result<TaskParams, ParamError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| ParamError::Io {
            path: self.path.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ParamError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}
