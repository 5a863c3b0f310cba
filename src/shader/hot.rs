use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::PipelineError;

/// A shader source file that can be hot-reloaded from disk.
pub struct HotShader {
    name: String,
    path: PathBuf,
    last_modified: SystemTime,
    source: String,
}

impl HotShader {
    /// Load a shader from the given file path.
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| PipelineError::Io {
            path: path.clone(),
            source,
        };
        let source = fs::read_to_string(&path).map_err(io_err)?;
        let last_modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(io_err)?;

        Ok(Self {
            name: name.into(),
            path,
            last_modified,
            source,
        })
    }

    /// Check if the shader file has been modified and reload if so.
    /// Returns `true` if the shader was reloaded.
    pub fn check_reload(&mut self) -> bool {
        let Ok(metadata) = fs::metadata(&self.path) else {
            return false;
        };

        let Ok(modified) = metadata.modified() else {
            return false;
        };

        if modified != self.last_modified {
            if let Ok(source) = fs::read_to_string(&self.path) {
                self.source = source;
                self.last_modified = modified;
                return true;
            }
        }

        false
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current shader source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the shader file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
