//! Async file-based config source.
//!
//! [`FileSource`] reads the file through Tokio, picks the deserializer from
//! the file extension and validates the result before handing it out.

use std::path::{Path, PathBuf};

use super::parse_config_str;
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::error::EdgeError;

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn format(&self) -> &str {
        self.path.extension().and_then(|e| e.to_str()).unwrap_or("")
    }

    async fn read_content(&self) -> Result<String, EdgeError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EdgeError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                EdgeError::Io(e)
            }
        })
    }

    /// Read, parse and validate the file.
    pub async fn load(&self) -> Result<Config, EdgeError> {
        let content = self.read_content().await?;
        let config = parse_config_str(self.format(), &content, &self.path.display().to_string())?;

        if let Err(errors) = validate(&config) {
            return Err(EdgeError::ConfigValidation { errors });
        }

        Ok(config)
    }
}
