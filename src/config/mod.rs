//! Configuration loading and validation.
//!
//! The service is configured once at startup: built-in defaults, then an
//! optional config file, then CLI / environment overrides. The resulting
//! [`Config`] is immutable and handed to each component constructor.

pub mod model;
pub mod sources;
pub mod validation;

use std::path::{Path, PathBuf};

use crate::error::EdgeError;
use model::Config;
use sources::file_source::FileSource;

/// Where the running configuration came from, for startup logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("defaults"),
        }
    }
}

/// Load the config from `explicit`, or from the first auto-detected file
/// in the working directory, or fall back to defaults.
pub async fn load(explicit: Option<&Path>) -> Result<(Config, ConfigOrigin), EdgeError> {
    if let Some(path) = explicit {
        let source = FileSource::new(path.to_path_buf());
        let config = source.load().await?;
        return Ok((config, ConfigOrigin::File(source.path().to_path_buf())));
    }

    for name in sources::AUTO_DETECT_CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            let config = FileSource::new(path.clone()).load().await?;
            return Ok((config, ConfigOrigin::File(path)));
        }
    }

    Ok((Config::default(), ConfigOrigin::Defaults))
}
