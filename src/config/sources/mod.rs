//! Config file sources.
//!
//! [`FileSource`](file_source::FileSource) reads a config file from disk;
//! [`parse_config_str`] deserializes its content according to the file
//! extension. YAML is always compiled in by default, JSON and TOML are
//! gated by the `json` and `toml` features.

pub mod file_source;

use crate::config::model::Config;
use crate::error::EdgeError;

/// File names probed in the working directory when no `--config` is given.
pub const AUTO_DETECT_CANDIDATES: &[&str] = &[
    "edge-relay.yaml",
    "edge-relay.yml",
    "edge-relay.json",
    "edge-relay.toml",
];

/// Parse a config string based on file extension.
pub fn parse_config_str(ext: &str, content: &str, path_display: &str) -> Result<Config, EdgeError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| EdgeError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| EdgeError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| EdgeError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(EdgeError::UnsupportedFormat(other.to_string())),
    }
}
