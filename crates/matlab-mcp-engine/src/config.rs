//! Engine connection settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default command used to start the engine.
pub const DEFAULT_ENGINE_COMMAND: &str = "matlab -nodesktop -nosplash";

/// Settings for connecting to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Command line that starts an engine reading statements from stdin.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments appended to `command` without shell splitting.
    #[serde(default)]
    pub args: Vec<String>,

    /// Directory holding the transient script artifact.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

impl EngineConfig {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            artifact_dir: default_artifact_dir(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_COMMAND)
    }
}

fn default_command() -> String {
    DEFAULT_ENGINE_COMMAND.to_string()
}

/// Per-user cache directory, falling back to the system temp dir.
#[must_use]
pub fn default_artifact_dir() -> PathBuf {
    dirs::cache_dir()
        .map_or_else(std::env::temp_dir, |dir| dir.join("matlab-mcp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());

        let config: EngineConfig =
            serde_json::from_str(r#"{"command": "octave-cli --quiet", "args": ["--path", "/a b"], "artifact_dir": "/tmp/x"}"#)
                .unwrap();
        assert_eq!(config.command, "octave-cli --quiet");
        assert_eq!(config.args, vec!["--path", "/a b"]);
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/x"));
    }
}
