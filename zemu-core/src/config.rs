//! Session configuration file.
//!
//! A JSON document with camelCase keys, e.g.:
//!
//! ```json
//! {
//!   "kernel": "shell.bin",
//!   "fsInput": "cfsin",
//!   "fsOutput": "cfsout",
//!   "fsPattern": "*.txt",
//!   "packer": ["cfspack"],
//!   "unpacker": ["cfsunpack"]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bootstrap::DEFAULT_FS_INPUT;
use crate::error::EmuResult;

fn default_fs_input() -> PathBuf {
    PathBuf::from(DEFAULT_FS_INPUT)
}

/// Settings for one machine session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Kernel image loaded at address 0.
    #[serde(default)]
    pub kernel: Option<PathBuf>,
    /// Directory packed into the block device at startup.
    #[serde(default = "default_fs_input")]
    pub fs_input: PathBuf,
    /// Directory the block device is unpacked into after the session.
    #[serde(default)]
    pub fs_output: Option<PathBuf>,
    /// Glob selecting which files of the input directory get packed.
    #[serde(default)]
    pub fs_pattern: Option<String>,
    /// External pack command; the built-in CFS packer is used when absent.
    #[serde(default)]
    pub packer: Option<Vec<String>>,
    /// External unpack command.
    #[serde(default)]
    pub unpacker: Option<Vec<String>>,
    /// Block device capacity in bytes.
    #[serde(default)]
    pub block_size: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kernel: None,
            fs_input: default_fs_input(),
            fs_output: None,
            fs_pattern: None,
            packer: None,
            unpacker: None,
            block_size: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> EmuResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> EmuResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmuError;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.fs_input, PathBuf::from("cfsin"));
    }

    #[test]
    fn test_full_config() {
        let config = SessionConfig::from_json(
            r#"{
                "kernel": "shell.bin",
                "fsInput": "in",
                "fsOutput": "out",
                "fsPattern": "*.txt",
                "packer": ["cfspack", "-v"],
                "unpacker": ["cfsunpack"],
                "blockSize": 4096
            }"#,
        )
        .unwrap();

        assert_eq!(config.kernel, Some(PathBuf::from("shell.bin")));
        assert_eq!(config.fs_input, PathBuf::from("in"));
        assert_eq!(config.fs_output, Some(PathBuf::from("out")));
        assert_eq!(config.fs_pattern.as_deref(), Some("*.txt"));
        assert_eq!(
            config.packer,
            Some(vec!["cfspack".to_string(), "-v".to_string()])
        );
        assert_eq!(config.unpacker, Some(vec!["cfsunpack".to_string()]));
        assert_eq!(config.block_size, Some(4096));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            SessionConfig::from_json("{ not json"),
            Err(EmuError::Json(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zemu.json");
        std::fs::write(&path, r#"{"fsOutput": "cfsout"}"#).unwrap();

        let config = SessionConfig::from_path(&path).unwrap();
        assert_eq!(config.fs_output, Some(PathBuf::from("cfsout")));
    }
}
