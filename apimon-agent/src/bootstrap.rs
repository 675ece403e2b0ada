//! Bootstrap inputs provisioned by the harness on durable storage: the
//! listening port number and the policy rule file path.

use apimon_common::portfile::{PortFileError, read_port_file};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    PortFile(#[from] PortFileError),

    #[error("failed to parse agent config {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Locations of the agent's bootstrap inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// File holding the decimal TCP port the server should bind.
    pub port_file: PathBuf,
    /// Policy rule file, reloaded on every decision.
    pub policy_file: PathBuf,
}

impl AgentConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, BootstrapError> {
        let text = std::fs::read_to_string(path).map_err(|source| BootstrapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| BootstrapError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The port the provisioned port file currently names.
    pub fn port(&self) -> Result<u16, BootstrapError> {
        Ok(read_port_file(&self.port_file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn config_loads_from_toml() {
        let file = file_with(
            "port_file = \"/data/local/tmp/apimon_port.txt\"\n\
             policy_file = \"/data/local/tmp/apimon_policies.tsv\"\n",
        );
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(
            config.port_file,
            PathBuf::from("/data/local/tmp/apimon_port.txt")
        );
        assert_eq!(
            config.policy_file,
            PathBuf::from("/data/local/tmp/apimon_policies.tsv")
        );
    }

    #[test]
    fn malformed_config_fails_with_config_error() {
        let file = file_with("port_file = 17\n");
        assert!(matches!(
            AgentConfig::load(file.path()).unwrap_err(),
            BootstrapError::Config { .. }
        ));
    }

    #[test]
    fn config_port_reads_through_the_port_file() {
        let port_file = file_with("4723");
        let config = AgentConfig {
            port_file: port_file.path().to_path_buf(),
            policy_file: PathBuf::from("/unused"),
        };
        assert_eq!(config.port().unwrap(), 4723);
    }

    #[test]
    fn missing_port_file_surfaces_the_port_file_error() {
        let config = AgentConfig {
            port_file: PathBuf::from("/nonexistent/port"),
            policy_file: PathBuf::from("/unused"),
        };
        assert!(matches!(
            config.port().unwrap_err(),
            BootstrapError::PortFile(PortFileError::Read { .. })
        ));
    }
}
