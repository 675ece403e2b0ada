//! Reader for the provisioned port file.
//!
//! The harness writes the agent's listening port as decimal text to a
//! fixed location on durable storage; the agent reads it to know where to
//! bind, the controller to know where to connect.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} does not contain a decimal port number: {source}")]
    Parse {
        path: PathBuf,
        source: std::num::ParseIntError,
    },
}

/// Read the decimal listening port from a provisioned text file.
pub fn read_port_file(path: &Path) -> Result<u16, PortFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| PortFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    text.trim().parse().map_err(|source| PortFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
