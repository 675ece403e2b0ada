//! Shared types and wire codec for the API monitor agent.
//!
//! The agent and the controller agree out-of-band on the value types each
//! command exchanges: every request is a single command token (a string),
//! every response is a batch of three-field rows.

pub mod codec;
pub mod portfile;
pub mod protocol;

pub use codec::{CodecError, decode, encode};
pub use portfile::{PortFileError, read_port_file};
pub use protocol::{Command, LogEntry, ResponseBatch, ResponseRow};
