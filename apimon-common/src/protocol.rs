//! Command vocabulary and response shapes for the monitor protocol.
//!
//! A controller opens one connection per request, sends a single command
//! token, and receives a batch of rows. Each row is an ordered triple of
//! optional strings; which fields are populated depends on the command.

use serde::{Deserialize, Serialize};

/// Wire token for the connectivity check command.
pub const CMD_CONN_CHECK: &str = "connCheck";
/// Wire token for the fetch-logs command (drains the agent's log buffer).
pub const CMD_GET_LOGS: &str = "getLogs";
/// Wire token for the fetch-time command.
pub const CMD_GET_TIME: &str = "getTime";
/// Wire token for the close command (tears down the listening socket).
pub const CMD_CLOSE: &str = "close";

/// The closed set of commands the agent understands.
///
/// Anything else on the wire is answered with an empty batch and logged;
/// an unrecognized token is not an error the controller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe; returns process id and host identity.
    ConnCheck,
    /// Drain and return all buffered log entries.
    GetLogs,
    /// Return the agent's current formatted time.
    GetTime,
    /// Empty response, then the listening socket is closed.
    Close,
}

impl Command {
    /// Parse a wire token into a command, `None` for unrecognized input.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            CMD_CONN_CHECK => Some(Self::ConnCheck),
            CMD_GET_LOGS => Some(Self::GetLogs),
            CMD_GET_TIME => Some(Self::GetTime),
            CMD_CLOSE => Some(Self::Close),
            _ => None,
        }
    }

    /// The wire token for this command.
    pub fn token(self) -> &'static str {
        match self {
            Self::ConnCheck => CMD_CONN_CHECK,
            Self::GetLogs => CMD_GET_LOGS,
            Self::GetTime => CMD_GET_TIME,
            Self::Close => CMD_CLOSE,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// One row of a response: an ordered triple of optional strings.
///
/// Serializes as a plain three-element JSON array so the controller can
/// consume rows positionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseRow(pub [Option<String>; 3]);

impl ResponseRow {
    /// Row with all three fields populated.
    pub fn triple(
        a: impl Into<String>,
        b: impl Into<String>,
        c: impl Into<String>,
    ) -> Self {
        Self([Some(a.into()), Some(b.into()), Some(c.into())])
    }

    /// Row carrying a single value, the remaining fields absent.
    pub fn single(value: impl Into<String>) -> Self {
        Self([Some(value.into()), None, None])
    }

    pub fn field(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|f| f.as_deref())
    }
}

/// A full response: zero or more rows.
pub type ResponseBatch = Vec<ResponseRow>;

/// One intercepted API call, as buffered on the device.
///
/// The payload is produced by the instrumentation layer and carried here
/// verbatim; this crate never inspects its internal structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Process id of the monitored process, as a decimal string.
    pub pid: String,
    /// Timestamp formatted by the agent at append time.
    pub timestamp: String,
    /// The intercepted call rendered by the instrumentation layer.
    pub payload: String,
}

impl LogEntry {
    pub fn new(
        pid: impl Into<String>,
        timestamp: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            pid: pid.into(),
            timestamp: timestamp.into(),
            payload: payload.into(),
        }
    }

    /// Convert to the wire row `{pid, timestamp, payload}`.
    pub fn into_row(self) -> ResponseRow {
        ResponseRow([Some(self.pid), Some(self.timestamp), Some(self.payload)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_all_tokens() {
        assert_eq!(Command::parse("connCheck"), Some(Command::ConnCheck));
        assert_eq!(Command::parse("getLogs"), Some(Command::GetLogs));
        assert_eq!(Command::parse("getTime"), Some(Command::GetTime));
        assert_eq!(Command::parse("close"), Some(Command::Close));
    }

    #[test]
    fn parse_rejects_unknown_and_near_miss_tokens() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("getlogs"), None);
        assert_eq!(Command::parse("close "), None);
        assert_eq!(Command::parse("shutdown"), None);
    }

    #[test]
    fn token_round_trips_through_parse() {
        for cmd in [
            Command::ConnCheck,
            Command::GetLogs,
            Command::GetTime,
            Command::Close,
        ] {
            assert_eq!(Command::parse(cmd.token()), Some(cmd));
        }
    }

    #[test]
    fn single_row_serializes_with_explicit_nulls() {
        let row = ResponseRow::single("2024-01-01 10:00:00.000");
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["2024-01-01 10:00:00.000",null,null]"#);
    }

    #[test]
    fn triple_row_round_trips() {
        let row = ResponseRow::triple("123", "host", "");
        let json = serde_json::to_string(&row).unwrap();
        let back: ResponseRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
        assert_eq!(back.field(0), Some("123"));
        assert_eq!(back.field(2), Some(""));
    }

    #[test]
    fn log_entry_into_row_preserves_field_order() {
        let entry = LogEntry::new("42", "2024-01-01 10:00:00.000", "mthd:'open'");
        let row = entry.into_row();
        assert_eq!(row.field(0), Some("42"));
        assert_eq!(row.field(1), Some("2024-01-01 10:00:00.000"));
        assert_eq!(row.field(2), Some("mthd:'open'"));
    }

    #[test]
    fn field_out_of_range_is_none() {
        let row = ResponseRow::single("x");
        assert_eq!(row.field(1), None);
        assert_eq!(row.field(7), None);
    }
}
