//! The orchestrating agent: owns the log buffer and policy engine,
//! implements command dispatch for the server, and stamps entries with a
//! monotonic-offset timestamp.

use crate::logbuf::LogBuffer;
use crate::policy::{PolicyEngine, Verdict};
use crate::server::{self, CommandServer, RequestHandler, ServerError};
use apimon_common::{Command, LogEntry, ResponseBatch, ResponseRow};
use chrono::{DateTime, Local, TimeDelta};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info};

/// Fixed timestamp pattern for log entries and fetch-time responses.
/// The controller parses this shape back on the host.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Diagnostic tag the agent's own messages carry.
///
/// Instrumentation payloads must never contain these tags: the agent's
/// diagnostics go to `tracing`, not the log buffer. Finding one in a
/// buffered payload means the exclusion boundary was violated, which is a
/// programming error, not a runtime condition.
pub const DIAG_TAG_AGENT: &str = "apimon_agent";
/// Diagnostic tag of the command server's own messages.
pub const DIAG_TAG_SERVER: &str = "apimon_srv";

const IDENTITY_UNSET: &str = "host identity unavailable: not set by embedder";

/// Clock that formats "now" as the wall-clock time captured once at
/// construction plus the monotonic delta since.
///
/// Sampling the wall clock on every call can observe a non-monotonic
/// value mid-format under concurrent callers and emit timestamps the
/// host cannot parse; the fixed-epoch-plus-monotonic-delta scheme cannot.
struct MonotonicClock {
    epoch_wall: DateTime<Local>,
    epoch_instant: Instant,
}

impl MonotonicClock {
    fn new() -> Self {
        Self {
            epoch_wall: Local::now(),
            epoch_instant: Instant::now(),
        }
    }

    fn now_formatted(&self) -> String {
        let elapsed = self.epoch_instant.elapsed();
        let delta = TimeDelta::milliseconds(elapsed.as_millis() as i64);
        (self.epoch_wall + delta).format(TIME_FORMAT).to_string()
    }
}

/// The on-device monitor agent.
///
/// Construct once at process startup, wrap in an [`Arc`], and call
/// [`start`](Self::start) from the embedding process's init path. The
/// instrumentation layer feeds it via
/// [`record_api_call`](Self::record_api_call) and
/// [`decide`](Self::decide).
pub struct MonitorAgent {
    logs: Arc<LogBuffer>,
    policy: PolicyEngine,
    clock: MonotonicClock,
    pid: String,
    identity: Mutex<Option<String>>,
}

impl MonitorAgent {
    pub fn new(policy_file: impl Into<PathBuf>) -> Self {
        Self {
            logs: Arc::new(LogBuffer::new()),
            policy: PolicyEngine::new(policy_file),
            clock: MonotonicClock::new(),
            pid: std::process::id().to_string(),
            identity: Mutex::new(None),
        }
    }

    /// Start the command server on `port`, blocking until the bind
    /// outcome is known.
    pub fn start(self: Arc<Self>, port: u16) -> Result<CommandServer, ServerError> {
        info!("starting monitor agent command server, pid {}", self.pid);
        server::start(port, self)
    }

    /// Set the host identity reported by the connectivity check. Called
    /// by the embedder once it knows its own identity (the original
    /// system learns it only when the first activity launches).
    pub fn set_identity(&self, identity: impl Into<String>) {
        *self.lock_identity() = Some(identity.into());
    }

    /// Record one intercepted API call. Called concurrently from
    /// arbitrary instrumentation threads.
    pub fn record_api_call(&self, payload: impl Into<String>) {
        let entry = LogEntry::new(self.pid.clone(), self.clock.now_formatted(), payload);
        self.logs.append(entry);
    }

    /// Policy verdict for one intercepted call. Fail-open; see
    /// [`PolicyEngine::decide`].
    pub fn decide(&self, method: &str, resources: &[String]) -> Verdict {
        self.policy.decide(method, resources)
    }

    /// Current time under the monotonic-offset scheme.
    pub fn now_formatted(&self) -> String {
        self.clock.now_formatted()
    }

    /// The shared log buffer, for embedders that append pre-stamped
    /// entries themselves.
    pub fn logs(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    fn identity_string(&self) -> String {
        self.lock_identity()
            .clone()
            .unwrap_or_else(|| IDENTITY_UNSET.to_string())
    }

    fn lock_identity(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Panics if any buffered payload carries one of the agent's own
    /// diagnostic tags. Such an entry can only come from a bug in the
    /// embedding (agent diagnostics routed into the buffer), so this is
    /// surfaced as a hard failure rather than swallowed.
    fn validate_logs_not_from_agent(&self) {
        for entry in self.logs.peek_all() {
            assert!(
                !entry.payload.contains(DIAG_TAG_AGENT) && !entry.payload.contains(DIAG_TAG_SERVER),
                "buffered log entry originates from the agent's own diagnostics: {}",
                entry.payload
            );
        }
    }
}

impl RequestHandler for MonitorAgent {
    fn handle(&self, request: &str) -> ResponseBatch {
        self.validate_logs_not_from_agent();

        match Command::parse(request) {
            Some(Command::ConnCheck) => {
                vec![ResponseRow::triple(
                    self.pid.clone(),
                    self.identity_string(),
                    "",
                )]
            }
            Some(Command::GetLogs) => self
                .logs
                .drain_all()
                .into_iter()
                .map(LogEntry::into_row)
                .collect(),
            Some(Command::GetTime) => {
                let time = self.clock.now_formatted();
                debug!("reporting agent time {time}");
                vec![ResponseRow::single(time)]
            }
            Some(Command::Close) => Vec::new(),
            None => {
                error!("unexpected command from controller: {request:?}");
                Vec::new()
            }
        }
    }

    fn should_close(&self, request: &str) -> bool {
        Command::parse(request) == Some(Command::Close)
    }
}
