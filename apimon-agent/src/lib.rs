//! On-device control-plane agent for an app-instrumentation harness.
//!
//! The agent lives inside a monitored process. An instrumentation layer
//! (out of scope here) intercepts API calls and hands the agent one payload
//! string per call; the agent buffers those, serves them to an external
//! controller over a single-connection-per-request TCP protocol, and
//! answers per-call policy queries from a live-editable rule file.
//!
//! Embedding sketch:
//!
//! ```text
//! let agent = Arc::new(MonitorAgent::new(policy_path));
//! let server = agent.clone().start(port)?;   // blocks until bind outcome
//! ...
//! agent.record_api_call(payload);            // from interception sites
//! ```

pub mod agent;
pub mod bootstrap;
pub mod logbuf;
pub mod payload;
pub mod policy;
pub mod server;

pub use agent::MonitorAgent;
pub use bootstrap::AgentConfig;
pub use logbuf::LogBuffer;
pub use policy::{PolicyEngine, Verdict};
pub use server::{CommandServer, RequestHandler, ServerError};
