//! Rule file loading and per-call policy decisions.
//!
//! The rule file is plain text, one rule per line, tab-separated:
//!
//! ```text
//! android.content.ContentResolver.query	content://sms	Deny
//! # comment lines, blank lines, and lines without a tab are ignored
//! ```
//!
//! First field: method name (all whitespace stripped). Last field: verdict
//! token. Anything in between: substrings that must all occur in the
//! queried resource list. The file is re-read on every decision so edits
//! take effect without restarting the agent, and every failure mode of
//! loading or matching resolves to [`Verdict::Allow`]: the policy layer is
//! advisory tooling and must never take down or block the host process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Disposition of one intercepted API call.
///
/// The variants mirror the vocabulary the rule file may use; the agent
/// attaches no meaning to non-`Allow` values beyond reporting them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Let the call through. Also the fail-open default.
    #[default]
    Allow,
    /// The call should be blocked.
    Deny,
    /// The call should be answered with a fake result.
    Mock,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unknown verdict token {0:?} in policy file")]
    UnknownVerdict(String),

    #[error("policy rule line {0:?} has no verdict field")]
    MissingVerdict(String),
}

impl FromStr for Verdict {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Allow" => Ok(Self::Allow),
            "Deny" => Ok(Self::Deny),
            "Mock" => Ok(Self::Mock),
            other => Err(PolicyError::UnknownVerdict(other.to_string())),
        }
    }
}

/// Identity of a rule: normalized method name plus required substrings.
///
/// Two rules with the same key are the same rule; a later line in the file
/// overwrites an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    method: String,
    required: Vec<String>,
}

impl RuleKey {
    fn new(method: impl Into<String>, required: Vec<String>) -> Self {
        Self {
            method: method.into(),
            required,
        }
    }

    /// Whether this rule affects the query.
    ///
    /// Method names compare equal after stripping all whitespace. Required
    /// substrings are matched against the concatenation of every resource
    /// string, so a substring may span two adjacent resources; that is a
    /// property of the matching algorithm, not an accident.
    fn affects(&self, method: &str, resources: &[String]) -> bool {
        if self.method != strip_whitespace(method) {
            return false;
        }
        let joined: String = resources.concat();
        self.required.iter().all(|needle| joined.contains(needle))
    }
}

fn strip_whitespace(s: &str) -> String {
    s.split_whitespace().collect()
}

const FIELD_SEPARATOR: char = '\t';
const COMMENT_MARKER: char = '#';

/// Policy engine bound to one rule file path.
pub struct PolicyEngine {
    path: PathBuf,
}

impl PolicyEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decide the disposition of `method` touching `resources`.
    ///
    /// Reloads the rule file, then returns the verdict of the first rule
    /// (in mapping order) that affects the query. No match, a missing
    /// file, or any load error yields [`Verdict::Allow`].
    pub fn decide(&self, method: &str, resources: &[String]) -> Verdict {
        match self.load_rules() {
            Ok(rules) => rules
                .iter()
                .find(|(key, _)| key.affects(method, resources))
                .map(|(_, verdict)| *verdict)
                .unwrap_or_default(),
            Err(err) => {
                debug!("policy load failed, defaulting to Allow: {err}");
                Verdict::Allow
            }
        }
    }

    /// Parse the rule file into a fresh mapping (clear-then-rebuild; the
    /// previous mapping is never mutated in place). A missing file is an
    /// empty rule set; an unparseable verdict token fails the whole load.
    pub fn load_rules(&self) -> Result<HashMap<RuleKey, Verdict>, PolicyError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(source) => {
                return Err(PolicyError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut rules = HashMap::new();
        for line in text.lines() {
            if skip_line(line) {
                continue;
            }
            let mut fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
            // Stray trailing separators must not become an empty verdict
            // field; only interior fields count.
            while fields.last() == Some(&"") {
                fields.pop();
            }
            if fields.len() < 2 {
                return Err(PolicyError::MissingVerdict(line.to_string()));
            }
            // First field is the method name, last is the verdict token,
            // anything in between is a required substring, kept verbatim.
            let method = strip_whitespace(fields[0]);
            let verdict: Verdict = fields[fields.len() - 1].trim().parse()?;
            let required = fields[1..fields.len() - 1]
                .iter()
                .map(|s| s.to_string())
                .collect();
            rules.insert(RuleKey::new(method, required), verdict);
        }
        Ok(rules)
    }
}

fn skip_line(line: &str) -> bool {
    line.trim().is_empty()
        || !line.contains(FIELD_SEPARATOR)
        || line.starts_with(COMMENT_MARKER)
}
