//! The memoized kernel session and the command invoker built on it.
//!
//! A `KernelBridge` is an explicit context object: the first use resolves the
//! session (resolver + prober) exactly once, concurrent first users included,
//! and every later call reuses the outcome. A fresh resolution requires a
//! fresh bridge.

use std::path::PathBuf;
use std::sync::OnceLock;

use serde_json::{json, Map, Value};

use crate::config::{BridgeConfig, ExecutionMode};
use crate::contract::{self, commands, RepoStatus};
use crate::error::BridgeError;
use crate::probe::{self, Handshake, Selection};
use crate::process;

/// Raw output excerpts carried by fatal errors are capped at this many
/// characters.
const RAW_EXCERPT_CHARS: usize = 2000;

/// Result of asking the bridge to run a command.
#[derive(Debug)]
pub enum Invocation {
    /// The kernel ran the command; here is its parsed response.
    Completed(Value),
    /// No kernel is available and the mode permits falling back. The caller
    /// must run its local equivalent; this is expected, not exceptional.
    Unavailable,
}

#[derive(Debug)]
enum SessionState {
    Enabled { bin: PathBuf, handshake: Handshake },
    /// Kernel absent or incompatible under auto/fallback mode.
    Degraded { reason: Option<String> },
    /// External mode failed to resolve; every use re-raises the failure.
    FatalOverride { path: PathBuf },
    FatalHandshake { reasons: Vec<String> },
}

/// Write-once record of one resolver/prober run.
#[derive(Debug)]
pub struct Session {
    mode: ExecutionMode,
    state: SessionState,
}

impl Session {
    fn resolve(config: &BridgeConfig) -> Self {
        if config.mode == ExecutionMode::Fallback {
            return Self {
                mode: config.mode,
                state: SessionState::Degraded { reason: None },
            };
        }
        let state = match probe::select_kernel(config) {
            Selection::Enabled { bin, handshake } => SessionState::Enabled { bin, handshake },
            Selection::Degraded { reason } => SessionState::Degraded { reason },
            Selection::FatalOverride { path } => SessionState::FatalOverride { path },
            Selection::FatalHandshake { reasons } => SessionState::FatalHandshake { reasons },
        };
        Self {
            mode: config.mode,
            state,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn enabled(&self) -> bool {
        matches!(self.state, SessionState::Enabled { .. })
    }

    pub fn handshake(&self) -> Option<&Handshake> {
        match &self.state {
            SessionState::Enabled { handshake, .. } => Some(handshake),
            _ => None,
        }
    }

    /// Diagnostic reason the session is disabled, when one was recorded.
    pub fn disabled_reason(&self) -> Option<&str> {
        match &self.state {
            SessionState::Degraded { reason } => reason.as_deref(),
            SessionState::FatalHandshake { reasons } => reasons.first().map(String::as_str),
            _ => None,
        }
    }

    /// JSON summary for diagnostics output.
    pub fn summary(&self) -> Value {
        let mut map = Map::new();
        map.insert("mode".into(), json!(self.mode.as_str()));
        map.insert("enabled".into(), json!(self.enabled()));
        match &self.state {
            SessionState::Enabled { bin, handshake } => {
                map.insert("bin".into(), json!(bin.display().to_string()));
                map.insert("protocol".into(), json!(handshake.protocol));
                map.insert("kernelVersion".into(), json!(&handshake.kernel_version));
                map.insert("commands".into(), json!(&handshake.commands));
            }
            SessionState::Degraded { reason } => {
                map.insert("reason".into(), json!(reason));
            }
            SessionState::FatalOverride { path } => {
                map.insert(
                    "reason".into(),
                    json!(format!("override is not a file: {}", path.display())),
                );
            }
            SessionState::FatalHandshake { reasons } => {
                map.insert("reason".into(), json!(reasons));
            }
        }
        Value::Object(map)
    }
}

/// Host-side handle to the external kernel.
pub struct KernelBridge {
    config: BridgeConfig,
    session: OnceLock<Session>,
}

impl KernelBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            session: OnceLock::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(BridgeConfig::from_env())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The memoized session, resolving it on first use.
    pub fn session(&self) -> &Session {
        self.session.get_or_init(|| Session::resolve(&self.config))
    }

    /// Runs `command` against the resolved kernel with a JSON request.
    ///
    /// With no kernel available this returns `Invocation::Unavailable` (or, in
    /// external mode, the stored resolution failure). Once a command starts
    /// against a live session every failure is fatal: a partially executed
    /// kernel command may have caused side effects a fallback re-run would
    /// duplicate.
    pub fn invoke(&self, command: &str, request: &Value) -> Result<Invocation, BridgeError> {
        let session = self.session();
        let bin = match &session.state {
            SessionState::Enabled { bin, .. } => bin,
            SessionState::Degraded { .. } => return Ok(Invocation::Unavailable),
            SessionState::FatalOverride { path } => {
                return Err(BridgeError::Configuration { path: path.clone() })
            }
            SessionState::FatalHandshake { reasons } => {
                return Err(BridgeError::Handshake {
                    reasons: reasons.clone(),
                })
            }
        };

        let output = process::run_raw(bin, command, request).map_err(|source| {
            BridgeError::Spawn {
                bin: bin.clone(),
                command: command.to_string(),
                source,
            }
        })?;

        if !output.success() {
            return Err(BridgeError::CommandFailed {
                command: command.to_string(),
                status: output.status,
                stderr: output.stderr,
                stdout: output.stdout,
            });
        }

        if output.stdout.is_empty() {
            if contract::allows_empty_output(command) {
                return Ok(Invocation::Completed(Value::Object(Map::new())));
            }
            return Err(BridgeError::EmptyOutput {
                command: command.to_string(),
            });
        }

        match serde_json::from_str(&output.stdout) {
            Ok(value) => Ok(Invocation::Completed(value)),
            Err(err) => Err(BridgeError::NonJsonOutput {
                command: command.to_string(),
                detail: err.to_string(),
                excerpt: truncate_chars(&output.stdout, RAW_EXCERPT_CHARS),
            }),
        }
    }

    /// Invokes `repo.info` and validates the response shape.
    ///
    /// `None` means no kernel is available and the caller should inspect the
    /// repository itself.
    pub fn repo_info(&self) -> Result<Option<RepoStatus>, BridgeError> {
        let value = match self.invoke(commands::REPO_INFO, &json!({}))? {
            Invocation::Unavailable => return Ok(None),
            Invocation::Completed(value) => value,
        };

        let violations = contract::validate_repo_status(&value);
        if !violations.is_empty() {
            return Err(BridgeError::ContractViolation {
                payload: commands::REPO_INFO,
                violations,
            });
        }
        let status = serde_json::from_value(value).map_err(|err| {
            BridgeError::ContractViolation {
                payload: commands::REPO_INFO,
                violations: vec![err.to_string()],
            }
        })?;
        Ok(Some(status))
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_mode_never_probes() {
        // The kernel name below would fail PATH probing slowly if it ran;
        // fallback mode must short-circuit before the resolver.
        let bridge = KernelBridge::new(
            BridgeConfig::default()
                .with_mode(ExecutionMode::Fallback)
                .with_kernel_name("kernel-bridge-test-no-such-binary"),
        );
        let session = bridge.session();
        assert!(!session.enabled());
        assert!(session.disabled_reason().is_none());

        let result = bridge.invoke(commands::REPO_INFO, &json!({})).unwrap();
        assert!(matches!(result, Invocation::Unavailable));
        assert!(bridge.repo_info().unwrap().is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
