//! The versioned wire contract between the bridge and the kernel.
//!
//! Validators are pure and non-throwing: each returns the ordered list of
//! violations it found, so simultaneous problems are all reported at once.

use serde::Deserialize;
use serde_json::Value;

/// Protocol revision this bridge speaks. Command identifiers below are part
/// of the same compatibility contract; renaming one requires bumping this.
pub const EXPECTED_PROTOCOL: i64 = 1;

/// Wire identifiers of the kernel commands.
pub mod commands {
    pub const WORKTREE_ENSURE: &str = "worktree.ensure";
    pub const WORKTREE_REMOVE: &str = "worktree.remove";
    pub const PATCH_APPLY: &str = "patch.apply";
    pub const GIT_COMMIT_ALL: &str = "git.commit_all";
    pub const VERIFY_RUN: &str = "verify.run";
    pub const PROTOCOL_VERSION: &str = "protocol.version";
    pub const REPO_INFO: &str = "repo.info";
}

/// Commands every compatible kernel must advertise in its handshake.
pub const REQUIRED_COMMANDS: [&str; 7] = [
    commands::WORKTREE_ENSURE,
    commands::WORKTREE_REMOVE,
    commands::PATCH_APPLY,
    commands::GIT_COMMIT_ALL,
    commands::VERIFY_RUN,
    commands::PROTOCOL_VERSION,
    commands::REPO_INFO,
];

/// Commands whose contract defines an implicit empty-object result, making
/// empty stdout acceptable.
pub(crate) fn allows_empty_output(command: &str) -> bool {
    command == commands::WORKTREE_REMOVE
}

/// Checks a `protocol.version` response against the expected shape.
pub fn validate_handshake(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = value.as_object() else {
        return vec!["expected object".to_string()];
    };

    if obj.get("version").and_then(Value::as_i64) != Some(1) {
        errors.push("expected version: 1".to_string());
    }

    match obj.get("protocol").and_then(Value::as_i64) {
        None => errors.push("expected protocol: integer".to_string()),
        Some(actual) if actual != EXPECTED_PROTOCOL => errors.push(format!(
            "protocol mismatch: expected {EXPECTED_PROTOCOL}, got {actual}"
        )),
        Some(_) => {}
    }

    match obj.get("kernelVersion").and_then(Value::as_str) {
        Some(version) if !version.trim().is_empty() => {}
        _ => errors.push("expected kernelVersion: non-empty string".to_string()),
    }

    match obj.get("commands").and_then(Value::as_array) {
        None => errors.push("expected commands: array".to_string()),
        Some(advertised) => {
            let missing: Vec<&str> = REQUIRED_COMMANDS
                .iter()
                .copied()
                .filter(|required| {
                    !advertised
                        .iter()
                        .any(|entry| entry.as_str() == Some(*required))
                })
                .collect();
            if !missing.is_empty() {
                errors.push(format!("missing commands: {}", missing.join(", ")));
            }
        }
    }

    errors
}

/// Checks a `repo.info` response against the expected shape.
pub fn validate_repo_status(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = value.as_object() else {
        return vec!["expected object".to_string()];
    };

    if obj.get("version").and_then(Value::as_i64) != Some(1) {
        errors.push("expected version: 1".to_string());
    }
    match obj.get("repoRoot") {
        Some(Value::Null) | Some(Value::String(_)) => {}
        _ => errors.push("expected repoRoot: string|null".to_string()),
    }
    if !matches!(obj.get("branch"), Some(Value::String(_))) {
        errors.push("expected branch: string".to_string());
    }
    if !matches!(obj.get("sha"), Some(Value::String(_))) {
        errors.push("expected sha: string".to_string());
    }
    if !matches!(obj.get("clean"), Some(Value::Bool(_))) {
        errors.push("expected clean: boolean".to_string());
    }

    errors
}

/// Validated `repo.info` response. Empty `branch`/`sha` mean "no repository".
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    pub version: i64,
    pub repo_root: Option<String>,
    pub branch: String,
    pub sha: String,
    pub clean: bool,
}
