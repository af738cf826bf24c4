use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by kernel resolution and command invocation.
///
/// Auto-mode probe failures never surface here; they degrade the session to
/// disabled and callers fall back locally. Everything below is either a forced
/// external-mode resolution failure or a failure of a live command against an
/// already-negotiated kernel, which must not be silently retried elsewhere.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The explicit kernel override does not point at a file while external
    /// mode requires one.
    #[error("kernel required but the configured override is not a file: {}", .path.display())]
    Configuration { path: PathBuf },

    /// External mode exhausted its candidates without a compatible kernel.
    #[error("kernel required but not found or incompatible{}", handshake_trail(.reasons))]
    Handshake { reasons: Vec<String> },

    /// A response payload failed contract validation.
    #[error("invalid {payload} payload: {}", .violations.join("; "))]
    ContractViolation {
        payload: &'static str,
        violations: Vec<String>,
    },

    /// A previously negotiated kernel binary could not be spawned.
    #[error("kernel spawn failed for `{} {command}`: {source}", .bin.display())]
    Spawn {
        bin: PathBuf,
        command: String,
        #[source]
        source: io::Error,
    },

    /// A live command exited unsuccessfully.
    #[error("kernel {command} failed ({}){}", exit_label(.status), detail_blocks(.stderr, .stdout))]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
        stdout: String,
    },

    /// Empty stdout from a command whose contract requires a response body.
    #[error("kernel {command} produced no output")]
    EmptyOutput { command: String },

    /// Stdout was not parseable as JSON.
    #[error("kernel {command} returned non-JSON output ({detail}). Raw:\n{excerpt}")]
    NonJsonOutput {
        command: String,
        detail: String,
        excerpt: String,
    },
}

fn handshake_trail(reasons: &[String]) -> String {
    if reasons.is_empty() {
        return String::new();
    }
    format!("\n\nHandshake errors:\n- {}", reasons.join("\n- "))
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn detail_blocks(stderr: &str, stdout: &str) -> String {
    let mut out = String::new();
    if !stderr.is_empty() {
        out.push_str("\n\nstderr:\n");
        out.push_str(stderr);
    }
    if !stdout.is_empty() {
        out.push_str("\n\nstdout:\n");
        out.push_str(stdout);
    }
    out
}
