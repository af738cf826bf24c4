//! One blocking JSON round trip over the kernel process protocol:
//! `<bin> <command>` with the request on stdin, the response on stdout and
//! diagnostics on stderr, read only after the child exits.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::Value;

pub(crate) struct RawOutput {
    /// Exit code; `None` when the child was terminated by a signal.
    pub status: Option<i32>,
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr.
    pub stderr: String,
}

impl RawOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub(crate) fn run_raw(bin: &Path, command: &str, request: &Value) -> io::Result<RawOutput> {
    let mut child = Command::new(bin)
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let payload = serde_json::to_vec(request)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&payload)?;
        // Dropping the handle closes the child's stdin.
    }

    let output = child.wait_with_output()?;
    Ok(RawOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Round trip used while probing candidates: every failure collapses into a
/// labeled reason string instead of an error, because the caller keeps trying
/// further candidates.
pub(crate) fn run_json(bin: &Path, command: &str, request: &Value) -> Result<Value, String> {
    let output = match run_raw(bin, command, request) {
        Ok(output) => output,
        Err(err) => return Err(format!("spawn failed: {err}")),
    };

    if !output.success() {
        let exit = match output.status {
            Some(code) => format!("exit {code}"),
            None => "terminated by signal".to_string(),
        };
        let detail = if !output.stderr.is_empty() {
            format!(" (stderr: {})", output.stderr)
        } else if !output.stdout.is_empty() {
            format!(" (stdout: {})", output.stdout)
        } else {
            String::new()
        };
        return Err(format!("{exit}{detail}"));
    }

    if output.stdout.is_empty() {
        return Err("empty stdout".to_string());
    }
    serde_json::from_str(&output.stdout).map_err(|err| format!("non-JSON stdout ({err})"))
}
