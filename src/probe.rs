//! Handshake probing: try each candidate in order, first success wins.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::{BridgeConfig, ExecutionMode};
use crate::contract::{self, commands};
use crate::process;
use crate::resolver;

/// Outcome of a successful capability/version negotiation.
#[derive(Clone, Debug)]
pub struct Handshake {
    pub protocol: i64,
    pub kernel_version: String,
    pub commands: BTreeSet<String>,
}

impl Handshake {
    pub fn supports(&self, command: &str) -> bool {
        self.commands.contains(command)
    }
}

/// How resolution ended. Fatal variants only arise in external mode.
pub(crate) enum Selection {
    Enabled { bin: PathBuf, handshake: Handshake },
    /// Auto mode exhausted its candidates; the first failure reason is kept
    /// for diagnostics. Not an error: callers fall back locally.
    Degraded { reason: Option<String> },
    FatalOverride { path: PathBuf },
    FatalHandshake { reasons: Vec<String> },
}

fn probe_candidate(bin: &Path) -> Result<Handshake, String> {
    let response = process::run_json(bin, commands::PROTOCOL_VERSION, &Value::Object(Map::new()))
        .map_err(|reason| format!("{} failed: {reason}", commands::PROTOCOL_VERSION))?;

    let violations = contract::validate_handshake(&response);
    if !violations.is_empty() {
        return Err(format!(
            "invalid {} output: {}",
            commands::PROTOCOL_VERSION,
            violations.join("; ")
        ));
    }

    // Field shapes are guaranteed by validation above.
    let protocol = response.get("protocol").and_then(Value::as_i64).unwrap_or_default();
    let kernel_version = response
        .get("kernelVersion")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let commands: BTreeSet<String> = response
        .get("commands")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Handshake {
        protocol,
        kernel_version,
        commands,
    })
}

pub(crate) fn select_kernel(config: &BridgeConfig) -> Selection {
    let candidates = resolver::candidate_list(config);
    let mut reasons = Vec::new();

    for candidate in &candidates {
        if candidate.requires_file && !candidate.bin.is_file() {
            if candidate.explicit && config.mode == ExecutionMode::External {
                return Selection::FatalOverride {
                    path: candidate.bin.clone(),
                };
            }
            continue;
        }

        match probe_candidate(&candidate.bin) {
            Ok(handshake) => {
                log::debug!(
                    "kernel selected via {}: {} (protocol {})",
                    candidate.label,
                    candidate.bin.display(),
                    handshake.protocol
                );
                return Selection::Enabled {
                    bin: candidate.bin.clone(),
                    handshake,
                };
            }
            Err(reason) => {
                log::debug!("kernel candidate {} rejected: {reason}", candidate.label);
                reasons.push(format!("{}: {reason}", candidate.label));
                if candidate.explicit && config.mode == ExecutionMode::External {
                    break;
                }
            }
        }
    }

    if config.mode == ExecutionMode::External {
        return Selection::FatalHandshake { reasons };
    }
    Selection::Degraded {
        reason: reasons.into_iter().next(),
    }
}
