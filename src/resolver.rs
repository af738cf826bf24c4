//! Enumeration of kernel binary candidates in priority order.

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::BridgeConfig;

/// One place a kernel binary might live.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Short label used in handshake diagnostics.
    pub label: &'static str,
    pub bin: PathBuf,
    /// File-backed candidates are skipped when the file is missing;
    /// PATH-resolved ones are always attempted.
    pub requires_file: bool,
    /// Whether this came from the operator-supplied override.
    pub explicit: bool,
}

/// Appends the platform executable suffix to the configured kernel name.
pub(crate) fn kernel_bin_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Normalized `<os>-<arch>` key for packaged binaries; `None` means no
/// prebuilt binary exists for this target.
fn platform_key() -> Option<String> {
    let os = if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else {
        return None;
    };
    let arch = if cfg!(target_arch = "x86_64") {
        "x64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        return None;
    };
    Some(format!("{os}-{arch}"))
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Checks whether the bare kernel name resolves through the ambient search
/// path by attempting to spawn it. A `NotFound` spawn error means there is no
/// candidate; any other outcome keeps the name as a candidate so that probing
/// can produce a better diagnostic than a silent skip.
fn path_candidate(name: &str) -> Option<PathBuf> {
    let attempt = Command::new(name)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match attempt {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        _ => Some(PathBuf::from(name)),
    }
}

/// Produces the ordered, de-duplicated candidate list:
/// explicit override, packaged binary, PATH lookup, then local build outputs
/// (release before debug). Duplicate locators keep their first position.
pub fn candidate_list(config: &BridgeConfig) -> Vec<Candidate> {
    let bin_name = kernel_bin_name(&config.kernel_name);
    let mut candidates = Vec::new();

    if let Some(override_path) = &config.override_path {
        candidates.push(Candidate {
            label: "override",
            bin: absolutize(override_path),
            requires_file: true,
            explicit: true,
        });
    }

    if let Some(key) = platform_key() {
        let package_dir = config.package_dir.clone().or_else(|| {
            env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
        });
        if let Some(package_dir) = package_dir {
            candidates.push(Candidate {
                label: "package",
                bin: package_dir.join("bin").join(key).join(&bin_name),
                requires_file: true,
                explicit: false,
            });
        }
    }

    if let Some(bin) = path_candidate(&config.kernel_name) {
        candidates.push(Candidate {
            label: "PATH",
            bin,
            requires_file: false,
            explicit: false,
        });
    }

    let workspace = config
        .workspace_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    candidates.push(Candidate {
        label: "target-release",
        bin: workspace.join("target").join("release").join(&bin_name),
        requires_file: true,
        explicit: false,
    });
    candidates.push(Candidate {
        label: "target-debug",
        bin: workspace.join("target").join("debug").join(&bin_name),
        requires_file: true,
        explicit: false,
    });

    let mut seen = HashSet::new();
    let deduped: Vec<Candidate> = candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.bin.clone()))
        .collect();

    log::debug!(
        "kernel candidates: {:?}",
        deduped
            .iter()
            .map(|c| (c.label, c.bin.display().to_string()))
            .collect::<Vec<_>>()
    );
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    fn config() -> BridgeConfig {
        // A kernel name that cannot resolve through PATH keeps the list
        // deterministic regardless of the host machine.
        BridgeConfig::default()
            .with_kernel_name("kernel-bridge-test-no-such-binary")
            .with_package_dir("/opt/bridge")
            .with_workspace_dir("/work")
    }

    #[test]
    fn candidates_follow_priority_order() {
        let list = candidate_list(&config().with_override("/somewhere/kernel"));
        let labels: Vec<&str> = list.iter().map(|c| c.label).collect();
        assert_eq!(
            labels,
            vec!["override", "package", "target-release", "target-debug"]
        );
        assert!(list[0].explicit && list[0].requires_file);
        assert!(!list[1].explicit);
    }

    #[test]
    fn duplicate_locators_keep_first_position() {
        let bin = kernel_bin_name("kernel-bridge-test-no-such-binary");
        let release = PathBuf::from("/work/target/release").join(&bin);
        let list = candidate_list(&config().with_override(&release));
        let labels: Vec<&str> = list.iter().map(|c| c.label).collect();
        assert_eq!(labels, vec!["override", "package", "target-debug"]);
        assert_eq!(list[0].bin, release);
    }

    #[test]
    fn packaged_candidate_lives_under_platform_key() {
        let list = candidate_list(&config());
        let package = list.iter().find(|c| c.label == "package").unwrap();
        let rendered = package.bin.to_string_lossy().replace('\\', "/");
        assert!(rendered.starts_with("/opt/bridge/bin/"));
        let key = platform_key().unwrap();
        assert!(rendered.contains(&format!("/bin/{key}/")));
    }
}
