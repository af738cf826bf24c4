#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use kernel_bridge::contract::commands;
use kernel_bridge::{BridgeConfig, BridgeError, ExecutionMode, Invocation, KernelBridge};
use serde_json::json;
use tempfile::tempdir;

const GOOD_KERNEL: &str = r#"#!/bin/sh
cmd="$1"
input=$(cat)
case "$cmd" in
  protocol.version) printf '%s' '{"version":1,"protocol":1,"kernelVersion":"1.2.3-test","commands":["worktree.ensure","worktree.remove","patch.apply","git.commit_all","verify.run","protocol.version","repo.info"]}' ;;
  repo.info) printf '%s' '{"version":1,"repoRoot":"/tmp/repo","branch":"main","sha":"abc123","clean":true}' ;;
  echo.back) printf '{"received":%s}' "$input" ;;
  worktree.remove) : ;;
  quiet.op) : ;;
  fail.loud) echo boom >&2; exit 3 ;;
  garbage) printf 'not json at all' ;;
  *) printf '{}' ;;
esac
"#;

const BAD_KERNEL: &str = r#"#!/bin/sh
cat >/dev/null
case "$1" in
  protocol.version) printf '%s' '{"version":1,"protocol":2,"kernelVersion":"9.9.9","commands":["protocol.version"]}' ;;
esac
"#;

fn install_kernel(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Config whose non-override candidates all come up empty, so tests stay
/// deterministic on any host.
fn isolated_config(dir: &Path) -> BridgeConfig {
    BridgeConfig::default()
        .with_kernel_name("kernel-bridge-test-no-such-binary")
        .with_package_dir(dir)
        .with_workspace_dir(dir)
}

fn bridge_with_good_kernel(dir: &Path) -> KernelBridge {
    let bin = install_kernel(dir, "good-kernel", GOOD_KERNEL);
    KernelBridge::new(isolated_config(dir).with_override(bin))
}

#[test]
fn probe_negotiates_protocol_and_capabilities() {
    let dir = tempdir().unwrap();
    let bridge = bridge_with_good_kernel(dir.path());

    let session = bridge.session();
    assert!(session.enabled());
    let handshake = session.handshake().unwrap();
    assert_eq!(handshake.protocol, 1);
    assert_eq!(handshake.kernel_version, "1.2.3-test");
    assert!(handshake.supports(commands::PATCH_APPLY));
    assert!(handshake.supports(commands::REPO_INFO));
}

#[test]
fn invoke_round_trips_request_json() {
    let dir = tempdir().unwrap();
    let bridge = bridge_with_good_kernel(dir.path());

    let request = json!({ "path": "a/b", "count": 2 });
    match bridge.invoke("echo.back", &request).unwrap() {
        Invocation::Completed(value) => assert_eq!(value, json!({ "received": request })),
        Invocation::Unavailable => panic!("kernel should be enabled"),
    }
}

#[test]
fn empty_stdout_is_an_implicit_empty_object_only_where_allowed() {
    let dir = tempdir().unwrap();
    let bridge = bridge_with_good_kernel(dir.path());

    match bridge
        .invoke(commands::WORKTREE_REMOVE, &json!({ "path": "wt" }))
        .unwrap()
    {
        Invocation::Completed(value) => assert_eq!(value, json!({})),
        Invocation::Unavailable => panic!("kernel should be enabled"),
    }

    let err = bridge.invoke("quiet.op", &json!({})).unwrap_err();
    assert!(matches!(err, BridgeError::EmptyOutput { command } if command == "quiet.op"));
}

#[test]
fn nonzero_exit_is_fatal_with_stderr_excerpt() {
    let dir = tempdir().unwrap();
    let bridge = bridge_with_good_kernel(dir.path());

    let err = bridge.invoke("fail.loud", &json!({})).unwrap_err();
    match err {
        BridgeError::CommandFailed {
            command,
            status,
            stderr,
            ..
        } => {
            assert_eq!(command, "fail.loud");
            assert_eq!(status, Some(3));
            assert!(stderr.contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn non_json_stdout_is_fatal_with_raw_excerpt() {
    let dir = tempdir().unwrap();
    let bridge = bridge_with_good_kernel(dir.path());

    let err = bridge.invoke("garbage", &json!({})).unwrap_err();
    match err {
        BridgeError::NonJsonOutput { excerpt, .. } => {
            assert!(excerpt.contains("not json at all"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn repo_info_is_validated_and_typed() {
    let dir = tempdir().unwrap();
    let bridge = bridge_with_good_kernel(dir.path());

    let status = bridge.repo_info().unwrap().unwrap();
    assert_eq!(status.repo_root.as_deref(), Some("/tmp/repo"));
    assert_eq!(status.branch, "main");
    assert_eq!(status.sha, "abc123");
    assert!(status.clean);
}

#[test]
fn incompatible_kernel_degrades_session_in_auto_mode() {
    let dir = tempdir().unwrap();
    let bin = install_kernel(dir.path(), "bad-kernel", BAD_KERNEL);
    let bridge = KernelBridge::new(isolated_config(dir.path()).with_override(bin));

    let session = bridge.session();
    assert!(!session.enabled());
    let reason = session.disabled_reason().unwrap();
    assert!(reason.starts_with("override:"));
    assert!(reason.contains("protocol mismatch: expected 1, got 2"));
    assert!(reason.contains("missing commands:"));

    let result = bridge.invoke(commands::REPO_INFO, &json!({})).unwrap();
    assert!(matches!(result, Invocation::Unavailable));
}

#[test]
fn missing_override_is_skipped_silently_in_auto_mode() {
    let dir = tempdir().unwrap();
    let bridge = KernelBridge::new(
        isolated_config(dir.path()).with_override(dir.path().join("not-built-yet")),
    );

    let session = bridge.session();
    assert!(!session.enabled());
    assert!(session.disabled_reason().is_none());
}

#[test]
fn external_mode_fails_fast_on_missing_override() {
    let dir = tempdir().unwrap();
    let bridge = KernelBridge::new(
        isolated_config(dir.path())
            .with_mode(ExecutionMode::External)
            .with_override(dir.path().join("not-built-yet")),
    );

    let err = bridge.invoke(commands::REPO_INFO, &json!({})).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration { .. }));
}

#[test]
fn external_mode_never_falls_through_past_a_failing_override() {
    let dir = tempdir().unwrap();
    // A perfectly good kernel sits in the workspace build output, but the
    // explicit override must be the only candidate attempted.
    let release_dir = dir.path().join("target").join("release");
    fs::create_dir_all(&release_dir).unwrap();
    install_kernel(&release_dir, "kernel-bridge-test-kern", GOOD_KERNEL);

    let bad = install_kernel(dir.path(), "bad-kernel", BAD_KERNEL);
    let config = BridgeConfig::default()
        .with_kernel_name("kernel-bridge-test-kern")
        .with_package_dir(dir.path())
        .with_workspace_dir(dir.path())
        .with_mode(ExecutionMode::External)
        .with_override(&bad);

    let err = KernelBridge::new(config.clone())
        .invoke(commands::REPO_INFO, &json!({}))
        .unwrap_err();
    match err {
        BridgeError::Handshake { reasons } => {
            assert_eq!(reasons.len(), 1);
            assert!(reasons[0].starts_with("override:"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The same layout under auto mode does fall through to the build output.
    let auto = KernelBridge::new(config.with_mode(ExecutionMode::Auto));
    assert!(auto.session().enabled());
}

#[test]
fn session_is_resolved_exactly_once() {
    let dir = tempdir().unwrap();
    let counter = dir.path().join("probes");
    let script = format!(
        "#!/bin/sh\ncat >/dev/null\ncase \"$1\" in\n  protocol.version) echo probe >> {}; printf '%s' '{}' ;;\n  *) printf '{{}}' ;;\nesac\n",
        counter.display(),
        r#"{"version":1,"protocol":1,"kernelVersion":"1.2.3-test","commands":["worktree.ensure","worktree.remove","patch.apply","git.commit_all","verify.run","protocol.version","repo.info"]}"#,
    );
    let bin = install_kernel(dir.path(), "counting-kernel", &script);
    let bridge = KernelBridge::new(isolated_config(dir.path()).with_override(bin));

    bridge.invoke("first.op", &json!({})).unwrap();
    bridge.invoke("second.op", &json!({})).unwrap();
    bridge.invoke("third.op", &json!({})).unwrap();

    let probes = fs::read_to_string(&counter).unwrap();
    assert_eq!(probes.lines().count(), 1);
}
