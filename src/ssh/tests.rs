//! Tests for key generation and remote execution.

use super::*;
use crate::test_support::ScriptedRunner;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct KeyDir {
    _tmp: TempDir,
    key_path: Utf8PathBuf,
}

#[fixture]
fn key_dir() -> KeyDir {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    KeyDir {
        _tmp: tmp,
        key_path: root.join("machines").join("docker-1").join("id_rsa"),
    }
}

fn target() -> SshTarget {
    SshTarget {
        host: String::from("95.213.191.120"),
        port: 22,
        user: String::from("root"),
        key_path: Utf8PathBuf::from("/store/machines/docker-1/id_rsa"),
    }
}

#[test]
fn ssh_args_disable_prompts_and_host_key_checks() {
    let args = SshClient::<ScriptedRunner>::build_ssh_args(&target(), "uptime");
    let rendered: Vec<_> = args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    assert_eq!(
        rendered,
        [
            "-p",
            "22",
            "-i",
            "/store/machines/docker-1/id_rsa",
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=quiet",
            "-o",
            "ConnectTimeout=10",
            "root@95.213.191.120",
            "uptime",
        ]
    );
}

#[rstest]
fn generate_key_invokes_keygen_and_creates_directory(key_dir: KeyDir) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    let client = SshClient::new(runner.clone());

    client
        .generate_key(&key_dir.key_path)
        .unwrap_or_else(|err| panic!("generate key: {err}"));

    let parent = key_dir.key_path.parent().unwrap_or_else(|| panic!("parent"));
    assert!(parent.is_dir());
    let invocations = runner.invocations();
    let [keygen] = invocations.as_slice() else {
        panic!("expected one invocation, got {invocations:?}");
    };
    assert_eq!(
        keygen.command_string(),
        format!("ssh-keygen -q -t rsa -b 2048 -N  -f {}", key_dir.key_path)
    );
}

#[rstest]
fn generate_key_reuses_existing_key(key_dir: KeyDir) {
    let parent = key_dir.key_path.parent().unwrap_or_else(|| panic!("parent"));
    std::fs::create_dir_all(parent).unwrap_or_else(|err| panic!("mkdir: {err}"));
    std::fs::write(&key_dir.key_path, "private").unwrap_or_else(|err| panic!("write: {err}"));
    let runner = ScriptedRunner::new();
    let client = SshClient::new(runner.clone());

    client
        .generate_key(&key_dir.key_path)
        .unwrap_or_else(|err| panic!("generate key: {err}"));

    assert!(runner.invocations().is_empty());
}

#[rstest]
fn generate_key_surfaces_keygen_failure(key_dir: KeyDir) {
    let runner = ScriptedRunner::new();
    runner.push_failure(1);
    let client = SshClient::new(runner).with_keygen_bin("/usr/bin/ssh-keygen");

    let err = client
        .generate_key(&key_dir.key_path)
        .expect_err("keygen failure should surface");

    assert_eq!(
        err,
        SshError::CommandFailure {
            program: String::from("/usr/bin/ssh-keygen"),
            status: Some(1),
            status_text: String::from("1"),
            stderr: String::from("simulated failure"),
        }
    );
}

#[rstest]
fn read_public_key_reads_pub_file(key_dir: KeyDir) {
    let parent = key_dir.key_path.parent().unwrap_or_else(|| panic!("parent"));
    std::fs::create_dir_all(parent).unwrap_or_else(|err| panic!("mkdir: {err}"));
    std::fs::write(public_key_path(&key_dir.key_path), "ssh-rsa AAAA docker-1\n")
        .unwrap_or_else(|err| panic!("write: {err}"));
    let client = SshClient::new(ScriptedRunner::new());

    let key = client
        .read_public_key(&key_dir.key_path)
        .unwrap_or_else(|err| panic!("read key: {err}"));

    assert_eq!(key, "ssh-rsa AAAA docker-1\n");
}

#[rstest]
fn read_public_key_reports_missing_file(key_dir: KeyDir) {
    let client = SshClient::new(ScriptedRunner::new());

    let err = client
        .read_public_key(&key_dir.key_path)
        .expect_err("missing key should fail");

    assert!(matches!(err, SshError::Io { .. }), "got {err:?}");
}

#[rstest]
#[case(Some(0), true)]
#[case(Some(255), false)]
#[case(None, false)]
fn reachability_follows_exit_status(#[case] code: Option<i32>, #[case] expected: bool) {
    let runner = ScriptedRunner::new();
    runner.push_output(code, "", "");
    let client = SshClient::new(runner.clone());

    let reachable = client
        .is_reachable(&target())
        .unwrap_or_else(|err| panic!("probe: {err}"));

    assert_eq!(reachable, expected);
    let invocations = runner.invocations();
    let [probe] = invocations.as_slice() else {
        panic!("expected one invocation, got {invocations:?}");
    };
    assert_eq!(probe.program, "ssh");
    assert!(probe.command_string().ends_with("exit 0"));
}

#[test]
fn reachability_surfaces_spawn_failure() {
    let client = SshClient::new(ScriptedRunner::new()).with_ssh_bin("missing-ssh");

    let err = client
        .is_reachable(&target())
        .expect_err("spawn failure should surface");

    assert!(
        matches!(err, SshError::Spawn { ref program, .. } if program == "missing-ssh"),
        "got {err:?}"
    );
}

#[test]
fn run_reports_non_zero_exit_with_stderr() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(2), "", "mkswap: error");
    let client = SshClient::new(runner);

    let err = client
        .run(&target(), "mkswap /var/swap.img")
        .expect_err("command should fail");

    assert_eq!(
        err,
        SshError::CommandFailure {
            program: String::from("ssh"),
            status: Some(2),
            status_text: String::from("2"),
            stderr: String::from("mkswap: error"),
        }
    );
}

#[test]
fn run_returns_output_on_success() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "ok\n", "");
    let client = SshClient::new(runner);

    let output = client
        .run(&target(), "true")
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert_eq!(output.stdout, "ok\n");
}

#[test]
fn public_key_path_appends_suffix() {
    assert_eq!(
        public_key_path(Utf8Path::new("/store/id_rsa")),
        Utf8PathBuf::from("/store/id_rsa.pub")
    );
}
