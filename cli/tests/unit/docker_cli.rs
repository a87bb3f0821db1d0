//! Unit tests for `DockerCli`.
//!
//! These tests verify that `DockerCli` builds the correct docker argument
//! lists, routes each call to the right runner, and turns docker failures
//! into errors that carry docker's stderr.

#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output, Stdio};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use testbed_cli::application::ports::{
    CommandRunner, ContainerInspector, ContainerLifecycle, ContainerShell, CopyOptions,
    ExecRequest, FileTransfer, ImageStore, NetworkManager, RunSpec,
};
use testbed_cli::application::services::exec::RemoteOutput;
use testbed_cli::infra::docker::{DockerCli, exec_args, network_create_args, run_args};
use testbed_common::{NetworkConfig, PortBinding, VolumeBinding};

// ─── MockCommandRunner ────────────────────────────────────────────────────────

type Responder = Arc<dyn Fn(&[String]) -> Result<Output> + Send + Sync>;

/// A `CommandRunner` that records every call and answers with a responder
/// keyed on the argument list. `spawn` runs `script` through a real `sh -c`
/// when one is set.
#[derive(Clone)]
struct MockCommandRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    stdin: Arc<Mutex<Vec<Vec<u8>>>>,
    respond: Responder,
    script: Option<String>,
}

impl MockCommandRunner {
    fn new(respond: impl Fn(&[String]) -> Result<Output> + Send + Sync + 'static) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            stdin: Arc::new(Mutex::new(Vec::new())),
            respond: Arc::new(respond),
            script: None,
        }
    }

    fn shell(script: &str) -> Self {
        Self {
            script: Some(script.to_string()),
            ..Self::ok()
        }
    }

    fn ok() -> Self {
        Self::new(|_| Ok(output(0, "", "")))
    }

    fn recorded_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("mutex poisoned").clone()
    }

    fn record(&self, program: &str, args: &[&str]) -> Vec<String> {
        assert_eq!(program, "docker");
        let args: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();
        self.calls.lock().expect("mutex poisoned").push(args.clone());
        args
    }
}

impl CommandRunner for MockCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let args = self.record(program, args);
        (self.respond)(&args)
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        self.stdin.lock().expect("mutex poisoned").push(input.to_vec());
        self.run(program, args).await
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child> {
        self.record(program, args);
        let Some(script) = &self.script else {
            bail!("spawn not supported in MockCommandRunner")
        };
        Ok(tokio::process::Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

fn split(cmd: &MockCommandRunner, exec: &MockCommandRunner) -> DockerCli<MockCommandRunner> {
    DockerCli::new(cmd.clone(), exec.clone())
}

// ─── Argument construction ───────────────────────────────────────────────────

#[test]
fn run_args_map_every_spec_field() {
    let extra_hosts = BTreeMap::from([("nw-test-db-1".to_string(), "172.30.0.3".to_string())]);
    let ports = BTreeMap::from([(
        "8080/tcp".to_string(),
        PortBinding::Address("127.0.0.1:18080".into()),
    )]);
    let volumes = BTreeMap::from([
        (
            "/srv/data".to_string(),
            VolumeBinding {
                bind: Some("/data".into()),
                mode: Some("rw".into()),
            },
        ),
        (
            "/srv/ignored".to_string(),
            VolumeBinding {
                bind: Some("/ignored".into()),
                mode: None,
            },
        ),
    ]);
    let environment = vec!["MODE=test".to_string()];
    let spec = RunSpec {
        name: "nw-test-repo-1",
        image: "sardines/repo:test",
        extra_hosts: &extra_hosts,
        ports: &ports,
        environment: &environment,
        volumes: &volumes,
    };
    assert_eq!(
        run_args(&spec),
        [
            "run",
            "-d",
            "-t",
            "--name",
            "nw-test-repo-1",
            "--hostname",
            "nw-test-repo-1",
            "--add-host",
            "nw-test-db-1:172.30.0.3",
            "-p",
            "127.0.0.1:18080:8080/tcp",
            "-e",
            "MODE=test",
            "-v",
            "/srv/data:/data:rw",
            "sardines/repo:test",
        ]
    );
}

#[test]
fn exec_args_run_through_shell_with_env_and_user() {
    let environment = vec!["PATH=./bin:/usr/bin".to_string()];
    let request = ExecRequest {
        command: "npm run startRepo",
        workdir: "/sardines/shoal",
        environment: &environment,
        user: Some("postgres"),
    };
    assert_eq!(
        exec_args("repo", &request, true),
        [
            "exec",
            "-d",
            "-w",
            "/sardines/shoal",
            "-e",
            "PATH=./bin:/usr/bin",
            "-u",
            "postgres",
            "repo",
            "sh",
            "-c",
            "npm run startRepo",
        ]
    );
}

#[test]
fn network_create_adds_ipam_only_with_subnet_and_gateway() {
    let full = NetworkConfig {
        driver: None,
        subnet: Some("172.30.0.0/16".into()),
        gateway: Some("172.30.0.1".into()),
    };
    assert_eq!(
        network_create_args("nw-test", &full),
        [
            "network",
            "create",
            "--driver",
            "bridge",
            "--subnet",
            "172.30.0.0/16",
            "--gateway",
            "172.30.0.1",
            "nw-test",
        ]
    );
    let partial = NetworkConfig {
        driver: Some("overlay".into()),
        subnet: Some("172.30.0.0/16".into()),
        gateway: None,
    };
    assert_eq!(
        network_create_args("nw-test", &partial),
        ["network", "create", "--driver", "overlay", "nw-test"]
    );
}

// ─── Runner routing and parsing ──────────────────────────────────────────────

#[tokio::test]
async fn list_containers_parses_names_ids_and_state() {
    let cmd = MockCommandRunner::new(|_| {
        Ok(output(0, "repo\tabc123\trunning\ndb\tdef456\texited\n\n", ""))
    });
    let exec = MockCommandRunner::ok();
    let handles = split(&cmd, &exec)
        .list_containers()
        .await
        .expect("ps should succeed");
    assert_eq!(handles.len(), 2);
    assert!(handles[0].running);
    assert_eq!(handles[1].name, "db");
    assert_eq!(handles[1].id, "def456");
    assert!(!handles[1].running);
    assert_eq!(
        cmd.recorded_calls(),
        [["ps", "-a", "--format", "{{.Names}}\t{{.ID}}\t{{.State}}"]]
    );
    assert!(exec.recorded_calls().is_empty());
}

#[tokio::test]
async fn run_goes_through_exec_runner_and_returns_id() {
    let cmd = MockCommandRunner::ok();
    let exec = MockCommandRunner::new(|_| Ok(output(0, "f00dcafe\n", "")));
    let empty_hosts = BTreeMap::new();
    let empty_ports = BTreeMap::new();
    let empty_volumes = BTreeMap::new();
    let handle = split(&cmd, &exec)
        .run(&RunSpec {
            name: "a",
            image: "ubuntu:22.04",
            extra_hosts: &empty_hosts,
            ports: &empty_ports,
            environment: &[],
            volumes: &empty_volumes,
        })
        .await
        .expect("run should succeed");
    assert_eq!(handle.id, "f00dcafe");
    assert!(handle.running);
    assert!(cmd.recorded_calls().is_empty());
    assert_eq!(exec.recorded_calls()[0][0], "run");
}

#[tokio::test]
async fn failed_docker_command_carries_stderr() {
    let cmd = MockCommandRunner::new(|_| {
        Ok(output(1, "", "Error response from daemon: network nw-test not found\n"))
    });
    let err = split(&cmd, &MockCommandRunner::ok())
        .connect("nw-test", "a", Some("172.30.0.2"))
        .await
        .expect_err("connect should fail");
    let message = format!("{err:#}");
    assert!(message.contains("connecting a to nw-test"));
    assert!(message.contains("network nw-test not found"));
    assert_eq!(
        cmd.recorded_calls(),
        [["network", "connect", "--ip", "172.30.0.2", "nw-test", "a"]]
    );
}

#[tokio::test]
async fn environment_of_container_without_env_is_empty() {
    let cmd = MockCommandRunner::new(|_| Ok(output(0, "null\n", "")));
    let env = split(&cmd, &MockCommandRunner::ok())
        .environment("a")
        .await
        .expect("inspect should succeed");
    assert!(env.is_empty());
}

#[tokio::test]
async fn environment_is_parsed_from_json() {
    let cmd = MockCommandRunner::new(|_| {
        Ok(output(0, "[\"PATH=/usr/local/bin:/usr/bin\",\"HOME=/root\"]\n", ""))
    });
    let env = split(&cmd, &MockCommandRunner::ok())
        .environment("a")
        .await
        .expect("inspect should succeed");
    assert_eq!(env, ["PATH=/usr/local/bin:/usr/bin", "HOME=/root"]);
}

#[tokio::test]
async fn dangling_images_are_not_listed() {
    let cmd = MockCommandRunner::new(|_| {
        Ok(output(0, "sardines/repo:test\n<none>:<none>\nubuntu:22.04\n", ""))
    });
    let tags = split(&cmd, &MockCommandRunner::ok())
        .list_image_tags()
        .await
        .expect("images should succeed");
    assert_eq!(tags, ["sardines/repo:test", "ubuntu:22.04"]);
}

#[tokio::test]
async fn build_streams_dockerfile_on_stdin() {
    let exec = MockCommandRunner::ok();
    split(&MockCommandRunner::ok(), &exec)
        .build_image("sardines/base:test", b"FROM debian:bookworm\n")
        .await
        .expect("build should succeed");
    assert_eq!(exec.recorded_calls(), [["build", "-t", "sardines/base:test", "-"]]);
    assert_eq!(
        exec.stdin.lock().expect("mutex poisoned")[0],
        b"FROM debian:bookworm\n"
    );
}

#[tokio::test]
async fn exec_returns_output_even_on_nonzero_exit() {
    let exec = MockCommandRunner::new(|_| Ok(output(3, "partial\n", "boom\n")));
    let out = split(&MockCommandRunner::ok(), &exec)
        .exec("repo", &ExecRequest::new("false", "/"))
        .await
        .expect("exec itself should succeed");
    assert_eq!(out.status.code(), Some(3));
}

#[tokio::test]
async fn write_file_extracts_into_parent_then_fixes_ownership() {
    let exec = MockCommandRunner::ok();
    split(&MockCommandRunner::ok(), &exec)
        .write_file(
            "db",
            "/sardines/create_postgres_database.py",
            b"#!/usr/bin/env python3\n",
            &CopyOptions {
                owner: Some("postgres:postgres"),
                mode: Some("770"),
                ..CopyOptions::default()
            },
        )
        .await
        .expect("write should succeed");

    let calls = exec.recorded_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], ["cp", "-", "db:/sardines"]);
    assert_eq!(
        calls[1].last().map(String::as_str),
        Some("chown -R postgres:postgres /sardines/create_postgres_database.py")
    );
    assert_eq!(
        calls[2].last().map(String::as_str),
        Some("chmod -R 770 /sardines/create_postgres_database.py")
    );

    let archive = exec.stdin.lock().expect("mutex poisoned")[0].clone();
    let mut archive = tar::Archive::new(&archive[..]);
    let entry = archive
        .entries()
        .expect("archive entries")
        .next()
        .expect("one entry")
        .expect("valid entry");
    assert_eq!(
        entry.path().expect("entry path").to_string_lossy(),
        "create_postgres_database.py"
    );
}

#[tokio::test]
async fn copy_into_defaults_owner_to_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan = dir.path().join("deploy-repository-1.json");
    std::fs::write(&plan, "{}").expect("write plan");

    let exec = MockCommandRunner::ok();
    split(&MockCommandRunner::ok(), &exec)
        .copy_into(
            "repo",
            &plan,
            "/sardines/shoal/deploy-repository.json",
            &CopyOptions::default(),
        )
        .await
        .expect("copy should succeed");

    let calls = exec.recorded_calls();
    assert_eq!(calls[0], ["cp", "-", "repo:/sardines/shoal"]);
    assert_eq!(
        calls[1].last().map(String::as_str),
        Some("chown -R root:root /sardines/shoal/deploy-repository.json")
    );
    assert_eq!(calls.len(), 2);
}

#[tokio::test]
async fn failed_copy_is_an_error() {
    let exec = MockCommandRunner::new(|args| {
        if args[0] == "cp" {
            Ok(output(1, "", "Error: No such container: repo\n"))
        } else {
            Ok(output(0, "", ""))
        }
    });
    let err = split(&MockCommandRunner::ok(), &exec)
        .write_file("repo", "/tmp/x", b"x", &CopyOptions::default())
        .await
        .expect_err("copy should fail");
    assert!(format!("{err:#}").contains("No such container"));
    assert_eq!(exec.recorded_calls().len(), 1);
}

// ─── Streaming exec ──────────────────────────────────────────────────────────

async fn stream_script(script: &str) -> (Vec<String>, Result<i32>) {
    let cmd = MockCommandRunner::ok();
    let exec = MockCommandRunner::shell(script);
    let stream = split(&cmd, &exec)
        .exec_stream("nw-test-repo-1", &ExecRequest::new("npm test", "/srv"))
        .expect("spawn should succeed");
    let mut chunks = Vec::new();
    let code = RemoteOutput::Streamed(stream)
        .finish(|chunk| chunks.push(chunk.to_string()))
        .await;
    assert_eq!(exec.recorded_calls()[0][0], "exec");
    (chunks, code)
}

#[tokio::test]
async fn exec_stream_relays_stdout_and_stderr_then_exit_code() {
    let (chunks, code) = stream_script("echo out-1; echo err-1 >&2; echo out-2; exit 4").await;
    assert_eq!(code.expect("nonzero exit is not an error"), 4);
    let stdout: Vec<&str> = chunks
        .iter()
        .map(String::as_str)
        .filter(|c| c.starts_with("out"))
        .collect();
    assert_eq!(stdout, ["out-1\n", "out-2\n"]);
    assert!(chunks.iter().any(|c| c == "err-1\n"));
    assert_eq!(chunks.len(), 3);
}

#[tokio::test]
async fn exec_stream_survives_invalid_utf8() {
    let (chunks, code) = stream_script("printf 'ok\\n\\377\\nafter\\n'; exit 3").await;
    assert_eq!(code.expect("invalid bytes are not an error"), 3);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0], "ok\n");
    assert!(chunks[1].contains('\u{FFFD}'));
    assert_eq!(chunks[2], "after\n");
}

#[tokio::test]
async fn exec_stream_keeps_unterminated_last_line() {
    let (chunks, code) = stream_script("printf 'no newline'").await;
    assert_eq!(code.expect("exit 0"), 0);
    assert_eq!(chunks, ["no newline"]);
}

#[tokio::test]
async fn exec_stream_exit_code_drains_unread_output() {
    let cmd = MockCommandRunner::ok();
    let exec = MockCommandRunner::shell("seq 1 5000; exit 7");
    let stream = split(&cmd, &exec)
        .exec_stream("nw-test-repo-1", &ExecRequest::new("seq", "/"))
        .expect("spawn should succeed");
    assert_eq!(stream.exit_code().await.expect("exit code"), 7);
}
