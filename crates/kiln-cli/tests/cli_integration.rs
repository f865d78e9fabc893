//! Integration tests for the `kiln` binary
//!
//! Each test runs the built binary from an empty temporary directory with
//! `HOME` and `XDG_CONFIG_HOME` pointed inside it, so no user or project
//! configuration leaks in.

#![cfg(unix)]

use std::process::{Command, Output};

use tempfile::TempDir;

fn kiln(dir: &TempDir, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_kiln"));
    command
        .args(args)
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("config"))
        .env_remove("RUST_LOG");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().expect("failed to run kiln")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_run_streams_output_and_exit_code() {
    let dir = TempDir::new().unwrap();
    let output = kiln(
        &dir,
        &["run", "--", "/bin/sh", "-c", "printf hi; printf there >&2; exit 4"],
        &[],
    );

    assert_eq!(stdout(&output), "hithere");
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_run_json_reports_result() {
    let dir = TempDir::new().unwrap();
    let output = kiln(&dir, &["run", "--json", "--", "/bin/sh", "-c", "true"], &[]);

    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(result["status"], "succeeded");
    assert_eq!(result["exit_code"], 0);
    assert!(result["pid"].is_u64());
}

#[test]
fn test_run_with_release_handshake() {
    let dir = TempDir::new().unwrap();
    let script = "printf 'llbuild.1\\n%s\\n' \"$LLBUILD_TASK_ID\" > /dev/fd/$LLBUILD_CONTROL_FD; \
                  sleep 0.1; printf done";
    let output = kiln(&dir, &["run", "--handle", "255", "--", "/bin/sh", "-c", script], &[]);

    assert_eq!(stdout(&output), "done");
    assert!(stderr(&output).contains("released"), "stderr: {}", stderr(&output));
    assert!(output.status.success());
}

#[test]
fn test_run_env_and_clean_env() {
    let dir = TempDir::new().unwrap();
    let output = kiln(
        &dir,
        &[
            "run",
            "--clean-env",
            "--env",
            "GREETING=hello",
            "--",
            "/bin/sh",
            "-c",
            "printf %s \"$GREETING:${HOME:-none}\"",
        ],
        &[],
    );

    assert_eq!(stdout(&output), "hello:none");
}

#[test]
fn test_capture_prints_output_and_summary() {
    let dir = TempDir::new().unwrap();
    let output = kiln(&dir, &["capture", "--", "/bin/sh", "-c", "printf captured"], &[]);

    assert_eq!(stdout(&output), "captured");
    assert!(stderr(&output).contains("8 bytes, succeeded"));
    assert!(output.status.success());
}

#[test]
fn test_config_reflects_environment() {
    let dir = TempDir::new().unwrap();
    let output = kiln(
        &dir,
        &["config"],
        &[("KILN_ENGINE__CONTROL_MESSAGE_LIMIT", "40")],
    );

    assert!(output.status.success());
    assert!(stdout(&output).contains("control_message_limit = 40"));
}

#[test]
fn test_project_config_file_is_read() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("kiln.toml"),
        "[engine]\ndefault_quality_of_service = \"background\"\n",
    )
    .unwrap();

    let output = kiln(&dir, &["config"], &[]);
    assert!(stdout(&output).contains("default_quality_of_service = \"background\""));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = kiln(&dir, &["--config", "missing.toml", "config"], &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Configuration error"));
}
