use assert_fs::{fixture::PathChild, TempDir};
use predicates::prelude::*;
use std::process::{Command, Output};

mod common;

use common::{assert_contains_all, graph_event, mount_calendar, TestEnvironment};
use wiremock::MockServer;

/// Integration tests for daybook CLI commands
/// These tests run the actual binary and verify its behavior

fn daybook(config: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_daybook"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute daybook")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_daybook"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_contains_all(&stdout(&output), &["start", "stop", "status", "outlook"]);
}

#[test]
fn test_start_status_stop() {
    let env = TestEnvironment::new();
    let config = env.write_config(&env.config(None));

    let output = daybook(&config, &["start", "Deep work", "--task", "Parser", "--tags", "focus, rust"]);
    assert!(output.status.success(), "start failed: {:?}", output);
    assert!(predicate::str::contains("Started timer for \"Deep work\"").eval(&stdout(&output)));

    let output = daybook(&config, &["status"]);
    assert!(output.status.success());
    assert_contains_all(&stdout(&output), &["Tracking \"Deep work\"", "Task: Parser"]);

    let output = daybook(&config, &["stop", "--comment", "done"]);
    assert!(output.status.success(), "stop failed: {:?}", output);
    assert!(predicate::str::contains("Stopped timer for \"Deep work\"").eval(&stdout(&output)));

    let output = daybook(&config, &["status"]);
    assert!(predicate::str::contains("No active timer").eval(&stdout(&output)));
}

#[test]
fn test_start_replaces_running_timer() {
    let env = TestEnvironment::new();
    let config = env.write_config(&env.config(None));

    assert!(daybook(&config, &["start", "First"]).status.success());
    let output = daybook(&config, &["start", "Second"]);
    assert!(output.status.success());
    assert_contains_all(
        &stdout(&output),
        &["Stopped running timer for \"First\"", "Started timer for \"Second\""],
    );
}

#[test]
fn test_stop_without_timer_fails() {
    let env = TestEnvironment::new();
    let config = env.write_config(&env.config(None));

    let output = daybook(&config, &["stop"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(predicate::str::contains("No active timer to stop").eval(&stderr));
}

#[test]
fn test_sync_to_without_from_is_rejected() {
    let env = TestEnvironment::new();
    let config = env.write_config(&env.config(None));

    let output = daybook(&config, &["outlook", "sync", "--to", "2026-02-27"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--from is required"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.child("nope").child("config.yml");

    let output = daybook(missing.path(), &["status"]);
    assert!(!output.status.success());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_outlook_sync_imports_and_reports() {
    let server = MockServer::start().await;
    let env = TestEnvironment::new();
    let settings = env.config(Some(&server));
    env.save_valid_token(&settings);
    let config = env.write_config(&settings);

    mount_calendar(
        &server,
        vec![graph_event(
            "ext-42",
            "Architecture Board",
            "2026-02-27T09:00:00.0000000",
            "2026-02-27T10:30:00.0000000",
        )],
    )
    .await;

    let output = daybook(&config, &["outlook", "sync", "--date", "2026-02-27"]);
    assert!(output.status.success(), "sync failed: {:?}", output);
    assert_contains_all(
        &stdout(&output),
        &["Imported: Architecture Board (1h 30m)", "1 imported", "0 skipped"],
    );
    assert!(env.data_dir.join("2026/02/27.json").exists());

    let output = daybook(&config, &["outlook", "sync", "--date", "2026-02-27", "--dry-run"]);
    assert!(output.status.success());
    assert_contains_all(&stdout(&output), &["1 skipped", "Dry run"]);
}
