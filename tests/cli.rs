use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn remedy_queue() -> Command {
    let mut cmd = Command::cargo_bin("remedy-queue").unwrap();
    for var in [
        "REMEDY_QUEUE_LOG_LEVEL",
        "REMEDY_QUEUE_LOG_FORMAT",
        "REMEDY_QUEUE_METRICS_ENABLED",
        "REMEDY_QUEUE_METRICS_PORT",
        "REMEDY_QUEUE_SERVER_PORT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

const VALID: &str = r#"
[logging]
level = "warn"

[[remedies]]
name = "github-queue"

[remedies.strategy_based_queue]
allowed_request_count = 2
window_size_in_seconds = 1
ttl_seconds = 0
response_status_code = 503

[remedies.strategy_based_queue.prioritization.group_by]
header_name = "X-Group"

[remedies.strategy_based_queue.prioritization.groups.production]
priority = 1
"#;

#[test]
fn test_cli_version() {
    remedy_queue()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("remedy-queue 0.1.0"));
}

#[test]
fn test_cli_help() {
    remedy_queue()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Strategy-based admission queues with Prometheus metrics",
        ));
}

#[test]
fn test_check_config_valid() {
    let file = config_file(VALID);
    remedy_queue()
        .arg("--config")
        .arg(file.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"))
        .stdout(predicate::str::contains("github-queue"))
        .stdout(predicate::str::contains("X-Group"));
}

#[test]
fn test_check_config_rejects_zero_quota() {
    let file = config_file(
        r#"
[[remedies]]
name = "broken"

[remedies.strategy_based_queue]
allowed_request_count = 0
window_size_in_seconds = 1
ttl_seconds = 1
"#,
    );
    remedy_queue()
        .arg("--config")
        .arg(file.path())
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("allowed_request_count"));
}

#[test]
fn test_simulate_burst() {
    let file = config_file(VALID);
    remedy_queue()
        .arg("--config")
        .arg(file.path())
        .args(["simulate", "--remedy", "github-queue", "--requests", "5", "--group", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"requests\": 5"))
        .stdout(predicate::str::contains("remedy_queue_requests_total"))
        .stdout(predicate::str::contains("priority=\"1\""));
}

#[test]
fn test_simulate_unknown_remedy() {
    let file = config_file(VALID);
    remedy_queue()
        .arg("--config")
        .arg(file.path())
        .args(["simulate", "--remedy", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}
