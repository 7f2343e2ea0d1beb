//! Integration tests for tgcf-admin

use assert_cmd::Command;
use libtgcf::store::{CounterStore, HistoryStore, StateStore};
use libtgcf::Database;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Create a config with two random sources; returns (dir, config path, db path)
fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("data").join("tgcf.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[live]
random_enabled = true
random_total_limit = 10
random_active_sources = [-1001, -1002]

[[forwards]]
source = -1001
dests = [-2001, -2002]

[[forwards]]
source = -1002
dests = [-2003]
"#,
        escape_path_for_toml(&db_path.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (
        temp_dir,
        config_path.to_string_lossy().to_string(),
        db_path.to_string_lossy().to_string(),
    )
}

/// Record three posts for -1001 and one for -1002
async fn seed_state(db_path: &str) {
    let db = Database::new(db_path).await.unwrap();
    let history = HistoryStore::new(db.clone(), 500);
    let counter = CounterStore::new(db.clone());
    let state = StateStore::new(db.clone());

    for id in [11, 12, 13] {
        history.record(-1001, id).await.unwrap();
        state.bump(-1001, chrono::Utc::now().timestamp()).await.unwrap();
    }
    counter.increment(-1001, 3).await.unwrap();

    history.record(-1002, 21).await.unwrap();
    state.bump(-1002, chrono::Utc::now().timestamp()).await.unwrap();
    counter.increment(-1002, 1).await.unwrap();

    db.close().await;
}

fn admin_cmd(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("tgcf-admin").unwrap();
    cmd.env("TGCF_CONFIG", config_path)
        .env_remove("TGCF_DB_PATH")
        .env_remove("RUST_LOG");
    cmd
}

async fn status_json(config_path: &str) -> serde_json::Value {
    let output = admin_cmd(config_path)
        .arg("status")
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[tokio::test]
async fn test_status_json() {
    let (_temp_dir, config_path, db_path) = setup_test_env();
    seed_state(&db_path).await;

    let json = status_json(&config_path).await;
    let sources = json.as_array().unwrap();
    assert_eq!(sources.len(), 2);

    assert_eq!(sources[0]["source"], -1001);
    assert_eq!(sources[0]["count"], 3);
    assert_eq!(sources[0]["limit"], 10);
    assert_eq!(sources[0]["remaining"], 7);
    assert_eq!(sources[0]["history_len"], 3);
    assert_eq!(sources[0]["total_sent"], 3);
    assert_eq!(sources[0]["destinations"], serde_json::json!([-2001, -2002]));

    assert_eq!(sources[1]["source"], -1002);
    assert_eq!(sources[1]["count"], 1);
}

#[tokio::test]
async fn test_status_text() {
    let (_temp_dir, config_path, db_path) = setup_test_env();
    seed_state(&db_path).await;

    admin_cmd(&config_path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("-1001 | 3/10 today (7 left) | history 3/500 | 3 total"))
        .stdout(predicate::str::contains("-1002 | 1/10 today (9 left)"))
        .stdout(predicate::str::contains("ago"));
}

#[test]
fn test_status_on_empty_database() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    admin_cmd(&config_path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("-1001 | 0/10 today (10 left) | history 0/500 | 0 total | last post never"));
}

#[test]
fn test_status_invalid_format() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    admin_cmd(&config_path)
        .arg("status")
        .arg("--format")
        .arg("xml")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Invalid format 'xml'"));
}

#[tokio::test]
async fn test_reset_all_counters() {
    let (_temp_dir, config_path, db_path) = setup_test_env();
    seed_state(&db_path).await;

    admin_cmd(&config_path)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset 2 daily counters"));

    let json = status_json(&config_path).await;
    for source in json.as_array().unwrap() {
        assert_eq!(source["count"], 0);
        assert_eq!(source["remaining"], 10);
    }

    // History and totals survive a counter reset
    assert_eq!(json[0]["history_len"], 3);
    assert_eq!(json[0]["total_sent"], 3);
}

#[tokio::test]
async fn test_reset_single_source() {
    let (_temp_dir, config_path, db_path) = setup_test_env();
    seed_state(&db_path).await;

    admin_cmd(&config_path)
        .args(["reset", "--source", "-1001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset daily counter for source -1001"));

    let json = status_json(&config_path).await;
    assert_eq!(json[0]["count"], 0);
    assert_eq!(json[1]["count"], 1);
}

#[tokio::test]
async fn test_forget_history() {
    let (_temp_dir, config_path, db_path) = setup_test_env();
    seed_state(&db_path).await;

    admin_cmd(&config_path)
        .args(["forget", "-1001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Forgot 3 posted messages for source -1001"));

    let json = status_json(&config_path).await;
    assert_eq!(json[0]["history_len"], 0);
    assert_eq!(json[0]["total_sent"], 3);
    assert_eq!(json[1]["history_len"], 1);
}

#[tokio::test]
async fn test_forget_with_totals() {
    let (_temp_dir, config_path, db_path) = setup_test_env();
    seed_state(&db_path).await;

    admin_cmd(&config_path)
        .args(["forget", "-1002", "--totals"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Forgot 1 posted message for source -1002"))
        .stdout(predicate::str::contains("Dropped lifetime totals for source -1002"));

    let json = status_json(&config_path).await;
    assert_eq!(json[1]["total_sent"], 0);
    assert!(json[1]["last_posted_at"].is_null());
}

#[test]
fn test_check_lists_sources() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    admin_cmd(&config_path)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK (random posting enabled)"))
        .stdout(predicate::str::contains("-1001 -> -2001, -2002 (no history export)"))
        .stdout(predicate::str::contains("-1002 -> -2003"));
}

#[test]
fn test_check_reports_skipped_sources() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[database]
path = "/nonexistent/tgcf.db"

[live]
random_active_sources = [-1001, -1009]

[[forwards]]
source = -1001
dests = [-2001]
"#,
    )
    .unwrap();

    admin_cmd(config_path.to_str().unwrap())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("random posting disabled"))
        .stdout(predicate::str::contains("1 active source skipped"));
}

#[test]
fn test_check_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[database]\npath = \"/tmp/tgcf.db\"\n\n[live]\nrandom_count = 0\n",
    )
    .unwrap();

    admin_cmd(config_path.to_str().unwrap())
        .arg("check")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("live.random_count"));
}
