//! Integration tests for the helpdesk CLI
//!
//! These tests drive the binary end-to-end against a temporary database,
//! from user registration through ticket resolution and evaluation.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to run helpdesk with a specific database path
fn run_helpdesk(args: &[&str], db_path: &PathBuf) -> std::process::Output {
    let workdir = db_path.parent().unwrap_or_else(|| Path::new("."));
    Command::new(env!("CARGO_BIN_EXE_helpdesk"))
        .args(args)
        .current_dir(workdir)
        .env("HELPDESK_DB_PATH", db_path)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute helpdesk")
}

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn run_ok(args: &[&str], db_path: &PathBuf) -> String {
    let output = run_helpdesk(args, db_path);
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        stderr(&output)
    );
    stdout(&output)
}

fn run_json(args: &[&str], db_path: &PathBuf) -> serde_json::Value {
    let mut with_json = args.to_vec();
    with_json.push("--json");
    let out = run_ok(&with_json, db_path);
    serde_json::from_str(&out).unwrap_or_else(|e| panic!("bad JSON from {:?}: {}\n{}", args, e, out))
}

/// Finance department, one hardware skill, Ana (requester, id 1),
/// Bruno (hardware technician, id 2) and a CRITICAL SLA for Hardware.
fn seeded() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("helpdesk.db");

    run_ok(&["department", "add", "Finance"], &db_path);
    run_ok(&["skill", "add", "Hardware Repair"], &db_path);
    run_ok(
        &[
            "user", "register", "Ana", "ana@example.com", "--type", "regular",
            "--department", "Finance", "--password", "ana-pw",
        ],
        &db_path,
    );
    run_ok(
        &[
            "user", "register", "Bruno", "bruno@example.com", "--type", "technician",
            "--password", "bruno-pw", "--skill", "1",
        ],
        &db_path,
    );
    run_ok(&["sla", "set", "Hardware", "critical", "4"], &db_path);

    (temp_dir, db_path)
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_helpdesk"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("helpdesk"));
    assert!(out.contains("ticket"));
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_helpdesk"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("helpdesk"));
}

// =============================================================================
// Shell Completion Tests
// =============================================================================

#[test]
fn test_completion_zsh() {
    let output = Command::new(env!("CARGO_BIN_EXE_helpdesk"))
        .args(["completion", "zsh"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success(), "completion zsh failed: {}", stderr(&output));
    assert!(stdout(&output).contains("#compdef helpdesk"));
}

#[test]
fn test_completion_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_helpdesk"))
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success(), "completion bash failed: {}", stderr(&output));
    assert!(stdout(&output).contains("_helpdesk"));
}

#[test]
fn test_completion_fish() {
    let output = Command::new(env!("CARGO_BIN_EXE_helpdesk"))
        .args(["completion", "fish"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success(), "completion fish failed: {}", stderr(&output));
    assert!(stdout(&output).contains("complete -c helpdesk"));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_malformed_config_fails_loudly() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".helpdesk");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[triage\nsuggestion_limit = = 5\n").unwrap();
    let db_path = temp_dir.path().join("helpdesk.db");

    let output = run_helpdesk(&["sla", "list"], &db_path);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Error:"), "got: {}", err);
    assert!(err.contains("config.toml"), "got: {}", err);
}

// =============================================================================
// Reference Data and Users
// =============================================================================

#[test]
fn test_departments_and_skills_are_listed_by_name() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("helpdesk.db");

    run_ok(&["department", "add", "Sales"], &db_path);
    run_ok(&["department", "add", "Finance", "-d", "Accounts payable"], &db_path);
    run_ok(&["skill", "add", "Networking"], &db_path);

    let out = run_ok(&["department", "list"], &db_path);
    let finance = out.find("Finance").expect("Finance listed");
    let sales = out.find("Sales").expect("Sales listed");
    assert!(finance < sales, "departments should be sorted: {}", out);

    let skills = run_json(&["skill", "list"], &db_path);
    assert_eq!(skills[0]["name"], "Networking");
}

#[test]
fn test_duplicate_department_fails() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("helpdesk.db");

    run_ok(&["department", "add", "Sales"], &db_path);
    let output = run_helpdesk(&["department", "add", "Sales"], &db_path);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("already exists"));
}

#[test]
fn test_register_and_login() {
    let (_dir, db_path) = seeded();

    let out = run_ok(
        &["user", "login", "1", "--type", "regular", "--department", "Finance", "--password", "ana-pw"],
        &db_path,
    );
    assert!(out.contains("Ana"));

    let user = run_json(&["user", "show", "2"], &db_path);
    assert_eq!(user["user"]["user_type"], "TECHNICIAN");
    assert_eq!(user["skills"][0]["name"], "Hardware Repair");
}

#[test]
fn test_login_with_wrong_password_fails() {
    let (_dir, db_path) = seeded();

    let output = run_helpdesk(
        &["user", "login", "1", "--type", "regular", "--department", "Finance", "--password", "nope"],
        &db_path,
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid credentials"));
}

#[test]
fn test_register_rejects_bad_email() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("helpdesk.db");

    let output = run_helpdesk(
        &["user", "register", "Zé", "not-an-email", "--type", "manager", "--password", "pw"],
        &db_path,
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error:"));
}

// =============================================================================
// SLA Table
// =============================================================================

#[test]
fn test_sla_set_replaces_and_lists() {
    let (_dir, db_path) = seeded();

    run_ok(&["sla", "set", "Hardware", "critical", "2"], &db_path);
    run_ok(&["sla", "set", "Network", "high", "8"], &db_path);

    let entries = run_json(&["sla", "list"], &db_path);
    let entries = entries.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["category"], "Hardware");
    assert_eq!(entries[0]["max_resolution_hours"], 2);

    let categories = run_json(&["sla", "categories"], &db_path);
    assert_eq!(categories, serde_json::json!(["Hardware", "Network"]));

    run_ok(&["sla", "delete", "Network", "high"], &db_path);
    let categories = run_json(&["sla", "categories"], &db_path);
    assert_eq!(categories, serde_json::json!(["Hardware"]));
}

// =============================================================================
// Ticket Workflow
// =============================================================================

#[test]
fn test_full_ticket_workflow() {
    let (_dir, db_path) = seeded();

    run_ok(
        &[
            "kb", "add", "--category", "Hardware", "--title", "Printer jam",
            "--description", "Printer reports paper jam", "--solution", "Open tray B and remove paper",
        ],
        &db_path,
    );

    let opened = run_json(
        &["ticket", "open", "Printer shows paper jam", "--category", "Hardware", "--as", "1"],
        &db_path,
    );
    let id = opened["ticket_id"].as_i64().expect("ticket id").to_string();

    let ticket = run_json(&["ticket", "show", &id], &db_path);
    assert_eq!(ticket["ticket"]["urgency"], "CRITICAL");
    assert_eq!(ticket["ticket"]["status"], "OPEN");
    assert_eq!(ticket["ticket"]["solution"], "Open tray B and remove paper");

    let assignment = run_json(&["ticket", "assign", &id, "--as", "1"], &db_path);
    assert_eq!(assignment["technician"]["name"], "Bruno");

    let notes = run_ok(&["notifications", "--as", "2"], &db_path);
    assert!(notes.contains("assigned to you"), "got: {}", notes);
    let again = run_ok(&["notifications", "--as", "2"], &db_path);
    assert!(again.contains("No new notifications"));

    let assigned = run_json(&["ticket", "assigned", "--as", "2"], &db_path);
    assert_eq!(assigned.as_array().map(Vec::len), Some(1));

    run_ok(&["ticket", "log-time", &id, "--minutes", "10", "--activity", "Diagnosis", "--as", "2"], &db_path);
    let logged = run_json(&["ticket", "log-time", &id, "--minutes", "5", "--activity", "Fix", "--as", "2"], &db_path);
    assert!(logged["time_log_id"].is_i64());
    assert_eq!(logged["total_minutes"], 15.0);

    let updated = run_json(
        &["ticket", "update", &id, "--status", "resolved", "--solution", "Replaced roller", "--as", "2"],
        &db_path,
    );
    assert_eq!(updated["status"], "RESOLVED");
    assert_eq!(updated["total_attendance_minutes"], 15.0);
    assert!(updated["closed_at"].is_string());

    let evaluated = run_json(&["ticket", "evaluate", &id, "--score", "9", "--comment", "Fast", "--as", "1"], &db_path);
    assert!(evaluated["evaluation_id"].is_i64());

    let snapshot = run_json(&["ticket", "show", &id], &db_path);
    assert_eq!(snapshot["evaluation"]["score"], 9);
    assert_eq!(snapshot["time_logs"].as_array().map(Vec::len), Some(2));
    assert!(snapshot["history"].as_array().map_or(0, Vec::len) >= 3);

    let summary = run_json(&["report", "summary"], &db_path);
    assert_eq!(summary["resolved"], 1);
}

#[test]
fn test_open_without_actor_fails() {
    let (_dir, db_path) = seeded();

    let output = run_helpdesk(&["ticket", "open", "Broken mouse", "--category", "Hardware"], &db_path);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--as"));
}

#[test]
fn test_invalid_transition_fails() {
    let (_dir, db_path) = seeded();

    let opened = run_json(&["ticket", "open", "Monitor flickers", "--category", "Hardware", "--as", "1"], &db_path);
    let id = opened["ticket_id"].as_i64().expect("ticket id").to_string();

    run_ok(&["ticket", "update", &id, "--status", "closed", "--as", "2"], &db_path);
    let output = run_helpdesk(&["ticket", "update", &id, "--status", "open", "--as", "2"], &db_path);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn test_evaluate_rejects_out_of_range_score() {
    let (_dir, db_path) = seeded();

    let opened = run_json(&["ticket", "open", "Keyboard dead", "--category", "Hardware", "--as", "1"], &db_path);
    let id = opened["ticket_id"].as_i64().expect("ticket id").to_string();
    run_ok(&["ticket", "update", &id, "--status", "resolved", "--as", "2"], &db_path);

    let output = run_helpdesk(&["ticket", "evaluate", &id, "--score", "11", "--as", "1"], &db_path);
    assert_eq!(output.status.code(), Some(1));

    let output = run_helpdesk(&["ticket", "evaluate", &id, "--score", "-1", "--as", "1"], &db_path);
    assert_eq!(output.status.code(), Some(1));

    let snapshot = run_json(&["ticket", "show", &id], &db_path);
    assert!(snapshot["evaluation"].is_null());
}

#[test]
fn test_show_unknown_ticket_fails() {
    let (_dir, db_path) = seeded();

    let output = run_helpdesk(&["ticket", "show", "999"], &db_path);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not found"));
}

// =============================================================================
// Knowledge Base and Reports
// =============================================================================

#[test]
fn test_suggest_matches_keywords() {
    let (_dir, db_path) = seeded();

    run_ok(
        &[
            "kb", "add", "-c", "Network", "-t", "VPN drops", "-d", "VPN connection drops every hour",
            "-s", "Renew the client certificate",
        ],
        &db_path,
    );

    let suggestions = run_json(&["suggest", "my vpn keeps failing", "--category", "Network"], &db_path);
    assert_eq!(suggestions[0]["title"], "VPN drops");

    let none = run_json(&["suggest", "my vpn keeps failing", "--category", "Hardware"], &db_path);
    assert_eq!(none, serde_json::json!([]));
}

#[test]
fn test_critical_report_lists_open_tickets() {
    let (_dir, db_path) = seeded();

    run_ok(&["ticket", "open", "Server room smoke", "--category", "Hardware", "--as", "1"], &db_path);

    let lines = run_json(&["report", "critical"], &db_path);
    assert_eq!(lines[0]["requester_name"], "Ana");
    assert_eq!(lines[0]["ticket"]["urgency"], "CRITICAL");
}
