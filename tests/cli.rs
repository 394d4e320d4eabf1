use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Offline invocation rooted in a throwaway data directory.
fn ledger(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("offline-ledger").unwrap();
    cmd.env("OFFLINE_LEDGER_HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("OFFLINE_LEDGER_API_KEY")
        .arg("--offline");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.arg("-o").arg("json").output().unwrap();
    assert!(output.status.success(), "command failed: {output:?}");
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_status_on_empty_ledger() {
    let home = TempDir::new().unwrap();
    let status = json_output(ledger(&home).arg("status"));

    assert_eq!(status["queue"]["queue_length"], 0);
    assert_eq!(status["queue"]["is_online"], false);
    assert_eq!(status["payments"]["total"], 0);
    assert_eq!(status["pending_conflicts"], 0);
    assert!(home.path().join("ledger.db").exists());
}

#[test]
fn test_enqueue_survives_between_runs() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args(["enqueue", "create-transaction", "--data", r#"{"amount": 42.5}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued Create Transaction"));

    ledger(&home)
        .args([
            "enqueue",
            "update-invoice",
            "--entity-id",
            "inv_7",
            "--data",
            r#"{"status": "paid"}"#,
        ])
        .assert()
        .success();

    let listed = json_output(ledger(&home).args(["queue", "list"]));
    assert_eq!(listed["count"], 2);
    assert_eq!(listed["items"][0]["action"], "CREATE_TRANSACTION");
    assert_eq!(listed["items"][1]["payload"]["entity_id"], "inv_7");

    let filtered = json_output(ledger(&home).args(["queue", "list", "--entity", "inv_7"]));
    assert_eq!(filtered["count"], 1);
}

#[test]
fn test_update_without_entity_id_fails() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args(["enqueue", "delete-transaction"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("--entity-id"));
}

#[test]
fn test_drain_offline_does_nothing() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args(["enqueue", "create-invoice"])
        .assert()
        .success();

    ledger(&home)
        .arg("drain")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to drain"));
}

#[test]
fn test_queue_clear_needs_force() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args(["enqueue", "create-invoice"])
        .assert()
        .success();

    ledger(&home)
        .args(["queue", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    ledger(&home)
        .args(["queue", "clear", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 pending mutations"));
}

#[test]
fn test_payment_capture_and_cancel() {
    let home = TempDir::new().unwrap();
    let payment = json_output(ledger(&home).args([
        "payment",
        "queue",
        "12.34",
        "eur",
        "Corner Bakery",
        "--method",
        "card",
    ]));
    assert_eq!(payment["amount"], 1234);
    assert_eq!(payment["currency"], "EUR");
    assert_eq!(payment["status"], "queued");
    let id = payment["id"].as_str().unwrap().to_string();

    ledger(&home)
        .args(["payment", "capture", &id, "--evidence", "receipt 17"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Captured 12.34 via card"));

    let cancelled = json_output(ledger(&home).args([
        "payment",
        "cancel",
        &id,
        "--reason",
        "customer requested",
    ]));
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancellation"]["reason"], "customer requested");

    ledger(&home)
        .args(["payment", "retry", &id])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already cancelled"));
}

#[test]
fn test_payment_list_and_analytics() {
    let home = TempDir::new().unwrap();
    for amount in ["10", "2.5"] {
        ledger(&home)
            .args(["payment", "queue", amount, "USD", "Supplier"])
            .assert()
            .success();
    }

    let listed = json_output(ledger(&home).args(["payment", "list", "--status", "queued"]));
    assert_eq!(listed["count"], 2);

    let analytics = json_output(ledger(&home).args(["payment", "analytics"]));
    assert_eq!(analytics["total"], 2);
    assert_eq!(analytics["unsynced_by_currency"]["USD"], 1250);
}

#[test]
fn test_payment_rejects_bad_amount() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args(["payment", "queue", "12.345", "USD", "Supplier"])
        .assert()
        .failure();
}

#[test]
fn test_unknown_dead_letter() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args([
            "dead-letter",
            "requeue",
            "0190a5e4-0000-7000-8000-000000000000",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_conflicts_empty() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args(["conflicts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No conflicts recorded"));

    let purged = json_output(ledger(&home).args(["conflicts", "purge", "--older-than-days", "0"]));
    assert_eq!(purged["purged"], 0);
}

#[test]
fn test_completions() {
    let home = TempDir::new().unwrap();
    ledger(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("offline-ledger"));
}
