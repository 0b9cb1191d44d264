use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};

const ACTOR: &str = "0190a1b2-0000-7000-8000-000000000001";
const CONTAINER: &str = "0190a1b2-0000-7000-8000-000000000002";

fn record(seq: u64, key: &str, operation: &str) -> Value {
    json!({
        "sequence_id": seq,
        "logical_key": key,
        "operation": operation,
        "actor_id": ACTOR,
        "container_id": CONTAINER,
        "metadata": {"dc.title": [format!("{key} v{seq}")]},
    })
}

fn write_ledger(dir: &Path, records: Vec<Value>) -> std::path::PathBuf {
    let ledger = json!({
        "actors": [{"id": ACTOR, "email": "batchjob@example.org"}],
        "containers": [CONTAINER],
        "records": records,
    });
    let path = dir.join("ledger.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&ledger).unwrap()).unwrap();
    path
}

fn ledgerloadctl(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ledgerloadctl");
    cmd.current_dir(dir)
        .env_remove("LEDGERLOAD_CONFIG_PATH")
        .env_remove("LEDGERLOAD_CONFIG_JSON")
        .env_remove("LEDGERLOAD_THREADS")
        .env_remove("LEDGERLOAD_LEDGER")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn run_applies_every_record_across_workers() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = write_ledger(
        dir.path(),
        vec![
            record(1, "rec-42", "add"),
            record(2, "rec-7", "add"),
            record(3, "rec-42", "update"),
            record(4, "rec-9", "add"),
            record(5, "rec-42", "update"),
        ],
    );
    let report = dir.path().join("out").join("report.json");

    ledgerloadctl(dir.path())
        .arg("run")
        .arg("--ledger")
        .arg(&ledger)
        .args(["--threads", "3", "--no-notify"])
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows done 5 on a total of 5"))
        .stdout(predicate::str::contains("Rows discarded 0 on a total of 5"));

    let parsed: Value = serde_json::from_slice(&std::fs::read(&report).unwrap()).unwrap();
    assert_eq!(parsed["processed"], 5);
    assert_eq!(parsed["worker_count"], 3);
    assert_eq!(parsed["terminated_workers"], json!([]));
}

#[test]
fn rejected_records_are_counted_as_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = write_ledger(
        dir.path(),
        vec![
            record(1, "rec-1", "add"),
            record(2, "rec-2", "delete"),
        ],
    );

    ledgerloadctl(dir.path())
        .arg("run")
        .arg("--ledger")
        .arg(&ledger)
        .args(["--threads", "1", "--no-notify", "--silent"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows done 1 on a total of 2"))
        .stdout(predicate::str::contains("Rows discarded 1 on a total of 2"));
}

#[test]
fn unknown_batch_user_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = write_ledger(dir.path(), vec![record(1, "rec-1", "add")]);

    ledgerloadctl(dir.path())
        .arg("run")
        .arg("--ledger")
        .arg(&ledger)
        .args(["--batch-user", "nobody@example.org", "--no-notify"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nobody@example.org"));
}

#[test]
fn config_file_in_working_directory_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("ledgerload.toml"),
        "[scheduler]\nworker_count = 5\nshutdown_policy = \"immediate\"\n",
    )
    .unwrap();
    let ledger = write_ledger(dir.path(), vec![record(1, "rec-1", "add")]);

    ledgerloadctl(dir.path())
        .arg("run")
        .arg("--ledger")
        .arg(&ledger)
        .arg("--print-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("worker_count = 5"))
        .stdout(predicate::str::contains("shutdown_policy = \"immediate\""));
}

#[test]
fn plan_pins_repeated_keys_to_one_worker() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = write_ledger(
        dir.path(),
        vec![
            record(1, "rec-42", "add"),
            record(2, "rec-7", "add"),
            record(3, "rec-42", "update"),
            record(4, "rec-9", "add"),
        ],
    );

    let output = ledgerloadctl(dir.path())
        .arg("plan")
        .arg("--ledger")
        .arg(&ledger)
        .args(["--threads", "2", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let routes: Vec<Value> = serde_json::from_slice(&output).unwrap();
    assert_eq!(routes.len(), 4);
    let workers: Vec<u64> = routes
        .iter()
        .map(|route| route["assignment"]["worker"].as_u64().unwrap())
        .collect();
    assert_eq!(workers, vec![0, 1, 0, 0]);
    assert_eq!(routes[0]["assignment"]["kind"], "pinned");
    assert_eq!(routes[2]["assignment"]["kind"], "sticky");
}
