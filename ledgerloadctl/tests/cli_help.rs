use assert_cmd::cargo::cargo_bin_cmd;

#[test]
fn top_level_help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("ledgerloadctl");
    let output = cmd
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("run"), "help missing 'run'");
    assert!(text.contains("plan"), "help missing 'plan'");
}

#[test]
fn run_help_documents_scheduler_flags() {
    let mut cmd = cargo_bin_cmd!("ledgerloadctl");
    let output = cmd
        .arg("run")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    for flag in [
        "--ledger",
        "--threads",
        "--inbox-capacity",
        "--immediate",
        "--metadata-clean",
        "--switch",
        "--report",
    ] {
        assert!(text.contains(flag), "run help missing {flag}");
    }
}

#[test]
fn run_requires_a_ledger() {
    let mut cmd = cargo_bin_cmd!("ledgerloadctl");
    cmd.env_remove("LEDGERLOAD_LEDGER")
        .arg("run")
        .assert()
        .failure();
}
