#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn cli(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("boarding-mock").expect("binary built");
    cmd.env("RUST_LOG", "off").arg("--data-dir").arg(data_dir.path());
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn request_prints_the_response() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = cli(&dir).args(["request", "GET", "/api/kennels"]).output()?;
    assert!(output.status.success());
    let response = stdout_json(&output);
    assert_eq!(response["status"], 200);
    assert!(response["data"].as_array().is_some_and(|items| !items.is_empty()));
    Ok(())
}

#[test]
fn error_statuses_exit_non_zero() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = cli(&dir)
        .args(["request", "GET", "/kennels/no-such-kennel"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["status"], 404);

    cli(&dir).args(["request", "FETCH", "/kennels"]).assert().failure();
    Ok(())
}

#[test]
fn mutations_persist_until_a_new_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let created = cli(&dir)
        .args([
            "request",
            "POST",
            "/services",
            "--body",
            r#"{"name":"Nail trim","priceCents":1500}"#,
        ])
        .output()?;
    assert!(created.status.success());
    let created = stdout_json(&created);
    assert_eq!(created["status"], 201);
    let id = created["data"]["id"].as_str().expect("id").to_string();
    let path = format!("/services/{id}");

    let fetched = cli(&dir).args(["request", "GET", path.as_str()]).output()?;
    assert!(fetched.status.success());
    assert_eq!(stdout_json(&fetched)["data"]["name"], "Nail trim");

    cli(&dir)
        .args(["--new-session", "request", "GET", path.as_str()])
        .assert()
        .code(1);
    Ok(())
}

#[test]
fn reset_discards_mutations() -> Result<()> {
    let dir = tempfile::tempdir()?;
    cli(&dir)
        .args(["request", "DELETE", "/kennels/ken-1"])
        .assert()
        .success();
    let output = cli(&dir).arg("reset").output()?;
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["reset"], true);
    cli(&dir)
        .args(["request", "GET", "/kennels/ken-1"])
        .assert()
        .success();
    Ok(())
}

#[test]
fn routes_lists_keyword_routes_first() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = cli(&dir).arg("routes").output()?;
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout)?;
    let keyword = text.find("/kennels/availability").expect("keyword route listed");
    let general = text.find("^/kennels(").expect("general route listed");
    assert!(keyword < general);
    assert!(text.contains("checkin"));
    Ok(())
}
