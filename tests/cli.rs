use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("jss-client");
    Command::new(path)
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json output")
}

fn write_script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

struct Layout {
    config_path: PathBuf,
    agent: PathBuf,
    helper: PathBuf,
    receipts: PathBuf,
    prefs: PathBuf,
}

fn write_config(root: &Path) -> Layout {
    let layout = Layout {
        config_path: root.join("config.yaml"),
        agent: root.join("jamf/bin/jamf"),
        helper: root.join("helper/jamfHelper"),
        receipts: root.join("Receipts"),
        prefs: root.join("prefs.plist"),
    };
    fs::write(
        &layout.config_path,
        format!(
            "version: 1\npaths:\n  agent_binaries:\n    - {}\n  helper_binary: {}\n  receipts_dir: {}\n  preferences_plist: {}\nprobe:\n  console_user_command: \"printf '<dictionary> {{\\\\n  Name : carol\\\\n}}\\\\n'\"\n",
            layout.agent.display(),
            layout.helper.display(),
            layout.receipts.display(),
            layout.prefs.display(),
        ),
    )
    .unwrap();
    layout
}

#[test]
fn paths_reports_configured_locations() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("paths")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["ok"], true);
    assert_eq!(value["result"]["config_exists"], true);
    assert_eq!(
        value["result"]["helper_binary"],
        layout.helper.to_string_lossy().as_ref()
    );
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "version: 1\nunknown: 3\n").unwrap();
    bin()
        .arg("--config")
        .arg(&config_path)
        .arg("paths")
        .assert()
        .failure()
        .stderr(contains("yaml error"));
}

#[test]
fn missing_agent_is_structured_error() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("version")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["ok"], false);
    assert_eq!(value["error_code"], "agent_not_installed");
}

#[test]
fn version_and_availability_use_agent_output() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    write_script(
        &layout.agent,
        "case \"$1\" in\n  version) echo version=10.50.0 ;;\n  checkJSSConnection) echo unreachable >&2; exit 1 ;;\nesac",
    );

    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("version")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["result"]["version"], "10.50.0");

    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("available")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["result"]["available"], false);
}

#[test]
fn agent_run_merges_stderr_and_returns_status() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    write_script(&layout.agent, "echo \"cmd=$1 rest=$2 $3\"; echo warn >&2; exit 4");

    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("agent")
        .arg("help")
        .arg("--")
        .arg("-x")
        .arg("two words")
        .assert()
        .code(4)
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["result"]["status_code"], 4);
    assert_eq!(value["result"]["output"], "cmd=help rest=-x two words\nwarn\n");
}

#[test]
fn console_user_comes_from_configured_command() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("console-user")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["result"]["console_user"], "carol");
}

#[test]
fn server_without_preferences_is_unconfigured() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("server")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["result"]["configured"], false);
    assert_eq!(value["result"]["server"], Value::Null);
}

#[test]
fn receipts_folder_must_exist() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("receipts")
        .assert()
        .failure()
        .stderr(contains("receipts folder"));

    fs::create_dir_all(&layout.receipts).unwrap();
    fs::write(layout.receipts.join("Office.pkg"), "").unwrap();
    bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("receipts")
        .assert()
        .success()
        .stdout(contains("Office.pkg"));
}

#[test]
fn helper_passthrough_reports_exit_outcome() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    write_script(&layout.helper, "exit 2");
    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("helper")
        .arg("util")
        .arg("--options")
        .arg(r#"{"title": "IT", "bogus_option": 1}"#)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["result"]["exit_code"], 2);
    assert_eq!(value["result"]["result"]["outcome"], "button2");
}

#[test]
fn helper_rejects_bad_input_before_launch() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    let marker = dir.path().join("launched");
    write_script(&layout.helper, &format!("touch {}", marker.display()));

    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("helper")
        .arg("popup")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["error_code"], "invalid_window_type");

    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("helper")
        .arg("hud")
        .arg("--options")
        .arg(r#"{"default_button": 3}"#)
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["error_code"], "invalid_option_value");

    bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("helper")
        .arg("hud")
        .arg("--strict")
        .arg("--options")
        .arg(r#"{"bogus_option": 1}"#)
        .assert()
        .failure();
    assert!(!marker.exists());
}

#[test]
fn helper_output_file_captures_result() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    write_script(&layout.helper, "echo 0");
    let result_path = dir.path().join("result.txt");

    bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("helper")
        .arg("hud")
        .arg("--output-file")
        .arg(&result_path)
        .assert()
        .success();

    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("helper-result")
        .arg(&result_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["result"]["result"]["outcome"], "button1");
}

#[test]
fn helper_abandon_returns_pid_and_result_arrives_later() {
    let dir = tempdir().unwrap();
    let layout = write_config(dir.path());
    write_script(&layout.helper, "sleep 0.3\necho 2");
    let result_path = dir.path().join("result.txt");

    let output = bin()
        .arg("--config")
        .arg(&layout.config_path)
        .arg("--json")
        .arg("helper")
        .arg("hud")
        .arg("--abandon")
        .arg("--output-file")
        .arg(&result_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let pid = parse_json(&output)["result"]["pid"].as_u64().expect("pid");
    assert!(pid > 0);

    let mut outcome = Value::Null;
    for _ in 0..50 {
        let output = bin()
            .arg("--config")
            .arg(&layout.config_path)
            .arg("--json")
            .arg("helper-result")
            .arg(&result_path)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        outcome = parse_json(&output)["result"]["result"]["outcome"].clone();
        if !outcome.is_null() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    assert_eq!(outcome, "button2");
}
