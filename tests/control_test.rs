// Integration tests for operator commands on named scripts
#![cfg(unix)]

use scriptwarden::config::{LaunchDefaults, SupervisorConfig};
use scriptwarden::error::WardenError;
use scriptwarden::notify::LogSink;
use scriptwarden::process::ProcessProbe;
use scriptwarden::supervisor::{ScriptOutcome, Supervisor};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tempfile::TempDir;

fn create_supervisor(temp_dir: &TempDir, scripts: Value) -> (Supervisor, PathBuf) {
    fs::write(temp_dir.path().join("job.sh"), "exec sleep 30\n").unwrap();
    let scripts_path = temp_dir.path().join("scripts.json");
    fs::write(&scripts_path, serde_json::to_string_pretty(&scripts).unwrap()).unwrap();

    let config = SupervisorConfig {
        scripts_file: scripts_path.clone(),
        launch: LaunchDefaults {
            interpreter: "/bin/sh".to_string(),
            ..LaunchDefaults::default()
        },
        ..SupervisorConfig::default()
    };

    (Supervisor::new(config, Box::new(LogSink)), scripts_path)
}

fn job(temp_dir: &TempDir, name: &str, active: bool) -> Value {
    json!({
        "name": name,
        "file": "job.sh",
        "directory": temp_dir.path().to_string_lossy(),
        "active": active
    })
}

fn read_scripts(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn wait_until_dead(probe: &mut ProcessProbe, pid: i64) -> bool {
    for _ in 0..40 {
        if !probe.is_alive(pid).unwrap() {
            return true;
        }
        sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn test_list_reports_running_state() {
    let temp_dir = TempDir::new().unwrap();
    let (mut supervisor, scripts_path) = create_supervisor(
        &temp_dir,
        json!([
            job(&temp_dir, "web", true),
            job(&temp_dir, "cron", false),
            {"file": "job.sh", "pid": "garbage"}
        ]),
    );
    supervisor.run_pass().unwrap();

    let scripts = supervisor.list().unwrap();
    assert_eq!(scripts.len(), 3);

    assert_eq!(scripts[0].name, "web");
    assert!(scripts[0].active);
    assert!(scripts[0].running);
    assert!(scripts[0].pid.is_some());
    assert!(scripts[0].last_date.is_some());

    assert_eq!(scripts[1].name, "cron");
    assert!(!scripts[1].active);
    assert!(!scripts[1].running);
    assert_eq!(scripts[1].pid, None);

    assert_eq!(scripts[2].name, "<entry 2>");
    assert_eq!(scripts[2].pid, None);

    let pid = read_scripts(&scripts_path)[0]["pid"].as_i64().unwrap();
    let _ = ProcessProbe::new().terminate(pid);
}

#[test]
fn test_deactivate_stops_script_and_clears_launch() {
    let temp_dir = TempDir::new().unwrap();
    let (mut supervisor, scripts_path) =
        create_supervisor(&temp_dir, json!([job(&temp_dir, "web", true)]));
    supervisor.run_pass().unwrap();
    let pid = read_scripts(&scripts_path)[0]["pid"].as_i64().unwrap();

    supervisor.deactivate_script("web").unwrap();

    let persisted = read_scripts(&scripts_path);
    assert_eq!(persisted[0]["active"], json!(false));
    assert_eq!(persisted[0]["pid"], Value::Null);
    assert_eq!(persisted[0]["last_date"], Value::Null);
    assert!(wait_until_dead(supervisor.probe_mut(), pid));

    let report = supervisor.run_pass().unwrap();
    assert_eq!(report.outcome_of("web"), Some(&ScriptOutcome::Skipped));
}

#[test]
fn test_activate_brings_script_back_into_passes() {
    let temp_dir = TempDir::new().unwrap();
    let (mut supervisor, scripts_path) =
        create_supervisor(&temp_dir, json!([job(&temp_dir, "cron", false)]));

    supervisor.activate_script("cron").unwrap();
    assert_eq!(read_scripts(&scripts_path)[0]["active"], json!(true));

    let report = supervisor.run_pass().unwrap();
    assert!(matches!(
        report.outcome_of("cron"),
        Some(ScriptOutcome::Restarted { .. })
    ));

    let pid = read_scripts(&scripts_path)[0]["pid"].as_i64().unwrap();
    let _ = ProcessProbe::new().terminate(pid);
}

#[test]
fn test_restart_script_ignores_active_flag() {
    let temp_dir = TempDir::new().unwrap();
    let (mut supervisor, scripts_path) =
        create_supervisor(&temp_dir, json!([job(&temp_dir, "cron", false)]));

    let first = supervisor.restart_script("cron").unwrap();
    assert_eq!(read_scripts(&scripts_path)[0]["pid"], json!(first));

    let second = supervisor.restart_script("cron").unwrap();
    assert_ne!(first, second);
    assert!(wait_until_dead(supervisor.probe_mut(), i64::from(first)));

    let persisted = read_scripts(&scripts_path);
    assert_eq!(persisted[0]["pid"], json!(second));
    assert_eq!(persisted[0]["active"], json!(false));

    let _ = ProcessProbe::new().terminate(i64::from(second));
}

#[test]
fn test_unknown_script_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let (mut supervisor, _) = create_supervisor(&temp_dir, json!([job(&temp_dir, "web", true)]));

    assert!(matches!(
        supervisor.restart_script("nope"),
        Err(WardenError::ScriptNotFound(_))
    ));
    assert!(matches!(
        supervisor.activate_script("nope"),
        Err(WardenError::ScriptNotFound(_))
    ));
    assert!(matches!(
        supervisor.deactivate_script("nope"),
        Err(WardenError::ScriptNotFound(_))
    ));
}
