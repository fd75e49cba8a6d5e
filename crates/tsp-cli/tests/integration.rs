#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tsp(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tsp").unwrap();
    cmd.current_dir(dir.path())
        .env("TSP_CONFIG", dir.path().join("tsp.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const SCHEDULE: &str = r#"{"Schedule": [
    {"commandPhase": [2, 6], "commandType": "hold", "commandStartTime": 0.0, "commandEndTime": 20.0},
    {"commandPhase": [4, 8], "commandType": "hold", "commandStartTime": 0.0, "commandEndTime": 30.0},
    {"commandPhase": 3, "commandType": "call_veh", "commandStartTime": 5.0, "commandEndTime": 10.0}
]}"#;

// ---------------------------------------------------------------------------
// tsp plan
// ---------------------------------------------------------------------------

#[test]
fn plan_prints_groups_then_clears() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "schedule.json", SCHEDULE);

    tsp(&dir)
        .arg("plan")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("KIND"))
        .stdout(predicate::str::contains("2,4,6,8"))
        .stdout(predicate::str::contains("call_veh"));
}

#[test]
fn plan_json_lists_residual_group_and_one_clear_per_end() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "schedule.json", SCHEDULE);

    let out = tsp(&dir)
        .args(["--json", "plan"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let plan = value["plan"].as_array().unwrap();

    let windows: Vec<_> = plan.iter().filter(|e| e["kind"] == "window").collect();
    let clears: Vec<_> = plan.iter().filter(|e| e["kind"] == "clear").collect();
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0]["phase_bitmask"], 170);
    assert_eq!(windows[0]["end_time"], 20.0);

    let clear_times: Vec<(String, f64)> = clears
        .iter()
        .map(|c| {
            (
                c["action"].as_str().unwrap().to_string(),
                c["start_time"].as_f64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        clear_times,
        vec![("call_veh".to_string(), 10.0), ("hold".to_string(), 30.0)]
    );
}

#[test]
fn plan_rejects_out_of_range_phase() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "bad.json",
        r#"{"Schedule": [{"commandPhase": 9, "commandType": "hold", "commandStartTime": 0, "commandEndTime": 5}]}"#,
    );
    tsp(&dir)
        .arg("plan")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid schedule document"));
}

#[test]
fn plan_of_empty_schedule_succeeds() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "empty.json", r#"{"Schedule": []}"#);
    tsp(&dir)
        .arg("plan")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Empty schedule"));
}

// ---------------------------------------------------------------------------
// tsp config
// ---------------------------------------------------------------------------

#[test]
fn missing_config_validates_with_defaults() {
    let dir = TempDir::new().unwrap();
    tsp(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn backup_time_below_two_fails_validation() {
    let dir = TempDir::new().unwrap();
    write(&dir, "tsp.yaml", "controller:\n  backup_time_secs: 1\n");
    tsp(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_init_writes_defaults_once() {
    let dir = TempDir::new().unwrap();
    tsp(&dir).args(["config", "init"]).assert().success();

    let body = std::fs::read_to_string(dir.path().join("tsp.yaml")).unwrap();
    assert!(body.contains("backup_time_secs: 20"));
    assert!(body.contains("127.0.0.1:20002"));

    tsp(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_show_json_reports_overrides() {
    let dir = TempDir::new().unwrap();
    write(&dir, "tsp.yaml", "receiver:\n  bind: 0.0.0.0:6053\n");
    let out = tsp(&dir)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["receiver"]["bind"], "0.0.0.0:6053");
    assert_eq!(value["controller"]["backup_time_secs"], 20);
}

// ---------------------------------------------------------------------------
// tsp run
// ---------------------------------------------------------------------------

#[test]
fn run_refuses_an_invalid_translation_before_listening() {
    let dir = TempDir::new().unwrap();
    let translation = write(&dir, "translation.json", r#"{"OmittedPhases": [1]}"#);
    write(
        &dir,
        "tsp.yaml",
        &format!(
            "receiver:\n  bind: 127.0.0.1:0\nspat:\n  translation_path: {}\n",
            translation.display()
        ),
    );
    tsp(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load translation"))
        .stdout(predicate::str::contains("listening").not());
}

#[test]
fn run_refuses_an_invalid_config() {
    let dir = TempDir::new().unwrap();
    write(&dir, "tsp.yaml", "controller:\n  backup_time_secs: 1\n");
    tsp(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

// ---------------------------------------------------------------------------
// tsp spat
// ---------------------------------------------------------------------------

const TRANSLATION: &str = r#"{
    "OmittedPhases": [3],
    "GreenStates": {
        "Cycle1": {"MinEndTime": [100,100,100,100,100,100,100,100], "MaxEndTime": [200,200,200,200,200,200,200,200]},
        "Cycle2": {"MinEndTime": [300,300,300,300,300,300,300,300], "MaxEndTime": [400,400,400,400,400,400,400,400]}
    },
    "RedStates": {
        "Cycle1": {"MinEndTime": [500,500,500,500,500,500,500,500], "MaxEndTime": [600,600,600,600,600,600,600,600]},
        "Cycle2": {"MinEndTime": [700,700,700,700,700,700,700,700], "MaxEndTime": [800,800,800,800,800,800,800,800]}
    }
}"#;

const SNAPSHOT: &str = r#"{
    "vehicle_states": ["green", "red", "green", "yellow", "dark", "dark", "dark", "dark"],
    "min_end_times": [12, 12, 12, 12, 12, 12, 12, 12],
    "max_end_times": [34, 34, 34, 34, 34, 34, 34, 34]
}"#;

#[test]
fn spat_translates_first_cycle_bounds() {
    let dir = TempDir::new().unwrap();
    let translation = write(&dir, "translation.json", TRANSLATION);
    let snapshot = write(&dir, "snapshot.json", SNAPSHOT);

    let out = tsp(&dir)
        .args(["--json", "spat"])
        .arg(&translation)
        .arg(&snapshot)
        .args(["--elapsed", "50"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();

    let min: Vec<f64> = value["vehicle_min"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    assert_eq!(
        min,
        vec![50.0, 450.0, 36001.0, 12.0, 36001.0, 36001.0, 36001.0, 36001.0]
    );
    assert!(value["pedestrian_max"]
        .as_array()
        .unwrap()
        .iter()
        .all(|v| v.as_f64() == Some(36001.0)));
    assert_eq!(value["served"], serde_json::json!([]));
}

#[test]
fn spat_rejects_out_of_range_omitted_phase() {
    let dir = TempDir::new().unwrap();
    let translation = write(
        &dir,
        "translation.json",
        &TRANSLATION.replace("\"OmittedPhases\": [3]", "\"OmittedPhases\": [9]"),
    );
    let snapshot = write(&dir, "snapshot.json", SNAPSHOT);
    tsp(&dir)
        .arg("spat")
        .arg(&translation)
        .arg(&snapshot)
        .assert()
        .failure()
        .stderr(predicate::str::contains("omitted phase 9"));
}
