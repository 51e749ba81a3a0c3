// End-to-end tests for the `drg` binary: exit codes and the --json stdout contract.
//
// Every test gets its own temp directory holding the database and a
// (usually absent) settings file, so the user's real config is never read.
//
// Run with: cargo test -p drg-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("roster.db")
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("settings.toml")
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn drg(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_drg"))
            .arg("--db")
            .arg(self.db())
            .arg("--config")
            .arg(self.config())
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("run drg")
    }

    fn init(&self) {
        let out = self.drg(&["init"]);
        assert_success(&out);
    }
}

fn fixture(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../recon/tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn code(out: &Output) -> i32 {
    out.status.code().expect("terminated by signal")
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "exit code: {:?}\nstderr: {}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
}

/// Assert stdout is a single, parseable JSON value.
fn json(out: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&out.stdout);
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed)
        .unwrap_or_else(|e| panic!("stdout must be valid JSON.\nParse error: {e}\nstdout:\n{trimmed}"))
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ===========================================================================
// init / store availability
// ===========================================================================

#[test]
fn commands_refuse_uninitialised_database() {
    let env = Env::new();
    let out = env.drg(&["list"]);
    assert_eq!(code(&out), 6);
    assert!(stderr(&out).contains("drg init"), "stderr: {}", stderr(&out));

    let out = env.drg(&["import", &fixture("week1.csv"), "--header"]);
    assert_eq!(code(&out), 6);
}

#[test]
fn init_is_repeatable() {
    let env = Env::new();
    env.init();
    env.init();
    let out = env.drg(&["list", "--json"]);
    assert_success(&out);
    assert_eq!(json(&out), serde_json::json!([]));
}

// ===========================================================================
// import
// ===========================================================================

#[test]
fn weekly_imports_end_to_end() {
    let env = Env::new();
    env.init();

    let out = env.drg(&["import", &fixture("week1.csv"), "--header", "--json"]);
    assert_success(&out);
    let report = json(&out);
    assert_eq!(report["mode"], "merge");
    assert_eq!(report["inserted"], 5);
    assert_eq!(report["skipped"], 0);

    let out = env.drg(&[
        "import",
        &fixture("week2.csv"),
        "--header",
        "--mode",
        "authoritative",
        "--json",
    ]);
    assert_eq!(code(&out), 3, "row errors must surface as exit 3");
    let report = json(&out);
    assert_eq!(report["mode"], "authoritative");
    assert_eq!(report["inserted"], 1);
    assert_eq!(report["updated"], 3);
    assert_eq!(report["deleted"], 2);
    assert_eq!(report["skipped"], 2);
    let errors = report["errors"].as_array().unwrap();
    assert_eq!(errors[0]["line"], 6);
    assert!(errors[0]["reason"].as_str().unwrap().contains("R9"));
    assert_eq!(errors[1]["line"], 8);
    assert_eq!(report["warnings"][0]["overridden_line"], 4);
    assert_eq!(report["warnings"][0]["line"], 7);

    // rows without errors were still committed
    let out = env.drg(&["list", "--json"]);
    assert_success(&out);
    let list = json(&out);
    let keys: Vec<&str> = list.as_array().unwrap().iter().map(|m| m["key"].as_str().unwrap()).collect();
    assert_eq!(keys, ["m3", "m4", "m1", "m6"]);

    let m4 = &list[1];
    assert_eq!(m4["level_start"], 18);
    assert_eq!(m4["level_current"], 20);
    assert_eq!(m4["power_delta"], 250000);
}

#[test]
fn import_without_header_flag_rejects_header_line() {
    let env = Env::new();
    env.init();

    let out = env.drg(&["import", &fixture("week1.csv"), "--json"]);
    assert_eq!(code(&out), 3);
    let report = json(&out);
    assert_eq!(report["inserted"], 5);
    assert_eq!(report["errors"][0]["line"], 1);
}

#[test]
fn import_mode_and_header_come_from_settings() {
    let env = Env::new();
    env.init();
    std::fs::write(env.config(), "[import]\nhas_header = true\nmode = \"authoritative\"\n").unwrap();

    assert_success(&env.drg(&["import", &fixture("week1.csv")]));
    let out = env.drg(&["import", &fixture("week2.csv"), "--json"]);
    assert_eq!(code(&out), 3);
    assert_eq!(json(&out)["deleted"], 2);

    // flag beats settings
    let out = env.drg(&["import", &fixture("week1.csv"), "--mode", "merge", "--json"]);
    assert_success(&out);
    assert_eq!(json(&out)["deleted"], 0);
}

#[test]
fn import_missing_file_is_usage_error() {
    let env = Env::new();
    env.init();
    let out = env.drg(&["import", env.path("nope.csv").to_str().unwrap()]);
    assert_eq!(code(&out), 2);
}

#[test]
fn malformed_settings_exit_7() {
    let env = Env::new();
    std::fs::write(env.config(), "[import\nmode = ").unwrap();
    let out = env.drg(&["list"]);
    assert_eq!(code(&out), 7);
    assert!(stderr(&out).contains("settings.toml"));
}

// ===========================================================================
// single-member commands
// ===========================================================================

#[test]
fn add_show_edit_remove() {
    let env = Env::new();
    env.init();

    assert_success(&env.drg(&["add", "m42", "Ada", "R2", "14", "1250000"]));
    assert_eq!(code(&env.drg(&["add", "m42", "Ada", "R2", "14", "1250000"])), 5);
    assert_eq!(code(&env.drg(&["add", "m43", "Bo", "R7", "1", "1"])), 2);
    assert_eq!(code(&env.drg(&["add", "m43", "Bo", "R1", "-1", "1"])), 2);

    let out = env.drg(&["edit", "m42", "--rank", "R3", "--power", "1300000", "--record-changes"]);
    assert_success(&out);
    assert_eq!(code(&env.drg(&["edit", "m42"])), 2);
    assert_eq!(code(&env.drg(&["edit", "ghost", "--rank", "R1"])), 4);

    let out = env.drg(&["show", "m42", "--json"]);
    assert_success(&out);
    let m = json(&out);
    assert_eq!(m["rank"], "R3");
    assert_eq!(m["power_start"], 1250000);
    assert_eq!(m["power_current"], 1300000);
    assert_eq!(m["power_delta"], 50000);

    let out = env.drg(&["history", "m42", "--json"]);
    assert_success(&out);
    let history = json(&out);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["power_old"], 1250000);
    assert_eq!(history[0]["power_new"], 1300000);
    assert_eq!(history[0]["rank_old"], "R2");
    assert_eq!(history[0]["rank_new"], "R3");

    // a rank-only promotion is history too
    assert_success(&env.drg(&["edit", "m42", "--rank", "R4", "--record-changes"]));
    let history = json(&env.drg(&["history", "m42", "--json"]));
    assert_eq!(history.as_array().unwrap().len(), 2);
    assert_eq!(history[1]["rank_new"], "R4");
    assert_eq!(history[1]["power_old"], history[1]["power_new"]);

    assert_success(&env.drg(&["remove", "m42"]));
    assert_eq!(code(&env.drg(&["show", "m42"])), 4);
    assert_eq!(code(&env.drg(&["history", "m42"])), 4);
    assert_eq!(code(&env.drg(&["remove", "m42"])), 4);
}

// ===========================================================================
// stats / export
// ===========================================================================

#[test]
fn stats_json_views() {
    let env = Env::new();
    env.init();
    assert_success(&env.drg(&["import", &fixture("week1.csv"), "--header"]));
    let out = env.drg(&["import", &fixture("week2.csv"), "--header", "--mode", "authoritative"]);
    assert_eq!(code(&out), 3);

    let out = env.drg(&["stats", "-n", "2", "--json"]);
    assert_success(&out);
    let stats = json(&out);
    assert_eq!(stats["summary"]["members"], 4);
    assert_eq!(stats["top_power"].as_array().unwrap().len(), 2);
    assert_eq!(stats["top_power"][0]["key"], "m3");
    assert_eq!(stats["lowest_power"][0]["key"], "m6");
    assert_eq!(stats["most_power_gained"][0]["key"], "m4");
    assert_eq!(stats["most_power_gained"][0]["value"], 250000);
    assert_eq!(stats["least_power_gained"][0]["key"], "m3");
    assert_eq!(stats["least_power_gained"][0]["value"], -50000);

    assert_eq!(code(&env.drg(&["stats", "-n", "0"])), 2);
}

#[test]
fn export_reimports_into_fresh_database() {
    let env = Env::new();
    env.init();
    assert_success(&env.drg(&["import", &fixture("week1.csv"), "--header"]));

    let csv = env.path("export.csv");
    assert_success(&env.drg(&["export", "-o", csv.to_str().unwrap()]));
    let original = json(&env.drg(&["list", "--json"]));

    let copy = Env::new();
    copy.init();
    let out = copy.drg(&["import", csv.to_str().unwrap(), "--header", "--json"]);
    assert_success(&out);
    assert_eq!(json(&out)["inserted"], 5);
    assert_eq!(json(&copy.drg(&["list", "--json"])), original);
}

#[test]
fn unknown_subcommand_is_usage_error() {
    let env = Env::new();
    assert_eq!(code(&env.drg(&["frobnicate"])), 2);
}
