//! Integration tests for `fastresolve resolve` and `fastresolve batch`.

use serial_test::serial;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "fastresolve-cli", "--bin", "fastresolve", "--"]);
    cmd
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "App.js", "import './src/Button';");
    write(dir.path(), "src/Button.js", "");
    write(dir.path(), "src/Button.ios.js", "");
    dir
}

fn resolve_json(root: &Path, args: &[&str]) -> (bool, serde_json::Value) {
    let output = cargo_bin()
        .args(["--json", "--cwd"])
        .arg(root)
        .arg("resolve")
        .args(args)
        .output()
        .expect("Failed to run command");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap_or_else(|e| {
        panic!(
            "stdout should be valid JSON ({e}). stdout: {stdout} stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output.status.success(), json)
}

#[test]
#[serial]
fn test_resolve_platform_file_json() {
    let dir = project();

    let (ok, json) = resolve_json(dir.path(), &["./src/Button", "--from", "App.js", "--platform", "ios"]);
    assert!(ok);
    assert_eq!(json["ok"], true);
    assert_eq!(json["specifier"], "./src/Button");
    assert_eq!(json["resolution"]["type"], "sourceFile");
    assert!(json["resolution"]["path"].as_str().unwrap().ends_with("Button.ios.js"));

    let (_, json) = resolve_json(dir.path(), &["./src/Button", "--from", "App.js", "--platform", "android"]);
    assert!(json["resolution"]["path"].as_str().unwrap().ends_with("Button.js"));
}

#[test]
#[serial]
fn test_resolve_builtin_per_environment() {
    let dir = project();

    let (ok, json) = resolve_json(dir.path(), &["os", "--from", "App.js", "--platform", "web"]);
    assert!(ok);
    assert_eq!(json["resolution"]["type"], "empty");

    let (ok, json) = resolve_json(
        dir.path(),
        &["os", "--from", "App.js", "--platform", "web", "--environment", "node"],
    );
    assert!(ok);
    assert_eq!(json["resolution"]["type"], "sourceFile");
    assert_eq!(json["resolution"]["kind"], "generated");
    let stub = std::fs::read_to_string(json["resolution"]["path"].as_str().unwrap()).unwrap();
    assert!(stub.contains("node:os"));
}

#[test]
#[serial]
fn test_resolve_miss_exits_nonzero() {
    let dir = project();
    let (ok, json) = resolve_json(dir.path(), &["./missing", "--from", "App.js"]);
    assert!(!ok);
    assert_eq!(json["ok"], false);
    assert!(json["error"].as_str().unwrap().contains("./missing"));
    assert!(json.get("resolution").is_none());
}

#[test]
#[serial]
fn test_batch_stdin() {
    let dir = project();
    let mut child = cargo_bin()
        .arg("--cwd")
        .arg(dir.path())
        .args(["batch", "--platform", "ios"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn batch");

    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, "./src/Button\tApp.js").unwrap();
        writeln!(stdin, "# skipped").unwrap();
        writeln!(stdin, "./nope\tApp.js").unwrap();
    }
    drop(child.stdin.take());

    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["ok"], true);
    assert!(lines[0]["resolution"]["path"].as_str().unwrap().ends_with("Button.ios.js"));
    assert_eq!(lines[1]["ok"], false);
}

#[test]
#[serial]
fn test_batch_per_line_options() {
    let dir = project();
    let mut child = cargo_bin()
        .arg("--cwd")
        .arg(dir.path())
        .args(["batch", "--platform", "web", "--environment", "client"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn batch");

    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, "os\tApp.js").unwrap();
        writeln!(stdin, "os\tApp.js\t{{\"environment\":\"node\"}}").unwrap();
        writeln!(stdin, "os\tApp.js\t{{broken").unwrap();
    }
    drop(child.stdin.take());

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["resolution"]["type"], "empty");
    assert_eq!(lines[1]["resolution"]["kind"], "generated");
    assert_eq!(lines[2]["ok"], false);
}

#[test]
#[serial]
fn test_version() {
    let output = cargo_bin().arg("version").output().expect("Failed to run command");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("fastresolve "));
}
