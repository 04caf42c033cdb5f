//! End-to-end tests for the `targetmap` binary.
//!
//! These tests run the binary as a subprocess against a synthetic workspace,
//! the way users run it, and check the JSON it prints.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

/// Helper to write a file, creating parent directories as needed.
fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Run the targetmap binary with arguments, isolated from the caller's
/// environment overrides.
fn run_targetmap(args: &[&str], work_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_targetmap"))
        .args(args)
        .current_dir(work_dir)
        .env_remove("TARGETMAP_WORKSPACE")
        .env_remove("TARGETMAP_OUTPUT")
        .env_remove("TARGETMAP_EMIT")
        .env_remove("TARGETMAP_BATCH_SIZE")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute targetmap")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "targetmap failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

/// A small workspace: a binary depending on a library, a select() on the
/// library and a stray documentation file.
fn create_workspace(root: &Path) {
    write_file(
        &root.join("app/BUILD.yaml"),
        r#"
files: [main.cc]
rules:
  - rule: cc_binary
    name: server
    srcs: [main.cc]
    deps: ["//lib:util"]
"#,
    );
    write_file(
        &root.join("lib/BUILD.yaml"),
        r#"
files: [util.cc, util.h]
rules:
  - rule: cc_library
    name: util
    srcs: [util.cc]
    hdrs: [util.h]
    copts:
      select:
        "//config:linux": ["-DLINUX"]
        "//conditions:default": ["-DGENERIC"]
"#,
    );
    write_file(&root.join("docs/BUILD.yaml"), "files: [README.md]\n");
}

#[test]
fn test_format_whole_workspace() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = run_targetmap(&["format"], dir.path());
    let document = stdout_json(&output);

    assert_eq!(
        document,
        json!({
            "//app:main.cc": {},
            "//app:server": {
                "srcs": ["//app:main.cc"],
                "deps": ["//lib:util"]
            },
            "//docs:README.md": {},
            "//lib:util.cc": {},
            "//lib:util.h": {},
            "//lib:util": {
                "srcs": ["//lib:util.cc"],
                "hdrs": ["//lib:util.h"]
            }
        })
    );

    // Pretty-printed with two-space indentation.
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.starts_with("{\n  \"//app:main.cc\": {}"));
}

#[test]
fn test_format_root_and_configuration() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = run_targetmap(
        &[
            "format",
            "--root",
            "//lib:util",
            "--depth",
            "0",
            "--define",
            "//config:linux",
        ],
        dir.path(),
    );

    assert_eq!(
        stdout_json(&output),
        json!({
            "//lib:util": {
                "srcs": ["//lib:util.cc"],
                "hdrs": ["//lib:util.h"],
                "copts": ["-DLINUX"]
            }
        })
    );
}

#[test]
fn test_format_unknown_select_branches() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = run_targetmap(
        &[
            "format",
            "--root",
            "//lib:util",
            "--depth",
            "0",
            "--emit",
            "explicit,unknown",
        ],
        dir.path(),
    );

    let document = stdout_json(&output);
    assert_eq!(document["//lib:util"]["copts"], json!(["-DLINUX", "-DGENERIC"]));
}

#[test]
fn test_format_writes_output_file_from_config() {
    let dir = tempdir().unwrap();
    let workspace = dir.path().join("ws");
    create_workspace(&workspace);
    write_file(
        &dir.path().join("targetmap.yaml"),
        &format!(
            "workspace: \"{}\"\nemit: [explicit, default]\noutput: out/targets.json\nbatch_size: 2\njobs: 3\n",
            workspace.display()
        ),
    );

    let output = run_targetmap(&["format", "--quiet"], dir.path());
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let content = fs::read_to_string(dir.path().join("out/targets.json")).unwrap();
    let document: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document.as_object().unwrap().len(), 6);
    assert_eq!(document["//lib:util"]["linkstatic"], json!("false"));
    assert_eq!(
        document["//app:server"]["visibility"],
        json!(["//visibility:private"])
    );
}

#[test]
fn test_broken_package_is_skipped() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());
    write_file(&dir.path().join("broken/BUILD.yaml"), "rules: [");

    let output = run_targetmap(&["format"], dir.path());
    let document = stdout_json(&output);
    assert_eq!(document.as_object().unwrap().len(), 6);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_root_fails_with_suggestion() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = run_targetmap(&["format", "--root", "//nope:nothing"], dir.path());
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("//nope:nothing"));
    assert!(stderr.contains("Suggestion:"));
}

#[test]
fn test_init_then_format() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let init = run_targetmap(&["init"], dir.path());
    assert!(init.status.success());
    assert!(dir.path().join("targetmap.yaml").exists());

    let again = run_targetmap(&["init"], dir.path());
    assert!(!again.status.success());

    let output = run_targetmap(&["format"], dir.path());
    assert_eq!(stdout_json(&output).as_object().unwrap().len(), 6);
}
