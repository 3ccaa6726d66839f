//! CLI integration tests for abiwright.
//!
//! These tests drive the binary against a small manifest written to a
//! temporary directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[[library]]
name = "libfoo"
srcs = ["foo.c"]
ndk = true
export_include_dirs = ["include"]

[library.stubs]
symbol_file = "libfoo.map.txt"
versions = ["29", "30"]

[[library]]
name = "libapp"
srcs = ["app.c"]
shared_libs = ["libfoo#29"]
export_shared_lib_headers = ["libfoo"]
"#;

const LIBFOO_MAP: &str = "\
LIBFOO { # introduced=29
  global:
    foo_open;
    foo_close;
    foo_new; # introduced=30
  local:
    *;
};
";

/// Get the abiwright binary command, isolated from the user's config.
fn abiwright(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("abiwright").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("ABIWRIGHT_MANIFEST");
    cmd
}

/// Create a project with `libfoo` and `libapp`.
fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("Modules.toml"), MANIFEST).unwrap();
    fs::write(tmp.path().join("libfoo.map.txt"), LIBFOO_MAP).unwrap();
    tmp
}

/// Where the same-version check looks for libfoo's reference dump.
fn same_version_reference(root: &Path) -> PathBuf {
    root.join("prebuilts/abi-dumps/ndk/33/64/arm64/source-based/libfoo.so.lsdump")
}

// ============================================================================
// abiwright expand
// ============================================================================

#[test]
fn test_expand_lists_variants() {
    let tmp = project();

    abiwright(tmp.path())
        .arg("expand")
        .assert()
        .success()
        .stdout(predicate::str::contains("libfoo"))
        .stdout(predicate::str::contains("stub_29"))
        .stdout(predicate::str::contains("stub_current (latest"))
        .stdout(predicate::str::contains("shared (canonical"));
}

#[test]
fn test_expand_json() {
    let tmp = project();

    let output = abiwright(tmp.path())
        .args(["expand", "--json", "--module", "libfoo"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["module"], "libfoo");
    assert_eq!(reports[0]["latest"], "stub_current");
    assert_eq!(
        reports[0]["stub_versions"],
        serde_json::json!(["29", "30", "current"])
    );
}

#[test]
fn test_expand_from_subdirectory() {
    let tmp = project();
    let sub = tmp.path().join("src/deep");
    fs::create_dir_all(&sub).unwrap();

    abiwright(&sub)
        .arg("expand")
        .assert()
        .success()
        .stdout(predicate::str::contains("libapp"));
}

#[test]
fn test_expand_without_manifest() {
    let tmp = TempDir::new().unwrap();

    abiwright(tmp.path())
        .arg("expand")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not find `Modules.toml`"));
}

#[test]
fn test_expand_reports_unsorted_versions() {
    let tmp = project();
    fs::write(
        tmp.path().join("Modules.toml"),
        MANIFEST.replace(r#"["29", "30"]"#, r#"["30", "29"]"#),
    )
    .unwrap();

    abiwright(tmp.path())
        .args(["expand", "--no-color"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stubs.versions"))
        .stderr(predicate::str::contains("module `libfoo` has errors"));
}

#[test]
fn test_expand_unknown_module() {
    let tmp = project();

    abiwright(tmp.path())
        .args(["expand", "--module", "libnope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("libnope"));
}

// ============================================================================
// abiwright stubs
// ============================================================================

#[test]
fn test_stubs_writes_source_and_script() {
    let tmp = project();

    abiwright(tmp.path())
        .args(["stubs", "libfoo", "--version", "29"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stub_29"))
        .stdout(predicate::str::contains("symbols: 2"));

    let dir = tmp.path().join("out/libfoo/stub_29");
    let source = fs::read_to_string(dir.join("stub.c")).unwrap();
    assert!(source.contains("foo_open"));
    assert!(!source.contains("foo_new"));
    let script = fs::read_to_string(dir.join("stub.map")).unwrap();
    assert!(script.starts_with("LIBFOO {"));
}

#[test]
fn test_stubs_custom_out_dir() {
    let tmp = project();

    abiwright(tmp.path())
        .args(["stubs", "libfoo", "--out", "gen"])
        .assert()
        .success();

    let source = fs::read_to_string(tmp.path().join("gen/stub.c")).unwrap();
    assert!(source.contains("foo_new"));
}

#[test]
fn test_stubs_unknown_version() {
    let tmp = project();

    abiwright(tmp.path())
        .args(["stubs", "libfoo", "--version", "28"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("declared: 29, 30, current"));
}

// ============================================================================
// abiwright flags
// ============================================================================

#[test]
fn test_flags_shows_pinned_macro() {
    let tmp = project();

    abiwright(tmp.path())
        .args(["flags", "libapp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-D__LIBFOO_API__=29"))
        .stdout(predicate::str::contains("libfoo#29 -> 29"));
}

#[test]
fn test_flags_of_stub_variant() {
    let tmp = project();

    abiwright(tmp.path())
        .args(["flags", "libfoo", "--variant", "stub_30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-D__LIBFOO_API__=30"))
        .stdout(predicate::str::contains("--version-script"));
}

#[test]
fn test_flags_unknown_variant() {
    let tmp = project();

    abiwright(tmp.path())
        .args(["flags", "libfoo", "--variant", "stub_99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("variant `stub_99` not found"));
}

// ============================================================================
// abiwright abi-check / update-refs
// ============================================================================

#[test]
fn test_abi_check_without_references() {
    let tmp = project();

    abiwright(tmp.path()).arg("abi-check").assert().success();
    assert!(tmp
        .path()
        .join("out/libfoo/shared/libfoo.so.lsdump")
        .is_file());
}

#[test]
fn test_abi_check_failure_then_update_refs() {
    let tmp = project();
    let reference = same_version_reference(tmp.path());
    fs::create_dir_all(reference.parent().unwrap()).unwrap();
    fs::write(
        &reference,
        r#"{"functions": [{"name": "foo_open", "return_type": "int", "source_file": "include/foo.h"}]}"#,
    )
    .unwrap();

    abiwright(tmp.path())
        .arg("abi-check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stderr(predicate::str::contains(
            "Please update ABI references with: abiwright update-refs -l libfoo",
        ));

    abiwright(tmp.path())
        .args(["update-refs", "-l", "libfoo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("updated"));

    abiwright(tmp.path())
        .arg("abi-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("libfoo [same-version (33)]: ok"));
}

#[test]
fn test_abi_check_json() {
    let tmp = project();

    let output = abiwright(tmp.path())
        .args(["abi-check", "--json", "--module", "libfoo"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dumps"][0]["module"], "libfoo");
}

// ============================================================================
// abiwright completions
// ============================================================================

#[test]
fn test_completions_bash() {
    abiwright(Path::new("."))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("abiwright"));
}

#[test]
fn test_help_lists_commands() {
    abiwright(Path::new("."))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("expand"))
        .stdout(predicate::str::contains("update-refs"));
}
