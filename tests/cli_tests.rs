//! Command-line behavior of the `attachsort` binary.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

use attachsort::digest::fingerprint;
use attachsort::manifest::store::ManifestStore;
use attachsort::manifest::{Manifest, ManifestEntry};

/// A command isolated from the user's config, credentials and environment.
fn attachsort(tmp: &assert_fs::TempDir) -> Command {
    let config = tmp.child("config.toml");
    config
        .write_str(&format!(
            "[general]\ncache_dir = {:?}\n",
            tmp.child("cache").path().display().to_string()
        ))
        .unwrap();

    let mut cmd = Command::cargo_bin("attachsort").unwrap();
    cmd.env("ATTACHSORT_CONFIG", config.path())
        .env_remove("AZURE_TENANT_ID")
        .env_remove("AZURE_CLIENT_ID")
        .env_remove("AZURE_CLIENT_SECRET")
        .env_remove("ATTACHSORT_USER")
        .env_remove("RUST_LOG");
    cmd
}

fn seeded_manifest(tmp: &assert_fs::TempDir) -> std::path::PathBuf {
    let path = tmp.child("attachment_manifest.json").path().to_path_buf();
    let mut manifest = Manifest::new();
    manifest
        .record(fingerprint(b"one"), ManifestEntry::now("one.pdf", "M1"))
        .unwrap();
    manifest
        .record(fingerprint(b"two, too"), ManifestEntry::now("two, too.pdf", "M2"))
        .unwrap();
    ManifestStore::new(&path).save(&manifest).unwrap();
    path
}

#[test]
fn test_run_without_user_fails() {
    let tmp = assert_fs::TempDir::new().unwrap();
    attachsort(&tmp)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No mailbox user configured"));
}

#[test]
fn test_run_without_credentials_fails() {
    let tmp = assert_fs::TempDir::new().unwrap();
    attachsort(&tmp)
        .args(["--user", "accounts@example.com"])
        .arg("--manifest")
        .arg(tmp.child("manifest.json").path())
        .arg("--credentials-file")
        .arg(tmp.child("missing-credentials.toml").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Credential resolution failed"))
        .stderr(predicate::str::contains("environment"));
    tmp.child("manifest.json").assert(predicate::path::missing());
}

#[test]
fn test_run_with_corrupt_manifest_fails_before_credentials() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let manifest = tmp.child("manifest.json");
    manifest.write_str("not json").unwrap();

    attachsort(&tmp)
        .args(["run", "--user", "accounts@example.com"])
        .arg("--manifest")
        .arg(manifest.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Corrupt manifest"));
    manifest.assert("not json");
}

#[test]
fn test_manifest_summary() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let path = seeded_manifest(&tmp);
    attachsort(&tmp)
        .arg("manifest")
        .arg("--manifest")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries"))
        .stdout(predicate::str::contains("one.pdf"));
}

#[test]
fn test_manifest_json() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let path = seeded_manifest(&tmp);
    let output = attachsort(&tmp)
        .args(["manifest", "--json", "--manifest"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["entries"], 2);
    assert_eq!(value["recent"].as_array().unwrap().len(), 2);
}

#[test]
fn test_missing_manifest_is_empty() {
    let tmp = assert_fs::TempDir::new().unwrap();
    attachsort(&tmp)
        .arg("manifest")
        .arg("--manifest")
        .arg(tmp.child("nothing-here.json").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries").and(predicate::str::contains("0")));
}

#[test]
fn test_export_csv() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let path = seeded_manifest(&tmp);
    let out = tmp.child("out/manifest.csv");
    attachsort(&tmp)
        .args(["export", "--format", "csv", "--manifest"])
        .arg(&path)
        .arg("-o")
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2 entries"));

    out.assert(predicate::str::contains("Fingerprint,Filename,Message_ID,First_Seen"));
    out.assert(predicate::str::contains("\"two, too.pdf\",M2"));
}

#[test]
fn test_export_json() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let path = seeded_manifest(&tmp);
    let out = tmp.child("manifest.json.out");
    attachsort(&tmp)
        .args(["export", "-f", "json", "--manifest"])
        .arg(&path)
        .arg("-o")
        .arg(out.path())
        .assert()
        .success();

    let value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.path()).unwrap()).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 2);
}

#[test]
fn test_verify_strict_reports_missing_files() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let path = seeded_manifest(&tmp);
    let dest = tmp.child("attachments");
    dest.child("one.pdf").write_binary(b"one").unwrap();

    attachsort(&tmp)
        .args(["verify", "--manifest"])
        .arg(&path)
        .arg("--destination")
        .arg(dest.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("two, too.pdf"));

    attachsort(&tmp)
        .args(["verify", "--strict", "--manifest"])
        .arg(&path)
        .arg("--destination")
        .arg(dest.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed verification"));
}

#[test]
fn test_verify_clean() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let path = seeded_manifest(&tmp);
    let dest = tmp.child("attachments");
    dest.child("one.pdf").write_binary(b"one").unwrap();
    dest.child("two, too.pdf").write_binary(b"two, too").unwrap();

    attachsort(&tmp)
        .args(["verify", "--strict", "--manifest"])
        .arg(&path)
        .arg("--destination")
        .arg(dest.path())
        .assert()
        .success();
}

#[test]
fn test_completions() {
    let tmp = assert_fs::TempDir::new().unwrap();
    attachsort(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("attachsort"));
}

#[test]
fn test_unparsable_config_is_fatal() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let mut cmd = attachsort(&tmp);
    tmp.child("config.toml")
        .write_str("[manifest]\npath = \"/srv/state/manifest.json\"\nsave_mode = \"incremntal\"\n")
        .unwrap();

    cmd.args(["run", "--user", "accounts@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
    tmp.child("attachment_manifest.json")
        .assert(predicate::path::missing());
}
