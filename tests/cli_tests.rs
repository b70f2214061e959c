//! Binary-level behavior: exit codes and machine-readable output.

use assert_cmd::Command;
use predicates::prelude::*;

const CREDENTIAL_VARS: &[&str] = &[
    "APPLE_ID",
    "APPLE_TEAM_ID",
    "APPLE_APP_PASSWORD",
    "APPLE_API_KEY",
    "APPLE_API_ISSUER",
    "APPLE_API_KEY_PATH",
    "APPLE_CERTIFICATE",
    "APPLE_CERTIFICATE_PASSWORD",
];

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("macos_bundler_release").unwrap();
    cmd.env_remove("APP_VERSION")
        .env_remove("ENABLE_SIGNING")
        .env_remove("SIGNING_IDENTITY")
        .env_remove("RUST_LOG");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_unknown_subcommand_exits_nonzero() {
    cli().arg("publish").assert().failure();
}

#[test]
fn test_version_from_environment() {
    cli()
        .arg("version")
        .env("APP_VERSION", "v1.3.0-beta.4")
        .assert()
        .success()
        .stdout(predicate::str::contains("version: 1.3.0-beta.4"))
        .stdout(predicate::str::contains("bundle_version: 13004"));
}

#[test]
fn test_version_quiet_still_prints_result() {
    cli()
        .args(["--quiet", "version", "--app-version", "2.1.7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bundle_version: 217"))
        .stdout(predicate::str::contains("source").not());
}

#[test]
fn test_checksum_writes_sidecar() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("MenuBar-1.0.0.dmg");
    std::fs::write(&file, b"hello").unwrap();

    cli()
        .arg("checksum")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  MenuBar-1.0.0.dmg",
        ));

    let sidecar = std::fs::read_to_string(tmp.path().join("MenuBar-1.0.0.dmg.sha256")).unwrap();
    assert!(sidecar.starts_with("2cf24dba"));
}

#[test]
fn test_checksum_of_missing_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    cli()
        .arg("checksum")
        .arg(tmp.path().join("absent.dmg"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.dmg"));
}

#[test]
fn test_package_plugin() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("clipboard");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("plugin.json"),
        r#"{"name": "clipboard", "version": "1.0.2"}"#,
    )
    .unwrap();
    std::fs::write(dir.join("main.js"), "export {}").unwrap();
    let out = tmp.path().join("dist");

    cli()
        .arg("package-plugin")
        .arg(&dir)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("clipboard-1.0.2.zip"));

    assert!(out.join("clipboard-1.0.2.zip").is_file());
    assert!(out.join("clipboard-1.0.2.zip.sha256").is_file());
}

#[test]
fn test_signed_release_without_credentials_fails_early() {
    let tmp = tempfile::tempdir().unwrap();
    cli()
        .current_dir(tmp.path())
        .args(["release", "--skip-build"])
        .env("ENABLE_SIGNING", "1")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("APPLE_ID"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = tempfile::tempdir().unwrap();
    cli()
        .current_dir(tmp.path())
        .arg("bundle")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("release.toml"));
}

#[test]
fn test_bundle_version_regression_warns_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let build = root.join("target/universal/release");
    std::fs::create_dir_all(&build).unwrap();
    std::fs::write(build.join("menubar"), b"\xcf\xfa\xed\xfe").unwrap();
    std::fs::write(root.join("versions.json"), r#"{"app": "2.0.0"}"#).unwrap();
    std::fs::write(
        root.join("release.toml"),
        r#"
        app_name = "MenuBar"
        bundle_identifier = "com.example.menubar"
        main_executable = "menubar"
        version_manifest = "versions.json"
        "#,
    )
    .unwrap();

    cli()
        .current_dir(root)
        .args(["bundle", "--no-sign", "--app-version", "2.0.0"])
        .assert()
        .success();

    cli()
        .current_dir(root)
        .args(["bundle", "--no-sign", "--app-version", "1.9.0"])
        .assert()
        .success()
        .stderr(predicate::str::contains("200"))
        .stderr(predicate::str::contains("190"));

    cli()
        .current_dir(root)
        .args(["bundle", "--no-sign", "--app-version", "1.8.0", "--strict-versions"])
        .assert()
        .code(1);
}
