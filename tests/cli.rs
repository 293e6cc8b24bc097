//! CLI integration tests for the vellum admin commands.
//!
//! Each test uses an isolated temp directory for the database, so tests can
//! run in parallel.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;
use serde_json::Value;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("vellum").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(["admin", "init", "--data-dir", &self.data_dir_str()])
            .assert()
    }

    fn info_json(&self) -> Value {
        let output = self
            .cmd()
            .args(["admin", "info", "--data-dir", &self.data_dir_str(), "--json"])
            .output()
            .expect("failed to run command");

        serde_json::from_slice(&output.stdout).expect("failed to parse JSON")
    }
}

#[test]
fn test_init_writes_admin_token() {
    let ctx = TestContext::new();
    ctx.init()
        .success()
        .stdout(predicate::str::contains("Admin token"));

    let token_file = ctx.data_dir().join(".admin_token");
    let token = std::fs::read_to_string(&token_file).expect("token file written");
    assert!(token.starts_with("vellum_"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&token_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_init_twice_fails() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.init()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_info_requires_init() {
    let ctx = TestContext::new();
    ctx.cmd()
        .args(["admin", "info", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vellum admin init"));
}

#[test]
fn test_info_json() {
    let ctx = TestContext::new();
    ctx.init().success();

    let info = ctx.info_json();
    assert_eq!(info["projects"], serde_json::json!(["Offline"]));
    assert_eq!(info["users"], 1);
    assert!(
        info["database"]
            .as_str()
            .expect("database path")
            .starts_with(&ctx.data_dir_str())
    );
}

#[test]
fn test_create_user_prints_token() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.cmd()
        .args([
            "admin",
            "create-user",
            "--data-dir",
            &ctx.data_dir_str(),
            "--name",
            "alice",
            "--password",
            "s3cret",
            "--group",
            "Users",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created user 'alice'"))
        .stdout(predicate::str::contains("vellum_"));

    assert_eq!(ctx.info_json()["users"], 2);

    ctx.cmd()
        .args([
            "admin",
            "create-user",
            "--data-dir",
            &ctx.data_dir_str(),
            "--name",
            "bob",
            "--password",
            "pw",
            "--group",
            "Nobody",
        ])
        .assert()
        .failure();
}

#[test]
fn test_publish_empty_project() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.cmd()
        .args(["publish", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Published 0 folder(s), 0 file(s), 0 deleted folder(s)",
        ));

    ctx.cmd()
        .args(["publish", "--data-dir", &ctx.data_dir_str(), "--project", "Missing"])
        .assert()
        .failure();
}
