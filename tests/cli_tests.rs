//! Command-line behaviour of the `storyland` binary that needs no network.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// A `storyland` command isolated from the caller's config and environment.
fn storyland(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("storyland");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("GOOGLE_API_KEY")
        .env_remove("WORKFLOW_TIMEOUT")
        .env_remove("USE_DATABASE")
        .env_remove("LOG_FORMAT");
    cmd
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_flags() {
        let dir = TempDir::new().unwrap();
        storyland(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--select-all"))
            .stdout(predicate::str::contains("--author"))
            .stdout(predicate::str::contains("--dev"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        storyland(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("storyland"));
    }

    #[test]
    fn test_missing_title_is_a_usage_error() {
        let dir = TempDir::new().unwrap();
        storyland(&dir)
            .assert()
            .failure()
            .stderr(predicate::str::contains("BOOK_TITLE"));
    }

    #[test]
    fn test_unknown_budget_is_rejected() {
        let dir = TempDir::new().unwrap();
        storyland(&dir)
            .args(["1984", "--budget", "extravagant"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("budget"));
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_missing_api_key_fails_before_any_request() {
        let dir = TempDir::new().unwrap();
        storyland(&dir)
            .args(["1984", "--select-all"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn test_invalid_env_timeout_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "WORKFLOW_TIMEOUT=soon\n").unwrap();
        storyland(&dir)
            .args(["1984", "--select-all"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("WORKFLOW_TIMEOUT"));
    }

    #[test]
    fn test_zero_timeout_flag_is_rejected() {
        let dir = TempDir::new().unwrap();
        storyland(&dir)
            .env("GOOGLE_API_KEY", "test-key")
            .args(["1984", "--select-all", "--timeout", "0"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("--timeout"));
    }
}
