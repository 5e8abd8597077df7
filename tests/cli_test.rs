//! CLI argument parsing tests
//!
//! These verify the command surface without touching a browser.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get the tabdriver binary command
fn tabdriver() -> Command {
    Command::cargo_bin("tabdriver").unwrap()
}

mod help {
    use super::*;

    #[test]
    fn shows_help() {
        tabdriver()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("tabdriver"))
            .stdout(predicate::str::contains("browser tab driver"));
    }

    #[test]
    fn shows_version() {
        tabdriver()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("tabdriver"));
    }

    #[test]
    fn rejects_unknown_subcommand() {
        tabdriver().arg("teleport").assert().failure();
    }
}

mod browser_command {
    use super::*;

    #[test]
    fn browser_help_lists_tab_operations() {
        tabdriver()
            .args(["browser", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("open"))
            .stdout(predicate::str::contains("tabs"))
            .stdout(predicate::str::contains("close-tab"))
            .stdout(predicate::str::contains("act"))
            .stdout(predicate::str::contains("download"));
    }

    #[test]
    fn open_requires_url() {
        tabdriver()
            .args(["browser", "open"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("URL"));
    }

    #[test]
    fn act_requires_target_and_action() {
        tabdriver().args(["browser", "act"]).assert().failure();

        tabdriver()
            .args(["browser", "act", "TARGET1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("ACTION"));
    }

    #[test]
    fn screenshot_has_default_path() {
        tabdriver()
            .args(["browser", "screenshot", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("screenshot.png"));
    }

    #[test]
    fn console_accepts_level_filter() {
        tabdriver()
            .args(["browser", "console", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--level"))
            .stdout(predicate::str::contains("--clear"));
    }

    #[test]
    fn upload_requires_at_least_one_file() {
        tabdriver()
            .args(["browser", "upload", "TARGET1"])
            .assert()
            .failure();
    }
}

mod workflow_command {
    use super::*;

    #[test]
    fn workflow_help_lists_examples() {
        tabdriver()
            .args(["workflow", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("price-check"))
            .stdout(predicate::str::contains("news-headlines"))
            .stdout(predicate::str::contains("screenshot-doc"))
            .stdout(predicate::str::contains("form-fill"));
    }

    #[test]
    fn news_headlines_limit_has_default() {
        tabdriver()
            .args(["workflow", "news-headlines", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[default: 10]"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn config_path_prints_a_path() {
        tabdriver()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_help_lists_operations() {
        tabdriver()
            .args(["config", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("show"))
            .stdout(predicate::str::contains("set"))
            .stdout(predicate::str::contains("get"));
    }
}
