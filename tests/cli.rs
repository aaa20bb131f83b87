use assert_cmd::Command;
use predicates::prelude::*;

fn tubedrop(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("tubedrop").unwrap();
    // Keep the config file inside the test sandbox
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"));
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("tubedrop")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("gui"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn download_without_urls_exits_cleanly_on_empty_input() {
    let dir = tempfile::tempdir().unwrap();
    tubedrop(dir.path())
        .arg("download")
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("No URLs provided."));
}

#[test]
fn rejects_unknown_format() {
    let dir = tempfile::tempdir().unwrap();
    tubedrop(dir.path())
        .args(["download", "--format", "flac", "https://example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn config_show_displays_settings() {
    let dir = tempfile::tempdir().unwrap();
    tubedrop(dir.path())
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Default format"))
        .stdout(predicate::str::contains("Output directory"));
}
