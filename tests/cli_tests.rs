use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::sync::Once;

static INIT: Once = Once::new();

/// Setup function that runs once for all tests
fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// sshbook with every file it touches inside `temp`
fn sshbook(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sshbook").unwrap();
    cmd.env("HOME", temp.path())
        .env("USER", "alice")
        .env_remove("SSHBOOK_LOG")
        .arg("--config")
        .arg(temp.child("ssh_config").path())
        .arg("--keychain")
        .arg(temp.child("keychain").path())
        .arg("--backup-dir")
        .arg(temp.child("backup").path())
        .arg("--settings")
        .arg(temp.child("settings.toml").path());
    cmd
}

fn add_web(temp: &TempDir) {
    sshbook(temp)
        .args(["add", "web", "--hostname", "10.0.0.5", "--user", "deploy", "--port", "2222"])
        .arg("--non-interactive")
        .assert()
        .success()
        .stdout(predicate::str::contains("added successfully"));
}

#[test]
fn test_cli_version() {
    setup();
    let mut cmd = Command::cargo_bin("sshbook").unwrap();
    cmd.arg("--version");
    cmd.assert().success().stdout(predicate::str::contains("sshbook"));
}

#[test]
fn test_cli_help() {
    setup();
    let mut cmd = Command::cargo_bin("sshbook").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("SSH connection manager"));
}

#[test]
fn test_cli_list_empty() {
    setup();
    let temp = TempDir::new().unwrap();

    sshbook(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No hosts found"));

    temp.child("keychain").assert(predicate::path::exists());
}

#[test]
fn test_cli_add_non_interactive() {
    setup();
    let temp = TempDir::new().unwrap();
    add_web(&temp);

    temp.child("ssh_config").assert(predicate::str::contains("Host web"));
    temp.child("ssh_config")
        .assert(predicate::str::contains("HostName 10.0.0.5"));
    temp.child("ssh_config").assert(predicate::str::contains("Port 2222"));

    sshbook(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("web"))
        .stdout(predicate::str::contains("10.0.0.5"))
        .stdout(predicate::str::contains("deploy"));
}

#[test]
fn test_cli_add_keeps_hand_written_content() {
    setup();
    let temp = TempDir::new().unwrap();
    temp.child("ssh_config")
        .write_str("# work machines\nHost *.corp\n    User me\n\nHost old\n    HostName 10.9.9.9\n    Compression yes\n")
        .unwrap();

    sshbook(&temp)
        .args(["add", "old", "--hostname", "10.9.9.10", "--non-interactive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("updated successfully"));

    temp.child("ssh_config").assert(
        "# work machines\nHost *.corp\n    User me\n\nHost old\n    HostName 10.9.9.10\n    Compression yes\n",
    );
}

#[test]
fn test_cli_add_requires_hostname() {
    setup();
    let temp = TempDir::new().unwrap();

    sshbook(&temp)
        .args(["add", "web", "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hostname is required"));
}

#[test]
fn test_cli_password_is_stored() {
    setup();
    let temp = TempDir::new().unwrap();

    sshbook(&temp)
        .args(["add", "web", "--hostname", "10.0.0.5", "--password-stdin", "--non-interactive"])
        .write_stdin("hunter2\n")
        .assert()
        .success();

    temp.child("keychain").assert(predicate::str::contains("\"hunter2\""));

    sshbook(&temp)
        .args(["show", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Password"))
        .stdout(predicate::str::contains("stored"));
}

#[test]
fn test_cli_remove() {
    setup();
    let temp = TempDir::new().unwrap();
    add_web(&temp);

    sshbook(&temp)
        .args(["remove", "web", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed successfully"));

    sshbook(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No hosts found"));

    sshbook(&temp)
        .args(["show", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("host not found"));
}

#[test]
fn test_cli_unknown_host() {
    setup();
    let temp = TempDir::new().unwrap();

    sshbook(&temp)
        .args(["to", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("host not found"));
}

#[test]
fn test_cli_targets_required_without_terminal() {
    setup();
    let temp = TempDir::new().unwrap();
    add_web(&temp);

    sshbook(&temp)
        .arg("to")
        .assert()
        .failure()
        .stderr(predicate::str::contains("alias is required"));

    sshbook(&temp)
        .args(["at", "--", "uptime"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one alias is required"));

    sshbook(&temp)
        .args(["at", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("a command is required"));
}

#[cfg(unix)]
#[test]
fn test_cli_empty_port_uses_default() {
    setup();
    let temp = TempDir::new().unwrap();

    sshbook(&temp)
        .args(["add", "web", "--hostname", "10.0.0.5", "--user", "deploy", "--port", "", "--non-interactive"])
        .assert()
        .success();

    temp.child("ssh_config").assert("Host web\n    HostName 10.0.0.5\n    User deploy\n");

    sshbook(&temp)
        .args(["--ssh-bin", "echo", "to", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-p 22 deploy@10.0.0.5"));
}

#[cfg(unix)]
#[test]
fn test_cli_to_runs_ssh() {
    setup();
    let temp = TempDir::new().unwrap();
    add_web(&temp);

    sshbook(&temp)
        .args(["--ssh-bin", "echo", "to", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-p 2222 deploy@10.0.0.5"));
}

#[cfg(unix)]
#[test]
fn test_cli_at_reports_each_host() {
    setup();
    let temp = TempDir::new().unwrap();
    add_web(&temp);

    sshbook(&temp)
        .args(["--ssh-bin", "echo", "at", "web", "missing", "--", "uptime", "-p"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("deploy@10.0.0.5 uptime -p"))
        .stderr(predicate::str::contains("missing: host not found"))
        .stderr(predicate::str::contains("1 of 2 hosts failed"));
}

#[cfg(unix)]
#[test]
fn test_cli_transfer_upload() {
    setup();
    let temp = TempDir::new().unwrap();
    add_web(&temp);
    let source = temp.child("notes.txt");
    source.write_str("hello").unwrap();

    sshbook(&temp)
        .args(["--scp-bin", "echo", "transfer", "web"])
        .arg(source.path())
        .args(["/srv/in", "--upload"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy@10.0.0.5:/srv/in"));

    sshbook(&temp)
        .args(["--scp-bin", "echo", "transfer", "web", "/no/such/file", "/srv/in", "--upload"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("source file not found"));
}

#[test]
fn test_cli_encrypt_locks_keychain() {
    setup();
    let temp = TempDir::new().unwrap();

    sshbook(&temp)
        .args(["add", "web", "--hostname", "10.0.0.5", "--password-stdin", "--non-interactive"])
        .write_stdin("hunter2\n")
        .assert()
        .success();

    sshbook(&temp)
        .args(["encrypt", "--password-stdin"])
        .write_stdin("master\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Keychain encrypted"));

    temp.child("keychain")
        .assert(predicate::str::contains("hunter2").not());

    sshbook(&temp)
        .args(["show", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("locked"));

    sshbook(&temp)
        .args(["add", "db", "--hostname", "db", "--password-stdin", "--non-interactive"])
        .write_stdin("pw\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("password required"));

    sshbook(&temp)
        .args(["encrypt", "--password-stdin"])
        .write_stdin("again\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already encrypted"));
}

#[test]
fn test_cli_backup_and_restore() {
    setup();
    let temp = TempDir::new().unwrap();
    add_web(&temp);

    sshbook(&temp)
        .arg("backup")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup written to"));

    let archive = std::fs::read_dir(temp.child("backup").path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| path.extension().is_some_and(|ext| ext == "tgz"))
        .unwrap();

    sshbook(&temp)
        .args(["remove", "web", "--yes"])
        .assert()
        .success();

    sshbook(&temp)
        .arg("restore")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored"));

    temp.child("ssh_config.bak").assert(predicate::path::exists());
    sshbook(&temp)
        .arg("completions")
        .assert()
        .success()
        .stdout("web\n");
}
