use assert_cmd::Command;
use predicates::prelude::*;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ac-launcher-cli-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("launcher.yaml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn requires_a_subcommand() {
    let mut command = Command::cargo_bin("ac-launcher").unwrap();

    command.assert().failure();
}

#[test]
fn fails_on_missing_config_file() {
    let mut command = Command::cargo_bin("ac-launcher").unwrap();

    command
        .arg("-c")
        .arg("foobar.yaml")
        .arg("probe")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Could not find config file foobar.yaml",
        ));
}

#[test]
fn fails_on_invalid_task_delay() {
    let dir = scratch_dir("delay");
    let config = write_config(
        &dir,
        r#"
game:
  client_path: acclient.exe
servers:
  - id: local
    name: Local
    host: 127.0.0.1
    port: 9000
accounts:
  - username: alice
    password: pw
tasks:
  - server: local
    account: alice
    order: 1
    delay_seconds: 45
"#,
    );

    let mut command = Command::cargo_bin("ac-launcher").unwrap();

    command
        .arg("-c")
        .arg(&config)
        .arg("sequence")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot exceed 30 seconds"));
}

#[test]
fn sequence_refuses_to_start_without_multi_client() {
    let dir = scratch_dir("multi");
    let config = write_config(
        &dir,
        r#"
game:
  client_path: acclient.exe
  multi_client: false
servers:
  - id: local
    name: Local
    host: 127.0.0.1
    port: 9000
accounts:
  - username: alice
    password: pw
  - username: bob
    password: pw
tasks:
  - server: local
    account: alice
    order: 1
  - server: local
    account: bob
    order: 2
"#,
    );

    let mut command = Command::cargo_bin("ac-launcher").unwrap();

    command
        .arg("-c")
        .arg(&config)
        .arg("sequence")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Multi-client mode is disabled"));
}

#[test]
fn probe_reports_online_server() {
    let responder = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = responder.local_addr().unwrap().port();

    thread::spawn(move || {
        let mut buf = [0u8; 512];
        if let Ok((_, peer)) = responder.recv_from(&mut buf) {
            let _ = responder.send_to(&[0u8; 24], peer);
        }
    });

    let dir = scratch_dir("probe");
    let config = write_config(
        &dir,
        &format!(
            r#"
game:
  client_path: acclient.exe
servers:
  - id: local
    name: Local Test
    host: 127.0.0.1
    port: {}
"#,
            port
        ),
    );

    let mut command = Command::cargo_bin("ac-launcher").unwrap();

    command
        .arg("-c")
        .arg(&config)
        .arg("probe")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "Local Test (127.0.0.1:{}): online",
            port
        )));
}

#[test]
fn reply_timeout_marks_silent_server_offline() {
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = silent.local_addr().unwrap().port();

    let dir = scratch_dir("timeout");
    let config = write_config(
        &dir,
        &format!(
            r#"
game:
  client_path: acclient.exe
servers:
  - id: quiet
    name: Quiet
    host: 127.0.0.1
    port: {}
"#,
            port
        ),
    );

    let mut command = Command::cargo_bin("ac-launcher").unwrap();
    let started = Instant::now();

    command
        .arg("-c")
        .arg(&config)
        .arg("probe")
        .arg("--timeout")
        .arg("1")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "Quiet (127.0.0.1:{}): offline",
            port
        )));

    assert!(started.elapsed() < Duration::from_millis(2900));
    drop(silent);
}

#[test]
fn probe_rejects_unknown_server() {
    let dir = scratch_dir("unknown");
    let config = write_config(
        &dir,
        r#"
game:
  client_path: acclient.exe
servers:
  - id: local
    name: Local
    host: 127.0.0.1
    port: 9000
"#,
    );

    let mut command = Command::cargo_bin("ac-launcher").unwrap();

    command
        .arg("-c")
        .arg(&config)
        .arg("probe")
        .arg("--server")
        .arg("elsewhere")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown server elsewhere"));
}
