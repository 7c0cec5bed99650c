use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn help_lists_watch_options() {
    Command::cargo_bin("relaunch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--exclude-dir"))
        .stdout(predicate::str::contains("--build-args"))
        .stdout(predicate::str::contains("--all"));
}

#[test]
fn prints_version() {
    Command::cargo_bin("relaunch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("relaunch "));
}

#[test]
fn malformed_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("relaunch.yaml"), "exclude_dirs: [unterminated\n").unwrap();

    Command::cargo_bin("relaunch")
        .unwrap()
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config file"));
}

#[test]
fn missing_explicit_config_is_rejected() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("relaunch")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", "other.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn unbalanced_build_args_are_rejected() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("relaunch")
        .unwrap()
        .current_dir(dir.path())
        .args(["--build-args", "-ldflags '-s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid build arguments"));
}

#[cfg(unix)]
mod session {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::process::{Child, Stdio};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    // Builds a program that records its pid and then idles
    const COMPILER: &str = r#"#!/bin/sh
dir=$(dirname "$3")
printf '#!/bin/sh\necho $$ > "%s/pid"\nexec sleep 30\n' "$dir" > "$3"
chmod +x "$3"
"#;

    // Records its pid, then takes long enough to be interrupted
    const SLOW_COMPILER: &str = r#"#!/bin/sh
dir=$(dirname "$3")
echo $$ > "$dir/compiler.pid"
sleep 3
touch "$dir/late"
"#;

    fn read_pid(dir: &Path) -> Option<u32> {
        read_pid_file(&dir.join("pid"))
    }

    fn read_pid_file(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }

    fn wait_for_pid(dir: &Path, not: Option<u32>) -> u32 {
        let deadline = Instant::now() + Duration::from_secs(15);
        while Instant::now() < deadline {
            if let Some(pid) = read_pid(dir) {
                if Some(pid) != not {
                    return pid;
                }
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        panic!("program was not (re)started");
    }

    fn is_alive(pid: u32) -> bool {
        // SAFETY: signal 0 only checks for existence
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    fn start(dir: &Path, script: &str) -> Child {
        let compiler = dir.join("compiler");
        std::fs::write(&compiler, script).unwrap();
        std::fs::set_permissions(&compiler, std::fs::Permissions::from_mode(0o755)).unwrap();

        std::process::Command::new(assert_cmd::cargo::cargo_bin("relaunch"))
            .current_dir(dir)
            .args(["--compiler", &compiler.display().to_string()])
            .args(["--native-watcher", "relaunch-test-no-such-tool"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[test]
    fn rebuilds_on_change_and_stops_child_on_sigterm() {
        let dir = TempDir::new().unwrap();
        let mut relaunch = start(dir.path(), COMPILER);

        let first = wait_for_pid(dir.path(), None);
        assert!(is_alive(first));

        // Let the startup cycle settle and the watchers arm
        std::thread::sleep(Duration::from_millis(800));
        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();

        let second = wait_for_pid(dir.path(), Some(first));
        assert!(is_alive(second));
        assert!(!is_alive(first));

        // SAFETY: plain signal delivery to our own child
        unsafe {
            libc::kill(relaunch.id() as libc::pid_t, libc::SIGTERM);
        }
        let status = relaunch.wait().unwrap();
        assert_eq!(status.code(), Some(1));
        assert!(!is_alive(second));
    }

    #[test]
    fn sigterm_during_build_kills_the_compiler() {
        let dir = TempDir::new().unwrap();
        let mut relaunch = start(dir.path(), SLOW_COMPILER);

        let pid_file = dir.path().join("compiler.pid");
        let deadline = Instant::now() + Duration::from_secs(10);
        let compiler = loop {
            if let Some(pid) = read_pid_file(&pid_file) {
                break pid;
            }
            assert!(Instant::now() < deadline, "compiler never started");
            std::thread::sleep(Duration::from_millis(20));
        };
        // Give the signal listener time to install its handlers
        std::thread::sleep(Duration::from_millis(300));

        // SAFETY: plain signal delivery to our own child
        unsafe {
            libc::kill(relaunch.id() as libc::pid_t, libc::SIGTERM);
        }
        let status = relaunch.wait().unwrap();
        assert_eq!(status.code(), Some(1));
        assert!(!is_alive(compiler));

        std::thread::sleep(Duration::from_millis(3500));
        assert!(!dir.path().join("late").exists());
        assert!(!dir.path().join(".relaunch").exists());
    }
}
