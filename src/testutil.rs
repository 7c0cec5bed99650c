//! Helpers for process tests

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script into `dir`
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// The pid exists and has not been reaped
pub fn is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
