//! Change detection through an external recursive file-event tool (`fswatch`)

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{WatchFilter, RETRY_INTERVAL};
use crate::types::{ChangeEvent, ChangeKind};

/// Follow `tool` forever, restarting it whenever it cannot start or exits
pub async fn run<F>(tool: String, root: PathBuf, filter: WatchFilter, on_change: F)
where
    F: Fn(ChangeEvent) + Send + Sync + 'static,
{
    let mut announced = false;

    loop {
        match follow(&tool, &root, &filter, &on_change).await {
            Ok(()) => debug!("{} exited, restarting", tool),
            Err(e) if !announced => {
                info!("{} unavailable ({}), relying on polling", tool, e);
                announced = true;
            }
            Err(e) => debug!("{} failed: {}", tool, e),
        }
        sleep(RETRY_INTERVAL).await;
    }
}

async fn follow<F>(
    tool: &str,
    root: &Path,
    filter: &WatchFilter,
    on_change: &F,
) -> io::Result<()>
where
    F: Fn(ChangeEvent),
{
    let mut child = Command::new(tool)
        .args(["-r", "--event=Created", "--event=Updated", "--event=Removed"])
        .arg(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout not captured"))?;
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();

    // Paths are bytes; a name that is not UTF-8 must not end the stream
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if let Some(event) = classify(&String::from_utf8_lossy(&line), filter) {
            on_change(event);
        }
    }

    // Output closed; make sure the tool is gone before it is restarted
    let _ = child.kill().await;
    Ok(())
}

/// Turn one line of tool output into a relevant change, if it is one
fn classify(line: &str, filter: &WatchFilter) -> Option<ChangeEvent> {
    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
    if line.is_empty() {
        return None;
    }

    let path = Path::new(line);
    let rel = filter.relative(path);
    if !filter.accepts(&rel) {
        return None;
    }

    let kind = if path.exists() {
        ChangeKind::Updated
    } else {
        ChangeKind::Removed
    };
    Some(ChangeEvent { path: rel, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn classifies_relative_to_working_directory() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::write(base.join("main.go"), "package main").unwrap();
        let excluded = [PathBuf::from("vendor"), PathBuf::from("src/gen")];
        let filter = WatchFilter::new(&excluded, "go", false).relative_to(dir.path());

        let line = base.join("main.go").display().to_string();
        assert_eq!(
            classify(&line, &filter),
            Some(ChangeEvent {
                path: PathBuf::from("main.go"),
                kind: ChangeKind::Updated,
            })
        );

        let gone = base.join("gone.go").display().to_string();
        assert_eq!(
            classify(&gone, &filter).map(|e| e.kind),
            Some(ChangeKind::Removed)
        );

        let vendored = base.join("vendor/dep.go").display().to_string();
        assert_eq!(classify(&vendored, &filter), None);
        let generated = base.join("src/gen/api.go").display().to_string();
        assert_eq!(classify(&generated, &filter), None);
        let nested = base.join("src/api.go").display().to_string();
        assert_eq!(
            classify(&nested, &filter).map(|e| e.path),
            Some(PathBuf::from("src/api.go"))
        );
        assert_eq!(classify("", &filter), None);
    }

    #[tokio::test]
    async fn missing_tool_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let task = tokio::spawn(run(
            "relaunch-test-no-such-tool".to_string(),
            dir.path().to_path_buf(),
            WatchFilter::new(&[], "go", false).relative_to(dir.path()),
            move |event| sink.lock().unwrap().push(event),
        ));

        sleep(Duration::from_millis(1200)).await;
        assert!(!task.is_finished());
        task.abort();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restarts_tool_after_exit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let tool = root.join(".fake-fswatch");
        std::fs::write(
            &tool,
            "#!/bin/sh\nfor last; do :; done\necho \"$last/main.go\"\necho \"$last/.main.go.swp\"\necho \"$last/README.md\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let task = tokio::spawn(run(
            tool.display().to_string(),
            root.clone(),
            WatchFilter::new(&[], "go", false).relative_to(&root),
            move |event: ChangeEvent| sink.lock().unwrap().push(event.path),
        ));

        sleep(Duration::from_millis(1300)).await;
        task.abort();

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 2, "tool was not restarted: {:?}", seen);
        assert!(seen.iter().all(|path| path == Path::new("main.go")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_line_keeps_the_stream_alive() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let tool = root.join(".fake-fswatch");
        std::fs::write(
            &tool,
            "#!/bin/sh\nfor last; do :; done\nprintf '%s/\\377.txt\\n' \"$last\"\necho \"$last/main.go\"\nexec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let task = tokio::spawn(run(
            tool.display().to_string(),
            root.clone(),
            WatchFilter::new(&[], "go", false).relative_to(&root),
            move |event: ChangeEvent| sink.lock().unwrap().push(event.path),
        ));

        sleep(Duration::from_millis(400)).await;
        task.abort();

        assert_eq!(*seen.lock().unwrap(), vec![PathBuf::from("main.go")]);
    }
}
