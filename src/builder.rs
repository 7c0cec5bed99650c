//! Compiles the watched sources into the supervised binary

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{BuildResult, BuildSpec};

/// Runs `<compiler> build -o <output> [extra args...] <source>`
#[derive(Debug, Clone)]
pub struct Builder {
    compiler: String,
    spec: BuildSpec,
}

impl Builder {
    pub fn new(compiler: impl Into<String>, spec: BuildSpec) -> Self {
        Self {
            compiler: compiler.into(),
            spec,
        }
    }

    fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "build".into(),
            "-o".into(),
            self.spec.output.clone().into_os_string(),
        ];
        args.extend(self.spec.extra_args.iter().map(OsString::from));
        args.push(self.spec.source.clone().into_os_string());
        args
    }

    /// Run one build.
    ///
    /// Returns as soon as `cancel` fires, after the compiler and everything it
    /// started have been killed. The captured output of a cancelled build is
    /// dropped.
    pub async fn build(&self, cancel: &CancellationToken) -> BuildResult {
        if cancel.is_cancelled() {
            return BuildResult::cancelled();
        }

        let mut command = Command::new(&self.compiler);
        command
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        debug!("{} {:?}", self.compiler, self.args());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return BuildResult::failed(
                    format!("failed to start {}: {}\n", self.compiler, e).into_bytes(),
                )
            }
        };

        let combined = Arc::new(Mutex::new(Vec::new()));
        let readers: Vec<_> = [
            child.stdout.take().map(|out| tokio::spawn(capture(out, Arc::clone(&combined)))),
            child.stderr.take().map(|err| tokio::spawn(capture(err, Arc::clone(&combined)))),
        ]
        .into_iter()
        .flatten()
        .collect();

        tokio::select! {
            _ = cancel.cancelled() => {
                kill_group(&mut child).await;
                for reader in readers {
                    reader.abort();
                }
                BuildResult::cancelled()
            }
            status = child.wait() => {
                for reader in readers {
                    let _ = reader.await;
                }
                let mut output = std::mem::take(
                    &mut *combined.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
                );
                match status {
                    Ok(status) if status.success() => BuildResult::succeeded(output),
                    Ok(status) => {
                        output.extend_from_slice(status.to_string().as_bytes());
                        BuildResult::failed(output)
                    }
                    Err(e) => {
                        output.extend_from_slice(e.to_string().as_bytes());
                        BuildResult::failed(output)
                    }
                }
            }
        }
    }
}

// Copy one stream into the shared buffer until it closes
async fn capture<R>(mut reader: R, combined: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut buffer = combined.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                buffer.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

// Compilers fork helpers of their own; take the whole group down
async fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill(2) has no memory-safety preconditions
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    if let Err(e) = child.kill().await {
        debug!("Failed to kill build: {}", e);
    }
}
