//! Keeps a single instance of the built binary running

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// How long a child gets to exit after the interrupt before it is killed
pub const KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// Pause after every `run` so restarts never outpace the child's startup
pub const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Where the supervised child's stdout and stderr go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSink {
    /// Copied to our own stdout
    #[default]
    Stdout,
    /// Dropped
    Discard,
}

enum Instance {
    Absent,
    Running { child: Child, started_at: SystemTime },
}

/// Sole owner of the supervised process.
///
/// Every transition happens under one lock, so `run`, `kill` and the status
/// probes never observe a half-started or half-killed child.
pub struct Supervisor {
    binary: PathBuf,
    args: Vec<String>,
    sink: OutputSink,
    kill_timeout: Duration,
    settle_delay: Duration,
    instance: Mutex<Instance>,
}

impl Supervisor {
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
            sink: OutputSink::default(),
            kill_timeout: KILL_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            instance: Mutex::new(Instance::Absent),
        }
    }

    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Make sure an up-to-date instance is running and return its pid.
    ///
    /// A running instance whose binary changed after it started is replaced.
    /// A live, current instance is left alone.
    pub async fn run(&self) -> Result<Option<u32>> {
        let mut instance = self.instance.lock().await;

        if self.is_stale(&instance) {
            info!("{} changed since start, restarting", self.binary.display());
            self.kill_locked(&mut instance).await;
        }

        let result = match live_pid(&mut instance) {
            Some(pid) => Ok(Some(pid)),
            None => match self.spawn() {
                Ok(child) => {
                    let pid = child.id();
                    debug!("Started {} (pid {:?})", self.binary.display(), pid);
                    *instance = Instance::Running {
                        child,
                        started_at: SystemTime::now(),
                    };
                    Ok(pid)
                }
                Err(e) => {
                    error!("Error running: {}", e);
                    *instance = Instance::Absent;
                    Err(e)
                }
            },
        };

        sleep(self.settle_delay).await;
        result
    }

    /// Stop the running instance, if any.
    ///
    /// Sends an interrupt first and kills after [`KILL_TIMEOUT`]. When this
    /// returns no instance is owned, whether or not the child could be killed.
    pub async fn kill(&self) {
        let mut instance = self.instance.lock().await;
        self.kill_locked(&mut instance).await;
    }

    /// Pid of the live instance
    pub async fn pid(&self) -> Option<u32> {
        let mut instance = self.instance.lock().await;
        live_pid(&mut instance)
    }

    pub async fn is_running(&self) -> bool {
        self.pid().await.is_some()
    }

    fn is_stale(&self, instance: &Instance) -> bool {
        let Instance::Running { started_at, .. } = instance else {
            return false;
        };
        std::fs::metadata(&self.binary)
            .and_then(|metadata| metadata.modified())
            .is_ok_and(|modified| modified > *started_at)
    }

    async fn kill_locked(&self, instance: &mut Instance) {
        let Instance::Running { mut child, .. } = std::mem::replace(instance, Instance::Absent)
        else {
            return;
        };
        if has_exited(&mut child) {
            return;
        }

        if let Err(e) = interrupt(&mut child) {
            warn!("Failed to interrupt {}: {}", self.binary.display(), e);
        }

        match timeout(self.kill_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("{} stopped: {}", self.binary.display(), status),
            Ok(Err(e)) => warn!("Failed to wait for {}: {}", self.binary.display(), e),
            Err(_) => {
                warn!(
                    "{} still running after {:?}, killing",
                    self.binary.display(),
                    self.kill_timeout
                );
                if let Err(e) = child.start_kill() {
                    error!("failed to kill: {}", e);
                    return;
                }
                // A child stuck in the kernel may never be reaped; give up on it
                if timeout(Duration::from_millis(500), child.wait()).await.is_err() {
                    error!("{} did not die, abandoning it", self.binary.display());
                }
            }
        }
    }

    fn spawn(&self) -> Result<Child> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        match self.sink {
            OutputSink::Stdout => command.stdout(Stdio::piped()).stderr(Stdio::piped()),
            OutputSink::Discard => command.stdout(Stdio::null()).stderr(Stdio::null()),
        };
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: self.binary.clone(),
            source,
        })?;

        if let Some(mut out) = child.stdout.take() {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut out, &mut tokio::io::stdout()).await;
            });
        }
        if let Some(mut err) = child.stderr.take() {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut err, &mut tokio::io::stdout()).await;
            });
        }

        Ok(child)
    }
}

fn live_pid(instance: &mut Instance) -> Option<u32> {
    match instance {
        Instance::Running { child, .. } => {
            if has_exited(child) {
                None
            } else {
                child.id()
            }
        }
        Instance::Absent => None,
    }
}

fn has_exited(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("Process exited: {}", status);
            true
        }
        Ok(None) => false,
        Err(_) => true,
    }
}

// Polite stop request: SIGINT where signals exist, terminate elsewhere
#[cfg(unix)]
fn interrupt(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: kill(2) has no memory-safety preconditions
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}
