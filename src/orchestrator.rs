//! The rebuild loop: cancel, kill, build, relaunch

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::builder::Builder;
use crate::supervisor::Supervisor;

/// How a build/run cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A newer change superseded this cycle
    Cancelled,
    /// The compiler reported an error; nothing is running
    Failed,
    /// The binary was built but could not be started
    SpawnFailed,
    /// The binary is running with this pid
    Started(Option<u32>),
}

/// Serializes rebuilds and decides when the supervised process restarts.
///
/// Every trigger cancels the build in flight and queues a new cycle behind
/// the build lock, so only the most recent change ever runs to completion.
pub struct Orchestrator {
    builder: Builder,
    supervisor: Arc<Supervisor>,
    build_lock: tokio::sync::Mutex<()>,
    // Token of the most recently queued cycle
    current: Mutex<CancellationToken>,
    stopping: AtomicBool,
}

impl Orchestrator {
    pub fn new(builder: Builder, supervisor: Arc<Supervisor>) -> Self {
        Self {
            builder,
            supervisor,
            build_lock: tokio::sync::Mutex::new(()),
            current: Mutex::new(CancellationToken::new()),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// React to a change without blocking the caller
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<CycleOutcome> {
        let cancel = self.supersede();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.cycle(cancel).await })
    }

    /// Run a cycle to completion; used for the unconditional startup build
    pub async fn rebuild(&self) -> CycleOutcome {
        let cancel = self.supersede();
        self.cycle(cancel).await
    }

    /// Cancel the build in flight, wait for it to die and stop the program.
    ///
    /// No cycle starts a build or a program after this has been called.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.supersede();
        let _guard = self.build_lock.lock().await;
        self.supervisor.kill().await;
    }

    // Cancel whatever is queued or building and issue the token for the next cycle
    fn supersede(&self) -> CancellationToken {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    async fn cycle(&self, cancel: CancellationToken) -> CycleOutcome {
        let _guard = self.build_lock.lock().await;
        if cancel.is_cancelled() || self.stopping.load(Ordering::SeqCst) {
            debug!("Skipping superseded build");
            return CycleOutcome::Cancelled;
        }

        self.supervisor.kill().await;

        info!("Building...");
        let result = self.builder.build(&cancel).await;

        if result.cancelled {
            warn!("Build canceled");
            return CycleOutcome::Cancelled;
        }
        if !result.success {
            error!("Build failed");
            let text = result.output_text();
            if text.ends_with('\n') {
                print!("{}", text);
            } else {
                println!("{}", text);
            }
            return CycleOutcome::Failed;
        }

        info!(status = "ok", "Build finished");
        if self.stopping.load(Ordering::SeqCst) {
            return CycleOutcome::Cancelled;
        }
        match self.supervisor.run().await {
            Ok(pid) => CycleOutcome::Started(pid),
            Err(_) => CycleOutcome::SpawnFailed,
        }
    }
}
