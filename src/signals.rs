//! Operator interrupts: stop the build and the supervised child, then exit

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;

/// Exit status used when an operator signal ends the session
pub const SIGNAL_EXIT_CODE: i32 = 1;

/// On Ctrl-C or SIGTERM, stop any build in flight, kill the child and exit
pub fn spawn_listener(orchestrator: Arc<Orchestrator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!("Got signal: {}", signal);
        orchestrator.shutdown().await;
        std::process::exit(SIGNAL_EXIT_CODE);
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            ctrl_c().await;
            return "interrupt";
        }
    };
    tokio::select! {
        _ = ctrl_c() => "interrupt",
        _ = sigterm.recv() => "terminated",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await;
    "interrupt"
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
