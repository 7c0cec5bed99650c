//! Watch, rebuild and relaunch until interrupted

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::builder::Builder;
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::orchestrator::Orchestrator;
use crate::signals;
use crate::supervisor::Supervisor;
use crate::watcher::{self, WatchFilter};

/// Run a watch session. Only returns on setup errors; the session itself
/// ends through the signal listener.
pub async fn run(config: Config) -> Result<()> {
    let wd = std::env::current_dir().context("Failed to read working directory")?;
    let spec = config.build_spec(&wd)?;
    debug!("{:?}", spec);

    let builder = Builder::new(config.compiler.clone(), spec);
    let supervisor = Arc::new(Supervisor::new(
        config.binary_path(&wd),
        config.run_args.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(builder, supervisor));
    signals::spawn_listener(Arc::clone(&orchestrator));

    orchestrator.rebuild().await;

    info!("Watching {}", config.path.display());
    let target = Arc::clone(&orchestrator);
    let debouncer = Debouncer::new(
        Arc::new(move || {
            target.trigger();
        }),
        config.debounce(),
    );
    let watch = watcher::start(
        &config.path,
        WatchFilter::from_config(&config, &wd),
        &config.native_watcher,
        debouncer,
    );
    watch.join().await;

    Ok(())
}
