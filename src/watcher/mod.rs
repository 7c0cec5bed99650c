//! Source tree monitoring
//!
//! Two strategies run side by side and feed the same debounced trigger:
//! - [`native`] follows an external recursive file-event tool and restarts it
//!   whenever it is missing or exits
//! - [`poll`] walks the tree on a fixed interval comparing modification times
//!
//! Neither strategy knows about the other. A change seen by both simply
//! triggers twice, which the debouncer and the orchestrator absorb.

pub mod native;
pub mod poll;

use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::debounce::Debouncer;
use crate::types::ChangeEvent;

/// Version control metadata directory, never watched
pub const VCS_DIR: &str = ".git";

/// Delay before restarting the native tool
pub const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between polling sweeps
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Decides which paths are relevant for a rebuild.
///
/// Excluded directories are relative to the working directory and match
/// whole path components: `vendor` covers `vendor/x.go` but not
/// `vendored/x.go`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFilter {
    base: PathBuf,
    // Resolved form of `base`; file-event tools report real paths
    canonical_base: Option<PathBuf>,
    exclude_dirs: Vec<PathBuf>,
    extension: String,
    all_files: bool,
}

impl WatchFilter {
    pub fn new(exclude_dirs: &[PathBuf], extension: &str, all_files: bool) -> Self {
        Self {
            exclude_dirs: exclude_dirs
                .iter()
                .map(|dir| normalize(dir))
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect(),
            extension: extension.trim_start_matches('.').to_string(),
            all_files,
            base: PathBuf::new(),
            canonical_base: None,
        }
    }

    /// Resolve reported paths against `base`, normally the working directory
    pub fn relative_to(mut self, base: &Path) -> Self {
        self.canonical_base = std::fs::canonicalize(base).ok();
        self.base = base.to_path_buf();
        self
    }

    pub fn from_config(config: &Config, wd: &Path) -> Self {
        Self::new(&config.exclude_dirs, &config.extension, config.all).relative_to(wd)
    }

    /// Path as the exclusion rules see it: relative to the base when it
    /// lies under it, without `.` components
    pub fn relative(&self, path: &Path) -> PathBuf {
        let rel = [Some(&self.base), self.canonical_base.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|base| path.strip_prefix(base).ok())
            .unwrap_or(path);
        normalize(rel)
    }

    /// Directory the walker should not descend into. `rel` comes from
    /// [`WatchFilter::relative`].
    pub fn is_excluded_dir(&self, rel: &Path) -> bool {
        let rel = normalize(rel);
        rel.components().any(|c| c.as_os_str() == VCS_DIR)
            || self.exclude_dirs.iter().any(|dir| rel.starts_with(dir))
    }

    /// Whether a change to this file should trigger a rebuild. `rel` comes
    /// from [`WatchFilter::relative`].
    pub fn accepts(&self, rel: &Path) -> bool {
        if self.is_excluded_dir(rel) {
            return false;
        }
        if is_hidden(rel) {
            return false;
        }
        self.all_files || rel.extension().is_some_and(|ext| ext == self.extension.as_str())
    }
}

/// Name starts with a dot
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

// Drops `.` components so `./vendor` and `vendor` compare equal
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Running watch strategies. Dropping the handle does not stop them; call
/// [`WatchHandle::abort`].
pub struct WatchHandle {
    native: JoinHandle<()>,
    poll: JoinHandle<()>,
}

impl WatchHandle {
    pub fn abort(&self) {
        self.native.abort();
        self.poll.abort();
    }

    /// Wait for both strategies. They only end when aborted.
    pub async fn join(self) {
        let _ = tokio::join!(self.native, self.poll);
    }
}

/// Start both strategies on `root`, calling `debouncer` for every relevant change
pub fn start(
    root: &Path,
    filter: WatchFilter,
    native_tool: &str,
    debouncer: Debouncer,
) -> WatchHandle {
    let on_change = move |event: ChangeEvent| {
        debug!("{:?} {}", event.kind, event.path.display());
        debouncer.call();
    };

    let native = tokio::spawn(native::run(
        native_tool.to_string(),
        root.to_path_buf(),
        filter.clone(),
        on_change.clone(),
    ));
    let poll = tokio::spawn(poll::run(root.to_path_buf(), filter, on_change));

    WatchHandle { native, poll }
}
