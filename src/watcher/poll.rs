//! Polling fallback: periodic modification-time sweeps of the tree

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::time::sleep;
use tracing::warn;
use walkdir::WalkDir;

use super::{WatchFilter, POLL_INTERVAL};
use crate::types::{ChangeEvent, ChangeKind};

/// Sweep `root` forever, reporting at most one change per sweep.
///
/// The cursor moves to the time of detection after every reported change,
/// so a file is reported again only after it is modified again.
pub async fn run<F>(root: PathBuf, filter: WatchFilter, on_change: F)
where
    F: Fn(ChangeEvent) + Send + Sync + 'static,
{
    let mut cursor = SystemTime::now();

    loop {
        let sweep_root = root.clone();
        let sweep_filter = filter.clone();
        let since = cursor;
        let found =
            tokio::task::spawn_blocking(move || scan(&sweep_root, &sweep_filter, since)).await;

        match found {
            Ok(Some(event)) => {
                on_change(event);
                cursor = SystemTime::now();
            }
            Ok(None) => {}
            Err(e) => warn!("Polling sweep of {} failed: {}", root.display(), e),
        }

        sleep(POLL_INTERVAL).await;
    }
}

/// First relevant file under `root` modified after `since`
pub fn scan(root: &Path, filter: &WatchFilter, since: SystemTime) -> Option<ChangeEvent> {
    let entries = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !filter.is_excluded_dir(&filter.relative(entry.path()))
    });

    for entry in entries.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = filter.relative(entry.path());
        if !filter.accepts(&rel) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified <= since {
            continue;
        }

        let kind = match metadata.created() {
            Ok(created) if created > since => ChangeKind::Created,
            _ => ChangeKind::Updated,
        };
        return Some(ChangeEvent { path: rel, kind });
    }

    None
}
