//! Upload root watcher.
//!
//! Announces files that land in the upload root by any other route, such as an
//! external SFTP daemon chrooted into it. Events go through the same
//! [`UploadNotifier`] the in-process sessions use.
//!
//! A file is announced when a writer closes it or when it is moved into the
//! tree. Dotfiles are skipped, which covers files claimed by the storage worker.

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};

use crate::notifier::{FileLanded, UploadNotifier};

const UNKNOWN_USER: &str = "unknown";

/// Keeps the watch alive. Dropping it stops watching and releases the notifier.
pub struct UploadWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl UploadWatcher {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Watch `upload_root` recursively and notify for every landed file.
pub fn watch_uploads(upload_root: &Path, notifier: UploadNotifier) -> notify::Result<UploadWatcher> {
    let root = upload_root.canonicalize()?;
    let handler_root = root.clone();

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
        Ok(event) => {
            for path in landed_paths(&event) {
                if let Some(landed) = landed_file(&handler_root, path) {
                    tracing::info!(path = %landed.path, username = %landed.username, size = landed.size, "Detected landed file");
                    notifier.notify(landed);
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "Upload watcher error"),
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    tracing::info!(root = %root.display(), "Watching upload root");
    Ok(UploadWatcher {
        root,
        _watcher: watcher,
    })
}

/// Paths an event reports as finished files.
fn landed_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write))
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.as_slice(),
        _ => &[],
    }
}

/// Build the event for `path`, or `None` if it should not be announced.
///
/// The owner is the first directory under the root; files directly in the root
/// belong to `unknown`.
fn landed_file(root: &Path, path: &Path) -> Option<FileLanded> {
    let relative = path.strip_prefix(root).ok()?;
    let hidden = relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => true,
    });
    if hidden {
        return None;
    }

    let metadata = std::fs::symlink_metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }

    let mut components = relative.components();
    let first = components.next()?;
    let username = match components.next() {
        Some(_) => first.as_os_str().to_string_lossy().into_owned(),
        None => UNKNOWN_USER.to_string(),
    };

    Some(FileLanded::now(
        path.display().to_string(),
        metadata.len(),
        username,
    ))
}
