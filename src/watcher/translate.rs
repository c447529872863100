//! Raw filesystem changes → semantic collection events.
//!
//! # Responsibilities
//! - Keep the finder's descriptor map in step with manifest changes
//! - Resolve changed files to their owning collection
//! - Invalidate cached logic modules before any event is signaled
//!
//! # Design Decisions
//! - A changed manifest retires the old identity first (`Removed`), then
//!   announces the new one (`Added`), since the name may have changed
//! - A manifest that no longer parses keeps the previous descriptor registered

use std::path::{Path, PathBuf};
use std::sync::Arc;
use notify::event::{EventKind, ModifyKind};

use crate::collections::{CollectionsFinder, Descriptor, ModuleResolver};
use crate::events::WatchEvent;

/// Normalized kind of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsChange {
    Created,
    Modified,
    Removed,
}

/// Map a notify event onto `(change, path)` pairs.
pub fn classify(event: &notify::Event) -> Vec<(FsChange, PathBuf)> {
    event
        .paths
        .iter()
        .filter_map(|path| {
            let change = match event.kind {
                EventKind::Create(_) => FsChange::Created,
                EventKind::Remove(_) => FsChange::Removed,
                EventKind::Access(_) | EventKind::Other => return None,
                _ if !path.exists() => FsChange::Removed,
                EventKind::Modify(ModifyKind::Name(_)) => FsChange::Created,
                _ => FsChange::Modified,
            };
            Some((change, path.clone()))
        })
        .collect()
}

/// Translates changes for one watch root. Shared by both logical watches.
#[derive(Clone)]
pub struct Translator {
    finder: Arc<CollectionsFinder>,
    resolver: Arc<dyn ModuleResolver>,
}

impl Translator {
    pub fn new(finder: Arc<CollectionsFinder>, resolver: Arc<dyn ModuleResolver>) -> Self {
        Self { finder, resolver }
    }

    /// Translate a change seen by the manifest watch.
    pub fn manifest(&self, change: FsChange, path: &Path) -> Vec<WatchEvent> {
        if !self.finder.is_manifest(path) {
            return Vec::new();
        }

        let known = self.known_manifest(path);
        match (change, known) {
            (FsChange::Created | FsChange::Modified, Some(old)) => self.replace(old, path),
            (FsChange::Created | FsChange::Modified, None) => self.add(path),
            (FsChange::Removed, Some(old)) => {
                self.finder.remove(&old);
                self.resolver.invalidate(&old.logic_path);
                vec![WatchEvent::Removed(old)]
            }
            (FsChange::Removed, None) => Vec::new(),
        }
    }

    /// Announce manifests already present under a directory that just became watchable.
    pub fn scan(&self, dir: &Path) -> Vec<WatchEvent> {
        self.finder
            .manifests_under(dir)
            .iter()
            .filter(|path| self.known_manifest(path).is_none())
            .flat_map(|path| self.add(path))
            .collect()
    }

    /// Translate a change seen by the collection directory watch.
    pub fn file(&self, path: &Path) -> Vec<WatchEvent> {
        if path.is_dir() || self.finder.is_manifest(path) {
            return Vec::new();
        }
        let Some(collection) = self.finder.recognize(path) else {
            return Vec::new();
        };
        if path == collection.manifest_path {
            return Vec::new();
        }

        self.resolver.invalidate(&collection.logic_path);
        self.resolver.invalidate(path);

        let changed = WatchEvent::Changed {
            filename: path.to_path_buf(),
            collection: collection.clone(),
        };
        if path == collection.logic_path {
            vec![WatchEvent::ChangedLogic(collection), changed]
        } else {
            vec![changed]
        }
    }

    fn known_manifest(&self, path: &Path) -> Option<Arc<Descriptor>> {
        self.finder
            .recognize(path)
            .filter(|d| d.manifest_path == path)
    }

    fn add(&self, path: &Path) -> Vec<WatchEvent> {
        let Some(descriptor) = self.finder.create_descriptor(path) else {
            return Vec::new();
        };
        if !self.finder.add(descriptor.clone()) {
            return Vec::new();
        }
        self.resolver.invalidate(&descriptor.logic_path);
        vec![WatchEvent::Added(descriptor)]
    }

    fn replace(&self, old: Arc<Descriptor>, path: &Path) -> Vec<WatchEvent> {
        let new = match self.finder.parse_manifest(path) {
            Ok(descriptor) => Arc::new(descriptor),
            Err(e) => {
                self.finder.report(&e);
                return Vec::new();
            }
        };

        self.finder.remove(&old);
        self.resolver.invalidate(&old.logic_path);
        let mut events = vec![WatchEvent::Removed(old)];

        if self.finder.add(new.clone()) {
            self.resolver.invalidate(&new.logic_path);
            events.push(WatchEvent::Added(new));
        }
        events
    }
}
