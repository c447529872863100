//! Collection discovery.
//!
//! # Responsibilities
//! - Expand manifest glob patterns into descriptors
//! - Reject invalid and duplicate collection names (first-seen wins)
//! - Map files back to their owning collection (longest directory prefix)
//!
//! # Design Decisions
//! - `discover` is idempotent: the cached map is returned until invalidated
//! - Snapshots are `Arc`s; mutation clones-on-write so readers never see partial maps
//! - Failures never abort discovery; they are published on the event bus

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::collections::descriptor::{normalize, Descriptor, DescriptorError};
use crate::config::CollectionsConfig;
use crate::events::{EventBus, HostEvent};

/// Failures while expanding manifest patterns.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Invalid collections glob {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("Failed to read {path:?}: {source}")]
    Glob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Discovered descriptors by collection name.
pub type DescriptorMap = BTreeMap<String, Arc<Descriptor>>;

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Default)]
struct FinderState {
    by_name: Arc<DescriptorMap>,
    by_dir: HashMap<PathBuf, Arc<Descriptor>>,
}

/// Finds collection manifests and keeps the map of found collections.
pub struct CollectionsFinder {
    patterns: Vec<String>,
    compiled: Vec<glob::Pattern>,
    default_logic: String,
    events: EventBus,
    state: Mutex<Option<FinderState>>,
}

impl CollectionsFinder {
    /// Create a finder for the configured root and glob patterns.
    pub fn new(config: &CollectionsConfig, events: EventBus) -> Self {
        let root = absolute(&config.root);
        let mut patterns = Vec::new();
        let mut compiled = Vec::new();

        for expression in &config.globs {
            let full = if Path::new(expression).is_absolute() {
                expression.clone()
            } else {
                root.join(expression).to_string_lossy().into_owned()
            };
            match glob::Pattern::new(&full) {
                Ok(pattern) => compiled.push(pattern),
                Err(source) => events.error(
                    DiscoveryError::Pattern {
                        pattern: expression.clone(),
                        source,
                    }
                    .to_string(),
                ),
            }
            patterns.push(full);
        }

        Self {
            patterns,
            compiled,
            default_logic: config.default_logic.clone(),
            events,
            state: Mutex::new(None),
        }
    }

    /// Find all collections, or return the cached map of a previous call.
    pub fn discover(&self) -> Arc<DescriptorMap> {
        let mut guard = self.lock();
        if let Some(state) = guard.as_ref() {
            return state.by_name.clone();
        }

        let mut state = FinderState::default();
        for expression in &self.patterns {
            let paths = match glob::glob_with(expression, MATCH_OPTIONS) {
                Ok(paths) => paths,
                Err(source) => {
                    self.events.error(
                        DiscoveryError::Pattern {
                            pattern: expression.clone(),
                            source,
                        }
                        .to_string(),
                    );
                    continue;
                }
            };

            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        let error = DiscoveryError::Glob {
                            path: e.path().to_path_buf(),
                            source: std::io::Error::new(e.error().kind(), e.error().to_string()),
                        };
                        self.events.error(error.to_string());
                        continue;
                    }
                };
                if !path.is_file() {
                    continue;
                }
                if let Some(descriptor) = self.create_descriptor(&path) {
                    if add_to(&mut state, descriptor.clone(), &self.events) {
                        self.events.emit(HostEvent::CollectionFound(descriptor));
                    }
                }
            }
        }

        let found = state.by_name.clone();
        *guard = Some(state);
        found
    }

    /// Drop the cached map so the next `discover` scans storage again.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    /// Parse a manifest, reporting failures on the event bus.
    pub fn create_descriptor(&self, manifest_path: &Path) -> Option<Arc<Descriptor>> {
        match self.parse_manifest(manifest_path) {
            Ok(descriptor) => Some(Arc::new(descriptor)),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// Parse a manifest without reporting.
    pub fn parse_manifest(&self, manifest_path: &Path) -> Result<Descriptor, DescriptorError> {
        Descriptor::from_manifest(&normalize(manifest_path), &self.default_logic)
    }

    /// Publish a descriptor error: bad names are warnings, the rest are errors.
    pub fn report(&self, error: &DescriptorError) {
        match error {
            DescriptorError::InvalidName { .. } => self.events.warn(format!("{error}, skipping...")),
            _ => self.events.error(error.to_string()),
        }
    }

    /// Register a descriptor. Returns false if its name is already taken.
    pub fn add(&self, descriptor: Arc<Descriptor>) -> bool {
        let mut guard = self.lock();
        let state = guard.get_or_insert_with(FinderState::default);
        add_to(state, descriptor, &self.events)
    }

    /// Unregister a descriptor (by name and by directory).
    pub fn remove(&self, descriptor: &Descriptor) {
        let mut guard = self.lock();
        let Some(state) = guard.as_mut() else {
            return;
        };

        let owned = state
            .by_name
            .get(&descriptor.name)
            .is_some_and(|d| d.manifest_path == descriptor.manifest_path);
        if owned {
            Arc::make_mut(&mut state.by_name).remove(&descriptor.name);
        }

        let dir_owned = state
            .by_dir
            .get(&descriptor.directory)
            .is_some_and(|d| d.manifest_path == descriptor.manifest_path);
        if dir_owned {
            state.by_dir.remove(&descriptor.directory);
        }
    }

    /// Resolve the collection owning `filename` by the longest directory prefix.
    pub fn recognize(&self, filename: &Path) -> Option<Arc<Descriptor>> {
        let guard = self.lock();
        let state = guard.as_ref()?;
        filename
            .ancestors()
            .find_map(|dir| state.by_dir.get(dir).cloned())
    }

    /// Look up a found collection by name.
    pub fn get(&self, name: &str) -> Option<Arc<Descriptor>> {
        self.lock().as_ref()?.by_name.get(name).cloned()
    }

    /// Directories of all found collections.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.lock()
            .as_ref()
            .map(|state| state.by_name.values().map(|d| d.directory.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether `path` is matched by one of the manifest patterns.
    pub fn is_manifest(&self, path: &Path) -> bool {
        self.compiled
            .iter()
            .any(|pattern| pattern.matches_path_with(path, MATCH_OPTIONS))
    }

    /// Manifest files currently matched by the patterns below `dir`.
    pub fn manifests_under(&self, dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for expression in &self.patterns {
            let Ok(paths) = glob::glob_with(expression, MATCH_OPTIONS) else {
                continue;
            };
            for path in paths.flatten() {
                if path.starts_with(dir) && path.is_file() && !found.contains(&path) {
                    found.push(path);
                }
            }
        }
        found
    }

    /// Directories to watch for manifest changes: the literal prefix of each pattern.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for expression in &self.patterns {
            let mut root = PathBuf::new();
            for component in Path::new(expression).components() {
                let text = component.as_os_str().to_string_lossy();
                if text.contains(['*', '?', '[', '{']) {
                    break;
                }
                root.push(component.as_os_str());
            }
            // A fully literal pattern names the manifest itself.
            if root == Path::new(expression) {
                root.pop();
            }
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        roots
    }

    fn lock(&self) -> MutexGuard<'_, Option<FinderState>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn add_to(state: &mut FinderState, descriptor: Arc<Descriptor>, events: &EventBus) -> bool {
    if let Some(existing) = state.by_name.get(&descriptor.name) {
        events.warn(format!(
            "Collection {:?} has the same name as {:?} ({}), skipping...",
            descriptor.manifest_path, existing.manifest_path, descriptor.name
        ));
        return false;
    }

    state
        .by_dir
        .insert(descriptor.directory.clone(), descriptor.clone());
    Arc::make_mut(&mut state.by_name).insert(descriptor.name.clone(), descriptor);
    true
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => normalize(path),
    }
}
