//! Collection loading.
//!
//! # Responsibilities
//! - Resolve discovered descriptors into collections (descriptor + handler factory)
//! - Own the authoritative registry of loaded collections
//! - Reload, replace and remove single collections on watcher demand
//!
//! # Design Decisions
//! - Single writer: every mutation holds `write_lock`
//! - Unlimited readers: the registry is an `ArcSwapOption`, swapped whole
//! - Resolution failures are reported, never propagated past the loader

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use arc_swap::ArcSwapOption;

use crate::collections::descriptor::Descriptor;
use crate::collections::finder::CollectionsFinder;
use crate::collections::resolver::{LoadError, ModuleResolver};
use crate::dispatch::HandlerFactory;
use crate::events::{EventBus, HostEvent};

/// A descriptor plus its resolved handler factory.
pub struct Collection {
    pub descriptor: Arc<Descriptor>,
    pub factory: Arc<dyn HandlerFactory>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.descriptor.name)
            .field("logic", &self.descriptor.logic_path)
            .finish_non_exhaustive()
    }
}

/// Loaded collections by name.
pub type CollectionMap = BTreeMap<String, Arc<Collection>>;

/// Loads collections and keeps the registry.
pub struct CollectionsLoader {
    finder: Arc<CollectionsFinder>,
    resolver: Arc<dyn ModuleResolver>,
    events: EventBus,
    registry: ArcSwapOption<CollectionMap>,
    write_lock: Mutex<()>,
}

impl CollectionsLoader {
    pub fn new(finder: Arc<CollectionsFinder>, resolver: Arc<dyn ModuleResolver>, events: EventBus) -> Self {
        Self {
            finder,
            resolver,
            events,
            registry: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load every discovered collection, or return the cached snapshot.
    pub fn load(&self) -> Arc<CollectionMap> {
        if let Some(loaded) = self.registry.load_full() {
            return loaded;
        }
        let _guard = self.lock();
        self.loaded_or_load()
    }

    /// Resolve a single descriptor and register (or replace) it.
    ///
    /// On failure any previously loaded collection of that name is removed
    /// and the error is published. Returns whether the collection is loaded.
    pub fn load_one(&self, descriptor: Arc<Descriptor>) -> bool {
        let _guard = self.lock();
        let current = self.loaded_or_load();

        let mut next = (*current).clone();
        let loaded = match self.resolve(&descriptor) {
            Some(collection) => {
                next.insert(descriptor.name.clone(), collection);
                true
            }
            None => {
                if next.remove(&descriptor.name).is_some() {
                    self.events
                        .warn(format!("Collection \"{}\" unloaded after a failed reload", descriptor.name));
                }
                false
            }
        };

        self.registry.store(Some(Arc::new(next)));
        if loaded {
            self.events.emit(HostEvent::CollectionLoaded {
                name: descriptor.name.clone(),
            });
        }
        loaded
    }

    /// Remove a collection from the registry.
    pub fn remove(&self, name: &str) -> Option<Arc<Collection>> {
        let _guard = self.lock();
        let current = self.registry.load_full()?;
        if !current.contains_key(name) {
            return None;
        }

        let mut next = (*current).clone();
        let removed = next.remove(name);
        self.registry.store(Some(Arc::new(next)));
        removed
    }

    /// Drop the snapshot (and the discovery cache) so the next `load` starts over.
    pub fn invalidate(&self) {
        let _guard = self.lock();
        self.finder.invalidate();
        self.registry.store(None);
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<Collection>> {
        self.registry.load().as_ref()?.get(name).cloned()
    }

    /// Current snapshot; empty before the first `load`.
    pub fn get_all(&self) -> Arc<CollectionMap> {
        self.registry.load_full().unwrap_or_default()
    }

    pub fn finder(&self) -> &Arc<CollectionsFinder> {
        &self.finder
    }

    pub fn resolver(&self) -> &Arc<dyn ModuleResolver> {
        &self.resolver
    }

    // Caller must hold the write lock.
    fn loaded_or_load(&self) -> Arc<CollectionMap> {
        if let Some(loaded) = self.registry.load_full() {
            return loaded;
        }

        let descriptors = self.finder.discover();
        let mut collections = CollectionMap::new();
        for descriptor in descriptors.values() {
            if let Some(collection) = self.resolve(descriptor) {
                self.events.emit(HostEvent::CollectionLoaded {
                    name: descriptor.name.clone(),
                });
                collections.insert(descriptor.name.clone(), collection);
            }
        }

        let loaded = Arc::new(collections);
        self.registry.store(Some(loaded.clone()));
        self.events.emit(HostEvent::AllCollectionsLoaded { count: loaded.len() });
        loaded
    }

    fn resolve(&self, descriptor: &Arc<Descriptor>) -> Option<Arc<Collection>> {
        match self.resolver.resolve(&descriptor.logic_path) {
            Ok(factory) => Some(Arc::new(Collection {
                descriptor: descriptor.clone(),
                factory,
            })),
            Err(e @ LoadError::Unsupported(_)) => {
                self.events.warn(format!(
                    "In collection \"{}\": {}. Skipping...",
                    descriptor.name, e
                ));
                None
            }
            Err(e) => {
                self.events
                    .error(format!("In collection \"{}\": {}. Skipping...", descriptor.name, e));
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
