// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The module map
//!
//! A realm-wide registry from [`ModuleMapKey`] to entry. Entries are created
//! only through [`ModuleMap::get_or_create`] and never replaced, so two
//! lookups of one key always observe the same entry.
//!
//! Lifecycle:
//!
//! ```text
//! Registered -> Loading -> Loaded -> Instantiated -> Evaluated
//!      \            \         \            \
//!       +------------+---------+------------+--> Failed (terminal)
//! ```

use crate::error::{LoadError, ModuleFailure};
use crate::extractor::{FragmentDeclaration, FragmentForm, ModuleBody};
use crate::instance::{ImportMeta, Instance};
use crate::key::ModuleMapKey;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use url::Url;

/// Lifecycle status of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleStatus {
    /// Known to exist; dependencies not loaded
    Registered,
    /// Dependencies are being loaded
    Loading,
    /// All dependencies loaded
    Loaded,
    /// Bindings created
    Instantiated,
    /// Body executed
    Evaluated,
    /// Failed; never retried
    Failed,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleStatus::Registered => "registered",
            ModuleStatus::Loading => "loading",
            ModuleStatus::Loaded => "loaded",
            ModuleStatus::Instantiated => "instantiated",
            ModuleStatus::Evaluated => "evaluated",
            ModuleStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The source construct backing an entry
#[derive(Debug, Clone)]
pub enum Declaration {
    /// Top-level module of a resource
    Module(Arc<ModuleBody>),
    /// A fragment inside a resource
    Fragment(Arc<FragmentDeclaration>),
}

impl Declaration {
    /// The module body
    pub fn body(&self) -> &Arc<ModuleBody> {
        match self {
            Declaration::Module(body) => body,
            Declaration::Fragment(fragment) => &fragment.body,
        }
    }

    /// Whether the declaration may be imported from another resource.
    /// Top-level modules always can.
    pub fn is_exported(&self) -> bool {
        match self {
            Declaration::Module(_) => true,
            Declaration::Fragment(fragment) => fragment.exported,
        }
    }

    /// Fragment form; `None` for top-level modules
    pub fn form(&self) -> Option<FragmentForm> {
        match self {
            Declaration::Module(_) => None,
            Declaration::Fragment(fragment) => Some(fragment.form),
        }
    }
}

#[derive(Debug)]
struct EntryState {
    status: ModuleStatus,
    /// Set by the Loaded transition; the loaded bit
    dependencies: Option<Vec<ModuleMapKey>>,
    instance: Option<Arc<Instance>>,
    failure: Option<ModuleFailure>,
}

/// State record for one module
#[derive(Debug)]
pub struct ModuleMapEntry {
    key: ModuleMapKey,
    base_url: Url,
    declaration: OnceLock<Declaration>,
    state: RwLock<EntryState>,
}

impl ModuleMapEntry {
    /// A Registered entry. Its base URL is the URL of the containing resource.
    pub fn new(key: ModuleMapKey) -> Self {
        Self {
            base_url: key.url().clone(),
            key,
            declaration: OnceLock::new(),
            state: RwLock::new(EntryState {
                status: ModuleStatus::Registered,
                dependencies: None,
                instance: None,
                failure: None,
            }),
        }
    }

    /// Key of the entry
    pub fn key(&self) -> &ModuleMapKey {
        &self.key
    }

    /// Base URL for resolving specifiers in this module
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `import.meta` of this module
    pub fn import_meta(&self) -> ImportMeta {
        ImportMeta {
            url: self.base_url.clone(),
        }
    }

    /// Backing declaration, once its resource has been extracted
    pub fn declaration(&self) -> Option<&Declaration> {
        self.declaration.get()
    }

    /// Attach the declaration; later calls are ignored.
    pub(crate) fn attach(&self, declaration: Declaration) {
        let _ = self.declaration.set(declaration);
    }

    /// Whether the declaration is exported
    pub fn is_exported(&self) -> bool {
        self.declaration().is_some_and(Declaration::is_exported)
    }

    /// Current status
    pub fn status(&self) -> ModuleStatus {
        self.state.read().status
    }

    /// The loaded bit: dependencies have been loaded. Stays set if the entry
    /// later fails to link or evaluate.
    pub fn is_loaded(&self) -> bool {
        self.state.read().dependencies.is_some()
    }

    /// Dependency keys, aligned with the body's requests; empty until loaded
    pub fn dependencies(&self) -> Vec<ModuleMapKey> {
        self.state.read().dependencies.clone().unwrap_or_default()
    }

    /// The instance, once instantiated
    pub fn instance(&self) -> Option<Arc<Instance>> {
        self.state.read().instance.clone()
    }

    /// The cached failure of a Failed entry
    pub fn failure(&self) -> Option<ModuleFailure> {
        self.state.read().failure.clone()
    }

    /// The cached failure, if the entry failed while loading
    pub fn load_failure(&self) -> Option<LoadError> {
        match &self.state.read().failure {
            Some(ModuleFailure::Load(err)) => Some(err.clone()),
            _ => None,
        }
    }

    fn transition(
        &self,
        expected: ModuleStatus,
        next: ModuleStatus,
    ) -> RwLockWriteGuard<'_, EntryState> {
        let mut state = self.state.write();
        assert_eq!(
            state.status, expected,
            "{}: illegal transition to {}",
            self.key, next
        );
        state.status = next;
        debug!(key = %self.key, status = %next, "module status");
        state
    }

    fn mark_loading(&self) {
        let _ = self.transition(ModuleStatus::Registered, ModuleStatus::Loading);
    }

    fn mark_loaded(&self, dependencies: Vec<ModuleMapKey>) {
        let mut state = self.transition(ModuleStatus::Loading, ModuleStatus::Loaded);
        state.dependencies = Some(dependencies);
    }

    fn mark_instantiated(&self, instance: Arc<Instance>) {
        let mut state = self.transition(ModuleStatus::Loaded, ModuleStatus::Instantiated);
        state.instance = Some(instance);
    }

    fn mark_evaluated(&self) {
        let _ = self.transition(ModuleStatus::Instantiated, ModuleStatus::Evaluated);
    }

    fn mark_failed(&self, failure: ModuleFailure) {
        let mut state = self.state.write();
        assert!(
            !matches!(state.status, ModuleStatus::Failed | ModuleStatus::Evaluated),
            "{}: cannot fail a module that is {}",
            self.key,
            state.status
        );
        debug!(key = %self.key, error = %failure, "module failed");
        state.status = ModuleStatus::Failed;
        state.failure = Some(failure);
    }
}

/// Registry of all modules known to a realm
#[derive(Debug, Default)]
pub struct ModuleMap {
    entries: DashMap<ModuleMapKey, Arc<ModuleMapEntry>>,
}

impl ModuleMap {
    /// Create an empty module map
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `key`, creating it with `producer` if absent.
    /// This is the only way entries come into existence.
    pub fn get_or_create(
        &self,
        key: &ModuleMapKey,
        producer: impl FnOnce() -> ModuleMapEntry,
    ) -> Arc<ModuleMapEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Arc::clone(entry.value());
        }
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            let entry = producer();
            assert_eq!(entry.key(), key, "producer built an entry for another key");
            debug!(key = %key, "registered module");
            Arc::new(entry)
        });
        Arc::clone(entry.value())
    }

    /// Return the entry for `key`, registering a fresh one if absent
    pub fn register(&self, key: &ModuleMapKey) -> Arc<ModuleMapEntry> {
        self.get_or_create(key, || ModuleMapEntry::new(key.clone()))
    }

    /// Look up an entry
    pub fn get(&self, key: &ModuleMapKey) -> Option<Arc<ModuleMapEntry>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Status of an entry
    pub fn status(&self, key: &ModuleMapKey) -> Option<ModuleStatus> {
        self.get(key).map(|entry| entry.status())
    }

    /// Whether the entry exists and has its loaded bit set
    pub fn is_loaded(&self, key: &ModuleMapKey) -> bool {
        self.get(key).is_some_and(|entry| entry.is_loaded())
    }

    /// Whether the entry exists and its declaration is exported
    pub fn is_exported(&self, key: &ModuleMapKey) -> bool {
        self.get(key).is_some_and(|entry| entry.is_exported())
    }

    /// Whether a module in another resource may import `key`: every
    /// fragment on its path must be exported.
    pub fn is_externally_visible(&self, key: &ModuleMapKey) -> bool {
        key.ancestry().all(|ancestor| self.is_exported(&ancestor))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted by key
    pub fn snapshot(&self) -> Vec<Arc<ModuleMapEntry>> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        entries
    }

    fn entry(&self, key: &ModuleMapKey) -> Arc<ModuleMapEntry> {
        match self.get(key) {
            Some(entry) => entry,
            None => panic!("no module map entry for {}", key),
        }
    }

    /// Registered -> Loading
    pub fn mark_loading(&self, key: &ModuleMapKey) {
        self.entry(key).mark_loading();
    }

    /// Loading -> Loaded, recording the dependency keys
    pub fn mark_loaded(&self, key: &ModuleMapKey, dependencies: Vec<ModuleMapKey>) {
        self.entry(key).mark_loaded(dependencies);
    }

    /// Loaded -> Instantiated, recording the instance
    pub fn mark_instantiated(&self, key: &ModuleMapKey, instance: Arc<Instance>) {
        self.entry(key).mark_instantiated(instance);
    }

    /// Instantiated -> Evaluated
    pub fn mark_evaluated(&self, key: &ModuleMapKey) {
        self.entry(key).mark_evaluated();
    }

    /// Any non-terminal status -> Failed, caching the failure
    pub fn mark_failed(&self, key: &ModuleMapKey, failure: impl Into<ModuleFailure>) {
        self.entry(key).mark_failed(failure.into());
    }
}
