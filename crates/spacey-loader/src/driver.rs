// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Instantiation and evaluation of loaded graphs
//!
//! Instantiation creates one [`Instance`] per module of the not yet
//! instantiated subgraph and resolves every import and re-export against the
//! exporters' binding cells. It commits all or nothing: either every module
//! of the subgraph becomes Instantiated, or the failing module and everything
//! depending on it become Failed and the rest stay Loaded.
//!
//! Evaluation runs bodies depth-first in request order, each exactly once.
//! A module already on the evaluation stack is skipped, so in a cycle the
//! module entered first runs last.

use crate::error::{EvalError, LinkError, ModuleFailure};
use crate::executor::{ModuleContext, ModuleExecutor};
use crate::extractor::{ImportName, ModuleBody};
use crate::instance::{Instance, ResolvedBinding};
use crate::key::ModuleMapKey;
use crate::module_map::{ModuleMap, ModuleMapEntry, ModuleStatus};
use rustc_hash::{FxHashMap, FxHashSet};
use spacey_syntax::ModuleSpecifier;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an export name leads
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// A local binding of `key`
    Binding { key: ModuleMapKey, local: String },
    /// The namespace of `key`
    Namespace { key: ModuleMapKey },
}

#[derive(Debug)]
enum Resolution {
    Found(Target),
    NotFound,
    Ambiguous,
    Circular,
}

type Instances = FxHashMap<ModuleMapKey, Arc<Instance>>;

/// Walk indices and the modules whose cycle has not finished evaluating
#[derive(Default)]
struct EvalWalk {
    index: FxHashMap<ModuleMapKey, usize>,
    stack: Vec<ModuleMapKey>,
    next: usize,
}

/// Drives loaded modules through instantiation and evaluation.
///
/// Callers hold the realm's link lock for the duration of each call.
pub struct Driver<'a> {
    map: &'a ModuleMap,
    executor: &'a dyn ModuleExecutor,
}

impl<'a> Driver<'a> {
    /// Create a driver over `map`
    pub fn new(map: &'a ModuleMap, executor: &'a dyn ModuleExecutor) -> Self {
        Self { map, executor }
    }

    /// Instantiate `key` and every dependency not yet instantiated.
    pub fn instantiate(&self, key: &ModuleMapKey) -> Result<Arc<Instance>, LinkError> {
        let not_loaded = || LinkError::NotLoaded { key: key.clone() };
        let entry = self.map.get(key).ok_or_else(not_loaded)?;

        if let Some(instance) = entry.instance() {
            return Ok(instance);
        }
        match entry.failure() {
            Some(ModuleFailure::Link(err)) => return Err(err),
            Some(_) => return Err(not_loaded()),
            None if !entry.is_loaded() => return Err(not_loaded()),
            None => {}
        }

        let mut visited = FxHashMap::default();
        let mut order = Vec::new();
        if let Err((culprit, err)) = self.collect(&entry, &mut visited, &mut order) {
            self.fail_dependents(&culprit, &visited, &err);
            return Err(err);
        }

        let mut instances = Instances::default();
        for module in &order {
            let Some(body) = module.declaration().map(|d| Arc::clone(d.body())) else {
                return Err(LinkError::NotLoaded {
                    key: module.key().clone(),
                });
            };
            let instance = Instance::new(module.key().clone(), module.import_meta(), &body);
            instances.insert(module.key().clone(), Arc::new(instance));
        }

        for module in &order {
            if let Err(err) = self.link_instance(module, &instances) {
                warn!(key = %module.key(), error = %err, "module failed to link");
                self.fail_dependents(module.key(), &visited, &err);
                return Err(err);
            }
        }

        for module in &order {
            if let Some(instance) = instances.get(module.key()) {
                self.map.mark_instantiated(module.key(), Arc::clone(instance));
            }
        }
        info!(key = %key, modules = order.len(), "instantiated module graph");

        instances.remove(key).ok_or_else(not_loaded)
    }

    /// Evaluate `key` after its dependencies. Each body runs at most once;
    /// a body that throws fails its module and every module waiting on it.
    pub fn evaluate(&self, key: &ModuleMapKey) -> Result<(), EvalError> {
        let entry = self
            .map
            .get(key)
            .ok_or_else(|| EvalError::NotInstantiated { key: key.clone() })?;
        let mut walk = EvalWalk::default();
        match self.evaluate_entry(&entry, &mut walk) {
            Ok(_) => Ok(()),
            Err(err) => {
                // everything still on the stack depends on the failure
                for member in walk.stack.drain(..) {
                    if self.map.status(&member) == Some(ModuleStatus::Instantiated) {
                        self.map.mark_failed(&member, err.clone());
                    }
                }
                Err(err)
            }
        }
    }

    /// Post-order of the Loaded, uninstantiated subgraph below `entry`
    fn collect(
        &self,
        entry: &Arc<ModuleMapEntry>,
        visited: &mut FxHashMap<ModuleMapKey, Arc<ModuleMapEntry>>,
        order: &mut Vec<Arc<ModuleMapEntry>>,
    ) -> Result<(), (ModuleMapKey, LinkError)> {
        if visited.contains_key(entry.key()) {
            return Ok(());
        }
        visited.insert(entry.key().clone(), Arc::clone(entry));

        for dep_key in entry.dependencies() {
            let not_loaded = || {
                (
                    dep_key.clone(),
                    LinkError::NotLoaded {
                        key: dep_key.clone(),
                    },
                )
            };
            let dep = self.map.get(&dep_key).ok_or_else(not_loaded)?;
            if dep.instance().is_some() {
                continue;
            }
            match dep.failure() {
                Some(ModuleFailure::Link(err)) => return Err((dep_key.clone(), err)),
                Some(_) => return Err(not_loaded()),
                None if !dep.is_loaded() => return Err(not_loaded()),
                None => self.collect(&dep, visited, order)?,
            }
        }

        order.push(Arc::clone(entry));
        Ok(())
    }

    /// Fail every candidate that is `culprit` or transitively depends on it
    fn fail_dependents(
        &self,
        culprit: &ModuleMapKey,
        candidates: &FxHashMap<ModuleMapKey, Arc<ModuleMapEntry>>,
        err: &LinkError,
    ) {
        let mut memo = FxHashMap::default();
        for (key, entry) in candidates {
            if entry.status() == ModuleStatus::Failed {
                continue;
            }
            if reaches(key, culprit, candidates, &mut memo, &mut FxHashSet::default()) {
                self.map.mark_failed(key, err.clone());
            }
        }
    }

    fn link_instance(
        &self,
        module: &ModuleMapEntry,
        instances: &Instances,
    ) -> Result<(), LinkError> {
        let key = module.key();
        let Some((body, deps)) = self.module(key) else {
            return Err(LinkError::NotLoaded { key: key.clone() });
        };

        let mut imports = FxHashMap::default();
        for import in &body.imports {
            let target = dependency(&body, &deps, &import.request)
                .ok_or_else(|| LinkError::NotLoaded { key: key.clone() })?;
            let binding = match &import.import_name {
                ImportName::Namespace => ResolvedBinding::Namespace(self.instance_of(&target, instances)?),
                ImportName::Name(name) => self.resolve_import(key, &target, name, instances)?,
            };
            imports.insert(import.local_name.clone(), binding);
        }

        for export in &body.indirect_exports {
            if let ImportName::Name(name) = &export.import_name {
                let target = dependency(&body, &deps, &export.request)
                    .ok_or_else(|| LinkError::NotLoaded { key: key.clone() })?;
                self.resolve_import(key, &target, name, instances)?;
            }
        }

        let mut exports = BTreeMap::new();
        for name in self.exported_names(key, &mut FxHashSet::default()) {
            // ambiguous star exports are left out of the namespace
            if let Resolution::Found(target) = self.resolve_export(key, &name, &mut Vec::new()) {
                exports.insert(name, self.materialize(key, target, instances)?);
            }
        }

        debug!(key = %key, imports = imports.len(), exports = exports.len(), "linked instance");
        if let Some(instance) = instances.get(key) {
            instance.link(imports, exports);
        }
        Ok(())
    }

    fn resolve_import(
        &self,
        importer: &ModuleMapKey,
        target: &ModuleMapKey,
        name: &str,
        instances: &Instances,
    ) -> Result<ResolvedBinding, LinkError> {
        match self.resolve_export(target, name, &mut Vec::new()) {
            Resolution::Found(found) => self.materialize(importer, found, instances),
            Resolution::NotFound => Err(LinkError::MissingExport {
                importer: importer.clone(),
                target: target.clone(),
                name: name.to_string(),
            }),
            Resolution::Ambiguous => Err(LinkError::AmbiguousExport {
                importer: importer.clone(),
                target: target.clone(),
                name: name.to_string(),
            }),
            Resolution::Circular => Err(LinkError::CircularExport {
                importer: importer.clone(),
                target: target.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn resolve_export(
        &self,
        key: &ModuleMapKey,
        name: &str,
        resolve_set: &mut Vec<(ModuleMapKey, String)>,
    ) -> Resolution {
        if resolve_set.iter().any(|(k, n)| k == key && n == name) {
            return Resolution::Circular;
        }
        resolve_set.push((key.clone(), name.to_string()));

        let Some((body, deps)) = self.module(key) else {
            return Resolution::NotFound;
        };

        if let Some(export) = body.local_exports.iter().find(|e| e.export_name == name) {
            return Resolution::Found(Target::Binding {
                key: key.clone(),
                local: export.local_name.clone(),
            });
        }

        if let Some(export) = body.indirect_exports.iter().find(|e| e.export_name == name) {
            let Some(target) = dependency(&body, &deps, &export.request) else {
                return Resolution::NotFound;
            };
            return match &export.import_name {
                ImportName::Namespace => Resolution::Found(Target::Namespace { key: target }),
                ImportName::Name(import_name) => self.resolve_export(&target, import_name, resolve_set),
            };
        }

        if name == "default" {
            return Resolution::NotFound;
        }

        let mut star: Option<Target> = None;
        for request in &body.star_exports {
            let Some(target) = dependency(&body, &deps, request) else {
                continue;
            };
            match self.resolve_export(&target, name, resolve_set) {
                Resolution::Ambiguous => return Resolution::Ambiguous,
                Resolution::Found(found) => {
                    if let Some(existing) = &star {
                        if *existing != found {
                            return Resolution::Ambiguous;
                        }
                    } else {
                        star = Some(found);
                    }
                }
                Resolution::NotFound | Resolution::Circular => {}
            }
        }

        star.map(Resolution::Found).unwrap_or(Resolution::NotFound)
    }

    fn exported_names(
        &self,
        key: &ModuleMapKey,
        visited: &mut FxHashSet<ModuleMapKey>,
    ) -> Vec<String> {
        if !visited.insert(key.clone()) {
            return Vec::new();
        }
        let Some((body, deps)) = self.module(key) else {
            return Vec::new();
        };

        let mut names: Vec<String> = body
            .local_exports
            .iter()
            .map(|e| e.export_name.clone())
            .chain(body.indirect_exports.iter().map(|e| e.export_name.clone()))
            .collect();

        for request in &body.star_exports {
            let Some(target) = dependency(&body, &deps, request) else {
                continue;
            };
            for name in self.exported_names(&target, visited) {
                if name != "default" && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn materialize(
        &self,
        importer: &ModuleMapKey,
        target: Target,
        instances: &Instances,
    ) -> Result<ResolvedBinding, LinkError> {
        match target {
            Target::Namespace { key } => Ok(ResolvedBinding::Namespace(self.instance_of(&key, instances)?)),
            Target::Binding { key, local } => {
                let instance = self.instance_of(&key, instances)?;
                match instance.local(&local) {
                    Some(cell) => Ok(ResolvedBinding::Cell(Arc::clone(cell))),
                    None => Err(LinkError::MissingExport {
                        importer: importer.clone(),
                        target: key,
                        name: local,
                    }),
                }
            }
        }
    }

    fn instance_of(
        &self,
        key: &ModuleMapKey,
        instances: &Instances,
    ) -> Result<Arc<Instance>, LinkError> {
        instances
            .get(key)
            .cloned()
            .or_else(|| self.map.get(key).and_then(|entry| entry.instance()))
            .ok_or_else(|| LinkError::NotLoaded { key: key.clone() })
    }

    /// Body and resolved dependencies of a loaded module
    fn module(&self, key: &ModuleMapKey) -> Option<(Arc<ModuleBody>, Vec<ModuleMapKey>)> {
        let entry = self.map.get(key)?;
        if !entry.is_loaded() {
            return None;
        }
        let body = Arc::clone(entry.declaration()?.body());
        Some((body, entry.dependencies()))
    }

    /// Runs `entry` after its dependencies and returns the smallest walk
    /// index it reaches. A module whose cycle is unfinished stays
    /// Instantiated on the walk stack until the cycle's first module is done.
    fn evaluate_entry(
        &self,
        entry: &Arc<ModuleMapEntry>,
        walk: &mut EvalWalk,
    ) -> Result<usize, EvalError> {
        let key = entry.key();
        match entry.status() {
            ModuleStatus::Evaluated => return Ok(usize::MAX),
            ModuleStatus::Instantiated => {}
            ModuleStatus::Failed => {
                return Err(match entry.failure() {
                    Some(ModuleFailure::Eval(err)) => err,
                    _ => EvalError::NotInstantiated { key: key.clone() },
                });
            }
            _ => return Err(EvalError::NotInstantiated { key: key.clone() }),
        }
        if let Some(&index) = walk.index.get(key) {
            // on the stack: an import cycle
            return Ok(index);
        }

        let index = walk.next;
        walk.next += 1;
        walk.index.insert(key.clone(), index);
        let position = walk.stack.len();
        walk.stack.push(key.clone());

        let mut low = index;
        for dep_key in entry.dependencies() {
            let dep = self
                .map
                .get(&dep_key)
                .ok_or(EvalError::NotInstantiated { key: dep_key })?;
            low = low.min(self.evaluate_entry(&dep, walk)?);
        }

        match (entry.instance(), entry.declaration()) {
            (Some(instance), Some(declaration)) => {
                debug!(key = %key, "evaluating module");
                let ctx = ModuleContext::new(key, &instance, declaration.body());
                if let Err(err) = self.executor.execute(&ctx) {
                    warn!(key = %key, error = %err, "module evaluation failed");
                    return Err(err);
                }
            }
            _ => return Err(EvalError::NotInstantiated { key: key.clone() }),
        }

        if low == index {
            for member in walk.stack.drain(position..) {
                self.map.mark_evaluated(&member);
            }
        }
        Ok(low)
    }
}

/// The dependency key that `request` of `body` resolved to
fn dependency(
    body: &ModuleBody,
    deps: &[ModuleMapKey],
    request: &ModuleSpecifier,
) -> Option<ModuleMapKey> {
    body.request_index(request).and_then(|i| deps.get(i)).cloned()
}

/// Whether `from` is `culprit` or reaches it through candidate modules
fn reaches(
    from: &ModuleMapKey,
    culprit: &ModuleMapKey,
    candidates: &FxHashMap<ModuleMapKey, Arc<ModuleMapEntry>>,
    memo: &mut FxHashMap<ModuleMapKey, bool>,
    on_path: &mut FxHashSet<ModuleMapKey>,
) -> bool {
    if from == culprit {
        return true;
    }
    if let Some(&known) = memo.get(from) {
        return known;
    }
    let Some(entry) = candidates.get(from) else {
        return false;
    };
    if !on_path.insert(from.clone()) {
        return false;
    }

    let found = entry
        .dependencies()
        .iter()
        .any(|dep| reaches(dep, culprit, candidates, memo, on_path));
    on_path.remove(from);
    if found || on_path.is_empty() {
        memo.insert(from.clone(), found);
    }
    found
}
