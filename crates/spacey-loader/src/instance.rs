// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module instances
//!
//! An instance owns the binding cells of its exported locals. Imports are
//! references to other instances' cells (or to whole namespaces), so every
//! importer observes the exporter's current value.

use crate::extractor::ModuleBody;
use crate::key::ModuleMapKey;
use crate::value::{Binding, Value};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use url::Url;

/// `import.meta` of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMeta {
    /// URL of the resource containing the module, for fragments too
    pub url: Url,
}

impl ImportMeta {
    /// Convert to a namespace-like list of properties
    pub fn properties(&self) -> Vec<(&'static str, Value)> {
        vec![("url", Value::String(self.url.to_string()))]
    }
}

/// What an import or export name refers to after linking
#[derive(Clone)]
pub enum ResolvedBinding {
    /// A binding cell owned by some instance
    Cell(Arc<Binding>),
    /// The namespace object of an instance
    Namespace(Arc<Instance>),
}

impl ResolvedBinding {
    /// Current value; `None` while the underlying binding is uninitialized
    pub fn value(&self) -> Option<Value> {
        match self {
            ResolvedBinding::Cell(binding) => binding.get(),
            ResolvedBinding::Namespace(instance) => Some(Value::Namespace(Arc::clone(instance))),
        }
    }
}

impl fmt::Debug for ResolvedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedBinding::Cell(binding) => f.debug_tuple("Cell").field(&binding.get()).finish(),
            ResolvedBinding::Namespace(instance) => {
                f.debug_tuple("Namespace").field(&instance.key().to_string()).finish()
            }
        }
    }
}

/// A live module instance; exactly one per module map entry.
pub struct Instance {
    key: ModuleMapKey,
    meta: ImportMeta,
    locals: FxHashMap<String, Arc<Binding>>,
    imports: OnceLock<FxHashMap<String, ResolvedBinding>>,
    exports: OnceLock<BTreeMap<String, ResolvedBinding>>,
}

impl Instance {
    /// Create an instance with uninitialized cells for the exported locals of `body`
    pub(crate) fn new(key: ModuleMapKey, meta: ImportMeta, body: &ModuleBody) -> Self {
        let locals = body
            .exported_locals()
            .map(|name| (name.to_string(), Arc::new(Binding::new())))
            .collect();
        Self {
            key,
            meta,
            locals,
            imports: OnceLock::new(),
            exports: OnceLock::new(),
        }
    }

    /// Install the resolved import and export tables.
    pub(crate) fn link(
        &self,
        imports: FxHashMap<String, ResolvedBinding>,
        exports: BTreeMap<String, ResolvedBinding>,
    ) {
        // a fresh instance is linked exactly once
        let _ = self.imports.set(imports);
        let _ = self.exports.set(exports);
    }

    /// Key of the module
    pub fn key(&self) -> &ModuleMapKey {
        &self.key
    }

    /// `import.meta` of the module
    pub fn import_meta(&self) -> &ImportMeta {
        &self.meta
    }

    /// Binding cell of an exported local
    pub fn local(&self, name: &str) -> Option<&Arc<Binding>> {
        self.locals.get(name)
    }

    /// What the import binding `local` refers to
    pub fn import(&self, local: &str) -> Option<&ResolvedBinding> {
        self.imports.get().and_then(|imports| imports.get(local))
    }

    /// Namespace entry for the export `name`
    pub fn export(&self, name: &str) -> Option<&ResolvedBinding> {
        self.exports.get().and_then(|exports| exports.get(name))
    }

    /// Current value of the export `name`; `None` if it does not exist or is
    /// still uninitialized
    pub fn get(&self, name: &str) -> Option<Value> {
        self.export(name).and_then(ResolvedBinding::value)
    }

    /// Exported names in namespace order (sorted)
    pub fn export_names(&self) -> Vec<&str> {
        self.exports
            .get()
            .map(|exports| exports.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("key", &self.key.to_string())
            .field("exports", &self.export_names())
            .finish()
    }
}
