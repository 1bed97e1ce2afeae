// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Running module bodies
//!
//! The loader does not interpret JavaScript. Evaluating a module hands its
//! residual source and linked instance to a [`ModuleExecutor`], which runs the
//! body at most once per module.

use crate::error::EvalError;
use crate::extractor::ModuleBody;
use crate::instance::{ImportMeta, Instance};
use crate::key::ModuleMapKey;
use crate::value::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::info;

/// Runs the body of one module.
pub trait ModuleExecutor: Send + Sync {
    /// Execute the module described by `ctx`. An `Err` is an abrupt
    /// completion and fails the module permanently.
    fn execute(&self, ctx: &ModuleContext<'_>) -> Result<(), EvalError>;
}

/// Everything an executor may see of the module being evaluated
pub struct ModuleContext<'a> {
    key: &'a ModuleMapKey,
    instance: &'a Arc<Instance>,
    body: &'a ModuleBody,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(key: &'a ModuleMapKey, instance: &'a Arc<Instance>, body: &'a ModuleBody) -> Self {
        Self { key, instance, body }
    }

    /// Key of the module
    pub fn key(&self) -> &ModuleMapKey {
        self.key
    }

    /// `import.meta` of the module
    pub fn import_meta(&self) -> &ImportMeta {
        self.instance.import_meta()
    }

    /// Source of the body, without imports or fragment declarations
    pub fn source(&self) -> &str {
        &self.body.residual
    }

    /// Extracted module body
    pub fn body(&self) -> &ModuleBody {
        self.body
    }

    /// The linked instance
    pub fn instance(&self) -> &Arc<Instance> {
        self.instance
    }

    /// Read a binding visible to the body: an import, or one of the body's own
    /// exported locals.
    pub fn get(&self, local: &str) -> Result<Value, EvalError> {
        let value = if let Some(import) = self.instance.import(local) {
            import.value()
        } else if let Some(binding) = self.instance.local(local) {
            binding.get()
        } else {
            return Err(EvalError::thrown(
                self.key,
                format!("ReferenceError: {} is not defined", local),
            ));
        };

        value.ok_or_else(|| EvalError::Reference {
            key: self.key.clone(),
            name: local.to_string(),
        })
    }

    /// Initialize or assign an exported local
    pub fn set_export(&self, local: &str, value: impl Into<Value>) -> Result<(), EvalError> {
        if self.instance.import(local).is_some() {
            return Err(EvalError::thrown(self.key, "TypeError: Assignment to constant variable."));
        }
        match self.instance.local(local) {
            Some(binding) => {
                binding.set(value.into());
                Ok(())
            }
            None => Err(EvalError::thrown(
                self.key,
                format!("ReferenceError: {} is not an exported binding", local),
            )),
        }
    }

    /// Call the function held by `local`
    pub fn call(&self, local: &str, args: &[Value]) -> Result<Value, EvalError> {
        self.get(local)?
            .call(args)
            .map_err(|message| EvalError::thrown(self.key, message))
    }

    /// Set every still-uninitialized exported local to `undefined`
    pub fn initialize_exports(&self) {
        for local in self.body.exported_locals() {
            if let Some(binding) = self.instance.local(local) {
                if !binding.is_initialized() {
                    binding.set(Value::Undefined);
                }
            }
        }
    }
}

/// Records evaluation order without running any code.
///
/// Every exported local is initialized to `undefined`.
#[derive(Debug, Default)]
pub struct TraceExecutor {
    evaluated: Mutex<Vec<ModuleMapKey>>,
}

impl TraceExecutor {
    /// Create an executor with an empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules evaluated so far, in order
    pub fn evaluated(&self) -> Vec<ModuleMapKey> {
        self.evaluated.lock().clone()
    }
}

impl ModuleExecutor for TraceExecutor {
    fn execute(&self, ctx: &ModuleContext<'_>) -> Result<(), EvalError> {
        info!(
            key = %ctx.key(),
            url = %ctx.import_meta().url,
            imports = ctx.body().imports.len(),
            "evaluating module"
        );
        ctx.initialize_exports();
        self.evaluated.lock().push(ctx.key().clone());
        Ok(())
    }
}

type Script = dyn Fn(&ModuleContext<'_>) -> Result<(), EvalError> + Send + Sync;

/// Runs host closures in place of module bodies.
///
/// Modules without a script behave as under [`TraceExecutor`].
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: FxHashMap<ModuleMapKey, Arc<Script>>,
    trace: TraceExecutor,
}

impl ScriptedExecutor {
    /// Create an executor without scripts
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `script` as the body of `key`
    pub fn on(
        mut self,
        key: ModuleMapKey,
        script: impl Fn(&ModuleContext<'_>) -> Result<(), EvalError> + Send + Sync + 'static,
    ) -> Self {
        self.scripts.insert(key, Arc::new(script));
        self
    }

    /// Modules evaluated so far, in order
    pub fn evaluated(&self) -> Vec<ModuleMapKey> {
        self.trace.evaluated()
    }
}

impl ModuleExecutor for ScriptedExecutor {
    fn execute(&self, ctx: &ModuleContext<'_>) -> Result<(), EvalError> {
        let Some(script) = self.scripts.get(ctx.key()) else {
            return self.trace.execute(ctx);
        };

        self.trace.evaluated.lock().push(ctx.key().clone());
        script(ctx)?;
        ctx.initialize_exports();
        Ok(())
    }
}
