// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Realms
//!
//! A realm owns one module map and is the host-facing surface of the loader:
//! resolve an entry specifier, load its graph, instantiate, evaluate.

use crate::config::LoaderConfig;
use crate::driver::Driver;
use crate::error::{ConfigError, EvalError, LinkError, LoadError, ResolveError, Result};
use crate::executor::{ModuleExecutor, TraceExecutor};
use crate::fetch::{Fetcher, SchemeFetcher};
use crate::import_map::ImportMapOverride;
use crate::instance::{ImportMeta, Instance};
use crate::key::ModuleMapKey;
use crate::loader::Loader;
use crate::module_map::{ModuleMap, ModuleMapEntry, ModuleStatus};
use crate::parser::{ModuleParser, SyntaxParser};
use crate::resolver::Resolver;
use parking_lot::ReentrantMutex;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Builder for [`Realm`]
pub struct RealmBuilder {
    fetcher: Option<Arc<dyn Fetcher>>,
    parser: Option<Arc<dyn ModuleParser>>,
    import_map: Option<Arc<dyn ImportMapOverride>>,
    executor: Option<Arc<dyn ModuleExecutor>>,
    max_concurrent_fetches: Option<usize>,
    base_url: Option<Url>,
}

impl RealmBuilder {
    fn new() -> Self {
        Self {
            fetcher: None,
            parser: None,
            import_map: None,
            executor: None,
            max_concurrent_fetches: None,
            base_url: None,
        }
    }

    /// Builder preconfigured from `config`: local files always, remote URLs
    /// when allowed and compiled in, plus the configured import map.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        #[allow(unused_mut)]
        let mut fetcher = SchemeFetcher::local();
        if config.allow_remote {
            #[cfg(feature = "http")]
            {
                let timeout = std::time::Duration::from_secs(config.timeout);
                let remote = crate::fetch::HttpFetcher::new(timeout).map_err(|err| {
                    ConfigError::InvalidValue {
                        key: "allow_remote".to_string(),
                        value: err.to_string(),
                    }
                })?;
                fetcher = fetcher.with_remote(Arc::new(remote));
            }
            #[cfg(not(feature = "http"))]
            tracing::warn!("remote modules are enabled but http support is not compiled in");
        }

        let mut builder = Self::new()
            .fetcher(Arc::new(fetcher))
            .max_concurrent_fetches(config.max_concurrent_fetches);
        if let Some(import_map) = config.read_import_map()? {
            builder = builder.import_map(Arc::new(import_map));
        }
        Ok(builder)
    }

    /// Source of module text; defaults to local files
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Module parser; defaults to [`SyntaxParser`]
    pub fn parser(mut self, parser: Arc<dyn ModuleParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Specifier overrides applied before URL resolution
    pub fn import_map(mut self, import_map: Arc<dyn ImportMapOverride>) -> Self {
        self.import_map = Some(import_map);
        self
    }

    /// Runs module bodies; defaults to [`TraceExecutor`]
    pub fn executor(mut self, executor: Arc<dyn ModuleExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Bound on in-flight fetches; 0 means unbounded
    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    /// URL that entry specifiers are resolved against; defaults to the
    /// working directory
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Build the realm
    pub fn build(self) -> Result<Realm> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => {
                let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                    path: ".".to_string(),
                    source,
                })?;
                Url::from_directory_path(&cwd).map_err(|_| ConfigError::InvalidValue {
                    key: "base_url".to_string(),
                    value: cwd.display().to_string(),
                })?
            }
        };
        let resolver = Resolver::new(self.import_map);
        let map = Arc::new(ModuleMap::new());
        let link_lock = Arc::new(ReentrantMutex::new(()));
        let loader = Loader::new(
            Arc::clone(&map),
            self.fetcher.unwrap_or_else(|| Arc::new(SchemeFetcher::local())),
            self.parser.unwrap_or_else(|| Arc::new(SyntaxParser)),
            resolver.clone(),
            self.max_concurrent_fetches,
            Arc::clone(&link_lock),
        );

        Ok(Realm {
            map,
            loader,
            resolver,
            executor: self.executor.unwrap_or_else(|| Arc::new(TraceExecutor::new())),
            link_lock,
            base_url,
        })
    }
}

/// A module map together with the machinery that fills and runs it.
pub struct Realm {
    map: Arc<ModuleMap>,
    loader: Loader,
    resolver: Resolver,
    executor: Arc<dyn ModuleExecutor>,
    link_lock: Arc<ReentrantMutex<()>>,
    base_url: Url,
}

impl Realm {
    /// Start building a realm
    pub fn builder() -> RealmBuilder {
        RealmBuilder::new()
    }

    /// The module map
    pub fn module_map(&self) -> &ModuleMap {
        &self.map
    }

    /// URL that entry specifiers are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an entry specifier against the realm's base URL
    pub fn resolve(&self, specifier: &str) -> std::result::Result<ModuleMapKey, ResolveError> {
        self.resolver.resolve_url(specifier, &self.base_url)
    }

    /// Resolve and load an entry specifier
    pub async fn load(&self, specifier: &str) -> Result<Arc<ModuleMapEntry>> {
        let key = self.resolve(specifier)?;
        Ok(self.load_key(&key).await?)
    }

    /// Load the module graph rooted at `key`
    pub async fn load_key(
        &self,
        key: &ModuleMapKey,
    ) -> std::result::Result<Arc<ModuleMapEntry>, LoadError> {
        self.loader.load(key).await
    }

    /// Instantiate a loaded module and its dependencies
    pub fn instantiate(&self, key: &ModuleMapKey) -> std::result::Result<Arc<Instance>, LinkError> {
        let _guard = self.link_lock.lock();
        Driver::new(&self.map, self.executor.as_ref()).instantiate(key)
    }

    /// Evaluate an instantiated module after its dependencies
    pub fn evaluate(&self, key: &ModuleMapKey) -> std::result::Result<(), EvalError> {
        let _guard = self.link_lock.lock();
        Driver::new(&self.map, self.executor.as_ref()).evaluate(key)
    }

    /// Load, instantiate and evaluate `key`, as a dynamic `import()` would.
    /// Works for any key, inline module blocks included.
    pub async fn import(&self, key: &ModuleMapKey) -> Result<Arc<Instance>> {
        debug!(key = %key, "importing module");
        self.load_key(key).await?;
        let instance = self.instantiate(key)?;
        self.evaluate(key)?;
        Ok(instance)
    }

    /// Resolve `specifier` and [`import`](Self::import) it
    pub async fn import_specifier(&self, specifier: &str) -> Result<Arc<Instance>> {
        let key = self.resolve(specifier)?;
        self.import(&key).await
    }

    /// `import.meta` of a registered module
    pub fn import_meta(&self, key: &ModuleMapKey) -> Option<ImportMeta> {
        self.map.get(key).map(|entry| entry.import_meta())
    }

    /// Whether `key` may be imported from another resource
    pub fn is_exported(&self, key: &ModuleMapKey) -> bool {
        self.map.is_externally_visible(key)
    }

    /// Whether `key` has reached Loaded
    pub fn is_loaded(&self, key: &ModuleMapKey) -> bool {
        self.map.is_loaded(key)
    }

    /// Status of `key`, if registered
    pub fn status(&self, key: &ModuleMapKey) -> Option<ModuleStatus> {
        self.map.status(key)
    }

    /// Every registered entry, sorted by key
    pub fn entries(&self) -> Vec<Arc<ModuleMapEntry>> {
        self.map.snapshot()
    }
}
