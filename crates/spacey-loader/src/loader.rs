// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loading module graphs
//!
//! Loading runs in two phases:
//!
//! 1. **Discovery** walks the graph breadth-first. Each wave fetches the
//!    distinct resources it needs concurrently; every resource is fetched,
//!    parsed and extracted at most once per loader, and its top-level module
//!    and fragments are registered the moment extraction succeeds. Then the
//!    requests of each body are resolved into a plan.
//! 2. **Link** walks the plan depth-first under the realm's link lock and
//!    commits the Loading/Loaded/Failed transitions. Import cycles become
//!    Loaded as a whole once every member is done. A failure anywhere on an
//!    import path fails every entry on that path, and every member of an
//!    unfinished cycle, with the same error.
//!
//! Nothing is evaluated here and no sibling fragment is touched unless some
//! body actually requests it.

use crate::error::{LoadError, LoadErrorKind, LoadStage, ResolveError};
use crate::extractor::{ExtractedModule, FragmentForm, extract};
use crate::fetch::Fetcher;
use crate::key::ModuleMapKey;
use crate::module_map::{Declaration, ModuleMap, ModuleMapEntry, ModuleStatus};
use crate::parser::ModuleParser;
use crate::resolver::Resolver;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::ReentrantMutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

/// A fetched, parsed and extracted resource
#[derive(Debug)]
struct Resource {
    extracted: ExtractedModule,
}

/// Why a resource could not be turned into modules
#[derive(Debug, Clone)]
struct ResourceFailure {
    stage: LoadStage,
    kind: LoadErrorKind,
}

impl ResourceFailure {
    fn new(stage: LoadStage, kind: impl Into<LoadErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    fn for_key(&self, key: &ModuleMapKey) -> LoadError {
        LoadError::new(key.clone(), self.stage, self.kind.clone())
    }
}

type ResourceCell = Arc<OnceCell<Result<Arc<Resource>, ResourceFailure>>>;

/// What discovery decided about one module
#[derive(Debug)]
enum PlanNode {
    /// Dependencies in request order
    Ready(Vec<ModuleMapKey>),
    /// The module itself cannot load
    Failed(LoadError),
}

type Plan = FxHashMap<ModuleMapKey, PlanNode>;

/// Bookkeeping for the link walk: DFS indices and the modules whose
/// component is not finished yet, with their dependencies.
#[derive(Default)]
struct LinkWalk {
    index: FxHashMap<ModuleMapKey, usize>,
    stack: Vec<(ModuleMapKey, Vec<ModuleMapKey>)>,
    next: usize,
}

/// Loads module graphs into a [`ModuleMap`].
pub struct Loader {
    map: Arc<ModuleMap>,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn ModuleParser>,
    resolver: Resolver,
    resources: DashMap<Url, ResourceCell>,
    fetch_limit: Option<Semaphore>,
    link_lock: Arc<ReentrantMutex<()>>,
}

impl Loader {
    /// Create a loader filling `map`.
    ///
    /// `max_concurrent_fetches` bounds in-flight fetches; `None` or zero means
    /// unbounded. `link_lock` serializes state transitions with the rest of
    /// the realm.
    pub fn new(
        map: Arc<ModuleMap>,
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn ModuleParser>,
        resolver: Resolver,
        max_concurrent_fetches: Option<usize>,
        link_lock: Arc<ReentrantMutex<()>>,
    ) -> Self {
        Self {
            map,
            fetcher,
            parser,
            resolver,
            resources: DashMap::new(),
            fetch_limit: max_concurrent_fetches
                .filter(|&limit| limit > 0)
                .map(Semaphore::new),
            link_lock,
        }
    }

    /// The module map being filled
    pub fn module_map(&self) -> &Arc<ModuleMap> {
        &self.map
    }

    /// Load `key` and everything it statically depends on.
    ///
    /// Returns immediately for modules that are already loaded or failed to
    /// load. Concurrent loads of overlapping graphs share fetches.
    pub async fn load(&self, key: &ModuleMapKey) -> Result<Arc<ModuleMapEntry>, LoadError> {
        let entry = self.map.register(key);
        if entry.is_loaded() {
            return Ok(entry);
        }
        if let Some(err) = entry.load_failure() {
            return Err(err);
        }

        let plan = self.discover(key).await;

        let _guard = self.link_lock.lock();
        let mut walk = LinkWalk::default();
        match self.link(key, &plan, &mut walk, None) {
            Ok((entry, _)) => {
                info!(key = %key, modules = plan.len(), "loaded module graph");
                Ok(entry)
            }
            Err(err) => {
                self.abandon(&mut walk, &err);
                warn!(key = %key, error = %err, "module graph failed to load");
                Err(err)
            }
        }
    }

    async fn discover(&self, root: &ModuleMapKey) -> Plan {
        let mut plan = Plan::default();
        let mut seen = FxHashSet::default();
        seen.insert(root.clone());
        let mut wave = vec![root.clone()];

        while !wave.is_empty() {
            // settled entries keep their outcome
            wave.retain(|key| {
                let entry = self.map.register(key);
                !entry.is_loaded() && entry.status() != ModuleStatus::Failed
            });

            let mut urls: Vec<Url> = Vec::new();
            for key in &wave {
                if !urls.contains(key.url()) {
                    urls.push(key.url().clone());
                }
            }
            debug!(modules = wave.len(), resources = urls.len(), "discovering wave");

            let fetched = join_all(urls.iter().map(|url| self.resource(url))).await;
            let resources: FxHashMap<Url, _> = urls.into_iter().zip(fetched).collect();

            let mut next = Vec::new();
            for key in wave {
                let Some(resource) = resources.get(key.url()) else {
                    continue;
                };
                let node = match resource {
                    Ok(resource) => self.plan_module(&key, resource),
                    Err(failure) => PlanNode::Failed(failure.for_key(&key)),
                };
                if let PlanNode::Ready(deps) = &node {
                    for dep in deps {
                        if seen.insert(dep.clone()) {
                            next.push(dep.clone());
                        }
                    }
                }
                plan.insert(key, node);
            }
            wave = next;
        }

        plan
    }

    fn plan_module(&self, key: &ModuleMapKey, resource: &Resource) -> PlanNode {
        let Some(body) = resource.extracted.body(key.path()) else {
            return PlanNode::Failed(LoadError::new(
                key.clone(),
                LoadStage::Resolve,
                ResolveError::UnboundFragmentReference {
                    specifier: key.to_string(),
                    referrer: key.url().to_string(),
                    reason: "the resource declares no such fragment".into(),
                },
            ));
        };

        let entry = self.map.register(key);
        let mut deps = Vec::with_capacity(body.requests.len());
        for request in &body.requests {
            match self.resolver.resolve(request, entry.base_url(), &body.scope) {
                Ok(dep) => deps.push(dep),
                Err(err) => {
                    return PlanNode::Failed(LoadError::new(key.clone(), LoadStage::Resolve, err));
                }
            }
        }
        PlanNode::Ready(deps)
    }

    async fn resource(&self, url: &Url) -> Result<Arc<Resource>, ResourceFailure> {
        let cell = Arc::clone(self.resources.entry(url.clone()).or_default().value());
        cell.get_or_init(|| self.fetch_resource(url)).await.clone()
    }

    async fn fetch_resource(&self, url: &Url) -> Result<Arc<Resource>, ResourceFailure> {
        let _permit = match &self.fetch_limit {
            Some(limit) => limit.acquire().await.ok(),
            None => None,
        };

        debug!(url = %url, "fetching module resource");
        let source = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|err| ResourceFailure::new(LoadStage::Fetch, err))?;
        let parsed = self
            .parser
            .parse(&source)
            .map_err(|err| ResourceFailure::new(LoadStage::Parse, err))?;
        let extracted =
            extract(&parsed).map_err(|err| ResourceFailure::new(LoadStage::Extract, err))?;

        self.map
            .register(&ModuleMapKey::root(url.clone()))
            .attach(Declaration::Module(Arc::clone(&extracted.root)));
        for fragment in &extracted.fragments {
            let key = ModuleMapKey::new(url.clone(), fragment.path.clone());
            self.map
                .register(&key)
                .attach(Declaration::Fragment(Arc::clone(fragment)));
        }
        debug!(url = %url, fragments = extracted.fragments.len(), "registered resource");

        Ok(Arc::new(Resource { extracted }))
    }

    /// Depth-first walk over the plan. Members of an import cycle stay
    /// Loading until the whole strongly connected component is done, so a
    /// cycle is committed as Loaded only together.
    fn link(
        &self,
        key: &ModuleMapKey,
        plan: &Plan,
        walk: &mut LinkWalk,
        referrer: Option<&ModuleMapKey>,
    ) -> Result<(Arc<ModuleMapEntry>, usize), LoadError> {
        let entry = self.map.register(key);
        if entry.is_loaded() {
            return Ok((entry, usize::MAX));
        }
        if let Some(err) = entry.load_failure() {
            return Err(err);
        }
        if entry.status() == ModuleStatus::Loading {
            // import cycle back into the component being walked
            let index = walk.index.get(key).copied().unwrap_or(usize::MAX);
            return Ok((entry, index));
        }

        let deps = match plan.get(key) {
            Some(PlanNode::Ready(deps)) => deps.clone(),
            Some(PlanNode::Failed(err)) => return Err(self.fail(&entry, err.clone())),
            None => {
                let err = LoadError::new(
                    key.clone(),
                    LoadStage::Resolve,
                    ResolveError::UnboundFragmentReference {
                        specifier: key.to_string(),
                        referrer: referrer.map(ToString::to_string).unwrap_or_default(),
                        reason: "module was not discovered".into(),
                    },
                );
                return Err(self.fail(&entry, err));
            }
        };

        let index = walk.next;
        walk.next += 1;
        walk.index.insert(key.clone(), index);
        let position = walk.stack.len();
        walk.stack.push((key.clone(), deps.clone()));
        self.map.mark_loading(key);

        let mut low = index;
        for dep in &deps {
            let result = self
                .check_importable(key, dep)
                .and_then(|()| self.link(dep, plan, walk, Some(key)));
            match result {
                Ok((_, dep_low)) => low = low.min(dep_low),
                Err(err) => return Err(self.fail(&entry, err)),
            }
        }

        if low == index {
            let component: Vec<_> = walk.stack.drain(position..).collect();
            for (member, deps) in component {
                debug!(key = %member, dependencies = deps.len(), "module loaded");
                self.map.mark_loaded(&member, deps);
            }
        }
        Ok((entry, low))
    }

    /// Fail every module still waiting on an unfinished component
    fn abandon(&self, walk: &mut LinkWalk, err: &LoadError) {
        for (member, _) in walk.stack.drain(..) {
            if self.map.status(&member) == Some(ModuleStatus::Loading) {
                debug!(key = %member, origin = %err.key, "marking cycle member failed");
                self.map.mark_failed(&member, err.clone());
            }
        }
    }

    /// A fragment may be requested from another resource only when it and all
    /// its enclosing fragments are exported. Inline fragments are values and
    /// cannot be imported statically at all.
    fn check_importable(
        &self,
        importer: &ModuleMapKey,
        dep: &ModuleMapKey,
    ) -> Result<(), LoadError> {
        let Some(declaration) = self.map.get(dep).and_then(|entry| entry.declaration().cloned()) else {
            return Ok(());
        };

        let reason = if declaration.form() == Some(FragmentForm::InlineValue) {
            "inline module blocks can only be imported dynamically"
        } else if !dep.same_resource(importer) && !self.map.is_externally_visible(dep) {
            "fragment is not exported from its resource"
        } else {
            return Ok(());
        };

        Err(LoadError::new(
            importer.clone(),
            LoadStage::Resolve,
            ResolveError::UnboundFragmentReference {
                specifier: dep.to_string(),
                referrer: importer.to_string(),
                reason: reason.into(),
            },
        ))
    }

    fn fail(&self, entry: &ModuleMapEntry, err: LoadError) -> LoadError {
        debug!(key = %entry.key(), origin = %err.key, "marking module failed");
        self.map.mark_failed(entry.key(), err.clone());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::parser::SyntaxParser;

    fn loader(fetcher: Arc<MemoryFetcher>) -> Loader {
        Loader::new(
            Arc::new(ModuleMap::new()),
            fetcher,
            Arc::new(SyntaxParser),
            Resolver::default(),
            None,
            Arc::new(ReentrantMutex::new(())),
        )
    }

    fn key(text: &str) -> ModuleMapKey {
        ModuleMapKey::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_load_registers_fragments_lazily() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(
            "https://x/app.js",
            "module a { export const x = 1; } module b { export const y = 2; } import { x } from a;",
        );
        let loader = loader(fetcher.clone());

        loader.load(&key("https://x/app.js")).await.unwrap();

        let map = loader.module_map();
        assert!(map.is_loaded(&key("https://x/app.js#a")));
        assert_eq!(map.status(&key("https://x/app.js#b")), Some(ModuleStatus::Registered));
        assert_eq!(fetcher.fetch_count("https://x/app.js"), 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_ancestor() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x/a.js", "import './b.js';");
        fetcher.insert("https://x/b.js", "import './missing.js';");
        let loader = loader(fetcher);

        let err = loader.load(&key("https://x/a.js")).await.unwrap_err();
        assert_eq!(err.key, key("https://x/missing.js"));
        assert_eq!(err.stage, LoadStage::Fetch);

        let map = loader.module_map();
        for module in ["https://x/a.js", "https://x/b.js", "https://x/missing.js"] {
            let entry = map.get(&key(module)).unwrap();
            assert_eq!(entry.status(), ModuleStatus::Failed);
            assert_eq!(entry.load_failure(), Some(err.clone()));
        }
    }

    #[tokio::test]
    async fn test_private_fragment_is_not_importable_from_outside() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x/lib.js", "module hidden { export const x = 1; }");
        fetcher.insert("https://x/main.js", "import { x } from './lib.js#hidden';");
        let loader = loader(fetcher);

        let err = loader.load(&key("https://x/main.js")).await.unwrap_err();
        assert_eq!(err.key, key("https://x/main.js"));
        assert!(matches!(
            err.kind,
            LoadErrorKind::Resolve(ResolveError::UnboundFragmentReference { .. })
        ));
        // the fragment itself is untouched
        assert_eq!(
            loader.module_map().status(&key("https://x/lib.js#hidden")),
            Some(ModuleStatus::Registered)
        );
    }

    #[tokio::test]
    async fn test_cycle_loads() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x/a.js", "import './b.js'; export const a = 1;");
        fetcher.insert("https://x/b.js", "import './a.js'; export const b = 2;");
        let loader = loader(fetcher);

        let entry = loader.load(&key("https://x/a.js")).await.unwrap();
        assert_eq!(entry.dependencies(), vec![key("https://x/b.js")]);
        assert_eq!(
            loader.module_map().get(&key("https://x/b.js")).unwrap().dependencies(),
            vec![key("https://x/a.js")]
        );
    }

    #[tokio::test]
    async fn test_failure_inside_cycle_fails_every_member() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x/a.js", "import './b.js';\nimport './missing.js';");
        fetcher.insert("https://x/b.js", "import './a.js';");
        let loader = loader(fetcher);

        let err = loader.load(&key("https://x/a.js")).await.unwrap_err();
        assert_eq!(err.key, key("https://x/missing.js"));

        let map = loader.module_map();
        for module in ["https://x/a.js", "https://x/b.js"] {
            assert_eq!(map.status(&key(module)), Some(ModuleStatus::Failed));
            assert!(!map.is_loaded(&key(module)));
        }
        assert_eq!(loader.load(&key("https://x/b.js")).await.unwrap_err(), err);
    }

    #[tokio::test]
    async fn test_cycle_below_a_loaded_component() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x/main.js", "import './a.js';");
        fetcher.insert("https://x/a.js", "import './b.js';");
        fetcher.insert("https://x/b.js", "import './c.js'; import './a.js';");
        fetcher.insert("https://x/c.js", "export const c = 1;");
        let loader = loader(fetcher);

        loader.load(&key("https://x/main.js")).await.unwrap();
        for module in ["main", "a", "b", "c"] {
            assert!(loader.module_map().is_loaded(&key(&format!("https://x/{}.js", module))));
        }
    }
}
