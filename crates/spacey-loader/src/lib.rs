// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-loader
//!
//! Module graph resolution and loading for JavaScript module fragments.
//!
//! A resource may declare named modules inline with `module name { ... }`.
//! Each such fragment is a module of its own, keyed by the URL of its
//! resource plus its path of enclosing fragment names, and is loaded,
//! instantiated and evaluated exactly once per realm, and only when
//! something imports it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_loader::{MemoryFetcher, Realm};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> spacey_loader::Result<()> {
//!     let fetcher = Arc::new(MemoryFetcher::new());
//!     fetcher.insert(
//!         "https://example.com/app.js",
//!         "module count { export let n = 1; } import { n } from count;",
//!     );
//!
//!     let realm = Realm::builder().fetcher(fetcher).build()?;
//!     let key = realm.resolve("https://example.com/app.js")?;
//!     realm.import(&key).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! - [`Loader`] fetches, parses and extracts resources and walks the static
//!   import graph, committing entries to the [`ModuleMap`].
//! - [`Driver`] instantiates loaded graphs and evaluates them through a
//!   [`ModuleExecutor`].
//! - [`Realm`] ties both together behind a host-facing API.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod fetch;
pub mod import_map;
pub mod instance;
pub mod key;
pub mod loader;
pub mod module_map;
pub mod parser;
pub mod realm;
pub mod resolver;
pub mod value;

// Re-exports
pub use config::LoaderConfig;
pub use driver::Driver;
pub use error::{
    ConfigError, Error, EvalError, ExtractError, FetchError, ImportMapError, LinkError, LoadError,
    LoadErrorKind, LoadStage, ModuleFailure, ResolveError, Result,
};
pub use executor::{ModuleContext, ModuleExecutor, ScriptedExecutor, TraceExecutor};
pub use extractor::{ExtractedModule, FragmentDeclaration, FragmentForm, ModuleBody, extract};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{FileFetcher, Fetcher, MemoryFetcher, SchemeFetcher};
pub use import_map::{ImportMap, ImportMapOverride};
pub use instance::{ImportMeta, Instance};
pub use key::ModuleMapKey;
pub use loader::Loader;
pub use module_map::{Declaration, ModuleMap, ModuleMapEntry, ModuleStatus};
pub use parser::{ModuleParser, SyntaxParser};
pub use realm::{Realm, RealmBuilder};
pub use resolver::Resolver;
pub use value::{NativeFunction, Value};

/// Version of the loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
