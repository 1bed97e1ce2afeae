// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader
//!
//! Everything that can be cached in a module map entry is `Clone`: a failed
//! entry hands the same error to every later caller.

use crate::key::ModuleMapKey;
use spacey_syntax::SyntaxError;
use std::fmt;
use thiserror::Error;

/// Result type for realm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the realm host interface
#[derive(Debug, Error)]
pub enum Error {
    /// Entry specifier could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Loading failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Linking failed
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Evaluation failed
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid import map
    #[error(transparent)]
    ImportMap(#[from] ImportMapError),
}

/// Specifier resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Specifier is neither a valid URL nor a relative reference
    #[error("Invalid module specifier '{specifier}': {reason}")]
    InvalidSpecifier {
        /// The specifier as written
        specifier: String,
        /// Why it was rejected
        reason: String,
    },

    /// Fragment name is not in scope, does not exist, or is not exported
    #[error("Unbound fragment reference '{specifier}' from {referrer}: {reason}")]
    UnboundFragmentReference {
        /// Fragment name or key being referenced
        specifier: String,
        /// Module containing the reference
        referrer: String,
        /// Why the reference is unbound
        reason: String,
    },
}

/// Fragment extraction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// Two statement-level fragments in one body share a name
    #[error("Duplicate fragment name '{name}' in {scope}")]
    DuplicateFragmentName {
        /// The repeated name
        name: String,
        /// Body containing both declarations
        scope: String,
    },

    /// Two exports in one body share an exported name
    #[error("Duplicate export '{name}' in {scope}")]
    DuplicateExport {
        /// The repeated name
        name: String,
        /// Body containing both exports
        scope: String,
    },
}

/// Errors reported by a [`Fetcher`](crate::fetch::Fetcher)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No resource at the URL
    #[error("Cannot find module '{0}'")]
    NotFound(String),

    /// Reading the resource failed
    #[error("Failed to read {url}: {message}")]
    Io {
        /// Resource URL
        url: String,
        /// Underlying error message
        message: String,
    },

    /// Server answered with a non-success status
    #[error("Failed to fetch {url}: HTTP {status}")]
    Http {
        /// Resource URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Transport failure
    #[error("Network error fetching {url}: {message}")]
    Network {
        /// Resource URL
        url: String,
        /// Underlying error message
        message: String,
    },

    /// No fetcher handles the URL scheme
    #[error("Unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme {
        /// Resource URL
        url: String,
        /// The rejected scheme
        scheme: String,
    },

    /// Remote fetches are disabled by configuration
    #[error("Remote module {0} not allowed (set allow_remote = true)")]
    RemoteDisabled(String),
}

/// Stage of loading at which an error originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    /// Resolving an import specifier or locating a fragment
    Resolve,
    /// Fetching the resource text
    Fetch,
    /// Parsing the resource text
    Parse,
    /// Extracting fragments
    Extract,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::Resolve => "resolve",
            LoadStage::Fetch => "fetch",
            LoadStage::Parse => "parse",
            LoadStage::Extract => "extract",
        };
        f.write_str(name)
    }
}

/// Underlying cause of a [`LoadError`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadErrorKind {
    /// Specifier resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Fetching failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Parsing failed
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Extraction failed
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// A load failure, tagged with the key and stage where it originated.
///
/// Every entry on the failing import path caches the same error, so the key
/// always names the module where things actually went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load {key} ({stage}): {kind}")]
pub struct LoadError {
    /// Module where the failure originated
    pub key: ModuleMapKey,
    /// Stage of loading
    pub stage: LoadStage,
    /// Cause
    #[source]
    pub kind: LoadErrorKind,
}

impl LoadError {
    /// Create a load error
    pub fn new(key: ModuleMapKey, stage: LoadStage, kind: impl Into<LoadErrorKind>) -> Self {
        Self {
            key,
            stage,
            kind: kind.into(),
        }
    }
}

/// Linking (instantiation) errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Module has not been loaded, or failed to load
    #[error("Module {key} is not loaded")]
    NotLoaded {
        /// The module
        key: ModuleMapKey,
    },

    /// Requested export does not exist
    #[error("SyntaxError: The requested module {target} does not provide an export named '{name}' (imported by {importer})")]
    MissingExport {
        /// Module performing the import or re-export
        importer: ModuleMapKey,
        /// Module expected to provide the export
        target: ModuleMapKey,
        /// Export name
        name: String,
    },

    /// Requested export is provided by more than one `export *`
    #[error("SyntaxError: The requested module {target} contains conflicting star exports for name '{name}' (imported by {importer})")]
    AmbiguousExport {
        /// Module performing the import or re-export
        importer: ModuleMapKey,
        /// Module with the conflicting star exports
        target: ModuleMapKey,
        /// Export name
        name: String,
    },

    /// Export resolution loops back on itself
    #[error("SyntaxError: Detected cycle while resolving name '{name}' in {target} (imported by {importer})")]
    CircularExport {
        /// Module performing the import or re-export
        importer: ModuleMapKey,
        /// Module where resolution started
        target: ModuleMapKey,
        /// Export name
        name: String,
    },
}

/// Evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Module has not been instantiated
    #[error("Module {key} is not instantiated")]
    NotInstantiated {
        /// The module
        key: ModuleMapKey,
    },

    /// A binding was read before initialization
    #[error("ReferenceError: Cannot access '{name}' before initialization (in {key})")]
    Reference {
        /// Module reading the binding
        key: ModuleMapKey,
        /// Local binding name
        name: String,
    },

    /// The module body threw
    #[error("Uncaught {message} (in {key})")]
    Thrown {
        /// Module whose body threw
        key: ModuleMapKey,
        /// Thrown value, rendered
        message: String,
    },
}

impl EvalError {
    /// Error for a body that threw `message`
    pub fn thrown(key: &ModuleMapKey, message: impl Into<String>) -> Self {
        EvalError::Thrown {
            key: key.clone(),
            message: message.into(),
        }
    }
}

/// Terminal failure cached in a module map entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleFailure {
    /// Failed while loading
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Failed while linking
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Failed while evaluating
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Import map errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportMapError {
    /// Not valid import map JSON
    #[error("Invalid import map: {0}")]
    Json(String),

    /// A mapped address or scope is not a valid URL
    #[error("Invalid import map entry '{key}': {reason}")]
    InvalidEntry {
        /// Specifier key or scope prefix
        key: String,
        /// Why it was rejected
        reason: String,
    },
}

impl From<serde_json::Error> for ImportMapError {
    fn from(err: serde_json::Error) -> Self {
        ImportMapError::Json(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config file path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("Invalid config {path}: {source}")]
    Toml {
        /// Config file path
        path: String,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Import map file could not be read
    #[error("Failed to read import map {path}: {source}")]
    ImportMap {
        /// Import map path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Unknown key or unparsable value
    #[error("Invalid config value for '{key}': {value}")]
    InvalidValue {
        /// Config key
        key: String,
        /// Offending value
        value: String,
    },
}
