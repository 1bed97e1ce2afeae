// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Import maps
//!
//! Specifier overrides applied before URL resolution. The concrete
//! [`ImportMap`] reads the JSON import map format:
//!
//! ```json
//! {
//!   "imports": { "lodash": "/vendor/lodash.js", "lib/": "/src/lib/" },
//!   "scopes": { "/legacy/": { "lodash": "/vendor/lodash-v3.js" } }
//! }
//! ```

use crate::error::ImportMapError;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::trace;
use url::Url;

/// Rewrites specifiers before they are resolved against the referrer.
pub trait ImportMapOverride: Send + Sync {
    /// Returns the replacement for `specifier` as written in a module whose
    /// base URL is `base_url`, or `None` to leave it unchanged.
    fn override_specifier(&self, specifier: &str, base_url: &Url) -> Option<String>;
}

#[derive(Debug, Default, Deserialize)]
struct RawImportMap {
    #[serde(default)]
    imports: HashMap<String, String>,
    #[serde(default)]
    scopes: HashMap<String, HashMap<String, String>>,
}

/// Specifier map sorted so that longer keys are tried first
#[derive(Debug, Clone, Default)]
struct SpecifierMap {
    entries: Vec<(String, Url)>,
}

impl SpecifierMap {
    fn parse(raw: HashMap<String, String>, base: &Url) -> Result<Self, ImportMapError> {
        let mut entries = Vec::with_capacity(raw.len());
        for (key, address) in raw {
            let Some(key) = normalize_key(&key, base) else {
                continue;
            };
            let address = base
                .join(&address)
                .map_err(|e| ImportMapError::InvalidEntry {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            if key.ends_with('/') && !address.as_str().ends_with('/') {
                return Err(ImportMapError::InvalidEntry {
                    key,
                    reason: "address of a trailing-slash key must end with '/'".into(),
                });
            }
            entries.push((key, address));
        }
        entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Ok(Self { entries })
    }

    fn lookup(&self, normalized: &str) -> Option<String> {
        for (key, address) in &self.entries {
            if key == normalized {
                return Some(address.to_string());
            }
            if key.ends_with('/') {
                if let Some(rest) = normalized.strip_prefix(key.as_str()) {
                    return address.join(rest).ok().map(|url| url.to_string());
                }
            }
        }
        None
    }
}

/// A parsed JSON import map.
#[derive(Debug, Clone, Default)]
pub struct ImportMap {
    imports: SpecifierMap,
    /// (scope prefix, map), longest prefix first
    scopes: Vec<(String, SpecifierMap)>,
}

impl ImportMap {
    /// Parse import map JSON. Relative addresses and scope prefixes are
    /// resolved against `base_url`, the URL of the import map itself.
    pub fn from_json(json: &str, base_url: &Url) -> Result<Self, ImportMapError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(ImportMapError::Json(
                "top-level value must be a JSON object".to_string(),
            ));
        }
        let raw: RawImportMap = serde_json::from_value(value)?;

        let imports = SpecifierMap::parse(raw.imports, base_url)?;

        let mut scopes = Vec::with_capacity(raw.scopes.len());
        for (prefix, map) in raw.scopes {
            let prefix = base_url
                .join(&prefix)
                .map_err(|e| ImportMapError::InvalidEntry {
                    key: prefix.clone(),
                    reason: e.to_string(),
                })?;
            scopes.push((prefix.to_string(), SpecifierMap::parse(map, base_url)?));
        }
        scopes.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Ok(Self { imports, scopes })
    }

    /// Whether the map contains no mappings at all
    pub fn is_empty(&self) -> bool {
        self.imports.entries.is_empty() && self.scopes.is_empty()
    }

    /// Resolve `specifier` through the map, returning the mapped URL.
    pub fn resolve(&self, specifier: &str, base_url: &Url) -> Option<String> {
        let normalized = normalize_key(specifier, base_url)?;
        let referrer = base_url.as_str();

        for (prefix, map) in &self.scopes {
            let in_scope = referrer == prefix || (prefix.ends_with('/') && referrer.starts_with(prefix.as_str()));
            if in_scope {
                if let Some(mapped) = map.lookup(&normalized) {
                    return Some(mapped);
                }
            }
        }

        self.imports.lookup(&normalized)
    }
}

impl ImportMapOverride for ImportMap {
    fn override_specifier(&self, specifier: &str, base_url: &Url) -> Option<String> {
        let mapped = self.resolve(specifier, base_url)?;
        trace!(specifier, mapped = %mapped, "import map override");
        Some(mapped)
    }
}

/// URL-like specifiers are compared in resolved form; bare specifiers as written.
fn normalize_key(specifier: &str, base: &Url) -> Option<String> {
    if specifier.is_empty() {
        return None;
    }
    if is_relative(specifier) {
        return base.join(specifier).ok().map(|url| url.to_string());
    }
    match Url::parse(specifier) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Some(specifier.to_string()),
    }
}

pub(crate) fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/app/").unwrap()
    }

    #[test]
    fn test_bare_and_prefix_mappings() {
        let map = ImportMap::from_json(
            r#"{ "imports": {
                "lodash": "/vendor/lodash.js",
                "lib/": "./lib/",
                "lib/special": "/special.js"
            } }"#,
            &base(),
        )
        .unwrap();

        let referrer = Url::parse("https://example.com/app/main.js").unwrap();
        assert_eq!(
            map.resolve("lodash", &referrer).as_deref(),
            Some("https://example.com/vendor/lodash.js")
        );
        assert_eq!(
            map.resolve("lib/util.js", &referrer).as_deref(),
            Some("https://example.com/app/lib/util.js")
        );
        // exact key wins over the shorter prefix
        assert_eq!(
            map.resolve("lib/special", &referrer).as_deref(),
            Some("https://example.com/special.js")
        );
        assert_eq!(map.resolve("react", &referrer), None);
    }

    #[test]
    fn test_scopes_take_precedence() {
        let map = ImportMap::from_json(
            r#"{
                "imports": { "dep": "/dep-v2.js" },
                "scopes": { "/app/legacy/": { "dep": "/dep-v1.js" } }
            }"#,
            &base(),
        )
        .unwrap();

        let legacy = Url::parse("https://example.com/app/legacy/old.js").unwrap();
        let modern = Url::parse("https://example.com/app/new.js").unwrap();
        assert_eq!(
            map.resolve("dep", &legacy).as_deref(),
            Some("https://example.com/dep-v1.js")
        );
        assert_eq!(
            map.resolve("dep", &modern).as_deref(),
            Some("https://example.com/dep-v2.js")
        );
    }

    #[test]
    fn test_url_keys_are_normalized() {
        let map = ImportMap::from_json(
            r#"{ "imports": { "./shim.js": "./real.js" } }"#,
            &base(),
        )
        .unwrap();
        let referrer = Url::parse("https://example.com/app/main.js").unwrap();
        assert_eq!(
            map.resolve("./shim.js", &referrer).as_deref(),
            Some("https://example.com/app/real.js")
        );
    }

    #[test]
    fn test_invalid_maps() {
        assert!(ImportMap::from_json("[]", &base()).is_err());
        assert!(ImportMap::from_json("[{}, {}]", &base()).is_err());
        assert!(ImportMap::from_json("null", &base()).is_err());
        assert!(ImportMap::from_json("1", &base()).is_err());
        assert!(ImportMap::from_json(r#"{ "imports": [] }"#, &base()).is_err());
        assert!(ImportMap::from_json(r#"{ "imports": { "a/": "/b.js" } }"#, &base()).is_err());
        assert!(ImportMap::from_json("{}", &base()).unwrap().is_empty());
    }
}
