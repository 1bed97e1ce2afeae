// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Specifier resolution
//!
//! Resolution is pure: it never fetches, and identical inputs always produce
//! identical keys.
//!
//! - `import { x } from countBlock` names a fragment declared at statement
//!   level of the importing body; any other body's fragments are invisible.
//! - `import { x } from "./lib.js#helpers"` resolves the URL against the
//!   importer's base URL; the URL fragment becomes the key's fragment path.
//! - `import { x } from "#sibling"` is the URL form of a reference into the
//!   importer's own resource.

use crate::error::ResolveError;
use crate::extractor::LexicalScope;
use crate::import_map::{ImportMapOverride, is_relative};
use crate::key::ModuleMapKey;
use spacey_syntax::ModuleSpecifier;
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Resolves import specifiers to module map keys.
#[derive(Clone, Default)]
pub struct Resolver {
    import_map: Option<Arc<dyn ImportMapOverride>>,
}

impl Resolver {
    /// Create a resolver, optionally consulting an import map first
    pub fn new(import_map: Option<Arc<dyn ImportMapOverride>>) -> Self {
        Self { import_map }
    }

    /// Resolve `specifier`, written in a body with base URL `base_url` and
    /// fragment scope `scope`.
    pub fn resolve(
        &self,
        specifier: &ModuleSpecifier,
        base_url: &Url,
        scope: &LexicalScope,
    ) -> Result<ModuleMapKey, ResolveError> {
        let key = match specifier {
            ModuleSpecifier::Fragment(name) => match scope.lookup(name) {
                Some(path) => ModuleMapKey::new(base_url.clone(), path.to_vec()),
                None => {
                    return Err(ResolveError::UnboundFragmentReference {
                        specifier: name.clone(),
                        referrer: base_url.to_string(),
                        reason: "no fragment with this name is declared in the importing module body".into(),
                    });
                }
            },
            ModuleSpecifier::Url(text) => self.resolve_url(text, base_url)?,
        };

        trace!(specifier = %specifier, key = %key, "resolved specifier");
        Ok(key)
    }

    /// Resolve a URL-like specifier against `base_url`.
    pub fn resolve_url(&self, specifier: &str, base_url: &Url) -> Result<ModuleMapKey, ResolveError> {
        let invalid = |reason: String| ResolveError::InvalidSpecifier {
            specifier: specifier.to_string(),
            reason,
        };

        if specifier.is_empty() {
            return Err(invalid("empty specifier".into()));
        }

        let mapped = self
            .import_map
            .as_ref()
            .and_then(|map| map.override_specifier(specifier, base_url));
        let text = mapped.as_deref().unwrap_or(specifier);

        let url = if text.starts_with('#') || is_relative(text) {
            base_url.join(text).map_err(|e| invalid(e.to_string()))?
        } else {
            match Url::parse(text) {
                Ok(url) => url,
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    return Err(invalid(
                        "bare specifiers must be mapped by an import map".into(),
                    ));
                }
                Err(e) => return Err(invalid(e.to_string())),
            }
        };

        ModuleMapKey::from_url(url, specifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import_map::ImportMap;
    use spacey_syntax::parse_module;

    fn base() -> Url {
        Url::parse("https://x/app/main.js").unwrap()
    }

    fn url(text: &str) -> ModuleSpecifier {
        ModuleSpecifier::Url(text.into())
    }

    #[test]
    fn test_relative_urls() {
        let resolver = Resolver::default();
        let scope = LexicalScope::default();

        let key = resolver.resolve(&url("./lib.js"), &base(), &scope).unwrap();
        assert_eq!(key.to_string(), "https://x/app/lib.js");

        let key = resolver.resolve(&url("../shared/util.js#helpers/inner"), &base(), &scope).unwrap();
        assert_eq!(key.url().as_str(), "https://x/shared/util.js");
        assert_eq!(key.path(), ["helpers", "inner"]);

        let key = resolver.resolve(&url("#sibling"), &base(), &scope).unwrap();
        assert_eq!(key.to_string(), "https://x/app/main.js#sibling");

        let key = resolver.resolve(&url("https://cdn/lib.js"), &base(), &scope).unwrap();
        assert!(key.is_root());
    }

    #[test]
    fn test_fragment_references() {
        let parsed = parse_module("module countBlock { module inner {} }").unwrap();
        let extracted = crate::extractor::extract(&parsed).unwrap();
        let resolver = Resolver::default();

        let fragment = ModuleSpecifier::Fragment("countBlock".into());
        let key = resolver.resolve(&fragment, &base(), &extracted.root.scope).unwrap();
        assert_eq!(key.to_string(), "https://x/app/main.js#countBlock");

        // `inner` is only in scope inside countBlock
        let inner = ModuleSpecifier::Fragment("inner".into());
        assert!(matches!(
            resolver.resolve(&inner, &base(), &extracted.root.scope),
            Err(ResolveError::UnboundFragmentReference { .. })
        ));
    }

    #[test]
    fn test_invalid_specifiers() {
        let resolver = Resolver::default();
        let scope = LexicalScope::default();

        for specifier in ["lodash", "", "./a.js#", "./a.js#a//b", "./a.js#9"] {
            let result = resolver.resolve(&url(specifier), &base(), &scope);
            if specifier == "./a.js#" {
                // an empty fragment names the top-level module
                assert!(result.unwrap().is_root());
            } else {
                assert!(
                    matches!(result, Err(ResolveError::InvalidSpecifier { .. })),
                    "{specifier} should be invalid"
                );
            }
        }
    }

    #[test]
    fn test_import_map_applies_first() {
        let map = ImportMap::from_json(
            r#"{ "imports": { "lodash": "https://cdn/lodash.js", "./old.js": "./new.js" } }"#,
            &Url::parse("https://x/app/").unwrap(),
        )
        .unwrap();
        let resolver = Resolver::new(Some(Arc::new(map)));
        let scope = LexicalScope::default();

        let key = resolver.resolve(&url("lodash"), &base(), &scope).unwrap();
        assert_eq!(key.to_string(), "https://cdn/lodash.js");

        let key = resolver.resolve(&url("./old.js"), &base(), &scope).unwrap();
        assert_eq!(key.to_string(), "https://x/app/new.js");
    }
}
