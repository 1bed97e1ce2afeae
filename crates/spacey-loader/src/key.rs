// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module map keys
//!
//! A key identifies a module within a realm: the URL of the resource that
//! contains it plus the path of fragment names leading from the resource's
//! top-level module down to it.
//!
//! ```text
//! https://example.com/app.js                 top-level module
//! https://example.com/app.js#countBlock      fragment
//! https://example.com/app.js#outer/inner     nested fragment
//! https://example.com/app.js#outer/%0        first inline module in `outer`
//! ```

use crate::error::ResolveError;
use percent_encoding::percent_decode_str;
use spacey_syntax::is_identifier_name;
use std::fmt;
use url::Url;

/// Canonical identity of a module in the module map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleMapKey {
    url: Url,
    path: Vec<String>,
}

impl ModuleMapKey {
    /// Create a key. Any fragment on `url` is discarded.
    pub fn new(mut url: Url, path: Vec<String>) -> Self {
        url.set_fragment(None);
        Self { url, path }
    }

    /// Key of the top-level module of a resource
    pub fn root(url: Url) -> Self {
        Self::new(url, Vec::new())
    }

    /// Parse the textual form `<url>[#seg/seg]`.
    pub fn parse(text: &str) -> Result<Self, ResolveError> {
        let url = Url::parse(text).map_err(|e| ResolveError::InvalidSpecifier {
            specifier: text.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url, text)
    }

    /// Build a key from a resolved URL whose fragment, if any, names the
    /// fragment path.
    pub(crate) fn from_url(url: Url, specifier: &str) -> Result<Self, ResolveError> {
        let path = match url.fragment() {
            None | Some("") => Vec::new(),
            Some(fragment) => parse_path(fragment).ok_or_else(|| ResolveError::InvalidSpecifier {
                specifier: specifier.to_string(),
                reason: format!("'{}' is not a valid fragment path", fragment),
            })?,
        };
        Ok(Self::new(url, path))
    }

    /// URL of the containing resource (no fragment)
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fragment path from the resource root
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Whether this key names the top-level module of its resource
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Nesting depth; the top-level module is at depth 0
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Key of a fragment declared directly inside this module
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(segment.into());
        Self {
            url: self.url.clone(),
            path,
        }
    }

    /// Key of the module this one is declared in
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.path.split_last()?;
        Some(Self {
            url: self.url.clone(),
            path: parent.to_vec(),
        })
    }

    /// Keys from the first fragment below the root down to this key
    pub fn ancestry(&self) -> impl Iterator<Item = ModuleMapKey> + '_ {
        (1..=self.path.len()).map(move |len| Self {
            url: self.url.clone(),
            path: self.path[..len].to_vec(),
        })
    }

    /// Whether both keys live in the same resource
    pub fn same_resource(&self, other: &ModuleMapKey) -> bool {
        self.url == other.url
    }
}

impl fmt::Display for ModuleMapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)?;
        if !self.path.is_empty() {
            write!(f, "#{}", self.path.join("/"))?;
        }
        Ok(())
    }
}

/// Path segment for the `ordinal`-th inline module of a body.
pub fn inline_segment(ordinal: usize) -> String {
    format!("%{}", ordinal)
}

/// Whether `segment` may appear in a fragment path
pub fn is_valid_segment(segment: &str) -> bool {
    match segment.strip_prefix('%') {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => is_identifier_name(segment),
    }
}

fn parse_path(fragment: &str) -> Option<Vec<String>> {
    fragment.split('/').map(decode_segment).collect()
}

/// Decode one percent-encoded fragment segment. Inline segments (`%N`) are
/// taken literally.
fn decode_segment(segment: &str) -> Option<String> {
    if is_valid_segment(segment) {
        return Some(segment.to_string());
    }
    let decoded = percent_decode_str(segment).decode_utf8().ok()?;
    is_identifier_name(&decoded).then(|| decoded.into_owned())
}
