// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Parsing module source text

use spacey_syntax::{ParsedModule, SyntaxError};

/// Turns module source text into its module-level structure.
pub trait ModuleParser: Send + Sync {
    /// Parse `source`. Must be pure.
    fn parse(&self, source: &str) -> Result<ParsedModule, SyntaxError>;
}

/// The `spacey-syntax` module-structure parser
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntaxParser;

impl ModuleParser for SyntaxParser {
    fn parse(&self, source: &str) -> Result<ParsedModule, SyntaxError> {
        spacey_syntax::parse_module(source)
    }
}
