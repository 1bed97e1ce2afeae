// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-syntax
//!
//! Module-structure parsing for JavaScript with module fragments.
//!
//! ## Overview
//!
//! This crate turns module source text into a syntax tree that records what
//! a module loader needs to know:
//! - `import` declarations and their bindings
//! - `export` declarations, including re-exports
//! - `module Name { ... }` fragment declarations, nested to any depth
//!
//! Everything else is kept as opaque source spans.
//!
//! ## Quick Start
//!
//! ```rust
//! use spacey_syntax::{Statement, parse_module};
//!
//! let module = parse_module(
//!     "export module uppercase { export const up = s => s.toUpperCase(); }",
//! ).unwrap();
//!
//! let Statement::Module(fragment) = &module.body[0] else { panic!() };
//! assert_eq!(fragment.name.as_deref(), Some("uppercase"));
//! assert!(fragment.exported);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use error::{Result, SyntaxError};
pub use lexer::{Span, is_identifier_name};
pub use parser::Parser;

/// Parses `source` as a module.
pub fn parse_module(source: &str) -> Result<ParsedModule> {
    Parser::new(source).parse_module()
}
