//! Module-structure parser.
//!
//! Transforms a stream of tokens into a [`ParsedModule`](crate::ast::ParsedModule)
//! describing imports, exports and `module` fragment declarations.
//!
//! ## Structure
//!
//! - `parser` - Recursive descent parser over the token stream
//! - `bindings` - Names introduced by `let`/`const`/`var` patterns
//!
//! ## Usage
//!
//! ```rust
//! use spacey_syntax::parser::Parser;
//!
//! let module = Parser::new("module counter { export let i = 0; }")
//!     .parse_module()
//!     .expect("Should parse");
//! assert_eq!(module.body.len(), 1);
//! ```

mod bindings;
#[allow(clippy::module_inception)]
mod parser;

pub use parser::Parser;
