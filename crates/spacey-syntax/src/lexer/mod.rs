//! Lexical analysis (tokenization) for JavaScript module source.
//!
//! The lexer transforms source text into a stream of tokens that the
//! module-structure parser consumes.
//!
//! ## Structure
//!
//! - `scanner.rs` - Main `Scanner` struct that produces tokens
//! - `token.rs` - `Token`, `TokenKind` and `Keyword` definitions
//!
//! ## Usage
//!
//! ```rust
//! use spacey_syntax::lexer::{Scanner, TokenKind};
//!
//! let mut scanner = Scanner::new("module counter { let i = 0; }");
//!
//! loop {
//!     let token = scanner.next_token();
//!     if matches!(token.kind, TokenKind::Eof) {
//!         break;
//!     }
//!     println!("{:?}", token.kind);
//! }
//! ```

mod scanner;
mod token;

pub use scanner::{Scanner, is_id_continue, is_id_start, is_identifier_name};
pub use token::{Keyword, Span, Token, TokenKind};
