// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Syntax errors reported by the module-structure parser.

use crate::lexer::Span;
use thiserror::Error;

/// Result type for parsing operations
pub type Result<T> = std::result::Result<T, SyntaxError>;

/// A syntax error with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SyntaxError: {message} ({line}:{column})")]
pub struct SyntaxError {
    /// Description of the problem
    pub message: String,
    /// Offending source range
    pub span: Span,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number, counted in characters
    pub column: usize,
}

impl SyntaxError {
    /// Creates a syntax error located at `span` within `source`.
    pub fn new(message: impl Into<String>, span: Span, source: &str) -> Self {
        let (line, column) = line_column(source, span.start);
        Self {
            message: message.into(),
            span,
            line,
            column,
        }
    }
}

/// Converts a byte offset into a 1-based (line, column) pair.
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let source = "let a;\nlet b;\n  oops";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 7), (2, 1));
        assert_eq!(line_column(source, 16), (3, 3));
    }

    #[test]
    fn test_display() {
        let err = SyntaxError::new("unexpected token", Span::new(7, 8), "let a;\n}");
        assert_eq!(err.to_string(), "SyntaxError: unexpected token (2:1)");
    }
}
