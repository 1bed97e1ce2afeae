//! Module-structure syntax tree.
//!
//! Only the parts of a module that decide its shape are modelled: imports,
//! exports and `module` fragment declarations. Every other statement is kept as
//! an opaque [`CodeBlock`] that points back into the source text.

use crate::lexer::Span;
use std::fmt;
use std::sync::Arc;

/// Local binding name used for `export default <expression>`.
pub const DEFAULT_EXPORT_LOCAL: &str = "*default*";

/// A parsed module: source text plus its top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModule {
    /// The complete source text
    pub source: Arc<str>,
    /// The top-level statements
    pub body: Vec<Statement>,
}

impl ParsedModule {
    /// Returns the source text covered by `span`.
    pub fn text(&self, span: Span) -> &str {
        span.text(&self.source)
    }
}

/// A top-level statement of a module or module fragment body.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `import ... from ...`
    Import(ImportDeclaration),
    /// `export ...`
    Export(ExportDeclaration),
    /// `module Name { ... }` at statement position
    Module(ModuleDeclaration),
    /// Any other statement, kept as source text
    Code(CodeBlock),
}

impl Statement {
    /// Returns the source span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Statement::Import(import) => import.span,
            Statement::Export(export) => export.span,
            Statement::Module(module) => module.span,
            Statement::Code(code) => code.span,
        }
    }
}

/// A module specifier as written in an import or re-export.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleSpecifier {
    /// A string literal: `from "./lib.js"`
    Url(String),
    /// A bare identifier naming a module fragment: `from countBlock`
    Fragment(String),
}

impl ModuleSpecifier {
    /// Returns the raw specifier text.
    pub fn as_str(&self) -> &str {
        match self {
            ModuleSpecifier::Url(url) => url,
            ModuleSpecifier::Fragment(name) => name,
        }
    }
}

impl fmt::Display for ModuleSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSpecifier::Url(url) => write!(f, "\"{}\"", url),
            ModuleSpecifier::Fragment(name) => write!(f, "{}", name),
        }
    }
}

/// An import declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDeclaration {
    /// The module being imported
    pub specifier: ModuleSpecifier,
    /// Bindings introduced; empty for `import "x"`
    pub bindings: Vec<ImportBinding>,
    /// Source span
    pub span: Span,
}

/// A single binding introduced by an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    /// `import foo from "m"`
    Default {
        /// Local name
        local: String,
    },
    /// `import { foo as bar } from "m"`
    Named {
        /// Name exported by the target module
        imported: String,
        /// Local name
        local: String,
    },
    /// `import * as ns from "m"`
    Namespace {
        /// Local name
        local: String,
    },
}

impl ImportBinding {
    /// Returns the local binding name.
    pub fn local(&self) -> &str {
        match self {
            ImportBinding::Default { local }
            | ImportBinding::Named { local, .. }
            | ImportBinding::Namespace { local } => local,
        }
    }
}

/// An export declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDeclaration {
    /// What is exported
    pub kind: ExportKind,
    /// Source span
    pub span: Span,
}

/// The forms an export declaration can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportKind {
    /// `export { a, b as c }` or `export { a } from "m"`
    Named {
        /// Exported names
        specifiers: Vec<ExportSpecifier>,
        /// Source module for re-exports
        from: Option<ModuleSpecifier>,
    },
    /// `export * from "m"` or `export * as ns from "m"`
    All {
        /// Source module
        from: ModuleSpecifier,
        /// Namespace alias
        alias: Option<String>,
    },
    /// `export function f() {}`, `export const a = 1, b = 2`, ...
    Declaration {
        /// Declared (and exported) names
        names: Vec<String>,
        /// The declaration itself
        code: CodeBlock,
    },
    /// `export default ...`
    Default {
        /// Local binding; [`DEFAULT_EXPORT_LOCAL`] unless a named function or class
        local: String,
        /// The exported expression or declaration
        code: CodeBlock,
    },
}

/// One `local as exported` pair in an export clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSpecifier {
    /// Local (or, for re-exports, imported) name
    pub local: String,
    /// Name visible to importers
    pub exported: String,
}

/// Where a `module` declaration appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationPosition {
    /// At statement level of a module or fragment body
    Statement,
    /// Nested inside other code (function body, block, expression)
    Nested,
}

/// A `module Name { ... }` declaration or anonymous `module { ... }` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDeclaration {
    /// Fragment name; `None` for anonymous module blocks
    pub name: Option<String>,
    /// Whether the declaration was preceded by `export`
    pub exported: bool,
    /// Statement-level or nested
    pub position: DeclarationPosition,
    /// The fragment's own top-level statements
    pub body: Vec<Statement>,
    /// Span of the whole declaration
    pub span: Span,
    /// Span between the braces
    pub body_span: Span,
}

/// Statements the structural parser does not model.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    /// Source span
    pub span: Span,
    /// `module` declarations found inside this code
    pub inline_modules: Vec<ModuleDeclaration>,
}
