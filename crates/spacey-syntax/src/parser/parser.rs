//! The module-structure parser.

use super::bindings::declared_names;
use crate::ast::*;
use crate::error::{Result, SyntaxError};
use crate::lexer::{Keyword, Scanner, Span, Token, TokenKind};
use std::sync::Arc;

/// How an opaque code run decides where it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeEnd {
    /// At a top-level `;` or before a new import/export/module statement
    Statement,
    /// Additionally at the `}` closing a function or class body
    Declaration,
}

/// A recursive descent parser for the module-level structure of JavaScript.
///
/// Imports, exports and `module` fragment declarations are parsed precisely;
/// everything else is skipped with bracket matching and kept as a
/// [`CodeBlock`] span.
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Scanner::new(source).tokenize(),
            pos: 0,
        }
    }

    /// Parses the source as a module.
    pub fn parse_module(mut self) -> Result<ParsedModule> {
        let body = self.parse_body(false)?;
        Ok(ParsedModule {
            source: Arc::from(self.source),
            body,
        })
    }

    /// Parses statements until end of input, or until the closing `}` of a
    /// fragment body when `in_block` is set.
    fn parse_body(&mut self, in_block: bool) -> Result<Vec<Statement>> {
        let mut body = Vec::new();

        loop {
            match &self.current().kind {
                TokenKind::Eof if in_block => {
                    return Err(self.error_here("unexpected end of input, expected '}'"));
                }
                TokenKind::Eof => break,
                TokenKind::RightBrace if in_block => break,
                TokenKind::Semicolon => self.advance(),
                _ => body.push(self.parse_statement()?),
            }
        }

        Ok(body)
    }

    /// Parses a single statement.
    fn parse_statement(&mut self) -> Result<Statement> {
        if self.at_import_declaration() {
            return self.parse_import().map(Statement::Import);
        }
        if self.check_keyword(Keyword::Export) {
            return self.parse_export();
        }
        if self.at_module_declaration() {
            let start = self.current().span;
            return self
                .parse_module_declaration(start, false, DeclarationPosition::Statement)
                .map(Statement::Module);
        }
        self.parse_code(CodeEnd::Statement).map(Statement::Code)
    }

    fn parse_import(&mut self) -> Result<ImportDeclaration> {
        let start = self.current().span;
        self.advance(); // consume 'import'

        if let TokenKind::String(url) = &self.current().kind {
            let specifier = ModuleSpecifier::Url(url.clone());
            self.advance();
            self.skip_import_attributes()?;
            let end = self.consume_semicolon()?;
            return Ok(ImportDeclaration {
                specifier,
                bindings: Vec::new(),
                span: start.to(end),
            });
        }

        let mut bindings = Vec::new();

        // default binding, unless this is `import from from "x"` style ambiguity
        if let TokenKind::Identifier(name) = &self.current().kind {
            let next = self.peek(1);
            if matches!(next.kind, TokenKind::Comma) || next.is_ident("from") {
                bindings.push(ImportBinding::Default {
                    local: name.clone(),
                });
                self.advance();
                if self.check(&TokenKind::Comma) {
                    self.advance();
                }
            }
        }

        match &self.current().kind {
            TokenKind::Star => {
                self.advance();
                self.expect_ident("as")?;
                let local = self.expect_identifier()?;
                bindings.push(ImportBinding::Namespace { local });
            }
            TokenKind::LeftBrace => {
                self.advance();
                while !self.check(&TokenKind::RightBrace) {
                    let imported = self.expect_export_name()?;
                    let local = if self.current().is_ident("as") {
                        self.advance();
                        self.expect_identifier()?
                    } else {
                        imported.clone()
                    };
                    bindings.push(ImportBinding::Named { imported, local });
                    if !self.check(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.expect(&TokenKind::RightBrace)?;
            }
            _ if bindings.is_empty() => {
                return Err(self.unexpected("in import declaration"));
            }
            _ => {}
        }

        self.expect_ident("from")?;
        let specifier = self.expect_module_specifier()?;
        self.skip_import_attributes()?;
        let end = self.consume_semicolon()?;

        Ok(ImportDeclaration {
            specifier,
            bindings,
            span: start.to(end),
        })
    }

    fn parse_export(&mut self) -> Result<Statement> {
        let start = self.current().span;
        self.advance(); // consume 'export'

        if self.at_module_declaration() {
            return self
                .parse_module_declaration(start, true, DeclarationPosition::Statement)
                .map(Statement::Module);
        }

        let kind = match self.current().kind.clone() {
            TokenKind::Star => {
                self.advance();
                let alias = if self.current().is_ident("as") {
                    self.advance();
                    Some(self.expect_export_name()?)
                } else {
                    None
                };
                self.expect_ident("from")?;
                let from = self.expect_module_specifier()?;
                self.skip_import_attributes()?;
                ExportKind::All { from, alias }
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut specifiers = Vec::new();
                while !self.check(&TokenKind::RightBrace) {
                    let local = self.expect_export_name()?;
                    let exported = if self.current().is_ident("as") {
                        self.advance();
                        self.expect_export_name()?
                    } else {
                        local.clone()
                    };
                    specifiers.push(ExportSpecifier { local, exported });
                    if !self.check(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.expect(&TokenKind::RightBrace)?;
                let from = if self.current().is_ident("from") {
                    self.advance();
                    let from = self.expect_module_specifier()?;
                    self.skip_import_attributes()?;
                    Some(from)
                } else {
                    None
                };
                ExportKind::Named { specifiers, from }
            }
            TokenKind::Keyword(Keyword::Default) => {
                self.advance();
                let local = self
                    .declaration_name()
                    .unwrap_or_else(|| DEFAULT_EXPORT_LOCAL.to_string());
                let end = if self.at_function_or_class() {
                    CodeEnd::Declaration
                } else {
                    CodeEnd::Statement
                };
                let code = self.parse_code(end)?;
                let span = start.to(code.span);
                return Ok(Statement::Export(ExportDeclaration {
                    kind: ExportKind::Default { local, code },
                    span,
                }));
            }
            TokenKind::Keyword(Keyword::Function | Keyword::Class) => {
                return self.parse_exported_declaration(start, CodeEnd::Declaration);
            }
            TokenKind::Identifier(ref word) if word == "async" => {
                return self.parse_exported_declaration(start, CodeEnd::Declaration);
            }
            TokenKind::Keyword(Keyword::Let | Keyword::Const | Keyword::Var) => {
                return self.parse_exported_declaration(start, CodeEnd::Statement);
            }
            _ => return Err(self.unexpected("after 'export'")),
        };

        let end = self.consume_semicolon()?;
        Ok(Statement::Export(ExportDeclaration {
            kind,
            span: start.to(end),
        }))
    }

    fn parse_exported_declaration(&mut self, start: Span, end: CodeEnd) -> Result<Statement> {
        let first = self.pos;
        let names = match self.declaration_name() {
            Some(name) => vec![name],
            None => Vec::new(),
        };
        let code = self.parse_code(end)?;
        let names = if names.is_empty() {
            declared_names(&self.tokens[first..self.pos])
        } else {
            names
        };
        if names.is_empty() {
            return Err(SyntaxError::new(
                "export declaration does not declare a name",
                code.span,
                self.source,
            ));
        }
        let span = start.to(code.span);
        Ok(Statement::Export(ExportDeclaration {
            kind: ExportKind::Declaration { names, code },
            span,
        }))
    }

    /// Returns the name of a function or class declaration starting at the
    /// current token, without consuming anything.
    fn declaration_name(&self) -> Option<String> {
        let mut offset = 0;
        if self.current().is_ident("async") && !self.peek(1).newline_before {
            offset += 1;
        }
        match self.peek(offset).kind {
            TokenKind::Keyword(Keyword::Function) => {
                offset += 1;
                if self.peek(offset).kind == TokenKind::Star {
                    offset += 1;
                }
            }
            TokenKind::Keyword(Keyword::Class) => offset += 1,
            _ => return None,
        }
        match &self.peek(offset).kind {
            TokenKind::Identifier(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn at_function_or_class(&self) -> bool {
        let offset = usize::from(self.current().is_ident("async"));
        matches!(
            self.peek(offset).kind,
            TokenKind::Keyword(Keyword::Function | Keyword::Class)
        )
    }

    /// Parses `module Name { ... }` or `module { ... }`. `start` is the span of
    /// the first token of the declaration (`export` when exported).
    fn parse_module_declaration(
        &mut self,
        start: Span,
        exported: bool,
        position: DeclarationPosition,
    ) -> Result<ModuleDeclaration> {
        self.advance(); // consume 'module'

        let name = match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };

        let open = self.expect(&TokenKind::LeftBrace)?;
        let body = self.parse_body(true)?;
        let close = self.expect(&TokenKind::RightBrace)?;

        Ok(ModuleDeclaration {
            name,
            exported,
            position,
            body,
            span: start.to(close),
            body_span: Span::new(open.end, close.start),
        })
    }

    /// Skips a run of statements the structural parser does not model,
    /// collecting any `module` declarations nested inside it.
    fn parse_code(&mut self, end: CodeEnd) -> Result<CodeBlock> {
        let first = self.pos;
        let start = self.current().span;
        let mut last = start;
        let mut depth = 0usize;
        let mut inline_modules = Vec::new();

        loop {
            let token = self.current().clone();
            match &token.kind {
                TokenKind::Eof if depth > 0 => {
                    return Err(self.error_here("unexpected end of input"));
                }
                TokenKind::Eof => break,
                TokenKind::Invalid(reason) => {
                    return Err(SyntaxError::new(reason.clone(), token.span, self.source));
                }
                TokenKind::Semicolon if depth == 0 => {
                    last = token.span;
                    self.advance();
                    break;
                }
                kind if kind.is_close_bracket() && depth == 0 => {
                    if self.pos == first {
                        return Err(self.unexpected(""));
                    }
                    break;
                }
                _ if self.at_nested_module() && !(depth == 0 && self.starts_statement(first)) => {
                    let declaration =
                        self.parse_module_declaration(token.span, false, DeclarationPosition::Nested)?;
                    last = declaration.span;
                    inline_modules.push(declaration);
                    continue;
                }
                _ if depth == 0 && self.starts_statement(first) => break,
                kind if kind.is_open_bracket() => depth += 1,
                kind if kind.is_close_bracket() => {
                    depth -= 1;
                    if depth == 0
                        && end == CodeEnd::Declaration
                        && token.kind == TokenKind::RightBrace
                    {
                        self.advance();
                        return Ok(CodeBlock {
                            span: start.to(token.span),
                            inline_modules,
                        });
                    }
                }
                _ => {}
            }
            last = token.span;
            self.advance();
        }

        Ok(CodeBlock {
            span: start.to(last),
            inline_modules,
        })
    }

    /// Whether the current token, at depth 0 of a code run that began at
    /// token index `first`, begins a new modelled statement.
    fn starts_statement(&self, first: usize) -> bool {
        self.pos != first
            && self.current().newline_before
            && (self.at_import_declaration()
                || self.check_keyword(Keyword::Export)
                || self.at_module_declaration())
    }

    fn at_import_declaration(&self) -> bool {
        self.check_keyword(Keyword::Import)
            && !matches!(self.peek(1).kind, TokenKind::LeftParen | TokenKind::Dot)
    }

    /// `module` Identifier `{` with no line terminator after `module`.
    fn at_module_declaration(&self) -> bool {
        self.current().is_ident("module")
            && !self.after_member_access()
            && matches!(self.peek(1).kind, TokenKind::Identifier(_))
            && !self.peek(1).newline_before
            && self.peek(2).kind == TokenKind::LeftBrace
    }

    /// A named declaration or an anonymous `module {` block.
    fn at_nested_module(&self) -> bool {
        self.at_module_declaration()
            || (self.current().is_ident("module")
                && !self.after_member_access()
                && self.peek(1).kind == TokenKind::LeftBrace
                && !self.peek(1).newline_before)
    }

    fn after_member_access(&self) -> bool {
        self.pos > 0
            && matches!(
                self.tokens[self.pos - 1].kind,
                TokenKind::Dot | TokenKind::Operator("?.")
            )
    }

    fn skip_import_attributes(&mut self) -> Result<()> {
        let is_attributes = (self.check_keyword(Keyword::With) || self.current().is_ident("assert"))
            && !self.current().newline_before
            && self.peek(1).kind == TokenKind::LeftBrace;
        if !is_attributes {
            return Ok(());
        }
        self.advance();
        self.expect(&TokenKind::LeftBrace)?;
        while !self.check(&TokenKind::RightBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("unterminated import attributes"));
            }
            self.advance();
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(())
    }

    /// Consumes an optional `;`, applying automatic semicolon insertion rules.
    /// Returns the span of the last token belonging to the statement.
    fn consume_semicolon(&mut self) -> Result<Span> {
        let previous = self.tokens[self.pos.saturating_sub(1)].span;
        match self.current().kind {
            TokenKind::Semicolon => {
                let span = self.current().span;
                self.advance();
                Ok(span)
            }
            TokenKind::RightBrace | TokenKind::Eof => Ok(previous),
            _ if self.current().newline_before => Ok(previous),
            _ => Err(self.unexpected("expected ';'")),
        }
    }

    fn expect_module_specifier(&mut self) -> Result<ModuleSpecifier> {
        let specifier = match &self.current().kind {
            TokenKind::String(url) => ModuleSpecifier::Url(url.clone()),
            TokenKind::Identifier(name) => ModuleSpecifier::Fragment(name.clone()),
            _ => return Err(self.unexpected("expected module specifier")),
        };
        self.advance();
        Ok(specifier)
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    /// Export and import names may be any identifier name, including reserved
    /// words, or a string literal.
    fn expect_export_name(&mut self) -> Result<String> {
        let name = match &self.current().kind {
            TokenKind::Identifier(name) | TokenKind::String(name) => name.clone(),
            TokenKind::Keyword(_) => self.current().span.text(self.source).to_string(),
            _ => return Err(self.unexpected("expected export name")),
        };
        self.advance();
        Ok(name)
    }

    fn expect_ident(&mut self, word: &str) -> Result<()> {
        if self.current().is_ident(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", word)))
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Span> {
        if self.check(kind) {
            let span = self.current().span;
            self.advance();
            Ok(span)
        } else {
            Err(self.unexpected(&format!("expected {}", kind.describe())))
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.current().kind == TokenKind::Keyword(keyword)
    }

    fn current(&self) -> &Token {
        self.peek(0)
    }

    fn peek(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn unexpected(&self, context: &str) -> SyntaxError {
        let token = self.current();
        let message = match &token.kind {
            TokenKind::Invalid(reason) => reason.clone(),
            kind if context.is_empty() => format!("unexpected {}", kind.describe()),
            kind => format!("unexpected {} {}", kind.describe(), context),
        };
        SyntaxError::new(message, token.span, self.source)
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message, self.current().span, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedModule {
        Parser::new(source).parse_module().expect("should parse")
    }

    #[test]
    fn test_parse_imports() {
        let module = parse(
            r#"
            import foo from './foo.js';
            import { bar, baz as qux, default as d } from "bar";
            import * as all from 'all';
            import 'side-effect';
            import { count } from countBlock;
            import def, * as ns from "./both.js"
            "#,
        );

        let imports: Vec<&ImportDeclaration> = module
            .body
            .iter()
            .filter_map(|s| match s {
                Statement::Import(import) => Some(import),
                _ => None,
            })
            .collect();

        assert_eq!(imports.len(), 6);
        assert_eq!(imports[0].specifier, ModuleSpecifier::Url("./foo.js".into()));
        assert_eq!(
            imports[0].bindings,
            vec![ImportBinding::Default { local: "foo".into() }]
        );
        assert_eq!(
            imports[1].bindings[1],
            ImportBinding::Named {
                imported: "baz".into(),
                local: "qux".into()
            }
        );
        assert_eq!(
            imports[1].bindings[2],
            ImportBinding::Named {
                imported: "default".into(),
                local: "d".into()
            }
        );
        assert_eq!(
            imports[2].bindings,
            vec![ImportBinding::Namespace { local: "all".into() }]
        );
        assert!(imports[3].bindings.is_empty());
        assert_eq!(imports[4].specifier, ModuleSpecifier::Fragment("countBlock".into()));
        assert_eq!(imports[5].bindings.len(), 2);
    }

    #[test]
    fn test_dynamic_import_is_code() {
        let module = parse("const m = import('./x.js');\nconsole.log(import.meta.url);");
        assert!(module.body.iter().all(|s| matches!(s, Statement::Code(_))));
    }

    #[test]
    fn test_parse_exports() {
        let module = parse(
            r#"
            export default function main() {}
            export { foo, bar as baz };
            export * from 'reexport';
            export * as ns from 'namespace';
            export { x as y } from "./x.js";
            export const a = 1, { b, c: d } = obj, [e, ...f] = arr;
            export async function load() {}
            export class Widget {}
            "#,
        );

        let exports: Vec<&ExportKind> = module
            .body
            .iter()
            .filter_map(|s| match s {
                Statement::Export(export) => Some(&export.kind),
                _ => None,
            })
            .collect();

        assert_eq!(exports.len(), 8);
        assert!(matches!(exports[0], ExportKind::Default { local, .. } if local == "main"));
        assert!(matches!(exports[1], ExportKind::Named { specifiers, from: None } if specifiers.len() == 2));
        assert!(matches!(exports[2], ExportKind::All { alias: None, .. }));
        assert!(matches!(exports[3], ExportKind::All { alias: Some(a), .. } if a == "ns"));
        assert!(matches!(exports[4], ExportKind::Named { from: Some(_), .. }));
        match exports[5] {
            ExportKind::Declaration { names, .. } => {
                assert_eq!(names, &vec!["a", "b", "d", "e", "f"]);
            }
            other => panic!("unexpected export {:?}", other),
        }
        assert!(matches!(exports[6], ExportKind::Declaration { names, .. } if names == &vec!["load"]));
        assert!(matches!(exports[7], ExportKind::Declaration { names, .. } if names == &vec!["Widget"]));
    }

    #[test]
    fn test_export_default_expression() {
        let module = parse("export default 40 + 2;");
        match &module.body[0] {
            Statement::Export(ExportDeclaration {
                kind: ExportKind::Default { local, code },
                ..
            }) => {
                assert_eq!(local, DEFAULT_EXPORT_LOCAL);
                assert_eq!(module.text(code.span), "40 + 2;");
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_module_fragments() {
        let module = parse(
            r#"
            module countBlock {
                let i = 0;
                export function count() { i++; return i; }
            }
            export module uppercaseBlock {
                export function uppercase(s) { return s.toUpperCase(); }
            }
            "#,
        );

        let fragments: Vec<&ModuleDeclaration> = module
            .body
            .iter()
            .filter_map(|s| match s {
                Statement::Module(m) => Some(m),
                _ => None,
            })
            .collect();

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].name.as_deref(), Some("countBlock"));
        assert!(!fragments[0].exported);
        assert_eq!(fragments[0].body.len(), 2);
        assert_eq!(fragments[1].name.as_deref(), Some("uppercaseBlock"));
        assert!(fragments[1].exported);
        assert_eq!(fragments[1].position, DeclarationPosition::Statement);
    }

    #[test]
    fn test_line_terminator_after_module_keyword() {
        // `module` followed by a newline is an expression statement, not a fragment
        let module = parse("module\nfoo\n{ }");
        assert!(module.body.iter().all(|s| !matches!(s, Statement::Module(_))));
    }

    #[test]
    fn test_module_identifier_usage_is_code() {
        let module = parse("module.exports = {};\nconst module2 = module;");
        assert!(module.body.iter().all(|s| matches!(s, Statement::Code(_))));
    }

    #[test]
    fn test_nested_inline_modules() {
        let module = parse(
            r#"
            function make() {
                module worker { export const id = 1; }
                return module { export default 2; };
            }
            "#,
        );

        assert_eq!(module.body.len(), 1);
        let Statement::Code(code) = &module.body[0] else {
            panic!("expected code");
        };
        assert_eq!(code.inline_modules.len(), 2);
        assert_eq!(code.inline_modules[0].name.as_deref(), Some("worker"));
        assert_eq!(code.inline_modules[0].position, DeclarationPosition::Nested);
        assert_eq!(code.inline_modules[1].name, None);
    }

    #[test]
    fn test_statements_without_semicolons() {
        let module = parse("let a = 1\nimport x from './x.js'\nexport { a }\nmodule m {}\n");
        assert!(matches!(module.body[0], Statement::Code(_)));
        assert!(matches!(module.body[1], Statement::Import(_)));
        assert!(matches!(module.body[2], Statement::Export(_)));
        assert!(matches!(module.body[3], Statement::Module(_)));
    }

    #[test]
    fn test_function_declaration_ends_at_brace() {
        let module = parse("export function f() { return 1 }\nconsole.log(f())");
        assert_eq!(module.body.len(), 2);
        assert!(matches!(module.body[1], Statement::Code(_)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(Parser::new("module a {").parse_module().is_err());
        assert!(Parser::new("import { a from './a.js';").parse_module().is_err());
        assert!(Parser::new("export 42;").parse_module().is_err());
        assert!(Parser::new("let s = 'unterminated").parse_module().is_err());
        assert!(Parser::new("}").parse_module().is_err());

        let err = Parser::new("let a = 1;\nexport 42;").parse_module().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 8);
    }
}
