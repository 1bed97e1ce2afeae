//! Binding-name collection for `let`, `const` and `var` declarations.

use crate::lexer::{Keyword, Token, TokenKind};

/// Collects the names bound by a variable declaration.
///
/// `tokens` starts at the `let`/`const`/`var` keyword. Initializers and
/// default values are skipped without being interpreted.
pub(crate) fn declared_names(tokens: &[Token]) -> Vec<String> {
    let mut cursor = Cursor {
        tokens,
        pos: 0,
        names: Vec::new(),
    };

    if !matches!(
        cursor.kind(),
        Some(TokenKind::Keyword(Keyword::Let | Keyword::Const | Keyword::Var))
    ) {
        return Vec::new();
    }
    cursor.pos += 1;

    loop {
        cursor.pattern();
        if cursor.kind() == Some(&TokenKind::Equal) {
            cursor.skip_expression();
        }
        if cursor.kind() != Some(&TokenKind::Comma) {
            break;
        }
        cursor.pos += 1;
    }

    cursor.names
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
    names: Vec<String>,
}

impl<'t> Cursor<'t> {
    fn kind(&self) -> Option<&'t TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn pattern(&mut self) {
        match self.kind() {
            Some(TokenKind::Identifier(name)) => {
                self.names.push(name.clone());
                self.pos += 1;
            }
            Some(TokenKind::LeftBrace) => self.object_pattern(),
            Some(TokenKind::LeftBracket) => self.array_pattern(),
            _ => self.pos += 1,
        }
    }

    fn object_pattern(&mut self) {
        self.pos += 1; // consume '{'
        loop {
            match self.kind() {
                None | Some(TokenKind::RightBrace) => break,
                Some(TokenKind::Operator("...")) => {
                    self.pos += 1;
                    self.pattern();
                }
                Some(TokenKind::LeftBracket) => {
                    // computed key, always followed by ':'
                    self.skip_group();
                    self.property_value();
                }
                Some(TokenKind::Identifier(name)) => {
                    let name = name.clone();
                    self.pos += 1;
                    if self.kind() == Some(&TokenKind::Operator(":")) {
                        self.property_value();
                    } else {
                        self.names.push(name);
                    }
                }
                Some(_) => {
                    // string, number or keyword key
                    self.pos += 1;
                    self.property_value();
                }
            }
            if self.kind() == Some(&TokenKind::Equal) {
                self.skip_expression();
            }
            if self.kind() != Some(&TokenKind::Comma) {
                break;
            }
            self.pos += 1;
        }
        self.pos += 1; // consume '}'
    }

    /// `: pattern` after a property key.
    fn property_value(&mut self) {
        if self.kind() == Some(&TokenKind::Operator(":")) {
            self.pos += 1;
            self.pattern();
        }
    }

    fn array_pattern(&mut self) {
        self.pos += 1; // consume '['
        loop {
            match self.kind() {
                None | Some(TokenKind::RightBracket) => break,
                Some(TokenKind::Comma) => {
                    self.pos += 1;
                    continue;
                }
                Some(TokenKind::Operator("...")) => {
                    self.pos += 1;
                    self.pattern();
                }
                Some(_) => self.pattern(),
            }
            if self.kind() == Some(&TokenKind::Equal) {
                self.skip_expression();
            }
            if self.kind() != Some(&TokenKind::Comma) {
                break;
            }
            self.pos += 1;
        }
        self.pos += 1; // consume ']'
    }

    /// Skips an initializer up to the next `,` or closing bracket at depth 0.
    fn skip_expression(&mut self) {
        self.pos += 1; // consume '='
        while let Some(kind) = self.kind() {
            match kind {
                TokenKind::Comma | TokenKind::Semicolon => return,
                kind if kind.is_close_bracket() => return,
                kind if kind.is_open_bracket() => self.skip_group(),
                _ => self.pos += 1,
            }
        }
    }

    /// Skips a bracketed group including its closing bracket.
    fn skip_group(&mut self) {
        let mut depth = 0usize;
        while let Some(kind) = self.kind() {
            if kind.is_open_bracket() {
                depth += 1;
            } else if kind.is_close_bracket() {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    self.pos += 1;
                    return;
                }
            }
            self.pos += 1;
        }
    }
}
