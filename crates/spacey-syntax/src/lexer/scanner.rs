//! The scanner that produces tokens from source text.

use super::{Keyword, Span, Token, TokenKind};

/// Multi-character operators, longest first so that scanning is maximal munch.
const OPERATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "+", "-", "/", "%", "<", ">", "&", "|", "^", "!", "~", "?",
    ":", "@", "=", "*",
];

/// A scanner that tokenizes JavaScript source code.
///
/// The scanner understands enough of the lexical grammar to never lose track
/// of bracket structure: strings, template literals (with nested `${}`
/// substitutions), regular expression literals and comments are consumed as
/// single units.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    /// Whether the last significant token can end an expression
    after_operand: bool,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            after_operand: false,
        }
    }

    /// Scans the whole source into a token vector terminated by [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        let newline_before = self.skip_whitespace_and_comments();

        let start = self.current_pos;

        let Some((_pos, ch)) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start), newline_before);
        };

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,

            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(ch),
            '.' if !self.source[start..].starts_with("...") => TokenKind::Dot,

            '/' if !self.after_operand => self.scan_regexp(),

            '"' | '\'' => self.scan_string(ch),
            '`' => self.scan_template(),
            '0'..='9' => self.scan_number(ch),
            '#' => self.scan_private_identifier(),
            _ if is_id_start(ch) => self.scan_identifier(ch),
            '\\' => TokenKind::Invalid("unicode escapes in identifiers are not supported".into()),

            _ => self.scan_operator(start),
        };

        self.after_operand = kind.ends_expression();
        Token::new(kind, Span::new(start, self.current_pos), newline_before)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    /// Skips whitespace and comments, reporting whether a line terminator was crossed.
    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n' | '\r' | '\u{2028}' | '\u{2029}') => {
                    newline = true;
                    self.advance();
                }
                Some(ch) if ch.is_whitespace() || ch == '\u{feff}' => {
                    self.advance();
                }
                Some('/') => match self.peek_next() {
                    Some('/') => {
                        while let Some(ch) = self.peek() {
                            if ch == '\n' || ch == '\r' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => {
                        self.advance();
                        self.advance();
                        let mut prev = ' ';
                        while let Some((_, ch)) = self.advance() {
                            if ch == '\n' || ch == '\r' {
                                newline = true;
                            }
                            if prev == '*' && ch == '/' {
                                break;
                            }
                            prev = ch;
                        }
                    }
                    _ => break,
                },
                _ => break,
            }
        }
        newline
    }

    fn scan_operator(&mut self, start: usize) -> TokenKind {
        let rest = &self.source[start..];
        let Some(&op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            let ch = rest.chars().next().unwrap_or_default();
            return TokenKind::Invalid(format!("unexpected character '{}'", ch));
        };

        // the first character was consumed by next_token
        for _ in 1..op.chars().count() {
            self.advance();
        }

        match op {
            "*" => TokenKind::Star,
            "=" => TokenKind::Equal,
            _ => TokenKind::Operator(op),
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();

        loop {
            match self.advance() {
                None | Some((_, '\n')) => {
                    return TokenKind::Invalid("unterminated string literal".into());
                }
                Some((_, ch)) if ch == quote => break,
                Some((_, '\\')) => {
                    if let Some((_, escaped)) = self.advance() {
                        match escaped {
                            'n' => value.push('\n'),
                            'r' => value.push('\r'),
                            't' => value.push('\t'),
                            'b' => value.push('\u{8}'),
                            'f' => value.push('\u{c}'),
                            'v' => value.push('\u{b}'),
                            '0' => value.push('\0'),
                            'x' => self.scan_hex_escape(2, &mut value),
                            'u' => self.scan_unicode_escape(&mut value),
                            // line continuation
                            '\n' => {}
                            '\r' => {
                                if self.peek() == Some('\n') {
                                    self.advance();
                                }
                            }
                            _ => value.push(escaped),
                        }
                    }
                }
                Some((_, ch)) => value.push(ch),
            }
        }

        TokenKind::String(value)
    }

    fn scan_hex_escape(&mut self, digits: usize, value: &mut String) {
        let mut code = 0u32;
        for _ in 0..digits {
            match self.peek().and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    code = code * 16 + d;
                    self.advance();
                }
                None => break,
            }
        }
        value.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    fn scan_unicode_escape(&mut self, value: &mut String) {
        if self.peek() != Some('{') {
            self.scan_hex_escape(4, value);
            return;
        }
        self.advance();
        let mut code = 0u32;
        while let Some(ch) = self.peek() {
            self.advance();
            match ch.to_digit(16) {
                Some(d) => code = code.saturating_mul(16).saturating_add(d),
                None => break,
            }
        }
        value.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    fn scan_template(&mut self) -> TokenKind {
        let start = self.current_pos - 1;

        loop {
            match self.advance() {
                None => return TokenKind::Invalid("unterminated template literal".into()),
                Some((_, '`')) => break,
                Some((_, '\\')) => {
                    self.advance();
                }
                Some((_, '$')) if self.peek() == Some('{') => {
                    self.advance();
                    if let Err(reason) = self.skip_substitution() {
                        return TokenKind::Invalid(reason);
                    }
                }
                Some(_) => {}
            }
        }

        TokenKind::Template(self.source[start..self.current_pos].to_string())
    }

    /// Consumes a `${ ... }` substitution body, including nested templates.
    fn skip_substitution(&mut self) -> Result<(), String> {
        self.after_operand = false;
        let mut depth = 0usize;
        loop {
            let token = self.next_token();
            match token.kind {
                TokenKind::Eof => return Err("unterminated template substitution".into()),
                TokenKind::Invalid(reason) => return Err(reason),
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace if depth == 0 => return Ok(()),
                TokenKind::RightBrace => depth -= 1,
                _ => {}
            }
        }
    }

    fn scan_regexp(&mut self) -> TokenKind {
        let mut pattern = String::new();
        let mut in_class = false;

        loop {
            match self.advance() {
                None | Some((_, '\n' | '\r')) => {
                    return TokenKind::Invalid("unterminated regular expression".into());
                }
                Some((_, '/')) if !in_class => break,
                Some((_, '\\')) => {
                    pattern.push('\\');
                    if let Some((_, escaped)) = self.advance() {
                        pattern.push(escaped);
                    }
                }
                Some((_, ch)) => {
                    match ch {
                        '[' => in_class = true,
                        ']' => in_class = false,
                        _ => {}
                    }
                    pattern.push(ch);
                }
            }
        }

        let mut flags = String::new();
        while let Some(ch) = self.peek() {
            if is_id_continue(ch) {
                flags.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        TokenKind::RegExp { pattern, flags }
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        let mut value = String::from(first);

        while let Some(ch) = self.peek() {
            // hex/octal/binary digits, separators, exponent and BigInt suffix
            // all fall in this set; a sign only counts right after an exponent
            let exponent_sign = matches!(ch, '+' | '-')
                && matches!(value.chars().last(), Some('e' | 'E'))
                && !value.starts_with("0x")
                && !value.starts_with("0X");
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || exponent_sign {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        TokenKind::Number(value)
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::from(first);

        while let Some(ch) = self.peek() {
            if is_id_continue(ch) {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match Keyword::lookup(&name) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier(name),
        }
    }

    fn scan_private_identifier(&mut self) -> TokenKind {
        let mut name = String::new();

        while let Some(ch) = self.peek() {
            if is_id_continue(ch) {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if name.is_empty() {
            TokenKind::Invalid("unexpected character '#'".into())
        } else {
            TokenKind::PrivateIdentifier(name)
        }
    }
}

/// Checks if a character can start an identifier.
pub fn is_id_start(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

/// Checks if a character can continue an identifier.
pub fn is_id_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_continue(ch)
}

/// Returns true if `name` is a syntactically valid identifier name.
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_id_start(first) => chars.all(is_id_continue),
        _ => false,
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let mut scanner = Scanner::new("{ } ( ) ;");
        assert_eq!(scanner.next_token().kind, TokenKind::LeftBrace);
        assert_eq!(scanner.next_token().kind, TokenKind::RightBrace);
        assert_eq!(scanner.next_token().kind, TokenKind::LeftParen);
        assert_eq!(scanner.next_token().kind, TokenKind::RightParen);
        assert_eq!(scanner.next_token().kind, TokenKind::Semicolon);
        assert_eq!(scanner.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn test_strings() {
        let tokens = kinds(r#""hello" 'wor\'ld' "\x41B\u{43}""#);
        assert_eq!(tokens[0], TokenKind::String("hello".into()));
        assert_eq!(tokens[1], TokenKind::String("wor'ld".into()));
        assert_eq!(tokens[2], TokenKind::String("ABC".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = kinds("'abc");
        assert!(matches!(tokens[0], TokenKind::Invalid(_)));
    }

    #[test]
    fn test_contextual_keywords_are_identifiers() {
        let tokens = kinds("module from as import export");
        assert_eq!(tokens[0], TokenKind::Identifier("module".into()));
        assert_eq!(tokens[1], TokenKind::Identifier("from".into()));
        assert_eq!(tokens[2], TokenKind::Identifier("as".into()));
        assert_eq!(tokens[3], TokenKind::Keyword(Keyword::Import));
        assert_eq!(tokens[4], TokenKind::Keyword(Keyword::Export));
    }

    #[test]
    fn test_newline_flag() {
        let tokens: Vec<Token> = Scanner::new("module\nfoo /* a\n b */ bar baz").collect();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert!(tokens[2].newline_before);
        assert!(!tokens[3].newline_before);
    }

    #[test]
    fn test_regexp_vs_division() {
        let tokens = kinds("x = a / b; y = /{[/]}/g;");
        assert_eq!(tokens[3], TokenKind::Operator("/"));
        assert_eq!(
            tokens[8],
            TokenKind::RegExp {
                pattern: "{[/]}".into(),
                flags: "g".into()
            }
        );
    }

    #[test]
    fn test_template_with_substitutions() {
        let tokens = kinds("`a ${ {b: `c${d}`}.b } e` ;");
        assert!(matches!(&tokens[0], TokenKind::Template(raw) if raw.starts_with('`') && raw.ends_with('`')));
        assert_eq!(tokens[1], TokenKind::Semicolon);
    }

    #[test]
    fn test_comments_do_not_hide_braces() {
        let tokens = kinds("{ // }\n /* } */ }");
        assert_eq!(tokens, vec![TokenKind::LeftBrace, TokenKind::RightBrace]);
    }

    #[test]
    fn test_operators_are_maximal() {
        let tokens = kinds("a >>>= b => c?.d ... e");
        assert_eq!(tokens[1], TokenKind::Operator(">>>="));
        assert_eq!(tokens[3], TokenKind::Operator("=>"));
        assert_eq!(tokens[5], TokenKind::Operator("?."));
        assert_eq!(tokens[7], TokenKind::Operator("..."));
    }

    #[test]
    fn test_equal_and_star() {
        let tokens = kinds("let i = 0; x *= a * b ** c; import * as ns from 'm';");
        assert_eq!(tokens[2], TokenKind::Equal);
        assert_eq!(tokens[6], TokenKind::Operator("*="));
        assert_eq!(tokens[8], TokenKind::Star);
        assert_eq!(tokens[10], TokenKind::Operator("**"));
        assert_eq!(tokens[14], TokenKind::Star);
        assert!(!tokens.iter().any(|t| matches!(t, TokenKind::Invalid(_))));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("42 3.14 0xff 1e-3 10n .5");
        assert_eq!(tokens[0], TokenKind::Number("42".into()));
        assert_eq!(tokens[1], TokenKind::Number("3.14".into()));
        assert_eq!(tokens[2], TokenKind::Number("0xff".into()));
        assert_eq!(tokens[3], TokenKind::Number("1e-3".into()));
        assert_eq!(tokens[4], TokenKind::Number("10n".into()));
        assert_eq!(tokens[5], TokenKind::Number(".5".into()));
    }

    #[test]
    fn test_identifier_name() {
        assert!(is_identifier_name("countBlock"));
        assert!(is_identifier_name("$_x1"));
        assert!(!is_identifier_name("1abc"));
        assert!(!is_identifier_name(""));
        assert!(!is_identifier_name("a-b"));
    }
}
