//! Token definitions for the module-structure lexer.

/// A span in the source code, representing a range of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the smallest span covering both `self` and `other`.
    pub fn to(&self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Slices the source text covered by this span.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The span in the source code
    pub span: Span,
    /// Whether a line terminator appeared between the previous token and this one
    pub newline_before: bool,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span, newline_before: bool) -> Self {
        Self {
            kind,
            span,
            newline_before,
        }
    }

    /// Returns true if this token is the identifier `name`.
    ///
    /// Contextual keywords (`module`, `from`, `as`, `of`, `async`) are lexed as
    /// identifiers and matched through this helper.
    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(s) if s == name)
    }
}

/// The kinds of tokens the module-structure parser distinguishes.
///
/// Operators that never affect module structure are folded into
/// [`TokenKind::Operator`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Numeric literal (kept as written)
    Number(String),
    /// String literal (escape sequences decoded)
    String(String),
    /// Template literal, including any `${}` substitutions, kept raw
    Template(String),
    /// Regular expression literal
    RegExp {
        /// Pattern between the slashes
        pattern: String,
        /// Trailing flags
        flags: String,
    },

    /// Identifier, including contextual keywords such as `module`
    Identifier(String),
    /// Private identifier (#name)
    PrivateIdentifier(String),
    /// Reserved word
    Keyword(Keyword),

    // Punctuation
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// .
    Dot,
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// *
    Star,
    /// =
    Equal,
    /// Any other operator or punctuator (`+=`, `=>`, `?.`, `@`, ...)
    Operator(&'static str),

    // Special
    /// End of file
    Eof,
    /// Invalid token (unterminated literal or stray character)
    Invalid(String),
}

/// Reserved words recognised by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Await,
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Enum,
    Export,
    Extends,
    False,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Instanceof,
    Let,
    New,
    Null,
    Return,
    Static,
    Super,
    Switch,
    This,
    Throw,
    True,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
    Yield,
}

impl Keyword {
    /// Looks up a reserved word.
    pub fn lookup(word: &str) -> Option<Self> {
        let keyword = match word {
            "await" => Keyword::Await,
            "break" => Keyword::Break,
            "case" => Keyword::Case,
            "catch" => Keyword::Catch,
            "class" => Keyword::Class,
            "const" => Keyword::Const,
            "continue" => Keyword::Continue,
            "debugger" => Keyword::Debugger,
            "default" => Keyword::Default,
            "delete" => Keyword::Delete,
            "do" => Keyword::Do,
            "else" => Keyword::Else,
            "enum" => Keyword::Enum,
            "export" => Keyword::Export,
            "extends" => Keyword::Extends,
            "false" => Keyword::False,
            "finally" => Keyword::Finally,
            "for" => Keyword::For,
            "function" => Keyword::Function,
            "if" => Keyword::If,
            "import" => Keyword::Import,
            "in" => Keyword::In,
            "instanceof" => Keyword::Instanceof,
            "let" => Keyword::Let,
            "new" => Keyword::New,
            "null" => Keyword::Null,
            "return" => Keyword::Return,
            "static" => Keyword::Static,
            "super" => Keyword::Super,
            "switch" => Keyword::Switch,
            "this" => Keyword::This,
            "throw" => Keyword::Throw,
            "true" => Keyword::True,
            "try" => Keyword::Try,
            "typeof" => Keyword::Typeof,
            "var" => Keyword::Var,
            "void" => Keyword::Void,
            "while" => Keyword::While,
            "with" => Keyword::With,
            "yield" => Keyword::Yield,
            _ => return None,
        };
        Some(keyword)
    }

    /// Returns true if a value can directly follow this keyword as an operand,
    /// which is what decides whether `/` starts a regular expression.
    pub fn precedes_expression(&self) -> bool {
        !matches!(
            self,
            Keyword::This | Keyword::Super | Keyword::True | Keyword::False | Keyword::Null
        )
    }
}

impl TokenKind {
    /// Returns true if this token can end an expression.
    ///
    /// A `/` following such a token is a division operator; anywhere else it
    /// starts a regular expression literal.
    pub fn ends_expression(&self) -> bool {
        match self {
            TokenKind::Number(_)
            | TokenKind::String(_)
            | TokenKind::Template(_)
            | TokenKind::RegExp { .. }
            | TokenKind::Identifier(_)
            | TokenKind::PrivateIdentifier(_)
            | TokenKind::RightParen
            | TokenKind::RightBracket
            | TokenKind::RightBrace => true,
            TokenKind::Operator(op) => matches!(*op, "++" | "--"),
            TokenKind::Keyword(keyword) => !keyword.precedes_expression(),
            _ => false,
        }
    }

    /// Returns true if this token opens a bracket pair.
    pub fn is_open_bracket(&self) -> bool {
        matches!(
            self,
            TokenKind::LeftBrace | TokenKind::LeftParen | TokenKind::LeftBracket
        )
    }

    /// Returns true if this token closes a bracket pair.
    pub fn is_close_bracket(&self) -> bool {
        matches!(
            self,
            TokenKind::RightBrace | TokenKind::RightParen | TokenKind::RightBracket
        )
    }

    /// Human readable description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::String(s) => format!("string '{}'", s),
            TokenKind::Template(_) => "template literal".to_string(),
            TokenKind::RegExp { .. } => "regular expression".to_string(),
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::PrivateIdentifier(name) => format!("private name '#{}'", name),
            TokenKind::Keyword(keyword) => format!("keyword '{:?}'", keyword).to_lowercase(),
            TokenKind::LeftBrace => "'{'".to_string(),
            TokenKind::RightBrace => "'}'".to_string(),
            TokenKind::LeftParen => "'('".to_string(),
            TokenKind::RightParen => "')'".to_string(),
            TokenKind::LeftBracket => "'['".to_string(),
            TokenKind::RightBracket => "']'".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Equal => "'='".to_string(),
            TokenKind::Operator(op) => format!("'{}'", op),
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Invalid(reason) => reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_len_and_to() {
        let a = Span::new(5, 15);
        let b = Span::new(20, 25);
        assert_eq!(a.len(), 10);
        assert_eq!(a.to(b), Span::new(5, 25));
        assert!(Span::new(3, 3).is_empty());
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(Keyword::lookup("import"), Some(Keyword::Import));
        assert_eq!(Keyword::lookup("export"), Some(Keyword::Export));
        // contextual keywords stay identifiers
        assert_eq!(Keyword::lookup("module"), None);
        assert_eq!(Keyword::lookup("from"), None);
    }

    #[test]
    fn test_ends_expression() {
        assert!(TokenKind::Identifier("x".into()).ends_expression());
        assert!(TokenKind::RightParen.ends_expression());
        assert!(TokenKind::Keyword(Keyword::This).ends_expression());
        assert!(!TokenKind::Keyword(Keyword::Return).ends_expression());
        assert!(!TokenKind::Equal.ends_expression());
        assert!(!TokenKind::LeftParen.ends_expression());
    }
}
