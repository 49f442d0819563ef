use std::fmt;
use std::ops::Range;

/// A single token produced by the lexer.
///
/// For string literals `lexeme` holds the unescaped value; for every other
/// kind it is the exact source slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    /// Byte range of the token in the lexed text.
    pub range: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, range: Range<usize>) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            range,
        }
    }

    pub fn eof(offset: usize) -> Self {
        Self {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            range: offset..offset,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.lexeme)
    }
}

/// All token kinds of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // === Literals ===
    IntLiteral,
    FloatLiteral,
    StringLiteral,

    // === Identifiers ===
    Identifier,

    // === Keywords ===
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,

    // === Operators ===
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    EqualEqual,   // ==
    BangEqual,    // !=
    Less,         // <
    Greater,      // >
    LessEqual,    // <=
    GreaterEqual, // >=
    Equal,        // =
    Dot,          // .

    // === Delimiters ===
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    Comma,        // ,
    Colon,        // :

    // === Special ===
    Eof,
}

impl TokenKind {
    /// Try to match an identifier string to a keyword.
    ///
    /// `True`, `False` and `None` are accepted alongside the lowercase forms.
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "true" | "True" => Some(TokenKind::True),
            "false" | "False" => Some(TokenKind::False),
            "null" | "None" => Some(TokenKind::Null),
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "not" => Some(TokenKind::Not),
            "in" => Some(TokenKind::In),
            _ => None,
        }
    }

    /// Human-readable name used in parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::IntLiteral => "integer",
            TokenKind::FloatLiteral => "float",
            TokenKind::StringLiteral => "string",
            TokenKind::Identifier => "identifier",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Not => "'not'",
            TokenKind::In => "'in'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::EqualEqual => "'=='",
            TokenKind::BangEqual => "'!='",
            TokenKind::Less => "'<'",
            TokenKind::Greater => "'>'",
            TokenKind::LessEqual => "'<='",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::Equal => "'='",
            TokenKind::Dot => "'.'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Eof => "end of input",
        }
    }
}
