use crate::error::{Result, SyntaxError};

use super::cursor::Cursor;
use super::token::{Token, TokenKind};

/// Hand-written lexer for directive expressions.
///
/// Supports: int/float literals, single- and double-quoted strings with
/// escapes, identifiers, the `and`/`or`/`not`/`in` keywords (plus the
/// `&&`/`||`/`!` spellings), comparison and arithmetic operators, and
/// trailing `//` comments.
pub struct Lexer<'src> {
    cursor: Cursor<'src>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
        }
    }

    /// Tokenize the entire source. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let start = self.cursor.offset();
        let Some(ch) = self.cursor.advance() else {
            return Ok(Token::eof(start));
        };

        let kind = match ch {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' => {
                if self.cursor.eat('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            '!' => {
                if self.cursor.eat('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.cursor.eat('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.cursor.eat('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                if self.cursor.eat('&') {
                    TokenKind::And
                } else {
                    return Err(SyntaxError::new(
                        "unexpected character '&'; did you mean '&&' or 'and'?",
                        start,
                    ));
                }
            }
            '|' => {
                if self.cursor.eat('|') {
                    TokenKind::Or
                } else {
                    return Err(SyntaxError::new(
                        "unexpected character '|'; did you mean '||' or 'or'?",
                        start,
                    ));
                }
            }
            '"' | '\'' => return self.scan_string(start, ch),
            c if c.is_ascii_digit() => return self.scan_number(start),
            c if is_ident_start(c) => return Ok(self.scan_identifier(start)),
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{}'", other),
                    start,
                ))
            }
        };

        Ok(self.make_token(kind, start))
    }

    /// Skip whitespace and `//` comments (which run to the end of input).
    fn skip_whitespace_and_comments(&mut self) {
        self.cursor.eat_while(|c| c.is_whitespace());
        if self.cursor.peek() == Some('/') && self.cursor.peek_second() == Some('/') {
            self.cursor.eat_while(|_| true);
        }
    }

    /// Scan a string literal after its opening quote has been consumed.
    fn scan_string(&mut self, start: usize, quote: char) -> Result<Token> {
        let mut value = String::new();
        loop {
            match self.cursor.advance() {
                Some(c) if c == quote => {
                    return Ok(Token::new(
                        TokenKind::StringLiteral,
                        value,
                        start..self.cursor.offset(),
                    ));
                }
                Some('\\') => match self.cursor.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some('{') => value.push('{'),
                    Some('}') => value.push('}'),
                    Some(c) => {
                        return Err(SyntaxError::new(
                            format!("unknown escape sequence '\\{}'", c),
                            self.cursor.offset() - c.len_utf8() - 1,
                        ))
                    }
                    None => return Err(SyntaxError::new("unterminated string literal", start)),
                },
                Some(c) => value.push(c),
                None => return Err(SyntaxError::new("unterminated string literal", start)),
            }
        }
    }

    /// Scan a decimal integer or float (with optional exponent).
    fn scan_number(&mut self, start: usize) -> Result<Token> {
        self.cursor.eat_while(|c| c.is_ascii_digit() || c == '_');

        let mut is_float = false;
        if self.cursor.peek() == Some('.')
            && self.cursor.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit() || c == '_');
        }

        if matches!(self.cursor.peek(), Some('e' | 'E')) {
            is_float = true;
            self.cursor.advance();
            if matches!(self.cursor.peek(), Some('+' | '-')) {
                self.cursor.advance();
            }
            let digits = self.cursor.offset();
            self.cursor.eat_while(|c| c.is_ascii_digit());
            if self.cursor.offset() == digits {
                return Err(SyntaxError::new("expected digits in exponent", start));
            }
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        Ok(self.make_token(kind, start))
    }

    fn scan_identifier(&mut self, start: usize) -> Token {
        self.cursor.eat_while(is_ident_continue);
        let lexeme = self.cursor.slice_from(start);
        let kind = TokenKind::keyword_from_str(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, lexeme, start..self.cursor.offset())
    }

    fn make_token(&self, kind: TokenKind, start: usize) -> Token {
        Token::new(kind, self.cursor.slice_from(start), start..self.cursor.offset())
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().unwrap()
    }

    fn lex_kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source() {
        assert_eq!(lex_kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn comparison_and_logic() {
        assert_eq!(
            lex_kinds("a >= 1 and not b || c != 2"),
            vec![
                TokenKind::Identifier,
                TokenKind::GreaterEqual,
                TokenKind::IntLiteral,
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Identifier,
                TokenKind::Or,
                TokenKind::Identifier,
                TokenKind::BangEqual,
                TokenKind::IntLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        let tokens = lex("42 3.14 1e3 7.");
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[1].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[1].lexeme, "3.14");
        assert_eq!(tokens[2].kind, TokenKind::FloatLiteral);
        // `7.` is an int followed by a dot (field access position)
        assert_eq!(tokens[3].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[4].kind, TokenKind::Dot);
    }

    #[test]
    fn strings_unescape() {
        let tokens = lex(r#""say \"hi\"\n" 'it\'s {x}'"#);
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].lexeme, "say \"hi\"\n");
        assert_eq!(tokens[1].lexeme, "it's {x}");
        assert_eq!(tokens[1].range.start, 15);
    }

    #[test]
    fn python_style_keywords() {
        assert_eq!(
            lex_kinds("True False None null"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Null,
                TokenKind::Null,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn trailing_comment_skipped() {
        assert_eq!(
            lex_kinds("item // assign for the prompt"),
            vec![TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_errors() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn unexpected_character_errors() {
        let err = Lexer::new("a # b").tokenize().unwrap_err();
        assert_eq!(err.offset, 2);
    }
}
