mod directives;
mod expressions;

pub use directives::{
    classify, parse_foreach, parse_include, parse_prompt, parse_set, DirectiveKind, Family,
    ForeachDirective, IncludeTarget, LineKind, PromptCall, SetDirective, SetValue,
};

use crate::ast::Expr;
use crate::error::{Result, SyntaxError};
use crate::lexer::{Lexer, Token, TokenKind};

/// Parse a complete expression; trailing tokens are an error.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Recursive descent parser over expression tokens.
///
/// Uses Pratt parsing for operator precedence.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ========================================================================
    // Token manipulation helpers
    // ========================================================================

    /// Peek at the current token kind.
    fn peek(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    /// Peek at the next token kind (one ahead).
    fn peek_next(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    /// Byte offset where the current token starts.
    fn current_offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.range.start)
            .unwrap_or(0)
    }

    /// Byte offset where the previously consumed token ends.
    fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.range.end)
            .unwrap_or(0)
    }

    /// Advance past the current token and return it.
    fn advance(&mut self) -> Token {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| Token::eof(self.current_offset()));
        if self.peek() != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    /// Consume a token of the expected kind, or fail.
    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    /// Consume if the current token matches, otherwise do nothing.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek() == TokenKind::Eof
    }

    fn expect_end(&self) -> Result<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(
            format!("expected {}, found {}", expected, self.peek().describe()),
            self.current_offset(),
        )
    }
}
