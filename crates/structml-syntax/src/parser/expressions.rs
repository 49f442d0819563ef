use crate::ast::*;
use crate::error::{Result, SyntaxError};
use crate::lexer::TokenKind;

use super::Parser;

// ============================================================================
// Binding powers for Pratt parsing
// ============================================================================
//
// Higher values bind tighter. (left_bp, right_bp): left < right = left-assoc.
//
//  or              (1, 2)
//  and             (3, 4)
//  not (prefix)     5
//  == != < > <= >= (7, 8)
//  + -             (9, 10)
//  * /             (11, 12)
//  - (prefix)      13
//  [] .            postfix, handled in parse_postfix

fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    match kind {
        TokenKind::Or => Some((1, 2)),
        TokenKind::And => Some((3, 4)),
        TokenKind::EqualEqual
        | TokenKind::BangEqual
        | TokenKind::Less
        | TokenKind::Greater
        | TokenKind::LessEqual
        | TokenKind::GreaterEqual => Some((7, 8)),
        TokenKind::Plus | TokenKind::Minus => Some((9, 10)),
        TokenKind::Star | TokenKind::Slash => Some((11, 12)),
        _ => None,
    }
}

fn prefix_binding_power(kind: TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Not => Some(5),
        TokenKind::Minus => Some(13),
        _ => None,
    }
}

fn token_to_binary_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Sub),
        TokenKind::Star => Some(BinaryOp::Mul),
        TokenKind::Slash => Some(BinaryOp::Div),
        TokenKind::EqualEqual => Some(BinaryOp::Eq),
        TokenKind::BangEqual => Some(BinaryOp::Neq),
        TokenKind::Less => Some(BinaryOp::Lt),
        TokenKind::Greater => Some(BinaryOp::Gt),
        TokenKind::LessEqual => Some(BinaryOp::Lte),
        TokenKind::GreaterEqual => Some(BinaryOp::Gte),
        TokenKind::And => Some(BinaryOp::And),
        TokenKind::Or => Some(BinaryOp::Or),
        _ => None,
    }
}

impl Parser {
    /// Parse an expression using Pratt parsing.
    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    /// Core Pratt parser: parse an expression with a minimum binding power.
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let op_kind = self.peek();
            let Some((left_bp, right_bp)) = infix_binding_power(op_kind) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.advance();

            let Some(op) = token_to_binary_op(op_kind) else {
                break;
            };
            let rhs = self.parse_expr_bp(right_bp)?;
            let range = lhs.range.start..rhs.range.end;
            lhs = Expr::new(
                ExprKind::Binary {
                    left: Box::new(lhs),
                    op,
                    right: Box::new(rhs),
                },
                range,
            );
        }

        Ok(lhs)
    }

    /// Parse a prefix expression (unary or primary with postfix operators).
    fn parse_prefix(&mut self) -> Result<Expr> {
        let kind = self.peek();

        if let Some(bp) = prefix_binding_power(kind) {
            let start = self.current_offset();
            self.advance();
            let op = if kind == TokenKind::Minus {
                UnaryOp::Neg
            } else {
                UnaryOp::Not
            };
            let operand = self.parse_expr_bp(bp)?;
            let range = start..operand.range.end;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                range,
            ));
        }

        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    /// Parse `[index]` and `.field` suffixes.
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            match self.peek() {
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RightBracket)?;
                    let range = expr.range.start..self.previous_end();
                    expr = Expr::new(
                        ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                        range,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect(TokenKind::Identifier)?.lexeme;
                    let range = expr.range.start..self.previous_end();
                    expr = Expr::new(
                        ExprKind::Field {
                            target: Box::new(expr),
                            name,
                        },
                        range,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.current_offset();
        match self.peek() {
            TokenKind::IntLiteral => {
                let token = self.advance();
                let digits = token.lexeme.replace('_', "");
                let value = digits.parse::<i64>().map_err(|_| {
                    SyntaxError::new(
                        format!("integer literal '{}' is out of range", token.lexeme),
                        start,
                    )
                })?;
                Ok(Expr::new(ExprKind::Literal(Literal::Int(value)), token.range))
            }
            TokenKind::FloatLiteral => {
                let token = self.advance();
                let digits = token.lexeme.replace('_', "");
                let value = digits.parse::<f64>().map_err(|_| {
                    SyntaxError::new(format!("invalid float literal '{}'", token.lexeme), start)
                })?;
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Float(value)),
                    token.range,
                ))
            }
            TokenKind::StringLiteral => {
                let token = self.advance();
                Ok(Expr::new(
                    ExprKind::Literal(Literal::String(token.lexeme)),
                    token.range,
                ))
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                let value = token.kind == TokenKind::True;
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(value)), token.range))
            }
            TokenKind::Null => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Null), token.range))
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Variable(token.lexeme), token.range))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                Ok(Expr::new(inner.kind, start..self.previous_end()))
            }
            TokenKind::LeftBracket => self.parse_list(start),
            TokenKind::LeftBrace => self.parse_map(start),
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// `[a, b, c]` with an optional trailing comma.
    fn parse_list(&mut self, start: usize) -> Result<Expr> {
        self.expect(TokenKind::LeftBracket)?;
        let mut items = Vec::new();
        while self.peek() != TokenKind::RightBracket {
            items.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBracket)?;
        Ok(Expr::new(ExprKind::List(items), start..self.previous_end()))
    }

    /// `{"key": value, other: value}`; keys are strings or bare identifiers.
    fn parse_map(&mut self, start: usize) -> Result<Expr> {
        self.expect(TokenKind::LeftBrace)?;
        let mut entries = Vec::new();
        while self.peek() != TokenKind::RightBrace {
            let key = match self.peek() {
                TokenKind::StringLiteral | TokenKind::Identifier => self.advance().lexeme,
                _ => return Err(self.unexpected("a map key")),
            };
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace)?;
        Ok(Expr::new(ExprKind::Map(entries), start..self.previous_end()))
    }
}
