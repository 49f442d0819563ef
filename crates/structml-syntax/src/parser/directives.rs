use crate::ast::Expr;
use crate::error::{Result, SyntaxError};
use crate::lexer::scanner::{is_ident_continue, is_ident_start};
use crate::lexer::{Lexer, Token, TokenKind};

use super::Parser;

// ============================================================================
// Line classification
// ============================================================================

/// Control-flow family a block directive belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    If,
    Foreach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Set,
    Log,
    Include,
    If,
    ElseIf,
    Else,
    EndIf,
    Foreach,
    EndForeach,
    /// An `@word` that is not a known directive.
    Unknown,
}

impl DirectiveKind {
    /// Keywords are matched exactly; `@If` is an unknown directive.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "set" => Self::Set,
            "log" => Self::Log,
            "include" => Self::Include,
            "if" => Self::If,
            "elseif" => Self::ElseIf,
            "else" => Self::Else,
            "endif" => Self::EndIf,
            "foreach" => Self::Foreach,
            "endforeach" => Self::EndForeach,
            _ => Self::Unknown,
        }
    }

    pub fn family(self) -> Option<Family> {
        match self {
            Self::If | Self::ElseIf | Self::Else | Self::EndIf => Some(Family::If),
            Self::Foreach | Self::EndForeach => Some(Family::Foreach),
            _ => None,
        }
    }

    pub fn is_opener(self) -> bool {
        matches!(self, Self::If | Self::Foreach)
    }

    pub fn is_closer(self) -> bool {
        matches!(self, Self::EndIf | Self::EndForeach)
    }
}

/// A script line after trimming, split into keyword and payload when it is
/// a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Literal(&'a str),
    Directive {
        kind: DirectiveKind,
        keyword: &'a str,
        payload: &'a str,
        /// Byte offset of `payload` within the untrimmed line.
        payload_offset: usize,
    },
}

/// Classify a raw (un-interpolated) script line.
///
/// A directive is `@` immediately followed by an identifier; anything else
/// starting with `@` is literal text.
pub fn classify(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    let Some(rest) = trimmed.strip_prefix('@') else {
        return LineKind::Literal(trimmed);
    };
    if !rest.starts_with(is_ident_start) {
        return LineKind::Literal(trimmed);
    }

    let keyword_len = rest.find(|c: char| !is_ident_continue(c)).unwrap_or(rest.len());
    let keyword = &rest[..keyword_len];
    let after = &rest[keyword_len..];
    let payload = after.trim_start();

    let lead = line.len() - line.trim_start().len();
    let payload_offset = lead + 1 + keyword_len + (after.len() - payload.len());

    LineKind::Directive {
        kind: DirectiveKind::from_keyword(keyword),
        keyword,
        payload,
        payload_offset,
    }
}

// ============================================================================
// Payload parsers
// ============================================================================

/// `@set NAME = VALUE`
#[derive(Debug, Clone, PartialEq)]
pub struct SetDirective<'a> {
    pub name: &'a str,
    pub value: SetValue<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetValue<'a> {
    /// Expression source, evaluated by the caller.
    Expression(&'a str),
    Prompt(PromptCall),
}

/// `@foreach VAR in COLLECTION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeachDirective<'a> {
    pub var: &'a str,
    pub collection: &'a str,
}

/// Target of an `@include`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeTarget<'a> {
    /// `<path/to/file>`, taken literally.
    Raw(&'a str),
    /// Any expression that evaluates to a path string.
    Expression(&'a str),
}

/// Parsed arguments of a `@prompt` invocation.
///
/// Expression ranges index into `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCall {
    pub source: String,
    pub file: Option<Expr>,
    pub inline: Option<Expr>,
    pub max_tokens: Option<Expr>,
    pub temperature: Option<Expr>,
    pub json_decode: Option<Expr>,
    pub model: Option<Expr>,
}

impl PromptCall {
    pub fn text_of(&self, expr: &Expr) -> &str {
        expr.text(&self.source)
    }
}

/// Split an identifier off the front of `text`, returning it and the rest.
fn split_ident(text: &str) -> Option<(&str, &str)> {
    if !text.starts_with(is_ident_start) {
        return None;
    }
    let end = text.find(|c: char| !is_ident_continue(c)).unwrap_or(text.len());
    Some((&text[..end], &text[end..]))
}

fn offset_in(outer: &str, inner: &str) -> usize {
    inner.as_ptr() as usize - outer.as_ptr() as usize
}

pub fn parse_set(payload: &str) -> Result<SetDirective<'_>> {
    let Some((name, rest)) = split_ident(payload) else {
        return Err(SyntaxError::new("expected a variable name after @set", 0));
    };
    let rest = rest.trim_start();
    let Some(value) = rest.strip_prefix('=') else {
        return Err(SyntaxError::new(
            format!("expected '=' after '{}'", name),
            offset_in(payload, rest),
        ));
    };
    let value = value.trim();
    if value.is_empty() {
        return Err(SyntaxError::new(
            format!("missing value for '{}'", name),
            payload.len(),
        ));
    }

    if let Some(args) = value.strip_prefix("@prompt") {
        if !args.starts_with(is_ident_continue) {
            let call = parse_prompt(args).map_err(|e| {
                SyntaxError::new(e.message, e.offset + offset_in(payload, args))
            })?;
            return Ok(SetDirective {
                name,
                value: SetValue::Prompt(call),
            });
        }
    }

    Ok(SetDirective {
        name,
        value: SetValue::Expression(value),
    })
}

pub fn parse_foreach(payload: &str) -> Result<ForeachDirective<'_>> {
    let Some((var, rest)) = split_ident(payload) else {
        return Err(SyntaxError::new("expected a loop variable after @foreach", 0));
    };
    let trimmed = rest.trim_start();
    let collection = match trimmed.strip_prefix("in") {
        Some(after) if rest.len() > trimmed.len() && after.starts_with(char::is_whitespace) => {
            after.trim()
        }
        _ => {
            return Err(SyntaxError::new(
                format!("expected 'in' after '{}'", var),
                offset_in(payload, trimmed),
            ))
        }
    };
    if collection.is_empty() {
        return Err(SyntaxError::new(
            "expected a collection after 'in'",
            payload.len(),
        ));
    }
    Ok(ForeachDirective { var, collection })
}

pub fn parse_include(payload: &str) -> Result<IncludeTarget<'_>> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(SyntaxError::new("expected a path after @include", 0));
    }
    if let Some(inner) = payload.strip_prefix('<') {
        return match inner.strip_suffix('>') {
            Some(path) if !path.trim().is_empty() => Ok(IncludeTarget::Raw(path.trim())),
            _ => Err(SyntaxError::new("expected '<PATH>'", 0)),
        };
    }
    Ok(IncludeTarget::Expression(payload))
}

/// Parse the argument list following `@prompt`.
///
/// Accepts `"text" max_tokens=50`, `(file="a.txt", json_decode=true)` and
/// mixes thereof. A second positional argument is an error.
pub fn parse_prompt(args: &str) -> Result<PromptCall> {
    let tokens = unwrap_parens(Lexer::new(args).tokenize()?);
    let mut parser = Parser::new(tokens);
    let mut call = PromptCall {
        source: args.to_string(),
        file: None,
        inline: None,
        max_tokens: None,
        temperature: None,
        json_decode: None,
        model: None,
    };

    while !parser.is_at_end() {
        if parser.peek() == TokenKind::Identifier && parser.peek_next() == TokenKind::Equal {
            let name_token = parser.advance();
            parser.advance();
            let value = parser.parse_expression()?;
            let slot = match name_token.lexeme.as_str() {
                "file" => &mut call.file,
                "max_token" | "max_tokens" => &mut call.max_tokens,
                "temperature" => &mut call.temperature,
                "json_decode" => &mut call.json_decode,
                "model" => &mut call.model,
                other => {
                    return Err(SyntaxError::new(
                        format!("unknown @prompt argument '{}'", other),
                        name_token.range.start,
                    ))
                }
            };
            if slot.is_some() {
                return Err(SyntaxError::new(
                    format!("duplicate @prompt argument '{}'", name_token.lexeme),
                    name_token.range.start,
                ));
            }
            *slot = Some(value);
        } else {
            let start = parser.current_offset();
            let value = parser.parse_expression()?;
            if call.inline.is_some() {
                return Err(SyntaxError::new(
                    "@prompt takes at most one inline text",
                    start,
                ));
            }
            call.inline = Some(value);
        }
        parser.eat(TokenKind::Comma);
    }

    if call.file.is_none() && call.inline.is_none() {
        return Err(SyntaxError::new(
            "@prompt needs inline text or file=\"PATH\"",
            0,
        ));
    }
    Ok(call)
}

/// Drop one pair of parentheses that wraps the whole argument list.
fn unwrap_parens(tokens: Vec<Token>) -> Vec<Token> {
    if tokens.first().map(|t| t.kind) != Some(TokenKind::LeftParen) {
        return tokens;
    }
    let mut depth = 0usize;
    let mut close = None;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    match close {
        Some(close) if close + 2 == tokens.len() => {
            let eof = Token::eof(tokens[close].range.start);
            let mut inner = tokens[1..close].to_vec();
            inner.push(eof);
            inner
        }
        _ => tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Literal};

    fn directive(line: &str) -> (DirectiveKind, &str, &str, usize) {
        match classify(line) {
            LineKind::Directive {
                kind,
                keyword,
                payload,
                payload_offset,
            } => (kind, keyword, payload, payload_offset),
            other => panic!("expected directive, got {:?}", other),
        }
    }

    #[test]
    fn classify_blank_and_literal() {
        assert_eq!(classify("   \t"), LineKind::Blank);
        assert_eq!(classify("  Hello {name}  "), LineKind::Literal("Hello {name}"));
        assert_eq!(classify("@ mention"), LineKind::Literal("@ mention"));
        assert_eq!(classify("user@example.com"), LineKind::Literal("user@example.com"));
    }

    #[test]
    fn classify_directive_payload_offset() {
        let line = "  @set  x = 1";
        let (kind, keyword, payload, offset) = directive(line);
        assert_eq!(kind, DirectiveKind::Set);
        assert_eq!(keyword, "set");
        assert_eq!(payload, "x = 1");
        assert_eq!(&line[offset..], "x = 1");
    }

    #[test]
    fn classify_keywords_by_whole_word() {
        assert_eq!(directive("@else").0, DirectiveKind::Else);
        assert_eq!(directive("@elseif x").0, DirectiveKind::ElseIf);
        assert_eq!(directive("@endif").0, DirectiveKind::EndIf);
        assert_eq!(directive("@endforeach").0, DirectiveKind::EndForeach);
        assert_eq!(directive("@iffy").0, DirectiveKind::Unknown);
        assert_eq!(directive("@If x").0, DirectiveKind::Unknown);
    }

    #[test]
    fn families() {
        assert_eq!(DirectiveKind::ElseIf.family(), Some(Family::If));
        assert_eq!(DirectiveKind::EndForeach.family(), Some(Family::Foreach));
        assert_eq!(DirectiveKind::Log.family(), None);
        assert!(DirectiveKind::Foreach.is_opener());
        assert!(DirectiveKind::EndIf.is_closer());
        assert!(!DirectiveKind::Else.is_closer());
    }

    #[test]
    fn set_expression() {
        let set = parse_set(r#"greeting = "hello""#).unwrap();
        assert_eq!(set.name, "greeting");
        assert_eq!(set.value, SetValue::Expression(r#""hello""#));
    }

    #[test]
    fn set_requires_equals() {
        let err = parse_set("x 1").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(parse_set("= 1").is_err());
        assert!(parse_set("x =").is_err());
    }

    #[test]
    fn set_prompt_with_named_args() {
        let set = parse_set(r#"answer = @prompt "Summarize {doc}" max_token=50 temperature=0.2"#)
            .unwrap();
        let SetValue::Prompt(call) = set.value else {
            panic!("expected prompt");
        };
        assert_eq!(call.text_of(call.inline.as_ref().unwrap()), r#""Summarize {doc}""#);
        assert_eq!(call.text_of(call.max_tokens.as_ref().unwrap()), "50");
        assert_eq!(call.text_of(call.temperature.as_ref().unwrap()), "0.2");
        assert!(call.file.is_none());
    }

    #[test]
    fn prompt_parenthesized_comma_separated() {
        let call = parse_prompt(r#"(file="prompts/q.txt", json_decode=true, model="gpt-4o")"#).unwrap();
        assert!(call.inline.is_none());
        assert_eq!(
            call.file.as_ref().unwrap().kind,
            ExprKind::Literal(Literal::String("prompts/q.txt".into()))
        );
        assert_eq!(
            call.json_decode.as_ref().unwrap().kind,
            ExprKind::Literal(Literal::Bool(true))
        );
        assert!(call.model.is_some());
    }

    #[test]
    fn prompt_leading_paren_expression_kept() {
        let call = parse_prompt(r#"("a" + b) max_tokens=3"#).unwrap();
        let inline = call.inline.as_ref().unwrap();
        assert_eq!(call.text_of(inline), r#"("a" + b)"#);
    }

    #[test]
    fn prompt_file_and_inline_both_recorded() {
        let call = parse_prompt(r#"file="a.txt" "inline""#).unwrap();
        assert!(call.file.is_some());
        assert!(call.inline.is_some());
    }

    #[test]
    fn prompt_errors() {
        assert!(parse_prompt("").is_err());
        assert!(parse_prompt("max_tokens=5").is_err());
        assert!(parse_prompt(r#""a" "b""#).is_err());
        let err = parse_prompt(r#""a" tokens=5"#).unwrap_err();
        assert!(err.message.contains("tokens"));
        assert!(parse_prompt(r#""a" max_token=1 max_tokens=2"#).is_err());
    }

    #[test]
    fn set_prompt_error_offset_is_relative_to_payload() {
        let payload = r#"x = @prompt "a" bogus=1"#;
        let err = parse_set(payload).unwrap_err();
        assert_eq!(&payload[err.offset..err.offset + 5], "bogus");
    }

    #[test]
    fn set_value_starting_with_prompt_word_is_expression() {
        let set = parse_set("x = @prompter").unwrap();
        assert_eq!(set.value, SetValue::Expression("@prompter"));
    }

    #[test]
    fn foreach_payload() {
        let each = parse_foreach("item in [1, 2, 3]").unwrap();
        assert_eq!(each.var, "item");
        assert_eq!(each.collection, "[1, 2, 3]");
        assert!(parse_foreach("item inside").is_err());
        assert!(parse_foreach("item in").is_err());
        assert!(parse_foreach("in xs").is_err());
    }

    #[test]
    fn include_targets() {
        assert_eq!(parse_include("<parts/a.sml>").unwrap(), IncludeTarget::Raw("parts/a.sml"));
        assert_eq!(
            parse_include(r#""parts/a.sml""#).unwrap(),
            IncludeTarget::Expression(r#""parts/a.sml""#)
        );
        assert!(parse_include("").is_err());
        assert!(parse_include("<>").is_err());
        assert!(parse_include("<a.sml").is_err());
    }
}
