use std::ops::Range;

use structml_syntax::parser::{classify, DirectiveKind, Family, LineKind};
use structml_syntax::Script;

use crate::error::{Result, RuntimeError};

/// A block body and the directive that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMatch {
    /// Line indices strictly between the opener and `terminator`.
    pub body: Range<usize>,
    /// Index of the depth-0 terminator line.
    pub terminator: usize,
    pub kind: DirectiveKind,
}

/// One branch of an `@if` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Index of the `@if`, `@elseif` or `@else` line.
    pub header: usize,
    pub body: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfChain {
    pub branches: Vec<Branch>,
    /// Index of the closing `@endif`.
    pub end: usize,
}

/// Scan `range` for the first depth-0 directive of `family` whose kind is
/// in `terminators`, skipping nested blocks of the same family.
///
/// Keywords are read from the raw lines, never from interpolated text.
pub fn find_terminator(
    script: &Script,
    range: Range<usize>,
    family: Family,
    terminators: &[DirectiveKind],
) -> Option<BlockMatch> {
    let start = range.start;
    let mut depth = 0usize;
    for i in range {
        let LineKind::Directive { kind, .. } = classify(&script.lines[i].text) else {
            continue;
        };
        if kind.family() != Some(family) {
            continue;
        }
        if depth == 0 && terminators.contains(&kind) {
            return Some(BlockMatch {
                body: start..i,
                terminator: i,
                kind,
            });
        }
        if kind.is_opener() {
            depth += 1;
        } else if kind.is_closer() {
            depth = depth.saturating_sub(1);
        }
    }
    None
}

/// Match the block opened at `opener`, searching up to `end`.
pub fn match_block(
    script: &Script,
    opener: usize,
    end: usize,
    family: Family,
    terminators: &[DirectiveKind],
) -> Result<BlockMatch> {
    find_terminator(script, opener + 1..end, family, terminators)
        .ok_or_else(|| unterminated(script, opener))
}

/// Match a whole `@if` / `@elseif` / `@else` / `@endif` chain.
pub fn match_if_chain(script: &Script, opener: usize, end: usize) -> Result<IfChain> {
    const OPEN: &[DirectiveKind] = &[DirectiveKind::ElseIf, DirectiveKind::Else, DirectiveKind::EndIf];
    const AFTER_ELSE: &[DirectiveKind] = &[DirectiveKind::EndIf];

    let mut branches = Vec::new();
    let mut header = opener;
    let mut terminators = OPEN;
    loop {
        let found = find_terminator(script, header + 1..end, Family::If, terminators)
            .ok_or_else(|| unterminated(script, opener))?;
        branches.push(Branch {
            header,
            body: found.body,
        });
        match found.kind {
            DirectiveKind::EndIf => {
                return Ok(IfChain {
                    branches,
                    end: found.terminator,
                })
            }
            DirectiveKind::Else => terminators = AFTER_ELSE,
            _ => {}
        }
        header = found.terminator;
    }
}

fn unterminated(script: &Script, opener: usize) -> RuntimeError {
    let directive = match classify(&script.lines[opener].text) {
        LineKind::Directive { keyword, .. } => keyword.to_string(),
        _ => String::from("block"),
    };
    RuntimeError::UnterminatedBlock {
        directive,
        span: script.span(opener),
    }
}
