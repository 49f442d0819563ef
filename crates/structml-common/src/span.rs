/// Source position within a script (1-based line/column, 0-based byte offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
    /// 0-based byte offset from start of file.
    pub offset: u32,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// A range of source text in a given script file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    /// Script path as given to (or resolved by) the interpreter.
    pub file: String,
    /// Start position (inclusive).
    pub start: Position,
    /// End position (exclusive).
    pub end: Position,
}

impl Span {
    pub fn new(file: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            file: file.into(),
            start,
            end,
        }
    }

    /// Span covering a whole line, given the byte offset where the line
    /// starts and its length in bytes.
    pub fn line(file: impl Into<String>, line: u32, offset: u32, len: u32) -> Self {
        Self {
            file: file.into(),
            start: Position::new(line, 1, offset),
            end: Position::new(line, len + 1, offset + len),
        }
    }

    /// Narrow a line span to the byte range `start..end` within that line.
    pub fn sub(&self, start: u32, end: u32) -> Span {
        Span {
            file: self.file.clone(),
            start: Position::new(self.start.line, start + 1, self.start.offset + start),
            end: Position::new(self.start.line, end + 1, self.start.offset + end),
        }
    }

    /// Placeholder span for text that has no file behind it.
    pub fn dummy() -> Self {
        Self {
            file: String::new(),
            start: Position::default(),
            end: Position::default(),
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start.line, self.start.column)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_span_display() {
        let span = Span::line("main.sml", 4, 37, 10);
        assert_eq!(span.to_string(), "main.sml:4:1");
        assert_eq!(span.end.offset, 47);
    }

    #[test]
    fn sub_span_keeps_line() {
        let span = Span::line("main.sml", 2, 10, 20).sub(5, 8);
        assert_eq!(span.start, Position::new(2, 6, 15));
        assert_eq!(span.end, Position::new(2, 9, 18));
    }
}
