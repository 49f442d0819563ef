/// Low-level character reader over a single line of expression text.
///
/// Tracks the byte offset of the next character and provides peek/advance
/// primitives for the lexer.
pub struct Cursor<'src> {
    source: &'src str,
    chars: std::str::Chars<'src>,
    /// Byte offset of the *next* character to be consumed.
    offset: usize,
}

impl<'src> Cursor<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.chars(),
            offset: 0,
        }
    }

    /// Current byte offset in the source.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Peek at the next character without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Peek at the character after the next one.
    pub fn peek_second(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next()
    }

    /// Consume and return the next character.
    pub fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    /// Consume the next character if it matches `expected`.
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// True if there are no more characters.
    pub fn is_eof(&self) -> bool {
        self.peek().is_none()
    }

    /// Slice the source from byte offset `start` to the current offset.
    pub fn slice_from(&self, start: usize) -> &'src str {
        &self.source[start..self.offset]
    }

    /// Consume characters while `predicate` returns true.
    pub fn eat_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if predicate(ch) {
                self.advance();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_byte_offsets() {
        let mut cursor = Cursor::new("é1");
        assert_eq!(cursor.advance(), Some('é'));
        assert_eq!(cursor.offset(), 2);
        assert_eq!(cursor.peek(), Some('1'));
        assert!(cursor.eat('1'));
        assert!(cursor.is_eof());
        assert_eq!(cursor.slice_from(0), "é1");
    }
}
