use std::path::{Path, PathBuf};

use structml_common::Span;

/// One source line, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    /// 1-based line number.
    pub number: u32,
    /// Byte offset of the line start within the file.
    pub offset: u32,
}

/// An immutable, loaded script.
#[derive(Debug, Clone)]
pub struct Script {
    pub path: PathBuf,
    pub lines: Vec<Line>,
}

impl Script {
    /// Build a script from in-memory source. `path` is used for diagnostics
    /// and to resolve relative includes.
    pub fn from_source(path: impl Into<PathBuf>, source: &str) -> Self {
        let mut lines = Vec::new();
        let mut offset = 0usize;
        for (i, raw) in source.split_inclusive('\n').enumerate() {
            let text = raw
                .strip_suffix('\n')
                .map(|t| t.strip_suffix('\r').unwrap_or(t))
                .unwrap_or(raw);
            lines.push(Line {
                text: text.to_string(),
                number: i as u32 + 1,
                offset: offset as u32,
            });
            offset += raw.len();
        }
        Self {
            path: path.into(),
            lines,
        }
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_source(path, &source))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    /// Directory relative paths in this script resolve against.
    pub fn base_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Span covering the line at `index`.
    pub fn span(&self, index: usize) -> Span {
        let file = self.path.display().to_string();
        match self.lines.get(index) {
            Some(line) => Span::line(file, line.number, line.offset, line.text.len() as u32),
            None => {
                let number = self.lines.len() as u32 + 1;
                Span::line(file, number, 0, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_with_offsets() {
        let script = Script::from_source("main.sml", "a\r\nbc\n\nlast");
        let texts: Vec<&str> = script.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "bc", "", "last"]);
        assert_eq!(script.lines[1].number, 2);
        assert_eq!(script.lines[1].offset, 3);
        assert_eq!(script.lines[3].offset, 7);
    }

    #[test]
    fn trailing_newline_adds_no_line() {
        assert_eq!(Script::from_source("x", "one\ntwo\n").len(), 2);
        assert!(Script::from_source("x", "").is_empty());
    }

    #[test]
    fn span_points_at_line() {
        let script = Script::from_source("dir/main.sml", "first\n  @if x\n");
        let span = script.span(1);
        assert_eq!(span.to_string(), "dir/main.sml:2:1");
        assert_eq!(span.start.offset, 6);
        assert_eq!(span.end.offset, 13);
    }

    #[test]
    fn base_dir_of_bare_file_is_current_dir() {
        assert_eq!(Script::from_source("main.sml", "").base_dir(), Path::new("."));
        assert_eq!(
            Script::from_source("a/b/main.sml", "").base_dir(),
            Path::new("a/b")
        );
    }
}
