//! Splitting text into literal runs and `{expr}` interpolation spans.
//!
//! Matching is bracket- and quote-aware, so `{list[0]}` and
//! `{data["a}b"]}` are captured whole. A brace group whose interior is empty
//! or has a top-level `:` is a map/JSON literal rather than a span; it is
//! returned as [`Segment::Braced`] with its interior segmented again.

/// One piece of segmented text. Offsets are byte offsets into the text
/// passed to [`segment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Span {
        /// Text between the braces.
        inner: &'a str,
        /// Offset of the opening `{`.
        start: usize,
        /// Quote character enclosing the span, when quotes are tracked.
        quoted: Option<char>,
    },
    Braced {
        start: usize,
        parts: Vec<Segment<'a>>,
    },
}

impl Segment<'_> {
    /// Offset one past the closing `}` of a span.
    pub fn span_end(&self) -> Option<usize> {
        match self {
            Segment::Span { inner, start, .. } => Some(start + inner.len() + 2),
            _ => None,
        }
    }
}

/// True when `text` contains a `{` that opens a complete span or brace group.
pub fn has_spans(text: &str) -> bool {
    segment(text, false)
        .iter()
        .any(|s| !matches!(s, Segment::Literal(_)))
}

/// Segment `text`.
///
/// With `track_quotes`, `'`/`"` strings outside spans are followed (with
/// backslash escapes) so each span knows whether it sits inside a string
/// literal; an escaped `\{` inside a string never opens a span.
pub fn segment(text: &str, track_quotes: bool) -> Vec<Segment<'_>> {
    segment_at(text, 0, track_quotes)
}

fn segment_at(text: &str, base: usize, track_quotes: bool) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if track_quotes {
            match (quote, b) {
                (Some(_), b'\\') => {
                    i += 2;
                    continue;
                }
                (Some(q), _) if b == q => {
                    quote = None;
                    i += 1;
                    continue;
                }
                (None, b'"' | b'\'') => {
                    quote = Some(b);
                    i += 1;
                    continue;
                }
                _ => {}
            }
        }

        if b != b'{' {
            i += 1;
            continue;
        }

        let Some(close) = find_close(bytes, i) else {
            break;
        };
        if literal_start < i {
            segments.push(Segment::Literal(&text[literal_start..i]));
        }
        let inner = &text[i + 1..close];
        if inner.trim().is_empty() || has_top_level_colon(inner) {
            segments.push(Segment::Braced {
                start: base + i,
                parts: segment_at(inner, base + i + 1, track_quotes),
            });
        } else {
            segments.push(Segment::Span {
                inner,
                start: base + i,
                quoted: quote.map(char::from),
            });
        }
        i = close + 1;
        literal_start = i;
    }

    if literal_start < text.len() {
        segments.push(Segment::Literal(&text[literal_start..]));
    }
    segments
}

/// Index of the `}` matching the `{` at `open`, skipping nested brackets
/// and quoted strings.
fn find_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' | b'[' | b'(' => depth += 1,
                b'}' | b']' | b')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return (b == b'}').then_some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn has_top_level_colon(inner: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for b in inner.bytes() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth = depth.saturating_sub(1),
            b':' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(inner: &str, start: usize) -> Segment<'_> {
        Segment::Span {
            inner,
            start,
            quoted: None,
        }
    }

    #[test]
    fn plain_text_is_one_literal() {
        assert_eq!(segment("no spans here", false), vec![Segment::Literal("no spans here")]);
        assert!(segment("", false).is_empty());
        assert!(!has_spans("no spans here"));
    }

    #[test]
    fn spans_and_literals_interleave() {
        assert_eq!(
            segment("Hi {name}, {count} left", false),
            vec![
                Segment::Literal("Hi "),
                span("name", 3),
                Segment::Literal(", "),
                span("count", 11),
                Segment::Literal(" left"),
            ]
        );
    }

    #[test]
    fn nested_brackets_and_quotes_stay_in_one_span() {
        let text = r#"{data["a}b"][0]} and {xs[{"k": 1}["k"]]}"#;
        let segments = segment(text, false);
        assert_eq!(segments[0], span(r#"data["a}b"][0]"#, 0));
        assert_eq!(segments[2], span(r#"xs[{"k": 1}["k"]]"#, 21));
        assert_eq!(segments[0].span_end(), Some(16));
    }

    #[test]
    fn unterminated_brace_leaves_rest_verbatim() {
        assert_eq!(
            segment("a {b} {c", false),
            vec![Segment::Literal("a "), span("b", 2), Segment::Literal(" {c")]
        );
    }

    #[test]
    fn mismatched_closer_is_not_a_span() {
        assert_eq!(segment("{a]", false), vec![Segment::Literal("{a]")]);
    }

    #[test]
    fn map_literal_is_braced_with_inner_spans() {
        let text = r#"{"name": "{user}", "n": {n}}"#;
        let segments = segment(text, false);
        assert_eq!(segments.len(), 1);
        let Segment::Braced { start, parts } = &segments[0] else {
            panic!("expected braced group");
        };
        assert_eq!(*start, 0);
        assert_eq!(
            parts,
            &vec![
                Segment::Literal(r#""name": ""#),
                span("user", 10),
                Segment::Literal(r#"", "n": "#),
                span("n", 24),
            ]
        );
    }

    #[test]
    fn empty_braces_are_kept() {
        assert_eq!(
            segment("{} and { }", false),
            vec![
                Segment::Braced { start: 0, parts: vec![] },
                Segment::Literal(" and "),
                Segment::Braced {
                    start: 7,
                    parts: vec![Segment::Literal(" ")]
                },
            ]
        );
        assert!(has_spans("{}"));
    }

    #[test]
    fn quote_tracking_marks_quoted_spans() {
        let segments = segment(r#""Hello {name}" + {suffix}"#, true);
        assert_eq!(
            segments[1],
            Segment::Span {
                inner: "name",
                start: 7,
                quoted: Some('"'),
            }
        );
        assert_eq!(
            segments[3],
            Segment::Span {
                inner: "suffix",
                start: 17,
                quoted: None,
            }
        );
    }

    #[test]
    fn escaped_brace_in_string_is_not_a_span() {
        let text = r#""\{x}" {y}"#;
        let segments = segment(text, true);
        assert_eq!(segments[0], Segment::Literal(r#""\{x}" "#));
        assert_eq!(segments[1], span("y", 7));
    }

    #[test]
    fn colon_inside_index_is_not_a_map() {
        assert_eq!(
            segment(r#"{d["a:b"]}"#, false),
            vec![span(r#"d["a:b"]"#, 0)]
        );
    }
}
