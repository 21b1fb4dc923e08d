// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Documents and Sentences
// ─────────────────────────────────────────────────────────────────────
//! Source text plus its sentence segmentation.
//!
//! Sentence spans are byte offsets into the original text and are the
//! only way evidence is quoted, so a quote is always a verbatim slice.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Half-open byte range `[start, end)` into a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains(&self, other: &TextSpan) -> bool {
        other.start >= self.start && other.end <= self.end && other.start <= other.end
    }

    /// Whether the span is a valid slice of `text`.
    pub fn is_valid_in(&self, text: &str) -> bool {
        self.start <= self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub index: usize,
    pub span: TextSpan,
}

/// Text under analysis with its ordered, non-overlapping sentences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    text: String,
    sentences: Vec<Sentence>,
}

const TERMINATORS: [char; 4] = ['.', '!', '?', '…'];
const CLOSERS: [char; 10] = ['.', '!', '?', '"', '\'', ')', ']', '»', '”', '’'];

impl Document {
    /// Split text into sentences on terminal punctuation and line breaks.
    ///
    /// A terminator ends a sentence only when followed by whitespace or the
    /// end of text; trailing quotes and brackets stay with their sentence.
    /// Surrounding whitespace is excluded from every span.
    pub fn segment(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut spans = Vec::new();
        let mut start = 0usize;
        let mut chars = text.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if c == '\n' {
                push_trimmed(&text, start, i, &mut spans);
                start = i + c.len_utf8();
                continue;
            }
            if !TERMINATORS.contains(&c) {
                continue;
            }
            let mut end = i + c.len_utf8();
            while let Some(&(j, next)) = chars.peek() {
                if !CLOSERS.contains(&next) {
                    break;
                }
                end = j + next.len_utf8();
                chars.next();
            }
            let at_boundary = match chars.peek() {
                None => true,
                Some(&(_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                push_trimmed(&text, start, end, &mut spans);
                start = end;
            }
        }
        push_trimmed(&text, start, text.len(), &mut spans);

        let sentences = spans
            .into_iter()
            .enumerate()
            .map(|(index, span)| Sentence { index, span })
            .collect();
        Self { text, sentences }
    }

    /// Build from a caller-supplied segmentation.
    ///
    /// Spans must be non-empty, in order, non-overlapping, and lie on char
    /// boundaries inside `text`.
    pub fn from_spans(text: impl Into<String>, spans: &[TextSpan]) -> IndexResult<Self> {
        let text = text.into();
        let mut previous_end = 0usize;
        for (i, span) in spans.iter().enumerate() {
            if span.is_empty() {
                return Err(IndexError::Validation(format!("sentence {i} has an empty span")));
            }
            if !span.is_valid_in(&text) {
                return Err(IndexError::Validation(format!(
                    "sentence {i} span {}..{} is not a valid slice of a {}-byte document",
                    span.start,
                    span.end,
                    text.len()
                )));
            }
            if span.start < previous_end {
                return Err(IndexError::Validation(format!(
                    "sentence {i} overlaps or precedes sentence {}",
                    i.saturating_sub(1)
                )));
            }
            previous_end = span.end;
        }
        let sentences = spans
            .iter()
            .enumerate()
            .map(|(index, span)| Sentence { index, span: *span })
            .collect();
        Ok(Self { text, sentences })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn sentence(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }

    /// Literal text of a sentence.
    pub fn sentence_text(&self, index: usize) -> Option<&str> {
        self.sentences
            .get(index)
            .and_then(|s| self.text.get(s.span.start..s.span.end))
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<TextSpan>) {
    if start >= end {
        return;
    }
    let slice = &text[start..end];
    let trimmed_start = slice.trim_start();
    let lead = slice.len() - trimmed_start.len();
    let trimmed = trimmed_start.trim_end();
    if trimmed.is_empty() {
        return;
    }
    spans.push(TextSpan::new(start + lead, start + lead + trimmed.len()));
}
