//! Sentence-level units for the boundary segmenter.

use std::sync::OnceLock;

use regex::Regex;

static SENTENCE_END: OnceLock<Regex> = OnceLock::new();

fn sentence_end() -> &'static Regex {
    SENTENCE_END.get_or_init(|| {
        Regex::new(r#"[.!?]+["'”’)\]]*\s+|[。！？]+\s*|\n[ \t]*\n\s*"#)
            .expect("sentence boundary regex is valid")
    })
}

/// A trimmed, non-empty span of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    /// Byte range in the source.
    pub start: usize,
    pub end: usize,
    /// Character range in the source.
    pub char_start: usize,
    pub char_end: usize,
}

impl Unit {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// Splits `text` into sentence units no longer than `max_chars` characters.
///
/// Units end after terminal punctuation followed by whitespace, after CJK
/// full stops, or at blank lines. Over-long sentences are cut at the last
/// whitespace before the limit.
pub fn split_units(text: &str, max_chars: usize) -> Vec<Unit> {
    let max_chars = max_chars.max(1);
    let mut spans = Vec::new();
    let mut cursor = 0;
    for m in sentence_end().find_iter(text) {
        spans.push((cursor, m.end()));
        cursor = m.end();
    }
    if cursor < text.len() {
        spans.push((cursor, text.len()));
    }

    let mut byte_ranges = Vec::new();
    for (start, end) in spans {
        let Some((start, end)) = trim_range(text, start, end) else {
            continue;
        };
        hard_split(text, start, end, max_chars, &mut byte_ranges);
    }

    let mut units = Vec::with_capacity(byte_ranges.len());
    let mut last_byte = 0;
    let mut last_char = 0;
    for (start, end) in byte_ranges {
        let char_start = last_char + text[last_byte..start].chars().count();
        let char_end = char_start + text[start..end].chars().count();
        units.push(Unit {
            start,
            end,
            char_start,
            char_end,
        });
        last_byte = end;
        last_char = char_end;
    }
    units
}

fn trim_range(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let new_start = start + leading;
    Some((new_start, new_start + trimmed.len()))
}

fn hard_split(text: &str, start: usize, end: usize, max_chars: usize, out: &mut Vec<(usize, usize)>) {
    let mut start = start;
    loop {
        let slice = &text[start..end];
        let Some((limit, _)) = slice.char_indices().nth(max_chars) else {
            out.push((start, end));
            return;
        };

        let window = &slice[..limit];
        let cut = match window.rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => pos,
            _ => limit,
        };

        if let Some(range) = trim_range(text, start, start + cut) {
            out.push(range);
        }
        match trim_range(text, start + cut, end) {
            Some((next, _)) => start = next,
            None => return,
        }
    }
}
