//! Character-window chunking with boundary snapping.
//!
//! Splits merged report text into overlapping windows measured in
//! characters. Each window end is pulled back to the nearest paragraph or
//! sentence boundary found in its final stretch, so chunks rarely cut a
//! sentence in half.
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// How far back from the window end we look for a natural boundary.
const BREAK_ZONE: usize = 100;

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").unwrap_or_else(|e| panic!("invalid regex: {e}")));

/// Chunk one or more documents into overlapping character windows.
///
/// Documents are joined with a newline and runs of three or more newlines
/// are collapsed to a paragraph break before windowing. Empty chunks are
/// dropped. The final window always reaches the end of the text and ends
/// the scan, so short inputs yield exactly one chunk.
#[must_use]
pub fn chunk_documents(texts: &[String], chunk_size: usize, overlap: usize) -> Vec<String> {
    let joined = texts.join("\n");
    let text = EXCESS_NEWLINES.replace_all(&joined, "\n\n");
    let chars: Vec<char> = text.chars().collect();

    if chars.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = (start + chunk_size).min(chars.len());

        let end = if window_end < chars.len() {
            find_break_point(&chars, start, window_end)
        } else {
            window_end
        };

        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if window_end >= chars.len() {
            break;
        }

        let mut next = end.saturating_sub(overlap);
        if next <= start {
            // Overlap would stall the scan; jump to the cut instead
            next = end;
        }
        start = next;
    }

    debug!("chunked {} chars into {} chunks", chars.len(), chunks.len());
    chunks
}

/// Find a cut point in `[start, window_end)`, preferring a paragraph break
/// and then a sentence end inside the last [`BREAK_ZONE`] characters.
fn find_break_point(chars: &[char], start: usize, window_end: usize) -> usize {
    let zone_start = window_end.saturating_sub(BREAK_ZONE).max(start);

    // Paragraph boundary: cut just after the blank line
    for i in (zone_start..window_end.saturating_sub(1)).rev() {
        if chars[i] == '\n' && chars[i + 1] == '\n' {
            return i + 2;
        }
    }

    // Sentence boundary: punctuation followed by whitespace
    for i in (zone_start..window_end.saturating_sub(1)).rev() {
        if matches!(chars[i], '.' | '?' | '!') && chars[i + 1].is_whitespace() {
            return i + 1;
        }
    }

    window_end
}
