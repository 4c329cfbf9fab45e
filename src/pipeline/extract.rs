//! Bounded text extraction.
//!
//! Decoding is deliberately simple: lossy UTF-8 with a fixed character cap.
//! The cap bounds memory and embedding cost regardless of document size.

/// Decode document bytes into text, keeping at most `max_chars` characters.
pub(crate) fn extract_text(bytes: &[u8], max_chars: usize) -> String {
    String::from_utf8_lossy(bytes).chars().take(max_chars).collect()
}

/// Truncate extracted text to the stored preview budget.
pub(crate) fn preview_of(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
