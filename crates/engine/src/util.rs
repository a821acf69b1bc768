//! Internal helpers for text normalisation.
//!
//! These utilities are **not** part of the public API. Every comparison the
//! resolvers make goes through [`normalize_key`], so registry phrases and
//! user input agree on width, case and spacing.

use unicode_normalization::UnicodeNormalization;

/// NFKC-normalise raw chat input and collapse internal whitespace.
///
/// NFKC folds full-width digits and letters (`１２０`, `ＤＢＳ`) into their
/// ASCII forms, which the amount extractor relies on.
pub(crate) fn normalize_input(input: &str) -> String {
    let folded: String = input.nfkc().collect();
    single_line(&folded)
}

/// Trim and fold every whitespace run, line breaks included, into one space.
pub(crate) fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Matching key: normalised, trimmed, lower-cased, inner spaces removed.
pub(crate) fn normalize_key(input: &str) -> String {
    normalize_input(input)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Strip `token` from the start of `text`, ignoring ASCII case.
pub(crate) fn strip_prefix_ci<'a>(text: &'a str, token: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    let mut end = 0;
    for expected in token.chars() {
        let (idx, actual) = chars.next()?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return None;
        }
        end = idx + actual.len_utf8();
    }
    Some(&text[end..])
}

/// Strip `token` from the end of `text`, ignoring ASCII case.
pub(crate) fn strip_suffix_ci<'a>(text: &'a str, token: &str) -> Option<&'a str> {
    let mut chars = text.char_indices().rev();
    let mut start = text.len();
    for expected in token.chars().rev() {
        let (idx, actual) = chars.next()?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return None;
        }
        start = idx;
    }
    Some(&text[..start])
}

/// Truncate to `max_chars` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}
