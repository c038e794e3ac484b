//! Normalization passes applied to every extractor's output.
//!
//! Each pass is a function `&str -> String` applied in sequence. The result has
//! one non-empty, trimmed line per line of content. Page-number stripping only
//! runs on paginated text (PDF layers and OCR output): in a sheet or a CSV a
//! line holding a bare number is data.

use std::sync::LazyLock;

use regex::Regex;

/// Run the normalization pipeline on raw extracted text.
pub fn normalize(raw: &str) -> String {
    let mut result = fold_compatibility(raw);

    result = collapse_inline_whitespace(&result);
    result = squeeze_lines(&result);

    result
}

/// [`normalize`], plus removal of page-number lines.
pub fn normalize_paginated(raw: &str) -> String {
    let mut result = fold_compatibility(raw);

    result = collapse_inline_whitespace(&result);
    result = strip_page_markers(&result);
    result = squeeze_lines(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Compatibility folding
// ---------------------------------------------------------------------------

/// Fold ligatures, exotic spaces and fullwidth forms to their plain equivalents.
fn fold_compatibility(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{FB05}' | '\u{FB06}' => out.push_str("st"),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' | '\u{202F}' | '\u{3000}' => out.push(' '),
            '\u{2000}'..='\u{200A}' => out.push(' '),
            '\u{FEFF}' | '\u{200B}' => {}
            '\r' => out.push('\n'),
            // Fullwidth ASCII block
            '\u{FF01}'..='\u{FF5E}' => {
                out.push(char::from_u32(c as u32 - 0xFEE0).unwrap_or(c));
            }
            _ => out.push(c),
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Pass 2: Collapse spaces and tabs
// ---------------------------------------------------------------------------

fn collapse_inline_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C]+").expect("valid regex"));

    WS_RE.replace_all(text, " ").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Page-number artifacts
// ---------------------------------------------------------------------------

/// Drop lines that are only a page number: `Page 3`, `Page 3 / 10`,
/// `Page 3 sur 10`, `3/10`, `- 3 -`, or a short bare number.
fn strip_page_markers(text: &str) -> String {
    static PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)^(?:page\s*\d+(?:\s*(?:/|of|sur|de)\s*\d+)?|\d+\s*/\s*\d+|-\s*\d+\s*-|\d{1,4})$",
        )
        .expect("valid regex")
    });

    text.lines()
        .filter(|line| !PAGE_RE.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Trim lines, drop blanks
// ---------------------------------------------------------------------------

fn squeeze_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
