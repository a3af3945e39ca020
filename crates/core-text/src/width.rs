//! Grapheme cluster display width.
//!
//! `egc_width` is the single authority for how many cells a grapheme cluster
//! occupies when measuring lines. Baseline widths come from `unicode_width`;
//! a small classifier widens emoji compositions the baseline crate
//! under-measures (ZWJ sequences, flags, keycaps, skin tone modifiers).
//!
//! Invariants:
//! - Empty input measures 0; every other cluster measures at least 1.
//! - The classifier only ever widens. Over-estimation costs a blank cell,
//!   under-estimation makes measured lines overflow their wrap width.

use unicode_width::UnicodeWidthChar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EgcKind {
    Narrow,
    Wide,
    Emoji,
    Combining { wide_base: bool },
}

const ZWJ: char = '\u{200D}';
const KEYCAP_COMBINING: char = '\u{20E3}';

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_skin_tone_modifier(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

// Emoji blocks plus the misc symbols / dingbats ranges where legacy emoji live.
fn is_extended_pictographic(c: char) -> bool {
    ('\u{1F300}'..='\u{1FAFF}').contains(&c) || ('\u{2600}'..='\u{27BF}').contains(&c)
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
        || ('\u{1AB0}'..='\u{1AFF}').contains(&c)
        || ('\u{1DC0}'..='\u{1DFF}').contains(&c)
        || ('\u{20D0}'..='\u{20FF}').contains(&c)
        || ('\u{FE20}'..='\u{FE2F}').contains(&c)
}

fn char_width(c: char) -> usize {
    c.width().unwrap_or(1)
}

fn classify(egc: &str) -> EgcKind {
    let mut chars = egc.chars();
    let Some(first) = chars.next() else {
        return EgcKind::Narrow;
    };
    if chars.next().is_none() {
        if first.is_ascii() {
            return EgcKind::Narrow;
        }
        if is_extended_pictographic(first) {
            return EgcKind::Emoji;
        }
        return if char_width(first) == 2 {
            EgcKind::Wide
        } else {
            EgcKind::Narrow
        };
    }

    let count = egc.chars().count();
    let mut pictographic = 0usize;
    let mut regional = 0usize;
    let mut has_zwj = false;
    let mut has_skin = false;
    let mut has_combining = false;
    let mut any_wide = false;
    let mut wide_base = false;
    let mut saw_base = false;
    let mut ends_with_keycap = false;
    for (i, c) in egc.chars().enumerate() {
        if is_extended_pictographic(c) {
            pictographic += 1;
        }
        if is_regional_indicator(c) {
            regional += 1;
        }
        has_zwj |= c == ZWJ;
        has_skin |= is_skin_tone_modifier(c);
        has_combining |= is_combining_mark(c);
        any_wide |= char_width(c) == 2;
        if c == KEYCAP_COMBINING && i == count - 1 {
            ends_with_keycap = true;
        }
        if !saw_base && !is_combining_mark(c) {
            saw_base = true;
            wide_base = is_extended_pictographic(c) || char_width(c) == 2;
        }
    }

    if ends_with_keycap || (regional == 2 && count == 2) {
        return EgcKind::Emoji;
    }
    if (has_zwj && pictographic >= 2) || (pictographic >= 1 && has_skin) {
        return EgcKind::Emoji;
    }
    if pictographic == 1 && !has_zwj {
        return EgcKind::Emoji;
    }
    if has_combining {
        return EgcKind::Combining { wide_base };
    }
    if any_wide || pictographic > 0 {
        return EgcKind::Wide;
    }
    EgcKind::Narrow
}

/// Cell width of a single grapheme cluster.
///
/// Precondition: `egc` is one grapheme cluster as produced by
/// `unicode_segmentation`; multi-cluster input is not re-validated.
#[inline]
pub fn egc_width(egc: &str) -> u16 {
    if egc.is_empty() {
        return 0;
    }
    if egc.len() == 1 {
        return 1;
    }
    match classify(egc) {
        EgcKind::Narrow => 1,
        EgcKind::Wide | EgcKind::Emoji => 2,
        EgcKind::Combining { wide_base } => {
            if wide_base {
                2
            } else {
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_and_empty() {
        assert_eq!(egc_width(""), 0);
        assert_eq!(egc_width("a"), 1);
        assert_eq!(egc_width(" "), 1);
    }

    #[test]
    fn cjk_is_wide() {
        assert_eq!(egc_width("漢"), 2);
        assert_eq!(egc_width("字"), 2);
    }

    #[test]
    fn combining_sequence_follows_base() {
        assert_eq!(egc_width("e\u{0301}"), 1);
    }

    #[test]
    fn emoji_compositions_are_wide() {
        assert_eq!(egc_width("😀"), 2);
        assert_eq!(egc_width("👍🏽"), 2);
        assert_eq!(egc_width("🇺🇸"), 2);
        assert_eq!(egc_width("1\u{FE0F}\u{20E3}"), 2);
        assert_eq!(egc_width("👨\u{200D}👩\u{200D}👧"), 2);
    }
}
