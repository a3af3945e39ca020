//! Property-based tests for the greedy wrap breaker.

use core_text::{Document, LineBreaker, LineProperties, WrapBreaker, WrapConstraints};
use proptest::prelude::*;

proptest! {
    // Lines tile the document, respect the wrap width unless a single cluster
    // is wider than it, and only the final line ends without a break or
    // paragraph end.
    #[test]
    fn lines_tile_document_within_width(text in "[ab \n漢]{0,80}", width in 1u32..10) {
        let doc = Document::from_str("w", &text).unwrap();
        let breaker = WrapBreaker::default();
        let constraints = WrapConstraints::uniform(f64::from(width));
        let props = LineProperties::default();

        let mut offset = 0;
        let mut count = 0;
        while offset < doc.len_chars() {
            let line = breaker.format_line(&doc, offset, &constraints, &props);
            prop_assert!(line.length > 0);
            prop_assert!(line.content_length <= line.length);
            prop_assert!(offset + line.length <= doc.len_chars());

            let content = doc.slice(offset, offset + line.content_length);
            let visible = content.chars().filter(|c| !c.is_whitespace()).count();
            prop_assert!(line.width <= f64::from(width) || visible == 1);

            let again = breaker.format_line(&doc, offset, &constraints, &props);
            prop_assert_eq!(line, again);

            offset += line.length;
            count += 1;
            if offset == doc.len_chars() {
                prop_assert!(line.end_of_paragraph);
            }
        }
        prop_assert_eq!(offset, doc.len_chars());
        prop_assert!(count <= doc.len_chars());
    }

    // The last position a line's decision depended on never moves backward
    // from one line to the next, so an edit past one line's reach is also past
    // the reach of every line before it.
    #[test]
    fn reach_never_decreases(
        text in "[ab \t\r\n漢é\u{301}]{0,80}",
        width in 1u32..10,
        tab_size in 1u16..8,
    ) {
        let doc = Document::from_str("w", &text).unwrap();
        let breaker = WrapBreaker::default();
        let constraints = WrapConstraints::uniform(f64::from(width));
        let props = LineProperties { tab_size, ..LineProperties::default() };

        let mut offset = 0;
        let mut reach = 0;
        while offset < doc.len_chars() {
            let line = breaker.format_line(&doc, offset, &constraints, &props);
            offset += line.length;
            let next = offset + line.lookahead;
            prop_assert!(next >= reach);
            prop_assert!(next <= doc.len_chars());
            reach = next;
        }
    }
}
