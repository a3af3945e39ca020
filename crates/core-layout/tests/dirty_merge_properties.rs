//! Property-based tests for DirtyRangeTracker merge semantics.

use core_layout::{ContentEdit, DirtyRangeTracker, HighlightLayers, RenderInvalidation};
use core_text::Document;
use proptest::prelude::*;

fn layers() -> impl Strategy<Value = HighlightLayers> {
    (0u8..32).prop_map(HighlightLayers::from_bits_truncate)
}

proptest! {
    // The merged edit covers every changed position: text before it and text
    // after it are untouched originals.
    #[test]
    fn merged_range_covers_every_change(
        text in "[a-z]{0,40}",
        edits in prop::collection::vec((0usize..60, 0usize..8, "[A-Z]{0,6}"), 1..8),
    ) {
        let original = Document::from_str("o", &text).unwrap();
        let mut doc = original.clone();
        let mut tracker = DirtyRangeTracker::new();
        for (at, remove, insert) in &edits {
            let len = doc.len_chars();
            let start = at % (len + 1);
            let change = doc.replace(start, (start + remove).min(len), insert);
            tracker.merge(ContentEdit::from(change));
        }

        let Some(merged) = tracker.merged_range() else {
            prop_assert_eq!(doc.text(), original.text());
            return Ok(());
        };
        prop_assert_eq!(
            doc.len_chars() as isize - original.len_chars() as isize,
            merged.delta()
        );
        prop_assert_eq!(doc.slice(0, merged.start), original.slice(0, merged.start));
        prop_assert_eq!(
            doc.slice(merged.new_end(), doc.len_chars()),
            original.slice(merged.old_end(), original.len_chars())
        );
    }

    // Two disjoint edits give the same merged range whichever arrives first,
    // once the later one is expressed in post-edit coordinates.
    #[test]
    fn disjoint_edits_merge_in_either_order(
        a in 0usize..50,
        a_added in 0usize..6,
        a_removed in 0usize..6,
        gap in 0usize..10,
        b_added in 0usize..6,
        b_removed in 0usize..6,
    ) {
        let first = ContentEdit::new(a, a_added, a_removed);
        let b = a + a_removed + gap;
        let second = ContentEdit::new(b, b_added, b_removed);

        let mut forward = DirtyRangeTracker::new();
        forward.merge(first);
        forward.merge(ContentEdit::new(
            b.saturating_add_signed(first.delta()),
            b_added,
            b_removed,
        ));

        let mut backward = DirtyRangeTracker::new();
        backward.merge(second);
        backward.merge(first);

        prop_assert_eq!(forward.merged_range(), backward.merged_range());
    }

    // Pending content entries stay sorted and strictly separated.
    #[test]
    fn content_entries_stay_separated(
        edits in prop::collection::vec((0usize..100, 0usize..5, 0usize..5), 1..12),
    ) {
        let mut tracker = DirtyRangeTracker::new();
        let mut len = 100usize;
        for &(at, added, remove) in &edits {
            let start = at % (len + 1);
            let removed = remove.min(len - start);
            tracker.merge(ContentEdit::new(start, added, removed));
            len = len + added - removed;
        }
        for pair in tracker.edits().windows(2) {
            prop_assert!(pair[0].new_end() < pair[1].start);
        }
        prop_assert!(tracker.edits().iter().all(|e| !e.is_empty()));
    }

    // Render-only spans coalesce to the same set whatever the arrival order.
    #[test]
    fn render_merge_is_order_independent(
        spans in prop::collection::vec((0usize..200, 1usize..20, layers()), 1..10),
        seed in any::<u64>(),
    ) {
        let mut forward = DirtyRangeTracker::new();
        for &(start, length, l) in &spans {
            forward.merge(RenderInvalidation::new(start, length, l));
        }

        let mut shuffled = spans.clone();
        // Deterministic Fisher-Yates driven by the seed.
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }
        let mut reordered = DirtyRangeTracker::new();
        for &(start, length, l) in &shuffled {
            reordered.merge(RenderInvalidation::new(start, length, l));
        }

        prop_assert_eq!(forward.render_ranges(), reordered.render_ranges());
        for pair in forward.render_ranges().windows(2) {
            prop_assert!(pair[0].end() < pair[1].start);
        }
    }

    // `take` hands everything over exactly once.
    #[test]
    fn take_drains_the_tracker(start in 0usize..50, added in 1usize..10, span in 1usize..10) {
        let mut tracker = DirtyRangeTracker::new();
        tracker.merge(ContentEdit::insertion(start, added));
        tracker.merge(RenderInvalidation::new(start, span, HighlightLayers::SEARCH));
        let pending = tracker.take();
        prop_assert_eq!(pending.edit, Some(ContentEdit::insertion(start, added)));
        prop_assert_eq!(pending.renders.len(), 1);
        prop_assert!(tracker.is_empty());
        prop_assert!(tracker.take().edit.is_none());
    }
}
