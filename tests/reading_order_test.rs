//! Property tests for the reading order.

use proptest::prelude::*;

use unlayout::model::{FontDescriptor, Fragment, Page, Rect};
use unlayout::parser::{
    ColumnDetector, FootnoteZonePolicy, OrderCursor, ReadingOrderGrid, RowGrouper, Thresholds,
};
use unlayout::{reconstruct, render, JsonFormat, RawDocument, RawFragment, RawPage};

/// (column, row, width, jitter) for each generated line.
type Line = (usize, usize, f32, f32);

const LEFTS: [f32; 3] = [72.0, 250.0, 430.0];

fn lines() -> impl Strategy<Value = Vec<Line>> {
    prop::collection::vec((0usize..3, 0usize..40, 20.0f32..160.0, 0.0f32..1.5), 0..90)
}

fn build_page(number: u32, lines: &[Line]) -> Page {
    let mut page = Page::letter(number);
    for (column, row, width, jitter) in lines {
        let rect = Rect::new(LEFTS[*column] + jitter, 60.0 + *row as f32 * 16.0, *width, 10.0);
        let id = page.fragments.len();
        let font = FontDescriptor::new("Serif", 10.0);
        page.add_fragment(Fragment::text(id, number, format!("w{id}"), rect, font));
    }
    page
}

fn layout_and_order(page: &mut Page, cursor: &mut OrderCursor) -> Vec<usize> {
    let t = Thresholds::default();
    let columns = ColumnDetector::new(&t).detect(&page.fragments, page.width);
    let layout = RowGrouper::new(&t, FootnoteZonePolicy::PropagateNarrow)
        .group(page, &columns)
        .unwrap();
    let grid = ReadingOrderGrid::build(page, &layout, &t);
    grid.traverse(page, cursor).unwrap()
}

proptest! {
    #[test]
    fn order_is_a_permutation(input in lines()) {
        let mut page = build_page(1, &input);
        let order = layout_and_order(&mut page, &mut OrderCursor::new());

        prop_assert_eq!(order.len(), page.fragments.len());
        let mut seen = vec![false; page.fragments.len()];
        for (position, index) in order.iter().enumerate() {
            prop_assert!(!seen[*index]);
            seen[*index] = true;
            prop_assert_eq!(page.fragments[*index].order(), Some(position));
        }
    }

    #[test]
    fn order_increases_across_pages(first in lines(), second in lines()) {
        let mut cursor = OrderCursor::new();
        let mut a = build_page(1, &first);
        let mut b = build_page(2, &second);
        let order_a = layout_and_order(&mut a, &mut cursor);
        let order_b = layout_and_order(&mut b, &mut cursor);

        let indices: Vec<usize> = order_a
            .iter()
            .filter_map(|i| a.fragments[*i].order())
            .chain(order_b.iter().filter_map(|i| b.fragments[*i].order()))
            .collect();
        prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(cursor.ordered(), first.len() + second.len());

        let blocks: Vec<u32> = order_a
            .iter()
            .filter_map(|i| a.fragments[*i].ro_block())
            .chain(order_b.iter().filter_map(|i| b.fragments[*i].ro_block()))
            .collect();
        prop_assert!(blocks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn reconstruction_is_repeatable(input in lines()) {
        let mut raw = RawPage::new(1, 612.0, 792.0);
        for (column, row, width, jitter) in &input {
            let rect = Rect::new(LEFTS[*column] + jitter, 60.0 + *row as f32 * 16.0, *width, 10.0);
            let font = FontDescriptor::new("Serif", 10.0);
            raw.push(RawFragment::text(format!("word{row}"), rect, font));
        }
        let doc = RawDocument::new(vec![raw]);
        let first = reconstruct(doc.clone()).unwrap();
        let second = reconstruct(doc).unwrap();
        prop_assert!(first.tree.validate().is_ok());
        prop_assert_eq!(
            render::to_json(&first.tree, JsonFormat::Compact).unwrap(),
            render::to_json(&second.tree, JsonFormat::Compact).unwrap()
        );
    }
}
