//! End-to-end reconstruction tests.

use unlayout::model::{FontDescriptor, FragmentKind, Rect, Role, Tag};
use unlayout::render::{self, RenderOptions};
use unlayout::report::AmbiguityKind;
use unlayout::{
    reconstruct, reconstruct_batch, EngineOptions, JsonFormat, LayoutEngine, PageSelection,
    RawDocument, RawFragment, RawPage,
};

fn text(page: &mut RawPage, s: &str, left: f32, top: f32, width: f32, size: f32) {
    let font = FontDescriptor::new("Serif", size);
    page.push(RawFragment::text(s, Rect::new(left, top, width, size), font));
}

/// A full-width chapter title over two columns of twenty lines each.
fn two_column_page(number: u32, title: &str) -> RawPage {
    let mut page = RawPage::new(number, 612.0, 792.0);
    text(&mut page, title, 72.0, 40.0, 468.0, 24.0);
    for i in 0..20 {
        let top = 90.0 + i as f32 * 14.0;
        let left = if i == 19 {
            format!("left{i:02} closes the column.")
        } else {
            format!("left{i:02} words in the first column")
        };
        let right = if i == 19 {
            format!("right{i:02} closes the page.")
        } else {
            format!("right{i:02} words in the second column")
        };
        text(&mut page, &left, 72.0, top, 220.0, 12.0);
        text(&mut page, &right, 320.0, top, 220.0, 12.0);
    }
    page
}

fn all_text(doc: &RawDocument) -> String {
    let result = reconstruct(doc.clone()).unwrap();
    let tree = &result.tree;
    tree.nodes_with_tag(Tag::Para)
        .into_iter()
        .filter_map(|id| tree.node(id).unwrap().text.clone())
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_two_columns_read_left_then_right() {
    let doc = RawDocument::new(vec![two_column_page(1, "Chapter 2 Columns")]);
    let result = reconstruct(doc.clone()).unwrap();

    assert_eq!(result.layouts.len(), 1);
    assert_eq!(result.layouts[0].column_count(), 2);

    let chapters = result.tree.nodes_with_tag(Tag::Chapter);
    assert_eq!(chapters.len(), 1);
    let chapter = result.tree.node(chapters[0]).unwrap();
    assert_eq!(chapter.title.as_deref(), Some("Chapter 2 Columns"));

    let body = all_text(&doc);
    let last_left = body.find("left19").unwrap();
    let first_right = body.find("right00").unwrap();
    assert!(last_left < first_right);
    assert!(body.find("left00").unwrap() < body.find("left01").unwrap());
    assert!(body.find("right18").unwrap() < body.find("right19").unwrap());
}

#[test]
fn test_chapters_across_pages() {
    let doc = RawDocument::new(vec![
        two_column_page(1, "Chapter 1 Opening"),
        two_column_page(2, "Chapter 2 Middle"),
        two_column_page(3, "Chapter 3 Closing"),
    ]);
    let result = reconstruct(doc).unwrap();
    let ids: Vec<String> = result
        .tree
        .nodes_with_tag(Tag::Chapter)
        .into_iter()
        .filter_map(|id| result.tree.node(id).unwrap().attrs.id.clone())
        .collect();
    assert_eq!(ids, vec!["Ch0001", "Ch0002", "Ch0003"]);
    assert_eq!(result.report().pages, 3);
    assert_eq!(result.report().fragments, 3 * 41);
    assert!(result.tree.validate().is_ok());
}

#[test]
fn test_page_selection() {
    let doc = RawDocument::new(vec![
        two_column_page(1, "Chapter 1 Opening"),
        two_column_page(2, "Chapter 2 Middle"),
    ]);
    let options = EngineOptions::new().with_pages(PageSelection::Pages(vec![2]));
    let result = LayoutEngine::new(options).unwrap().run(doc).unwrap();
    assert_eq!(result.report().pages, 1);
    let chapters = result.tree.nodes_with_tag(Tag::Chapter);
    assert_eq!(chapters.len(), 1);
    let title = result.tree.node(chapters[0]).unwrap().title.clone();
    assert_eq!(title.as_deref(), Some("Chapter 2 Middle"));
}

#[test]
fn test_reconstruction_is_deterministic() {
    let doc = RawDocument::new(vec![
        two_column_page(1, "Chapter 1 Opening"),
        two_column_page(2, "Chapter 2 Middle"),
    ]);
    let first = reconstruct(doc.clone()).unwrap();
    let second = reconstruct(doc).unwrap();
    assert_eq!(
        render::to_json(&first.tree, JsonFormat::Compact).unwrap(),
        render::to_json(&second.tree, JsonFormat::Compact).unwrap()
    );
    assert_eq!(
        render::report_to_json(first.report(), JsonFormat::Compact).unwrap(),
        render::report_to_json(second.report(), JsonFormat::Compact).unwrap()
    );
}

#[test]
fn test_figure_follows_its_paragraph() {
    let mut page = two_column_page(1, "Chapter 1 Opening");
    page.push(RawFragment::media(
        FragmentKind::Image,
        Rect::new(320.0, 400.0, 220.0, 120.0),
        "fig-1",
    ));
    let result = reconstruct(RawDocument::new(vec![page])).unwrap();
    let figures = result.tree.nodes_with_tag(Tag::Figure);
    assert_eq!(figures.len(), 1);
    let figure = result.tree.node(figures[0]).unwrap();
    assert_eq!(figure.attrs.ref_id.as_deref(), Some("fig-1"));
    assert!(result.report().unresolved_media.is_empty());

    let markdown = render::to_markdown(&result.tree, &RenderOptions::default()).unwrap();
    assert!(markdown.contains("fig-1"));
}

#[test]
fn test_contents_chapter_collects_entries() {
    let mut page = RawPage::new(1, 612.0, 792.0);
    text(&mut page, "Contents", 72.0, 40.0, 200.0, 24.0);
    text(&mut page, "Introduction 1", 72.0, 90.0, 300.0, 12.0);
    text(&mut page, "Getting Started 7", 72.0, 104.0, 300.0, 12.0);
    text(&mut page, "Advanced Topics 19", 72.0, 118.0, 300.0, 12.0);
    let result = reconstruct(RawDocument::new(vec![page])).unwrap();

    let chapters = result.tree.nodes_with_tag(Tag::Chapter);
    assert_eq!(chapters.len(), 1);
    let chapter = result.tree.node(chapters[0]).unwrap();
    assert_eq!(chapter.attrs.role, Some(Role::TableOfContents));
    assert_eq!(result.report().summary.sections, 0);
}

#[test]
fn test_batch_keeps_input_order() {
    let docs = vec![
        RawDocument::new(vec![two_column_page(1, "Chapter 1 Opening")]),
        RawDocument::default(),
        RawDocument::new(vec![two_column_page(1, "Chapter 9 Last")]),
    ];
    let results = reconstruct_batch(&docs, &EngineOptions::default());
    assert_eq!(results.len(), 3);
    let pages: Vec<usize> = results
        .iter()
        .map(|r| r.as_ref().unwrap().report().pages)
        .collect();
    assert_eq!(pages, vec![1, 0, 1]);

    let sequential = reconstruct_batch(&docs, &EngineOptions::new().sequential());
    for (a, b) in results.iter().zip(&sequential) {
        let a = render::to_json(&a.as_ref().unwrap().tree, JsonFormat::Compact).unwrap();
        let b = render::to_json(&b.as_ref().unwrap().tree, JsonFormat::Compact).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn test_thin_tier_is_reported_once() {
    let doc = RawDocument::new(vec![two_column_page(1, "Chapter 1 Opening")]);
    let result = reconstruct(doc).unwrap();
    assert_eq!(
        result.report().ambiguity_count(AmbiguityKind::ThinFontTier),
        1
    );
}
