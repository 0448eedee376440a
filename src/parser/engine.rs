//! Pipeline driver.
//!
//! Runs every stage over one document, in order: normalisation, per-page
//! columns, rows and reading order, document font roles, segmentation,
//! structure building, media binding and the QA scans.

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::model::{NodeId, Page, PageLayout, Role, StructureNode, StructureTree, Tag};
use crate::parser::columns::ColumnDetector;
use crate::parser::fonts::{FontRoleClassifier, FontStatistics};
use crate::parser::reading_order::{OrderCursor, ReadingOrderGrid};
use crate::parser::rows::{median, RowGrouper};
use crate::parser::segmenter::ParagraphSegmenter;
use crate::parser::stream::{FragmentStream, RawDocument};
use crate::parser::EngineOptions;
use crate::render::visitor::{summarize, walk, TreeVisitor, VisitorAction};
use crate::report::{AmbiguityKind, DensePage, QaReport, SectionlessChapter};
use crate::structure::{AnchorIndex, MediaBinding, StructureBuilder, StructuredDocument};

/// Layout reconstruction engine.
///
/// The engine holds only options; every [`run`](LayoutEngine::run) gets a
/// fresh [`EngineContext`], so one engine can process any number of
/// documents.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    options: EngineOptions,
}

impl LayoutEngine {
    /// Create an engine, rejecting invalid thresholds.
    pub fn new(options: EngineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Reconstruct the structure of one document.
    pub fn run(&self, raw: RawDocument) -> Result<Reconstruction> {
        let mut ctx = EngineContext::new(self.options.clone());
        let total = raw.pages.len() as u32;
        let mut pages = FragmentStream::normalize(raw, &mut ctx)?;
        if pages.is_empty() && total > 0 {
            if let Some(first) = self.options.pages.first() {
                return Err(Error::PageOutOfRange(first, total));
            }
        }

        let mut cursor = OrderCursor::new();
        let mut layouts = Vec::with_capacity(pages.len());
        let mut orders = Vec::with_capacity(pages.len());
        for page in &mut pages {
            let (layout, order) = self.layout_page(page, &mut cursor, &mut ctx)?;
            layouts.push(layout);
            orders.push(order);
        }
        log::debug!(
            "reading order: {} fragments in {} blocks over {} pages",
            cursor.ordered(),
            cursor.blocks(),
            pages.len()
        );

        let thresholds = ctx.thresholds().clone();
        let stats = FontStatistics::from_pages(&pages);
        let fonts = FontRoleClassifier::from_statistics(&stats, &thresholds);
        if fonts.thin_chapter_tier && !stats.is_empty() {
            ctx.note(
                0,
                AmbiguityKind::ThinFontTier,
                format!(
                    "chapter tier has fewer than {} samples; using body + {:.1}",
                    thresholds.min_tier_samples, thresholds.chapter_fallback_delta
                ),
            );
        }

        let segmenter = ParagraphSegmenter::new(&thresholds, &fonts);
        let blocks = segmenter.segment(&pages, &layouts, &orders);
        ctx.report_mut().blocks = blocks.len();
        log::debug!("segmented {} blocks", blocks.len());

        let StructuredDocument { mut tree, mut anchors } =
            StructureBuilder::new(&thresholds).build(blocks, &mut ctx)?;

        if self.options.bind_media {
            for fragment in pages.iter().flat_map(|p| &p.fragments) {
                if let Some(binding) = MediaBinding::from_fragment(fragment) {
                    anchors.bind(&mut tree, &binding, &mut ctx)?;
                }
            }
        }

        ctx.report_mut().dense_pages = dense_pages(&pages, &layouts, thresholds.dense_row_chars);
        ctx.report_mut().sectionless_chapters =
            sectionless_chapters(&tree, thresholds.section_paragraph_limit)?;
        ctx.report_mut().summary = summarize(&tree)?;

        Ok(Reconstruction {
            tree,
            anchors,
            fonts,
            layouts,
            ctx,
        })
    }

    /// Columns, rows and reading order of one page.
    fn layout_page(
        &self,
        page: &mut Page,
        cursor: &mut OrderCursor,
        ctx: &mut EngineContext,
    ) -> Result<(PageLayout, Vec<usize>)> {
        let thresholds = ctx.thresholds();
        let columns = ColumnDetector::new(thresholds).detect(&page.fragments, page.width);
        let layout =
            RowGrouper::new(thresholds, self.options.footnote_policy).group(page, &columns)?;
        let grid = ReadingOrderGrid::build(page, &layout, thresholds);
        let order = grid.traverse(page, cursor)?;

        if grid.overflow() > 0 {
            ctx.note(
                page.number,
                AmbiguityKind::GridOverflow,
                format!("{} overflow slot(s) added", grid.overflow()),
            );
        }
        log::debug!(
            "page {}: {} column(s), {} row(s), {} ordered",
            page.number,
            layout.column_count(),
            layout.rows.len(),
            order.len()
        );
        Ok((layout, order))
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self {
            options: EngineOptions::default(),
        }
    }
}

/// Result of one engine run.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// The document tree
    pub tree: StructureTree,
    /// Font roles derived from the document
    pub fonts: FontRoleClassifier,
    /// Per-page geometry
    pub layouts: Vec<PageLayout>,
    anchors: AnchorIndex,
    ctx: EngineContext,
}

impl Reconstruction {
    /// QA report of the run.
    pub fn report(&self) -> &QaReport {
        self.ctx.report()
    }

    /// Insert an externally detected media node.
    ///
    /// The node goes right after the text nearest above `(page, top)`; text
    /// nodes are never moved. Returns `None` when the binding could not be
    /// resolved or its reference is already bound, both of which are
    /// recorded in the report.
    pub fn bind_media(&mut self, binding: &MediaBinding) -> Result<Option<NodeId>> {
        let bound = self.anchors.bind(&mut self.tree, binding, &mut self.ctx)?;
        if bound.is_some() {
            self.ctx.report_mut().summary = summarize(&self.tree)?;
        }
        Ok(bound)
    }

    /// Split into the tree and the report.
    pub fn into_parts(self) -> (StructureTree, QaReport) {
        (self.tree, self.ctx.into_report())
    }
}

/// Pages whose mean characters per row are far above the document norm.
fn dense_pages(pages: &[Page], layouts: &[PageLayout], floor: f32) -> Vec<DensePage> {
    let means: Vec<(u32, f32)> = pages
        .iter()
        .zip(layouts)
        .filter(|(_, layout)| !layout.rows.is_empty())
        .map(|(page, layout)| {
            let chars: usize = layout
                .rows
                .iter()
                .flat_map(|row| &row.members)
                .filter_map(|m| page.fragments.get(*m))
                .map(|f| f.text.chars().count())
                .sum();
            (page.number, chars as f32 / layout.rows.len() as f32)
        })
        .collect();

    let Some(norm) = median(means.iter().map(|(_, mean)| *mean).collect()) else {
        return Vec::new();
    };
    let limit = floor.max(norm * 2.0);
    means
        .into_iter()
        .filter(|(_, mean)| *mean > limit)
        .map(|(page, mean_row_chars)| {
            log::debug!("page {page}: {mean_row_chars:.1} chars per row (limit {limit:.1})");
            DensePage {
                page,
                mean_row_chars,
            }
        })
        .collect()
}

/// Collects chapters with many paragraphs and no section.
#[derive(Default)]
struct SectionlessScan {
    limit: usize,
    open: Option<(String, Option<String>, usize, usize)>,
    found: Vec<SectionlessChapter>,
}

impl TreeVisitor for SectionlessScan {
    fn enter(&mut self, _id: NodeId, node: &StructureNode, _depth: usize) -> VisitorAction {
        match node.tag {
            Tag::Chapter => {
                // Entries of special sections are not prose
                if node.attrs.role.is_some_and(|r| r != Role::FrontMatter) {
                    return VisitorAction::SkipChildren;
                }
                self.open = Some((
                    node.attrs.id.clone().unwrap_or_default(),
                    node.title.clone(),
                    0,
                    0,
                ));
            }
            Tag::Section => {
                if let Some(open) = self.open.as_mut() {
                    open.3 += 1;
                }
                // Paragraphs inside sections do not matter
                return VisitorAction::SkipChildren;
            }
            Tag::Para => {
                if let Some(open) = self.open.as_mut() {
                    open.2 += 1;
                }
            }
            _ => {}
        }
        VisitorAction::Continue
    }

    fn leave(&mut self, _id: NodeId, node: &StructureNode, _depth: usize) {
        if node.tag != Tag::Chapter {
            return;
        }
        if let Some((id, title, paragraphs, sections)) = self.open.take() {
            if sections == 0 && paragraphs >= self.limit {
                self.found.push(SectionlessChapter {
                    id,
                    title,
                    paragraphs,
                });
            }
        }
    }
}

fn sectionless_chapters(tree: &StructureTree, limit: usize) -> Result<Vec<SectionlessChapter>> {
    let mut scan = SectionlessScan {
        limit: limit.max(1),
        ..Default::default()
    };
    walk(tree, &mut scan)?;
    Ok(scan.found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FontDescriptor, FragmentKind, Rect};
    use crate::parser::stream::{RawFragment, RawPage};
    use crate::parser::{PageSelection, Thresholds};

    fn body(text: &str, top: f32) -> RawFragment {
        RawFragment::text(
            text,
            Rect::new(72.0, top, 300.0, 12.0),
            FontDescriptor::new("Serif", 12.0),
        )
    }

    fn two_page_chapter() -> RawDocument {
        let mut p1 = RawPage::new(1, 612.0, 792.0);
        p1.push(RawFragment::text(
            "Chapter 1 Overview",
            Rect::new(72.0, 72.0, 300.0, 24.0),
            FontDescriptor::new("Serif", 24.0),
        ))
        .push(body("The engine rebuilds the structure", 110.0))
        .push(body("of a book from positioned fragments", 124.0))
        .push(body("and keeps the paragraph open across the", 700.0));
        let mut p2 = RawPage::new(2, 612.0, 792.0);
        p2.push(body("page boundary when nothing ends it.", 72.0));
        RawDocument::new(vec![p1, p2])
    }

    #[test]
    fn test_two_page_chapter() {
        let engine = LayoutEngine::new(EngineOptions::default()).unwrap();
        let result = engine.run(two_page_chapter()).unwrap();
        let tree = &result.tree;

        let chapters = tree.nodes_with_tag(Tag::Chapter);
        assert_eq!(chapters.len(), 1);
        let chapter = tree.node(chapters[0]).unwrap();
        assert_eq!(chapter.title.as_deref(), Some("Chapter 1 Overview"));
        assert_eq!(chapter.attrs.id.as_deref(), Some("Ch0001"));

        let paras = tree.nodes_with_tag(Tag::Para);
        assert_eq!(paras.len(), 2);
        let last = tree.node(paras[1]).unwrap().text.clone().unwrap();
        assert!(last.starts_with("and keeps the paragraph"));
        assert!(last.ends_with("when nothing ends it."));
        assert_eq!(result.fonts.body_size, 12.0);
        assert!(result.fonts.is_chapter_tier(24.0));
    }

    #[test]
    fn test_report_counts() {
        let result = LayoutEngine::default().run(two_page_chapter()).unwrap();
        let report = result.report();
        assert_eq!(report.pages, 2);
        assert_eq!(report.fragments, 5);
        assert_eq!(report.summary.chapters, 1);
        assert_eq!(report.ambiguity_count(AmbiguityKind::ThinFontTier), 1);
        assert!(report.dense_pages.is_empty());
    }

    #[test]
    fn test_fragment_without_geometry_keeps_its_text() {
        let mut page = RawPage::new(1, 612.0, 792.0);
        let mut lost = body("LOSTWORDS here", 124.0);
        lost.left = None;
        page.push(body("The first line of the paragraph", 110.0))
            .push(lost)
            .push(body("and the line that closes it.", 138.0));

        let result = LayoutEngine::default()
            .run(RawDocument::new(vec![page]))
            .unwrap();
        assert_eq!(result.report().degenerate_fragments, 1);

        let paras = result.tree.nodes_with_tag(Tag::Para);
        assert_eq!(paras.len(), 1);
        let text = result.tree.node(paras[0]).unwrap().text.clone().unwrap();
        assert!(text.starts_with("The first line of the paragraph"));
        assert!(text.contains("paragraph LOSTWORDS here and"));
        assert!(text.ends_with("closes it."));
    }

    #[test]
    fn test_media_bound_after_text() {
        let mut doc = two_page_chapter();
        doc.pages[0].push(RawFragment::media(
            FragmentKind::Image,
            Rect::new(72.0, 140.0, 200.0, 100.0),
            "img-1",
        ));
        let result = LayoutEngine::default().run(doc).unwrap();
        let figures = result.tree.nodes_with_tag(Tag::Figure);
        assert_eq!(figures.len(), 1);
        let figure = result.tree.node(figures[0]).unwrap();
        assert_eq!(figure.attrs.ref_id.as_deref(), Some("img-1"));
        assert_eq!(result.report().summary.figures, 1);
    }

    #[test]
    fn test_media_binding_disabled() {
        let mut doc = two_page_chapter();
        doc.pages[0].push(RawFragment::media(
            FragmentKind::Table,
            Rect::new(72.0, 140.0, 200.0, 100.0),
            "t-1",
        ));
        let options = EngineOptions::default().with_media_binding(false);
        let mut result = LayoutEngine::new(options).unwrap().run(doc).unwrap();
        assert_eq!(result.tree.count(Tag::Table), 0);

        let binding = MediaBinding::new(1, 140.0, FragmentKind::Table, "t-1");
        assert!(result.bind_media(&binding).unwrap().is_some());
        assert_eq!(result.report().summary.tables, 1);
        assert_eq!(result.bind_media(&binding).unwrap(), None);
    }

    #[test]
    fn test_repeated_runs_identical() {
        let engine = LayoutEngine::default();
        let a = serde_json::to_string(&engine.run(two_page_chapter()).unwrap().tree).unwrap();
        let b = serde_json::to_string(&engine.run(two_page_chapter()).unwrap().tree).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let thresholds = Thresholds {
            chapter_ratio: f32::NAN,
            ..Thresholds::default()
        };
        let options = EngineOptions::default().with_thresholds(thresholds);
        assert!(LayoutEngine::new(options).is_err());
    }

    #[test]
    fn test_selection_outside_document() {
        let options = EngineOptions::default().with_pages(PageSelection::Range(5..=9));
        let err = LayoutEngine::new(options).unwrap().run(two_page_chapter());
        assert!(matches!(err, Err(Error::PageOutOfRange(5, 2))));

        let options = EngineOptions::default().with_pages(PageSelection::Pages(vec![2]));
        let result = LayoutEngine::new(options).unwrap().run(two_page_chapter()).unwrap();
        assert_eq!(result.report().pages, 1);
    }

    #[test]
    fn test_empty_document() {
        let result = LayoutEngine::default().run(RawDocument::default()).unwrap();
        assert_eq!(result.tree.len(), 1);
        let (_, report) = result.into_parts();
        assert_eq!(report.pages, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_dense_page_flagged() {
        let mut pages = Vec::new();
        let mut layouts = Vec::new();
        for (number, text) in [(1, "short"), (2, "short"), (3, &"x".repeat(400)[..])] {
            let mut raw = RawPage::new(number, 612.0, 792.0);
            raw.push(body(text, 72.0));
            let mut ctx = EngineContext::new(EngineOptions::default());
            let mut page = FragmentStream::normalize(RawDocument::new(vec![raw]), &mut ctx)
                .unwrap()
                .remove(0);
            let t = Thresholds::default();
            layouts.push(
                RowGrouper::new(&t, Default::default())
                    .group(&mut page, &[])
                    .unwrap(),
            );
            pages.push(page);
        }
        let dense = dense_pages(&pages, &layouts, 160.0);
        assert_eq!(dense.len(), 1);
        assert_eq!(dense[0].page, 3);
    }

    #[test]
    fn test_sectionless_chapter() {
        let mut tree = StructureTree::new();
        let ch = tree
            .append_child(
                tree.root(),
                StructureNode::new(Tag::Chapter).with_id("Ch0001").with_title("Long"),
            )
            .unwrap();
        for _ in 0..3 {
            tree.append_child(ch, StructureNode::new(Tag::Para).with_text("p"))
                .unwrap();
        }
        let ch2 = tree
            .append_child(tree.root(), StructureNode::new(Tag::Chapter).with_id("Ch0002"))
            .unwrap();
        let sec = tree
            .append_child(ch2, StructureNode::new(Tag::Section).with_id("Ch0002S001"))
            .unwrap();
        for _ in 0..3 {
            tree.append_child(sec, StructureNode::new(Tag::Para)).unwrap();
        }

        let found = sectionless_chapters(&tree, 3).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "Ch0001");
        assert_eq!(found[0].paragraphs, 3);
    }
}
