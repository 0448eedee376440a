//! Paragraph segmentation over the reading-ordered fragment stream.

use std::collections::BTreeMap;

use crate::model::{
    join_text, Block, BlockKind, BlockLine, Fragment, InlineRun, Page, PageLayout, ScriptRole,
};
use crate::parser::fonts::FontRoleClassifier;
use crate::parser::patterns::{is_list_start, is_section_start, list_marker, media_keyword};
use crate::parser::Thresholds;

/// A script token must be at least this much shorter than its sibling.
const SCRIPT_MIN_HEIGHT_DELTA: f32 = 1.0;

/// Footnote marks accepted in script tokens besides alphanumerics.
const SCRIPT_MARKS: &[char] = &['*', '†', '‡', '§', '¶'];

/// Letters that symbol fonts render as bullets; never absorbed as scripts.
const SCRIPT_BLACKLIST: &[&str] = &["l", "n", "o", "q", "v", "x"];

/// Why two adjacent fragments were split into separate blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// Different page
    Page,
    /// Different column, reading-order block or highlight marker
    Region,
    /// Different font family
    FontFamily,
    /// Font size changed by at least the break delta
    FontSize,
    /// Next fragment opens a list item
    ListMarker,
    /// Next line starts indented relative to the current line
    Indent,
    /// Vertical gap beyond the paragraph limit
    Gap,
    /// Spacing looks like a paragraph break
    Spacing,
}

/// Decision for a pair of adjacent fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// Same block
    Merge,
    /// New block
    Break(BreakReason),
}

/// How a piece of text attaches to the text before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Glue {
    /// Directly, no separator
    Attach,
    /// Same line, separated by a space
    Space,
    /// New line, joined with dehyphenation
    Line,
}

/// Script tokens absorbed into a sibling: sibling index -> (token index, role).
type ScriptMap = BTreeMap<usize, Vec<(usize, ScriptRole)>>;

/// A block under construction.
struct Draft {
    block: Block,
    /// Page index of the last fragment added
    last: usize,
    /// Left edge of the current line
    line_left: f32,
    /// Block opened with a list marker
    list: bool,
    bold_chars: usize,
    chars: usize,
}

impl Draft {
    fn push_text(&mut self, piece: &str, glue: Glue, fragment: &Fragment, role: ScriptRole) {
        let text = &self.block.text;
        let joined = match glue {
            Glue::Attach => format!("{text}{piece}"),
            Glue::Space => {
                let spaced = text.is_empty()
                    || text.ends_with(char::is_whitespace)
                    || piece.starts_with(char::is_whitespace);
                if spaced {
                    format!("{text}{piece}")
                } else {
                    format!("{text} {piece}")
                }
            }
            Glue::Line => join_text(text, piece),
        };

        let suffix = match joined.strip_prefix(text.as_str()) {
            Some(rest) => rest.to_string(),
            None => {
                // Dehyphenated: the trailing hyphen was dropped
                if let Some(run) = self.block.runs.last_mut() {
                    run.text.pop();
                }
                joined
                    .get(text.len().saturating_sub(1)..)
                    .unwrap_or_default()
                    .to_string()
            }
        };

        let run = InlineRun {
            text: String::new(),
            role,
            bold: fragment.font.bold,
            italic: fragment.font.italic,
        };
        match self.block.runs.last_mut() {
            Some(last)
                if last.role == run.role && last.bold == run.bold && last.italic == run.italic =>
            {
                last.text.push_str(&suffix);
            }
            _ => self.block.runs.push(InlineRun {
                text: suffix,
                ..run
            }),
        }
        self.block.text = joined;

        let counted = piece.chars().filter(|c| !c.is_whitespace()).count();
        self.chars += counted;
        if fragment.font.bold {
            self.bold_chars += counted;
        }
    }
}

/// Merges reading-ordered fragments into blocks.
pub struct ParagraphSegmenter<'a> {
    thresholds: &'a Thresholds,
    fonts: &'a FontRoleClassifier,
}

impl<'a> ParagraphSegmenter<'a> {
    /// Create a segmenter.
    pub fn new(thresholds: &'a Thresholds, fonts: &'a FontRoleClassifier) -> Self {
        Self { thresholds, fonts }
    }

    /// Segment a whole document and apply cross-page continuation.
    ///
    /// `pages`, `layouts` and `orders` are parallel slices; each order lists
    /// page fragment indices in reading order.
    pub fn segment(
        &self,
        pages: &[Page],
        layouts: &[PageLayout],
        orders: &[Vec<usize>],
    ) -> Vec<Block> {
        let per_page: Vec<Vec<Block>> = pages
            .iter()
            .zip(layouts)
            .zip(orders)
            .map(|((page, layout), order)| self.segment_page(page, layout, order))
            .collect();
        self.merge_across_pages(per_page)
    }

    /// Segment one page.
    pub fn segment_page(&self, page: &Page, layout: &PageLayout, order: &[usize]) -> Vec<Block> {
        let (stream, scripts) = self.absorb_scripts(page, order);
        let line_height = layout.metrics.line_height;

        let mut blocks = Vec::new();
        let mut draft: Option<Draft> = None;
        for &idx in &stream {
            let next = &page.fragments[idx];
            let attached = scripts.get(&idx).map(Vec::as_slice).unwrap_or_default();
            let decision = draft.as_ref().map(|d| {
                let prev = &page.fragments[d.last];
                self.decide(prev, next, d.line_left, d.list, line_height)
            });
            match decision {
                Some(Join::Merge) => {
                    if let Some(d) = draft.as_mut() {
                        self.extend(d, page, idx, attached);
                    }
                }
                Some(Join::Break(reason)) => {
                    log::trace!(
                        "page {}: break before fragment {} ({reason:?})",
                        page.number,
                        next.id
                    );
                    if let Some(done) = draft.take() {
                        blocks.push(self.finish(done, layout));
                    }
                    draft = Some(self.open(page, idx, attached));
                }
                None => draft = Some(self.open(page, idx, attached)),
            }
        }
        if let Some(done) = draft {
            blocks.push(self.finish(done, layout));
        }

        log::debug!(
            "page {}: {} blocks from {} fragments ({} scripts absorbed)",
            page.number,
            blocks.len(),
            stream.len(),
            scripts.values().map(Vec::len).sum::<usize>()
        );
        blocks
    }

    /// Evaluate the break rules for two adjacent fragments, first match wins.
    pub fn decide(
        &self,
        prev: &Fragment,
        next: &Fragment,
        line_left: f32,
        in_list: bool,
        line_height: f32,
    ) -> Join {
        let t = self.thresholds;

        if prev.page != next.page {
            return Join::Break(BreakReason::Page);
        }
        if prev.column() != next.column()
            || prev.ro_block() != next.ro_block()
            || prev.highlight != next.highlight
        {
            return Join::Break(BreakReason::Region);
        }
        if !prev.font_missing && !next.font_missing && prev.font.family != next.font.family {
            return Join::Break(BreakReason::FontFamily);
        }
        let next_size = self.size_of(next);
        if (self.size_of(prev) - next_size).abs() >= t.font_break_delta {
            return Join::Break(BreakReason::FontSize);
        }

        let gap = next.rect.top - prev.baseline();
        if gap > t.list_marker_gap && is_list_start(&next.text) {
            return Join::Break(BreakReason::ListMarker);
        }

        let same_row = prev.row() == next.row();
        let spaced = prev.text.ends_with([' ', '\u{00A0}'])
            || next.text.starts_with([' ', '\u{00A0}']);
        if (same_row && spaced) || ends_with_hyphen(&prev.text) {
            return Join::Merge;
        }

        if !same_row
            && !in_list
            && !prev.degenerate
            && next.rect.left - line_left > t.indent_tolerance
        {
            return Join::Break(BreakReason::Indent);
        }

        let limit = (next_size * t.gap_font_ratio).max(line_height * t.gap_line_height_factor);
        if gap > limit {
            return Join::Break(BreakReason::Gap);
        }
        if gap <= t.tight_gap || gap <= next_size {
            return Join::Merge;
        }
        Join::Break(BreakReason::Spacing)
    }

    /// Merge the last block of a page into the first block of the next page
    /// where the text evidently continues.
    pub fn merge_across_pages(&self, pages: Vec<Vec<Block>>) -> Vec<Block> {
        let mut out: Vec<Block> = Vec::new();
        for blocks in pages {
            let mut blocks = blocks.into_iter();
            if let Some(first) = blocks.next() {
                match out.last_mut() {
                    Some(prev) if self.continues_across_pages(prev, &first) => {
                        log::debug!(
                            "continuing block from page {} onto page {}",
                            prev.last_page,
                            first.page
                        );
                        prev.absorb(first);
                    }
                    _ => out.push(first),
                }
            }
            out.extend(blocks);
        }
        out
    }

    /// Cross-page continuation test.
    pub fn continues_across_pages(&self, prev: &Block, next: &Block) -> bool {
        let t = self.thresholds;
        let last_line = prev.lines.last().map_or(prev.text.as_str(), |l| l.text.as_str());
        let families_match = prev.font_family == next.font_family
            || prev.font_family.is_empty()
            || next.font_family.is_empty();

        next.page == prev.last_page + 1
            && prev.column == next.column
            && prev.ro_block == next.ro_block
            && prev.highlight == next.highlight
            && families_match
            && (prev.font_size - next.font_size).abs() <= t.cross_page_font_tolerance
            && !prev.ends_with_terminal()
            && !prev.is_heading()
            && !is_list_start(last_line)
            && !is_section_start(last_line)
            && !next.is_heading()
            && next.kind != BlockKind::ListItem
            && !is_section_start(&next.text)
            && !(prev.bold && !next.bold)
    }

    /// Find superscript and subscript tokens and attach them to a taller
    /// neighbour. Returns the remaining stream and the attachments.
    fn absorb_scripts(&self, page: &Page, order: &[usize]) -> (Vec<usize>, ScriptMap) {
        let t = self.thresholds;
        let frags = &page.fragments;
        let candidates: Vec<usize> = order
            .iter()
            .copied()
            .filter(|i| self.is_script_token(&frags[*i]))
            .collect();

        let mut scripts = ScriptMap::new();
        let mut absorbed = vec![false; frags.len()];
        for &c in &candidates {
            let token = &frags[c];
            let best = order
                .iter()
                .copied()
                .filter(|s| *s != c && !absorbed[*s])
                .filter_map(|s| {
                    let sibling = &frags[s];
                    if sibling.rect.height - token.rect.height < SCRIPT_MIN_HEIGHT_DELTA {
                        return None;
                    }
                    let distance = (token.rect.left - sibling.rect.right())
                        .max(sibling.rect.left - token.rect.right())
                        .max(0.0);
                    if distance > t.script_max_distance {
                        return None;
                    }
                    let offset = token.rect.top - sibling.rect.top;
                    let role = if offset.abs() <= t.superscript_offset {
                        ScriptRole::Superscript
                    } else if offset > t.superscript_offset && offset <= t.subscript_offset {
                        ScriptRole::Subscript
                    } else {
                        return None;
                    };
                    Some((s, role, distance, offset.abs()))
                })
                .min_by(|a, b| {
                    a.2.total_cmp(&b.2)
                        .then(a.3.total_cmp(&b.3))
                        .then(frags[a.0].id.cmp(&frags[b.0].id))
                });
            if let Some((sibling, role, _, _)) = best {
                // Tokens already carrying their own tokens stay in the stream
                if scripts.contains_key(&c) {
                    continue;
                }
                absorbed[c] = true;
                scripts.entry(sibling).or_default().push((c, role));
            }
        }

        let stream = order.iter().copied().filter(|i| !absorbed[*i]).collect();
        (stream, scripts)
    }

    fn is_script_token(&self, fragment: &Fragment) -> bool {
        let t = self.thresholds;
        let text = fragment.text.trim();
        let count = text.chars().count();
        fragment.contributes_layout()
            && count > 0
            && count <= t.script_max_chars
            && fragment.rect.width < t.script_max_width
            && fragment.rect.height < t.script_max_height
            && text.chars().any(char::is_alphanumeric)
            && text
                .chars()
                .all(|c| c.is_alphanumeric() || SCRIPT_MARKS.contains(&c))
            && !SCRIPT_BLACKLIST.contains(&text)
    }

    /// Effective size; unknown fonts count as body text.
    fn size_of(&self, fragment: &Fragment) -> f32 {
        if fragment.font_missing || fragment.font.size <= 0.0 {
            self.fonts.body_size
        } else {
            fragment.font.size
        }
    }

    fn open(&self, page: &Page, idx: usize, scripts: &[(usize, ScriptRole)]) -> Draft {
        let f = &page.fragments[idx];
        let flow = f.order().unwrap_or(0);
        let block = Block {
            kind: BlockKind::Paragraph,
            heading_level: 0,
            text: String::new(),
            runs: Vec::new(),
            lines: Vec::new(),
            fragments: Vec::new(),
            font_family: if f.font_missing {
                String::new()
            } else {
                f.font.family.clone()
            },
            font_size: self.size_of(f),
            bold: f.font.bold,
            left: f.rect.left,
            indent: 0.0,
            page: f.page,
            last_page: f.page,
            top: f.rect.top,
            flow_index: flow,
            last_flow_index: flow,
            column: f.column().unwrap_or(0),
            ro_block: f.ro_block().unwrap_or(0),
            highlight: f.highlight,
        };
        let mut draft = Draft {
            block,
            last: idx,
            line_left: f.rect.left,
            list: is_list_start(&f.text),
            bold_chars: 0,
            chars: 0,
        };
        self.extend(&mut draft, page, idx, scripts);
        draft
    }

    fn extend(
        &self,
        draft: &mut Draft,
        page: &Page,
        idx: usize,
        scripts: &[(usize, ScriptRole)],
    ) {
        let frags = &page.fragments;
        let f = &frags[idx];
        let first = draft.block.fragments.is_empty();
        let prev = &frags[draft.last];
        let new_line = first || prev.row() != f.row() || prev.page != f.page;

        let glue = if first {
            Glue::Attach
        } else if new_line {
            Glue::Line
        } else if needs_space(prev, f) {
            Glue::Space
        } else {
            Glue::Attach
        };

        if new_line {
            draft.block.lines.push(BlockLine {
                text: String::new(),
                page: f.page,
                left: f.rect.left,
                right: f.rect.right(),
                top: f.rect.top,
                baseline: f.baseline(),
            });
            draft.line_left = f.rect.left;
        }

        // Tokens left of the sibling precede it, the rest follow
        let mut pieces: Vec<(usize, ScriptRole)> = scripts.to_vec();
        pieces.push((idx, ScriptRole::Normal));
        pieces.sort_by(|a, b| {
            frags[a.0]
                .rect
                .left
                .total_cmp(&frags[b.0].rect.left)
                .then(frags[a.0].id.cmp(&frags[b.0].id))
        });

        for (n, (piece, role)) in pieces.iter().enumerate() {
            let fragment = &frags[*piece];
            let glue = if n == 0 { glue } else { Glue::Attach };
            draft.push_text(&fragment.text, glue, fragment, *role);
            if let Some(line) = draft.block.lines.last_mut() {
                line.text = match glue {
                    Glue::Line | Glue::Attach if line.text.is_empty() => {
                        fragment.text.trim_start().to_string()
                    }
                    Glue::Space if !line.text.ends_with(char::is_whitespace) => {
                        format!("{} {}", line.text, fragment.text.trim_start())
                    }
                    _ => format!("{}{}", line.text, fragment.text),
                };
                line.right = line.right.max(fragment.rect.right());
            }
            draft.block.fragments.push(fragment.id);
        }

        draft.block.last_page = f.page;
        draft.block.last_flow_index = f.order().unwrap_or(draft.block.last_flow_index);
        draft.last = idx;
    }

    fn finish(&self, draft: Draft, layout: &PageLayout) -> Block {
        let Draft {
            mut block,
            bold_chars,
            chars,
            ..
        } = draft;

        block.text = block.text.trim().to_string();
        if let Some(first) = block.runs.first_mut() {
            first.text = first.text.trim_start().to_string();
        }
        if let Some(last) = block.runs.last_mut() {
            last.text = last.text.trim_end().to_string();
        }
        block.runs.retain(|r| !r.text.is_empty());
        for line in &mut block.lines {
            line.text = line.text.trim().to_string();
        }

        block.bold = chars > 0 && bold_chars * 2 > chars;
        let column_left = layout.column_left(block.column).unwrap_or(block.left);
        block.indent = block.left - column_left;
        self.classify(&mut block);
        block
    }

    /// Assign the block kind.
    fn classify(&self, block: &mut Block) {
        if let Some(level) = self.fonts.heading_level(block.font_size, block.bold) {
            block.kind = BlockKind::Heading;
            block.heading_level = level;
        } else if list_marker(&block.text).is_some() {
            block.kind = BlockKind::ListItem;
        } else if media_keyword(&block.text).is_some() {
            block.kind = BlockKind::Caption;
        } else if block.highlight {
            block.kind = BlockKind::Sidebar;
        } else {
            block.kind = BlockKind::Paragraph;
        }
    }
}

fn ends_with_hyphen(text: &str) -> bool {
    text.trim_end().ends_with(['-', '\u{2010}', '\u{00AD}'])
}

/// Whether two fragments on one line are far enough apart to need a space.
fn needs_space(prev: &Fragment, next: &Fragment) -> bool {
    let gap = next.rect.left - prev.rect.right();
    let count = next.text.chars().count();
    let char_width = if count > 0 && next.rect.width > 0.0 {
        next.rect.width / count as f32
    } else {
        next.font.size * 0.5
    };
    gap > char_width * 0.2
}
