//! Block-to-tree state machine.
//!
//! Blocks arrive in reading order. Headings open containers on a level-keyed
//! stack, list items go through the indentation-keyed [`ListStack`], and
//! everything else becomes paragraphs, captions or sidebars inside the
//! innermost open container. Content before the first chapter heading lands
//! in an implicit front-matter chapter.

use std::collections::HashSet;
use std::iter;

use super::lists::ListStack;
use super::media::AnchorIndex;
use super::special::EntryCollector;
use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::model::{
    ends_with_terminal, join_text, Block, BlockKind, BlockLine, InlineRun, NodeId, Provenance,
    Role, StructureNode, StructureTree, Tag,
};
use crate::parser::patterns::{is_chapter_preamble, list_marker, media_keyword, special_role};
use crate::parser::Thresholds;
use crate::report::AmbiguityKind;

/// Font-size difference under which two blocks share a font.
const FONT_MATCH_TOLERANCE: f32 = 0.5;

/// Id of the implicit front-matter chapter.
const FRONT_MATTER_ID: &str = "Ch0000";

#[derive(Debug, Clone)]
struct OpenContainer {
    node: NodeId,
    level: u8,
    font_size: f32,
    /// Nothing was added since the container opened
    empty: bool,
}

/// Table-of-contents, index or glossary mode.
#[derive(Debug, Clone)]
struct SpecialMode {
    role: Role,
    container: NodeId,
    collector: EntryCollector,
}

/// The paragraph later blocks may still extend.
#[derive(Debug, Clone)]
struct OpenParagraph {
    node: NodeId,
    page: u32,
    column: u16,
    ro_block: u32,
    family: String,
    size: f32,
    /// Indent of the last line relative to its column
    indent: f32,
    terminal: bool,
}

impl OpenParagraph {
    fn new(node: NodeId, block: &Block) -> Self {
        Self {
            node,
            page: block.last_page,
            column: block.column,
            ro_block: block.ro_block,
            family: block.font_family.clone(),
            size: block.font_size,
            indent: last_line_indent(block),
            terminal: block.ends_with_terminal(),
        }
    }
}

/// Output of a finished build.
#[derive(Debug, Clone)]
pub struct StructuredDocument {
    /// The document tree
    pub tree: StructureTree,
    /// Text positions for late media binding
    pub anchors: AnchorIndex,
}

/// Builds a [`StructureTree`] from classified blocks.
#[derive(Debug)]
pub struct StructureBuilder {
    thresholds: Thresholds,
    tree: StructureTree,
    stack: Vec<OpenContainer>,
    ids: HashSet<String>,
    chapter: u32,
    sections: u32,
    preamble: Vec<Block>,
    lists: ListStack,
    paragraph: Option<OpenParagraph>,
    special: Option<SpecialMode>,
    sidebar: Option<NodeId>,
    anchors: AnchorIndex,
}

impl StructureBuilder {
    /// Create a builder holding only the book root.
    pub fn new(thresholds: &Thresholds) -> Self {
        let tree = StructureTree::new();
        let root = OpenContainer {
            node: tree.root(),
            level: 0,
            font_size: 0.0,
            empty: true,
        };
        Self {
            thresholds: thresholds.clone(),
            tree,
            stack: vec![root],
            ids: HashSet::new(),
            chapter: 0,
            sections: 0,
            preamble: Vec::new(),
            lists: ListStack::new(thresholds.list_nest_threshold, thresholds.list_ambiguity_band),
            paragraph: None,
            special: None,
            sidebar: None,
            anchors: AnchorIndex::new(),
        }
    }

    /// Number of open containers below the book root.
    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    /// Tree built so far.
    pub fn tree(&self) -> &StructureTree {
        &self.tree
    }

    /// Feed every block and finish.
    pub fn build(
        mut self,
        blocks: Vec<Block>,
        ctx: &mut EngineContext,
    ) -> Result<StructuredDocument> {
        for block in blocks {
            self.push(block, ctx)?;
        }
        self.finish(ctx)
    }

    /// Feed one block.
    pub fn push(&mut self, block: Block, ctx: &mut EngineContext) -> Result<()> {
        let chapter_heading = block.is_heading() && block.heading_level <= 1;
        if chapter_heading && is_chapter_preamble(&block.text) {
            log::trace!("page {}: buffered chapter preamble {:?}", block.page, block.text);
            self.preamble.push(block);
            return Ok(());
        }
        if !chapter_heading {
            self.flush_preamble(ctx)?;
            if let Some(mode) = self.special.as_mut() {
                if block.lines.is_empty() {
                    mode.collector.push_lines(&[fallback_line(&block)], block.flow_index);
                } else {
                    mode.collector.push_lines(&block.lines, block.flow_index);
                }
                if let Some(top) = self.stack.last_mut() {
                    top.empty = false;
                }
                return Ok(());
            }
        }

        if block.highlight && !chapter_heading {
            return self.highlighted(block, ctx);
        }
        self.close_sidebar();

        match block.kind {
            BlockKind::Heading => {
                let level = block.heading_level.max(1);
                self.heading(block, level)
            }
            BlockKind::ListItem => self.list_item(block, ctx),
            BlockKind::Caption => self.caption(block, ctx),
            BlockKind::Paragraph | BlockKind::Sidebar => self.paragraph(block),
        }
    }

    /// Close everything back to the root and validate the tree.
    pub fn finish(mut self, ctx: &mut EngineContext) -> Result<StructuredDocument> {
        self.flush_preamble(ctx)?;
        self.leave_special()?;
        self.close_flow();
        self.close_to(1)?;
        self.tree.validate()?;
        log::debug!(
            "structure: {} nodes, {} chapter(s), {} section(s)",
            self.tree.len(),
            self.tree.count(Tag::Chapter),
            self.tree.count(Tag::Section)
        );
        Ok(StructuredDocument {
            tree: self.tree,
            anchors: self.anchors,
        })
    }

    fn heading(&mut self, block: Block, level: u8) -> Result<()> {
        self.close_flow();
        let preamble = std::mem::take(&mut self.preamble);
        if preamble.is_empty() && self.merges_into_top(&block, level) {
            return self.merge_heading(block);
        }

        let title = preamble
            .iter()
            .chain(iter::once(&block))
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let first = preamble.first().unwrap_or(&block);
        let node = self.open_container(&title, level, first, block.font_size)?;
        for source in preamble.iter().chain(iter::once(&block)) {
            self.record_lines(source, node, true);
        }

        if let Some(role) = special_role(&block.text) {
            self.tree.node_mut(node)?.attrs.role = Some(role);
            log::debug!("entering {} mode at {:?}", role.as_str(), title);
            self.special = Some(SpecialMode {
                role,
                container: node,
                collector: EntryCollector::new(role, self.thresholds.indent_tolerance),
            });
        }
        Ok(())
    }

    /// Whether a heading only continues the title of the container opened
    /// just before it.
    fn merges_into_top(&self, block: &Block, level: u8) -> bool {
        self.special.is_none()
            && special_role(&block.text).is_none()
            && self.stack.last().is_some_and(|top| {
                top.level == level
                    && top.empty
                    && (top.font_size - block.font_size).abs()
                        <= self.thresholds.heading_merge_tolerance
            })
    }

    fn merge_heading(&mut self, block: Block) -> Result<()> {
        let node = self.stack.last().ok_or(Error::StackUnderflow)?.node;
        let container = self.tree.node_mut(node)?;
        let title = container.title.take().unwrap_or_default();
        container.title = Some(join_text(&title, &block.text));
        log::trace!("merged heading {:?} into node {}", block.text, node.index());
        self.record_lines(&block, node, true);
        Ok(())
    }

    fn open_container(
        &mut self,
        title: &str,
        level: u8,
        source: &Block,
        font_size: f32,
    ) -> Result<NodeId> {
        if level <= 1 {
            self.leave_special()?;
        }
        self.close_to(level)?;
        if level > 1 {
            self.ensure_chapter()?;
        }

        let id = self.assign_id(level)?;
        let tag = if level <= 1 { Tag::Chapter } else { Tag::Section };
        let mut node = StructureNode::new(tag)
            .with_id(id.clone())
            .with_title(title)
            .with_provenance(provenance(source));
        node.attrs.level = Some(level);
        if font_size > 0.0 {
            node.attrs.font_size = Some(font_size);
        }

        let parent = self.stack.last_mut().ok_or(Error::StackUnderflow)?;
        parent.empty = false;
        let parent = parent.node;
        let node = self.tree.append_child(parent, node)?;
        self.stack.push(OpenContainer {
            node,
            level,
            font_size,
            empty: true,
        });
        log::debug!("opened {tag} {id} (level {level}): {title:?}");
        Ok(node)
    }

    /// Pop every container at `level` or deeper.
    fn close_to(&mut self, level: u8) -> Result<()> {
        while self.stack.last().is_some_and(|c| c.level >= level) {
            if self.stack.len() == 1 {
                return Err(Error::StackUnderflow);
            }
            if let Some(closed) = self.stack.pop() {
                log::trace!("closed container {}", closed.node.index());
            }
        }
        Ok(())
    }

    fn assign_id(&mut self, level: u8) -> Result<String> {
        let id = if level <= 1 {
            self.chapter += 1;
            self.sections = 0;
            format!("Ch{:04}", self.chapter)
        } else {
            self.sections += 1;
            format!("Ch{:04}S{:03}", self.chapter, self.sections)
        };
        self.claim(id)
    }

    fn claim(&mut self, id: String) -> Result<String> {
        if !self.ids.insert(id.clone()) {
            return Err(Error::DuplicateId(id));
        }
        Ok(id)
    }

    /// Open the implicit front-matter chapter if no chapter is open.
    fn ensure_chapter(&mut self) -> Result<()> {
        if self.stack.len() > 1 {
            return Ok(());
        }
        let id = self.claim(FRONT_MATTER_ID.to_string())?;
        let mut node = StructureNode::new(Tag::Chapter)
            .with_id(id)
            .with_role(Role::FrontMatter);
        node.attrs.level = Some(1);

        let root = self.stack.last_mut().ok_or(Error::StackUnderflow)?;
        root.empty = false;
        let root = root.node;
        let node = self.tree.append_child(root, node)?;
        self.stack.push(OpenContainer {
            node,
            level: 1,
            font_size: 0.0,
            empty: true,
        });
        self.sections = 0;
        log::debug!("opened implicit front matter");
        Ok(())
    }

    /// Container that receives flowing content.
    fn flow_parent(&mut self) -> Result<NodeId> {
        self.ensure_chapter()?;
        let top = self.stack.last_mut().ok_or(Error::StackUnderflow)?;
        top.empty = false;
        Ok(self.sidebar.unwrap_or(top.node))
    }

    fn close_flow(&mut self) {
        self.lists.close();
        self.paragraph = None;
        self.sidebar = None;
    }

    fn close_sidebar(&mut self) {
        if self.sidebar.take().is_some() {
            self.lists.close();
            self.paragraph = None;
        }
    }

    fn flush_preamble(&mut self, ctx: &mut EngineContext) -> Result<()> {
        let preamble = std::mem::take(&mut self.preamble);
        let Some(first) = preamble.first() else {
            return Ok(());
        };
        self.close_flow();
        let title = preamble
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        ctx.note(
            first.page,
            AmbiguityKind::ChapterPreamble,
            format!("{title:?} used as chapter title"),
        );
        let node = self.open_container(&title, 1, first, first.font_size)?;
        for source in &preamble {
            self.record_lines(source, node, true);
        }
        Ok(())
    }

    fn leave_special(&mut self) -> Result<()> {
        let Some(mut mode) = self.special.take() else {
            return Ok(());
        };
        let entries = mode.collector.take();
        log::debug!("{} {} entries", entries.len(), mode.role.as_str());
        for entry in entries {
            let mut node = StructureNode::new(Tag::Para)
                .with_text(entry.text)
                .with_provenance(Provenance {
                    page: entry.page,
                    top: entry.top,
                    flow_index: entry.flow_index,
                });
            node.attrs.page_refs = entry.page_refs;
            let id = self.tree.append_child(mode.container, node)?;
            self.anchors
                .record(entry.page, entry.top, entry.flow_index, id, false);
        }
        Ok(())
    }

    fn highlighted(&mut self, block: Block, ctx: &mut EngineContext) -> Result<()> {
        if media_keyword(&block.text).is_some() {
            return self.caption(block, ctx);
        }
        if block.word_count() <= self.thresholds.highlight_heading_words {
            let deepest = self.stack.iter().map(|c| c.level).max().unwrap_or(0);
            return self.heading(block, deepest.max(2));
        }

        if self.sidebar.is_none() {
            self.close_flow();
            let parent = self.flow_parent()?;
            let sidebar = StructureNode::new(Tag::Sidebar).with_provenance(provenance(&block));
            let sidebar = self.tree.append_child(parent, sidebar)?;
            log::trace!("page {}: opened sidebar {}", block.page, sidebar.index());
            self.sidebar = Some(sidebar);
        }
        match block.kind {
            BlockKind::ListItem => self.list_item(block, ctx),
            _ => self.paragraph(block),
        }
    }

    fn paragraph(&mut self, block: Block) -> Result<()> {
        // Text indented under an open list item continues that item
        let band = self.thresholds.list_ambiguity_band;
        if let (Some(item), Some(indent)) = (self.lists.current_item(), self.lists.indent()) {
            if block.indent > indent + band {
                self.append_to(item, &block)?;
                self.record_lines(&block, item, false);
                return Ok(());
            }
        }
        self.lists.close();

        let extended = self
            .paragraph
            .as_ref()
            .filter(|open| self.extends(open, &block))
            .map(|open| open.node);
        if let Some(node) = extended {
            self.append_to(node, &block)?;
            self.record_lines(&block, node, false);
            let terminal = self
                .tree
                .node(node)?
                .text
                .as_deref()
                .is_some_and(ends_with_terminal);
            self.paragraph = Some(OpenParagraph {
                terminal,
                ..OpenParagraph::new(node, &block)
            });
            return Ok(());
        }

        let parent = self.flow_parent()?;
        let node = text_node(Tag::Para, &block);
        let node = self.tree.append_child(parent, node)?;
        self.record_lines(&block, node, false);
        self.paragraph = Some(OpenParagraph::new(node, &block));
        Ok(())
    }

    /// Whether `block` continues the open paragraph after a column or page
    /// change.
    fn extends(&self, open: &OpenParagraph, block: &Block) -> bool {
        let region_changed = open.page != block.page
            || open.column != block.column
            || open.ro_block != block.ro_block;
        region_changed
            && !open.terminal
            && open.family == block.font_family
            && (open.size - block.font_size).abs() < FONT_MATCH_TOLERANCE
            && (block.indent - open.indent).abs() <= self.thresholds.indent_tolerance
    }

    fn list_item(&mut self, block: Block, ctx: &mut EngineContext) -> Result<()> {
        let Some(marker) = list_marker(&block.text) else {
            return self.paragraph(block);
        };
        self.paragraph = None;
        let parent = self.flow_parent()?;

        let prefix = block.text.get(..marker.content_start).unwrap_or_default();
        let content = block.text.get(marker.content_start..).unwrap_or_default().trim();
        let mut node = StructureNode::new(Tag::ListItem)
            .with_text(content)
            .with_provenance(provenance(&block));
        node.runs = strip_prefix(&block.runs, prefix);
        node.attrs.marker = Some(marker.marker.clone());
        node.attrs.list_kind = Some(marker.kind);

        let placed = self
            .lists
            .place(&mut self.tree, parent, block.indent, marker.kind, node)?;
        if let Some(shift) = placed.ambiguous_shift {
            ctx.note(
                block.page,
                AmbiguityKind::ListNesting,
                format!("indent change {shift:+.1} at item {:?}", marker.marker),
            );
        }
        self.record_lines(&block, placed.item, false);
        Ok(())
    }

    fn caption(&mut self, block: Block, ctx: &mut EngineContext) -> Result<()> {
        self.lists.close();
        self.paragraph = None;
        let parent = self.flow_parent()?;
        if self.tree.children(parent).is_empty() {
            ctx.note(
                block.page,
                AmbiguityKind::CaptionAnchor,
                format!("caption {:?} has no preceding content", block.text),
            );
        }
        let node = text_node(Tag::Caption, &block);
        let node = self.tree.append_child(parent, node)?;
        self.record_lines(&block, node, false);
        Ok(())
    }

    fn append_to(&mut self, node: NodeId, block: &Block) -> Result<()> {
        let target = self.tree.node_mut(node)?;
        let text = target.text.take().unwrap_or_default();
        target.text = Some(join_text(&text, &block.text));
        append_runs(&mut target.runs, &block.runs);
        Ok(())
    }

    fn record_lines(&mut self, block: &Block, node: NodeId, title: bool) {
        if block.lines.is_empty() {
            self.anchors
                .record(block.page, block.top, block.flow_index, node, title);
        }
        for line in &block.lines {
            self.anchors
                .record(line.page, line.top, block.flow_index, node, title);
        }
    }
}

fn provenance(block: &Block) -> Provenance {
    Provenance {
        page: block.page,
        top: block.top,
        flow_index: block.flow_index,
    }
}

fn text_node(tag: Tag, block: &Block) -> StructureNode {
    let mut node = StructureNode::new(tag)
        .with_text(block.text.clone())
        .with_provenance(provenance(block));
    node.runs = block.runs.clone();
    node
}

fn fallback_line(block: &Block) -> BlockLine {
    BlockLine {
        text: block.text.clone(),
        page: block.page,
        left: block.left,
        right: block.left,
        top: block.top,
        baseline: block.top,
    }
}

/// Indent of the block's last line relative to its column.
fn last_line_indent(block: &Block) -> f32 {
    block.indent + block.lines.last().map_or(0.0, |line| line.left - block.left)
}

fn append_runs(runs: &mut Vec<InlineRun>, next: &[InlineRun]) {
    let mut rest = next;
    if let (Some(last), Some(first)) = (runs.last_mut(), next.first()) {
        if last.role == first.role && last.bold == first.bold && last.italic == first.italic {
            last.text = join_text(&last.text, &first.text);
            rest = &next[1..];
        }
    }
    runs.extend(rest.iter().cloned());
}

fn strip_prefix(runs: &[InlineRun], prefix: &str) -> Vec<InlineRun> {
    let mut runs = runs.to_vec();
    if let Some(first) = runs.first_mut() {
        if let Some(rest) = first.text.strip_prefix(prefix) {
            first.text = rest.trim_start().to_string();
        }
    }
    runs.retain(|r| !r.text.is_empty());
    runs
}
