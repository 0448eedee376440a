//! Late binding of media nodes into a finished tree.
//!
//! Text nodes are never reordered: a figure or table is inserted right after
//! the text nearest above its position, or at the start of the container
//! whose title is that text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::EngineContext;
use crate::error::Result;
use crate::model::{
    Fragment, FragmentKind, NodeId, Provenance, StructureNode, StructureTree, Tag,
};
use crate::report::{AmbiguityKind, UnresolvedMedia};

/// A media box supplied by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBinding {
    /// Page of the box
    pub page: u32,
    /// Approximate vertical position (top edge)
    pub top: f32,
    /// Node kind to insert
    pub kind: FragmentKind,
    /// Opaque reference id
    pub ref_id: Option<String>,
}

impl MediaBinding {
    /// Create a binding.
    pub fn new(page: u32, top: f32, kind: FragmentKind, ref_id: impl Into<String>) -> Self {
        Self {
            page,
            top,
            kind,
            ref_id: Some(ref_id.into()),
        }
    }

    /// Binding for a non-text fragment.
    pub fn from_fragment(fragment: &Fragment) -> Option<Self> {
        if fragment.kind.is_text() {
            return None;
        }
        Some(Self {
            page: fragment.page,
            top: fragment.rect.top,
            kind: fragment.kind,
            ref_id: fragment.ref_id.clone(),
        })
    }

    fn tag(&self) -> Tag {
        match self.kind {
            FragmentKind::Table => Tag::Table,
            _ => Tag::Figure,
        }
    }
}

/// One position in the tree that media can bind after.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    page: u32,
    top: f32,
    flow_index: usize,
    node: NodeId,
    /// The anchor text is the node's title
    title: bool,
}

/// Positions of text nodes, for nearest-anchor lookup.
#[derive(Debug, Clone, Default)]
pub struct AnchorIndex {
    anchors: Vec<Anchor>,
    /// Last media node inserted after each anchor node
    tails: BTreeMap<NodeId, NodeId>,
}

impl AnchorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line of text at `(page, top)` that belongs to `node`.
    pub fn record(&mut self, page: u32, top: f32, flow_index: usize, node: NodeId, title: bool) {
        if top.is_finite() {
            self.anchors.push(Anchor {
                page,
                top,
                flow_index,
                node,
                title,
            });
        }
    }

    /// Number of recorded anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether no anchor was recorded.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Nearest anchor above `(page, top)`, looking back up to `lookback`
    /// earlier pages when the page has none.
    fn resolve(&self, page: u32, top: f32, lookback: u32) -> Option<Anchor> {
        let same_page = self
            .anchors
            .iter()
            .filter(|a| a.page == page && a.top <= top)
            .max_by(|a, b| {
                a.top
                    .total_cmp(&b.top)
                    .then(a.flow_index.cmp(&b.flow_index))
            });
        if same_page.is_some() {
            return same_page.copied();
        }
        (1..=lookback)
            .filter_map(|back| page.checked_sub(back))
            .find_map(|earlier| {
                self.anchors
                    .iter()
                    .filter(|a| a.page == earlier)
                    .max_by(|a, b| {
                        a.flow_index
                            .cmp(&b.flow_index)
                            .then(a.top.total_cmp(&b.top))
                    })
                    .copied()
            })
    }

    /// Insert a media node for `binding`.
    ///
    /// Returns the new node, or `None` when the binding could not be
    /// resolved or its reference was already bound; both cases are recorded
    /// in the context's report.
    pub fn bind(
        &mut self,
        tree: &mut StructureTree,
        binding: &MediaBinding,
        ctx: &mut EngineContext,
    ) -> Result<Option<NodeId>> {
        if let Some(ref_id) = &binding.ref_id {
            if let Some(existing) = ctx.assets().lookup(ref_id) {
                ctx.note(
                    binding.page,
                    AmbiguityKind::DuplicateMedia,
                    format!("{ref_id} already bound at node {}", existing.index()),
                );
                return Ok(None);
            }
        }

        let lookback = ctx.thresholds().media_page_lookback;
        let Some(anchor) = self.resolve(binding.page, binding.top, lookback) else {
            log::debug!(
                "page {}: no anchor for media {:?} at {:.1}",
                binding.page,
                binding.ref_id,
                binding.top
            );
            ctx.report_mut().unresolved_media.push(UnresolvedMedia {
                page: binding.page,
                top: binding.top,
                ref_id: binding.ref_id.clone(),
            });
            return Ok(None);
        };

        let mut node = StructureNode::new(binding.tag()).with_provenance(Provenance {
            page: binding.page,
            top: binding.top,
            flow_index: anchor.flow_index,
        });
        node.attrs.ref_id = binding.ref_id.clone();

        let id = match self.tails.get(&anchor.node) {
            Some(tail) => tree.insert_after(*tail, node)?,
            None if anchor.title => tree.insert_first_child(anchor.node, node)?,
            None => tree.insert_after(anchor.node, node)?,
        };
        self.tails.insert(anchor.node, id);
        if let Some(ref_id) = &binding.ref_id {
            ctx.assets_mut().register(ref_id, id);
        }
        log::trace!(
            "bound {} {:?} after node {}",
            binding.tag(),
            binding.ref_id,
            anchor.node.index()
        );
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::EngineOptions;

    fn setup() -> (StructureTree, AnchorIndex, NodeId, NodeId, NodeId) {
        let mut tree = StructureTree::new();
        let chapter = tree
            .append_child(tree.root(), StructureNode::new(Tag::Chapter).with_title("One"))
            .unwrap();
        let first = tree
            .append_child(chapter, StructureNode::new(Tag::Para).with_text("first"))
            .unwrap();
        let second = tree
            .append_child(chapter, StructureNode::new(Tag::Para).with_text("second"))
            .unwrap();
        let mut anchors = AnchorIndex::new();
        anchors.record(1, 72.0, 0, chapter, true);
        anchors.record(1, 100.0, 1, first, false);
        anchors.record(1, 300.0, 2, second, false);
        (tree, anchors, chapter, first, second)
    }

    #[test]
    fn test_binds_after_nearest_text_above() {
        let (mut tree, mut anchors, chapter, first, second) = setup();
        let mut ctx = EngineContext::new(EngineOptions::default());
        let media = MediaBinding::new(1, 150.0, FragmentKind::Image, "img1");
        let id = anchors.bind(&mut tree, &media, &mut ctx).unwrap().unwrap();

        assert_eq!(tree.children(chapter), &[first, id, second]);
        assert_eq!(tree.node(id).unwrap().tag, Tag::Figure);
        assert_eq!(ctx.assets().lookup("img1"), Some(id));
    }

    #[test]
    fn test_title_anchor_inserts_first_child() {
        let (mut tree, mut anchors, chapter, first, _) = setup();
        let mut ctx = EngineContext::new(EngineOptions::default());
        let media = MediaBinding::new(1, 80.0, FragmentKind::Table, "t1");
        let id = anchors.bind(&mut tree, &media, &mut ctx).unwrap().unwrap();
        assert_eq!(tree.children(chapter)[0], id);
        assert_eq!(tree.children(chapter)[1], first);
        assert_eq!(tree.node(id).unwrap().tag, Tag::Table);
    }

    #[test]
    fn test_consecutive_media_keep_order() {
        let (mut tree, mut anchors, chapter, first, _) = setup();
        let mut ctx = EngineContext::new(EngineOptions::default());
        let a = anchors
            .bind(&mut tree, &MediaBinding::new(1, 150.0, FragmentKind::Image, "a"), &mut ctx)
            .unwrap()
            .unwrap();
        let b = anchors
            .bind(&mut tree, &MediaBinding::new(1, 200.0, FragmentKind::Image, "b"), &mut ctx)
            .unwrap()
            .unwrap();
        assert_eq!(&tree.children(chapter)[..3], &[first, a, b]);
    }

    #[test]
    fn test_lookback_to_previous_page() {
        let (mut tree, mut anchors, chapter, _, second) = setup();
        let mut ctx = EngineContext::new(EngineOptions::default());
        let media = MediaBinding::new(3, 50.0, FragmentKind::Figure, "f");
        let id = anchors.bind(&mut tree, &media, &mut ctx).unwrap().unwrap();
        assert_eq!(tree.children(chapter).last(), Some(&id));
        assert_eq!(tree.parent(id), tree.parent(second));
    }

    #[test]
    fn test_unresolved_and_duplicate() {
        let (mut tree, mut anchors, ..) = setup();
        let mut ctx = EngineContext::new(EngineOptions::default());

        let far = MediaBinding::new(9, 50.0, FragmentKind::Image, "far");
        assert_eq!(anchors.bind(&mut tree, &far, &mut ctx).unwrap(), None);
        assert_eq!(ctx.report().unresolved_media.len(), 1);

        let media = MediaBinding::new(1, 150.0, FragmentKind::Image, "dup");
        let first = anchors.bind(&mut tree, &media, &mut ctx).unwrap();
        assert_eq!(anchors.bind(&mut tree, &media, &mut ctx).unwrap(), None);
        assert_eq!(ctx.report().ambiguity_count(AmbiguityKind::DuplicateMedia), 1);
        // The repeat adds no node; the first binding is the only one
        assert_eq!(tree.nodes_with_tag(Tag::Figure), first.into_iter().collect::<Vec<_>>());
    }
}
