//! Output structure tree.
//!
//! Nodes live in an arena and reference each other through [`NodeId`]
//! indices. Parent and child links are only changed through the tree's own
//! operations, which keep them consistent: every node except the book root
//! has exactly one parent, and that parent lists it exactly once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::InlineRun;
use crate::error::{Error, Result};

/// Stable index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// The book root.
    pub const ROOT: NodeId = NodeId(0);

    /// Arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Element tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// Document root
    Book,
    /// Level-1 container
    Chapter,
    /// Level-2+ container
    Section,
    /// List container
    List,
    /// List item
    ListItem,
    /// Paragraph
    Para,
    /// Figure placeholder
    Figure,
    /// Table placeholder
    Table,
    /// Caption
    Caption,
    /// Highlighted aside
    Sidebar,
}

impl Tag {
    /// Tag name as written in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Book => "book",
            Tag::Chapter => "chapter",
            Tag::Section => "section",
            Tag::List => "list",
            Tag::ListItem => "listitem",
            Tag::Para => "para",
            Tag::Figure => "figure",
            Tag::Table => "table",
            Tag::Caption => "caption",
            Tag::Sidebar => "sidebar",
        }
    }

    /// Whether nodes with this tag hold a title and nested content.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Tag::Book | Tag::Chapter | Tag::Section | Tag::Sidebar
        )
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Special role of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Table of contents
    TableOfContents,
    /// Back-of-book index
    Index,
    /// Glossary
    Glossary,
    /// Content before the first chapter
    FrontMatter,
}

impl Role {
    /// Role name as written in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::TableOfContents => "table-of-contents",
            Role::Index => "index",
            Role::Glossary => "glossary",
            Role::FrontMatter => "front-matter",
        }
    }
}

/// List numbering kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Bullet glyph markers
    Bulleted,
    /// Numeric, alphabetic or roman markers
    Numbered,
}

/// Source position a node was built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Source page
    pub page: u32,
    /// Top of the first contributing fragment
    pub top: f32,
    /// Reading-order index of the first contributing fragment
    pub flow_index: usize,
}

/// Node attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Globally unique id (containers only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Special role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Source provenance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    /// Page references (special sections)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub page_refs: Vec<String>,
    /// Opaque media reference (figure/table)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// List numbering kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_kind: Option<ListKind>,
    /// List item marker as it appeared in the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Container nesting level (book = 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Font size of the heading that opened the container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

/// One node of the output tree.
#[derive(Debug, Clone)]
pub struct StructureNode {
    /// Element tag
    pub tag: Tag,
    /// Title (containers)
    pub title: Option<String>,
    /// Text content (leaves)
    pub text: Option<String>,
    /// Inline runs of the text, when they carry more than plain text
    pub runs: Vec<InlineRun>,
    /// Attributes
    pub attrs: NodeAttributes,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl StructureNode {
    /// Create a detached node.
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            title: None,
            text: None,
            runs: Vec::new(),
            attrs: NodeAttributes::default(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the provenance attribute.
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.attrs.provenance = Some(provenance);
        self
    }

    /// Set the id attribute.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.attrs.id = Some(id.into());
        self
    }

    /// Set the role attribute.
    pub fn with_role(mut self, role: Role) -> Self {
        self.attrs.role = Some(role);
        self
    }

    /// Parent node (None for the root).
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in document order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena-backed structure tree rooted at a book node.
#[derive(Debug, Clone)]
pub struct StructureTree {
    nodes: Vec<StructureNode>,
}

impl Default for StructureTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureTree {
    /// Create a tree containing only the book root.
    pub fn new() -> Self {
        let mut root = StructureNode::new(Tag::Book);
        root.attrs.level = Some(0);
        Self { nodes: vec![root] }
    }

    /// The book root.
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is never removed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    pub fn get(&self, id: NodeId) -> Option<&StructureNode> {
        self.nodes.get(id.0)
    }

    /// Look up a node, failing if the index does not exist.
    pub fn node(&self, id: NodeId) -> Result<&StructureNode> {
        self.nodes.get(id.0).ok_or(Error::NodeNotFound(id.0))
    }

    /// Mutable access to a node's content. Links stay private to the tree.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut StructureNode> {
        self.nodes.get_mut(id.0).ok_or(Error::NodeNotFound(id.0))
    }

    /// Children of a node (empty for unknown ids).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Last child of a node.
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, node: StructureNode) -> Result<NodeId> {
        self.node(parent)?;
        let id = self.push(node, parent);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Insert a detached node as the first child of `parent`.
    pub fn insert_first_child(&mut self, parent: NodeId, node: StructureNode) -> Result<NodeId> {
        self.insert_child_at(parent, 0, node)
    }

    /// Insert a detached node as a child of `parent` at `position`.
    pub fn insert_child_at(
        &mut self,
        parent: NodeId,
        position: usize,
        node: StructureNode,
    ) -> Result<NodeId> {
        self.node(parent)?;
        let id = self.push(node, parent);
        let children = &mut self.nodes[parent.0].children;
        let position = position.min(children.len());
        children.insert(position, id);
        Ok(id)
    }

    /// Insert a detached node immediately after `anchor`, as its sibling.
    pub fn insert_after(&mut self, anchor: NodeId, node: StructureNode) -> Result<NodeId> {
        let parent = self.node(anchor)?.parent.ok_or(Error::OrphanNode(anchor.0))?;
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == anchor)
            .ok_or(Error::OrphanNode(anchor.0))?;
        self.insert_child_at(parent, position + 1, node)
    }

    fn push(&mut self, mut node: StructureNode, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        id
    }

    /// Depth of a node below the root (root = 0).
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(p) = current {
            depth += 1;
            if depth > self.nodes.len() {
                break;
            }
            current = self.parent(p);
        }
        depth
    }

    /// Node ids in document (pre-)order, paired with their depth.
    pub fn preorder(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(NodeId::ROOT, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            for child in self.children(id).iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        out
    }

    /// Find a node by its id attribute.
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.attrs.id.as_deref() == Some(id))
            .map(NodeId)
    }

    /// Count nodes with the given tag.
    pub fn count(&self, tag: Tag) -> usize {
        self.nodes.iter().filter(|n| n.tag == tag).count()
    }

    /// Ids of nodes with the given tag, in document order.
    pub fn nodes_with_tag(&self, tag: Tag) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| self.nodes[id.0].tag == tag)
            .collect()
    }

    /// Check the structural invariants.
    ///
    /// Every non-root node has exactly one parent that lists it exactly once,
    /// no node is its own ancestor, and container ids are unique.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.first().and_then(|r| r.parent).is_some() {
            return Err(Error::OrphanNode(0));
        }

        let mut listed = vec![0usize; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for child in &node.children {
                let slot = listed.get_mut(child.0).ok_or(Error::NodeNotFound(child.0))?;
                *slot += 1;
                if self.nodes[child.0].parent != Some(NodeId(index)) {
                    return Err(Error::OrphanNode(child.0));
                }
            }
        }
        for (index, count) in listed.iter().enumerate().skip(1) {
            if *count != 1 {
                return Err(Error::OrphanNode(index));
            }
        }
        if listed[0] != 0 {
            return Err(Error::CyclicParent(0));
        }

        for index in 1..self.nodes.len() {
            let mut steps = 0;
            let mut current = self.nodes[index].parent;
            while let Some(p) = current {
                if p.0 == index || steps > self.nodes.len() {
                    return Err(Error::CyclicParent(index));
                }
                steps += 1;
                current = self.nodes.get(p.0).ok_or(Error::NodeNotFound(p.0))?.parent;
            }
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if let Some(id) = &node.attrs.id {
                if !seen.insert(id.as_str()) {
                    return Err(Error::DuplicateId(id.clone()));
                }
            }
        }
        Ok(())
    }

    /// Nested, serializable view of the subtree at `id`.
    pub fn view(&self, id: NodeId) -> NodeView<'_> {
        let node = &self.nodes[id.0];
        NodeView {
            tag: node.tag,
            title: node.title.as_deref(),
            text: node.text.as_deref(),
            runs: if node.runs.len() > 1 { node.runs.as_slice() } else { &[] },
            attrs: &node.attrs,
            children: node.children.iter().map(|c| self.view(*c)).collect(),
        }
    }
}

impl Serialize for StructureTree {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.view(NodeId::ROOT).serialize(serializer)
    }
}

/// Borrowed nested view of a node, used for serialization.
#[derive(Debug, Serialize)]
pub struct NodeView<'a> {
    /// Element tag
    pub tag: Tag,
    /// Title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    /// Text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    /// Inline runs
    #[serde(skip_serializing_if = "no_runs")]
    pub runs: &'a [InlineRun],
    /// Attributes
    #[serde(flatten)]
    pub attrs: &'a NodeAttributes,
    /// Children
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView<'a>>,
}

fn no_runs(runs: &&[InlineRun]) -> bool {
    runs.is_empty()
}
