//! Indentation-keyed list stack.

use crate::error::{Error, Result};
use crate::model::{ListKind, NodeId, StructureNode, StructureTree, Tag};

/// One open list level.
#[derive(Debug, Clone)]
struct OpenList {
    list: NodeId,
    indent: f32,
    kind: ListKind,
    item: Option<NodeId>,
}

/// Where a list item landed relative to the open levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A new top-level list was opened
    Opened,
    /// Same level as the previous item
    Continued,
    /// A nested list was opened inside the previous item
    Nested,
    /// One or more nested levels were closed
    Popped,
}

/// Result of placing a list item.
#[derive(Debug, Clone)]
pub struct PlacedItem {
    /// The new list item node
    pub item: NodeId,
    /// How it was placed
    pub placement: Placement,
    /// Indentation change that fell inside the ambiguity band, if any
    pub ambiguous_shift: Option<f32>,
}

/// Stack of open lists keyed by indentation.
#[derive(Debug, Clone)]
pub struct ListStack {
    levels: Vec<OpenList>,
    nest_threshold: f32,
    ambiguity_band: f32,
}

impl ListStack {
    /// Create an empty stack.
    pub fn new(nest_threshold: f32, ambiguity_band: f32) -> Self {
        Self {
            levels: Vec::new(),
            nest_threshold,
            ambiguity_band,
        }
    }

    /// Whether a list is open.
    pub fn is_open(&self) -> bool {
        !self.levels.is_empty()
    }

    /// Number of open levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Indentation of the innermost open list.
    pub fn indent(&self) -> Option<f32> {
        self.levels.last().map(|l| l.indent)
    }

    /// Innermost open list item.
    pub fn current_item(&self) -> Option<NodeId> {
        self.levels.last().and_then(|l| l.item)
    }

    /// Close every open list.
    pub fn close(&mut self) {
        if !self.levels.is_empty() {
            log::trace!("closing {} list level(s)", self.levels.len());
        }
        self.levels.clear();
    }

    /// Place a list item at `indent`, opening, nesting or popping lists as
    /// needed, and append it to the right list.
    pub fn place(
        &mut self,
        tree: &mut StructureTree,
        container: NodeId,
        indent: f32,
        kind: ListKind,
        item: StructureNode,
    ) -> Result<PlacedItem> {
        let mut ambiguous_shift = None;
        let placement = match self.levels.last() {
            None => {
                self.open(tree, container, indent, kind)?;
                Placement::Opened
            }
            Some(top) => {
                let shift = indent - top.indent;
                if shift > self.nest_threshold && top.item.is_some() {
                    let parent = top.item.unwrap_or(container);
                    self.open(tree, parent, indent, kind)?;
                    Placement::Nested
                } else if shift < -self.ambiguity_band && self.levels.len() > 1 {
                    while self.levels.len() > 1
                        && self
                            .levels
                            .last()
                            .is_some_and(|l| indent < l.indent - self.ambiguity_band)
                    {
                        self.levels.pop();
                    }
                    if let Some(top) = self.levels.last() {
                        let residual = indent - top.indent;
                        if residual.abs() > self.ambiguity_band {
                            ambiguous_shift = Some(residual);
                        }
                    }
                    Placement::Popped
                } else {
                    if shift.abs() > self.ambiguity_band {
                        ambiguous_shift = Some(shift);
                    }
                    Placement::Continued
                }
            }
        };

        // A change of numbering kind at the same level starts a sibling list
        if let Some(top) = self.levels.last() {
            let same_level = matches!(placement, Placement::Continued | Placement::Popped);
            if same_level && top.kind != kind {
                let parent = tree.parent(top.list).unwrap_or(container);
                let indent = top.indent;
                self.levels.pop();
                self.open(tree, parent, indent, kind)?;
            }
        }

        let Some(top) = self.levels.last_mut() else {
            return Err(Error::StackUnderflow);
        };
        let node = tree.append_child(top.list, item)?;
        top.item = Some(node);
        Ok(PlacedItem {
            item: node,
            placement,
            ambiguous_shift,
        })
    }

    fn open(
        &mut self,
        tree: &mut StructureTree,
        parent: NodeId,
        indent: f32,
        kind: ListKind,
    ) -> Result<()> {
        let mut list = StructureNode::new(Tag::List);
        list.attrs.list_kind = Some(kind);
        let list = tree.append_child(parent, list)?;
        log::trace!("opened {kind:?} list at indent {indent:.1}");
        self.levels.push(OpenList {
            list,
            indent,
            kind,
            item: None,
        });
        Ok(())
    }
}
