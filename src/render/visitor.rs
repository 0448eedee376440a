//! Visitor pattern over the structure tree.
//!
//! Renderers and report scans walk the tree through [`walk`], which calls
//! [`TreeVisitor::enter`] before a node's children and
//! [`TreeVisitor::leave`] after them.
//!
//! # Example
//!
//! ```
//! use unlayout::model::{NodeId, StructureNode, StructureTree, Tag};
//! use unlayout::render::visitor::{walk, TreeVisitor, VisitorAction};
//!
//! struct ChapterTitles(Vec<String>);
//!
//! impl TreeVisitor for ChapterTitles {
//!     fn enter(&mut self, _id: NodeId, node: &StructureNode, _depth: usize) -> VisitorAction {
//!         if node.tag == Tag::Chapter {
//!             self.0.extend(node.title.clone());
//!             return VisitorAction::SkipChildren;
//!         }
//!         VisitorAction::Continue
//!     }
//! }
//!
//! let mut tree = StructureTree::new();
//! tree.append_child(tree.root(), StructureNode::new(Tag::Chapter).with_title("One")).unwrap();
//! let mut titles = ChapterTitles(Vec::new());
//! walk(&tree, &mut titles).unwrap();
//! assert_eq!(titles.0, vec!["One"]);
//! ```

use crate::error::Result;
use crate::model::{NodeId, StructureNode, StructureTree, Tag};
use crate::report::TreeSummary;

/// Action returned by [`TreeVisitor::enter`] to steer the walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisitorAction {
    /// Visit the children.
    #[default]
    Continue,

    /// Do not descend into this node's children. `leave` is still called.
    SkipChildren,

    /// End the walk immediately.
    Stop,
}

impl VisitorAction {
    /// Check if this action skips the node's children.
    pub fn should_skip(&self) -> bool {
        matches!(self, VisitorAction::SkipChildren)
    }

    /// Check if this action ends the walk.
    pub fn should_stop(&self) -> bool {
        matches!(self, VisitorAction::Stop)
    }
}

/// Callbacks for a depth-first walk of the tree.
///
/// Both methods do nothing by default.
pub trait TreeVisitor {
    /// Called before the node's children.
    ///
    /// # Arguments
    /// * `id` - Arena id of the node
    /// * `node` - The node
    /// * `depth` - Depth below the book root (root = 0)
    fn enter(&mut self, id: NodeId, node: &StructureNode, depth: usize) -> VisitorAction {
        let _ = (id, node, depth);
        VisitorAction::Continue
    }

    /// Called after the node's children.
    fn leave(&mut self, id: NodeId, node: &StructureNode, depth: usize) {
        let _ = (id, node, depth);
    }
}

/// Walk the whole tree depth-first in document order.
pub fn walk<V: TreeVisitor + ?Sized>(tree: &StructureTree, visitor: &mut V) -> Result<()> {
    walk_from(tree, tree.root(), visitor).map(|_| ())
}

/// Walk the subtree at `id`. Returns false when the visitor stopped early.
pub fn walk_from<V: TreeVisitor + ?Sized>(
    tree: &StructureTree,
    id: NodeId,
    visitor: &mut V,
) -> Result<bool> {
    visit(tree, id, tree.depth(id), visitor)
}

fn visit<V: TreeVisitor + ?Sized>(
    tree: &StructureTree,
    id: NodeId,
    depth: usize,
    visitor: &mut V,
) -> Result<bool> {
    let node = tree.node(id)?;
    match visitor.enter(id, node, depth) {
        VisitorAction::Stop => return Ok(false),
        VisitorAction::SkipChildren => {}
        VisitorAction::Continue => {
            for child in node.children() {
                if !visit(tree, *child, depth + 1, visitor)? {
                    return Ok(false);
                }
            }
        }
    }
    visitor.leave(id, node, depth);
    Ok(true)
}

/// Counts nodes by tag.
#[derive(Debug, Clone, Default)]
pub struct SummaryVisitor {
    summary: TreeSummary,
}

impl SummaryVisitor {
    /// Create a visitor with zero counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts collected so far.
    pub fn into_summary(self) -> TreeSummary {
        self.summary
    }
}

impl TreeVisitor for SummaryVisitor {
    fn enter(&mut self, _id: NodeId, node: &StructureNode, _depth: usize) -> VisitorAction {
        let s = &mut self.summary;
        match node.tag {
            Tag::Book => {}
            Tag::Chapter => s.chapters += 1,
            Tag::Section => s.sections += 1,
            Tag::List => s.lists += 1,
            Tag::ListItem => s.list_items += 1,
            Tag::Para => s.paragraphs += 1,
            Tag::Figure => s.figures += 1,
            Tag::Table => s.tables += 1,
            Tag::Caption => s.captions += 1,
            Tag::Sidebar => s.sidebars += 1,
        }
        VisitorAction::Continue
    }
}

/// Count the nodes of a tree by tag.
pub fn summarize(tree: &StructureTree) -> Result<TreeSummary> {
    let mut visitor = SummaryVisitor::new();
    walk(tree, &mut visitor)?;
    Ok(visitor.into_summary())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StructureTree {
        let mut tree = StructureTree::new();
        let ch = tree
            .append_child(tree.root(), StructureNode::new(Tag::Chapter).with_title("One"))
            .unwrap();
        let sec = tree
            .append_child(ch, StructureNode::new(Tag::Section).with_title("1.1"))
            .unwrap();
        tree.append_child(sec, StructureNode::new(Tag::Para).with_text("a"))
            .unwrap();
        tree.append_child(ch, StructureNode::new(Tag::Para).with_text("b"))
            .unwrap();
        tree
    }

    struct Recorder {
        events: Vec<String>,
        skip: Tag,
    }

    impl TreeVisitor for Recorder {
        fn enter(&mut self, _id: NodeId, node: &StructureNode, depth: usize) -> VisitorAction {
            self.events.push(format!("+{}{}", node.tag, depth));
            if node.tag == self.skip {
                VisitorAction::SkipChildren
            } else {
                VisitorAction::Continue
            }
        }

        fn leave(&mut self, _id: NodeId, node: &StructureNode, _depth: usize) {
            self.events.push(format!("-{}", node.tag));
        }
    }

    #[test]
    fn test_visitor_action_default() {
        assert_eq!(VisitorAction::default(), VisitorAction::Continue);
        assert!(VisitorAction::SkipChildren.should_skip());
        assert!(VisitorAction::Stop.should_stop());
        assert!(!VisitorAction::Continue.should_stop());
    }

    #[test]
    fn test_enter_leave_order() {
        let tree = sample();
        let mut rec = Recorder {
            events: Vec::new(),
            skip: Tag::Caption,
        };
        walk(&tree, &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec![
                "+book0", "+chapter1", "+section2", "+para3", "-para", "-section", "+para2",
                "-para", "-chapter", "-book"
            ]
        );
    }

    #[test]
    fn test_skip_children() {
        let tree = sample();
        let mut rec = Recorder {
            events: Vec::new(),
            skip: Tag::Section,
        };
        walk(&tree, &mut rec).unwrap();
        assert!(!rec.events.contains(&"+para3".to_string()));
        assert!(rec.events.contains(&"-section".to_string()));
    }

    #[test]
    fn test_stop() {
        struct FirstPara(Option<String>);
        impl TreeVisitor for FirstPara {
            fn enter(&mut self, _id: NodeId, node: &StructureNode, _d: usize) -> VisitorAction {
                if node.tag == Tag::Para {
                    self.0 = node.text.clone();
                    return VisitorAction::Stop;
                }
                VisitorAction::Continue
            }
        }
        let tree = sample();
        let mut v = FirstPara(None);
        let finished = walk_from(&tree, tree.root(), &mut v).unwrap();
        assert!(!finished);
        assert_eq!(v.0.as_deref(), Some("a"));
    }

    #[test]
    fn test_summary() {
        let summary = summarize(&sample()).unwrap();
        assert_eq!(summary.chapters, 1);
        assert_eq!(summary.sections, 1);
        assert_eq!(summary.paragraphs, 2);
        assert_eq!(summary.figures, 0);
    }
}
