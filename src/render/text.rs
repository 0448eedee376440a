//! Indented outline of a structure tree.

use std::fmt::Write;

use crate::error::Result;
use crate::model::{NodeId, StructureNode, StructureTree};

use super::visitor::{walk, TreeVisitor, VisitorAction};
use super::RenderOptions;

/// Render the tree as an indented outline, one node per line.
///
/// Containers show their id and title, leaves a preview of their text.
pub fn to_outline(tree: &StructureTree, options: &RenderOptions) -> Result<String> {
    let mut outline = Outline {
        options,
        output: String::new(),
    };
    walk(tree, &mut outline)?;
    Ok(outline.output.trim_end().to_string())
}

struct Outline<'a> {
    options: &'a RenderOptions,
    output: String,
}

impl TreeVisitor for Outline<'_> {
    fn enter(&mut self, _id: NodeId, node: &StructureNode, depth: usize) -> VisitorAction {
        let mut line = format!("{}{}", "  ".repeat(depth), node.tag);
        if let Some(id) = &node.attrs.id {
            let _ = write!(line, " [{}]", id);
        }
        if let Some(role) = node.attrs.role {
            let _ = write!(line, " ({})", role.as_str());
        }
        if let Some(title) = &node.title {
            let _ = write!(line, " {:?}", title);
        } else if let Some(text) = &node.text {
            let preview = preview(text, self.options.preview_chars);
            if !preview.is_empty() {
                let _ = write!(line, " {:?}", preview);
            }
        }
        if let Some(ref_id) = &node.attrs.ref_id {
            let _ = write!(line, " -> {}", ref_id);
        }
        if self.options.include_page_refs && !node.attrs.page_refs.is_empty() {
            let _ = write!(line, " p.{}", node.attrs.page_refs.join(","));
        }
        if self.options.provenance {
            if let Some(p) = node.attrs.provenance {
                let _ = write!(line, " @{}:{:.1}#{}", p.page, p.top, p.flow_index);
            }
        }
        self.output.push_str(&line);
        self.output.push('\n');

        if self.options.max_depth.is_some_and(|max| depth >= max) {
            VisitorAction::SkipChildren
        } else {
            VisitorAction::Continue
        }
    }
}

/// First `limit` characters of `text`, with an ellipsis when cut.
fn preview(text: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{}...", head.trim_end())
    } else {
        head
    }
}
