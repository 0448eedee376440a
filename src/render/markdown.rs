//! Markdown preview of a structure tree.

use crate::error::Result;
use crate::model::{
    InlineRun, ListKind, NodeId, Role, ScriptRole, StructureNode, StructureTree, Tag,
};

use super::visitor::{walk, TreeVisitor, VisitorAction};
use super::RenderOptions;

/// Convert a structure tree to Markdown.
pub fn to_markdown(tree: &StructureTree, options: &RenderOptions) -> Result<String> {
    MarkdownRenderer::new(options.clone()).render(tree)
}

/// Markdown renderer.
///
/// Containers become headings by level, sidebars block quotes, captions
/// italic lines and media nodes image or table placeholders.
pub struct MarkdownRenderer {
    options: RenderOptions,
    output: String,
    /// Sidebar nesting
    quote: usize,
    /// Open lists with the number of items seen so far
    lists: Vec<(ListKind, usize)>,
    /// Inside a contents, index or glossary chapter
    special: bool,
}

impl MarkdownRenderer {
    /// Create a new Markdown renderer.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            output: String::new(),
            quote: 0,
            lists: Vec::new(),
            special: false,
        }
    }

    /// Render a tree to Markdown.
    pub fn render(mut self, tree: &StructureTree) -> Result<String> {
        walk(tree, &mut self)?;
        Ok(self.output.trim().to_string())
    }

    fn prefix(&self) -> String {
        "> ".repeat(self.quote)
    }

    fn line(&mut self, text: &str) {
        let prefix = self.prefix();
        for line in text.lines() {
            self.output.push_str(&prefix);
            self.output.push_str(line);
            self.output.push('\n');
        }
    }

    fn blank(&mut self) {
        let blank = format!("{}\n", self.prefix().trim_end());
        if self.output.is_empty()
            || self.output.ends_with("\n\n")
            || self.output.ends_with(&format!("\n{blank}"))
        {
            return;
        }
        self.output.push_str(&blank);
    }

    fn paragraph(&mut self, text: &str) {
        self.blank();
        self.line(text);
        self.blank();
    }

    fn escape(&self, text: &str) -> String {
        if self.options.escape_special_chars {
            escape_markdown(text)
        } else {
            text.to_string()
        }
    }

    fn inline(&self, node: &StructureNode) -> String {
        if node.runs.is_empty() {
            return self.escape(node.text.as_deref().unwrap_or_default());
        }
        let mut out = String::new();
        for run in &node.runs {
            // Runs keep their own spacing only at word boundaries
            if !out.is_empty()
                && run.role == ScriptRole::Normal
                && !out.ends_with(char::is_whitespace)
                && !run.text.starts_with(char::is_whitespace)
            {
                out.push(' ');
            }
            out.push_str(&self.styled(run));
        }
        out
    }

    fn styled(&self, run: &InlineRun) -> String {
        let mut result = self.escape(&run.text);
        if run.italic {
            result = format!("*{}*", result);
        }
        if run.bold {
            result = format!("**{}**", result);
        }
        match run.role {
            ScriptRole::Superscript => format!("<sup>{}</sup>", result),
            ScriptRole::Subscript => format!("<sub>{}</sub>", result),
            ScriptRole::Normal => result,
        }
    }

    fn heading(&mut self, node: &StructureNode, depth: usize) {
        let Some(title) = node.title.as_deref() else {
            return;
        };
        let level = node
            .attrs
            .level
            .map_or(depth, usize::from)
            .clamp(1, usize::from(self.options.max_heading_level));
        let mut text = format!("{} {}", "#".repeat(level), self.escape(title));
        if self.options.include_ids {
            if let Some(id) = &node.attrs.id {
                text.push_str(&format!(" {{#{}}}", id));
            }
        }
        self.paragraph(&text);
    }

    fn entry(&mut self, node: &StructureNode) {
        let mut text = format!("- {}", self.inline(node));
        if self.options.include_page_refs && !node.attrs.page_refs.is_empty() {
            text.push_str(&format!(" ({})", node.attrs.page_refs.join(", ")));
        }
        self.line(&text);
    }

    fn list_item(&mut self, node: &StructureNode) {
        let depth = self.lists.len().saturating_sub(1);
        let Some((kind, count)) = self.lists.last_mut() else {
            return;
        };
        *count += 1;
        let marker = match kind {
            ListKind::Bulleted => self.options.list_marker.to_string(),
            ListKind::Numbered => match node.attrs.marker.as_deref() {
                Some(m) if m.ends_with('.') || m.ends_with(')') => m.to_string(),
                Some(m) => format!("{m}."),
                None => format!("{count}."),
            },
        };
        let text = format!("{}{} {}", "  ".repeat(depth), marker, self.inline(node));
        self.line(&text);
    }

    fn media(&mut self, node: &StructureNode) {
        let label = match node.tag {
            Tag::Table => "Table",
            _ => "Figure",
        };
        let text = match &node.attrs.ref_id {
            Some(ref_id) => format!("![{}]({})", label, ref_id),
            None => format!("[{}]", label),
        };
        self.paragraph(&text);
    }
}

impl TreeVisitor for MarkdownRenderer {
    fn enter(&mut self, _id: NodeId, node: &StructureNode, depth: usize) -> VisitorAction {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return VisitorAction::SkipChildren;
        }
        match node.tag {
            Tag::Book => {}
            Tag::Chapter | Tag::Section => {
                if node.tag == Tag::Chapter {
                    self.special = node.attrs.role.is_some_and(|r| r != Role::FrontMatter);
                }
                self.heading(node, depth);
            }
            Tag::Sidebar => {
                self.blank();
                self.quote += 1;
                if let Some(title) = node.title.as_deref() {
                    let title = format!("**{}**", self.escape(title));
                    self.paragraph(&title);
                }
            }
            Tag::List => {
                if self.lists.is_empty() {
                    self.blank();
                }
                let kind = node.attrs.list_kind.unwrap_or(ListKind::Bulleted);
                self.lists.push((kind, 0));
            }
            Tag::ListItem => self.list_item(node),
            Tag::Para if self.special => self.entry(node),
            Tag::Para => {
                let text = self.inline(node);
                self.paragraph(&text);
            }
            Tag::Caption => {
                let text = format!("*{}*", self.inline(node));
                self.paragraph(&text);
            }
            Tag::Figure | Tag::Table => self.media(node),
        }
        VisitorAction::Continue
    }

    fn leave(&mut self, _id: NodeId, node: &StructureNode, _depth: usize) {
        match node.tag {
            Tag::Sidebar => {
                self.quote = self.quote.saturating_sub(1);
                self.output.push('\n');
            }
            Tag::List => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            Tag::Chapter => {
                if self.special {
                    self.blank();
                }
                self.special = false;
            }
            _ => {}
        }
    }
}

/// Escape text for Markdown output.
///
/// Only escape characters that could be misinterpreted as Markdown syntax.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '`' | '*' | '_' | '[' | ']' | '|' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(tree: &mut StructureTree, title: &str) -> NodeId {
        let mut node = StructureNode::new(Tag::Chapter)
            .with_id("Ch0001")
            .with_title(title);
        node.attrs.level = Some(1);
        tree.append_child(tree.root(), node).unwrap()
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let mut tree = StructureTree::new();
        let ch = chapter(&mut tree, "Overview");
        let mut sec = StructureNode::new(Tag::Section).with_title("Scope");
        sec.attrs.level = Some(2);
        let sec = tree.append_child(ch, sec).unwrap();
        tree.append_child(sec, StructureNode::new(Tag::Para).with_text("Body *text*."))
            .unwrap();

        let md = to_markdown(&tree, &RenderOptions::default()).unwrap();
        assert_eq!(md, "# Overview\n\n## Scope\n\nBody \\*text\\*.");
    }

    #[test]
    fn test_nested_lists() {
        let mut tree = StructureTree::new();
        let ch = chapter(&mut tree, "Lists");
        let mut list = StructureNode::new(Tag::List);
        list.attrs.list_kind = Some(ListKind::Numbered);
        let list = tree.append_child(ch, list).unwrap();
        let mut item = StructureNode::new(Tag::ListItem).with_text("first");
        item.attrs.marker = Some("1".into());
        let item = tree.append_child(list, item).unwrap();
        let inner = tree.append_child(item, StructureNode::new(Tag::List)).unwrap();
        tree.append_child(inner, StructureNode::new(Tag::ListItem).with_text("nested"))
            .unwrap();

        let md = to_markdown(&tree, &RenderOptions::default()).unwrap();
        assert!(md.contains("1. first\n  - nested"));
    }

    #[test]
    fn test_sidebar_caption_media() {
        let mut tree = StructureTree::new();
        let ch = chapter(&mut tree, "Media");
        let side = tree.append_child(ch, StructureNode::new(Tag::Sidebar)).unwrap();
        tree.append_child(side, StructureNode::new(Tag::Para).with_text("aside"))
            .unwrap();
        let mut fig = StructureNode::new(Tag::Figure);
        fig.attrs.ref_id = Some("img-1".into());
        tree.append_child(ch, fig).unwrap();
        tree.append_child(ch, StructureNode::new(Tag::Caption).with_text("Figure 1 A map"))
            .unwrap();

        let md = to_markdown(&tree, &RenderOptions::default()).unwrap();
        assert!(md.contains("> aside"));
        assert!(md.contains("![Figure](img-1)"));
        assert!(md.contains("*Figure 1 A map*"));
    }

    #[test]
    fn test_special_entries_with_refs() {
        let mut tree = StructureTree::new();
        let ch = tree
            .append_child(
                tree.root(),
                StructureNode::new(Tag::Chapter)
                    .with_title("Index")
                    .with_role(Role::Index),
            )
            .unwrap();
        let mut entry = StructureNode::new(Tag::Para).with_text("baseline");
        entry.attrs.page_refs = vec!["12".into(), "45-47".into()];
        tree.append_child(ch, entry).unwrap();

        let md = to_markdown(&tree, &RenderOptions::default()).unwrap();
        assert!(md.contains("- baseline (12, 45-47)"));

        let md = to_markdown(&tree, &RenderOptions::default().with_page_refs(false)).unwrap();
        assert!(md.contains("- baseline\n") || md.ends_with("- baseline"));
    }

    #[test]
    fn test_runs_with_scripts() {
        let mut tree = StructureTree::new();
        let ch = chapter(&mut tree, "Runs");
        let mut para = StructureNode::new(Tag::Para).with_text("E = mc2");
        para.runs = vec![
            InlineRun::plain("E = mc"),
            InlineRun::script("2", ScriptRole::Superscript),
        ];
        tree.append_child(ch, para).unwrap();

        let md = to_markdown(&tree, &RenderOptions::default()).unwrap();
        assert!(md.contains("E = mc<sup>2</sup>"));
    }

    #[test]
    fn test_heading_ids_and_max_level() {
        let mut tree = StructureTree::new();
        chapter(&mut tree, "Deep");
        let options = RenderOptions::default().with_ids(true);
        let md = to_markdown(&tree, &options).unwrap();
        assert_eq!(md, "# Deep {#Ch0001}");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b"), "a\\_b");
        assert_eq!(escape_markdown("[x]"), "\\[x\\]");
        assert_eq!(escape_markdown("1. item"), "1. item");
    }
}
