//! Table-of-contents, index and glossary lines.
//!
//! Inside a special section, lines are regrouped by position instead of by
//! font: lines sharing a baseline are joined, wrapped lines are folded into
//! the entry they continue, leader dots are dropped and trailing page
//! references become attributes.

use crate::model::{BlockLine, Role};
use crate::parser::patterns::{is_page_ref, split_page_refs};

/// One entry of a special section.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialEntry {
    /// Entry text without leaders and page references
    pub text: String,
    /// Trailing page references
    pub page_refs: Vec<String>,
    /// Page of the first line
    pub page: u32,
    /// Top of the first line
    pub top: f32,
    /// Left edge of the first line
    pub left: f32,
    /// Reading-order index of the block the entry started in
    pub flow_index: usize,
}

/// Regroups special-section lines into entries.
#[derive(Debug, Clone)]
pub struct EntryCollector {
    role: Role,
    tolerance: f32,
    entries: Vec<SpecialEntry>,
}

impl EntryCollector {
    /// Create a collector for a section with the given role.
    pub fn new(role: Role, tolerance: f32) -> Self {
        Self {
            role,
            tolerance,
            entries: Vec::new(),
        }
    }

    /// Feed the lines of one block.
    pub fn push_lines(&mut self, lines: &[BlockLine], flow_index: usize) {
        for line in merge_baselines(lines, self.tolerance) {
            self.push_line(&line, flow_index);
        }
    }

    fn push_line(&mut self, line: &BlockLine, flow_index: usize) {
        let text = line.text.trim();
        if text.is_empty() {
            return;
        }

        // A bare page number on its own line closes the open entry
        if is_page_ref(text) {
            if let Some(entry) = self.entries.last_mut() {
                if entry.page_refs.is_empty() {
                    entry.page_refs.push(text.to_string());
                    return;
                }
            }
        }

        let (head, refs) = split_page_refs(text);
        let wraps = self.entries.last().is_some_and(|e| self.continues(e, line));
        if let Some(entry) = self.entries.last_mut().filter(|_| wraps) {
            entry.text = format!("{} {}", entry.text, head);
            entry.page_refs.extend(refs);
            return;
        }
        self.entries.push(SpecialEntry {
            text: head,
            page_refs: refs,
            page: line.page,
            top: line.top,
            left: line.left,
            flow_index,
        });
    }

    /// Whether `line` wraps the open entry.
    fn continues(&self, entry: &SpecialEntry, line: &BlockLine) -> bool {
        if line.page != entry.page {
            return false;
        }
        match self.role {
            // Wrapped lines sit at or right of the entry start until the
            // entry's page references arrive
            Role::TableOfContents | Role::Index => {
                entry.page_refs.is_empty() && line.left >= entry.left - self.tolerance
            }
            // Definitions wrap with a hanging indent
            Role::Glossary | Role::FrontMatter => line.left > entry.left + self.tolerance,
        }
    }

    /// Number of collected entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take the collected entries.
    pub fn take(&mut self) -> Vec<SpecialEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Join lines whose baselines agree within `tolerance`, left to right.
fn merge_baselines(lines: &[BlockLine], tolerance: f32) -> Vec<BlockLine> {
    let mut merged: Vec<BlockLine> = Vec::new();
    for line in lines {
        match merged.last_mut() {
            Some(last)
                if last.page == line.page && (last.baseline - line.baseline).abs() <= tolerance =>
            {
                let (left, right) = if line.left < last.left {
                    (line, &*last)
                } else {
                    (&*last, line)
                };
                let text = format!("{} {}", left.text.trim_end(), right.text.trim_start());
                last.left = last.left.min(line.left);
                last.right = last.right.max(line.right);
                last.top = last.top.min(line.top);
                last.text = text;
            }
            _ => merged.push(line.clone()),
        }
    }
    merged
}
