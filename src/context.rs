//! Per-run engine context.
//!
//! Everything a reconstruction run accumulates across stages (the QA report,
//! media references already bound into the tree) lives here and is threaded
//! explicitly through each stage. A fresh context is created per document.

use std::collections::BTreeMap;

use crate::model::NodeId;
use crate::parser::{EngineOptions, Thresholds};
use crate::report::{Ambiguity, AmbiguityKind, QaReport};

/// Media references bound into the tree during a run.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    bound: BTreeMap<String, NodeId>,
}

impl AssetRegistry {
    /// Record a bound reference. Returns the node it was already bound to,
    /// if any.
    pub fn register(&mut self, ref_id: &str, node: NodeId) -> Option<NodeId> {
        match self.bound.get(ref_id) {
            Some(existing) => Some(*existing),
            None => {
                self.bound.insert(ref_id.to_string(), node);
                None
            }
        }
    }

    /// Node a reference was bound to.
    pub fn lookup(&self, ref_id: &str) -> Option<NodeId> {
        self.bound.get(ref_id).copied()
    }

    /// Number of bound references.
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    /// Whether nothing has been bound.
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

/// State shared by every stage of one reconstruction run.
#[derive(Debug, Clone)]
pub struct EngineContext {
    options: EngineOptions,
    report: QaReport,
    assets: AssetRegistry,
}

impl EngineContext {
    /// Create a context for a new run.
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            report: QaReport::default(),
            assets: AssetRegistry::default(),
        }
    }

    /// Run options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Tuned thresholds.
    pub fn thresholds(&self) -> &Thresholds {
        &self.options.thresholds
    }

    /// QA report accumulated so far.
    pub fn report(&self) -> &QaReport {
        &self.report
    }

    /// Mutable access to the QA report.
    pub fn report_mut(&mut self) -> &mut QaReport {
        &mut self.report
    }

    /// Media registry.
    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    /// Mutable access to the media registry.
    pub fn assets_mut(&mut self) -> &mut AssetRegistry {
        &mut self.assets
    }

    /// Record a heuristic ambiguity.
    pub fn note(&mut self, page: u32, kind: AmbiguityKind, detail: impl Into<String>) {
        let detail = detail.into();
        log::debug!("QA page {page}: {kind:?}: {detail}");
        self.report.ambiguities.push(Ambiguity { page, kind, detail });
    }

    /// Clear accumulated state, keeping the options.
    pub fn reset(&mut self) {
        self.report = QaReport::default();
        self.assets = AssetRegistry::default();
    }

    /// Finish the run and hand out the report.
    pub fn into_report(self) -> QaReport {
        self.report
    }
}
