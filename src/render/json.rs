//! JSON rendering for structure trees and QA reports.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::StructureTree;
use crate::report::QaReport;

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

fn serialize<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<String> {
    let result = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(value),
        JsonFormat::Compact => serde_json::to_string(value),
    };

    result.map_err(|e| Error::Render(format!("JSON serialization error: {}", e)))
}

/// Convert a structure tree to nested JSON.
pub fn to_json(tree: &StructureTree, format: JsonFormat) -> Result<String> {
    serialize(tree, format)
}

/// Convert a QA report to JSON.
pub fn report_to_json(report: &QaReport, format: JsonFormat) -> Result<String> {
    serialize(report, format)
}
