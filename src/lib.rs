//! # unlayout
//!
//! Rebuilds the logical structure of a book from positioned text fragments.
//!
//! An upstream extractor delivers, for every page, fragments of text (and
//! image/table placeholders) with their geometry and font. This library
//! recovers the reading order across columns, groups fragments into
//! paragraphs, classifies headings by font tier and emits a
//! chapter/section/paragraph/list tree, together with a QA report of the
//! heuristic decisions it made.
//!
//! ## Quick Start
//!
//! ```
//! use unlayout::{reconstruct_str, render};
//!
//! fn main() -> unlayout::Result<()> {
//!     let input = r#"[{"number": 1, "width": 612, "height": 792, "fragments": [
//!         {"text": "Chapter 1 Overview", "left": 72, "top": 72, "width": 300, "height": 24,
//!          "font": {"family": "Serif", "size": 24}},
//!         {"text": "Body text.", "left": 72, "top": 110, "width": 300, "height": 12,
//!          "font": {"family": "Serif", "size": 12}}
//!     ]}]"#;
//!
//!     let result = reconstruct_str(input)?;
//!     let markdown = render::to_markdown(&result.tree, &render::RenderOptions::default())?;
//!     println!("{}", markdown);
//!     println!("{} chapter(s)", result.report().summary.chapters);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Column-aware reading order**: multi-column pages, full-width headings, footnotes
//! - **Font tiers**: chapter/section/body sizes derived from the document itself
//! - **Structure**: chapters, sections, paragraphs, nested lists, sidebars, captions
//! - **Special sections**: table of contents, index and glossary entries with page refs
//! - **Late media binding**: figures and tables inserted without reordering text
//! - **Batch processing**: independent documents on Rayon's thread pool

pub mod context;
pub mod detect;
pub mod error;
pub mod model;
pub mod parser;
pub mod render;
pub mod report;
pub mod structure;

// Re-export commonly used types
pub use context::EngineContext;
pub use detect::{detect_format_from_bytes, detect_format_from_path, InputFormat};
pub use error::{Error, Result};
pub use model::{NodeId, Role, StructureNode, StructureTree, Tag};
pub use parser::{
    EngineOptions, FootnoteZonePolicy, LayoutEngine, PageSelection, RawDocument, RawFragment,
    RawPage, Reconstruction, Thresholds,
};
pub use render::{JsonFormat, RenderOptions};
pub use report::QaReport;
pub use structure::MediaBinding;

use std::io::Read;
use std::path::Path;

use rayon::prelude::*;

/// Reconstruct a document with default options.
///
/// # Example
///
/// ```
/// use unlayout::{reconstruct, RawDocument};
///
/// let result = reconstruct(RawDocument::default()).unwrap();
/// assert_eq!(result.report().pages, 0);
/// ```
pub fn reconstruct(raw: RawDocument) -> Result<Reconstruction> {
    reconstruct_with_options(raw, EngineOptions::default())
}

/// Reconstruct a document with custom options.
pub fn reconstruct_with_options(
    raw: RawDocument,
    options: EngineOptions,
) -> Result<Reconstruction> {
    LayoutEngine::new(options)?.run(raw)
}

/// Reconstruct a document from JSON text in any supported encoding.
pub fn reconstruct_str(text: &str) -> Result<Reconstruction> {
    reconstruct(detect::parse_input(text)?)
}

/// Reconstruct a document from a file.
///
/// # Example
///
/// ```no_run
/// use unlayout::reconstruct_file;
///
/// let result = reconstruct_file("fragments.json").unwrap();
/// println!("Chapters: {}", result.report().summary.chapters);
/// ```
pub fn reconstruct_file<P: AsRef<Path>>(path: P) -> Result<Reconstruction> {
    reconstruct(detect::read_document(path)?)
}

/// Reconstruct a document from a reader.
pub fn reconstruct_reader<R: Read>(reader: R) -> Result<Reconstruction> {
    reconstruct(detect::parse_reader(reader)?)
}

/// Reconstruct several independent documents.
///
/// Documents run on Rayon's pool when `options.parallel` is set, otherwise
/// one after another. Results keep the input order; every document gets its
/// own context, so one failure does not affect the others.
pub fn reconstruct_batch(
    docs: &[RawDocument],
    options: &EngineOptions,
) -> Vec<Result<Reconstruction>> {
    let engine = match LayoutEngine::new(options.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            let message = e.to_string();
            return docs
                .iter()
                .map(|_| Err(Error::Config(message.clone())))
                .collect();
        }
    };
    if options.parallel {
        docs.par_iter().map(|doc| engine.run(doc.clone())).collect()
    } else {
        docs.iter().map(|doc| engine.run(doc.clone())).collect()
    }
}

/// Convert a fragment file to a Markdown preview.
pub fn to_markdown<P: AsRef<Path>>(path: P) -> Result<String> {
    let result = reconstruct_file(path)?;
    render::to_markdown(&result.tree, &RenderOptions::default())
}

/// Convert a fragment file to the JSON structure tree.
pub fn to_json<P: AsRef<Path>>(path: P, format: JsonFormat) -> Result<String> {
    let result = reconstruct_file(path)?;
    render::to_json(&result.tree, format)
}

/// Builder for reconstructing and rendering documents.
///
/// # Example
///
/// ```no_run
/// use unlayout::Unlayout;
///
/// let markdown = Unlayout::new()
///     .with_pages(unlayout::PageSelection::Range(1..=20))
///     .without_media()
///     .parse("fragments.json")?
///     .to_markdown()?;
/// # Ok::<(), unlayout::Error>(())
/// ```
pub struct Unlayout {
    engine_options: EngineOptions,
    render_options: RenderOptions,
}

impl Unlayout {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            engine_options: EngineOptions::default(),
            render_options: RenderOptions::default(),
        }
    }

    /// Replace the engine options.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.engine_options = options;
        self
    }

    /// Set page selection.
    pub fn with_pages(mut self, pages: PageSelection) -> Self {
        self.engine_options = self.engine_options.with_pages(pages);
        self
    }

    /// Replace the thresholds.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.engine_options = self.engine_options.with_thresholds(thresholds);
        self
    }

    /// Set the footnote-zone policy.
    pub fn with_footnote_policy(mut self, policy: FootnoteZonePolicy) -> Self {
        self.engine_options = self.engine_options.with_footnote_policy(policy);
        self
    }

    /// Do not bind image/table fragments into the tree.
    pub fn without_media(mut self) -> Self {
        self.engine_options = self.engine_options.with_media_binding(false);
        self
    }

    /// Set render options.
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    /// Include provenance in outlines.
    pub fn with_provenance(mut self) -> Self {
        self.render_options = self.render_options.with_provenance(true);
        self
    }

    /// Reconstruct a parsed document.
    pub fn run(self, raw: RawDocument) -> Result<UnlayoutResult> {
        let reconstruction = LayoutEngine::new(self.engine_options)?.run(raw)?;
        Ok(UnlayoutResult {
            reconstruction,
            render_options: self.render_options,
        })
    }

    /// Reconstruct a fragment file.
    pub fn parse<P: AsRef<Path>>(self, path: P) -> Result<UnlayoutResult> {
        let raw = detect::read_document(path)?;
        self.run(raw)
    }

    /// Reconstruct a document given as JSON text.
    pub fn parse_str(self, text: &str) -> Result<UnlayoutResult> {
        let raw = detect::parse_input(text)?;
        self.run(raw)
    }
}

impl Default for Unlayout {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a builder run.
pub struct UnlayoutResult {
    /// The reconstruction
    pub reconstruction: Reconstruction,
    /// Render options to use
    render_options: RenderOptions,
}

impl UnlayoutResult {
    /// Convert to a Markdown preview.
    pub fn to_markdown(&self) -> Result<String> {
        render::to_markdown(&self.reconstruction.tree, &self.render_options)
    }

    /// Convert to an indented outline.
    pub fn to_outline(&self) -> Result<String> {
        render::to_outline(&self.reconstruction.tree, &self.render_options)
    }

    /// Convert the tree to JSON.
    pub fn to_json(&self, format: JsonFormat) -> Result<String> {
        render::to_json(&self.reconstruction.tree, format)
    }

    /// Convert the QA report to JSON.
    pub fn report_json(&self, format: JsonFormat) -> Result<String> {
        render::report_to_json(self.reconstruction.report(), format)
    }

    /// Bind an externally detected media node.
    pub fn bind_media(&mut self, binding: &MediaBinding) -> Result<Option<NodeId>> {
        self.reconstruction.bind_media(binding)
    }

    /// The structure tree.
    pub fn tree(&self) -> &StructureTree {
        &self.reconstruction.tree
    }

    /// The QA report.
    pub fn report(&self) -> &QaReport {
        self.reconstruction.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"pages": [{"number": 1, "width": 612, "height": 792, "fragments": [
        {"text": "Chapter 1 Overview", "left": 72, "top": 72, "width": 300, "height": 24,
         "font": {"family": "Serif", "size": 24}},
        {"text": "Body text.", "left": 72, "top": 110, "width": 300, "height": 12,
         "font": {"family": "Serif", "size": 12}}
    ]}]}"#;

    #[test]
    fn test_reconstruct_str() {
        let result = reconstruct_str(DOC).unwrap();
        assert_eq!(result.report().summary.chapters, 1);
        assert_eq!(result.report().summary.paragraphs, 1);
    }

    #[test]
    fn test_reconstruct_str_unknown_format() {
        assert!(matches!(reconstruct_str("not json"), Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_reconstruct_reader() {
        let result = reconstruct_reader(DOC.as_bytes()).unwrap();
        assert_eq!(result.tree.count(Tag::Chapter), 1);
    }

    #[test]
    fn test_batch_keeps_order() {
        let one = detect::parse_input(DOC).unwrap();
        let docs = vec![one.clone(), RawDocument::default(), one];
        for options in [EngineOptions::default(), EngineOptions::default().sequential()] {
            let results = reconstruct_batch(&docs, &options);
            assert_eq!(results.len(), 3);
            let pages: Vec<usize> = results
                .iter()
                .map(|r| r.as_ref().unwrap().report().pages)
                .collect();
            assert_eq!(pages, vec![1, 0, 1]);
        }
    }

    #[test]
    fn test_batch_invalid_options() {
        let thresholds = Thresholds {
            tight_gap: -1.0,
            ..Thresholds::default()
        };
        let options = EngineOptions::default().with_thresholds(thresholds);
        let results = reconstruct_batch(&[RawDocument::default()], &options);
        assert!(matches!(results[0], Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_default() {
        let builder = Unlayout::default();
        assert!(builder.engine_options.bind_media);
        assert!(!builder.render_options.provenance);
    }

    #[test]
    fn test_builder_chained() {
        let builder = Unlayout::new()
            .with_pages(PageSelection::Range(1..=5))
            .with_footnote_policy(FootnoteZonePolicy::RequireWide)
            .without_media()
            .with_provenance();
        assert!(matches!(builder.engine_options.pages, PageSelection::Range(_)));
        assert_eq!(
            builder.engine_options.footnote_policy,
            FootnoteZonePolicy::RequireWide
        );
        assert!(!builder.engine_options.bind_media);
        assert!(builder.render_options.provenance);
    }

    #[test]
    fn test_builder_outputs() {
        let result = Unlayout::new().parse_str(DOC).unwrap();
        assert!(result.to_markdown().unwrap().starts_with("# Chapter 1 Overview"));
        assert!(result.to_outline().unwrap().contains("chapter [Ch0001]"));
        let json: serde_json::Value =
            serde_json::from_str(&result.to_json(JsonFormat::Compact).unwrap()).unwrap();
        assert_eq!(json["tag"], "book");
        let report: serde_json::Value =
            serde_json::from_str(&result.report_json(JsonFormat::Compact).unwrap()).unwrap();
        assert_eq!(report["pages"], 1);
    }
}
