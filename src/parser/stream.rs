//! Raw extraction records and their normalisation into pages.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::model::{FontDescriptor, Fragment, FragmentKind, Page, Rect};

/// US Letter fallback for pages without usable dimensions.
const FALLBACK_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Document as delivered by the upstream extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    /// Page records
    #[serde(default)]
    pub pages: Vec<RawPage>,
}

impl RawDocument {
    /// Create a document from page records.
    pub fn new(pages: Vec<RawPage>) -> Self {
        Self { pages }
    }

    /// Total fragment records across pages.
    pub fn fragment_count(&self) -> usize {
        self.pages.iter().map(|p| p.fragments.len()).sum()
    }
}

/// One page record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPage {
    /// Page number (1-based); defaults to the record position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    /// Page width
    #[serde(default)]
    pub width: f32,
    /// Page height
    #[serde(default)]
    pub height: f32,
    /// Fragment records in extraction order
    #[serde(default)]
    pub fragments: Vec<RawFragment>,
}

impl RawPage {
    /// Create a page record.
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self {
            number: Some(number),
            width,
            height,
            fragments: Vec::new(),
        }
    }

    /// Add a fragment record.
    pub fn push(&mut self, fragment: RawFragment) -> &mut Self {
        self.fragments.push(fragment);
        self
    }
}

/// Font attributes of a fragment record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFont {
    /// Family identifier
    #[serde(default)]
    pub family: Option<String>,
    /// Size
    #[serde(default)]
    pub size: Option<f32>,
    /// Bold
    #[serde(default)]
    pub bold: bool,
    /// Italic
    #[serde(default)]
    pub italic: bool,
}

/// One fragment record. Missing geometry marks the fragment degenerate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFragment {
    /// Primitive kind
    #[serde(default)]
    pub kind: FragmentKind,
    /// Text content (text kind)
    #[serde(default)]
    pub text: String,
    /// Left edge
    #[serde(default)]
    pub left: Option<f32>,
    /// Top edge
    #[serde(default)]
    pub top: Option<f32>,
    /// Width
    #[serde(default)]
    pub width: Option<f32>,
    /// Height
    #[serde(default)]
    pub height: Option<f32>,
    /// Font attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<RawFont>,
    /// Has background or border
    #[serde(default)]
    pub highlight: bool,
    /// Opaque media reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

impl RawFragment {
    /// Create a text record.
    pub fn text(text: impl Into<String>, rect: Rect, font: FontDescriptor) -> Self {
        Self {
            kind: FragmentKind::Text,
            text: text.into(),
            left: Some(rect.left),
            top: Some(rect.top),
            width: Some(rect.width),
            height: Some(rect.height),
            font: Some(RawFont {
                family: Some(font.family),
                size: Some(font.size),
                bold: font.bold,
                italic: font.italic,
            }),
            highlight: false,
            ref_id: None,
        }
    }

    /// Create a media record.
    pub fn media(kind: FragmentKind, rect: Rect, ref_id: impl Into<String>) -> Self {
        Self {
            kind,
            left: Some(rect.left),
            top: Some(rect.top),
            width: Some(rect.width),
            height: Some(rect.height),
            ref_id: Some(ref_id.into()),
            ..Default::default()
        }
    }

    /// Mark the record as highlighted.
    pub fn highlighted(mut self) -> Self {
        self.highlight = true;
        self
    }

    fn rect(&self) -> Rect {
        Rect::new(
            self.left.unwrap_or(f32::NAN),
            self.top.unwrap_or(f32::NAN),
            self.width.unwrap_or(f32::NAN),
            self.height.unwrap_or(f32::NAN),
        )
    }
}

/// Normalises raw records into pages of fragments.
pub struct FragmentStream;

impl FragmentStream {
    /// Normalise a raw document.
    ///
    /// Pages are sorted by number and filtered by the run's page selection.
    /// Fragment ids are assigned in page order, then input order. Anomalies
    /// are repaired and counted in the context's QA report.
    pub fn normalize(raw: RawDocument, ctx: &mut EngineContext) -> Result<Vec<Page>> {
        let mut numbered: Vec<(u32, RawPage)> = raw
            .pages
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p.number.unwrap_or(i as u32 + 1), p))
            .collect();
        numbered.sort_by_key(|(number, _)| *number);

        for pair in numbered.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::InvalidInput(format!(
                    "page {} appears more than once",
                    pair[0].0
                )));
            }
        }
        if let Some((0, _)) = numbered.first() {
            return Err(Error::InvalidInput("page numbers are 1-based".into()));
        }

        let mut pages = Vec::with_capacity(numbered.len());
        let mut next_id = 0usize;
        for (number, raw_page) in numbered {
            if !ctx.options().pages.includes(number) {
                continue;
            }
            let page = Self::normalize_page(number, raw_page, &mut next_id, ctx);
            log::trace!(
                "page {}: {} fragments ({}x{})",
                page.number,
                page.fragments.len(),
                page.width,
                page.height
            );
            pages.push(page);
        }

        let report = ctx.report_mut();
        report.pages = pages.len();
        report.fragments = next_id;
        log::debug!(
            "normalised {} pages, {} fragments ({} filtered, {} degenerate, {} without font)",
            report.pages,
            report.fragments,
            report.filtered_fragments,
            report.degenerate_fragments,
            report.missing_fonts
        );
        Ok(pages)
    }

    fn normalize_page(
        number: u32,
        raw: RawPage,
        next_id: &mut usize,
        ctx: &mut EngineContext,
    ) -> Page {
        let (width, height) = page_size(&raw);
        let mut page = Page::new(number, width, height);
        let report = ctx.report_mut();

        for record in raw.fragments {
            let rect = record.rect();
            let fragment = if record.kind.is_text() {
                let text = normalize_text(&record.text);
                if text.trim().is_empty() {
                    report.filtered_fragments += 1;
                    continue;
                }
                let (font, missing) = font_descriptor(record.font.as_ref());
                let mut fragment = Fragment::text(*next_id, number, text, rect, font);
                fragment.font_missing = missing;
                if missing {
                    report.missing_fonts += 1;
                }
                fragment.with_highlight(record.highlight)
            } else {
                Fragment::media(*next_id, number, record.kind, rect, record.ref_id)
            };

            if fragment.degenerate {
                report.degenerate_fragments += 1;
            }
            *next_id += 1;
            page.add_fragment(fragment);
        }
        page
    }
}

fn page_size(raw: &RawPage) -> (f32, f32) {
    let usable = |v: f32| v.is_finite() && v > 0.0;
    if usable(raw.width) && usable(raw.height) {
        return (raw.width, raw.height);
    }

    let extent = raw
        .fragments
        .iter()
        .map(RawFragment::rect)
        .filter(Rect::is_well_formed)
        .fold((0.0f32, 0.0f32), |(w, h), r| {
            (w.max(r.right()), h.max(r.baseline()))
        });
    let width = if usable(raw.width) {
        raw.width
    } else if extent.0 > 0.0 {
        extent.0
    } else {
        FALLBACK_PAGE_SIZE.0
    };
    let height = if usable(raw.height) {
        raw.height
    } else if extent.1 > 0.0 {
        extent.1
    } else {
        FALLBACK_PAGE_SIZE.1
    };
    (width, height)
}

fn font_descriptor(raw: Option<&RawFont>) -> (FontDescriptor, bool) {
    let Some(raw) = raw else {
        return (FontDescriptor::default(), true);
    };
    let size = raw.size.filter(|s| s.is_finite() && *s > 0.0);
    let family = raw
        .family
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(FontDescriptor::DEFAULT_FAMILY);

    let descriptor = FontDescriptor {
        family: family.to_string(),
        size: size.unwrap_or(0.0),
        bold: raw.bold,
        italic: raw.italic,
    };
    (descriptor, size.is_none())
}

const LIGATURES: [(char, &str); 7] = [
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

/// Normalise fragment text: NFC, ligature expansion, removal of replacement
/// and private-use characters. Edge whitespace is kept; it carries the
/// same-line continuation signal.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfc() {
        if let Some((_, expanded)) = LIGATURES.iter().find(|(lig, _)| *lig == c) {
            out.push_str(expanded);
        } else if c == '\u{FFFD}' || is_private_use(c) || (c.is_control() && c != '\t') {
            continue;
        } else {
            out.push(c);
        }
    }
    out
}

fn is_private_use(c: char) -> bool {
    let code = c as u32;
    (0xE000..=0xF8FF).contains(&code)
        || (0xF0000..=0xFFFFD).contains(&code)
        || (0x100000..=0x10FFFD).contains(&code)
}
