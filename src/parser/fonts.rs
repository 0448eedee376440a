//! Font-size statistics and role classification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Fragment, Page};
use crate::parser::Thresholds;

/// Body size assumed when a document has no usable font samples.
pub const DEFAULT_BODY_SIZE: f32 = 12.0;

/// Histogram of observed font sizes at 0.1 precision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontStatistics {
    /// Size in tenths of a unit -> occurrences
    pub histogram: BTreeMap<u32, usize>,
    /// Total samples
    pub samples: usize,
}

impl FontStatistics {
    /// Collect statistics from every text fragment with a known font.
    pub fn from_pages(pages: &[Page]) -> Self {
        let mut stats = Self::default();
        for page in pages {
            stats.add_fragments(&page.fragments);
        }
        stats
    }

    /// Collect statistics from a slice of fragments.
    pub fn from_fragments(fragments: &[Fragment]) -> Self {
        let mut stats = Self::default();
        stats.add_fragments(fragments);
        stats
    }

    fn add_fragments(&mut self, fragments: &[Fragment]) {
        for f in fragments {
            if f.kind.is_text() && !f.font_missing {
                self.add_size(f.font.size);
            }
        }
    }

    /// Add a font size observation.
    pub fn add_size(&mut self, size: f32) {
        if !size.is_finite() || size <= 0.0 {
            return;
        }
        *self.histogram.entry(size_key(size)).or_insert(0) += 1;
        self.samples += 1;
    }

    /// Whether no sizes were observed.
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Most common size; ties go to the smaller size.
    pub fn mode(&self) -> Option<f32> {
        let mut best: Option<(u32, usize)> = None;
        for (key, count) in &self.histogram {
            if best.map_or(true, |(_, c)| *count > c) {
                best = Some((*key, *count));
            }
        }
        best.map(|(key, _)| key_size(key))
    }

    /// Nearest-rank percentile (`p` in 0..=1).
    pub fn percentile(&self, p: f32) -> Option<f32> {
        if self.samples == 0 {
            return None;
        }
        let rank = ((p.clamp(0.0, 1.0) * self.samples as f32).ceil() as usize).max(1);
        let mut seen = 0;
        for (key, count) in &self.histogram {
            seen += count;
            if seen >= rank {
                return Some(key_size(*key));
            }
        }
        self.histogram.keys().next_back().map(|k| key_size(*k))
    }

    /// Samples at or above `size`.
    pub fn count_at_least(&self, size: f32) -> usize {
        self.histogram
            .range(size_key(size)..)
            .map(|(_, count)| count)
            .sum()
    }
}

fn size_key(size: f32) -> u32 {
    (size * 10.0).round() as u32
}

fn key_size(key: u32) -> f32 {
    key as f32 / 10.0
}

/// Semantic role derived from a font size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontRole {
    /// Level-1 heading tier
    Chapter,
    /// Level-2 heading tier
    Section,
    /// Bold text slightly above body size
    Subsection,
    /// Running text
    Body,
    /// Footnotes, captions and other small print
    Small,
}

impl FontRole {
    /// Heading level of the role (None for non-heading roles).
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            FontRole::Chapter => Some(1),
            FontRole::Section => Some(2),
            FontRole::Subsection => Some(3),
            FontRole::Body | FontRole::Small => None,
        }
    }
}

/// Document-wide font role classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontRoleClassifier {
    /// Dominant size (running text)
    pub body_size: f32,
    /// Level-1 threshold
    pub chapter_threshold: f32,
    /// Level-2 threshold
    pub section_threshold: f32,
    /// Canonical chapter font size (most frequent chapter-tier size)
    pub chapter_size: Option<f32>,
    /// Too few chapter-tier samples; only sizes above `body + fallback` count
    pub thin_chapter_tier: bool,
    /// Role of every observed size (tenths -> role), non-bold
    pub size_roles: BTreeMap<u32, FontRole>,
    tolerance: f32,
    fallback_delta: f32,
    subsection_delta: f32,
    small_delta: f32,
}

impl FontRoleClassifier {
    /// Derive thresholds from document statistics.
    pub fn from_statistics(stats: &FontStatistics, t: &Thresholds) -> Self {
        let body_size = stats.mode().unwrap_or(DEFAULT_BODY_SIZE);
        let p95 = stats.percentile(t.chapter_percentile).unwrap_or(body_size);
        let p80 = stats.percentile(t.section_percentile).unwrap_or(body_size);

        let chapter_threshold = p95.max(body_size * t.chapter_ratio);
        let section_threshold = p80.max(body_size * t.section_ratio);
        let chapter_samples = stats.count_at_least(chapter_threshold - t.tier_tolerance);
        let thin_chapter_tier = chapter_samples < t.min_tier_samples;

        let mut classifier = Self {
            body_size,
            chapter_threshold,
            section_threshold,
            chapter_size: None,
            thin_chapter_tier,
            size_roles: BTreeMap::new(),
            tolerance: t.tier_tolerance,
            fallback_delta: t.chapter_fallback_delta,
            subsection_delta: t.subsection_delta,
            small_delta: t.small_delta,
        };

        let mut chapter_best: Option<(u32, usize)> = None;
        for (key, count) in &stats.histogram {
            let role = classifier.role(key_size(*key), false);
            classifier.size_roles.insert(*key, role);
            if role == FontRole::Chapter && chapter_best.map_or(true, |(_, c)| *count > c) {
                chapter_best = Some((*key, *count));
            }
        }
        classifier.chapter_size = chapter_best.map(|(key, _)| key_size(key));

        log::debug!(
            "font roles: body {:.1}, chapter >= {:.2}{}, section >= {:.2}, chapter size {:?}",
            classifier.body_size,
            classifier.chapter_threshold,
            if thin_chapter_tier { " (thin tier)" } else { "" },
            classifier.section_threshold,
            classifier.chapter_size
        );
        classifier
    }

    /// Derive thresholds from pages.
    pub fn from_pages(pages: &[Page], t: &Thresholds) -> Self {
        Self::from_statistics(&FontStatistics::from_pages(pages), t)
    }

    /// Role of a font size. Unknown sizes (`<= 0`) are body text.
    pub fn role(&self, size: f32, bold: bool) -> FontRole {
        if !size.is_finite() || size <= 0.0 {
            return FontRole::Body;
        }
        let chapter = if self.thin_chapter_tier {
            size > self.body_size + self.fallback_delta
        } else {
            size >= self.chapter_threshold - self.tolerance
        };
        if chapter {
            FontRole::Chapter
        } else if size >= self.section_threshold - self.tolerance {
            FontRole::Section
        } else if bold && size > self.body_size + self.subsection_delta {
            FontRole::Subsection
        } else if size < self.body_size - self.small_delta {
            FontRole::Small
        } else {
            FontRole::Body
        }
    }

    /// Heading level of a font size, if it is heading-tier.
    pub fn heading_level(&self, size: f32, bold: bool) -> Option<u8> {
        self.role(size, bold).heading_level()
    }

    /// Whether a size is in the chapter tier.
    pub fn is_chapter_tier(&self, size: f32) -> bool {
        self.role(size, false) == FontRole::Chapter
    }
}
