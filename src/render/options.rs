//! Rendering options.

/// Options shared by the Markdown and outline renderers.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Maximum heading level (1-6)
    pub max_heading_level: u8,

    /// Character to use for bulleted list markers
    pub list_marker: char,

    /// Escape special Markdown characters
    pub escape_special_chars: bool,

    /// Render page references of contents, index and glossary entries
    pub include_page_refs: bool,

    /// Append container ids to headings and outline lines
    pub include_ids: bool,

    /// Append source page, top and flow index to outline lines
    pub provenance: bool,

    /// Deepest tree level to render (None = unlimited)
    pub max_depth: Option<usize>,

    /// Characters of leaf text shown per outline line (0 = none)
    pub preview_chars: usize,
}

impl RenderOptions {
    /// Create new render options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum heading level.
    pub fn with_max_heading(mut self, level: u8) -> Self {
        self.max_heading_level = level.clamp(1, 6);
        self
    }

    /// Set the list marker character.
    pub fn with_list_marker(mut self, marker: char) -> Self {
        self.list_marker = marker;
        self
    }

    /// Enable or disable Markdown escaping.
    pub fn with_escaping(mut self, escape: bool) -> Self {
        self.escape_special_chars = escape;
        self
    }

    /// Enable or disable page references.
    pub fn with_page_refs(mut self, include: bool) -> Self {
        self.include_page_refs = include;
        self
    }

    /// Enable or disable container ids.
    pub fn with_ids(mut self, include: bool) -> Self {
        self.include_ids = include;
        self
    }

    /// Enable or disable provenance in the outline.
    pub fn with_provenance(mut self, provenance: bool) -> Self {
        self.provenance = provenance;
        self
    }

    /// Limit the rendered depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set the outline preview length.
    pub fn with_preview(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_heading_level: 6,
            list_marker: '-',
            escape_special_chars: true,
            include_page_refs: true,
            include_ids: false,
            provenance: false,
            max_depth: None,
            preview_chars: 48,
        }
    }
}
