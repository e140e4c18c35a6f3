//! Format selection
//!
//! The caller registers selectors up front; when the server announces a
//! format, the registry walks them in registration order and binds the
//! first match. Formats no selector claims are still decoded for protocol
//! correctness, but their bytes never reach a sink.

use std::collections::HashSet;
use std::sync::Arc;

/// Opaque identifier the server assigns to a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatId(pub u64);

impl std::fmt::Display for FormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mime-type category a selector may match by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimePrefix {
    /// `video/*`
    Video,
    /// `audio/*`
    Audio,
    /// `text/*`
    Text,
}

impl MimePrefix {
    fn matches(&self, mime_type: &str) -> bool {
        let prefix = match self {
            MimePrefix::Video => "video",
            MimePrefix::Audio => "audio",
            MimePrefix::Text => "text",
        };
        mime_type.len() > prefix.len()
            && mime_type[..prefix.len()].eq_ignore_ascii_case(prefix)
            && mime_type.as_bytes()[prefix.len()] == b'/'
    }
}

/// Declarative claim on server-announced formats
///
/// A selector with explicit format ids matches those ids only; otherwise
/// it falls back to its mime prefix. Immutable once built.
#[derive(Debug, Clone)]
pub struct FormatSelector {
    /// Human-readable name used in logs
    pub display_name: String,
    /// Exact format ids this selector claims, overriding the mime prefix
    pub explicit_format_ids: HashSet<FormatId>,
    /// Whether matched media should be decoded but dropped
    pub discard_media: bool,
    /// Mime category matched when no explicit ids are set
    pub mime_prefix: Option<MimePrefix>,
}

impl FormatSelector {
    /// Selector claiming `video/*` formats
    pub fn video() -> Self {
        Self {
            display_name: "video".to_string(),
            explicit_format_ids: HashSet::new(),
            discard_media: false,
            mime_prefix: Some(MimePrefix::Video),
        }
    }

    /// Selector claiming `audio/*` formats
    pub fn audio() -> Self {
        Self {
            display_name: "audio".to_string(),
            explicit_format_ids: HashSet::new(),
            discard_media: false,
            mime_prefix: Some(MimePrefix::Audio),
        }
    }

    /// Selector claiming `text/*` formats
    pub fn captions() -> Self {
        Self {
            display_name: "captions".to_string(),
            explicit_format_ids: HashSet::new(),
            discard_media: false,
            mime_prefix: Some(MimePrefix::Text),
        }
    }

    /// Restrict this selector to exact format ids
    pub fn with_format_ids(mut self, ids: impl IntoIterator<Item = FormatId>) -> Self {
        self.explicit_format_ids = ids.into_iter().collect();
        self
    }

    /// Mark matched media for decode-and-drop
    pub fn discarding(mut self) -> Self {
        self.discard_media = true;
        self
    }

    /// Whether this selector claims the announced format
    pub fn matches(&self, format_id: FormatId, mime_type: &str) -> bool {
        if !self.explicit_format_ids.is_empty() {
            return self.explicit_format_ids.contains(&format_id);
        }
        match &self.mime_prefix {
            Some(prefix) => prefix.matches(mime_type),
            None => false,
        }
    }
}

/// Ordered selector list, first match wins
#[derive(Debug, Default)]
pub struct SelectorRegistry {
    selectors: Vec<Arc<FormatSelector>>,
}

impl SelectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a selector behind the ones already registered
    pub fn register(&mut self, selector: FormatSelector) {
        self.selectors.push(Arc::new(selector));
    }

    /// Find the first selector claiming the announced format
    pub fn select(&self, format_id: FormatId, mime_type: &str) -> Option<Arc<FormatSelector>> {
        self.selectors
            .iter()
            .find(|s| s.matches(format_id, mime_type))
            .cloned()
    }

    /// Number of registered selectors
    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    /// Whether the registry has no selectors
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}
