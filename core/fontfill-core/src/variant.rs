//! Font variants: one logical font and every format it is available in
//! (made by FontLab https://www.fontlab.com/)

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::format::FontFormat;
use crate::location::Location;

/// A font identified by filename stem, with a reference per available format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontVariant {
    name: String,
    formats: BTreeMap<FontFormat, Location>,
    preview_format: FontFormat,
}

impl FontVariant {
    /// Start a variant from the first file seen for its stem.
    pub fn new(name: impl Into<String>, format: FontFormat, location: Location) -> Self {
        let mut formats = BTreeMap::new();
        formats.insert(format, location);
        Self {
            name: name.into(),
            formats,
            preview_format: format,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formats(&self) -> &BTreeMap<FontFormat, Location> {
        &self.formats
    }

    pub fn location(&self, format: FontFormat) -> Option<&Location> {
        self.formats.get(&format)
    }

    pub fn has(&self, format: FontFormat) -> bool {
        self.formats.contains_key(&format)
    }

    /// Reference used for in-browser rendering.
    pub fn preview(&self) -> &Location {
        // preview_format is only ever set to a key present in `formats`
        &self.formats[&self.preview_format]
    }

    pub fn preview_format(&self) -> FontFormat {
        self.preview_format
    }

    /// Record a file found on disk. The first file seen for a format wins;
    /// returns `false` for ignored duplicates.
    ///
    /// The preview moves to the new file only when its format ranks higher
    /// (`.woff2` over `.woff` over `.ttf`/`.otf`).
    pub fn add_discovered(&mut self, format: FontFormat, location: Location) -> bool {
        if self.formats.contains_key(&format) {
            return false;
        }
        self.formats.insert(format, location);
        if format.preview_rank() > self.preview_format.preview_rank() {
            self.preview_format = format;
        }
        true
    }

    /// Record a freshly produced output.
    ///
    /// A new web-compressed output takes over the preview unless the preview
    /// is already web-compressed; other outputs never touch it.
    pub fn add_converted(&mut self, format: FontFormat, location: Location) {
        self.formats.insert(format, location);
        if format.is_web_compressed() && !self.preview_format.is_web_compressed() {
            self.preview_format = format;
        }
    }

    pub fn to_preview(&self) -> FontPreview {
        FontPreview {
            name: self.name.clone(),
            preview: self.preview().clone(),
            formats: self.formats.clone(),
        }
    }
}

/// Variant handle shared between the planner and the one job that mutates it.
pub type SharedVariant = Arc<Mutex<FontVariant>>;

pub fn share(variant: FontVariant) -> SharedVariant {
    Arc::new(Mutex::new(variant))
}

/// Lock a shared variant, recovering the data if a previous holder panicked.
pub fn lock(variant: &SharedVariant) -> MutexGuard<'_, FontVariant> {
    variant.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a run reports for each font.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontPreview {
    pub name: String,
    pub preview: Location,
    pub formats: BTreeMap<FontFormat, Location>,
}
