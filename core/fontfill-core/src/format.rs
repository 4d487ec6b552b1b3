//! The four font container formats fontfill knows how to shuffle around
//!
//! Fonts show up wearing different coats: the sturdy desktop TrueType and
//! OpenType jackets, and the light, compressed WOFF/WOFF2 travel wear that
//! browsers prefer. We only look at the label on the coat (the extension),
//! never at the font inside.
//!
//! Made with curiosity at FontLab https://www.fontlab.com/

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A font file format, keyed by its lowercase extension.
///
/// Ordering follows declaration order, which keeps result maps stable:
/// `.ttf`, `.otf`, `.woff`, `.woff2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FontFormat {
    #[serde(rename = ".ttf")]
    Ttf,
    #[serde(rename = ".otf")]
    Otf,
    #[serde(rename = ".woff")]
    Woff,
    #[serde(rename = ".woff2")]
    Woff2,
}

impl FontFormat {
    pub const ALL: [FontFormat; 4] = [
        FontFormat::Ttf,
        FontFormat::Otf,
        FontFormat::Woff,
        FontFormat::Woff2,
    ];

    /// Extension including the leading dot.
    pub fn ext(self) -> &'static str {
        match self {
            FontFormat::Ttf => ".ttf",
            FontFormat::Otf => ".otf",
            FontFormat::Woff => ".woff",
            FontFormat::Woff2 => ".woff2",
        }
    }

    /// Recognise a format from a file path, ignoring extension case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ttf" => Some(FontFormat::Ttf),
            "otf" => Some(FontFormat::Otf),
            "woff" => Some(FontFormat::Woff),
            "woff2" => Some(FontFormat::Woff2),
            _ => None,
        }
    }

    /// The compressed web format the conversion tool produces and consumes.
    pub fn is_web_compressed(self) -> bool {
        self == FontFormat::Woff2
    }

    /// How strongly a format is preferred for in-browser previews.
    pub(crate) fn preview_rank(self) -> u8 {
        match self {
            FontFormat::Woff2 => 2,
            FontFormat::Woff => 1,
            FontFormat::Ttf | FontFormat::Otf => 0,
        }
    }

    /// MIME type served for downloads.
    pub fn mime_type(self) -> &'static str {
        match self {
            FontFormat::Ttf => "font/ttf",
            FontFormat::Otf => "font/otf",
            FontFormat::Woff => "font/woff",
            FontFormat::Woff2 => "font/woff2",
        }
    }
}

impl fmt::Display for FontFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ext())
    }
}

/// Filename with its extension removed; the grouping key for variants.
///
/// Case is preserved, so `Arial.ttf` and `arial.otf` are different fonts.
/// The stem is kept as raw OS bytes, so names that are not UTF-8 still group.
pub fn stem_of(path: &Path) -> Option<&OsStr> {
    path.file_stem()
}
