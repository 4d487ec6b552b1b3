//! Retrieval references for font files (made by FontLab https://www.fontlab.com/)
//!
//! The pipeline never hands raw paths to its callers. Every file it reports
//! is wrapped in a [`Location`], an opaque token that a [`LocationCodec`]
//! can turn back into a filesystem path.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::{Error, Kind, Result};

/// Opaque reference to a font file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-way mapping between paths and [`Location`]s.
pub trait LocationCodec: Send + Sync {
    /// Build a reference for `path`, optionally suggesting a download filename.
    fn encode(&self, path: &Path, filename: Option<&str>) -> Location;

    /// Recover the filesystem path behind a reference.
    fn decode(&self, location: &Location) -> Result<PathBuf>;
}

/// Download links understood by the `/download` route of the web service.
///
/// `encode("/f/A b.ttf", Some("A.ttf"))` yields
/// `/download?path=%2Ff%2FA+b.ttf&filename=A.ttf`. On unix the path is
/// encoded from its raw bytes, so names that are not UTF-8 round-trip.
#[derive(Debug, Clone)]
pub struct DownloadLinks {
    route: String,
}

impl DownloadLinks {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
        }
    }

    /// Pull the `path` parameter out of a raw query string, byte for byte.
    pub fn path_from_query(query: &str) -> Option<PathBuf> {
        let value = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("path="))?;
        let spaced: Vec<u8> = value
            .bytes()
            .map(|b| if b == b'+' { b' ' } else { b })
            .collect();
        let bytes: Vec<u8> = percent_decode(&spaced).collect();
        if bytes.is_empty() {
            return None;
        }
        path_from_bytes(bytes)
    }

    /// The suggested download name, if the query carries one.
    pub fn filename_from_query(query: &str) -> Option<String> {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "filename")
            .map(|(_, value)| value.into_owned())
    }
}

impl Default for DownloadLinks {
    fn default() -> Self {
        Self::new("/download")
    }
}

impl LocationCodec for DownloadLinks {
    fn encode(&self, path: &Path, filename: Option<&str>) -> Location {
        let mut raw = format!("{}?path=", self.route);
        raw.extend(form_urlencoded::byte_serialize(&path_bytes(path)));
        if let Some(name) = filename {
            raw.push_str("&filename=");
            raw.extend(form_urlencoded::byte_serialize(name.as_bytes()));
        }
        Location(raw)
    }

    fn decode(&self, location: &Location) -> Result<PathBuf> {
        let invalid = || Error::new(Kind::Location, "decode_location").with_path(location.as_str());

        let query = location
            .as_str()
            .strip_prefix(self.route.as_str())
            .and_then(|rest| rest.strip_prefix('?'))
            .ok_or_else(invalid)?;

        Self::path_from_query(query).ok_or_else(invalid)
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
        Cow::Owned(text) => Cow::Owned(text.into_bytes()),
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    String::from_utf8(bytes).ok().map(PathBuf::from)
}
