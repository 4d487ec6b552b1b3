//! Font discovery helpers for fontfill-core (made by FontLab https://www.fontlab.com/)

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{Error, Kind, Result};
use crate::format::{stem_of, FontFormat};
use crate::location::LocationCodec;
use crate::variant::FontVariant;

/// Variants found by a scan, keyed by raw filename stem.
pub type FontSet = BTreeMap<OsString, FontVariant>;

/// Recursive filesystem walker that groups font files into variants.
#[derive(Clone)]
pub struct PathDiscovery {
    root: PathBuf,
    follow_symlinks: bool,
    codec: Arc<dyn LocationCodec>,
}

impl PathDiscovery {
    pub fn new(root: impl Into<PathBuf>, codec: Arc<dyn LocationCodec>) -> Self {
        Self {
            root: root.into(),
            follow_symlinks: false,
            codec,
        }
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Walk the root and group every `.ttf`/`.otf`/`.woff`/`.woff2` by stem.
    ///
    /// Unreadable directories are skipped. Any other walk error ends the scan
    /// and is returned as [`Kind::DiscoveryWalk`]; an empty result is
    /// [`Kind::DiscoveryEmpty`].
    pub fn discover(&self, cancel: &CancelToken) -> Result<FontSet> {
        tracing::info!(root = %self.root.display(), "starting font search");

        if !self.root.exists() {
            return Err(Error::new(Kind::DiscoveryWalk, "walk")
                .with_path(&self.root)
                .with_cause(anyhow::anyhow!("root path does not exist")));
        }

        let mut fonts = FontSet::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            cancel.check("scan")?;

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if is_permission_denied(&err) => {
                    let path = err.path().map(PathBuf::from).unwrap_or_default();
                    let skipped = Error::new(Kind::DiscoveryPermission, "walk")
                        .with_path(path)
                        .with_cause(err);
                    tracing::warn!(error = %skipped, "skipping unreadable directory");
                    continue;
                }
                Err(err) => {
                    let path = err.path().map(PathBuf::from).unwrap_or_else(|| self.root.clone());
                    let failed = Error::new(Kind::DiscoveryWalk, "walk")
                        .with_path(path)
                        .with_cause(err);
                    tracing::error!(error = %failed, "directory walk failed");
                    return Err(failed);
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(format) = FontFormat::from_path(path) else {
                continue;
            };
            let Some(stem) = stem_of(path) else {
                continue;
            };
            let name = stem.to_string_lossy();

            let location = self.codec.encode(path, None);
            match fonts.entry(stem.to_os_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(FontVariant::new(&*name, format, location));
                }
                Entry::Occupied(mut slot) => {
                    if !slot.get_mut().add_discovered(format, location) {
                        tracing::debug!(path = %path.display(), "ignoring duplicate {format} for {name}");
                        continue;
                    }
                }
            }
            tracing::debug!(path = %path.display(), "found font: {name} ({format})");
        }

        if fonts.is_empty() {
            tracing::error!(root = %self.root.display(), "no fonts found");
            return Err(Error::new(Kind::DiscoveryEmpty, "scan")
                .with_path(&self.root)
                .with_cause(anyhow::anyhow!("no font files found in directory")));
        }

        tracing::info!(root = %self.root.display(), "found {} fonts", fonts.len());
        Ok(fonts)
    }
}

fn is_permission_denied(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|io| io.kind() == io::ErrorKind::PermissionDenied)
}
