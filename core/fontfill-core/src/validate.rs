//! Guards for user-supplied paths (made by FontLab https://www.fontlab.com/)
//!
//! Two entry points: the directory a run is asked to scan, and the file a
//! download request points at. Both reject rather than repair.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::anyhow;

use crate::error::{Error, Kind, Result};
use crate::format::FontFormat;

const OP: &str = "validate_dir";

/// Check that `dir` names an existing, readable, non-root directory and
/// return its absolute form.
pub fn validate_font_directory(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() || dir.to_string_lossy().trim().is_empty() {
        return Err(rejected(dir, "please specify a directory path"));
    }

    let abs = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| Error::new(Kind::Validation, OP).with_path(dir).with_cause(err))?
            .join(dir)
    };

    if is_root(&abs) {
        return Err(rejected(dir, "root directory paths are not allowed"));
    }

    let meta = fs::metadata(&abs).map_err(|err| {
        let cause = if err.kind() == io::ErrorKind::NotFound {
            anyhow!("directory does not exist")
        } else {
            anyhow!(err).context("error accessing directory")
        };
        Error::new(Kind::Validation, OP).with_path(dir).with_cause(cause)
    })?;
    if !meta.is_dir() {
        return Err(rejected(dir, "specified path is not a directory"));
    }

    fs::read_dir(&abs).map_err(|err| {
        Error::new(Kind::Validation, OP)
            .with_path(dir)
            .with_cause(anyhow!(err).context("directory is not accessible"))
    })?;

    tracing::info!(dir = %abs.display(), "directory validation passed");
    Ok(abs)
}

/// `true` if `path` may be served by the download endpoint: no `..`
/// segments and one of the four font extensions.
pub fn is_download_allowed(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();

    if path.to_string_lossy().contains("..")
        || path.components().any(|c| matches!(c, Component::ParentDir))
    {
        tracing::warn!(path = %path.display(), "potential directory traversal attempt");
        return false;
    }
    if FontFormat::from_path(path).is_none() {
        tracing::warn!(path = %path.display(), "extension not allowed for download");
        return false;
    }
    true
}

fn is_root(path: &Path) -> bool {
    let mut rest = path
        .components()
        .filter(|c| !matches!(c, Component::Prefix(_)));
    matches!(rest.next(), Some(Component::RootDir) | None) && rest.next().is_none()
}

fn rejected(dir: &Path, msg: &'static str) -> Error {
    let err = Error::new(Kind::Validation, OP).with_path(dir).with_cause(msg);
    tracing::warn!(error = %err, "directory rejected");
    err
}
