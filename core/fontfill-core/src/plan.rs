//! Conversion planning (made by FontLab https://www.fontlab.com/)
//!
//! Looks at what each variant already has and decides which formats are
//! missing. Two directions exist and nothing else is ever planned:
//!
//! - no `.woff2` yet: compress the `.ttf` (or, failing that, the `.otf`)
//! - `.woff2` but no `.ttf`: decompress the `.woff2` into a `.ttf`

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::format::FontFormat;
use crate::location::LocationCodec;
use crate::variant::{lock, SharedVariant};

/// One unit of work for the conversion pool.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub variant: SharedVariant,
    /// Variant name, copied out so workers can log without locking.
    pub name: String,
    pub source: PathBuf,
    pub source_format: FontFormat,
    pub output: PathBuf,
    pub target: FontFormat,
}

/// Both batches for a run. A variant appears at most once per batch.
#[derive(Debug, Default)]
pub struct JobPlan {
    /// Jobs producing `.woff2` from a desktop format.
    pub web: Vec<ConversionJob>,
    /// Jobs producing `.ttf` from `.woff2`.
    pub desktop: Vec<ConversionJob>,
}

impl JobPlan {
    pub fn is_empty(&self) -> bool {
        self.web.is_empty() && self.desktop.is_empty()
    }
}

/// Decide which conversions the given variants need.
///
/// Outputs land in `output_dir` as `<stem>.woff2` / `<stem>.ttf`, built from
/// the raw stem so names that are not UTF-8 survive. A source reference that
/// cannot be decoded is logged and skipped.
pub fn plan_jobs(
    variants: &BTreeMap<OsString, SharedVariant>,
    output_dir: &Path,
    codec: &dyn LocationCodec,
    cancel: &CancelToken,
) -> Result<JobPlan> {
    let mut plan = JobPlan::default();

    for (stem, shared) in variants {
        cancel.check("plan")?;
        let variant = lock(shared);
        let name = variant.name();

        if !variant.has(FontFormat::Woff2) {
            let source = [FontFormat::Ttf, FontFormat::Otf]
                .into_iter()
                .find_map(|f| variant.location(f).map(|loc| (f, loc)));

            if let Some((source_format, location)) = source {
                match codec.decode(location) {
                    Ok(source) => plan.web.push(ConversionJob {
                        variant: shared.clone(),
                        name: name.to_string(),
                        source,
                        source_format,
                        output: output_path(output_dir, stem, FontFormat::Woff2),
                        target: FontFormat::Woff2,
                    }),
                    Err(err) => tracing::warn!(font = %name, error = %err, "skipping WOFF2 job"),
                }
            }
        } else if !variant.has(FontFormat::Ttf) {
            if let Some(location) = variant.location(FontFormat::Woff2) {
                match codec.decode(location) {
                    Ok(source) => plan.desktop.push(ConversionJob {
                        variant: shared.clone(),
                        name: name.to_string(),
                        source,
                        source_format: FontFormat::Woff2,
                        output: output_path(output_dir, stem, FontFormat::Ttf),
                        target: FontFormat::Ttf,
                    }),
                    Err(err) => tracing::warn!(font = %name, error = %err, "skipping TTF job"),
                }
            }
        }
    }

    tracing::debug!(
        web = plan.web.len(),
        desktop = plan.desktop.len(),
        "planned conversions"
    );
    Ok(plan)
}

fn output_path(dir: &Path, stem: &OsStr, target: FontFormat) -> PathBuf {
    let mut file = stem.to_os_string();
    file.push(target.ext());
    dir.join(file)
}
