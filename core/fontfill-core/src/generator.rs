//! Run orchestration: scan, plan, convert, report (made by FontLab https://www.fontlab.com/)
//!
//! [`PreviewGenerator`] owns everything a run needs: configuration, the two
//! converters, the location codec, the cancel token and the progress
//! broadcaster. Each call to [`PreviewGenerator::process_fonts`] scans once,
//! plans once, then runs the web batch followed by the desktop batch.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Dispatch;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::convert::{Converter, ToolConverter};
use crate::discovery::PathDiscovery;
use crate::error::{Error, Kind, Result};
use crate::location::{DownloadLinks, LocationCodec};
use crate::plan::{plan_jobs, ConversionJob};
use crate::pool::{BatchReport, ConversionPool};
use crate::progress::{ProgressBroadcaster, ProgressSender, Stage};
use crate::variant::{lock, share, FontPreview, SharedVariant};

/// Assembles a [`PreviewGenerator`].
pub struct GeneratorBuilder {
    config: Config,
    codec: Arc<dyn LocationCodec>,
    compress: Option<Arc<dyn Converter>>,
    decompress: Option<Arc<dyn Converter>>,
    dispatch: Option<Dispatch>,
    follow_symlinks: bool,
}

impl GeneratorBuilder {
    pub fn codec(mut self, codec: Arc<dyn LocationCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the `.ttf`/`.otf` to `.woff2` converter.
    pub fn compressor(mut self, converter: Arc<dyn Converter>) -> Self {
        self.compress = Some(converter);
        self
    }

    /// Replace the `.woff2` to `.ttf` converter.
    pub fn decompressor(mut self, converter: Arc<dyn Converter>) -> Self {
        self.decompress = Some(converter);
        self
    }

    /// Send every log line of the generator, its workers and its relay here.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn build(self) -> PreviewGenerator {
        let dispatch = self
            .dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));
        let timeout = self.config.tool_timeout;
        let compress = self.compress.unwrap_or_else(|| {
            Arc::new(ToolConverter::compress(&self.config.compress_tool).with_timeout(timeout))
        });
        let decompress = self.decompress.unwrap_or_else(|| {
            Arc::new(ToolConverter::decompress(&self.config.decompress_tool).with_timeout(timeout))
        });

        let cancel = CancelToken::new();
        let broadcaster =
            ProgressBroadcaster::spawn(self.config.progress_capacity, cancel.clone(), dispatch.clone());

        PreviewGenerator {
            config: self.config,
            codec: self.codec,
            compress,
            decompress,
            follow_symlinks: self.follow_symlinks,
            cancel,
            broadcaster: Mutex::new(Some(broadcaster)),
            dispatch,
        }
    }
}

/// Fills in missing font formats for a directory tree.
pub struct PreviewGenerator {
    config: Config,
    codec: Arc<dyn LocationCodec>,
    compress: Arc<dyn Converter>,
    decompress: Arc<dyn Converter>,
    follow_symlinks: bool,
    cancel: CancelToken,
    broadcaster: Mutex<Option<ProgressBroadcaster>>,
    dispatch: Dispatch,
}

impl PreviewGenerator {
    /// Generator using the configured external tools and `/download` links.
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> GeneratorBuilder {
        GeneratorBuilder {
            config,
            codec: Arc::new(DownloadLinks::default()),
            compress: None,
            decompress: None,
            dispatch: None,
            follow_symlinks: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn codec(&self) -> &Arc<dyn LocationCodec> {
        &self.codec
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Status lines for this generator's runs; `None` once closed.
    pub fn subscribe(&self) -> Option<async_channel::Receiver<String>> {
        self.with_broadcaster(|b| b.subscribe())
    }

    /// Scan `dir`, convert what is missing and report every variant found.
    ///
    /// Conversion failures are logged and leave the variant without the
    /// target format. Scan failures and cancellation end the run with an
    /// error.
    pub fn process_fonts(&self, dir: impl AsRef<Path>) -> Result<Vec<FontPreview>> {
        let dir = dir.as_ref();
        tracing::dispatcher::with_default(&self.dispatch, || {
            let result = self.run(dir);
            if let Err(err) = &result {
                tracing::error!(dir = %dir.display(), error = %err, "font processing failed");
            }
            result
        })
    }

    fn run(&self, dir: &Path) -> Result<Vec<FontPreview>> {
        self.cancel.check("process_fonts")?;
        check_directory(dir)?;

        let output_dir = self.config.converted_dir();
        fs::create_dir_all(&output_dir).map_err(|err| {
            Error::new(Kind::ConvertStage, "create_dir")
                .with_path(&output_dir)
                .with_cause(err)
        })?;

        self.status("Starting font processing...");
        self.status("Scanning font directory...");
        let found = PathDiscovery::new(dir, self.codec.clone())
            .follow_symlinks(self.follow_symlinks)
            .discover(&self.cancel)?;
        self.status(format!(
            "Found {} fonts. Preparing for conversion...",
            found.len()
        ));

        let variants: BTreeMap<OsString, SharedVariant> =
            found.into_iter().map(|(name, v)| (name, share(v))).collect();
        let plan = plan_jobs(&variants, &output_dir, self.codec.as_ref(), &self.cancel)?;

        let pool = ConversionPool::new(self.config.max_concurrent, self.cancel.clone())
            .with_dispatch(self.dispatch.clone());
        let progress = self.with_broadcaster(|b| b.sender()).flatten();

        self.run_batch(&pool, Stage::WebFormat, plan.web, self.compress.as_ref(), progress.as_ref())?;
        self.run_batch(
            &pool,
            Stage::DesktopFormat,
            plan.desktop,
            self.decompress.as_ref(),
            progress.as_ref(),
        )?;

        self.status("All conversions complete! Preparing results...");
        Ok(variants.values().map(|v| lock(v).to_preview()).collect())
    }

    fn run_batch(
        &self,
        pool: &ConversionPool,
        stage: Stage,
        jobs: Vec<ConversionJob>,
        converter: &dyn Converter,
        progress: Option<&ProgressSender>,
    ) -> Result<BatchReport> {
        if jobs.is_empty() {
            return Ok(BatchReport::default());
        }
        self.status(format!(
            "Starting {} conversions ({} files)...",
            stage.target_name(),
            jobs.len()
        ));
        let report = pool.run(stage, jobs, converter, self.codec.as_ref(), progress)?;
        self.cancel.check("process_fonts")?;
        Ok(report)
    }

    fn status(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!("{msg}");
        if let Some(Some(sender)) = self.with_broadcaster(|b| b.sender()) {
            sender.status(msg);
        }
    }

    fn with_broadcaster<T>(&self, f: impl FnOnce(&ProgressBroadcaster) -> T) -> Option<T> {
        let guard = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(f)
    }

    /// Cancel outstanding work and close the progress stream.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn close(&self) {
        self.cancel.cancel();
        let broadcaster = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(broadcaster) = broadcaster {
            tracing::dispatcher::with_default(&self.dispatch, || {
                tracing::info!("closing preview generator");
            });
            broadcaster.shutdown();
        }
    }
}

impl Drop for PreviewGenerator {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_directory(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::new(Kind::Validation, "process_fonts")
            .with_path(dir)
            .with_cause("path is not a directory")),
        Err(err) => Err(Error::new(Kind::Validation, "process_fonts")
            .with_path(dir)
            .with_cause(err)),
    }
}
