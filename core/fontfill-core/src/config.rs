//! Runtime configuration (made by FontLab https://www.fontlab.com/)

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Kind, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_PROGRESS_CAPACITY: usize = 10;

/// Subdirectory of `static_dir` that receives converted fonts.
pub const CONVERTED_DIR: &str = "converted";

/// Settings shared by the generator, the server and the cleanup sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Root for generated output; converted fonts go under `converted/`.
    pub static_dir: PathBuf,
    pub log_dir: PathBuf,
    pub max_concurrent: usize,
    /// How long converted files are kept (and cached by browsers).
    pub cache_ttl: Duration,
    /// Largest file the download endpoint will serve, in bytes.
    pub max_file_size: u64,
    pub compress_tool: PathBuf,
    pub decompress_tool: PathBuf,
    /// `None` lets a tool run for as long as it likes.
    pub tool_timeout: Option<Duration>,
    pub progress_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
            log_dir: PathBuf::from("logs"),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            compress_tool: PathBuf::from("woff2_compress"),
            decompress_tool: PathBuf::from("woff2_decompress"),
            tool_timeout: Some(DEFAULT_TOOL_TIMEOUT),
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Empty or unparseable
    /// values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        parse_into(&mut cfg.port, get("PORT"));
        parse_into(&mut cfg.max_concurrent, get("MAX_CONCURRENT"));
        parse_into(&mut cfg.max_file_size, get("MAX_FILE_SIZE"));

        if let Some(dir) = get("FONTFILL_STATIC_DIR") {
            cfg.static_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("FONTFILL_LOG_DIR") {
            cfg.log_dir = PathBuf::from(dir);
        }
        if let Some(tool) = get("FONTFILL_COMPRESS_TOOL") {
            cfg.compress_tool = PathBuf::from(tool);
        }
        if let Some(tool) = get("FONTFILL_DECOMPRESS_TOOL") {
            cfg.decompress_tool = PathBuf::from(tool);
        }

        let mut hours = cfg.cache_ttl.as_secs() / 3600;
        parse_into(&mut hours, get("FONTFILL_CACHE_TTL_HOURS"));
        if let Some(ttl) = ttl_from_hours(hours) {
            cfg.cache_ttl = ttl;
        }

        if let Some(secs) = get("FONTFILL_TOOL_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            cfg.tool_timeout = timeout_from_secs(secs);
        }

        cfg
    }

    /// Directory that receives converted fonts.
    pub fn converted_dir(&self) -> PathBuf {
        self.static_dir.join(CONVERTED_DIR)
    }

    /// Reject unusable values and create the directories the run writes to.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(config_error("port cannot be 0"));
        }
        if self.max_concurrent < 1 {
            return Err(config_error("max_concurrent must be at least 1"));
        }
        if self.progress_capacity < 1 {
            return Err(config_error("progress_capacity must be at least 1"));
        }

        for dir in [self.static_dir.clone(), self.converted_dir(), self.log_dir.clone()] {
            ensure_dir(&dir)?;
        }
        Ok(())
    }
}

/// `0` disables the timeout.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Cache lifetime for a number of hours; `None` if the seconds overflow.
pub fn ttl_from_hours(hours: u64) -> Option<Duration> {
    hours.checked_mul(3600).map(Duration::from_secs)
}

fn parse_into<T: FromStr>(slot: &mut T, raw: Option<String>) {
    if let Some(value) = raw.and_then(|v| v.trim().parse().ok()) {
        *slot = value;
    }
}

fn config_error(msg: &'static str) -> Error {
    Error::new(Kind::Config, "validate_config").with_cause(msg)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| {
        Error::new(Kind::Config, "create_dir")
            .with_path(dir)
            .with_cause(err)
    })
}
