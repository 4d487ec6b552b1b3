//! Single-file conversion through the external WOFF2 tools
//! (made by FontLab https://www.fontlab.com/)
//!
//! `woff2_compress` and `woff2_decompress` both take one filename, work in
//! the current directory and name their output after their input. So every
//! conversion goes through the same dance:
//!
//! 1. return early if the output already exists and is non-empty
//! 2. copy the source next to the output, named `<output stem>.<source ext>`
//! 3. run the tool in the output directory on that copy
//! 4. check the output now exists and is non-empty
//! 5. remove the staged copy, whatever happened in 3 and 4
//!
//! Step 1 is the only cache: converted files stay on disk until the cleanup
//! sweep ages them out.
//!
//! On unix each tool runs in its own process group, so a timeout takes down
//! anything the tool spawned along with it.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};

use crate::error::{Error, Kind, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Turns one font file into another.
///
/// Implementations must be usable from several pool workers at once.
pub trait Converter: Send + Sync {
    /// Convert `source` into `output`, returning the path actually written.
    fn convert(&self, source: &Path, output: &Path) -> Result<PathBuf>;
}

/// Which way a [`ToolConverter`] goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Compress,
    Decompress,
}

/// [`Converter`] backed by an external command-line tool.
#[derive(Debug, Clone)]
pub struct ToolConverter {
    program: PathBuf,
    direction: Direction,
    timeout: Option<Duration>,
}

impl ToolConverter {
    pub fn new(program: impl Into<PathBuf>, direction: Direction) -> Self {
        Self {
            program: program.into(),
            direction,
            timeout: None,
        }
    }

    pub fn compress(program: impl Into<PathBuf>) -> Self {
        Self::new(program, Direction::Compress)
    }

    pub fn decompress(program: impl Into<PathBuf>) -> Self {
        Self::new(program, Direction::Decompress)
    }

    /// Kill the tool if it runs longer than `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn label(&self) -> &'static str {
        match self.direction {
            Direction::Compress => "woff2_compress",
            Direction::Decompress => "woff2_decompress",
        }
    }

    fn run_tool(&self, dir: &Path, file: &Path) -> anyhow::Result<()> {
        let file_name = file
            .file_name()
            .ok_or_else(|| anyhow!("staged path has no file name"))?;

        let mut command = Command::new(&self.program);
        command
            .arg(file_name)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", self.program.display()))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = match self.timeout {
            Some(limit) => wait_with_deadline(&mut child, limit),
            None => child.wait().context("waiting for conversion tool"),
        };

        // the whole group is gone by now, so the pipes close and these return
        let mut output = stdout.join().unwrap_or_default();
        output.push_str(&stderr.join().unwrap_or_default());
        let status = waited?;

        if !status.success() {
            bail!("{status}, output: {}", output.trim());
        }
        Ok(())
    }
}

impl Converter for ToolConverter {
    fn convert(&self, source: &Path, output: &Path) -> Result<PathBuf> {
        let op = self.label();
        tracing::info!(
            source = %source.display(),
            output = %output.display(),
            "starting {op}"
        );

        let output_dir = output
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(output_dir).map_err(|err| {
            Error::new(Kind::ConvertStage, "create_dir")
                .with_path(output_dir)
                .with_cause(err)
        })?;

        if is_non_empty_file(output) {
            tracing::info!(output = %output.display(), "output already exists, skipping {op}");
            return Ok(output.to_path_buf());
        }

        let staged = StagedCopy::create(source, output)?;

        self.run_tool(output_dir, staged.path()).map_err(|err| {
            let failed = Error::new(Kind::ConvertInvoke, op)
                .with_path(staged.path())
                .with_cause(err);
            tracing::warn!(error = %failed, "conversion tool failed");
            failed
        })?;

        if !is_non_empty_file(output) {
            let failed = Error::new(Kind::ConvertVerify, "verify")
                .with_path(output)
                .with_cause(anyhow!("file not created or empty after {op}"));
            tracing::warn!(error = %failed, "output verification failed");
            return Err(failed);
        }

        tracing::info!(output = %output.display(), "{op} succeeded");
        Ok(output.to_path_buf())
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> anyhow::Result<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().context("polling conversion tool")? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            kill_group(child);
            let _ = child.wait();
            bail!("timed out after {}s", limit.as_secs_f32());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: `pid` leads the process group created at spawn; kill(2)
        // only sends a signal and touches no memory.
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

/// Working copy of the source, named so the tool writes exactly `output`.
/// Removed on drop.
struct StagedCopy {
    path: PathBuf,
    owned: bool,
}

impl StagedCopy {
    fn create(source: &Path, output: &Path) -> Result<Self> {
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let path = output.with_extension(ext);

        // The source already sits where the tool expects it.
        if same_file(source, &path) {
            return Ok(Self { path, owned: false });
        }

        tracing::debug!(src = %source.display(), dst = %path.display(), "staging source");
        fs::copy(source, &path).map_err(|err| {
            let _ = fs::remove_file(&path);
            Error::new(Kind::ConvertStage, "copy")
                .with_path(source)
                .with_cause(err)
        })?;

        Ok(Self { path, owned: true })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedCopy {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove staged copy");
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
