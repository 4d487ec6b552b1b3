//! Structured errors for fontfill-core (made by FontLab https://www.fontlab.com/)

use std::fmt;
use std::path::{Path, PathBuf};

/// Boxed underlying cause carried by an [`Error`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What went wrong, coarsely.
///
/// Discovery kinds abort a run; conversion kinds stay local to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A directory could not be entered. Logged and skipped by the scanner.
    DiscoveryPermission,
    /// Any other failure while walking the tree.
    DiscoveryWalk,
    /// The walk finished without a single font file.
    DiscoveryEmpty,
    /// Output directory creation or source staging failed.
    ConvertStage,
    /// The external tool could not be run, exited non-zero or timed out.
    ConvertInvoke,
    /// The tool claimed success but the output is missing or empty.
    ConvertVerify,
    /// A location reference could not be decoded into a path.
    Location,
    /// A directory or download path was rejected.
    Validation,
    /// Configuration values are unusable.
    Config,
    /// The conversion worker pool could not be started.
    WorkerPool,
    /// The operation observed the cancel token.
    Cancelled,
}

impl Kind {
    pub fn is_discovery(self) -> bool {
        matches!(
            self,
            Kind::DiscoveryPermission | Kind::DiscoveryWalk | Kind::DiscoveryEmpty
        )
    }

    pub fn is_conversion(self) -> bool {
        matches!(
            self,
            Kind::ConvertStage | Kind::ConvertInvoke | Kind::ConvertVerify
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Kind::DiscoveryPermission => "permission denied",
            Kind::DiscoveryWalk => "directory walk failed",
            Kind::DiscoveryEmpty => "no fonts found",
            Kind::ConvertStage => "staging failed",
            Kind::ConvertInvoke => "conversion tool failed",
            Kind::ConvertVerify => "output verification failed",
            Kind::Location => "invalid location",
            Kind::Validation => "validation failed",
            Kind::Config => "invalid configuration",
            Kind::WorkerPool => "worker pool failed",
            Kind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Error value carrying the failed operation, the path involved and the cause.
#[derive(Debug, thiserror::Error)]
#[error("{op}: {kind}{}{}", path_suffix(.path), cause_suffix(.cause))]
pub struct Error {
    kind: Kind,
    op: &'static str,
    path: Option<PathBuf>,
    #[source]
    cause: Option<Cause>,
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" for {}", p.display()),
        None => String::new(),
    }
}

fn cause_suffix(cause: &Option<Cause>) -> String {
    match cause {
        Some(c) => format!(": {c}"),
        None => String::new(),
    }
}

impl Error {
    pub fn new(kind: Kind, op: &'static str) -> Self {
        Self {
            kind,
            op,
            path: None,
            cause: None,
        }
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn cancelled(op: &'static str) -> Self {
        Self::new(Kind::Cancelled, op)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_includes_op_path_and_cause() {
        let err = Error::new(Kind::ConvertStage, "copy")
            .with_path("/fonts/A.ttf")
            .with_cause(io::Error::new(io::ErrorKind::Other, "disk full"));

        let text = err.to_string();
        assert_eq!(text, "copy: staging failed for /fonts/A.ttf: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn display_without_path_or_cause() {
        let err = Error::cancelled("plan");
        assert_eq!(err.to_string(), "plan: cancelled");
        assert_eq!(err.kind(), Kind::Cancelled);
        assert!(err.path().is_none());
    }

    #[test]
    fn anyhow_causes_box_cleanly() {
        let err = Error::new(Kind::ConvertInvoke, "woff2_compress")
            .with_cause(anyhow::anyhow!("exit status: 1"));
        assert!(err.to_string().ends_with("exit status: 1"));
        assert!(err.kind().is_conversion());
        assert!(!err.kind().is_discovery());
    }
}
