//! fontfill-core: the tailor who makes sure every font owns a full wardrobe
//!
//! Point it at a directory tree and it finds every font there, notices which
//! ones only own desktop clothes (`.ttf`/`.otf`) or only travel light
//! (`.woff2`), and sends them to the external WOFF2 tools to fill the gaps.
//!
//! ## How a Run Goes
//!
//! **Scanning**: [`discovery::PathDiscovery`] walks the tree and groups
//! `.ttf`, `.otf`, `.woff` and `.woff2` files by filename stem into
//! [`FontVariant`]s.
//!
//! **Planning**: [`plan::plan_jobs`] decides which conversions are missing
//! and splits them into a web batch and a desktop batch.
//!
//! **Converting**: [`pool::ConversionPool`] runs each batch on a small,
//! bounded set of workers, each job going through a [`convert::Converter`].
//!
//! **Reporting**: [`progress::ProgressBroadcaster`] turns completed jobs into
//! short status lines for anyone listening, dropping updates rather than
//! slowing the workers down.
//!
//! [`PreviewGenerator`] strings all four together.
//!
//! ## A Sample Fitting
//!
//! ```rust,no_run
//! use fontfill_core::{Config, PreviewGenerator};
//!
//! let generator = PreviewGenerator::new(Config::from_env());
//! for font in generator.process_fonts("/Library/Fonts")? {
//!     println!("{} -> {}", font.name, font.preview);
//! }
//! generator.close();
//! # Ok::<(), fontfill_core::Error>(())
//! ```
//!
//! ## House Rules
//!
//! - A failed conversion only costs that one font its new format
//! - Cancellation is polite: a tool that already started gets to finish
//! - Outputs already on disk are reused, so a second run is nearly free
//!
//! ---
//!
//! Crafted with care at FontLab https://www.fontlab.com/

pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod convert;
pub mod discovery;
pub mod error;
pub mod format;
pub mod generator;
pub mod location;
pub mod output;
pub mod plan;
pub mod pool;
pub mod progress;
pub mod validate;
pub mod variant;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{Error, Kind, Result};
pub use format::FontFormat;
pub use generator::PreviewGenerator;
pub use location::{DownloadLinks, Location, LocationCodec};
pub use variant::{FontPreview, FontVariant};
