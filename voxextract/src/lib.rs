//! Media metadata extraction boundary for VoxMusic
//!
//! This crate wraps the external extraction service behind a small, typed
//! surface the rest of the pipeline can depend on:
//!
//! - [`MediaDescriptor`]: the structured metadata record an extraction
//!   returns (title, duration, direct URL, collection members, ...)
//! - [`classify`]: the single place that inspects the descriptor's opaque
//!   string fields and decides between "search redirect", "collection" and
//!   "single item"
//! - [`MediaExtractor`]: the async trait the pipeline calls; the shipped
//!   implementation, [`YtDlpExtractor`], shells out to `yt-dlp` and parses
//!   its JSON output
//! - [`detect_chapters`]: chapter discovery for media that embeds a
//!   track listing (native chapter arrays or timestamp lines in the
//!   description text)
//!
//! Everything network-facing lives behind [`MediaExtractor`], so tests and
//! downstream crates can substitute stub extractors freely.
//!
//! # Example
//!
//! ```no_run
//! use voxextract::{ExtractOpts, MediaExtractor, YtDlpExtractor, classify};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = YtDlpExtractor::new("/tmp/downloads");
//!     let descriptor = extractor
//!         .extract("https://example.com/watch?v=xyz", ExtractOpts::lazy())
//!         .await?;
//!     println!("{:?}", classify(&descriptor));
//!     Ok(())
//! }
//! ```

mod chapters;
mod descriptor;
mod error;
mod extractor;
mod ytdlp;

pub use chapters::{Chapter, detect_chapters, parse_timestamp_listing};
pub use descriptor::{Classified, MediaDescriptor, RawChapter, RequestedDownload, classify};
pub use error::{ExtractError, Result};
pub use extractor::{ExtractOpts, MediaExtractor};
pub use ytdlp::{DEFAULT_AUDIO_FORMAT, DEFAULT_YTDLP_BINARY, EXTRACT_PERMITS, YtDlpExtractor};
