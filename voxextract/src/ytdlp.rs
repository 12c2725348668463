//! `yt-dlp` subprocess client
//!
//! The shipped [`MediaExtractor`] implementation. Every call shells out to
//! the `yt-dlp` binary with `--dump-single-json` and parses the JSON it
//! prints; downloading extractions additionally fetch the media into the
//! configured downloads directory using a deterministic filename template,
//! which is what makes cache reuse possible at the entry layer.
//!
//! Extraction is expensive (network + subprocess), so a small semaphore
//! bounds how many extractions run at once.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::descriptor::MediaDescriptor;
use crate::error::{ExtractError, Result};
use crate::extractor::{ExtractOpts, MediaExtractor};

/// Binary looked up on `PATH` by default
pub const DEFAULT_YTDLP_BINARY: &str = "yt-dlp";

/// Default format selection: best audio-only stream, else best combined
pub const DEFAULT_AUDIO_FORMAT: &str = "bestaudio/best";

/// How many extractions may run concurrently
pub const EXTRACT_PERMITS: usize = 2;

/// Output filename template for downloading extractions
const OUTPUT_TEMPLATE: &str = "%(extractor)s-%(id)s-%(title)s.%(ext)s";

/// Placeholder the service uses for missing template fields
const MISSING_FIELD: &str = "NA";

/// `yt-dlp`-backed [`MediaExtractor`]
pub struct YtDlpExtractor {
    binary: String,
    downloads_dir: PathBuf,
    format: String,
    permits: Arc<Semaphore>,
}

impl YtDlpExtractor {
    /// Create an extractor downloading into `downloads_dir`
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: DEFAULT_YTDLP_BINARY.to_string(),
            downloads_dir: downloads_dir.into(),
            format: DEFAULT_AUDIO_FORMAT.to_string(),
            permits: Arc::new(Semaphore::new(EXTRACT_PERMITS)),
        }
    }

    /// Use a specific binary path instead of looking `yt-dlp` up on `PATH`
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Override the format selection string
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Directory downloading extractions write into
    pub fn downloads_dir(&self) -> &PathBuf {
        &self.downloads_dir
    }

    fn args_for(&self, locator: &str, opts: ExtractOpts) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--dump-single-json".into(),
            "--no-warnings".into(),
            "--no-progress".into(),
            "--restrict-filenames".into(),
            "--no-check-certificates".into(),
            "--geo-bypass".into(),
            "--default-search".into(),
            "auto".into(),
            "--format".into(),
            self.format.clone().into(),
        ];
        if opts.download {
            args.push("--no-playlist".into());
            args.push("--no-simulate".into());
            args.push("-o".into());
            args.push(self.downloads_dir.join(OUTPUT_TEMPLATE).into_os_string());
        } else {
            args.push("--skip-download".into());
            if opts.eager {
                args.push("--no-flat-playlist".into());
            } else {
                // Lazy mode keeps collections skeletal and tolerant of
                // individual broken members.
                args.push("--flat-playlist".into());
                args.push("--ignore-errors".into());
            }
        }
        args.push("--".into());
        args.push(locator.into());
        args
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn extract(&self, locator: &str, opts: ExtractOpts) -> Result<MediaDescriptor> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExtractError::extraction("extractor pool closed"))?;

        if opts.download {
            tokio::fs::create_dir_all(&self.downloads_dir).await?;
        }

        debug!(
            %locator,
            eager = opts.eager,
            download = opts.download,
            "running {}",
            self.binary
        );
        let output = Command::new(&self.binary)
            .args(self.args_for(locator, opts))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("")
                .to_string();
            warn!(%locator, status = %output.status, "extractor failed: {last_line}");
            return Err(ExtractError::ProcessFailed {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: last_line,
            });
        }
        if output.stdout.is_empty() {
            return Err(ExtractError::extraction(format!(
                "{} produced no descriptor for {locator}",
                self.binary
            )));
        }

        let descriptor: MediaDescriptor = serde_json::from_slice(&output.stdout)?;
        debug!(
            %locator,
            title = %descriptor.display_title(),
            collection = descriptor.entries.is_some(),
            "extraction finished"
        );
        Ok(descriptor)
    }

    fn expected_stem(&self, descriptor: &MediaDescriptor) -> Option<String> {
        let extractor = descriptor.extractor.as_deref().unwrap_or(MISSING_FIELD);
        let id = descriptor.id.as_deref().unwrap_or(MISSING_FIELD);
        let title = descriptor.title.as_deref().unwrap_or(MISSING_FIELD);
        if id == MISSING_FIELD && title == MISSING_FIELD {
            return None;
        }
        Some(format!(
            "{}-{}-{}",
            restrict_component(extractor),
            restrict_component(id),
            restrict_component(title)
        ))
    }
}

/// Apply the service's restricted-filenames mangling to one template field
fn restrict_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
            out.push(c);
        } else if c == ' ' || c == '\t' {
            out.push('_');
        }
        // everything else (quotes, unicode, separators) is dropped
    }
    if out.is_empty() {
        MISSING_FIELD.to_string()
    } else {
        out
    }
}
