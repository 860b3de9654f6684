//! The extraction adapter: metadata lookups and one-shot downloads.
//!
//! Each operation is a single request/response round-trip to the engine.
//! There is no job state across calls; concurrent downloads coexist only
//! because every one of them runs under a fresh UUID filename.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::AppConfig;
use crate::engine::{Engine, FetchRequest, ProbeInfo, YtDlp};
use crate::error::{Error, Result};
use crate::url;

/// Engine selector used when the caller asks for "best": best combined
/// video+audio, falling back to the best single stream.
const BEST_SELECTOR: &str = "bestvideo+bestaudio/best";

/// One offered download rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOption {
    pub format_id: String,
    pub label: String,
    pub ext: String,
}

/// Metadata returned for a media page.
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub formats: Vec<FormatOption>,
    pub webpage_url: String,
    pub extractor: Option<String>,
}

/// The fixed format menu offered to every caller, regardless of what the
/// engine reports for the page. Two entries, audio first.
#[must_use]
pub fn offered_formats() -> Vec<FormatOption> {
    vec![
        FormatOption {
            format_id: "bestaudio".to_string(),
            label: "Audio Only (MP3/M4A)".to_string(),
            ext: "mp3".to_string(),
        },
        FormatOption {
            format_id: "best".to_string(),
            label: "Best Quality (Auto)".to_string(),
            ext: "mp4".to_string(),
        },
    ]
}

/// Adapter around the extraction engine.
///
/// Owns the download directory and normalizes every engine failure into
/// the crate's error taxonomy.
pub struct Extractor {
    download_dir: PathBuf,
    engine: Arc<dyn Engine>,
}

impl Extractor {
    /// Creates an adapter driving the real engine.
    ///
    /// The download directory is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the download directory cannot be created.
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_engine(config, Arc::new(YtDlp::new()))
    }

    /// Creates an adapter driving a caller-supplied engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the download directory cannot be created.
    pub fn with_engine(config: &AppConfig, engine: Arc<dyn Engine>) -> Result<Self> {
        std::fs::create_dir_all(&config.download_dir)?;
        Ok(Self {
            download_dir: config.download_dir.clone(),
            engine,
        })
    }

    /// Confirms the engine executable is reachable, returning its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable cannot be found.
    pub async fn check_engine(&self) -> Result<PathBuf> {
        self.engine.check_available().await
    }

    /// Looks up metadata for `input` without downloading anything.
    ///
    /// `input` may be a bare URL or free text containing one; see
    /// [`crate::url::normalize`].
    ///
    /// # Errors
    ///
    /// Any engine failure surfaces as [`Error::InfoFetch`] carrying the
    /// engine's message.
    pub async fn fetch_metadata(&self, input: &str) -> Result<MediaInfo> {
        let url = url::normalize(input);
        log::info!("probing {url}");
        let probe = self
            .engine
            .probe(url)
            .await
            .map_err(|e| Error::InfoFetch(e.to_string()))?;
        Ok(media_info(url, probe))
    }

    /// Downloads `input` in the rendition chosen by `format_id` and returns
    /// the path of the finished file.
    ///
    /// # Errors
    ///
    /// [`Error::Download`] if the engine fails; [`Error::OutputMissing`] if
    /// the engine claims success but no file carries the job's UUID.
    pub async fn download(&self, input: &str, format_id: &str) -> Result<PathBuf> {
        let url = url::normalize(input);
        let job_id = uuid::Uuid::new_v4().to_string();
        let request = FetchRequest {
            url: url.to_string(),
            selector: selector_for(format_id).to_string(),
            extract_audio: format_id == "bestaudio",
            output_template: self
                .download_dir
                .join(format!("{job_id}.%(ext)s"))
                .to_string_lossy()
                .into_owned(),
        };

        log::info!("download {job_id}: {url} as {format_id}");
        let reported = self
            .engine
            .fetch(&request)
            .await
            .map_err(|e| Error::Download(e.to_string()))?;

        let path = self.resolve_output(&job_id, reported).await?;
        log::info!("download {job_id}: finished as {}", path.display());
        Ok(path)
    }

    /// Finds the finished file for `job_id`, preferring the path the engine
    /// reported and falling back to a directory scan. The extension is only
    /// known after the engine has run, so the scan matches on the UUID
    /// prefix.
    async fn resolve_output(&self, job_id: &str, reported: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = reported {
            if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                return Ok(path);
            }
        }

        let mut entries = tokio::fs::read_dir(&self.download_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(job_id) {
                return Ok(entry.path());
            }
        }

        Err(Error::OutputMissing)
    }
}

/// Copies the optional probe fields and attaches the fixed format menu.
/// A page that reports no canonical URL falls back to the requested one.
fn media_info(url: &str, probe: ProbeInfo) -> MediaInfo {
    MediaInfo {
        title: probe.title,
        thumbnail: probe.thumbnail,
        duration: probe.duration,
        formats: offered_formats(),
        webpage_url: probe.webpage_url.unwrap_or_else(|| url.to_string()),
        extractor: probe.extractor,
    }
}

/// Maps the public format id onto an engine selector. "best" expands to the
/// combined-streams selector; anything else passes through verbatim.
fn selector_for(format_id: &str) -> &str {
    if format_id == "best" {
        BEST_SELECTOR
    } else {
        format_id
    }
}
