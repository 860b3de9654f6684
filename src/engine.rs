//! Subprocess driver for the external extraction engine.
//!
//! Everything site-specific lives inside `yt-dlp`: format negotiation,
//! network fetch, transcoding. This module only builds its command lines,
//! runs it, and turns its output into typed values. The [`Engine`] trait
//! keeps the rest of the crate testable without the executable installed.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Executable the engine is invoked as; resolved via `PATH`.
pub const ENGINE_BIN: &str = "yt-dlp";

/// Fixed desktop-browser identity sent with every engine call. Some sites
/// serve automated traffic an error page instead of the media page.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Metadata document produced by the engine's JSON dump. Every field is
/// optional; sites differ wildly in what they report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
}

/// One download invocation, fully described.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Effective (already normalized) URL.
    pub url: String,
    /// Engine format selector, e.g. `bestvideo+bestaudio/best`.
    pub selector: String,
    /// Whether to re-encode the result into a standalone audio file.
    pub extract_audio: bool,
    /// Output template handed to the engine, `<dir>/<uuid>.%(ext)s`.
    pub output_template: String,
}

/// Abstraction over the extraction engine for testability.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Checks that the engine executable can be found, returning its path.
    async fn check_available(&self) -> Result<PathBuf>;

    /// Runs a metadata-only probe of `url`.
    async fn probe(&self, url: &str) -> Result<ProbeInfo>;

    /// Downloads per `request`. Returns the final path the engine reported,
    /// if it reported one; the extension is the engine's choice either way.
    async fn fetch(&self, request: &FetchRequest) -> Result<Option<PathBuf>>;
}

/// The real engine: spawns `yt-dlp` once per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct YtDlp;

impl YtDlp {
    /// Creates a new `YtDlp` driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Engine for YtDlp {
    async fn check_available(&self) -> Result<PathBuf> {
        which::which(ENGINE_BIN)
            .map_err(|e| Error::Engine(format!("{ENGINE_BIN} not found on PATH: {e}")))
    }

    async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        let output = run_engine(&probe_args(url)).await?;
        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Engine(format!("unreadable metadata from {ENGINE_BIN}: {e}")))
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Option<PathBuf>> {
        let output = run_engine(&fetch_args(request)).await?;
        Ok(last_line(&output.stdout).map(PathBuf::from))
    }
}

/// Builds the argument list for a metadata-only probe.
fn probe_args(url: &str) -> Vec<String> {
    let mut args = vec![
        "--dump-single-json".to_string(),
        "--skip-download".to_string(),
    ];
    push_common(&mut args);
    args.push(url.to_string());
    args
}

/// Builds the argument list for a download. The `after_move` print reports
/// the final path once all moves and post-processing are done.
fn fetch_args(request: &FetchRequest) -> Vec<String> {
    let mut args = vec![
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "-o".to_string(),
        request.output_template.clone(),
        "-f".to_string(),
        request.selector.clone(),
    ];
    if request.extract_audio {
        args.push("-x".to_string());
        args.push("--audio-format".to_string());
        args.push("mp3".to_string());
        args.push("--audio-quality".to_string());
        args.push("192K".to_string());
    }
    push_common(&mut args);
    args.push(request.url.clone());
    args
}

/// Flags shared by every invocation: quiet output, single-item downloads,
/// browser impersonation headers.
fn push_common(args: &mut Vec<String>) {
    for flag in ["--quiet", "--no-warnings", "--no-playlist"] {
        args.push(flag.to_string());
    }
    args.push("--user-agent".to_string());
    args.push(USER_AGENT.to_string());
    args.push("--add-header".to_string());
    args.push(format!("Accept:{ACCEPT}"));
    args.push("--add-header".to_string());
    args.push(format!("Accept-Language:{ACCEPT_LANGUAGE}"));
}

/// Spawns the engine, waits for it, and maps every failure mode onto
/// [`Error::Engine`] with the most useful single message available.
async fn run_engine(args: &[String]) -> Result<std::process::Output> {
    log::debug!("running {ENGINE_BIN} {}", args.join(" "));
    let output = Command::new(ENGINE_BIN)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::Engine(format!("{ENGINE_BIN} is not installed (not found on PATH)"))
            } else {
                Error::Engine(format!("could not run {ENGINE_BIN}: {e}"))
            }
        })?;

    if !output.status.success() {
        return Err(Error::Engine(stderr_message(&output.stderr)));
    }

    Ok(output)
}

/// Last non-empty stderr line; the engine puts the operative error there.
fn stderr_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("engine exited with an error and no message")
        .to_string()
}

/// Last non-empty stdout line, if any.
fn last_line(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}
