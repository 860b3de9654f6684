//! reel-dl - an HTTP API over an external media extraction engine.
//!
//! Clients submit a media-page URL, read back metadata with a fixed pair of
//! format choices, and pull the chosen rendition as a one-shot binary
//! stream. Site parsing, format negotiation and transcoding all happen
//! inside the engine (`yt-dlp`); this crate is the orchestration around it.
//!
//! # Example
//!
//! ```no_run
//! use reel_dl::{AppConfig, Extractor};
//!
//! # async fn example() -> reel_dl::Result<()> {
//! let config = AppConfig::from_env()?;
//! let extractor = Extractor::new(&config)?;
//!
//! // Look up what a page offers...
//! let info = extractor.fetch_metadata("https://example.com/watch?v=abc").await?;
//! println!("{:?} offers {} formats", info.title, info.formats.len());
//!
//! // ...then pull the default rendition.
//! let path = extractor.download("https://example.com/watch?v=abc", "best").await?;
//! println!("saved to {}", path.display());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod url;

// Re-export main types for convenience
pub use config::{ApiConfig, AppConfig};
pub use engine::{Engine, FetchRequest, ProbeInfo, YtDlp};
pub use error::{Error, Result};
pub use extract::{Extractor, FormatOption, MediaInfo, offered_formats};
