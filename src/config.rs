//! Service configuration.
//!
//! Everything configurable lives in one object built at startup and passed
//! down explicitly; nothing reads the environment after that.

use std::path::PathBuf;

/// Default shared secret. Development convenience only; deployments must
/// override it via `AUTH_CODE`.
pub const DEFAULT_ACCESS_CODE: &str = "123456";

/// Default directory downloads are written to, relative to the process
/// working directory.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Shared secret expected in the `X-Access-Code` header and the auth
    /// check body.
    pub access_code: String,
    /// Directory temporary downloads are written to.
    pub download_dir: PathBuf,
    /// API server settings.
    pub api: ApiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            access_code: DEFAULT_ACCESS_CODE.to_string(),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            api: ApiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shared secret.
    #[must_use]
    pub fn with_access_code(mut self, code: impl Into<String>) -> Self {
        self.access_code = code.into();
        self
    }

    /// Sets the download directory.
    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Loads configuration from the environment.
    ///
    /// Recognized variables: `AUTH_CODE` (shared secret), `DOWNLOAD_DIR`,
    /// `HOST` and `PORT` (bind address). Unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but is not a valid port number.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut config = Self::default();
        if let Some(code) = lookup("AUTH_CODE") {
            config.access_code = code;
        }
        if let Some(dir) = lookup("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("HOST") {
            config.api.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.api.port = port
                .parse()
                .map_err(|e| crate::Error::Config(format!("PORT must be a port number: {e}")))?;
        }
        Ok(config)
    }
}
