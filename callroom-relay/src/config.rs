//! Configuration system for the Callroom relay server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/callroom/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

/// Default OpenAI-compatible chat-completions endpoint.
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for the connectivity probe.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CallroomConfigFile {
    server: ServerFileConfig,
    rate_limit: RateLimitFileConfig,
    openai: OpenAiFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    frontend_url: Option<String>,
    max_frame_size: Option<usize>,
    outbound_queue: Option<usize>,
}

/// `[rate_limit]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RateLimitFileConfig {
    window_secs: Option<u64>,
    max_requests: Option<u32>,
}

/// `[openai]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct OpenAiFileConfig {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Callroom voice relay server")]
pub struct CliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "CALLROOM_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/callroom/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Origin allowed by CORS.
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Maximum WebSocket message and HTTP body size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Frames buffered per client before further relays to it are dropped.
    #[arg(long)]
    pub outbound_queue: Option<usize>,

    /// Length of the `/api` rate-limit window in seconds.
    #[arg(long)]
    pub rate_limit_window_secs: Option<u64>,

    /// Requests allowed per client IP within one rate-limit window.
    #[arg(long)]
    pub rate_limit_max: Option<u32>,

    /// API key for the language-model connectivity probe.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat-completions endpoint used by the connectivity probe.
    #[arg(long)]
    pub openai_endpoint: Option<String>,

    /// Model used by the connectivity probe.
    #[arg(long)]
    pub openai_model: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CALLROOM_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Per-IP fixed-window limits applied to `/api` routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of one counting window.
    pub window: Duration,
    /// Requests allowed per client within one window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
        }
    }
}

/// Settings for the language-model connectivity probe.
#[derive(Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    /// API key; the probe fails without contacting the provider when unset.
    pub api_key: Option<String>,
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Model name sent with the probe request.
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

// Keeps the API key out of logs.
impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct CallroomConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:5000`).
    pub bind_addr: String,
    /// Origin allowed by CORS.
    pub frontend_url: String,
    /// Maximum WebSocket message and HTTP body size in bytes.
    pub max_frame_size: usize,
    /// Frames buffered per client before further relays to it are dropped.
    pub outbound_queue: usize,
    /// `/api` rate limiting.
    pub rate_limit: RateLimitConfig,
    /// Language-model probe settings.
    pub openai: OpenAiConfig,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for CallroomConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            max_frame_size: 10 * 1024 * 1024,
            outbound_queue: 64,
            rate_limit: RateLimitConfig::default(),
            openai: OpenAiConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl CallroomConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, file))
    }

    /// Resolve a `CallroomConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: CallroomConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            frontend_url: cli
                .frontend_url
                .clone()
                .or(file.server.frontend_url)
                .unwrap_or(defaults.frontend_url),
            max_frame_size: cli
                .max_frame_size
                .or(file.server.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            outbound_queue: cli
                .outbound_queue
                .or(file.server.outbound_queue)
                .unwrap_or(defaults.outbound_queue),
            rate_limit: RateLimitConfig {
                window: cli
                    .rate_limit_window_secs
                    .or(file.rate_limit.window_secs)
                    .map_or(defaults.rate_limit.window, Duration::from_secs),
                max_requests: cli
                    .rate_limit_max
                    .or(file.rate_limit.max_requests)
                    .unwrap_or(defaults.rate_limit.max_requests),
            },
            openai: OpenAiConfig {
                api_key: cli
                    .openai_api_key
                    .clone()
                    .or(file.openai.api_key)
                    .filter(|key| !key.is_empty()),
                endpoint: cli
                    .openai_endpoint
                    .clone()
                    .or(file.openai.endpoint)
                    .unwrap_or(defaults.openai.endpoint),
                model: cli
                    .openai_model
                    .clone()
                    .or(file.openai.model)
                    .unwrap_or(defaults.openai.model),
            },
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<CallroomConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(CallroomConfigFile::default());
        };
        config_dir.join("callroom").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CallroomConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
