//! Configuration types for the chat client.
//!
//! Values are layered: command-line arguments override a YAML file, which overrides the
//! environment, which overrides the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the API base URL.
pub const BASE_URL_ENV: &str = "PETCHAT_API_BASE_URL";

/// Default base URL when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Path of the chat endpoint under the base URL.
pub const DEFAULT_CHAT_PATH: &str = "/api/chat";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Prefix put in front of error text surfaced as an assistant message.
pub const DEFAULT_ERROR_PREFIX: &str = "에러: ";

const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;
const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;

/// Command-line arguments for the petchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// YAML configuration file.
    #[arrrg(optional, "Path to a YAML configuration file", "PATH")]
    pub config: Option<String>,

    /// Base URL of the dashboard API.
    #[arrrg(optional, "API base URL (default: $PETCHAT_API_BASE_URL or http://localhost:3000)", "URL")]
    pub base_url: Option<String>,

    /// Model to request.
    #[arrrg(optional, "Model to use (default: gpt-4.1)", "MODEL")]
    pub model: Option<String>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature (default: 0.7)", "TEMP")]
    pub temperature: Option<String>,

    /// Signed-in user.
    #[arrrg(optional, "User identifier to chat as", "USER")]
    pub user: Option<String>,

    /// Active pet.
    #[arrrg(optional, "Animal identifier the conversation is about", "ANIMAL")]
    pub animal: Option<String>,

    /// Use the offline echo transport.
    #[arrrg(flag, "Answer locally with canned replies instead of calling the API")]
    pub mock: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration for a chat client and session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the dashboard API. A trailing `/` is ignored.
    pub base_url: String,

    /// Path of the chat endpoint under `base_url`.
    pub chat_path: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Sampling temperature sent with every request.
    pub temperature: f32,

    /// Time allowed for the response head to arrive, in milliseconds. The body is not bounded.
    pub timeout_ms: u64,

    /// Retries for requests that fail before any response arrives. Zero disables retrying.
    pub max_retries: u32,

    /// First retry delay, in milliseconds. Doubles on every further attempt.
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Prefix for error text surfaced into the transcript.
    pub error_prefix: String,

    /// Send the whole conversation instead of only the newest message.
    pub include_history: bool,

    /// Extra `Cookie` header sent with every request.
    pub cookie: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// The environment is not consulted; see [`ChatConfig::from_env`].
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: 0,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            error_prefix: DEFAULT_ERROR_PREFIX.to_string(),
            include_history: false,
            cookie: None,
            use_color: true,
        }
    }

    /// Creates the default configuration with the base URL taken from `PETCHAT_API_BASE_URL`.
    pub fn from_env() -> Self {
        Self::new().with_env()
    }

    /// Overrides the base URL from `PETCHAT_API_BASE_URL` when it is set and non-empty.
    pub fn with_env(mut self) -> Self {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV)
            && !base_url.trim().is_empty()
        {
            self.base_url = base_url.trim().to_string();
        }
        self
    }

    /// Loads a configuration from a YAML file. Missing keys come from the environment and the
    /// defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config {}", path.display()), err)
        })?;
        Self::from_yaml(&content, &Self::from_env())
    }

    /// Parses YAML `content` on top of `base`. Keys the document leaves out keep `base`'s value.
    pub fn from_yaml(content: &str, base: &Self) -> Result<Self> {
        let overlay: serde_yaml::Value = serde_yaml::from_str(content)?;
        let overlay = match overlay {
            serde_yaml::Value::Null => return Ok(base.clone()),
            serde_yaml::Value::Mapping(overlay) => overlay,
            _ => {
                return Err(Error::validation(
                    "config file must be a mapping of keys to values",
                    None,
                ));
            }
        };
        let mut merged = match serde_yaml::to_value(base)? {
            serde_yaml::Value::Mapping(merged) => merged,
            _ => serde_yaml::Mapping::new(),
        };
        for (key, value) in overlay {
            merged.insert(key, value);
        }
        Ok(serde_yaml::from_value(serde_yaml::Value::Mapping(merged))?)
    }

    /// Resolves command-line arguments against the file, environment and defaults.
    pub fn from_args(args: &ChatArgs) -> Result<Self> {
        let base = match &args.config {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::from_env(),
        };
        let mut config = base;
        if let Some(base_url) = &args.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(model) = &args.model {
            config.model = model.clone();
        }
        if let Some(temperature) = &args.temperature {
            config.temperature = temperature.trim().parse().map_err(|_| {
                Error::validation(
                    format!("temperature {temperature:?} is not a number"),
                    Some("temperature".to_string()),
                )
            })?;
        }
        if args.no_color {
            config.use_color = false;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise fail at request time.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::validation(
                format!("temperature {} is outside 0.0..=2.0", self.temperature),
                Some("temperature".to_string()),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(Error::validation(
                "timeout must be greater than zero",
                Some("timeout_ms".to_string()),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::validation(
                "model must not be empty",
                Some("model".to_string()),
            ));
        }
        self.endpoint().map(|_| ())
    }

    /// Returns the absolute URL of the chat endpoint.
    pub fn endpoint(&self) -> Result<url::Url> {
        let base = self.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::validation(
                "base URL is not configured",
                Some("base_url".to_string()),
            ));
        }
        let path = self.chat_path.trim_start_matches('/');
        Ok(url::Url::parse(&format!("{base}/{path}"))?)
    }

    /// Returns how long to wait for the response head.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the delay before retry number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets how long to wait for the response head. Sub-millisecond parts are dropped.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables retrying with the given number of attempts and backoff bounds.
    pub fn with_retries(mut self, max_retries: u32, initial: Duration, max: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Sets the prefix for surfaced errors.
    pub fn with_error_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.error_prefix = prefix.into();
        self
    }

    /// Sets whether the whole conversation is sent.
    pub fn with_history(mut self, include_history: bool) -> Self {
        self.include_history = include_history;
        self
    }

    /// Sets a cookie header sent with every request.
    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}
