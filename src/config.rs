//! Configuration for the relay.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TELEGRAM_BOT_TOKEN, API_URL_TRANSCRIBE, ...)
//! 2. Config file (.whisper-relay/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - An explicit path (`--config` / WHISPER_RELAY_CONFIG) wins
//! - Otherwise searches current directory and parents for .whisper-relay/config.yaml
//! - Finally falls back to <config dir>/whisper-relay/config.yaml
//!
//! The resolved configuration is loaded once at startup and passed down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::adapters::{GradioBackend, InferenceBackend, TelegramConfig};
use crate::core::{Backends, DispatchSettings, IntakeLimits};
use crate::ingest::media::{default_extensions, MediaLimits};

const CONFIG_DIR_NAME: &str = ".whisper-relay";
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub backends: BackendsSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub media: MediaSection,
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendSection {
    pub api_url: Option<String>,
    pub hf_token: Option<String>,
    pub api_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendsSection {
    #[serde(default)]
    pub transcribe: BackendSection,
    #[serde(default)]
    pub diarize: BackendSection,
    /// Per-call timeout (0 = wait forever)
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsSection {
    pub max_simultaneous_requests: Option<usize>,
    pub user_rate_limit: Option<usize>,
    /// Rate window in seconds
    pub user_request_time: Option<u64>,
    pub max_message_length: Option<usize>,
    pub ordering_unit_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaSection {
    pub max_file_size: Option<u64>,
    pub max_duration_seconds: Option<u32>,
    pub supported_file_extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotSection {
    pub command_transcribe: Option<String>,
    pub command_diarize: Option<String>,
    pub instant_reply_in_groups: Option<bool>,
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    pub log_file: Option<String>,
}

/// Connection details for one inference backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub api_url: String,
    pub hf_token: Option<String>,
    pub api_name: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,

    pub bot_token: Option<String>,
    pub telegram_api_base: Option<String>,

    pub transcribe_backend: Option<BackendEndpoint>,
    pub diarize_backend: Option<BackendEndpoint>,
    /// `None` means backend calls are never cut off
    pub backend_timeout: Option<Duration>,

    pub max_simultaneous_requests: usize,
    pub user_rate_limit: usize,
    pub user_request_time: Duration,
    pub max_message_length: usize,
    pub ordering_unit_delay: Duration,

    pub media: MediaLimits,

    pub command_transcribe: String,
    pub command_diarize: String,
    pub instant_reply_in_groups: bool,
    pub admin_ids: Vec<i64>,

    pub log_file: Option<PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            bot_token: None,
            telegram_api_base: None,
            transcribe_backend: None,
            diarize_backend: None,
            backend_timeout: Some(Duration::from_secs(600)),
            max_simultaneous_requests: 0,
            user_rate_limit: 0,
            user_request_time: Duration::ZERO,
            max_message_length: 4096,
            ordering_unit_delay: Duration::from_millis(150),
            media: MediaLimits::default(),
            command_transcribe: "transcribe".to_string(),
            command_diarize: "diarize".to_string(),
            instant_reply_in_groups: false,
            admin_ids: Vec::new(),
            log_file: None,
        }
    }
}

impl ResolvedConfig {
    pub fn intake_limits(&self) -> IntakeLimits {
        IntakeLimits {
            max_simultaneous_requests: self.max_simultaneous_requests,
            user_rate_limit: self.user_rate_limit,
            user_request_time: self.user_request_time,
            ordering_unit_delay: self.ordering_unit_delay,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            max_message_length: self.max_message_length,
            backend_timeout: self.backend_timeout,
        }
    }

    pub fn telegram_config(&self) -> Option<TelegramConfig> {
        self.bot_token.as_ref().map(|token| TelegramConfig {
            bot_token: token.clone(),
            api_base: self.telegram_api_base.clone(),
        })
    }

    /// Build inference clients for every configured backend
    pub fn backends(&self) -> Backends {
        fn build(endpoint: &Option<BackendEndpoint>, name: &str) -> Option<Arc<dyn InferenceBackend>> {
            let Some(endpoint) = endpoint else {
                warn!("{} backend URL not set, the bot can't {}", name, name);
                return None;
            };
            let mut backend = GradioBackend::new(&endpoint.api_url, endpoint.hf_token.clone());
            if let Some(api_name) = &endpoint.api_name {
                backend = backend.with_api_name(api_name);
            }
            let backend: Arc<dyn InferenceBackend> = Arc::new(backend);
            Some(backend)
        }

        Backends {
            transcribe: build(&self.transcribe_backend, "transcribe"),
            diarize: build(&self.diarize_backend, "diarize"),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let user_config = dirs::config_dir()?.join("whisper-relay").join(CONFIG_FILE_NAME);
    user_config.exists().then_some(user_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match non_empty(env(name)) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
    }
}

fn parse_bool_env(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<bool>, ConfigError> {
    match non_empty(env(name)) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        },
    }
}

fn parse_ids_env(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<Vec<i64>>, ConfigError> {
    match non_empty(env(name)) {
        None => Ok(None),
        Some(value) => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
    }
}

fn endpoint(
    section: &BackendSection,
    url_env: Option<String>,
    token_env: Option<String>,
) -> Option<BackendEndpoint> {
    let api_url = non_empty(url_env).or_else(|| non_empty(section.api_url.clone()))?;
    Some(BackendEndpoint {
        api_url,
        hf_token: non_empty(token_env).or_else(|| non_empty(section.hf_token.clone())),
        api_name: non_empty(section.api_name.clone()),
    })
}

/// Merge a parsed config file with environment overrides
pub fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let defaults = ResolvedConfig::default();

    let timeout_seconds = parse_env::<u64>(env, "BACKEND_TIMEOUT_SECONDS")?
        .or(file.backends.timeout_seconds);
    let backend_timeout = match timeout_seconds {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => defaults.backend_timeout,
    };

    let media = MediaLimits {
        max_file_size: parse_env(env, "MAX_FILE_SIZE")?
            .or(file.media.max_file_size)
            .unwrap_or(defaults.media.max_file_size),
        max_duration_seconds: parse_env(env, "MAX_DURATION_SECONDS")?
            .or(file.media.max_duration_seconds)
            .unwrap_or(defaults.media.max_duration_seconds),
        supported_extensions: file
            .media
            .supported_file_extensions
            .map(|exts| exts.into_iter().map(|e| e.to_ascii_lowercase()).collect())
            .unwrap_or_else(default_extensions),
    };

    Ok(ResolvedConfig {
        config_file,
        bot_token: non_empty(env("TELEGRAM_BOT_TOKEN"))
            .or_else(|| non_empty(file.telegram.bot_token.clone())),
        telegram_api_base: non_empty(file.telegram.api_base.clone()),
        transcribe_backend: endpoint(
            &file.backends.transcribe,
            env("API_URL_TRANSCRIBE"),
            env("HF_TOKEN_TRANSCRIBE"),
        ),
        diarize_backend: endpoint(
            &file.backends.diarize,
            env("API_URL_DIARIZE"),
            env("HF_TOKEN_DIARIZE"),
        ),
        backend_timeout,
        max_simultaneous_requests: parse_env(env, "MAX_SIMULTANEOUS_REQUESTS")?
            .or(file.limits.max_simultaneous_requests)
            .unwrap_or(defaults.max_simultaneous_requests),
        user_rate_limit: parse_env(env, "USER_RATE_LIMIT")?
            .or(file.limits.user_rate_limit)
            .unwrap_or(defaults.user_rate_limit),
        user_request_time: parse_env::<u64>(env, "USER_REQUEST_TIME")?
            .or(file.limits.user_request_time)
            .map(Duration::from_secs)
            .unwrap_or(defaults.user_request_time),
        max_message_length: parse_env(env, "MAX_MESSAGE_LENGTH")?
            .or(file.limits.max_message_length)
            .unwrap_or(defaults.max_message_length),
        ordering_unit_delay: parse_env::<u64>(env, "ORDERING_UNIT_DELAY_MS")?
            .or(file.limits.ordering_unit_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.ordering_unit_delay),
        media,
        command_transcribe: non_empty(env("COMMAND_TRANSCRIBE"))
            .or(file.bot.command_transcribe)
            .unwrap_or(defaults.command_transcribe),
        command_diarize: non_empty(env("COMMAND_DIARIZE"))
            .or(file.bot.command_diarize)
            .unwrap_or(defaults.command_diarize),
        instant_reply_in_groups: parse_bool_env(env, "INSTANT_REPLY_IN_GROUPS")?
            .or(file.bot.instant_reply_in_groups)
            .unwrap_or(defaults.instant_reply_in_groups),
        admin_ids: parse_ids_env(env, "ADMIN_ID")?.unwrap_or(file.bot.admin_ids),
        log_file: non_empty(env("LOG_FILENAME"))
            .or(file.logging.log_file)
            .map(PathBuf::from),
    })
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let config_file = match explicit {
        Some(path) if !path.exists() => {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let env = |name: &str| std::env::var(name).ok();
    Ok(resolve(file, config_file, &env)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = resolve(ConfigFile::default(), None, &env_from(&[])).unwrap();

        assert_eq!(config.max_simultaneous_requests, 0);
        assert_eq!(config.user_rate_limit, 0);
        assert_eq!(config.max_message_length, 4096);
        assert_eq!(config.ordering_unit_delay, Duration::from_millis(150));
        assert_eq!(config.backend_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.command_transcribe, "transcribe");
        assert!(config.transcribe_backend.is_none());
        assert!(config.bot_token.is_none());
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let relay_dir = temp.path().join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&relay_dir).unwrap();

        let config_path = relay_dir.join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1"
telegram:
  bot_token: "123:abc"
backends:
  transcribe:
    api_url: https://whisper.hf.space/
  timeout_seconds: 0
limits:
  max_simultaneous_requests: 3
  user_rate_limit: 5
  user_request_time: 60
media:
  supported_file_extensions: [OGA, mp3]
bot:
  admin_ids: [1, -100]
logging:
  log_file: bot.log
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let config = resolve(parsed, Some(config_path), &env_from(&[])).unwrap();

        assert_eq!(config.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(
            config.transcribe_backend.unwrap().api_url,
            "https://whisper.hf.space/"
        );
        assert!(config.diarize_backend.is_none());
        assert_eq!(config.backend_timeout, None);
        assert_eq!(config.max_simultaneous_requests, 3);
        assert_eq!(config.user_rate_limit, 5);
        assert_eq!(config.user_request_time, Duration::from_secs(60));
        assert_eq!(config.media.supported_extensions, vec!["oga", "mp3"]);
        assert_eq!(config.admin_ids, vec![1, -100]);
        assert_eq!(config.log_file, Some(PathBuf::from("bot.log")));
    }

    #[test]
    fn test_env_overrides_file() {
        let file: ConfigFile = serde_yaml::from_str(
            r#"
backends:
  diarize:
    api_url: http://from-file
    hf_token: file-token
limits:
  max_simultaneous_requests: 3
"#,
        )
        .unwrap();

        let env = env_from(&[
            ("API_URL_DIARIZE", "http://from-env"),
            ("MAX_SIMULTANEOUS_REQUESTS", "8"),
            ("ADMIN_ID", "1, 2,3"),
            ("INSTANT_REPLY_IN_GROUPS", "true"),
        ]);
        let config = resolve(file, None, &env).unwrap();

        let diarize = config.diarize_backend.unwrap();
        assert_eq!(diarize.api_url, "http://from-env");
        assert_eq!(diarize.hf_token.as_deref(), Some("file-token"));
        assert_eq!(config.max_simultaneous_requests, 8);
        assert_eq!(config.admin_ids, vec![1, 2, 3]);
        assert!(config.instant_reply_in_groups);
    }

    #[test]
    fn test_invalid_env_value() {
        let env = env_from(&[("USER_RATE_LIMIT", "lots")]);
        let result = resolve(ConfigFile::default(), None, &env);
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn test_missing_explicit_config() {
        let result = load_config(Some(Path::new("/definitely/not/here.yaml")));
        assert!(result.is_err());
    }
}
