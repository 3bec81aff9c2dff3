use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub keep_alive: KeepAliveConfig,
    pub news: NewsSettings,
    pub environment: Environment,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub application_id: String,
    /// Discord user IDs allowed to use any command.
    pub authorized_users: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct KeepAliveConfig {
    /// Externally reachable URL to self-ping. Keep-alive is disabled when unset.
    pub url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewsSettings {
    pub dry_run: bool,
    pub check_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub application_id: Option<String>,
    pub authorized_users: Option<Vec<String>>,
    pub database_url: Option<String>,
    pub keep_alive_url: Option<String>,
    pub news_dry_run: Option<bool>,
    pub environment: Option<Environment>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig {
                bot_token: String::new().into(),
                application_id: String::new(),
                authorized_users: Vec::new(),
            },
            database: DatabaseConfig {
                url: "sqlite://brobot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 3000 },
            keep_alive: KeepAliveConfig { url: None },
            news: NewsSettings { dry_run: false, check_interval_secs: 300 },
            environment: Environment::Development,
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::Validation(format!(
                "unsupported environment `{other}` (expected development|production)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Layered load: defaults, then an optional `brobot.toml` patch (with
    /// `${ENV_VAR}` interpolation), then `BROBOT_*` environment overrides,
    /// then programmatic overrides, then validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("brobot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(discord) = patch.discord {
            if let Some(token) = discord.bot_token {
                self.discord.bot_token = token.into();
            }
            if let Some(application_id) = discord.application_id {
                self.discord.application_id = application_id;
            }
            if let Some(users) = discord.authorized_users {
                self.discord.authorized_users = users;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(keep_alive) = patch.keep_alive {
            if let Some(url) = keep_alive.url {
                self.keep_alive.url = Some(url);
            }
        }

        if let Some(news) = patch.news {
            if let Some(dry_run) = news.dry_run {
                self.news.dry_run = dry_run;
            }
            if let Some(check_interval_secs) = news.check_interval_secs {
                self.news.check_interval_secs = check_interval_secs;
            }
        }

        if let Some(environment) = patch.environment {
            self.environment = environment;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BROBOT_DISCORD_TOKEN") {
            self.discord.bot_token = value.into();
        }
        if let Some(value) = read_env("BROBOT_CLIENT_ID") {
            self.discord.application_id = value;
        }
        if let Some(value) = read_env("BROBOT_AUTHORIZED_USERS") {
            self.discord.authorized_users = split_id_list(&value);
        }

        if let Some(value) = read_env("BROBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BROBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("BROBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BROBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BROBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BROBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BROBOT_PORT") {
            self.server.port = parse_u16("BROBOT_PORT", &value)?;
        }

        if let Some(value) = read_env("BROBOT_KEEP_ALIVE_URL") {
            self.keep_alive.url = Some(value);
        }

        if let Some(value) = read_env("BROBOT_NEWS_DRY_RUN") {
            self.news.dry_run = parse_bool("BROBOT_NEWS_DRY_RUN", &value)?;
        }
        if let Some(value) = read_env("BROBOT_NEWS_CHECK_INTERVAL_SECS") {
            self.news.check_interval_secs = parse_u64("BROBOT_NEWS_CHECK_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("BROBOT_ENVIRONMENT") {
            self.environment = value.parse()?;
        }

        if let Some(value) = read_env("BROBOT_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("BROBOT_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.discord.bot_token = bot_token.into();
        }
        if let Some(application_id) = overrides.application_id {
            self.discord.application_id = application_id;
        }
        if let Some(authorized_users) = overrides.authorized_users {
            self.discord.authorized_users = authorized_users;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(keep_alive_url) = overrides.keep_alive_url {
            self.keep_alive.url = Some(keep_alive_url);
        }
        if let Some(news_dry_run) = overrides.news_dry_run {
            self.news.dry_run = news_dry_run;
        }
        if let Some(environment) = overrides.environment {
            self.environment = environment;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        if self.discord.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation("discord.bot_token must be set".to_string()));
        }
        if self.discord.application_id.trim().is_empty() {
            return Err(ConfigError::Validation("discord.application_id must be set".to_string()));
        }
        for user_id in &self.discord.authorized_users {
            if user_id.is_empty() || !user_id.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(ConfigError::Validation(format!(
                    "discord.authorized_users contains a non-numeric id: `{user_id}`"
                )));
            }
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must be set".to_string()));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if let Some(url) = &self.keep_alive.url {
            url::Url::parse(url).map_err(|_| {
                ConfigError::Validation(format!("keep_alive.url is not a valid URL: `{url}`"))
            })?;
        }

        if self.news.check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "news.check_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Splits a comma-separated ID list, dropping empty segments.
pub fn split_id_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|id| !id.is_empty()).map(str::to_owned).collect()
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("brobot.toml"), PathBuf::from("config/brobot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(inner) => key.push(inner),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
        } else {
            output.push(ch);
        }
    }

    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_owned(), value: value.to_owned() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_owned(), value: value.to_owned() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_owned(), value: value.to_owned() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_owned(), value: value.to_owned() }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    discord: Option<DiscordPatch>,
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    keep_alive: Option<KeepAlivePatch>,
    news: Option<NewsPatch>,
    environment: Option<Environment>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    bot_token: Option<String>,
    application_id: Option<String>,
    authorized_users: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct KeepAlivePatch {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NewsPatch {
    dry_run: Option<bool>,
    check_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
