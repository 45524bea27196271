use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub llm: LLMConfig,
    pub places: PlacesConfig,
    pub router: RouterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub primary_provider: String,
    pub primary_model: String,
    pub secondary_provider: Option<String>,
    pub secondary_model: Option<String>,
    pub openai_api_key: String,
    pub gemini_api_key: String,
    pub groq_api_key: String,
    pub openrouter_api_key: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacesConfig {
    pub google_maps_api_key: String,
    pub serpapi_key: String,
    /// RapidAPI key for the Booking.com hotel search
    pub rapidapi_key: String,
    pub language: String,
    pub max_results: usize,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub history_window: usize,
    pub min_keyword_signal: usize,
    pub max_suggestions: usize,
    pub agent_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Unknown LOG_FORMAT: {}", other)),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            primary_provider: "gemini".to_string(),
            primary_model: "gemini-1.5-flash".to_string(),
            secondary_provider: Some("openai".to_string()),
            secondary_model: Some("gpt-4o-mini".to_string()),
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
            groq_api_key: String::new(),
            openrouter_api_key: String::new(),
            timeout_secs: 30,
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            google_maps_api_key: String::new(),
            serpapi_key: String::new(),
            rapidapi_key: String::new(),
            language: "vi".to_string(),
            max_results: 5,
            timeout_secs: 15,
            requests_per_second: 5,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            min_keyword_signal: 3,
            max_suggestions: 5,
            agent_timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            directory: None,
        }
    }
}

impl LLMConfig {
    /// API key for a provider id, if one is configured
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        let key = match provider {
            "openai" => &self.openai_api_key,
            "gemini" | "google" => &self.gemini_api_key,
            "groq" => &self.groq_api_key,
            "openrouter" => &self.openrouter_api_key,
            _ => return None,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PlacesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RouterConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        _ => Ok(default),
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let database = match optional_var("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_var("DB_MAX_CONNECTIONS", 10)?,
                min_connections: parse_var("DB_MIN_CONNECTIONS", 1)?,
            }),
            None => None,
        };

        let logging = LoggingConfig {
            format: parse_var("LOG_FORMAT", defaults.logging.format)
                .context("LOG_FORMAT must be `pretty` or `json`")?,
            directory: optional_var("LOG_DIR"),
        };

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", defaults.server.port)?,
                host: var_or("HOST", &defaults.server.host),
                cors_allowed_origins: match optional_var("ALLOWED_ORIGINS") {
                    Some(raw) => raw
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                    None => defaults.server.cors_allowed_origins,
                },
            },
            database,
            llm: LLMConfig {
                primary_provider: var_or("LLM_PRIMARY_PROVIDER", &defaults.llm.primary_provider),
                primary_model: var_or("LLM_PRIMARY_MODEL", &defaults.llm.primary_model),
                secondary_provider: optional_var("LLM_SECONDARY_PROVIDER")
                    .or(defaults.llm.secondary_provider),
                secondary_model: optional_var("LLM_SECONDARY_MODEL")
                    .or(defaults.llm.secondary_model),
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
                openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                timeout_secs: parse_var("LLM_TIMEOUT_SECS", defaults.llm.timeout_secs)?,
                max_tokens: parse_var("LLM_MAX_TOKENS", defaults.llm.max_tokens)?,
                temperature: parse_var("LLM_TEMPERATURE", defaults.llm.temperature)?,
            },
            places: PlacesConfig {
                google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY").unwrap_or_default(),
                serpapi_key: env::var("SERPAPI_KEY").unwrap_or_default(),
                rapidapi_key: env::var("RAPIDAPI_KEY").unwrap_or_default(),
                language: var_or("PLACES_LANGUAGE", &defaults.places.language),
                max_results: parse_var("PLACES_MAX_RESULTS", defaults.places.max_results)?,
                timeout_secs: parse_var("PLACES_TIMEOUT_SECS", defaults.places.timeout_secs)?,
                requests_per_second: parse_var(
                    "PLACES_REQUESTS_PER_SECOND",
                    defaults.places.requests_per_second,
                )?,
            },
            router: RouterConfig {
                history_window: parse_var("HISTORY_WINDOW", defaults.router.history_window)?,
                min_keyword_signal: parse_var(
                    "MIN_KEYWORD_SIGNAL",
                    defaults.router.min_keyword_signal,
                )?,
                max_suggestions: parse_var("MAX_SUGGESTIONS", defaults.router.max_suggestions)?,
                agent_timeout_secs: parse_var(
                    "AGENT_TIMEOUT_SECS",
                    defaults.router.agent_timeout_secs,
                )?,
            },
            logging,
        })
    }
}
