use std::time::Duration;

pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: String, value: String },
}

/// Language model connection settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Set for Azure OpenAI deployments: switches to the `api-key` header and
    /// the `api-version` query parameter.
    pub api_version: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TutorConfig {
    pub database_url: String,
    pub llm: LlmConfig,
    pub port: u16,
    pub require_https: bool,
    pub session_idle_ttl: Duration,
    pub sweep_interval: Duration,
}

impl TutorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Reports every missing required variable at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            missing.push("DATABASE_URL".to_string());
        }
        let api_key = get("LLM_API_KEY");
        if api_key.is_none() {
            missing.push("LLM_API_KEY".to_string());
        }
        let (Some(database_url), Some(api_key)) = (database_url, api_key) else {
            return Err(ConfigError::Missing(missing));
        };

        let number = |name: &str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: name.to_string(),
                    value,
                }),
                None => Ok(default),
            }
        };

        let port = u16::try_from(number("PORT", 3000)?).map_err(|_| ConfigError::Invalid {
            var: "PORT".to_string(),
            value: get("PORT").unwrap_or_default(),
        })?;

        let sweep_secs = number("SESSION_SWEEP_INTERVAL_SECS", 60)?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SESSION_SWEEP_INTERVAL_SECS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url,
            llm: LlmConfig {
                endpoint: get("LLM_ENDPOINT").unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
                api_key,
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                api_version: get("LLM_API_VERSION"),
                timeout: Duration::from_secs(number("LLM_TIMEOUT_SECS", 60)?),
            },
            port,
            require_https: get("SOCRA_REQUIRE_HTTPS").is_some_and(|v| v == "true"),
            session_idle_ttl: Duration::from_secs(number("SESSION_IDLE_TTL_SECS", 3600)?),
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}
