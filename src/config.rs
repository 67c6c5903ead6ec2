use std::{env, net::IpAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use tracing::warn;

const DEFAULT_SECRET_KEY: &str = "dev-secret-change-me";
const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";
const DEFAULT_SEED_USERNAME: &str = "demo-user";
const DEFAULT_SEED_PASSWORD: &str = "change-me";

/// Which flavour of chat-completions API the provider speaks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderKind {
    /// Any OpenAI compatible endpoint (OpenAI, OpenRouter, local gateways).
    OpenAi,
    Azure,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(ProviderKind::OpenAi),
            "azure" | "azure-openai" => Ok(ProviderKind::Azure),
            other => bail!("unsupported LLM_PROVIDER value: {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub api_version: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct LimitSettings {
    pub max_file_bytes: usize,
    pub max_batch_files: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_batch_files: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            verify_tls: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub secret_key: String,
    pub token_ttl_minutes: i64,
    /// Marks the session cookie `Secure`; enable when served over HTTPS.
    pub secure_cookie: bool,
    pub seed_username: String,
    pub seed_password: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub provider: ProviderSettings,
    pub limits: LimitSettings,
    pub fetch: FetchSettings,
    pub auth: AuthSettings,
    pub database_url: Option<String>,
    pub audit_log_path: Option<String>,
    pub record_failed_single: bool,
}

impl AppConfig {
    /// Load configuration from the process environment (after `.env` has been applied).
    pub fn from_env() -> Result<Self> {
        let host = optional_var("HOST")
            .unwrap_or_else(|| "127.0.0.1".to_string())
            .parse::<IpAddr>()
            .context("HOST must be an IP address")?;
        let port = parse_var("PORT", 8080_u16)?;

        let azure_endpoint = optional_var("AZURE_OPENAI_ENDPOINT");
        let kind = match optional_var("LLM_PROVIDER") {
            Some(value) => value.parse::<ProviderKind>()?,
            None if azure_endpoint.is_some() => ProviderKind::Azure,
            None => ProviderKind::OpenAi,
        };
        let endpoint = optional_var("LLM_ENDPOINT")
            .or(azure_endpoint)
            .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string());
        let api_key = optional_var("LLM_API_KEY").or_else(|| optional_var("AZURE_OPENAI_API_KEY"));
        let model = optional_var("LLM_MODEL")
            .or_else(|| optional_var("AZURE_OPENAI_DEPLOYMENT"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_version = optional_var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
        let llm_timeout = parse_var("LLM_TIMEOUT_SECS", 60_u64)?;

        let max_file_mb = parse_var("MAX_FILE_SIZE_MB", 10_usize)?;
        let max_batch_files = parse_var("MAX_BATCH_FILES", 10_usize)?;
        if max_file_mb == 0 || max_batch_files == 0 {
            bail!("MAX_FILE_SIZE_MB and MAX_BATCH_FILES must be greater than zero");
        }

        let fetch_timeout = parse_var("URL_FETCH_TIMEOUT_SECS", 10_u64)?;
        let verify_tls = parse_bool_var("VERIFY_SSL_CERTIFICATES", true)?;

        let secret_key =
            optional_var("SECRET_KEY").unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string());
        let token_ttl_minutes = parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", 60_i64)?;
        if token_ttl_minutes <= 0 {
            bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        }

        let config = Self {
            host,
            port,
            provider: ProviderSettings {
                kind,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key,
                model,
                api_version,
                timeout: Duration::from_secs(llm_timeout),
            },
            limits: LimitSettings {
                max_file_bytes: max_file_mb * 1024 * 1024,
                max_batch_files,
            },
            fetch: FetchSettings {
                timeout: Duration::from_secs(fetch_timeout),
                verify_tls,
            },
            auth: AuthSettings {
                secret_key,
                token_ttl_minutes,
                secure_cookie: parse_bool_var("SESSION_COOKIE_SECURE", false)?,
                seed_username: optional_var("SEED_USERNAME")
                    .unwrap_or_else(|| DEFAULT_SEED_USERNAME.to_string()),
                seed_password: optional_var("SEED_PASSWORD")
                    .unwrap_or_else(|| DEFAULT_SEED_PASSWORD.to_string()),
            },
            database_url: optional_var("DATABASE_URL"),
            audit_log_path: optional_var("AUDIT_LOG_PATH"),
            record_failed_single: parse_bool_var("HISTORY_RECORD_FAILED", false)?,
        };

        config.warn_on_insecure_defaults();
        Ok(config)
    }

    /// Upper bound for a whole request body: every batch slot at full size plus form overhead.
    pub fn max_body_bytes(&self) -> usize {
        self.limits
            .max_file_bytes
            .saturating_mul(self.limits.max_batch_files + 2)
    }

    fn warn_on_insecure_defaults(&self) {
        if self.provider.api_key.is_none() {
            warn!("LLM_API_KEY is not configured; summarization calls will fail until it is set");
        }
        if self.auth.secret_key == DEFAULT_SECRET_KEY {
            warn!("SECRET_KEY is using the development default; set it before deploying");
        }
        if !self.fetch.verify_tls {
            warn!("TLS certificate verification is disabled for URL fetches");
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| anyhow!("invalid value for {key} ({raw}): {err}")),
        None => Ok(default),
    }
}

fn parse_bool_var(key: &str, default: bool) -> Result<bool> {
    match optional_var(key) {
        Some(raw) => parse_flag(&raw).ok_or_else(|| anyhow!("invalid boolean for {key}: {raw}")),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            provider: ProviderSettings {
                kind: ProviderKind::OpenAi,
                endpoint: "http://127.0.0.1:9".to_string(),
                api_key: Some("test-key".to_string()),
                model: DEFAULT_MODEL.to_string(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
                timeout: Duration::from_secs(2),
            },
            limits: LimitSettings::default(),
            fetch: FetchSettings {
                timeout: Duration::from_secs(2),
                verify_tls: true,
            },
            auth: AuthSettings {
                secret_key: "test-secret".to_string(),
                token_ttl_minutes: 60,
                secure_cookie: false,
                seed_username: DEFAULT_SEED_USERNAME.to_string(),
                seed_password: DEFAULT_SEED_PASSWORD.to_string(),
            },
            database_url: None,
            audit_log_path: None,
            record_failed_single: false,
        }
    }
}
