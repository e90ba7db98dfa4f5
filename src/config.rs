use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub admin_password_hash: Option<String>,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    pub app_origin: Option<String>,
    pub whatsapp_verify_token: String,
    pub whatsapp_app_secret: Option<String>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_api_base: String,
    pub whatsapp_fallback_template: String,
    pub whatsapp_template_lang: String,
    pub whatsapp_timeout_secs: u64,
    pub admin_cache_ttl_secs: u64,
    pub outbox_worker_enabled: bool,
    pub outbox_max_attempts: i32,
    pub webhook_rps: u32,
    pub app_rps: u32,
    pub onboarding_token_ttl_hours: i64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            db_max_connections: get_env_parse_or("DB_MAX_CONNECTIONS", 20)?,
            jwt_secret: get_env("JWT_SECRET")?,
            admin_password_hash: env::var("ADMIN_PASSWORD_HASH").ok(),
            session_ttl_hours: get_env_parse_or("SESSION_TTL_HOURS", 12)?,
            cookie_secure: get_env_parse_or("COOKIE_SECURE", true)?,
            app_origin: env::var("APP_ORIGIN").ok(),
            whatsapp_verify_token: get_env("WHATSAPP_VERIFY_TOKEN")?,
            whatsapp_app_secret: env::var("WHATSAPP_APP_SECRET").ok(),
            whatsapp_access_token: env::var("WHATSAPP_ACCESS_TOKEN").ok(),
            whatsapp_api_base: env::var("WHATSAPP_API_BASE")
                .unwrap_or_else(|_| "https://graph.facebook.com/v20.0".to_string()),
            whatsapp_fallback_template: env::var("WHATSAPP_FALLBACK_TEMPLATE")
                .unwrap_or_else(|_| "hello_world".to_string()),
            whatsapp_template_lang: env::var("WHATSAPP_TEMPLATE_LANG")
                .unwrap_or_else(|_| "es_MX".to_string()),
            whatsapp_timeout_secs: get_env_parse_or("WHATSAPP_TIMEOUT_SECS", 15)?,
            admin_cache_ttl_secs: get_env_parse_or("ADMIN_CACHE_TTL_SECS", 15)?,
            outbox_worker_enabled: get_env_parse_or("OUTBOX_WORKER_ENABLED", true)?,
            outbox_max_attempts: get_env_parse_or("OUTBOX_MAX_ATTEMPTS", 5)?,
            webhook_rps: get_env_parse_or("WEBHOOK_RPS", 200)?,
            app_rps: get_env_parse_or("APP_RPS", 50)?,
            onboarding_token_ttl_hours: get_env_parse_or("ONBOARDING_TOKEN_TTL_HOURS", 72)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
