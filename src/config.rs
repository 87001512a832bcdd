//! Environment configuration

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_SITE_URL: &str = "http://localhost:4321";
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
pub const DEFAULT_EMAIL_FROM: &str = "noreply@aurum.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub site_url: String,
    pub environment: Environment,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    pub checkout_currency: String,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: Option<String>,
    pub api_secret_key: Option<String>,
    pub nats_url: Option<String>,
}

impl Config {
    /// Reads the process environment (after loading `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };
        let environment = match get("APP_ENV").as_deref() {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        };

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            port,
            site_url: get("SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()).trim_end_matches('/').to_string(),
            environment,
            supabase_url: require("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            supabase_anon_key: require("SUPABASE_ANON_KEY")?,
            stripe_secret_key: require("STRIPE_SECRET_KEY")?,
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
            checkout_currency: get("CHECKOUT_CURRENCY").unwrap_or_else(|| "eur".to_string()).to_lowercase(),
            resend_api_key: get("RESEND_API_KEY"),
            email_from: get("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
            cloudinary_cloud_name: get("CLOUDINARY_CLOUD_NAME"),
            cloudinary_upload_preset: get("CLOUDINARY_UPLOAD_PRESET"),
            api_secret_key: get("API_SECRET_KEY"),
            nats_url: get("NATS_URL"),
        })
    }

    pub fn is_production(&self) -> bool { self.environment == Environment::Production }
}
