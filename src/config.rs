// src/config.rs
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEV_JWT_SECRET: &str = "tabula_dev_session_secret";
const DEV_URL_SIGNING_SECRET: &str = "tabula_dev_url_signing_secret";

// Runtime settings, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub public_base_url: String,
    pub storage_dir: PathBuf,
    pub jwt_secret: String,
    pub url_signing_secret: String,
    pub signed_url_ttl_secs: i64,
    pub max_upload_bytes: u64,
    pub pending_upload_ttl_secs: i64,
    // how long a file may stay Processing before the sweeper gives up on it
    pub processing_timeout_secs: i64,
    pub cors_allowed_origin: Option<String>,
    pub text_generation_url: Option<String>,
    pub text_generation_api_key: Option<String>,
    pub text_generation_model: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    match optional_var(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value for {}: {}", name, raw);
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let jwt_secret = optional_var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET is not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });
        let url_signing_secret = optional_var("URL_SIGNING_SECRET").unwrap_or_else(|| {
            warn!("URL_SIGNING_SECRET is not set, using the development secret");
            DEV_URL_SIGNING_SECRET.to_string()
        });

        Self {
            bind_address: var_or("BIND_ADDRESS", "127.0.0.1:9090"),
            public_base_url: var_or("PUBLIC_BASE_URL", "http://127.0.0.1:9090"),
            storage_dir: PathBuf::from(var_or("STORAGE_DIR", "./storage")),
            jwt_secret,
            url_signing_secret,
            signed_url_ttl_secs: parsed_var("SIGNED_URL_TTL_SECS", 900),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            pending_upload_ttl_secs: parsed_var("PENDING_UPLOAD_TTL_SECS", 3600),
            processing_timeout_secs: parsed_var("PROCESSING_TIMEOUT_SECS", 1800),
            cors_allowed_origin: optional_var("CORS_ALLOWED_ORIGIN"),
            text_generation_url: optional_var("TEXT_GENERATION_URL"),
            text_generation_api_key: optional_var("TEXT_GENERATION_API_KEY"),
            text_generation_model: var_or("TEXT_GENERATION_MODEL", "gpt-4o-mini"),
        }
    }

    // Settings for tests and local tooling: everything under `storage_dir`, no network
    pub fn for_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            public_base_url: "http://localhost".to_string(),
            storage_dir: storage_dir.into(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            url_signing_secret: DEV_URL_SIGNING_SECRET.to_string(),
            signed_url_ttl_secs: 900,
            max_upload_bytes: 50 * 1024 * 1024,
            pending_upload_ttl_secs: 3600,
            processing_timeout_secs: 1800,
            cors_allowed_origin: None,
            text_generation_url: None,
            text_generation_api_key: None,
            text_generation_model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.storage_dir.join("objects")
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("db.json")
    }
}
