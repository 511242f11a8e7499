//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::backend::HttpBackend;
use crate::cors::DEFAULT_ALLOWED_ORIGINS;
use clap::Parser;
use std::sync::Arc;
use tracing::error;
use url::Url;

/// Backend keys shorter than this are almost certainly misconfiguration.
const MIN_KEY_LENGTH: usize = 20;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Stitchgate",
    about = "Action-routed gateway for the Stitchwork community platform"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8787")]
    pub port: u16,

    /// Base URL of the identity/data backend
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: String,

    /// Site URL used as the default sign-up confirmation redirect
    #[arg(long, default_value = "https://stitchwork.org/")]
    pub site_url: String,

    /// Origin allowed to make credentialed cross-origin requests.
    /// Repeatable; defaults to the known production/staging/local origins
    #[arg(long = "origin")]
    pub origins: Vec<String>,

    /// Path to file containing the backend anon key. Prefer the
    /// BACKEND_ANON_KEY env var instead
    #[arg(long)]
    pub anon_key_file: Option<String>,

    /// Path to file containing the backend service key. Prefer the
    /// BACKEND_SERVICE_KEY env var instead
    #[arg(long)]
    pub service_key_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a backend key from an environment variable or file.
/// Returns None and logs an error if the key cannot be loaded.
pub fn load_backend_key(env_var: &str, key_file: Option<&str>, flag: &str) -> Option<String> {
    let key = if let Ok(key) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking.
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        key
    } else if let Some(path) = key_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read backend key file");
                return None;
            }
        }
    } else {
        error!(
            "Backend key is required. Set {} environment variable (recommended) or use --{}",
            env_var, flag
        );
        return None;
    };

    if key.len() < MIN_KEY_LENGTH {
        error!(
            "Backend key is shorter than {} characters. This is not a real key",
            MIN_KEY_LENGTH
        );
        return None;
    }

    Some(key)
}

/// Parse and validate the backend URL.
/// Returns None and logs an error if validation fails.
pub fn validate_backend_url(backend_url: &str) -> Option<Url> {
    let url = match Url::parse(backend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Invalid backend URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_local = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));

    if !is_https && !is_local {
        error!("Backend URL must use HTTPS for non-local deployments");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    backend_url: Url,
    anon_key: String,
    service_key: String,
    origins: Vec<String>,
    site_url: String,
) -> ServerConfig {
    let allowed_origins = if origins.is_empty() {
        DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        origins
    };

    ServerConfig {
        backend: Arc::new(HttpBackend::new(backend_url, anon_key, service_key)),
        allowed_origins,
        site_url,
    }
}
