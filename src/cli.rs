//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::DEFAULT_COOKIE_MAX_AGE_SECS;
use crate::db::Database;
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, MAX_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS,
    TokenDurations,
};
use clap::Parser;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Deployment environment. Decides the refresh cookie's security attributes.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "visage", about = "Account and session service")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "visage.db")]
    pub database: String,

    /// Deployment environment (production enables Secure, SameSite=None cookies)
    #[arg(short, long, env = "APP_ENV", default_value = "development")]
    pub environment: Environment,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(
        long,
        default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(
        long,
        default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub refresh_token_ttl: u64,

    /// Refresh cookie Max-Age in seconds
    #[arg(long, default_value_t = DEFAULT_COOKIE_MAX_AGE_SECS)]
    pub cookie_max_age: u64,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_proxy: bool,

    /// Answer logins for unknown emails with 404 instead of the generic 401
    #[arg(long)]
    pub verbose_auth_errors: bool,

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

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            variable = %env_var,
            "Signing secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            variable = %env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        token_durations: TokenDurations {
            access: args.access_token_ttl,
            refresh: args.refresh_token_ttl,
        },
        environment: args.environment,
        cookie_max_age: args.cookie_max_age,
        trust_proxy: args.trust_proxy,
        verbose_auth_errors: args.verbose_auth_errors,
        rate_limit: true,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["visage"]).unwrap();
        assert_eq!(args.port, 3000);
        assert_eq!(args.environment, Environment::Development);
        assert_eq!(args.access_token_ttl, ACCESS_TOKEN_DURATION_SECS);
        assert_eq!(args.refresh_token_ttl, REFRESH_TOKEN_DURATION_SECS);
        assert!(!args.verbose_auth_errors);
    }

    #[test]
    fn test_token_ttl_bounds() {
        let too_long = (MAX_TOKEN_DURATION_SECS + 1).to_string();
        assert!(Args::try_parse_from(["visage", "--refresh-token-ttl", &too_long]).is_err());
        assert!(Args::try_parse_from(["visage", "--access-token-ttl", "0"]).is_err());

        let args = Args::try_parse_from(["visage", "--access-token-ttl", "60"]).unwrap();
        assert_eq!(args.access_token_ttl, 60);
    }

    #[test]
    fn test_production_flag() {
        let args = Args::try_parse_from(["visage", "--environment", "production"]).unwrap();
        assert_eq!(args.environment, Environment::Production);
    }

    #[test]
    fn test_secret_file_too_short() {
        let path = std::env::temp_dir().join(format!("visage-secret-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "short\n").unwrap();

        let secret = load_secret(
            "VISAGE_TEST_UNSET_SECRET",
            Some(path.to_str().unwrap()),
        );
        assert!(secret.is_none());

        std::fs::write(&path, format!("{}\n", "s".repeat(40))).unwrap();
        let secret = load_secret(
            "VISAGE_TEST_UNSET_SECRET",
            Some(path.to_str().unwrap()),
        );
        assert_eq!(secret.as_deref().map(str::len), Some(40));

        std::fs::remove_file(path).ok();
    }
}
