use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 挑战令牌固定 5 分钟有效
const CHALLENGE_TOKEN_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub login_max_attempts: u32,
    pub login_lock_secs: u64,
    pub permission_cache_secs: u64,
    pub inactive_lock_days: i64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub login_rate_limit: u32,
    pub totp_issuer: String,
    pub api_permission_fail_closed: bool,
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                value: "<at least 16 bytes required>".into(),
            });
        }

        // JWT_EXPIRATION 以小时为单位，可写成 "24h"
        let jwt_expiration_hours = match env::var("JWT_EXPIRATION") {
            Ok(raw) => raw
                .trim_end_matches('h')
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid {
                    key: "JWT_EXPIRATION",
                    value: raw.clone(),
                })?,
            Err(_) => 24,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            database_max_connections: optional("DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: required("REDIS_URL")?,
            jwt_secret,
            jwt_expiration_secs: jwt_expiration_hours * 3600,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: optional("SERVER_PORT", 3000)?,
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            login_max_attempts: optional("LOGIN_MAX_ATTEMPTS", 5)?,
            login_lock_secs: optional("LOGIN_LOCK_SECS", 15 * 60)?,
            permission_cache_secs: optional("PERMISSION_CACHE_SECS", 5 * 60)?,
            inactive_lock_days: optional("INACTIVE_LOCK_DAYS", 30)?,
            rate_limit_window_secs: optional("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: optional("RATE_LIMIT_REQUESTS", 300)?,
            login_rate_limit: optional("LOGIN_RATE_LIMIT", 10)?,
            totp_issuer: env::var("TOTP_ISSUER").unwrap_or_else(|_| "ADCMS".into()),
            api_permission_fail_closed: optional("API_PERMISSION_FAIL_CLOSED", false)?,
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.is_empty()),
        })
    }

    /// 测试和本地开发使用的默认配置
    pub fn for_tests(jwt_secret: &str) -> Self {
        Config {
            database_url: String::new(),
            database_max_connections: 1,
            redis_url: String::new(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration_secs: 24 * 3600,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            api_base_uri: "/api".into(),
            login_max_attempts: 5,
            login_lock_secs: 15 * 60,
            permission_cache_secs: 5 * 60,
            inactive_lock_days: 30,
            rate_limit_window_secs: 60,
            rate_limit_requests: 10_000,
            login_rate_limit: 10_000,
            totp_issuer: "ADCMS".into(),
            api_permission_fail_closed: false,
            notify_webhook_url: None,
        }
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn challenge_token_expiration(&self) -> Duration {
        Duration::from_secs(CHALLENGE_TOKEN_SECS)
    }

    pub fn login_lock_duration(&self) -> Duration {
        Duration::from_secs(self.login_lock_secs)
    }

    pub fn permission_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_cache_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_follow_fields() {
        let config = Config::for_tests("0123456789abcdef");
        assert_eq!(config.jwt_expiration(), Duration::from_secs(86_400));
        assert_eq!(config.challenge_token_expiration(), Duration::from_secs(300));
        assert_eq!(config.login_lock_duration(), Duration::from_secs(900));
        assert_eq!(config.permission_cache_ttl(), Duration::from_secs(300));
    }
}
