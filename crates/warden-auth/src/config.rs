//! Authentication configuration
//!
//! Centralized configuration for the credential managers. Every knob has a
//! default and can be overridden through `WARDEN_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token configuration
    pub bearer: BearerConfig,
    /// Password hashing configuration
    pub password: PasswordConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Login throttle configuration
    pub throttle: ThrottleConfig,
    /// Password reset configuration
    pub reset: ResetConfig,
}

/// Bearer token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerConfig {
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,
    /// Random bytes per token
    pub token_length: usize,
}

impl Default for BearerConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::from_secs(30 * 60), // 30 minutes
            refresh_token_ttl: Duration::from_secs(3 * 24 * 60 * 60), // 3 days
            token_length: 32,
        }
    }
}

/// Password hashing configuration (Argon2id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB (OWASP recommends 19456 KiB = 19 MiB minimum)
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Output hash length in bytes
    pub hash_length: u32,
    /// Pepper (additional secret, optional)
    pub pepper: Option<String>,
    /// Minimum password length
    pub min_password_length: usize,
    /// Maximum password length (to prevent DoS)
    pub max_password_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
            pepper: None,
            min_password_length: 8,
            max_password_length: 128,
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie carrying the session id
    pub cookie_name: String,
    /// Cookie path attribute
    pub cookie_path: String,
    /// Session lifetime, used for both the stored payload and the cookie
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    pub http_only: bool,
    pub secure: bool,
    /// Slide the expiry on every authenticated request
    pub resave: bool,
    /// Session id length in bytes
    pub token_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "warden.sid".to_string(),
            cookie_path: "/".to_string(),
            max_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            http_only: true,
            secure: false,
            resave: true,
            token_length: 32,
        }
    }
}

/// Login throttle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub enabled: bool,
    /// Failed attempts that trigger a lockout
    pub max_failures: u32,
    /// How long a triggered lockout lasts
    #[serde(with = "humantime_serde")]
    pub lockout_window: Duration,
    /// Failure counters expire after this much inactivity
    #[serde(with = "humantime_serde")]
    pub inactivity_window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failures: 3,
            lockout_window: Duration::from_secs(10 * 60), // 10 minutes
            inactivity_window: Duration::from_secs(10 * 60), // 10 minutes
        }
    }
}

/// Password reset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetConfig {
    /// Origin used in reset links, e.g. `https://app.example.com`
    pub base_origin: String,
    /// `token_type` column value for reset tokens
    pub token_type: String,
    /// Random bytes per reset token
    pub token_length: usize,
    /// Named alternate link templates with `{origin}`, `{userId}` and `{token}` placeholders
    pub prefixes: BTreeMap<String, String>,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            base_origin: "http://localhost:8080".to_string(),
            token_type: "resetPassword".to_string(),
            token_length: 32,
            prefixes: BTreeMap::new(),
        }
    }
}

impl AuthConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        let mut config = Self::default();

        // Bearer tokens
        if let Some(ttl) = env_duration("WARDEN_ACCESS_TOKEN_TTL")? {
            config.bearer.access_token_ttl = ttl;
        }
        if let Some(ttl) = env_duration("WARDEN_REFRESH_TOKEN_TTL")? {
            config.bearer.refresh_token_ttl = ttl;
        }

        // Password pepper
        if let Ok(pepper) = std::env::var("PASSWORD_PEPPER") {
            config.password.pepper = Some(pepper);
        }

        // Sessions
        if let Ok(name) = std::env::var("WARDEN_SESSION_COOKIE") {
            config.session.cookie_name = name;
        }
        if let Ok(path) = std::env::var("WARDEN_SESSION_PATH") {
            config.session.cookie_path = path;
        }
        if let Some(max_age) = env_duration("WARDEN_SESSION_MAX_AGE")? {
            config.session.max_age = max_age;
        }
        if let Some(http_only) = env_bool("WARDEN_SESSION_HTTP_ONLY")? {
            config.session.http_only = http_only;
        }
        if let Some(resave) = env_bool("WARDEN_SESSION_RESAVE")? {
            config.session.resave = resave;
        }
        config.session.secure = match env_bool("WARDEN_SESSION_SECURE")? {
            Some(secure) => secure,
            None => std::env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
        };

        // Login throttle
        if let Some(enabled) = env_bool("WARDEN_THROTTLE_ENABLED")? {
            config.throttle.enabled = enabled;
        }
        if let Ok(raw) = std::env::var("WARDEN_THROTTLE_MAX_FAILURES") {
            config.throttle.max_failures = raw
                .parse()
                .map_err(|_| AuthError::Config(format!("WARDEN_THROTTLE_MAX_FAILURES: not a number: {}", raw)))?;
        }
        if let Some(window) = env_duration("WARDEN_THROTTLE_LOCKOUT")? {
            config.throttle.lockout_window = window;
        }
        if let Some(window) = env_duration("WARDEN_THROTTLE_INACTIVITY")? {
            config.throttle.inactivity_window = window;
        }

        // Password reset
        if let Ok(origin) = std::env::var("WARDEN_RESET_BASE_ORIGIN") {
            config.reset.base_origin = origin.trim_end_matches('/').to_string();
        }
        if let Ok(raw) = std::env::var("WARDEN_RESET_PREFIXES") {
            config.reset.prefixes = parse_prefixes(&raw)?;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.bearer.access_token_ttl.is_zero() {
            errors.push("Access token TTL must be greater than zero".to_string());
        }
        if self.bearer.refresh_token_ttl < self.bearer.access_token_ttl {
            errors.push("Refresh token TTL should not be shorter than the access token TTL".to_string());
        }
        if self.bearer.token_length < 16 || self.session.token_length < 16 || self.reset.token_length < 16 {
            errors.push("Token length should be at least 128 bits (16 bytes)".to_string());
        }

        if self.password.min_password_length == 0 {
            errors.push("Minimum password length must be at least 1".to_string());
        }
        if self.password.max_password_length < self.password.min_password_length {
            errors.push("Maximum password length is below the minimum".to_string());
        }

        if self.session.cookie_name.is_empty() {
            errors.push("Session cookie name must be set".to_string());
        }
        if self.session.max_age.is_zero() {
            errors.push("Session max-age must be greater than zero".to_string());
        }

        if self.throttle.enabled && self.throttle.max_failures == 0 {
            errors.push("Throttle threshold must be at least 1".to_string());
        }

        if self.reset.base_origin.is_empty() {
            errors.push("Reset base origin must be set".to_string());
        }
        for (name, template) in &self.reset.prefixes {
            if !template.contains("{token}") {
                errors.push(format!("Reset prefix '{}' has no {{token}} placeholder", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn env_duration(name: &str) -> AuthResult<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => humantime::parse_duration(&raw)
            .map(Some)
            .map_err(|e| AuthError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &str) -> AuthResult<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(AuthError::Config(format!("{}: expected a boolean, got {}", name, raw))),
        },
        Err(_) => Ok(None),
    }
}

/// Parse `name=template;name=template`
pub fn parse_prefixes(raw: &str) -> AuthResult<BTreeMap<String, String>> {
    let mut prefixes = BTreeMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, template) = entry
            .split_once('=')
            .ok_or_else(|| AuthError::Config(format!("reset prefix entry without '=': {}", entry)))?;
        prefixes.insert(name.trim().to_string(), template.trim().to_string());
    }
    Ok(prefixes)
}
