//! Configuration shared by the storefront and admin binaries.
//!
//! # Environment Variables
//!
//! ## Payment gateway
//! - `STRIPE_SECRET_KEY` - API secret key (required, high entropy)
//! - `STRIPE_API_BASE` - API base URL (default: <https://api.stripe.com>)
//! - `STRIPE_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `STRIPE_WEBHOOK_SECRET` - Webhook signing secret (storefront only, high entropy)
//! - `STRIPE_WEBHOOK_TOLERANCE_SECS` - Accepted signature age (default: 300)
//!
//! ## Email (optional; notifications are logged when `SMTP_HOST` is unset)
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`, `SMTP_PASSWORD`
//! - `EMAIL_FROM` - Sender address
//! - `OPERATOR_EMAIL` - Recipient of oversold-stock alerts
//!
//! ## Order handling
//! - `OVERSOLD_POLICY` - `floor` or `floor_and_alert` (default: `floor_and_alert`)
//! - `ORDER_NUMBER_ATTEMPTS` - Inserts tried before giving up on collisions (default: 5)
//! - `REFUND_TIMEOUT_SECS` - Bound on the gateway refund call (default: 15)

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use print_shop_core::Email;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

// =============================================================================
// Payment gateway
// =============================================================================

/// Stripe API client configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct StripeConfig {
    /// API secret key
    pub secret_key: SecretString,
    /// API base URL, overridable for a local mock
    pub api_base: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StripeConfig {
    /// Load from `STRIPE_*` variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the secret key is missing or weak, or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            timeout: Duration::from_secs(get_parsed_env("STRIPE_TIMEOUT_SECS", 10)?),
        })
    }
}

/// Webhook signature verification settings.
///
/// Implements `Debug` manually to redact the signing secret.
#[derive(Clone)]
pub struct WebhookConfig {
    /// Shared signing secret
    pub secret: SecretString,
    /// Maximum accepted age of a signature timestamp
    pub tolerance: Duration,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookConfig {
    /// Load from `STRIPE_WEBHOOK_*` variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the secret is missing or weak.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            tolerance: Duration::from_secs(get_parsed_env("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?),
        })
    }
}

// =============================================================================
// Email
// =============================================================================

/// SMTP configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password
    pub smtp_password: SecretString,
    /// Sender address, e.g. `3D Print Shop <orders@shop.test>`
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl EmailConfig {
    /// Load SMTP settings; `Ok(None)` when `SMTP_HOST` is unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `SMTP_HOST` is set but the rest is incomplete.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: get_parsed_env("SMTP_PORT", 587)?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_required_env("EMAIL_FROM")?,
        }))
    }
}

// =============================================================================
// Order handling
// =============================================================================

/// What to do when a paid order needs more stock than is available.
///
/// Stock is always floored at zero and the shortfall logged; the policy only
/// decides whether an operator is emailed as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversoldPolicy {
    /// Floor at zero and log.
    Floor,
    /// Floor at zero, log and email the operator.
    #[default]
    FloorAndAlert,
}

impl FromStr for OversoldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "floor" => Ok(Self::Floor),
            "floor_and_alert" => Ok(Self::FloorAndAlert),
            other => Err(format!("unknown oversold policy: {other}")),
        }
    }
}

/// Knobs for checkout and payment reconciliation.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// Order inserts tried before giving up on number collisions
    pub order_number_attempts: u32,
    /// Oversold handling
    pub oversold_policy: OversoldPolicy,
    /// Recipient of oversold alerts
    pub operator_email: Option<Email>,
    /// Bound on the gateway refund call
    pub refund_timeout: Duration,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            order_number_attempts: 5,
            oversold_policy: OversoldPolicy::default(),
            operator_email: None,
            refund_timeout: Duration::from_secs(15),
        }
    }
}

impl OrderConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let order_number_attempts: u32 = get_parsed_env("ORDER_NUMBER_ATTEMPTS", 5)?;
        if order_number_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ORDER_NUMBER_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let operator_email = get_optional_env("OPERATOR_EMAIL")
            .map(|raw| {
                Email::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("OPERATOR_EMAIL".to_string(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            order_number_attempts,
            oversold_policy: get_parsed_env("OVERSOLD_POLICY", OversoldPolicy::FloorAndAlert)?,
            operator_email,
            refund_timeout: Duration::from_secs(get_parsed_env("REFUND_TIMEOUT_SECS", 15)?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if unset.
pub fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable; empty values count as unset.
#[must_use]
pub fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
#[must_use]
pub fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` if the variable is set but does not parse.
pub fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Get database URL with fallback to generic `DATABASE_URL`.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` naming `primary_key` if neither is set.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Validate that a secret meets a minimum length.
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` if the secret is shorter than `min_len`.
pub fn validate_secret_length(
    secret: &SecretString,
    var_name: &str,
    min_len: usize,
) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < min_len {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("must be at least {min_len} characters (got {})", value.len()),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
#[must_use]
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` describing the failed check.
pub fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
///
/// # Errors
///
/// Returns `ConfigError` if missing or failing [`validate_secret_strength`].
pub fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
