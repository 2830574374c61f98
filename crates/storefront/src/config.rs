//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FLORIST_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `FLORIST_BASE_URL` - Public URL for the storefront
//! - `FLORIST_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `FLORIST_HOST` - Bind address (default: 127.0.0.1)
//! - `FLORIST_PORT` - Listen port (default: 3000)
//! - `FLORIST_DEFAULT_VAT_RATE` - VAT percentage for new invoices (default: 20)
//! - `FLORIST_INVOICE_PAYMENT_TERMS_DAYS` - Days after period end before an invoice is due (default: 30)
//! - `FLORIST_CURRENCY` - ISO currency code sent to the payment processor (default: eur)
//! - `FLORIST_LOG_JSON` - Emit logs as JSON when set
//! - `STRIPE_SECRET_KEY` + `STRIPE_WEBHOOK_SECRET` - Payment processor (both or neither)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM` - Outgoing
//!   email (all or nothing; `SMTP_PORT` defaults to 587)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use florist_core::VatRate;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
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
    #[error("Incomplete configuration for {0}: set all of {1} or none")]
    Incomplete(&'static str, &'static str),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Invoicing defaults
    pub billing: BillingConfig,
    /// Payment processor, if configured
    pub stripe: Option<StripeConfig>,
    /// Outgoing email, if configured
    pub email: Option<EmailConfig>,
    /// Emit JSON logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
}

/// Invoicing and currency defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingConfig {
    pub vat_rate: VatRate,
    pub payment_terms_days: u32,
    pub currency: Currency,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            vat_rate: VatRate::STANDARD,
            payment_terms_days: 30,
            currency: Currency::Eur,
        }
    }
}

/// Currencies accepted by the payment processor integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Eur,
    Gbp,
    Usd,
    Chf,
}

impl Currency {
    /// Lowercase ISO 4217 code, as the processor expects it.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Usd => "usd",
            Self::Chf => "chf",
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "usd" => Ok(Self::Usd),
            "chf" => Ok(Self::Chf),
            other => Err(format!("unsupported currency '{other}'")),
        }
    }
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: SecretString,
    /// Webhook endpoint signing secret (`whsec_...`)
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    /// Sender mailbox, e.g. `Fleurs <commandes@example.fr>`
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

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("FLORIST_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("FLORIST_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("FLORIST_PORT", "3000")?;
        let base_url = get_required_env("FLORIST_BASE_URL")?;
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("FLORIST_BASE_URL".to_string(), e.to_string()))?;
        let session_secret = get_validated_secret("FLORIST_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "FLORIST_SESSION_SECRET")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            billing: BillingConfig::from_env()?,
            stripe: StripeConfig::from_env()?,
            email: EmailConfig::from_env()?,
            log_json: get_optional_env("FLORIST_LOG_JSON").is_some_and(|v| is_truthy(&v)),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` attribute.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl BillingConfig {
    /// Read the invoicing settings on their own, for tools that do not
    /// serve HTTP.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let percent = parse_env_or_default::<Decimal>("FLORIST_DEFAULT_VAT_RATE", "20")?;
        let vat_rate = VatRate::from_percent(percent).map_err(|e| {
            ConfigError::InvalidEnvVar("FLORIST_DEFAULT_VAT_RATE".to_string(), e.to_string())
        })?;
        Ok(Self {
            vat_rate,
            payment_terms_days: parse_env_or_default("FLORIST_INVOICE_PAYMENT_TERMS_DAYS", "30")?,
            currency: parse_env_or_default("FLORIST_CURRENCY", "eur")?,
        })
    }
}

impl StripeConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        match (
            get_optional_env("STRIPE_SECRET_KEY"),
            get_optional_env("STRIPE_WEBHOOK_SECRET"),
        ) {
            (Some(_), Some(_)) => Ok(Some(Self {
                secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
                webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::Incomplete(
                "Stripe",
                "STRIPE_SECRET_KEY, STRIPE_WEBHOOK_SECRET",
            )),
        }
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        match (
            get_optional_env("SMTP_HOST"),
            get_optional_env("SMTP_USERNAME"),
            get_optional_env("SMTP_PASSWORD"),
            get_optional_env("SMTP_FROM"),
        ) {
            (Some(smtp_host), Some(smtp_username), Some(smtp_password), Some(from_address)) => {
                Ok(Some(Self {
                    smtp_host,
                    smtp_port: parse_env_or_default("SMTP_PORT", "587")?,
                    smtp_username,
                    smtp_password: SecretString::from(smtp_password),
                    from_address,
                }))
            }
            (None, None, None, None) => Ok(None),
            _ => Err(ConfigError::Incomplete(
                "SMTP",
                "SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD, SMTP_FROM",
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither variable is set.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
///
/// Provider key prefixes such as `sk_test_` or `whsec_` are skipped before the
/// placeholder scan so the scan only sees the random part.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let random_part = ["sk_live_", "sk_test_", "rk_live_", "rk_test_", "whsec_"]
        .iter()
        .find_map(|prefix| secret.strip_prefix(prefix))
        .unwrap_or(secret);
    let lower = random_part.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(random_part);
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
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
