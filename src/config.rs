//! Configuration for the signature verifier and the delegated authorizer.
//!
//! Configuration objects are built once by the hosting server and passed to the middleware
//! constructors. Nothing here is global.

use {
    crate::{constants::*, ConfigError, SecretKey},
    derive_builder::Builder,
    reqwest::Url,
    std::time::Duration,
};

/// Configuration for the [signature verifier][crate::SignatureVerifierService].
#[derive(Builder, Clone, Debug)]
#[builder(derive(Debug), build_fn(validate = "Self::validate"))]
pub struct VerifierConfig {
    /// The shared secret requests are signed with.
    #[builder(setter(into))]
    secret: SecretKey,

    /// Let requests through without a signature if they have no query parameters and an empty
    /// body. This is meant for health checks and similar no-payload endpoints; it weakens the
    /// guarantee for every such request, so it is off unless explicitly enabled.
    #[builder(default)]
    allow_unsigned_empty: bool,
}

impl VerifierConfig {
    /// Create a [VerifierConfigBuilder] to construct a [VerifierConfig].
    #[inline]
    pub fn builder() -> VerifierConfigBuilder {
        VerifierConfigBuilder::default()
    }

    /// Load the configuration from the process environment.
    ///
    /// Reads `SIGNATURE_KEY` (required) and `SIGNATURE_ALLOW_UNSIGNED_EMPTY` (optional, default
    /// `false`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Load the configuration using `lookup` to resolve variable names.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(ENV_SIGNATURE_KEY).ok_or(ConfigError::MissingVariable(ENV_SIGNATURE_KEY))?;
        let allow_unsigned_empty = match lookup(ENV_ALLOW_UNSIGNED_EMPTY) {
            Some(value) => parse_bool(ENV_ALLOW_UNSIGNED_EMPTY, &value)?,
            None => false,
        };

        Self::builder()
            .secret(secret)
            .allow_unsigned_empty(allow_unsigned_empty)
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The shared signing secret.
    #[inline]
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Whether unsigned requests with no query and no body are let through.
    #[inline]
    pub fn allow_unsigned_empty(&self) -> bool {
        self.allow_unsigned_empty
    }
}

impl VerifierConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.secret {
            Some(ref secret) if secret.is_empty() => Err("Signing secret must not be empty".to_string()),
            _ => Ok(()),
        }
    }
}

/// Configuration for the [delegated authorizer][crate::AuthorizerService].
#[derive(Builder, Clone, Debug)]
#[builder(derive(Debug), build_fn(validate = "Self::validate"))]
pub struct AuthorizerConfig {
    /// The URL of the identity service's token validation endpoint.
    #[builder(setter(into))]
    identity_url: String,

    /// The secret used to sign calls to the identity service.
    #[builder(setter(into))]
    secret: SecretKey,

    /// Timeout for the whole identity call (connect, request and response body).
    #[builder(default = "Duration::from_secs(DEFAULT_IDENTITY_TIMEOUT_SECS)")]
    timeout: Duration,
}

impl AuthorizerConfig {
    /// Create a [AuthorizerConfigBuilder] to construct a [AuthorizerConfig].
    #[inline]
    pub fn builder() -> AuthorizerConfigBuilder {
        AuthorizerConfigBuilder::default()
    }

    /// Load the configuration from the process environment.
    ///
    /// Reads `AUTH_SERVICE_URL` and `SIGNATURE_KEY` (both required) and `AUTH_TIMEOUT_SECS`
    /// (optional, default 5).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Load the configuration using `lookup` to resolve variable names.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let identity_url = lookup(ENV_AUTH_SERVICE_URL).ok_or(ConfigError::MissingVariable(ENV_AUTH_SERVICE_URL))?;
        let secret = lookup(ENV_SIGNATURE_KEY).ok_or(ConfigError::MissingVariable(ENV_SIGNATURE_KEY))?;
        let mut builder = Self::builder();
        builder.identity_url(identity_url).secret(secret);

        if let Some(value) = lookup(ENV_AUTH_TIMEOUT_SECS) {
            let secs = value.trim().parse::<u64>().map_err(|e| ConfigError::InvalidVariable {
                name: ENV_AUTH_TIMEOUT_SECS,
                message: e.to_string(),
            })?;
            builder.timeout(Duration::from_secs(secs));
        }

        builder.build().map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The identity service URL.
    #[inline]
    pub fn identity_url(&self) -> &str {
        &self.identity_url
    }

    /// The secret used to sign calls to the identity service.
    #[inline]
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Timeout for the identity call.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl AuthorizerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref url) = self.identity_url {
            let parsed = Url::parse(url).map_err(|e| format!("Invalid identity service URL {:?}: {}", url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!("Identity service URL must be http or https: {}", url));
            }
        }

        if let Some(ref secret) = self.secret {
            if secret.is_empty() {
                return Err("Signing secret must not be empty".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err("Identity call timeout must be greater than zero".to_string());
            }
        }

        Ok(())
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidVariable {
            name,
            message: format!("expected a boolean, got {:?}", other),
        }),
    }
}
