//! Configuration validation
//!
//! Validates configuration and reports issues.

use std::time::Duration;

use secrecy::ExposeSecret;

use super::types::BridgeConfig;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &BridgeConfig) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_endpoint(config, result);
    result = validate_identities(config, result);
    result = validate_timers(config, result);

    result
}

fn validate_endpoint(config: &BridgeConfig, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.port == 0 {
        result = result.with_error(
            ValidationIssue::new("port", "Gateway port must not be 0")
                .with_suggestion("Set MIRAI_PORT to the mirai-api-http websocket port"),
        );
    }

    if config.endpoint_url().is_err() {
        result = result.with_error(ValidationIssue::new(
            "host",
            format!("'{}' does not form a valid websocket URL", config.host),
        ));
    }

    if config.verify_key.expose_secret().is_empty() {
        result = result.with_error(
            ValidationIssue::new("verify_key", "Verify key is empty")
                .with_suggestion("Set MIRAI_VERIFY_KEY to the gateway's verifyKey"),
        );
    }

    result
}

fn validate_identities(config: &BridgeConfig, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.identities.is_empty() {
        result = result.with_error(
            ValidationIssue::new("identities", "No identities configured, nothing to connect")
                .with_suggestion("Set MIRAI_QQ to a comma-separated list of account ids"),
        );
    }

    let mut seen = std::collections::HashSet::new();
    for id in &config.identities {
        if !seen.insert(*id) {
            result = result.with_warning(ValidationIssue::new(
                "identities",
                format!("Identity {} listed more than once; only one session is started", id),
            ));
        }
    }

    result
}

fn validate_timers(config: &BridgeConfig, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.api_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "api_timeout",
            "Call timeout must be greater than zero",
        ));
    }

    if config.reconnect_interval < Duration::from_millis(100) {
        result = result.with_warning(
            ValidationIssue::new(
                "reconnect_interval",
                format!(
                    "Reconnect interval {:?} will hammer the gateway while it is down",
                    config.reconnect_interval
                ),
            )
            .with_suggestion("Use the default of 3s"),
        );
    }

    result
}
