//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{AlertSinkKind, MedbridgeConfig, StoreBackend};
use super::secret::secret_string;
use crate::domain::errors::MedbridgeError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Prefix for per-key encryption overrides: `MEDBRIDGE_ENCRYPTION_KEY_<REF>`
const ENCRYPTION_KEY_PREFIX: &str = "MEDBRIDGE_ENCRYPTION_KEY_";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Loads a `.env` file from the working directory, if present
/// 2. Reads the TOML file
/// 3. Performs environment variable substitution (`${VAR}` syntax)
/// 4. Parses the TOML into [`MedbridgeConfig`]
/// 5. Applies environment variable overrides (`MEDBRIDGE_*` prefix)
/// 6. Validates the configuration
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read or parsed, a
/// referenced variable is unset, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use medbridge::config::load_config;
///
/// let config = load_config("medbridge.toml").expect("Failed to load config");
/// println!("{} workers", config.queue.concurrency);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<MedbridgeConfig> {
    let path = path.as_ref();

    // Missing .env is fine
    let _ = dotenvy::dotenv();

    if !path.exists() {
        return Err(MedbridgeError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        MedbridgeError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text (substitution, overrides and validation included)
pub fn parse_config(contents: &str) -> Result<MedbridgeConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: MedbridgeConfig = toml::from_str(&contents)
        .map_err(|e| MedbridgeError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        MedbridgeError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| MedbridgeError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(MedbridgeError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse().map(Some).map_err(|_| {
            MedbridgeError::Configuration(format!("Invalid value for {name}: '{val}'"))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using the `MEDBRIDGE_*` prefix
///
/// Variables follow `MEDBRIDGE_<SECTION>_<KEY>`, e.g.
/// `MEDBRIDGE_QUEUE_CONCURRENCY` or `MEDBRIDGE_POSTGRESQL_CONNECTION_STRING`.
/// Encryption keys are added or replaced with
/// `MEDBRIDGE_ENCRYPTION_KEY_<REF>`; the ref is lowercased and underscores
/// become dashes (`MEDBRIDGE_ENCRYPTION_KEY_CLINIC_A` -> `clinic-a`).
fn apply_env_overrides(config: &mut MedbridgeConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Store backend
    if let Ok(val) = std::env::var("MEDBRIDGE_STORE_BACKEND") {
        config.store_backend = match val.to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "postgresql" => StoreBackend::PostgreSQL,
            other => {
                return Err(MedbridgeError::Configuration(format!(
                    "Invalid MEDBRIDGE_STORE_BACKEND '{other}'. Must be memory or postgresql"
                )))
            }
        };
    }

    // Queue overrides
    if let Some(v) = env_parse("MEDBRIDGE_QUEUE_CONCURRENCY")? {
        config.queue.concurrency = v;
    }
    if let Some(v) = env_parse("MEDBRIDGE_QUEUE_MAX_ATTEMPTS")? {
        config.queue.max_attempts = v;
    }
    if let Some(v) = env_parse("MEDBRIDGE_QUEUE_BACKOFF_BASE_MS")? {
        config.queue.backoff_base_ms = v;
    }
    if let Some(v) = env_parse("MEDBRIDGE_QUEUE_BACKOFF_CAP_MS")? {
        config.queue.backoff_cap_ms = v;
    }
    if let Some(v) = env_parse("MEDBRIDGE_QUEUE_LEASE_DURATION_SECS")? {
        config.queue.lease_duration_secs = v;
    }
    if let Some(v) = env_parse("MEDBRIDGE_QUEUE_JOB_TIMEOUT_SECS")? {
        config.queue.job_timeout_secs = v;
    }

    // PostgreSQL overrides (only if PostgreSQL is configured)
    if let Some(ref mut pg_config) = config.postgresql {
        if let Ok(val) = std::env::var("MEDBRIDGE_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Some(v) = env_parse("MEDBRIDGE_POSTGRESQL_MAX_CONNECTIONS")? {
            pg_config.max_connections = v;
        }
        if let Ok(val) = std::env::var("MEDBRIDGE_POSTGRESQL_SSL_MODE") {
            pg_config.ssl_mode = val;
        }
    }

    // Encryption keys
    for (name, value) in std::env::vars() {
        if let Some(suffix) = name.strip_prefix(ENCRYPTION_KEY_PREFIX) {
            if suffix.is_empty() {
                continue;
            }
            let key_ref = suffix.to_lowercase().replace('_', "-");
            config.encryption.keys.insert(key_ref, secret_string(value));
        }
    }

    // Mappings
    if let Ok(val) = std::env::var("MEDBRIDGE_MAPPINGS_DIRECTORY") {
        config.mappings.directory = Some(val);
    }

    // Alerts
    if let Ok(val) = std::env::var("MEDBRIDGE_ALERTS_WEBHOOK_URL") {
        config.alerts.webhook_url = Some(val);
        config.alerts.sink = AlertSinkKind::Webhook;
    }

    // Audit
    if let Some(v) = env_parse("MEDBRIDGE_AUDIT_ENABLED")? {
        config.audit.enabled = v;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_AUDIT_PATH") {
        config.audit.path = val;
    }

    // Logging overrides
    if let Some(v) = env_parse("MEDBRIDGE_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = v;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("MEDBRIDGE_LOADER_TEST_VAR", "test_value");
        let input = "password = \"${MEDBRIDGE_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"\n");
        std::env::remove_var("MEDBRIDGE_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("MEDBRIDGE_LOADER_MISSING_VAR");
        let input = "password = \"${MEDBRIDGE_LOADER_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("MEDBRIDGE_LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_substitution_skips_comments() {
        let input = "# key = \"${MEDBRIDGE_LOADER_UNSET_IN_COMMENT}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-medbridge.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[queue]
concurrency = 8
backoff_base_ms = 250

[encryption.keys]
clinic-a = "0123456789abcdef0123456789abcdef"

[mappings]
builtin = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.queue.concurrency, 8);
        assert_eq!(config.queue.backoff_base_ms, 250);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(
            config.encryption.keys["clinic-a"].expose_secret().len(),
            32
        );
        assert!(!config.mappings.builtin);
    }

    #[test]
    fn test_validation_error_is_reported() {
        let err = parse_config("[queue]\nconcurrency = 0\n").unwrap_err();
        assert!(err.to_string().contains("queue.concurrency"));
    }
}
