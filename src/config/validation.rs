use std::path::PathBuf;

use super::{CallType, ServerConfig, TlsConfig, UltravoxConfig};

/// Validate the fully merged configuration
pub fn validate_server_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_ultravox_config(&config.ultravox)
}

/// Validate Ultravox settings
///
/// Ensures that:
/// - an API key is present
/// - the API base URL is an absolute http(s) URL
/// - agent calls have an agent id
pub fn validate_ultravox_config(
    config: &UltravoxConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.api_key.trim().is_empty() {
        return Err("ULTRAVOX_API_KEY is required".into());
    }

    let base = url::Url::parse(&config.api_base_url)
        .map_err(|e| format!("Invalid ULTRAVOX_API_BASE_URL '{}': {e}", config.api_base_url))?;
    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(format!(
            "ULTRAVOX_API_BASE_URL must use http or https, got '{}'",
            base.scheme()
        )
        .into());
    }

    if config.call_type == CallType::Agent && config.agent_id.is_none() {
        return Err("ULTRAVOX_AGENT_ID is required when ULTRAVOX_CALL_TYPE is 'agent'".into());
    }

    Ok(())
}

/// Validate TLS settings and build the TLS configuration
///
/// When TLS is enabled both the certificate and the key path must be set.
pub fn validate_tls_config(
    enabled: bool,
    cert_path: Option<String>,
    key_path: Option<String>,
) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    if !enabled {
        return Ok(None);
    }

    let cert_path = cert_path.ok_or("TLS_CERT_PATH is required when TLS is enabled")?;
    let key_path = key_path.ok_or("TLS_KEY_PATH is required when TLS is enabled")?;

    Ok(Some(TlsConfig {
        cert_path: PathBuf::from(cert_path),
        key_path: PathBuf::from(key_path),
    }))
}

/// Parse a configuration value that must hold a JSON object
pub fn parse_json_object(
    name: &str,
    raw: &str,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("{name} is not valid JSON: {e}"))?;
    if !value.is_object() {
        return Err(format!("{name} must be a JSON object").into());
    }
    Ok(value)
}
