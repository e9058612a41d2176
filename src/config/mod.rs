//! Configuration module for the speech-to-speech gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//! The configuration is split into logical submodules for maintainability.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use sts_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallback
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use utils::parse_bool;

/// Default listening port
pub const DEFAULT_PORT: u16 = 6031;
/// Default Ultravox REST API base
pub const DEFAULT_ULTRAVOX_API_BASE_URL: &str = "https://api.ultravox.ai/api";
/// Default client-side buffer requested from Ultravox, in milliseconds
pub const DEFAULT_CLIENT_BUFFER_SIZE_MS: u32 = 60;

/// TLS configuration for HTTPS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Kind of Ultravox call created for each session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallType {
    /// Call a pre-configured agent (`/agents/{id}/calls`)
    #[default]
    Agent,
    /// Create an ad-hoc call with an inline prompt and voice (`/calls`)
    Generic,
}

impl CallType {
    /// Parse from a configuration value (case insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "agent" => Some(Self::Agent),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Third-party TTS voice used by a generic call instead of an Ultravox voice.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalVoice {
    ElevenLabs {
        voice_id: Option<String>,
        model: String,
        speed: f64,
        use_speaker_boost: bool,
    },
    Cartesia {
        voice_id: Option<String>,
        model: String,
        speed: f64,
    },
    Lmnt {
        voice_id: Option<String>,
        model: String,
        speed: f64,
        conversational: bool,
    },
    /// Any HTTP TTS endpoint
    Generic {
        url: Option<String>,
        /// Extra request headers; always a JSON object
        headers: serde_json::Value,
        /// Request body template; always a JSON object
        body: serde_json::Value,
        response_sample_rate: u32,
        response_words_per_minute: u32,
        response_mime_type: String,
        json_audio_field_path: String,
    },
}

impl ExternalVoice {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::ElevenLabs { .. } => "elevenlabs",
            Self::Cartesia { .. } => "cartesia",
            Self::Lmnt { .. } => "lmnt",
            Self::Generic { .. } => "generic",
        }
    }
}

/// Settings that only apply to generic calls.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericCallConfig {
    pub system_prompt: String,
    pub temperature: f64,
    pub model: String,
    pub voice: String,
    pub recording_enabled: bool,
    pub join_timeout: String,
    pub max_duration: String,
    pub external_voice: Option<ExternalVoice>,
    /// Raw JSON array of tool selections, forwarded as-is when valid
    pub selected_tools: Option<String>,
    /// Raw JSON object of VAD settings, forwarded as-is when valid
    pub vad_settings: Option<String>,
}

impl Default for GenericCallConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful AI assistant.".to_string(),
            temperature: 0.0,
            model: "fixie-ai/ultravox".to_string(),
            voice: "Shaun".to_string(),
            recording_enabled: false,
            join_timeout: "30s".to_string(),
            max_duration: "3600s".to_string(),
            external_voice: None,
            selected_tools: None,
            vad_settings: None,
        }
    }
}

/// Ultravox provider configuration
#[derive(Debug, Clone)]
pub struct UltravoxConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub call_type: CallType,
    /// Required when `call_type` is [`CallType::Agent`]
    pub agent_id: Option<String>,
    pub client_buffer_size_ms: u32,
    pub generic: GenericCallConfig,
}

/// Zeroize the API key when the provider configuration is dropped.
impl Drop for UltravoxConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.api_key.zeroize();
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Ultravox API access and call settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Provider settings
    pub ultravox: UltravoxConfig,
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_server_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}
