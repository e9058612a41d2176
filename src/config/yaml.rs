use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Missing values fall
/// back to environment variables and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 6031
///   tls:
///     enabled: false
///
/// ultravox:
///   api_key: "your-ultravox-key"
///   call_type: "generic"
///   client_buffer_size_ms: 60
///   system_prompt: "You are a friendly receptionist."
///   temperature: 0.4
///   voice: "Mark"
///   recording_enabled: true
///   selected_tools: '[{"toolName":"hangUp"}]'
///   external_voice:
///     provider: "elevenlabs"
///     voice_id: "21m00Tcm4TlvDq8ikWAM"
///     speed: 1.1
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub ultravox: Option<UltravoxYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Ultravox configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UltravoxYaml {
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    /// "agent" or "generic"
    pub call_type: Option<String>,
    pub agent_id: Option<String>,
    pub client_buffer_size_ms: Option<u32>,

    // Generic call settings
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub recording_enabled: Option<bool>,
    pub join_timeout: Option<String>,
    pub max_duration: Option<String>,
    /// Raw JSON, forwarded as `selectedTools`
    pub selected_tools: Option<String>,
    /// Raw JSON, forwarded as `vadSettings`
    pub vad_settings: Option<String>,
    pub external_voice: Option<ExternalVoiceYaml>,
}

/// External voice configuration from YAML
///
/// Fields that do not apply to the selected provider are ignored.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ExternalVoiceYaml {
    /// elevenlabs, cartesia, lmnt or generic
    pub provider: Option<String>,
    pub voice_id: Option<String>,
    pub model: Option<String>,
    pub speed: Option<f64>,
    pub use_speaker_boost: Option<bool>,
    pub conversational: Option<bool>,

    // Generic provider
    pub url: Option<String>,
    /// JSON object as a string
    pub headers: Option<String>,
    /// JSON object as a string
    pub body: Option<String>,
    pub sample_rate: Option<u32>,
    pub words_per_minute: Option<u32>,
    pub mime_type: Option<String>,
    pub audio_field: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
