use std::env;

use super::utils::{non_empty, parse_bool, parse_or};
use super::validation::{parse_json_object, validate_tls_config};
use super::yaml::{ExternalVoiceYaml, YamlConfig};
use super::{
    CallType, DEFAULT_CLIENT_BUFFER_SIZE_MS, DEFAULT_PORT, DEFAULT_ULTRAVOX_API_BASE_URL,
    ExternalVoice, GenericCallConfig, ServerConfig, UltravoxConfig,
};

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration to use as overrides
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| non_empty(env::var($env_var).ok()))
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            non_empty($yaml_value).or_else(|| non_empty(env::var($env_var).ok()))
        };
    }

    // Server configuration
    let server = yaml.server.unwrap_or_default();
    let host = get_value!("HOST", server.host.clone(), "0.0.0.0");

    let port = if let Some(yaml_port) = server.port {
        yaml_port
    } else if let Ok(port_str) = env::var("PORT") {
        port_str
            .trim()
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT environment variable: {e}"))?
    } else {
        DEFAULT_PORT
    };

    // TLS configuration
    let tls_yaml = server.tls.unwrap_or_default();
    let tls_enabled = tls_yaml
        .enabled
        .or_else(|| env::var("TLS_ENABLED").ok().and_then(|v| parse_bool(&v)))
        .unwrap_or(false);
    let tls = validate_tls_config(
        tls_enabled,
        get_optional!("TLS_CERT_PATH", tls_yaml.cert_path),
        get_optional!("TLS_KEY_PATH", tls_yaml.key_path),
    )?;

    // Ultravox configuration
    let uv = yaml.ultravox.unwrap_or_default();

    let api_key = get_optional!("ULTRAVOX_API_KEY", uv.api_key).unwrap_or_default();
    let api_base_url = get_value!(
        "ULTRAVOX_API_BASE_URL",
        uv.api_base_url,
        DEFAULT_ULTRAVOX_API_BASE_URL
    )
    .trim_end_matches('/')
    .to_string();

    let call_type_raw = get_value!("ULTRAVOX_CALL_TYPE", uv.call_type, "agent");
    let call_type = CallType::parse(&call_type_raw).ok_or_else(|| {
        format!("Invalid ULTRAVOX_CALL_TYPE '{call_type_raw}': expected 'agent' or 'generic'")
    })?;

    let agent_id = get_optional!("ULTRAVOX_AGENT_ID", uv.agent_id);

    let client_buffer_size_ms = if let Some(ms) = uv.client_buffer_size_ms {
        ms
    } else if let Some(ms) = non_empty(env::var("ULTRAVOX_CLIENT_BUFFER_SIZE_MS").ok()) {
        ms.trim()
            .parse::<u32>()
            .map_err(|e| format!("Invalid ULTRAVOX_CLIENT_BUFFER_SIZE_MS: {e}"))?
    } else {
        DEFAULT_CLIENT_BUFFER_SIZE_MS
    };

    // Generic call settings
    let defaults = GenericCallConfig::default();
    let temperature = uv.temperature.unwrap_or_else(|| {
        parse_or(
            env::var("ULTRAVOX_TEMPERATURE").ok().as_deref(),
            defaults.temperature,
        )
    });
    let recording_enabled = uv
        .recording_enabled
        .or_else(|| {
            env::var("ULTRAVOX_RECORDING_ENABLED")
                .ok()
                .and_then(|v| parse_bool(&v))
        })
        .unwrap_or(defaults.recording_enabled);

    // External voice settings are only read for generic calls
    let external_voice = if call_type == CallType::Generic {
        merge_external_voice(uv.external_voice.unwrap_or_default())?
    } else {
        None
    };

    let generic = GenericCallConfig {
        system_prompt: get_value!(
            "ULTRAVOX_SYSTEM_PROMPT",
            uv.system_prompt,
            defaults.system_prompt
        ),
        temperature,
        model: get_value!("ULTRAVOX_MODEL", uv.model, defaults.model),
        voice: get_value!("ULTRAVOX_VOICE", uv.voice, defaults.voice),
        recording_enabled,
        join_timeout: get_value!(
            "ULTRAVOX_JOIN_TIMEOUT",
            uv.join_timeout,
            defaults.join_timeout
        ),
        max_duration: get_value!(
            "ULTRAVOX_MAX_DURATION",
            uv.max_duration,
            defaults.max_duration
        ),
        external_voice,
        selected_tools: get_optional!("ULTRAVOX_SELECTED_TOOLS", uv.selected_tools),
        vad_settings: get_optional!("ULTRAVOX_VAD_SETTINGS", uv.vad_settings),
    };

    Ok(ServerConfig {
        host,
        port,
        tls,
        ultravox: UltravoxConfig {
            api_key,
            api_base_url,
            call_type,
            agent_id,
            client_buffer_size_ms,
            generic,
        },
    })
}

/// Build the external voice for a generic call
///
/// Per-provider environment variables use the provider prefix, for example
/// `ULTRAVOX_ELEVENLABS_VOICE_ID` or `ULTRAVOX_GENERIC_VOICE_URL`. Unknown
/// provider names are logged and ignored.
fn merge_external_voice(
    yaml: ExternalVoiceYaml,
) -> Result<Option<ExternalVoice>, Box<dyn std::error::Error>> {
    let Some(provider) = non_empty(yaml.provider.clone())
        .or_else(|| non_empty(env::var("ULTRAVOX_EXTERNAL_VOICE_PROVIDER").ok()))
    else {
        return Ok(None);
    };
    let provider = provider.trim().to_lowercase();

    let prefix = match provider.as_str() {
        "elevenlabs" => "ULTRAVOX_ELEVENLABS",
        "cartesia" => "ULTRAVOX_CARTESIA",
        "lmnt" => "ULTRAVOX_LMNT",
        "generic" => "ULTRAVOX_GENERIC_VOICE",
        other => {
            tracing::warn!(
                provider = %other,
                "Unknown ULTRAVOX_EXTERNAL_VOICE_PROVIDER, ignoring external voice"
            );
            return Ok(None);
        }
    };

    let env_of = |suffix: &str| non_empty(env::var(format!("{prefix}_{suffix}")).ok());
    let string =
        |yaml_value: Option<String>, suffix: &str| non_empty(yaml_value).or_else(|| env_of(suffix));
    let speed = yaml
        .speed
        .unwrap_or_else(|| parse_or(env_of("SPEED").as_deref(), 1.0));
    let flag = |yaml_value: Option<bool>, suffix: &str| {
        yaml_value
            .or_else(|| env_of(suffix).and_then(|v| parse_bool(&v)))
            .unwrap_or(true)
    };

    let voice = match provider.as_str() {
        "elevenlabs" => ExternalVoice::ElevenLabs {
            voice_id: string(yaml.voice_id, "VOICE_ID"),
            model: string(yaml.model, "MODEL")
                .unwrap_or_else(|| "eleven_monolingual_v1".to_string()),
            speed,
            use_speaker_boost: flag(yaml.use_speaker_boost, "USE_SPEAKER_BOOST"),
        },
        "cartesia" => ExternalVoice::Cartesia {
            voice_id: string(yaml.voice_id, "VOICE_ID"),
            model: string(yaml.model, "MODEL").unwrap_or_else(|| "cartesia-1".to_string()),
            speed,
        },
        "lmnt" => ExternalVoice::Lmnt {
            voice_id: string(yaml.voice_id, "VOICE_ID"),
            model: string(yaml.model, "MODEL").unwrap_or_else(|| "lmnt-1".to_string()),
            speed,
            conversational: flag(yaml.conversational, "CONVERSATIONAL"),
        },
        _ => {
            let headers_name = format!("{prefix}_HEADERS");
            let body_name = format!("{prefix}_BODY");
            let headers = match string(yaml.headers, "HEADERS") {
                Some(raw) => parse_json_object(&headers_name, &raw)?,
                None => serde_json::json!({}),
            };
            let body = match string(yaml.body, "BODY") {
                Some(raw) => parse_json_object(&body_name, &raw)?,
                None => serde_json::json!({}),
            };

            ExternalVoice::Generic {
                url: string(yaml.url, "URL"),
                headers,
                body,
                response_sample_rate: yaml
                    .sample_rate
                    .unwrap_or_else(|| parse_or(env_of("SAMPLE_RATE").as_deref(), 24000)),
                response_words_per_minute: yaml
                    .words_per_minute
                    .unwrap_or_else(|| parse_or(env_of("WPM").as_deref(), 150)),
                response_mime_type: string(yaml.mime_type, "MIME_TYPE")
                    .unwrap_or_else(|| "audio/wav".to_string()),
                json_audio_field_path: string(yaml.audio_field, "AUDIO_FIELD")
                    .unwrap_or_else(|| "audio".to_string()),
            }
        }
    };

    Ok(Some(voice))
}
