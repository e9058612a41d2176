//! Mock Ultravox endpoints for end-to-end relay tests
//!
//! - HTTP call creation is served by `wiremock`
//! - The call's WebSocket medium is a scripted `tokio-tungstenite` server

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod ultravox_mock;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sts_gateway::config::{CallType, GenericCallConfig, UltravoxConfig};

pub const TEST_API_KEY: &str = "test-ultravox-key";
pub const TEST_AGENT_ID: &str = "agent-123";

/// Agent-call configuration pointing at a mock API base URL.
pub fn agent_config(api_base_url: &str) -> UltravoxConfig {
    UltravoxConfig {
        api_key: TEST_API_KEY.to_string(),
        api_base_url: api_base_url.to_string(),
        call_type: CallType::Agent,
        agent_id: Some(TEST_AGENT_ID.to_string()),
        client_buffer_size_ms: 60,
        generic: GenericCallConfig::default(),
    }
}

/// Serve a successful agent call creation that hands out `join_url`.
pub async fn mount_agent_call(server: &MockServer, join_url: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/agents/{TEST_AGENT_ID}/calls")))
        .and(header("X-API-Key", TEST_API_KEY))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "callId": "mock-call-1",
            "joinUrl": join_url,
        })))
        .expect(1)
        .mount(server)
        .await;
}
