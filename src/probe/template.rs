//! Request templates per endpoint variant (§4.1 "Request template per variant").

use crate::domain::EndpointType;
use serde_json::{json, Value};

pub struct RequestTemplate {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
    /// Whether the upstream is expected to respond `text/event-stream`.
    pub streaming: bool,
}

/// Build the request template for a probe (§4.1). `prompt` is the
/// configurable probe text (default "1+1=2? yes or no", §4.1).
pub fn build(base_url: &str, api_key: &str, model_name: &str, endpoint: EndpointType, prompt: &str) -> RequestTemplate {
    match endpoint {
        EndpointType::Chat => RequestTemplate {
            url: format!("{base_url}/v1/chat/completions"),
            headers: vec![("Authorization", format!("Bearer {api_key}"))],
            body: json!({
                "model": model_name,
                "max_tokens": 50,
                "stream": true,
                "messages": [{"role": "user", "content": prompt}],
            }),
            streaming: true,
        },
        EndpointType::Claude => claude_template(base_url, api_key, model_name, prompt, false),
        EndpointType::Gemini => RequestTemplate {
            url: format!("{base_url}/v1beta/models/{model_name}:generateContent"),
            headers: vec![("x-goog-api-key", api_key.to_string())],
            body: json!({
                "contents": [{"parts": [{"text": prompt}]}],
                "generationConfig": {"maxOutputTokens": 10},
            }),
            streaming: false,
        },
        EndpointType::Codex => RequestTemplate {
            url: format!("{base_url}/v1/responses"),
            headers: vec![("Authorization", format!("Bearer {api_key}"))],
            body: json!({
                "model": model_name,
                "stream": true,
                "input": [{
                    "role": "user",
                    "content": [{"type": "input_text", "text": prompt}],
                }],
            }),
            streaming: true,
        },
        EndpointType::Image => RequestTemplate {
            url: format!("{base_url}/v1/images/generations"),
            headers: vec![("Authorization", format!("Bearer {api_key}"))],
            body: json!({
                "model": model_name,
                "prompt": "A simple red circle on white background",
                "n": 1,
                "size": "256x256",
                "response_format": "url",
            }),
            streaming: false,
        },
    }
}

/// The Claude-with-thinking retry template (§4.1 last bullet, §4.2 "Claude retry").
pub fn claude_thinking_retry(base_url: &str, api_key: &str, model_name: &str, prompt: &str) -> RequestTemplate {
    claude_template(base_url, api_key, model_name, prompt, true)
}

fn claude_template(base_url: &str, api_key: &str, model_name: &str, prompt: &str, thinking: bool) -> RequestTemplate {
    let max_tokens = if thinking { 2048 } else { 50 };
    let mut body = json!({
        "model": model_name,
        "max_tokens": max_tokens,
        "stream": true,
        "messages": [{"role": "user", "content": prompt}],
    });
    if thinking {
        body["thinking"] = json!({"type": "enabled", "budget_tokens": 1024});
    }
    RequestTemplate {
        url: format!("{base_url}/v1/messages"),
        headers: vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", "2023-06-01".to_string()),
        ],
        body,
        streaming: true,
    }
}
