//! Response parsing (§4.2): hidden-error detection, per-endpoint field
//! extraction, SSE delta reassembly, `<think>` stripping.

use crate::domain::{truncate_chars, EndpointType};
use serde_json::Value;

const MAX_CONTENT_CHARS: usize = 500;

/// §4.2 "Outcome classification" hidden-error rules, checked on a 2xx body.
pub fn hidden_error_message(body: &Value) -> Option<String> {
    if let Some(err) = body.get("error") {
        if let Some(s) = err.as_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        } else if let Some(msg) = err.get("message").and_then(Value::as_str) {
            return Some(msg.to_string());
        }
    }

    if body.get("success").and_then(Value::as_bool) == Some(false) {
        if let Some(msg) = body.get("message").and_then(Value::as_str) {
            return Some(msg.to_string());
        }
    }

    if let Some(code) = body.get("code").and_then(Value::as_i64) {
        if code != 0 {
            if let Some(msg) = body.get("message").and_then(Value::as_str) {
                return Some(format!("[{code}] {msg}"));
            }
        }
    }

    if let Some(status) = body.get("status").and_then(Value::as_str) {
        if matches!(status, "error" | "fail" | "failed") {
            return Some(format!("upstream status: {status}"));
        }
    }

    None
}

/// §4.2 "Response body parsing by endpoint", non-streaming JSON bodies.
/// Returns up to 500 chars, with `<think>` blocks stripped.
pub fn extract_response_content(body: &Value, endpoint: EndpointType) -> Option<String> {
    let raw = match endpoint {
        EndpointType::Chat => extract_chat(body),
        EndpointType::Claude => extract_claude(body),
        EndpointType::Gemini => extract_gemini(body),
        EndpointType::Codex => extract_codex(body),
        EndpointType::Image => extract_image(body),
    }?;
    Some(truncate_chars(&strip_think(&raw), MAX_CONTENT_CHARS))
}

fn extract_chat(body: &Value) -> Option<String> {
    let choice = body.get("choices").and_then(|c| c.get(0))?;
    if let Some(s) = choice.pointer("/message/content").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(s) = choice.pointer("/message/reasoning_content").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(s) = choice.pointer("/message/refusal").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(s) = choice.pointer("/delta/content").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    choice.get("text").and_then(Value::as_str).map(str::to_string)
}

fn extract_claude(body: &Value) -> Option<String> {
    let blocks = body.get("content")?.as_array()?;
    for block in blocks {
        if block.get("type").and_then(Value::as_str) == Some("text") {
            if let Some(s) = block.get("text").and_then(Value::as_str) {
                return Some(s.to_string());
            }
        }
    }
    blocks.first()?.get("text").and_then(Value::as_str).map(str::to_string)
}

fn extract_gemini(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    for part in parts {
        if part.get("thought").and_then(Value::as_bool) != Some(true) {
            if let Some(s) = part.get("text").and_then(Value::as_str) {
                return Some(s.to_string());
            }
        }
    }
    parts.first()?.get("text").and_then(Value::as_str).map(str::to_string)
}

fn extract_codex(body: &Value) -> Option<String> {
    let outputs = body.get("output")?.as_array()?;
    for output in outputs {
        if let Some(contents) = output.get("content").and_then(Value::as_array) {
            for content in contents {
                if content.get("type").and_then(Value::as_str) == Some("output_text") {
                    if let Some(s) = content.get("text").and_then(Value::as_str) {
                        return Some(s.to_string());
                    }
                }
            }
        }
    }
    outputs.iter().find_map(|o| o.get("text").and_then(Value::as_str)).map(str::to_string)
}

fn extract_image(body: &Value) -> Option<String> {
    let first = body.get("data")?.as_array()?.first()?;
    if let Some(url) = first.get("url").and_then(Value::as_str) {
        return Some(format!("[Image URL: {url}]"));
    }
    if let Some(b64) = first.get("b64_json").and_then(Value::as_str) {
        return Some(format!("[Image generated: base64 data, {} chars]", b64.len()));
    }
    Some("[Image generated with prompt: A simple red circle on white background]".to_string())
}

/// Strip `<think>...</think>` blocks, including an unclosed trailing
/// `<think>` (§4.2). If stripping leaves the empty string, keep the original.
pub fn strip_think(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("<think>") {
            Some(start) => {
                result.push_str(&rest[..start]);
                let after_open = &rest[start + "<think>".len()..];
                match after_open.find("</think>") {
                    Some(end) => {
                        rest = &after_open[end + "</think>".len()..];
                    }
                    None => {
                        // Unclosed trailing <think> swallows the remainder.
                        rest = "";
                        break;
                    }
                }
            }
            None => {
                result.push_str(rest);
                break;
            }
        }
    }
    if result.trim().is_empty() {
        text.to_string()
    } else {
        result
    }
}

/// Accumulator for reassembling streamed deltas per endpoint family (§4.2
/// "For streaming responses... re-assemble delta tokens per family").
#[derive(Default)]
pub struct StreamAccumulator {
    endpoint: Option<EndpointType>,
    buffer: String,
    codex_done_override: Option<String>,
}

impl StreamAccumulator {
    pub fn new(endpoint: EndpointType) -> Self {
        Self {
            endpoint: Some(endpoint),
            buffer: String::new(),
            codex_done_override: None,
        }
    }

    /// Feed one SSE `data:` payload. Returns `true` if this was the
    /// terminal `[DONE]` marker.
    pub fn feed(&mut self, data: &str) -> bool {
        if data.trim() == "[DONE]" {
            return true;
        }
        let Ok(value) = serde_json::from_str::<Value>(data) else {
            return false;
        };
        match self.endpoint.unwrap_or(EndpointType::Chat) {
            EndpointType::Chat | EndpointType::Claude => {
                // CHAT: choices[].delta.content; CLAUDE: content_block_delta.delta.text
                if let Some(choices) = value.get("choices").and_then(Value::as_array) {
                    for choice in choices {
                        if let Some(s) = choice.pointer("/delta/content").and_then(Value::as_str) {
                            self.buffer.push_str(s);
                        }
                    }
                }
                if value.get("type").and_then(Value::as_str) == Some("content_block_delta") {
                    if let Some(s) = value.pointer("/delta/text").and_then(Value::as_str) {
                        self.buffer.push_str(s);
                    }
                }
            }
            EndpointType::Codex => {
                if let Some(s) = value.pointer("/response/output_text/delta").and_then(Value::as_str) {
                    self.buffer.push_str(s);
                }
                if let Some(s) = value.pointer("/response/output_text/done/text").and_then(Value::as_str) {
                    self.codex_done_override = Some(s.to_string());
                }
            }
            EndpointType::Gemini | EndpointType::Image => {}
        }
        false
    }

    pub fn finish(self) -> Option<String> {
        let raw = self.codex_done_override.unwrap_or(self.buffer);
        if raw.is_empty() {
            None
        } else {
            Some(truncate_chars(&strip_think(&raw), MAX_CONTENT_CHARS))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hidden_error_string_field() {
        let body = json!({"error": "quota exceeded"});
        assert_eq!(hidden_error_message(&body), Some("quota exceeded".to_string()));
    }

    #[test]
    fn hidden_error_success_false() {
        let body = json!({"success": false, "message": "quota exceeded"});
        assert_eq!(hidden_error_message(&body), Some("quota exceeded".to_string()));
    }

    #[test]
    fn hidden_error_nonzero_code() {
        let body = json!({"code": 42, "message": "bad"});
        assert_eq!(hidden_error_message(&body), Some("[42] bad".to_string()));
    }

    #[test]
    fn hidden_error_status_field() {
        let body = json!({"status": "failed"});
        assert_eq!(hidden_error_message(&body), Some("upstream status: failed".to_string()));
    }

    #[test]
    fn no_hidden_error_on_clean_success() {
        let body = json!({"choices": [{"message": {"content": "yes"}}]});
        assert_eq!(hidden_error_message(&body), None);
    }

    #[test]
    fn extract_chat_content() {
        let body = json!({"choices": [{"message": {"content": "yes"}}]});
        assert_eq!(extract_response_content(&body, EndpointType::Chat), Some("yes".to_string()));
    }

    #[test]
    fn extract_claude_text_block() {
        let body = json!({"content": [{"type": "text", "text": "hi"}]});
        assert_eq!(extract_response_content(&body, EndpointType::Claude), Some("hi".to_string()));
    }

    #[test]
    fn strip_think_closed_block() {
        assert_eq!(strip_think("<think>reasoning</think>answer"), "answer");
    }

    #[test]
    fn strip_think_unclosed_trailing() {
        assert_eq!(strip_think("answer<think>still going"), "answer");
    }

    #[test]
    fn strip_think_keeps_original_if_result_empty() {
        assert_eq!(strip_think("<think>only thoughts</think>"), "<think>only thoughts</think>");
    }

    #[test]
    fn stream_accumulator_chat_deltas() {
        let mut acc = StreamAccumulator::new(EndpointType::Chat);
        assert!(!acc.feed(r#"{"choices":[{"delta":{"content":"he"}}]}"#));
        assert!(!acc.feed(r#"{"choices":[{"delta":{"content":"llo"}}]}"#));
        assert!(acc.feed("[DONE]"));
        assert_eq!(acc.finish(), Some("hello".to_string()));
    }

    #[test]
    fn stream_accumulator_codex_done_override() {
        let mut acc = StreamAccumulator::new(EndpointType::Codex);
        acc.feed(r#"{"response":{"output_text":{"delta":"partial"}}}"#);
        acc.feed(r#"{"response":{"output_text":{"done":{"text":"final"}}}}"#);
        assert_eq!(acc.finish(), Some("final".to_string()));
    }
}
