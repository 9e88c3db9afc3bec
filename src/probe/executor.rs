//! Probe Executor (C1, §4.2). Builds a request from `probe::template`,
//! runs it under a 30s hard deadline, classifies the outcome, and never
//! returns `Err` — the probe boundary always produces a `ProbeOutcome`
//! (§7 "Propagation policy").

use super::parse::{extract_response_content, hidden_error_message, StreamAccumulator};
use super::template::{self, RequestTemplate};
use super::{ProbeJob, ProbeOutcome, ProbeStatus};
use crate::domain::EndpointType;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ProbeExecutor {
    /// One client per distinct proxy string (§9 "Worker runtime": "do not
    /// share HTTP clients across proxy configurations").
    clients: RwLock<HashMap<Option<String>, Client>>,
    default_proxy: Option<String>,
    prompt: String,
}

impl ProbeExecutor {
    pub fn new(default_proxy: Option<String>, prompt: String) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            default_proxy,
            prompt,
        }
    }

    async fn client_for(&self, proxy: &Option<String>) -> Result<Client, ProbeOutcome> {
        let effective = proxy.clone().or_else(|| self.default_proxy.clone());
        if let Some(client) = self.clients.read().await.get(&effective) {
            return Ok(client.clone());
        }
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4);
        if let Some(proxy_url) = &effective {
            match reqwest::Proxy::all(proxy_url) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => {
                    return Err(ProbeOutcome {
                        status: ProbeStatus::Fail,
                        latency_ms: 0,
                        status_code: None,
                        endpoint_type: EndpointType::Chat,
                        error_msg: Some(format!("invalid proxy {proxy_url}: {e}")),
                        response_content: None,
                    });
                }
            }
        }
        let client = builder.build().expect("reqwest client configuration is valid");
        self.clients.write().await.insert(effective, client.clone());
        Ok(client)
    }

    /// Run one probe to completion, including the Claude-with-thinking
    /// retry when applicable (§4.2 "Claude retry").
    pub async fn probe(&self, job: &ProbeJob) -> ProbeOutcome {
        let start = Instant::now();
        let client = match self.client_for(&job.proxy).await {
            Ok(c) => c,
            Err(mut outcome) => {
                outcome.endpoint_type = job.endpoint_type;
                return outcome;
            }
        };

        let template = template::build(&job.base_url, &job.api_key, &job.model_name, job.endpoint_type, &self.prompt);
        let mut outcome = self.run_template(&client, &template, job.endpoint_type, start).await;

        let retry_eligible = !matches!(outcome.status_code, Some(code) if (200..300).contains(&code));
        if job.endpoint_type == EndpointType::Claude && retry_eligible {
            let retry_template = template::claude_thinking_retry(&job.base_url, &job.api_key, &job.model_name, &self.prompt);
            let retry_outcome = self.run_template(&client, &retry_template, EndpointType::Claude, start).await;
            if retry_outcome.is_success() {
                outcome = retry_outcome;
            }
        }

        outcome
    }

    async fn run_template(&self, client: &Client, template: &RequestTemplate, endpoint: EndpointType, start: Instant) -> ProbeOutcome {
        let mut builder = client.post(&template.url);
        for (name, value) in &template.headers {
            builder = builder.header(*name, value);
        }
        builder = builder.header("Content-Type", "application/json").json(&template.body);

        let response = match tokio::time::timeout(PROBE_TIMEOUT, builder.send()).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                return transport_failure(endpoint, start, e);
            }
            Err(_) => {
                return ProbeOutcome {
                    status: ProbeStatus::Fail,
                    latency_ms: start.elapsed().as_millis() as u64,
                    status_code: None,
                    endpoint_type: endpoint,
                    error_msg: Some("Timeout after 30000ms".to_string()),
                    response_content: None,
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated = crate::domain::truncate_chars(&body, 500);
            return ProbeOutcome {
                status: ProbeStatus::Fail,
                latency_ms: start.elapsed().as_millis() as u64,
                status_code: Some(status.as_u16()),
                endpoint_type: endpoint,
                error_msg: Some(format!("HTTP {}: {}", status.as_u16(), truncated)),
                response_content: None,
            };
        }

        // §4.2: the streaming-vs-JSON parser is chosen by the response's
        // actual content-type, not the template's requested `stream:true` —
        // an upstream is free to ignore that hint and answer with plain JSON.
        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if template.streaming && is_event_stream {
            self.read_stream(response, endpoint, start).await
        } else {
            self.read_json(response, endpoint, start).await
        }
    }

    async fn read_json(&self, response: reqwest::Response, endpoint: EndpointType, start: Instant) -> ProbeOutcome {
        let latency_ms = start.elapsed().as_millis() as u64;
        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(_) => {
                // §7 ParsingError: outcome stays SUCCESS, responseContent omitted.
                return ProbeOutcome {
                    status: ProbeStatus::Success,
                    latency_ms,
                    status_code: Some(200),
                    endpoint_type: endpoint,
                    error_msg: None,
                    response_content: None,
                };
            }
        };

        if let Some(msg) = hidden_error_message(&body) {
            return ProbeOutcome {
                status: ProbeStatus::Fail,
                latency_ms,
                status_code: Some(200),
                endpoint_type: endpoint,
                error_msg: Some(msg),
                response_content: None,
            };
        }

        ProbeOutcome {
            status: ProbeStatus::Success,
            latency_ms,
            status_code: Some(200),
            endpoint_type: endpoint,
            error_msg: None,
            response_content: extract_response_content(&body, endpoint),
        }
    }

    async fn read_stream(&self, response: reqwest::Response, endpoint: EndpointType, start: Instant) -> ProbeOutcome {
        let mut stream = response.bytes_stream().eventsource();
        let mut accumulator = StreamAccumulator::new(endpoint);
        let mut last_event: Option<Value> = None;

        loop {
            match tokio::time::timeout(PROBE_TIMEOUT.saturating_sub(start.elapsed()), stream.next()).await {
                Ok(Some(Ok(event))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
                        last_event = Some(value);
                    }
                    if accumulator.feed(&event.data) {
                        break;
                    }
                }
                Ok(Some(Err(_))) => break,
                Ok(None) => break,
                Err(_) => {
                    return ProbeOutcome {
                        status: ProbeStatus::Fail,
                        latency_ms: start.elapsed().as_millis() as u64,
                        status_code: None,
                        endpoint_type: endpoint,
                        error_msg: Some("Timeout after 30000ms".to_string()),
                        response_content: None,
                    };
                }
            }
        }

        let latency_ms = start.elapsed().as_millis() as u64;

        if let Some(body) = &last_event {
            if let Some(msg) = hidden_error_message(body) {
                return ProbeOutcome {
                    status: ProbeStatus::Fail,
                    latency_ms,
                    status_code: Some(200),
                    endpoint_type: endpoint,
                    error_msg: Some(msg),
                    response_content: None,
                };
            }
        }

        ProbeOutcome {
            status: ProbeStatus::Success,
            latency_ms,
            status_code: Some(200),
            endpoint_type: endpoint,
            error_msg: None,
            response_content: accumulator.finish(),
        }
    }
}

fn transport_failure(endpoint: EndpointType, start: Instant, e: reqwest::Error) -> ProbeOutcome {
    let msg = if e.is_timeout() {
        "Timeout after 30000ms".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("transport error: {e}")
    };
    ProbeOutcome {
        status: ProbeStatus::Fail,
        latency_ms: start.elapsed().as_millis() as u64,
        status_code: None,
        endpoint_type: endpoint,
        error_msg: Some(msg),
        response_content: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeJob;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    // GEMINI is the non-streaming variant (§4.1), so a plain JSON stub
    // response exercises `read_json` without needing an SSE framing layer.
    async fn spawn_gemini_stub(body: Value) -> String {
        let app = Router::new().route(
            "/v1beta/models/{model}:generateContent",
            post(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn job_for(base_url: String, endpoint_type: EndpointType) -> ProbeJob {
        ProbeJob {
            channel_id: "c1".to_string(),
            model_id: "m1".to_string(),
            model_name: "gemini-2.0-flash".to_string(),
            base_url,
            api_key: "sk-x".to_string(),
            proxy: None,
            endpoint_type,
        }
    }

    #[tokio::test]
    async fn happy_path_success() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "yes"}]}}]});
        let base_url = spawn_gemini_stub(body).await;
        let executor = ProbeExecutor::new(None, "1+1=2? yes or no".to_string());
        let outcome = executor.probe(&job_for(base_url, EndpointType::Gemini)).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.response_content.as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn hidden_error_body_fails() {
        let body = json!({"success": false, "message": "quota exceeded"});
        let base_url = spawn_gemini_stub(body).await;
        let executor = ProbeExecutor::new(None, "1+1=2? yes or no".to_string());
        let outcome = executor.probe(&job_for(base_url, EndpointType::Gemini)).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_msg.as_deref(), Some("quota exceeded"));
    }
}
