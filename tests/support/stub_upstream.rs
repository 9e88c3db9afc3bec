//! Real local upstream stubs over loopback, standing in for OpenAI/Claude/
//! Gemini-shaped gateways. Exercised over an actual `TcpListener` rather
//! than a mocking crate, so probes run through the genuine HTTP/SSE stack.

use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use futures::stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::net::TcpListener;

pub struct StubServer {
    pub base_url: String,
}

async fn spawn(router: Router) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener has a local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    StubServer {
        base_url: format!("http://{addr}"),
    }
}

fn sse_body(chunks: Vec<String>) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let events = stream::iter(chunks.into_iter().map(|c| Ok(Event::default().data(c))));
    Sse::new(events)
}

/// A Chat-completions stub that streams `"1"` then `"."`  then `[DONE]`.
pub async fn spawn_chat_success() -> StubServer {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            sse_body(vec![
                json!({"choices":[{"delta":{"content":"1+1"}}]}).to_string(),
                json!({"choices":[{"delta":{"content":"=2, yes"}}]}).to_string(),
                "[DONE]".to_string(),
            ])
        }),
    );
    spawn(router).await
}

/// A Chat-completions stub whose 2xx body hides an error per §4.2's
/// hidden-error rules, non-streaming so the body is read as plain JSON.
pub async fn spawn_chat_hidden_error() -> StubServer {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"success": false, "message": "insufficient_quota"})) }),
    );
    spawn(router).await
}

/// Claude `/v1/messages`: fails on the first (non-thinking) attempt and
/// succeeds once `thinking` is present in the request body, exercising the
/// retry path (§4.1/§4.2 "Claude retry").
pub async fn spawn_claude_retry_then_success() -> StubServer {
    let router = Router::new().route(
        "/v1/messages",
        post(|Json(body): Json<Value>| async move {
            if body.get("thinking").is_some() {
                sse_body(vec![
                    json!({"type":"content_block_delta","delta":{"text":"yes"}}).to_string(),
                    "[DONE]".to_string(),
                ])
                .into_response()
            } else {
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "overloaded").into_response()
            }
        }),
    );
    spawn(router).await
}

pub async fn spawn_gemini_success() -> StubServer {
    let router = Router::new().route(
        "/v1beta/models/{model}:generateContent",
        post(|| async { Json(json!({"candidates":[{"content":{"parts":[{"text":"yes"}]}}]})) }),
    );
    spawn(router).await
}
