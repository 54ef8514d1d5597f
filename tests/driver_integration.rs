//! Model drivers against a local fake backend.

mod common;

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use mcp_fs_chat::error::ChatError;
use mcp_fs_chat::llm::{ChatMessage, LlmProtocol, LlmSettings, Orchestrator, OrchestratorOptions};
use mcp_fs_chat::mcp::ToolSource;
use mcp_fs_chat::normalized::NormalizedResponse;
use serde_json::{Value, json};

use common::FakeSource;

const API_KEY: &str = "test-key";

/// One request as the fake backend received it.
#[derive(Debug)]
struct Seen {
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Value,
}

#[derive(Clone)]
struct Backend {
    status: StatusCode,
    reply: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

async fn answer(
    State(backend): State<Backend>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    backend.seen.lock().unwrap().push(Seen {
        path: uri.path().to_string(),
        query: uri.query().map(ToString::to_string),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    (
        backend.status,
        [(header::CONTENT_TYPE, "application/json")],
        backend.reply,
    )
        .into_response()
}

/// Serve `reply` with `status` for every request; returns the base URL.
async fn spawn_backend(status: StatusCode, reply: String) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(answer).with_state(Backend {
        status,
        reply,
        seen: Arc::clone(&seen),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), seen)
}

fn orchestrator(protocol: LlmProtocol, base_url: String, source: &FakeSource) -> Orchestrator {
    let model = match protocol {
        LlmProtocol::Gemini => "gemini-2.5-flash",
        LlmProtocol::Chat => "gpt-4o-mini",
    };
    let settings = LlmSettings {
        protocol,
        base_url: Some(base_url),
        api_key: Some(API_KEY.to_string()),
        model: model.to_string(),
        temperature: 0.7,
    };
    let tools: Option<Arc<dyn ToolSource>> = Some(Arc::new(source.clone()));
    Orchestrator::new(settings, tools, OrchestratorOptions::default())
}

fn listing_source() -> FakeSource {
    FakeSource::filesystem(json!({"content": [{"type": "text", "text": "[FILE] report.pdf"}]}))
}

fn ask(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(text)]
}

fn expect_model_error(response: NormalizedResponse) -> String {
    match response {
        NormalizedResponse::Failure(ChatError::Model { details, .. }) => details,
        other => panic!("expected model error, got {other:?}"),
    }
}

fn gemini_reply(parts: &Value) -> String {
    json!({"candidates": [{"content": {"role": "model", "parts": parts}}]}).to_string()
}

#[tokio::test]
async fn test_gemini_text_answer() {
    let (base, seen) = spawn_backend(StatusCode::OK, gemini_reply(&json!([{"text": "Hi there"}]))).await;
    let source = listing_source();

    let response = orchestrator(LlmProtocol::Gemini, format!("{base}/v1beta"), &source)
        .handle(ask("hello"))
        .await;

    assert!(matches!(
        response,
        NormalizedResponse::Success { ref text, tool_name: None } if text == "Hi there"
    ));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.path, "/v1beta/models/gemini-2.5-flash:generateContent");
    assert_eq!(request.query, None);
    assert_eq!(request.headers["x-goog-api-key"], API_KEY);
    assert_eq!(request.body["contents"][0]["role"], "user");
    assert_eq!(request.body["contents"][0]["parts"][0]["text"], "hello");

    let declared: Vec<&str> = request.body["tools"][0]["functionDeclarations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(declared, vec!["list_directory", "read_file"]);
    let temperature = request.body["generationConfig"]["temperature"].as_f64().unwrap();
    assert!((temperature - 0.7).abs() < 1e-6);
    assert_eq!(source.counters.closes(), 1);
}

#[tokio::test]
async fn test_gemini_function_call_round_trip() {
    let reply = gemini_reply(&json!([
        {"functionCall": {"name": "list_directory", "args": {"path": "/tmp"}}}
    ]));
    let (base, _seen) = spawn_backend(StatusCode::OK, reply).await;
    let source = listing_source();

    let response = orchestrator(LlmProtocol::Gemini, base, &source)
        .handle(ask("list files in /tmp"))
        .await;

    match response {
        NormalizedResponse::Success { text, tool_name } => {
            assert_eq!(text, "[FILE] report.pdf");
            assert_eq!(tool_name.as_deref(), Some("list_directory"));
        }
        NormalizedResponse::Failure(e) => panic!("unexpected failure: {e}"),
    }
    assert_eq!(source.counters.calls(), 1);
    let args = source.counters.last_arguments.lock().unwrap().clone().unwrap();
    assert_eq!(args["path"], "/tmp");
    assert_eq!(source.counters.closes(), 1);
}

#[tokio::test]
async fn test_gemini_rate_limit_is_model_error() {
    let reply = json!({"error": {"code": 429, "message": "Resource has been exhausted"}}).to_string();
    let (base, _seen) = spawn_backend(StatusCode::TOO_MANY_REQUESTS, reply).await;
    let source = listing_source();

    let details = expect_model_error(
        orchestrator(LlmProtocol::Gemini, base, &source)
            .handle(ask("hi"))
            .await,
    );

    assert!(details.contains("429"));
    assert!(details.contains("Resource has been exhausted"));
    assert_eq!(source.counters.closes(), 1);
}

#[tokio::test]
async fn test_gemini_undecodable_body_is_model_error() {
    let (base, _seen) = spawn_backend(StatusCode::OK, "<html>gateway</html>".to_string()).await;
    let source = listing_source();

    let details = expect_model_error(
        orchestrator(LlmProtocol::Gemini, base, &source)
            .handle(ask("hi"))
            .await,
    );

    assert!(details.contains("Failed to decode Gemini response"));
    assert_eq!(source.counters.closes(), 1);
}

#[tokio::test]
async fn test_gemini_call_to_unknown_function_is_model_error() {
    let reply = gemini_reply(&json!([
        {"functionCall": {"name": "delete_everything", "args": {}}}
    ]));
    let (base, _seen) = spawn_backend(StatusCode::OK, reply).await;
    let source = listing_source();

    let details = expect_model_error(
        orchestrator(LlmProtocol::Gemini, base, &source)
            .handle(ask("clean up"))
            .await,
    );

    assert!(details.contains("unknown tool: delete_everything"));
    assert_eq!(source.counters.calls(), 0);
    assert_eq!(source.counters.closes(), 1);
}

fn chat_reply(arguments: &str) -> String {
    json!({
        "choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "read_file", "arguments": arguments}
            }]
        }}]
    })
    .to_string()
}

#[tokio::test]
async fn test_chat_completions_bearer_and_round_trip() {
    let (base, seen) = spawn_backend(StatusCode::OK, chat_reply(r#"{"path":"/tmp/notes.txt"}"#)).await;
    let source = listing_source();

    let response = orchestrator(LlmProtocol::Chat, base, &source)
        .handle(ask("read my notes"))
        .await;

    assert!(matches!(
        response,
        NormalizedResponse::Success { ref tool_name, .. } if tool_name.as_deref() == Some("read_file")
    ));
    let args = source.counters.last_arguments.lock().unwrap().clone().unwrap();
    assert_eq!(args["path"], "/tmp/notes.txt");

    let seen = seen.lock().unwrap();
    let request = &seen[0];
    assert_eq!(request.path, "/v1/chat/completions");
    assert_eq!(request.headers[header::AUTHORIZATION], "Bearer test-key");
    assert_eq!(request.body["model"], "gpt-4o-mini");
    assert_eq!(request.body["stream"], false);
    assert_eq!(request.body["messages"][0], json!({"role": "user", "content": "read my notes"}));
    assert_eq!(request.body["tools"][0]["function"]["name"], "list_directory");
}

#[tokio::test]
async fn test_chat_completions_server_error_is_model_error() {
    let (base, _seen) =
        spawn_backend(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"upstream"}"#.to_string()).await;
    let source = listing_source();

    let details = expect_model_error(
        orchestrator(LlmProtocol::Chat, base, &source)
            .handle(ask("hi"))
            .await,
    );

    assert!(details.contains("500"));
    assert!(details.contains("upstream"));
    assert_eq!(source.counters.closes(), 1);
}

#[tokio::test]
async fn test_chat_completions_truncated_arguments_never_run_tool() {
    let (base, _seen) = spawn_backend(StatusCode::OK, chat_reply(r#"{"path": "/tmp""#)).await;
    let source = listing_source();

    let details = expect_model_error(
        orchestrator(LlmProtocol::Chat, base, &source)
            .handle(ask("read"))
            .await,
    );

    assert!(details.contains("invalid arguments for 'read_file'"));
    assert_eq!(source.counters.calls(), 0);
    assert_eq!(source.counters.closes(), 1);
}
