use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use antigravity_rs::config::ServerConfig;
use antigravity_rs::error::RelayError;
use antigravity_rs::failover::{stream_generate, EventStream};
use antigravity_rs::protocol::event::{NormalizedEvent, ToolCallRequest};
use antigravity_rs::transport::{EndpointCandidate, GenerationRequest, HttpTransport};
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;

const TIMEOUT: Duration = Duration::from_millis(400);

const WORKED_EXAMPLE_BODY: &str = concat!(
    "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Let\",\"thought\":true}]}}]}}\r\n\r\n",
    "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\" me\",\"thought\":true}]}}]}}\r\n\r\n",
    "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"4\"}]}}]}}\r\n\r\n",
    "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"functionCall\":{\"name\":\"lookup\",\"args\":{}}}]},\"finishReason\":\"STOP\"}]}}\r\n\r\n",
    "data: [DONE]\r\n\r\n",
);

const PARTIAL_RECORD: &str =
    "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}}\n\n";

#[derive(Clone)]
enum Behavior {
    /// Never answers within the test timeout.
    Stall,
    Status(u16),
    WorkedExample,
    /// One record, then silence; the guard flips when the body is dropped.
    RecordThenStall(Arc<AtomicBool>),
    DoneOnly,
    /// A 200 with headers only; the body never delivers a record.
    HeadersThenStall,
    /// A 200 whose body breaks before any record arrives.
    HeadersThenBodyError,
}

struct DropGuard(Arc<AtomicBool>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct MockUpstream {
    url: String,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<(Option<String>, Bytes)>>>,
    server: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn candidate(&self) -> EndpointCandidate {
        EndpointCandidate::new(self.url.clone())
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn sse_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

async fn respond(behavior: Behavior) -> Response {
    match behavior {
        Behavior::Stall => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }
        Behavior::Status(code) => (
            StatusCode::from_u16(code).expect("status code"),
            "upstream rejected the call",
        )
            .into_response(),
        Behavior::WorkedExample => sse_response(Body::from(WORKED_EXAMPLE_BODY)),
        Behavior::RecordThenStall(dropped) => {
            let guard = DropGuard(dropped);
            let head = futures_util::stream::iter([Ok::<_, Infallible>(Bytes::from_static(
                PARTIAL_RECORD.as_bytes(),
            ))]);
            let tail = futures_util::stream::pending().map(move |item: Result<Bytes, Infallible>| {
                let _keep = &guard;
                item
            });
            sse_response(Body::from_stream(head.chain(tail)))
        }
        Behavior::DoneOnly => sse_response(Body::from("data: [DONE]\n\n")),
        Behavior::HeadersThenStall => sse_response(Body::from_stream(
            futures_util::stream::pending::<Result<Bytes, Infallible>>(),
        )),
        Behavior::HeadersThenBodyError => {
            let items: [Result<Bytes, std::io::Error>; 2] = [
                Ok(Bytes::from_static(b": keep-alive\n\n")),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "body broke",
                )),
            ];
            sse_response(Body::from_stream(futures_util::stream::iter(items)))
        }
    }
}

async fn spawn_upstream(behavior: Behavior) -> MockUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let handler_hits = Arc::clone(&hits);
    let handler_bodies = Arc::clone(&bodies);
    let app = Router::new().route(
        "/v1internal/streamGenerateContent",
        post(move |headers: HeaderMap, body: Bytes| {
            let hits = Arc::clone(&handler_hits);
            let bodies = Arc::clone(&handler_bodies);
            let behavior = behavior.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let authorization = headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(ToString::to_string);
                bodies.lock().expect("bodies lock").push((authorization, body));
                respond(behavior).await
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream {
        url: format!("http://{addr}/v1internal/streamGenerateContent?alt=sse"),
        hits,
        bodies,
        server,
    }
}

fn transport() -> HttpTransport {
    HttpTransport::new(&ServerConfig::default()).expect("transport")
}

fn generation_request() -> GenerationRequest {
    GenerationRequest::from_json(&json!({
        "model": "gemini-2.5-pro",
        "project": "test-project",
        "request": {"contents": [{"role": "user", "parts": [{"text": "2+2?"}]}]}
    }))
    .expect("payload")
}

async fn run(candidates: &[EndpointCandidate]) -> Result<EventStream, RelayError> {
    stream_generate(
        &transport(),
        &generation_request(),
        "test-credential",
        candidates,
        TIMEOUT,
    )
    .await
}

async fn collect_events(stream: EventStream) -> Vec<Result<NormalizedEvent, RelayError>> {
    stream.collect().await
}

fn worked_example_events() -> Vec<NormalizedEvent> {
    vec![
        NormalizedEvent::ThinkingStart,
        NormalizedEvent::Thinking("Let".into()),
        NormalizedEvent::Thinking(" me".into()),
        NormalizedEvent::ThinkingEnd,
        NormalizedEvent::Text("4".into()),
        NormalizedEvent::ToolCalls(vec![ToolCallRequest::new("", "lookup", "{}")]),
    ]
}

#[tokio::test]
async fn test_primary_success_streams_worked_example() {
    let primary = spawn_upstream(Behavior::WorkedExample).await;
    let backup = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[primary.candidate(), backup.candidate()])
        .await
        .expect("committed stream");
    let events: Vec<NormalizedEvent> = collect_events(stream)
        .await
        .into_iter()
        .map(|item| item.expect("event"))
        .collect();

    assert_eq!(events, worked_example_events());
    assert_eq!(primary.hits(), 1);
    assert_eq!(backup.hits(), 0);
}

#[tokio::test]
async fn test_timeout_fails_over_in_order() {
    let a = spawn_upstream(Behavior::Stall).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;
    let c = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[a.candidate(), b.candidate(), c.candidate()])
        .await
        .expect("committed stream");
    let events = collect_events(stream).await;

    assert_eq!(events.len(), worked_example_events().len());
    assert!(events.iter().all(Result::is_ok));
    assert_eq!(a.hits(), 1);
    assert_eq!(b.hits(), 1);
    assert_eq!(c.hits(), 0);
}

#[tokio::test]
async fn test_same_payload_and_credential_on_every_attempt() {
    let a = spawn_upstream(Behavior::Status(503)).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[a.candidate(), b.candidate()]).await.expect("stream");
    drop(stream);

    let first = a.bodies.lock().expect("lock").clone();
    let second = b.bodies.lock().expect("lock").clone();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0], second[0]);
    assert_eq!(first[0].0.as_deref(), Some("Bearer test-credential"));
    let payload: serde_json::Value = serde_json::from_slice(&first[0].1).expect("json payload");
    assert_eq!(payload["project"], "test-project");
}

#[tokio::test]
async fn test_forbidden_is_fatal() {
    let a = spawn_upstream(Behavior::Status(403)).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;
    let c = spawn_upstream(Behavior::WorkedExample).await;

    let err = run(&[a.candidate(), b.candidate(), c.candidate()])
        .await
        .err()
        .expect("forbidden error");

    match err {
        RelayError::Forbidden { message } => assert_eq!(message, "upstream rejected the call"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(a.hits(), 1);
    assert_eq!(b.hits(), 0);
    assert_eq!(c.hits(), 0);
}

#[tokio::test]
async fn test_request_rejection_is_fatal() {
    let a = spawn_upstream(Behavior::Status(400)).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;

    let err = run(&[a.candidate(), b.candidate()])
        .await
        .err()
        .expect("upstream error");

    assert_eq!(err.upstream_status(), Some(400));
    assert_eq!(b.hits(), 0);
}

#[tokio::test]
async fn test_rate_limit_and_server_errors_fail_over() {
    let a = spawn_upstream(Behavior::Status(429)).await;
    let b = spawn_upstream(Behavior::Status(502)).await;
    let c = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[a.candidate(), b.candidate(), c.candidate()])
        .await
        .expect("committed stream");
    assert_eq!(collect_events(stream).await.len(), 6);
    assert_eq!((a.hits(), b.hits(), c.hits()), (1, 1, 1));
}

#[tokio::test]
async fn test_exhaustion_returns_last_error() {
    let a = spawn_upstream(Behavior::Status(503)).await;
    let b = spawn_upstream(Behavior::Status(429)).await;

    let err = run(&[a.candidate(), b.candidate()])
        .await
        .err()
        .expect("exhausted");

    match err {
        RelayError::Upstream { status, .. } => assert_eq!(status, 429),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!((a.hits(), b.hits()), (1, 1));
}

#[tokio::test]
async fn test_single_endpoint_timeout_surfaces_timeout() {
    let a = spawn_upstream(Behavior::Stall).await;

    let err = run(&[a.candidate()]).await.err().expect("timeout");
    match &err {
        RelayError::Timeout { elapsed } => assert_eq!(*elapsed, TIMEOUT),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "Upstream timed out after 400ms");
}

#[tokio::test]
async fn test_silent_body_after_headers_fails_over() {
    let a = spawn_upstream(Behavior::HeadersThenStall).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[a.candidate(), b.candidate()])
        .await
        .expect("committed stream");
    let events: Vec<NormalizedEvent> = collect_events(stream)
        .await
        .into_iter()
        .map(|item| item.expect("event"))
        .collect();

    assert_eq!(events, worked_example_events());
    assert_eq!((a.hits(), b.hits()), (1, 1));
}

#[tokio::test]
async fn test_body_error_before_first_record_fails_over() {
    let a = spawn_upstream(Behavior::HeadersThenBodyError).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[a.candidate(), b.candidate()])
        .await
        .expect("committed stream");
    let events: Vec<NormalizedEvent> = collect_events(stream)
        .await
        .into_iter()
        .map(|item| item.expect("event"))
        .collect();

    assert_eq!(events, worked_example_events());
    assert_eq!((a.hits(), b.hits()), (1, 1));
}

#[tokio::test]
async fn test_connection_refused_fails_over() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let closed_addr = closed.local_addr().expect("addr");
    drop(closed);
    let b = spawn_upstream(Behavior::WorkedExample).await;

    let dead = EndpointCandidate::new(format!("http://{closed_addr}/v1internal/streamGenerateContent"));
    let stream = run(&[dead, b.candidate()]).await.expect("committed stream");
    assert_eq!(collect_events(stream).await.len(), 6);
    assert_eq!(b.hits(), 1);
}

#[tokio::test]
async fn test_no_failover_after_first_event() {
    let dropped = Arc::new(AtomicBool::new(false));
    let a = spawn_upstream(Behavior::RecordThenStall(dropped)).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[a.candidate(), b.candidate()])
        .await
        .expect("committed stream");
    let items = collect_events(stream).await;

    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].as_ref().expect("first event"),
        &NormalizedEvent::Text("partial".into())
    );
    assert!(matches!(items[1], Err(RelayError::Timeout { .. })));
    assert_eq!(b.hits(), 0);
}

#[tokio::test]
async fn test_graceful_empty_stream_commits() {
    let a = spawn_upstream(Behavior::DoneOnly).await;
    let b = spawn_upstream(Behavior::WorkedExample).await;

    let stream = run(&[a.candidate(), b.candidate()])
        .await
        .expect("committed stream");
    assert!(collect_events(stream).await.is_empty());
    assert_eq!(b.hits(), 0);
}

#[tokio::test]
async fn test_dropping_stream_closes_upstream_body() {
    let dropped = Arc::new(AtomicBool::new(false));
    let a = spawn_upstream(Behavior::RecordThenStall(Arc::clone(&dropped))).await;

    let transport = transport();
    let mut stream = stream_generate(
        &transport,
        &generation_request(),
        "test-credential",
        &[a.candidate()],
        Duration::from_secs(30),
    )
    .await
    .expect("committed stream");
    let first = stream.next().await.expect("first item").expect("first event");
    assert_eq!(first, NormalizedEvent::Text("partial".into()));
    assert!(!dropped.load(Ordering::SeqCst));

    drop(stream);

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(closed.is_ok(), "upstream body was not released after drop");
}
