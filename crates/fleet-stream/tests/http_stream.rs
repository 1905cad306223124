//! End-to-end tests over HTTP.
//!
//! Uses a mock hyper server to emit SSE bodies, verifying the full
//! request → parse → decode → publish pipeline.

use std::{
    collections::VecDeque,
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use fleet_stream::{
    BackoffPolicy, ConnectionStatus, StreamConfig, StreamController, StreamFaultKind,
    StreamHandle, StreamState,
};
use futures_util::{StreamExt, stream};
use http_body_util::StreamBody;
use hyper::{
    Request, Response,
    body::{Bytes, Frame, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpListener, time::timeout};

const SNAPSHOT_BODY: &str = "event: fleet-health\nid: 7\ndata: {\"fleetHealthScore\":87.5,\"totalAircraft\":42,\"availableAircraft\":38,\"overdueMaintenanceCount\":2,\"openWorkOrders\":15,\"urgentWorkOrders\":3,\"alertsLast24h\":7,\"aiDecisionsLast7d\":120,\"timestamp\":\"2026-02-08T10:00:00Z\"}\n\n";

// ---------------------------------------------------------------------------
// Mock SSE server helpers
// ---------------------------------------------------------------------------

/// One scripted response.
#[derive(Clone, Copy)]
struct Reply {
    status: u16,
    content_type: &'static str,
    body: &'static str,
    /// Keep the body open after `body` has been sent.
    hold: bool,
}

impl Reply {
    fn events(body: &'static str, hold: bool) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body,
            hold,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/event-stream",
            body: "",
            hold: false,
        }
    }
}

/// Request headers seen by the mock server.
#[derive(Clone, Debug, Default)]
struct Seen {
    accept: Option<String>,
    last_event_id: Option<String>,
}

type Requests = Arc<Mutex<Vec<Seen>>>;

fn header(req: &Request<Incoming>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Start a mock server answering connections with `replies` in order, then
/// with `fallback`. Returns its address and the requests it has seen.
async fn start_server(replies: Vec<Reply>, fallback: Reply) -> (SocketAddr, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
    let requests: Requests = Arc::default();
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let replies = Arc::clone(&replies);
            let seen = Arc::clone(&seen);
            let io = TokioIo::new(stream);
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req: Request<Incoming>| {
                            seen.lock().expect("lock requests").push(Seen {
                                accept: header(&req, "accept"),
                                last_event_id: header(&req, "last-event-id"),
                            });
                            let reply = replies
                                .lock()
                                .expect("lock replies")
                                .pop_front()
                                .unwrap_or(fallback);

                            let chunk = stream::iter([Ok::<_, Infallible>(Frame::data(
                                Bytes::from_static(reply.body.as_bytes()),
                            ))]);
                            let frames = if reply.hold {
                                chunk.chain(stream::pending()).boxed()
                            } else {
                                chunk.boxed()
                            };
                            let resp = Response::builder()
                                .status(reply.status)
                                .header("content-type", reply.content_type)
                                .body(StreamBody::new(frames))
                                .expect("build response");
                            async move { Ok::<_, Infallible>(resp) }
                        }),
                    )
                    .await;
            });
        }
    });

    (addr, requests)
}

fn config(addr: SocketAddr) -> StreamConfig {
    StreamConfig::new(format!("http://{addr}/api/fleet-health/stream"))
        .backoff(BackoffPolicy::new(Duration::from_millis(20), 2))
}

async fn wait(handle: &StreamHandle, predicate: impl FnMut(&StreamState) -> bool) -> StreamState {
    timeout(Duration::from_secs(5), handle.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("controller stopped")
}

fn request_count(requests: &Requests) -> usize {
    requests.lock().expect("lock requests").len()
}

// ---------------------------------------------------------------------------
// Snapshot delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_snapshot_delivered_over_http() {
    let (addr, requests) = start_server(
        vec![Reply::events(SNAPSHOT_BODY, true)],
        Reply::status(503),
    )
    .await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    let state = wait(&handle, |s| s.status.is_open() && s.snapshot.is_some()).await;
    let snapshot = state.snapshot.expect("snapshot");
    assert_eq!(snapshot.fleet_health_score, 87.5);
    assert_eq!(snapshot.total_aircraft, 42);
    assert_eq!(snapshot.available_aircraft, 38);
    assert_eq!(snapshot.ai_decisions_last_7d, 120);
    assert_eq!(snapshot.timestamp, "2026-02-08T10:00:00Z");
    assert_eq!(state.retries, 0);
    assert!(state.last_error.is_none());

    let seen = requests.lock().expect("lock").clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].accept.as_deref(), Some("text/event-stream"));
    assert_eq!(seen[0].last_event_id, None);

    handle.close().await.expect("close");
    assert_eq!(handle.status(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn test_comments_and_unknown_events_are_ignored() {
    let (addr, _requests) = start_server(
        vec![Reply::events(
            ": keep-alive\n\nevent: ping\ndata: 1\n\ndata: untyped\n\n",
            true,
        )],
        Reply::status(503),
    )
    .await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    let state = wait(&handle, |s| s.status.is_open()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), state);
    assert!(state.snapshot.is_none());
    assert!(state.last_error.is_none());
}

// ---------------------------------------------------------------------------
// Producer errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_server_error_event() {
    let (addr, requests) = start_server(
        vec![Reply::events(
            "event: error\ndata: {\"message\":\"database unavailable\"}\n\n",
            true,
        )],
        Reply::status(503),
    )
    .await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    let state = wait(&handle, |s| s.last_error.is_some()).await;
    let fault = state.last_error.expect("error");
    assert_eq!(fault.kind, StreamFaultKind::ServerReported);
    assert_eq!(fault.message, "database unavailable");
    assert_eq!(state.status, ConnectionStatus::Open);
    assert_eq!(request_count(&requests), 1);
}

#[tokio::test]
async fn test_unavailable_payload_is_a_decode_error() {
    let (addr, _requests) = start_server(
        vec![Reply::events(
            "event: fleet-health\ndata: {\"error\":\"supabase_unavailable\"}\n\n",
            true,
        )],
        Reply::status(503),
    )
    .await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    let state = wait(&handle, |s| s.last_error.is_some()).await;
    let fault = state.last_error.expect("error");
    assert_eq!(fault.kind, StreamFaultKind::PayloadDecode);
    assert!(fault.message.contains("supabase_unavailable"));
    assert_eq!(state.status, ConnectionStatus::Open);
}

// ---------------------------------------------------------------------------
// Transport failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_non_2xx_retries_then_fails() {
    let (addr, requests) = start_server(Vec::new(), Reply::status(403)).await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    let state = wait(&handle, |s| s.status.is_failed()).await;
    assert_eq!(
        state.last_error.map(|e| e.kind),
        Some(StreamFaultKind::RetriesExhausted)
    );
    // The first attempt plus two retries.
    assert_eq!(request_count(&requests), 3);
}

#[tokio::test]
async fn test_wrong_content_type_is_a_transport_failure() {
    let reply = Reply {
        status: 200,
        content_type: "application/json",
        body: "{}",
        hold: false,
    };
    let (addr, requests) = start_server(Vec::new(), reply).await;
    let config = config(addr).backoff(BackoffPolicy::new(Duration::from_millis(300), 2));
    let handle = StreamController::spawn(config).expect("spawn");

    let state = wait(&handle, |s| s.last_error.is_some()).await;
    assert_eq!(state.retries, 1);
    let fault = state.last_error.expect("error");
    assert_eq!(fault.kind, StreamFaultKind::TransportFailure);
    assert!(fault.message.contains("application/json"));

    wait(&handle, |s| s.status.is_failed()).await;
    assert_eq!(request_count(&requests), 3);
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let (addr, requests) = start_server(
        vec![Reply::status(502), Reply::events(SNAPSHOT_BODY, true)],
        Reply::status(503),
    )
    .await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    let state = wait(&handle, |s| s.snapshot.is_some()).await;
    assert_eq!(state.status, ConnectionStatus::Open);
    assert_eq!(state.retries, 0);
    assert_eq!(request_count(&requests), 2);
}

#[tokio::test]
async fn test_manual_reconnect_after_exhaustion() {
    let (addr, requests) = start_server(
        vec![Reply::status(500), Reply::status(500), Reply::status(500)],
        Reply::events(SNAPSHOT_BODY, true),
    )
    .await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    wait(&handle, |s| s.status.is_failed()).await;
    handle.reconnect().await.expect("reconnect");

    let state = wait(&handle, |s| s.status.is_open() && s.snapshot.is_some()).await;
    assert_eq!(state.retries, 0);
    assert_eq!(request_count(&requests), 4);
}

// ---------------------------------------------------------------------------
// Resumption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_last_event_id_sent_on_reconnect() {
    let (addr, requests) = start_server(
        vec![
            Reply::events(SNAPSHOT_BODY, false),
            Reply::events(": connected\n\n", true),
        ],
        Reply::status(503),
    )
    .await;
    let handle = StreamController::spawn(config(addr)).expect("spawn");

    wait(&handle, |s| s.status.is_open() && s.retries == 1).await;
    let seen = requests.lock().expect("lock").clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].last_event_id, None);
    assert_eq!(seen[1].last_event_id.as_deref(), Some("7"));
}
