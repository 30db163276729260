//! Fake transports and a loopback crawl service.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crawlsync::error::StreamError;
use crawlsync::stream::{CloseInfo, Connector, EventChannel, Frame};

/// Lets spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ─── Scripted connector ─────────────────────────────────────────────────────

type FrameResult = Result<Frame, StreamError>;

enum Planned {
    Refuse,
    Accept {
        rx: mpsc::UnboundedReceiver<FrameResult>,
        closed_by_client: Arc<AtomicBool>,
    },
}

/// Connector whose connection attempts follow a queued plan. Attempts past
/// the end of the plan are refused.
#[derive(Default)]
pub struct ScriptedConnector {
    plan: Mutex<VecDeque<Planned>>,
    attempts: AtomicU64,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_next(&self) {
        self.plan.lock().unwrap().push_back(Planned::Refuse);
    }

    /// Queues a successful connection and returns the server side of it.
    pub fn accept_next(&self) -> ServerEnd {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed_by_client = Arc::new(AtomicBool::new(false));
        self.plan.lock().unwrap().push_back(Planned::Accept {
            rx,
            closed_by_client: closed_by_client.clone(),
        });
        ServerEnd {
            tx,
            closed_by_client,
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn EventChannel>, StreamError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.plan.lock().unwrap().pop_front();
        match next {
            Some(Planned::Accept {
                rx,
                closed_by_client,
            }) => Ok(Box::new(ScriptedChannel {
                rx,
                closed_by_client,
            })),
            Some(Planned::Refuse) | None => Err(StreamError::Connect {
                url: "ws://scripted".to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

struct ScriptedChannel {
    rx: mpsc::UnboundedReceiver<FrameResult>,
    closed_by_client: Arc<AtomicBool>,
}

#[async_trait]
impl EventChannel for ScriptedChannel {
    async fn recv(&mut self) -> Option<FrameResult> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closed_by_client.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

/// Server side of a scripted connection. Dropping it ends the channel.
pub struct ServerEnd {
    tx: mpsc::UnboundedSender<FrameResult>,
    closed_by_client: Arc<AtomicBool>,
}

impl ServerEnd {
    /// Returns false once the client side is gone.
    pub fn send_json(&self, payload: &Value) -> bool {
        self.send_text(&payload.to_string())
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.tx.send(Ok(Frame::Text(text.to_string()))).is_ok()
    }

    pub fn send_binary(&self, bytes: &[u8]) -> bool {
        self.tx.send(Ok(Frame::Binary(bytes.to_vec()))).is_ok()
    }

    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.tx
            .send(Ok(Frame::Close(Some(CloseInfo {
                code,
                reason: reason.to_string(),
            }))))
            .is_ok()
    }

    pub fn fail(&self, message: &str) -> bool {
        self.tx
            .send(Err(StreamError::Transport(message.to_string())))
            .is_ok()
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

// ─── Loopback crawl service ─────────────────────────────────────────────────

#[derive(Clone, Default)]
struct ServiceState {
    jobs: Arc<Mutex<Vec<Value>>>,
    requests: Arc<Mutex<Vec<String>>>,
    fail_list: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

impl ServiceState {
    fn record(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }
}

#[derive(Deserialize)]
struct BulkDelete {
    ids: Vec<u64>,
}

fn job_id(job: &Value) -> Option<u64> {
    job.get("ID").or_else(|| job.get("id")).and_then(Value::as_u64)
}

async fn list_jobs(State(state): State<ServiceState>) -> Response {
    state.record("GET /crawls".to_string());
    if state.fail_list.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    let jobs = state.jobs.lock().unwrap().clone();
    Json(Value::Array(jobs)).into_response()
}

async fn create_job(State(state): State<ServiceState>, Json(body): Json<Value>) -> Response {
    let url = body["url"].as_str().unwrap_or_default().to_string();
    state.record(format!("POST /crawls {}", url));

    let id = state.next_id.fetch_add(1, Ordering::SeqCst) + 1000;
    let job = json!({"ID": id, "url": url, "status": "PENDING"});
    state.jobs.lock().unwrap().push(job.clone());
    (StatusCode::CREATED, Json(job)).into_response()
}

async fn rerun_job(State(state): State<ServiceState>, Path(id): Path<u64>) -> StatusCode {
    state.record(format!("POST /crawls/{}/rerun", id));
    StatusCode::ACCEPTED
}

async fn delete_job(State(state): State<ServiceState>, Path(id): Path<u64>) -> StatusCode {
    state.record(format!("DELETE /crawls/{}", id));
    let mut jobs = state.jobs.lock().unwrap();
    let before = jobs.len();
    jobs.retain(|job| job_id(job) != Some(id));
    if jobs.len() < before {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn delete_bulk(State(state): State<ServiceState>, Json(body): Json<BulkDelete>) -> StatusCode {
    state.record(format!("DELETE /crawls/bulk {:?}", body.ids));
    state
        .jobs
        .lock()
        .unwrap()
        .retain(|job| job_id(job).map_or(true, |id| !body.ids.contains(&id)));
    StatusCode::OK
}

#[derive(Debug, Clone)]
enum Outbound {
    Text(String),
    Close,
}

/// REST API on one loopback port and the WebSocket stream on another.
pub struct FakeCrawlService {
    state: ServiceState,
    api_addr: SocketAddr,
    stream_addr: SocketAddr,
    outbound: broadcast::Sender<Outbound>,
    connections: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl FakeCrawlService {
    pub async fn start() -> Self {
        let state = ServiceState::default();

        let app = Router::new()
            .route("/api/v1/crawls", get(list_jobs).post(create_job))
            .route("/api/v1/crawls/bulk", delete(delete_bulk))
            .route("/api/v1/crawls/{id}", delete(delete_job))
            .route("/api/v1/crawls/{id}/rerun", post(rerun_job))
            .with_state(state.clone());

        let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_addr = api_listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(api_listener, app).await.unwrap();
        });

        let stream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream_addr = stream_listener.local_addr().unwrap();
        let (outbound, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));
        let open = Arc::new(AtomicUsize::new(0));

        {
            let outbound = outbound.clone();
            let connections = connections.clone();
            let open = open.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = stream_listener.accept().await {
                    let rx = outbound.subscribe();
                    tokio::spawn(serve_stream(socket, rx, connections.clone(), open.clone()));
                }
            });
        }

        Self {
            state,
            api_addr,
            stream_addr,
            outbound,
            connections,
            open,
        }
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api/v1", self.api_addr)
    }

    pub fn stream_url(&self) -> String {
        format!("ws://{}/api/v1/ws", self.stream_addr)
    }

    pub fn set_jobs(&self, jobs: Vec<Value>) {
        *self.state.jobs.lock().unwrap() = jobs;
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Pushes a text frame to every open stream connection.
    pub fn push(&self, payload: &Value) {
        let _ = self.outbound.send(Outbound::Text(payload.to_string()));
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.outbound.send(Outbound::Text(text.to_string()));
    }

    /// Closes every open stream connection from the server side.
    pub fn close_streams(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Completed WebSocket handshakes so far.
    pub fn stream_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

async fn serve_stream(
    socket: tokio::net::TcpStream,
    mut rx: broadcast::Receiver<Outbound>,
    connections: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
        return;
    };
    connections.fetch_add(1, Ordering::SeqCst);
    open.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Ok(Outbound::Text(text)) => {
                    if ws.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Outbound::Close) => {
                    let _ = ws.close(None).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    open.fetch_sub(1, Ordering::SeqCst);
}
