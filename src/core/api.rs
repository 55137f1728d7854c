//! HTTP + WebSocket API for remote session screens
//!
//! Endpoints:
//! - POST /session/new - Start a session from a preset or inline table
//! - GET /session/{id} - Latest snapshot
//! - POST /session/{id}/pause | resume | toggle | skip | quit | gate
//! - POST /session/{id}/sample - Sensor reading (ratio or landmarks)
//! - POST /session/{id}/cue/{utterance}/done - Narration finished on the client
//! - WS /ws/{id} - Live updates
//! - GET /health - Health check
//!
//! Each session runs on its own task; handlers only talk to it through
//! channels and read the snapshot its presenter publishes.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::core::clock::{Clock, SystemClock};
use crate::core::controller::SessionController;
use crate::core::cue::{AmbientAudio, CueDispatcher, CueSink, UtteranceId};
use crate::core::posture::{head_tilt_ratio, Landmark};
use crate::core::presenter::{AmbientAction, PresentationSink, SessionUpdate};
use crate::core::presets;
use crate::core::runner::{run_session, ticker_for, Command};
use crate::error::{ConfigError, CueError};
use crate::types::{PhaseTarget, SessionSnapshot, TableSpec};

type SharedSnapshot = Arc<StdRwLock<Option<SessionSnapshot>>>;

/// Finished sessions kept around for late snapshot reads
pub const MAX_FINISHED_SESSIONS: usize = 64;

/// Handler-side view of a running session
#[derive(Debug)]
pub struct SessionHandle {
    pub id: String,
    pub table: String,
    commands: mpsc::Sender<Command>,
    completions: mpsc::UnboundedSender<UtteranceId>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshot: SharedSnapshot,
}

impl SessionHandle {
    fn snapshot(&self) -> Option<SessionSnapshot> {
        self.snapshot.read().ok().and_then(|guard| guard.clone())
    }
}

/// Last snapshot of a session whose task has ended
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub id: String,
    pub snapshot: Option<SessionSnapshot>,
}

/// App state
pub struct AppState {
    /// Sessions whose task is still running
    pub sessions: RwLock<HashMap<String, SessionHandle>>,
    /// Most recent finished sessions, oldest first
    pub finished: RwLock<VecDeque<FinishedSession>>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            finished: RwLock::new(VecDeque::new()),
            clock,
        }
    }

    /// Live updates for a running session
    pub async fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<SessionUpdate>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(|session| session.updates.subscribe())
    }

    /// Move a session out of the live map once its task ends
    async fn retire(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        let Some(handle) = sessions.remove(id) else {
            return;
        };
        let mut finished = self.finished.write().await;
        finished.push_back(FinishedSession {
            id: handle.id.clone(),
            snapshot: handle.snapshot(),
        });
        while finished.len() > MAX_FINISHED_SESSIONS {
            finished.pop_front();
        }
        debug!(session = %id, live = sessions.len(), "session retired");
    }

    async fn finished_snapshot(&self, id: &str) -> Option<Option<SessionSnapshot>> {
        let finished = self.finished.read().await;
        finished.iter().find(|f| f.id == id).map(|f| f.snapshot.clone())
    }

    /// Error for an id that is not live: `Gone` if it finished, else `NotFound`
    async fn missing(&self, id: &str) -> ApiError {
        match self.finished_snapshot(id).await {
            Some(_) => ApiError::Gone,
            None => ApiError::NotFound,
        }
    }
}

/// Presenter publishing to websocket subscribers and the snapshot slot
struct BroadcastPresenter {
    updates: broadcast::Sender<SessionUpdate>,
    snapshot: SharedSnapshot,
}

impl BroadcastPresenter {
    fn publish(&self, update: SessionUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}

impl PresentationSink for BroadcastPresenter {
    fn on_phase_changed(&mut self, label: &str, target: PhaseTarget) {
        self.publish(SessionUpdate::PhaseChanged { label: label.to_string(), target });
    }

    fn on_tick(&mut self, phase_elapsed: f64, total_elapsed: f64) {
        self.publish(SessionUpdate::Tick { phase_elapsed, total_elapsed });
    }

    fn on_completed(&mut self) {
        self.publish(SessionUpdate::Completed);
    }

    fn on_abandoned(&mut self) {
        self.publish(SessionUpdate::Abandoned);
    }

    fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = Some(snapshot.clone());
        }
    }
}

/// Narration happens on the client; cues go out over the websocket and
/// come back through `/cue/{utterance}/done`. A client that connects late
/// misses the cue and continues a guide with `/gate`.
struct RemoteNarrator {
    updates: broadcast::Sender<SessionUpdate>,
}

impl CueSink for RemoteNarrator {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<(), CueError> {
        if self
            .updates
            .send(SessionUpdate::Cue { utterance: id, text: text.to_string() })
            .is_err()
        {
            debug!(%id, "cue sent with no client connected");
        }
        Ok(())
    }

    fn cancel(&mut self) {
        let _ = self.updates.send(SessionUpdate::CueCancelled);
    }

    fn pause(&mut self) {
        let _ = self.updates.send(SessionUpdate::Paused);
    }

    fn resume(&mut self) {
        let _ = self.updates.send(SessionUpdate::Resumed);
    }
}

/// Background track played by the client
struct RemoteAmbient {
    updates: broadcast::Sender<SessionUpdate>,
}

impl RemoteAmbient {
    fn send(&self, action: AmbientAction) {
        let _ = self.updates.send(SessionUpdate::Ambient { action });
    }
}

impl AmbientAudio for RemoteAmbient {
    fn play(&mut self) -> Result<(), CueError> {
        self.send(AmbientAction::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.send(AmbientAction::Pause);
    }

    fn stop(&mut self) {
        self.send(AmbientAction::Stop);
    }
}

/// Create new session request
#[derive(Debug, Deserialize)]
pub struct NewSessionRequest {
    /// breathing | meditation | neck (default breathing)
    pub preset: Option<String>,
    /// Custom table, takes precedence over `preset`
    pub table: Option<TableSpec>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub table: String,
    pub websocket_url: String,
    pub snapshot: Option<SessionSnapshot>,
}

/// Sensor reading
#[derive(Debug, Default, Deserialize)]
pub struct SampleRequest {
    pub ratio: Option<f64>,
    pub landmarks: Option<Vec<Landmark>>,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub session_id: String,
    pub accepted: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
    pub sessions_finished: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Gone,
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "session not found".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Gone => (StatusCode::GONE, "session has ended".to_string()),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Create the API router
pub fn create_router() -> Router {
    create_router_with_clock(Arc::new(SystemClock::new()))
}

/// Router with an injected clock for frame timing
pub fn create_router_with_clock(clock: Arc<dyn Clock>) -> Router {
    create_router_with_state(Arc::new(AppState::new(clock)))
}

/// Router over caller-owned state
pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/pause", post(pause))
        .route("/session/:id/resume", post(resume))
        .route("/session/:id/toggle", post(toggle))
        .route("/session/:id/skip", post(skip))
        .route("/session/:id/quit", post(quit))
        .route("/session/:id/gate", post(open_gate))
        .route("/session/:id/sample", post(sample))
        .route("/session/:id/cue/:utterance/done", post(cue_done))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active = {
        let sessions = state.sessions.read().await;
        sessions
            .values()
            .filter(|s| s.snapshot().is_some_and(|snap| !snap.status.is_terminal()))
            .count()
    };
    let finished = state.finished.read().await.len();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: active,
        sessions_finished: finished,
    })
}

/// Start a session. The first phase is entered before responding.
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let table = match req.table {
        Some(spec) => spec.build()?,
        None => presets::by_name(req.preset.as_deref().unwrap_or("breathing"))?,
    };

    let session_id = generate_session_id();
    let table_name = table.name().to_string();
    let (updates, _) = broadcast::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let snapshot: SharedSnapshot = Arc::new(StdRwLock::new(None));

    let presenter = BroadcastPresenter {
        updates: updates.clone(),
        snapshot: snapshot.clone(),
    };
    let mut cues = CueDispatcher::new(RemoteNarrator { updates: updates.clone() });
    if table.ambient() {
        cues = cues.with_ambient(Box::new(RemoteAmbient { updates: updates.clone() }));
    }
    let mut controller = SessionController::new(table, presenter, cues, state.clock.clone());
    // Cannot fail on a fresh controller
    if let Err(err) = controller.start() {
        return Err(ApiError::BadRequest(err.to_string()));
    }
    let first = controller.snapshot();

    let handle = SessionHandle {
        id: session_id.clone(),
        table: table_name.clone(),
        commands: cmd_tx,
        completions: done_tx,
        updates,
        snapshot,
    };
    state.sessions.write().await.insert(session_id.clone(), handle);
    info!(session = %session_id, table = %table_name, "session created");

    let task_id = session_id.clone();
    let task_state = state.clone();
    tokio::spawn(async move {
        let ticker = ticker_for(controller.machine().table().cadence());
        match run_session(&mut controller, ticker, cmd_rx, done_rx).await {
            Ok(status) => info!(session = %task_id, %status, "session finished"),
            Err(err) => warn!(session = %task_id, error = %err, "session failed"),
        }
        task_state.retire(&task_id).await;
    });

    Ok(Json(NewSessionResponse {
        websocket_url: format!("/ws/{}", session_id),
        session_id,
        table: table_name,
        snapshot: Some(first),
    }))
}

/// Get session snapshot; finished sessions answer with their last one
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let live = {
        let sessions = state.sessions.read().await;
        sessions.get(&id).map(|session| session.snapshot())
    };
    let snapshot = match live {
        Some(snapshot) => snapshot,
        None => state.finished_snapshot(&id).await.flatten(),
    };
    snapshot.map(Json).ok_or(ApiError::NotFound)
}

async fn pause(state: State<Arc<AppState>>, id: Path<String>) -> Result<Json<AcceptedResponse>, ApiError> {
    send_command(state, id, Command::Pause, "pause").await
}

async fn resume(state: State<Arc<AppState>>, id: Path<String>) -> Result<Json<AcceptedResponse>, ApiError> {
    send_command(state, id, Command::Resume, "resume").await
}

async fn toggle(state: State<Arc<AppState>>, id: Path<String>) -> Result<Json<AcceptedResponse>, ApiError> {
    send_command(state, id, Command::TogglePause, "toggle").await
}

async fn skip(state: State<Arc<AppState>>, id: Path<String>) -> Result<Json<AcceptedResponse>, ApiError> {
    send_command(state, id, Command::Skip, "skip").await
}

async fn quit(state: State<Arc<AppState>>, id: Path<String>) -> Result<Json<AcceptedResponse>, ApiError> {
    send_command(state, id, Command::Quit, "quit").await
}

async fn open_gate(state: State<Arc<AppState>>, id: Path<String>) -> Result<Json<AcceptedResponse>, ApiError> {
    send_command(state, id, Command::OpenGate, "gate").await
}

/// Sensor reading; landmarks win over a raw ratio
async fn sample(
    state: State<Arc<AppState>>,
    id: Path<String>,
    Json(req): Json<SampleRequest>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let value = match req.landmarks {
        Some(landmarks) => head_tilt_ratio(&landmarks),
        None => req.ratio,
    };
    send_command(state, id, Command::Sample { value }, "sample").await
}

/// Client finished speaking a cue
async fn cue_done(
    State(state): State<Arc<AppState>>,
    Path((id, utterance)): Path<(String, u64)>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let completions = {
        let sessions = state.sessions.read().await;
        sessions.get(&id).map(|session| session.completions.clone())
    };
    let Some(completions) = completions else {
        return Err(state.missing(&id).await);
    };
    completions.send(UtteranceId(utterance)).map_err(|_| ApiError::Gone)?;
    Ok(Json(AcceptedResponse { session_id: id, accepted: "cue_done".to_string() }))
}

async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    command: Command,
    name: &str,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let commands = {
        let sessions = state.sessions.read().await;
        sessions.get(&id).map(|session| session.commands.clone())
    };
    let Some(commands) = commands else {
        return Err(state.missing(&id).await);
    };
    commands.send(command).await.map_err(|_| ApiError::Gone)?;
    debug!(session = %id, command = name, "command queued");
    Ok(Json(AcceptedResponse { session_id: id, accepted: name.to_string() }))
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let Some(rx) = state.subscribe(&id).await else {
        return Err(state.missing(&id).await);
    };

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward updates until the client leaves or the session channel closes
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<SessionUpdate>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(update) => {
                    let json = match serde_json::to_string(&update) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!(error = %err, "update not serializable, skipped");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Generate session ID
fn generate_session_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("session_{:x}_{}", nanos, seq)
}

/// Run the API server
pub async fn run_server(addr: &str) -> std::io::Result<()> {
    let router = create_router();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "pacer API listening");
    println!("Pacer API running on {}", addr);
    println!("  POST /session/new                    - Start session");
    println!("  GET  /session/:id                    - Snapshot");
    println!("  POST /session/:id/{{pause,resume,toggle,skip,quit,gate}}");
    println!("  POST /session/:id/sample             - Sensor reading");
    println!("  POST /session/:id/cue/:u/done        - Cue finished");
    println!("  WS   /ws/:id                         - Live updates");
    println!("  GET  /health                         - Health check");
    axum::serve(listener, router).await
}
