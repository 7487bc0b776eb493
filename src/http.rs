/**
 * API REST VIGIE - Surface HTTP du kernel
 *
 * RÔLE :
 * Expose l'état de la flotte et le message board public, plus le contrôle
 * du superviseur pour l'opérateur.
 *
 * ROUTES :
 * - /status, /status/health : état agrégé + liveness
 * - /message-board : soumission, long-poll, log complet, rendu HTML
 * - /processes : liste + restart/stop/start/logs (clé API obligatoire)
 *
 * SÉCURITÉ :
 * - Les lectures publiques restent ouvertes (CORS permissif, comme l'API
 *   d'origine) ; seules les routes de contrôle exigent le header x-api-key
 * - Logs des tentatives d'accès non autorisé
 */
use crate::config::VigieConfig;
use crate::longpoll::{PollOutcome, SharedPolls};
use crate::models::{CountersMap, SampleResult, SamplesMap, ServiceStatus, ServicesMap, TargetKind};
use crate::board::{Message, SharedBoard};
use crate::state::Shared;
use crate::supervisor::{ProcessSupervisor, SupervisorError};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{Html, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<VigieConfig>,
    pub samples: Shared<SamplesMap>,
    pub services: Shared<ServicesMap>,
    pub counters: Shared<CountersMap>,
    pub board: SharedBoard,
    pub polls: SharedPolls,
    pub supervisor: Option<Arc<dyn ProcessSupervisor>>,
}

pub fn build_router(app_state: AppState) -> Router {
    let control = Router::new()
        .route("/processes", get(list_processes))
        .route("/processes/{name}/restart", post(restart_process))
        .route("/processes/{name}/stop", post(stop_process))
        .route("/processes/{name}/start", post(start_process))
        .route("/processes/{name}/logs", get(process_logs))
        .route_layer(middleware::from_fn(require_api_key));

    Router::new()
        .route("/status", get(get_status))
        .route("/status/health", get(|| async { "OK" }))
        .route("/message-board", get(get_messages))
        .route("/message-board/", get(get_messages))
        .route("/message-board/submit", post(submit_message))
        .route("/message-board/poll", get(poll_messages))
        .route("/message-board/html", get(messages_html))
        .merge(control)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let expected = std::env::var("VIGIE_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        eprintln!("SECURITY: VIGIE_API_KEY not set - control routes denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        eprintln!("[http] rejected control request on {}", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

// ============ STATUS ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerView {
    online: bool,
    last_checked: Option<String>, // RFC3339 pour l'API
    response_time: Option<f64>,
}

fn to_view(s: &SampleResult) -> ServerView {
    ServerView {
        online: s.online,
        last_checked: s.last_checked.format(&Rfc3339).ok(),
        response_time: s.response_time_ms,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    servers: HashMap<String, ServerView>,
    pm2_services: HashMap<String, ServiceStatus>,
    server_failure_counts: HashMap<String, u32>,
    pm2_failure_counts: HashMap<String, u32>,
    notification_threshold: u32,
}

// GET /status : toujours 200, sections en dernières données connues
async fn get_status(State(app): State<AppState>) -> Json<StatusResponse> {
    let servers: HashMap<String, ServerView> = app
        .samples
        .lock()
        .iter()
        .map(|(name, sample)| (name.clone(), to_view(sample)))
        .collect();
    let pm2_services = app.services.lock().clone();

    let mut server_failure_counts = HashMap::new();
    let mut pm2_failure_counts = HashMap::new();
    for (name, counter) in app.counters.lock().iter() {
        match counter.kind {
            TargetKind::Host => {
                server_failure_counts.insert(name.clone(), counter.consecutive_failures)
            }
            TargetKind::Process => {
                pm2_failure_counts.insert(name.clone(), counter.consecutive_failures)
            }
        };
    }

    Json(StatusResponse {
        servers,
        pm2_services,
        server_failure_counts,
        pm2_failure_counts,
        notification_threshold: app.cfg.notification_threshold,
    })
}

// ============ MESSAGE BOARD ============

#[derive(Debug, Deserialize)]
struct SubmitBody {
    name: Option<String>,
    message: Option<String>,
}

// POST /message-board/submit
async fn submit_message(
    State(app): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> (StatusCode, Json<Value>) {
    let (Some(name), Some(message)) = (body.name, body.message) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing name or message fields" })),
        );
    };

    match app.board.submit(&app.polls, &name, &message).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Message received" })),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))),
    }
}

// GET /message-board (log complet, rétro-compatible)
async fn get_messages(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "messages": app.board.messages() }))
}

#[derive(Debug, Deserialize)]
struct PollParams {
    #[serde(rename = "lastId", default)]
    last_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    messages: Vec<Message>,
    last_id: u64,
}

/// Retire l'attente du registre à la sortie du handler, que ce soit après
/// timeout ou parce que le client a coupé la connexion. Retirer une entrée
/// déjà résolue est un no-op.
struct PollGuard {
    polls: SharedPolls,
    id: Uuid,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.polls.remove(&self.id);
    }
}

// GET /message-board/poll?lastId=N : immédiat s'il y a plus récent, sinon
// la requête reste ouverte jusqu'au prochain message ou au timeout
async fn poll_messages(
    State(app): State<AppState>,
    Query(params): Query<PollParams>,
) -> Json<PollResponse> {
    let since_id = params.last_id;

    match app.board.poll_or_register(&app.polls, since_id) {
        PollOutcome::Ready(messages) => Json(poll_response(messages, since_id)),
        PollOutcome::Wait(id, rx) => {
            let _guard = PollGuard { polls: app.polls.clone(), id };
            let deadline = Duration::from_secs(app.cfg.poll_timeout_seconds);
            match tokio::time::timeout(deadline, rx).await {
                Ok(Ok(messages)) => Json(poll_response(messages, since_id)),
                // timeout ou canal fermé : le client repartira du même lastId
                _ => Json(PollResponse { messages: Vec::new(), last_id: since_id }),
            }
        }
    }
}

fn poll_response(messages: Vec<Message>, since_id: u64) -> PollResponse {
    let last_id = messages.last().map(|m| m.id).unwrap_or(since_id);
    PollResponse { messages, last_id }
}

// GET /message-board/html (vue lisible du log)
async fn messages_html(State(app): State<AppState>) -> Html<String> {
    let mut items = String::new();
    for msg in app.board.messages() {
        items.push_str(&format!(
            r#"<div class="message"><span class="name">{}</span> <span class="time">[{}]</span>: <div class="content">{}</div></div>"#,
            escape_html(&msg.name),
            msg.time.format(&Rfc3339).unwrap_or_default(),
            escape_html(&msg.message),
        ));
    }
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Public Message Pool</title>
<style>
body {{ font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }}
.message {{ border-bottom: 1px solid #eee; padding: 10px 0; }}
.name {{ font-weight: bold; }}
.time {{ color: #666; font-size: 0.8em; }}
</style>
</head>
<body>
<h1>Public Message Pool</h1>
{items}
</body>
</html>"#
    ))
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============ SUPERVISEUR ============

fn supervisor_of(app: &AppState) -> Result<Arc<dyn ProcessSupervisor>, (StatusCode, Json<Value>)> {
    app.supervisor.clone().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "supervisor not configured" })),
    ))
}

fn supervisor_error(e: SupervisorError) -> (StatusCode, Json<Value>) {
    let code = match e {
        SupervisorError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(json!({ "error": e.to_string() })))
}

// GET /processes
async fn list_processes(
    State(app): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let supervisor = supervisor_of(&app)?;
    let list = supervisor.list().await.map_err(supervisor_error)?;
    Ok(Json(json!({ "processes": list })))
}

// POST /processes/{name}/restart
async fn restart_process(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let supervisor = supervisor_of(&app)?;
    supervisor.restart(&name).await.map_err(supervisor_error)?;
    Ok(Json(json!({ "success": true, "process": name })))
}

// POST /processes/{name}/stop
async fn stop_process(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let supervisor = supervisor_of(&app)?;
    supervisor.stop(&name).await.map_err(supervisor_error)?;
    Ok(Json(json!({ "success": true, "process": name })))
}

// POST /processes/{name}/start
async fn start_process(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let supervisor = supervisor_of(&app)?;
    supervisor.start(&name).await.map_err(supervisor_error)?;
    Ok(Json(json!({ "success": true, "process": name })))
}

#[derive(Debug, Deserialize)]
struct LogsParams {
    lines: Option<u32>,
}

// GET /processes/{name}/logs?lines=N
async fn process_logs(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<LogsParams>,
) -> Result<String, (StatusCode, Json<Value>)> {
    let supervisor = supervisor_of(&app)?;
    let lines = params.lines.unwrap_or(20).min(500);
    let logs = supervisor.logs(&name, lines).await.map_err(supervisor_error)?;
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn test_to_view_formats_timestamp() {
        let sample = SampleResult {
            online: true,
            response_time_ms: Some(42.0),
            last_checked: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };
        let view = to_view(&sample);
        assert!(view.online);
        assert_eq!(view.response_time, Some(42.0));
        assert!(view.last_checked.unwrap().starts_with("2023-11-14T"));
    }

    #[test]
    fn test_status_response_wire_names() {
        let response = StatusResponse {
            servers: HashMap::new(),
            pm2_services: HashMap::new(),
            server_failure_counts: HashMap::new(),
            pm2_failure_counts: HashMap::new(),
            notification_threshold: 3,
        };
        let value = serde_json::to_value(&response).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("servers"));
        assert!(obj.contains_key("pm2Services"));
        assert!(obj.contains_key("serverFailureCounts"));
        assert!(obj.contains_key("pm2FailureCounts"));
        assert_eq!(obj["notificationThreshold"], 3);
    }

    #[test]
    fn test_poll_response_falls_back_to_since_id() {
        let empty = poll_response(Vec::new(), 7);
        assert_eq!(empty.last_id, 7);
        assert!(empty.messages.is_empty());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & co"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; co"
        );
    }
}
