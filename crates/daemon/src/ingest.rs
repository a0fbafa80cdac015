//! `POST /hook` dispatch table plus the audit-log HTTP server that shares
//! its port. This module owns every hook-event-name -> ledger/transition
//! mapping; `transition_session` stays the only call-site for the pure
//! transition function itself.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::Value;
use sessiond_protocol::{parse_hook_payload, HookEventName, HookPayload, MAX_HOOK_BODY_BYTES};
use tracing::warn;

use crate::app::AppState;
use crate::audit::{self, ReadLogError};
use crate::session::{ActiveTask, ActiveTool, PendingPermission, Session};
use crate::transition_session::transition_session;
use sessiond_core::{MachineEvent, MachineState};

pub fn router(app: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/hook",
            post(post_hook).layer(DefaultBodyLimit::max(MAX_HOOK_BODY_BYTES)),
        )
        .route("/logs/:session_id", get(get_logs).options(options_logs))
        .with_state(app)
}

async fn post_hook(State(app): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload = match parse_hook_payload(&body) {
        Ok(payload) => payload,
        Err(err) => return (StatusCode::BAD_REQUEST, Json(err)).into_response(),
    };
    handle_hook(&app, payload).await;
    (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
}

async fn get_logs(State(app): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
    match audit::read_log(&app.state_dir, &session_id) {
        Ok(contents) => {
            let mut response = contents.into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{session_id}.log\"")) {
                response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
            }
            response
        }
        Err(ReadLogError::InvalidSessionId) => {
            (StatusCode::BAD_REQUEST, "invalid session id").into_response()
        }
        Err(ReadLogError::NotFound) => (StatusCode::NOT_FOUND, "unknown session").into_response(),
        Err(ReadLogError::Io(err)) => {
            warn!(error = %err, session_id, "Failed to read audit log");
            (StatusCode::INTERNAL_SERVER_ERROR, "io error").into_response()
        }
    }
}

async fn options_logs() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

/// Dispatches one validated payload. Never panics: a hook whose required
/// fields are absent for its event type (e.g. `PreToolUse` missing
/// `toolUseId`) is treated as a no-op rather than an error, since the
/// payload already passed schema validation.
async fn handle_hook(app: &Arc<AppState>, payload: HookPayload) {
    let session_id = payload.session_id.clone();
    let hook_name = payload.hook_event_name;

    audit::append_hook(&app.state_dir, &session_id, hook_name.as_str());

    if hook_name.is_logging_only() {
        return;
    }

    match hook_name {
        HookEventName::UserPromptSubmit => handle_user_prompt_submit(app, payload).await,
        HookEventName::PermissionRequest => handle_permission_request(app, payload).await,
        HookEventName::PreToolUse => handle_pre_tool_use(app, payload).await,
        HookEventName::PostToolUse | HookEventName::PostToolUseFailure => {
            handle_post_tool_use(app, payload).await
        }
        HookEventName::Stop => handle_stop(app, &session_id).await,
        HookEventName::SessionEnd => {
            handle_session_end(app, &session_id, payload.reason.as_deref()).await
        }
        HookEventName::PreCompact => handle_pre_compact(app, &session_id).await,
        _ => {}
    }
}

async fn handle_user_prompt_submit(app: &Arc<AppState>, payload: HookPayload) {
    let session_id = payload.session_id.clone();
    let cwd = payload.cwd.clone();
    let prompt = payload.prompt.clone();

    let (shared, created) = app
        .registry
        .get_or_insert_with(&session_id, || {
            Session::bootstrap_from_hook(
                session_id.clone(),
                payload.transcript_path.clone(),
                cwd.clone(),
                prompt.clone(),
                Utc::now(),
            )
        })
        .await;

    if created {
        audit::append_init(&app.state_dir, &session_id, MachineState::Working.as_str());
        let session = shared.lock().await;
        app.publisher.publish(&session);
        drop(session);
        spawn_git_probe(app, &session_id, cwd);
        spawn_summarizer(app, &session_id, prompt);
    } else {
        transition_session(app, &session_id, MachineEvent::Working, "hook", None, |_| {}).await;
    }
}

fn spawn_git_probe(app: &Arc<AppState>, session_id: &str, cwd: Option<String>) {
    let Some(cwd) = cwd else { return };
    let app = app.clone();
    let session_id = session_id.to_string();
    let probe = app.git_probe.clone();
    tokio::spawn(async move {
        let result = match tokio::task::spawn_blocking(move || probe.probe(&cwd)).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, session_id, "Git probe task panicked");
                return;
            }
        };
        let Some(shared) = app.registry.get(&session_id).await else { return };
        let mut session = shared.lock().await;
        session.repo_root_path = result.repo_root_path;
        session.repo_url = result.repo_url;
        session.repo_id = result.repo_id;
        session.git_branch = result.branch;
        session.is_worktree = result.is_worktree;
        session.worktree_root = result.worktree_root;
        app.publisher.publish(&session);
    });
}

fn spawn_summarizer(app: &Arc<AppState>, session_id: &str, prompt: Option<String>) {
    let Some(prompt) = prompt else { return };
    let app = app.clone();
    let session_id = session_id.to_string();
    let summarizer = app.summarizer.clone();
    tokio::spawn(async move {
        let output = summarizer.summarize(&prompt, &[]).await;
        let Some(shared) = app.registry.get(&session_id).await else { return };
        let mut session = shared.lock().await;
        session.goal = output.goal;
        session.summary = output.summary;
        app.publisher.publish(&session);
    });
}

fn youngest_matching_tool(session: &Session, tool_name: &str) -> Option<String> {
    session
        .active_tools
        .iter()
        .filter(|(_, tool)| tool.tool_name == tool_name)
        .max_by_key(|(_, tool)| tool.started_at)
        .map(|(tool_use_id, _)| tool_use_id.clone())
}

async fn handle_permission_request(app: &Arc<AppState>, payload: HookPayload) {
    let session_id = payload.session_id.clone();
    let Some(shared) = app.registry.get(&session_id).await else {
        return;
    };

    let tool_name = payload.tool_name.clone().unwrap_or_default();
    let tool_input: Option<Value> = payload
        .tool_input
        .as_ref()
        .and_then(|t| serde_json::to_value(t).ok());

    let resolved_tool_use_id = {
        let session = shared.lock().await;
        payload
            .tool_use_id
            .clone()
            .or_else(|| youngest_matching_tool(&session, &tool_name))
    };

    let delay = Duration::from_millis(app.config.permission_delay_ms);
    let app_for_timer = app.clone();
    let session_id_for_timer = session_id.clone();
    let tool_name_for_source = tool_name.clone();

    app.timers.schedule_permission_debounce(
        &session_id,
        delay,
        resolved_tool_use_id,
        async move {
            let tool_name_for_pre = tool_name.clone();
            let tool_input_for_pre = tool_input.clone();
            transition_session(
                &app_for_timer,
                &session_id_for_timer,
                MachineEvent::PermissionRequest,
                "hook",
                Some(tool_name_for_source.as_str()),
                move |session| {
                    session.pending_permission = Some(PendingPermission {
                        tool_name: tool_name_for_pre,
                        tool_input: tool_input_for_pre,
                        requested_at: Utc::now(),
                    });
                },
            )
            .await;
        },
    );
}

async fn handle_pre_tool_use(app: &Arc<AppState>, payload: HookPayload) {
    let session_id = payload.session_id.clone();
    let Some(shared) = app.registry.get(&session_id).await else {
        return;
    };
    let Some(tool_use_id) = payload.tool_use_id.clone() else {
        return;
    };

    let tool_name = payload.tool_name.clone().unwrap_or_default();
    let tool_input_value: Option<Value> = payload
        .tool_input
        .as_ref()
        .and_then(|t| serde_json::to_value(t).ok());
    let is_task = tool_name == "Task";
    let (agent_type, description) = payload
        .tool_input
        .as_ref()
        .map(|t| {
            (
                t.subagent_type.clone().unwrap_or_else(|| tool_name.clone()),
                t.description.clone().unwrap_or_default(),
            )
        })
        .unwrap_or_else(|| (tool_name.clone(), String::new()));

    {
        let mut session = shared.lock().await;
        session.active_tools.insert(
            tool_use_id.clone(),
            ActiveTool {
                tool_name: tool_name.clone(),
                tool_input: tool_input_value,
                started_at: Utc::now(),
            },
        );
        if is_task {
            session.active_tasks.insert(
                tool_use_id.clone(),
                ActiveTask {
                    agent_type,
                    description,
                    started_at: Utc::now(),
                },
            );
        }
    }

    if is_task {
        transition_session(
            app,
            &session_id,
            MachineEvent::TaskStarted,
            "hook",
            Some(&tool_name),
            |_| {},
        )
        .await;
    } else {
        let session = shared.lock().await;
        app.publisher.publish(&session);
    }
}

async fn handle_post_tool_use(app: &Arc<AppState>, payload: HookPayload) {
    let session_id = payload.session_id.clone();
    let Some(tool_use_id) = payload.tool_use_id.clone() else {
        return;
    };

    app.timers
        .cancel_permission_debounce_if_matching(&session_id, &tool_use_id);

    let Some(shared) = app.registry.get(&session_id).await else {
        return;
    };

    let needs_working = {
        let session = shared.lock().await;
        session.machine_state == MachineState::NeedsApproval
    };
    if needs_working {
        transition_session(
            app,
            &session_id,
            MachineEvent::Working,
            "hook",
            payload.tool_name.as_deref(),
            |_| {},
        )
        .await;
    }

    let task_ledger_emptied = {
        let mut session = shared.lock().await;
        session.active_tools.remove(&tool_use_id);
        let was_task = session.active_tasks.remove(&tool_use_id).is_some();
        was_task && session.active_tasks.is_empty()
    };

    if task_ledger_emptied {
        transition_session(
            app,
            &session_id,
            MachineEvent::TasksDone,
            "hook",
            payload.tool_name.as_deref(),
            |_| {},
        )
        .await;
    } else {
        let session = shared.lock().await;
        app.publisher.publish(&session);
    }
}

async fn handle_stop(app: &Arc<AppState>, session_id: &str) {
    app.timers.cancel_permission_debounce(session_id);
    transition_session(app, session_id, MachineEvent::Stop, "hook", None, |session| {
        session.compacting_since = None;
    })
    .await;
}

/// `SessionEnd` from `waiting` is ignored when it carries an explicit
/// reason other than `prompt_input_exit`, preserving a resumed editor
/// session rather than prematurely marking it ended. A reasonless
/// `SessionEnd` always ends the session.
async fn handle_session_end(app: &Arc<AppState>, session_id: &str, reason: Option<&str>) {
    app.timers.cancel_permission_debounce(session_id);

    let Some(shared) = app.registry.get(session_id).await else {
        return;
    };
    let current = shared.lock().await.machine_state;

    if current == MachineState::Waiting && reason.is_some() && reason != Some("prompt_input_exit") {
        return;
    }

    transition_session(app, session_id, MachineEvent::Ended, "hook", None, |_| {}).await;
}

async fn handle_pre_compact(app: &Arc<AppState>, session_id: &str) {
    let Some(shared) = app.registry.get(session_id).await else {
        return;
    };
    let mut session = shared.lock().await;
    session.compacting_since = Some(Utc::now());
    app.publisher.publish(&session);
}
