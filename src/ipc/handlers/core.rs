use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roles::{Actor, Role};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "role": state.actor.as_ref().map(|a| a.role.as_str())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            // Position history belongs to the previous workspace's students.
            state.sessions.clear();
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => {
            warn!(workspace = %path.display(), error = %e, "failed to open workspace");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

fn handle_session_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(user_id) = req.params.get("userId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing userId", None);
    };
    let Some(role_raw) = req.params.get("role").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing role", None);
    };
    let Some(role) = Role::parse(role_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown role: {}", role_raw),
            None,
        );
    };
    let student_id = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    if role.is_scoped_to_self() && student_id.is_none() {
        return err(
            &req.id,
            "bad_params",
            "studentId is required for student and parent sessions",
            None,
        );
    }
    info!(user = user_id, role = role.as_str(), "session set");
    state.actor = Some(Actor {
        user_id: user_id.to_string(),
        role,
        student_id,
    });
    ok(&req.id, json!({ "userId": user_id, "role": role }))
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.actor.as_ref() {
        Some(a) => ok(
            &req.id,
            json!({ "userId": a.user_id, "role": a.role, "studentId": a.student_id }),
        ),
        None => ok(&req.id, json!(null)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.set" => Some(handle_session_set(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        _ => None,
    }
}
