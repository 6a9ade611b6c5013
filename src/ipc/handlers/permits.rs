use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_date, get_required_str, require_actor, require_db,
    require_student_access, student_class, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Permit, PermitStatus};
use crate::repo::{permit_from_row, PERMIT_COLUMNS};
use crate::roles::{Actor, Capability};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

fn permits_request(conn: &Connection, actor: &Actor, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student_access(actor, &student_id)?;
    student_class(conn, &student_id)?;
    let kind = get_required_str(params, "kind")?;
    let start_date = get_required_date(params, "startDate")?;
    let end_date = get_required_date(params, "endDate")?;
    if end_date < start_date {
        return Err(HandlerErr::bad_params("endDate must not precede startDate"));
    }
    let reason = get_optional_str(params, "reason")?.unwrap_or_default();

    let permit_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO permits(id, student_id, kind, start_date, end_date, status, reason, requested_by)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            permit_id,
            student_id,
            kind,
            start_date,
            end_date,
            PermitStatus::Pending.as_str(),
            reason,
            actor.user_id,
        ],
    )
    .map_err(|e| HandlerErr::update(e, "permits"))?;
    info!(permit = %permit_id, student = %student_id, "permit requested");
    Ok(json!({ "permitId": permit_id, "status": PermitStatus::Pending }))
}

fn permits_decide(conn: &Connection, actor: &Actor, params: &Value) -> Result<Value, HandlerErr> {
    let permit_id = get_required_str(params, "permitId")?;
    let status_raw = get_required_str(params, "status")?;
    let status = match PermitStatus::parse(&status_raw) {
        Some(s @ (PermitStatus::Approved | PermitStatus::Rejected)) => s,
        _ => {
            return Err(HandlerErr::bad_params(
                "status must be approved or rejected",
            ))
        }
    };
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM permits WHERE id = ?",
            [&permit_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(current) = current else {
        return Err(HandlerErr::not_found("permit not found"));
    };
    if current != PermitStatus::Pending.as_str() {
        return Err(HandlerErr::new(
            "permit_already_decided",
            format!("permit is already {}", current),
        ));
    }
    conn.execute(
        "UPDATE permits SET status = ?, decided_by = ? WHERE id = ?",
        (status.as_str(), &actor.user_id, &permit_id),
    )
    .map_err(|e| HandlerErr::update(e, "permits"))?;
    info!(permit = %permit_id, status = status.as_str(), by = %actor.user_id, "permit decided");
    Ok(json!({ "permitId": permit_id, "status": status }))
}

fn permits_list(conn: &Connection, actor: &Actor, params: &Value) -> Result<Value, HandlerErr> {
    let mut sql = format!("SELECT {} FROM permits WHERE 1 = 1", PERMIT_COLUMNS);
    let mut binds: Vec<SqlValue> = Vec::new();

    let student_id = match get_optional_str(params, "studentId")? {
        Some(id) => {
            require_student_access(actor, &id)?;
            Some(id)
        }
        None if actor.role.is_scoped_to_self() => actor.student_id.clone(),
        None => None,
    };
    if let Some(id) = student_id {
        sql.push_str(" AND student_id = ?");
        binds.push(SqlValue::Text(id));
    }
    if let Some(raw) = get_optional_str(params, "status")? {
        let status = PermitStatus::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown status: {}", raw)))?;
        sql.push_str(" AND status = ?");
        binds.push(SqlValue::Text(status.as_str().to_string()));
    }
    let active_on = match params.get("activeOn") {
        None | Some(Value::Null) => None,
        Some(_) => Some(get_required_date(params, "activeOn")?),
    };
    sql.push_str(" ORDER BY start_date DESC, id");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let mut permits: Vec<Permit> = stmt
        .query_map(params_from_iter(binds), permit_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    if let Some(date) = active_on {
        permits.retain(|p| p.covers(date));
    }
    Ok(json!({ "permits": permits }))
}

fn handle(
    state: &mut AppState,
    req: &Request,
    capability: Capability,
    f: fn(&Connection, &Actor, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let run = || {
        let actor = require_actor(state.actor.as_ref(), capability)?;
        let conn = require_db(state)?;
        f(conn, actor, &req.params)
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "permits.request" => Some(handle(state, req, Capability::RequestPermits, permits_request)),
        "permits.decide" => Some(handle(state, req, Capability::ApprovePermits, permits_decide)),
        "permits.list" => Some(handle(state, req, Capability::ViewAttendance, permits_list)),
        _ => None,
    }
}
