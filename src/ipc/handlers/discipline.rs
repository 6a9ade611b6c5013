use crate::discipline::{discipline_score, EntryKind};
use crate::ipc::error::ok;
use crate::ipc::handlers::setup::discipline_thresholds;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, require_actor, require_db, require_student_access,
    student_class, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::roles::{Actor, Capability};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// Largest single entry a counselor may record.
const MAX_ENTRY_POINTS: i64 = 1000;

struct Entry {
    id: String,
    kind: EntryKind,
    description: String,
    points: i64,
    recorded_on: NaiveDate,
    recorded_by: String,
}

fn load_entries(conn: &Connection, student_id: &str) -> Result<Vec<Entry>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, description, points, recorded_on, recorded_by
             FROM discipline_entries
             WHERE student_id = ?
             ORDER BY recorded_on DESC, id",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([student_id], |r| {
            let kind_raw: String = r.get(1)?;
            let kind = EntryKind::parse(&kind_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    format!("unknown discipline kind: {}", kind_raw).into(),
                )
            })?;
            Ok(Entry {
                id: r.get(0)?,
                kind,
                description: r.get(2)?,
                points: r.get(3)?,
                recorded_on: r.get(4)?,
                recorded_by: r.get(5)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(rows)
}

fn discipline_record(conn: &Connection, actor: &Actor, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    student_class(conn, &student_id)?;
    let kind_raw = get_required_str(params, "kind")?;
    let kind = EntryKind::parse(&kind_raw)
        .ok_or_else(|| HandlerErr::bad_params("kind must be violation or achievement"))?;
    let description = get_required_str(params, "description")?;
    let points = params
        .get("points")
        .and_then(|v| v.as_i64())
        .filter(|p| (1..=MAX_ENTRY_POINTS).contains(p))
        .ok_or_else(|| {
            HandlerErr::bad_params(format!("points must be between 1 and {}", MAX_ENTRY_POINTS))
        })?;
    let recorded_on = match get_optional_str(params, "date")? {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    let entry_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO discipline_entries(id, student_id, kind, description, points, recorded_on, recorded_by)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            entry_id,
            student_id,
            kind.as_str(),
            description,
            points,
            recorded_on,
            actor.user_id,
        ],
    )
    .map_err(|e| HandlerErr::update(e, "discipline_entries"))?;
    info!(student = %student_id, kind = kind.as_str(), points, "discipline entry recorded");
    Ok(json!({ "entryId": entry_id }))
}

fn discipline_list(conn: &Connection, actor: &Actor, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student_access(actor, &student_id)?;
    student_class(conn, &student_id)?;
    let entries: Vec<Value> = load_entries(conn, &student_id)?
        .into_iter()
        .map(|e| {
            json!({
                "id": e.id,
                "kind": e.kind,
                "description": e.description,
                "points": e.points,
                "recordedOn": e.recorded_on.to_string(),
                "recordedBy": e.recorded_by,
            })
        })
        .collect();
    Ok(json!({ "entries": entries }))
}

fn discipline_score_for(
    conn: &Connection,
    actor: &Actor,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student_access(actor, &student_id)?;
    student_class(conn, &student_id)?;
    let thresholds = discipline_thresholds(conn).map_err(HandlerErr::query)?;
    let entries = load_entries(conn, &student_id)?;
    let score = discipline_score(entries.iter().map(|e| (e.kind, e.points)), &thresholds);
    Ok(json!({ "studentId": student_id, "score": score }))
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
        "discipline.record" => Some(handle(
            state,
            req,
            Capability::RecordDiscipline,
            discipline_record,
        )),
        "discipline.list" => Some(handle(state, req, Capability::ViewDiscipline, discipline_list)),
        "discipline.score" => Some(handle(
            state,
            req,
            Capability::ViewDiscipline,
            discipline_score_for,
        )),
        _ => None,
    }
}
