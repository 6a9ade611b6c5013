use crate::error::AttendanceError;
use crate::fingerprint::DeviceInfo;
use crate::geo::validate_coordinates;
use crate::ipc::error::ok;
use crate::ipc::handlers::setup::{history_capacity, load_section, SetupSection};
use crate::ipc::helpers::{
    get_optional_str, get_required_date, get_required_str, request_time, require_actor,
    require_db, require_student_access, student_class, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceRecord, AttendanceStatus};
use crate::repo::{record_from_row, AttendanceRepository, SqliteRepository, RECORD_COLUMNS};
use crate::roles::Capability;
use crate::schedule::{check_in_open, day_of_week, format_time};
use crate::spoofing::PositionSample;
use crate::validator::{AttendanceSession, StudentRef};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// The client either sends a fix or the reason its positioning API failed.
fn position_sample(params: &Value) -> Result<PositionSample, AttendanceError> {
    if let Some(reason) = params.get("positionError").and_then(|v| v.as_str()) {
        return Err(AttendanceError::PositionUnavailable(reason.to_string()));
    }
    match params.get("position") {
        None | Some(Value::Null) => Err(AttendanceError::PositionUnavailable(
            "no position was provided".to_string(),
        )),
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| AttendanceError::PositionUnavailable(e.to_string())),
    }
}

/// A fix outside WGS84 bounds is a malformed request, not a missing fix.
fn checked_position(params: &Value) -> Result<PositionSample, HandlerErr> {
    let sample = position_sample(params)?;
    validate_coordinates(sample.coordinates())
        .map_err(|e| HandlerErr::bad_params(format!("position: {}", e)))?;
    Ok(sample)
}

fn device_info(params: &Value) -> Result<DeviceInfo, HandlerErr> {
    match params.get("device") {
        None | Some(Value::Null) => Ok(DeviceInfo::default()),
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| HandlerErr::bad_params(format!("device: {}", e))),
    }
}

fn no_workspace() -> HandlerErr {
    HandlerErr::new("no_workspace", "select a workspace first")
}

fn attendance_client_config(state: &AppState) -> Result<Value, HandlerErr> {
    require_actor(state.actor.as_ref(), Capability::ViewAttendance)?;
    let conn = require_db(state)?;
    let geolocation =
        load_section(conn, SetupSection::Geolocation).map_err(HandlerErr::query)?;
    Ok(json!({ "geolocation": geolocation }))
}

fn attendance_status(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let actor = require_actor(state.actor.as_ref(), Capability::ViewAttendance)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    require_student_access(actor, &student_id)?;
    let class_id = student_class(conn, &student_id)?;
    let now = request_time(params)?;

    let repo = SqliteRepository::new(conn);
    let schedule = repo
        .schedule_for_day(day_of_week(now.date()), class_id.as_deref())
        .map_err(HandlerErr::query)?;
    let record = repo
        .today_record(&student_id, now.date())
        .map_err(HandlerErr::query)?;

    let checked_out = record.as_ref().is_some_and(|r| r.is_checked_out());
    let checked_in = record.as_ref().is_some_and(|r| r.check_in_time.is_some());
    let state_label = match &record {
        None => "unmarked",
        Some(r) if r.is_checked_out() => "checked_out",
        Some(r) => r.status.as_str(),
    };
    let history = state.sessions.get(&student_id).map(|s| s.history());
    let can_check_in = !checked_out
        && schedule
            .as_ref()
            .is_some_and(|s| check_in_open(now.time(), s));

    Ok(json!({
        "date": now.date().to_string(),
        "schedule": schedule.as_ref().map(|s| json!({
            "id": s.id,
            "checkInStart": format_time(s.check_in_start),
            "checkInEnd": format_time(s.check_in_end),
            "checkOutStart": format_time(s.check_out_start),
            "checkOutEnd": format_time(s.check_out_end),
        })),
        "record": record,
        "state": state_label,
        "canCheckIn": can_check_in,
        "canCheckOut": checked_in && !checked_out,
        "history": {
            "samples": history.map_or(0, |h| h.len()),
            "capacity": history.map(|h| h.capacity()),
            "lastTimestamp": history.and_then(|h| h.last()).map(|p| p.timestamp),
        },
    }))
}

fn attendance_check_in(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let AppState {
        db,
        actor,
        sessions,
        ..
    } = state;
    let actor = require_actor(actor.as_ref(), Capability::SelfAttendance)?;
    let conn = db.as_ref().ok_or_else(no_workspace)?;
    let student_id = get_required_str(params, "studentId")?;
    require_student_access(actor, &student_id)?;
    let class_id = student_class(conn, &student_id)?;
    let now = request_time(params)?;
    let device = device_info(params)?;
    let sample = checked_position(params)?;

    let capacity = history_capacity(conn).map_err(HandlerErr::query)?;
    let session = sessions
        .entry(student_id.clone())
        .or_insert_with(|| AttendanceSession::with_history_capacity(capacity));
    let student = StudentRef {
        id: &student_id,
        class_id: class_id.as_deref(),
    };
    let outcome = session.check_in(&SqliteRepository::new(conn), student, &sample, &device, now)?;
    serde_json::to_value(outcome).map_err(HandlerErr::internal)
}

fn attendance_check_out(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let AppState {
        db,
        actor,
        sessions,
        ..
    } = state;
    let actor = require_actor(actor.as_ref(), Capability::SelfAttendance)?;
    let conn = db.as_ref().ok_or_else(no_workspace)?;
    let student_id = get_required_str(params, "studentId")?;
    require_student_access(actor, &student_id)?;
    let class_id = student_class(conn, &student_id)?;
    let now = request_time(params)?;
    let sample = checked_position(params)?;

    let capacity = history_capacity(conn).map_err(HandlerErr::query)?;
    let session = sessions
        .entry(student_id.clone())
        .or_insert_with(|| AttendanceSession::with_history_capacity(capacity));
    let student = StudentRef {
        id: &student_id,
        class_id: class_id.as_deref(),
    };
    let outcome = session.check_out(&SqliteRepository::new(conn), student, &sample, now)?;
    serde_json::to_value(outcome).map_err(HandlerErr::internal)
}

fn attendance_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let actor = require_actor(state.actor.as_ref(), Capability::ViewAttendance)?;
    let conn = require_db(state)?;

    let mut sql = format!("SELECT {} FROM attendance_records WHERE 1 = 1", RECORD_COLUMNS);
    let mut binds: Vec<SqlValue> = Vec::new();
    if params.get("date").is_some_and(|v| !v.is_null()) {
        let date = get_required_date(params, "date")?;
        sql.push_str(" AND date = ?");
        binds.push(SqlValue::Text(date.to_string()));
    }
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
    if params.get("flaggedOnly").and_then(|v| v.as_bool()) == Some(true) {
        sql.push_str(" AND violation_flag = 1");
    }
    sql.push_str(" ORDER BY date DESC, check_in_time, id");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let records: Vec<AttendanceRecord> = stmt
        .query_map(params_from_iter(binds), record_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "records": records }))
}

/// Records an absence for a day with no check-in yet.
fn attendance_mark_absent(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let actor = require_actor(state.actor.as_ref(), Capability::ManageStudents)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    student_class(conn, &student_id)?;
    let date = get_required_date(params, "date")?;
    let notes = get_optional_str(params, "notes")?.unwrap_or_default();

    let record_id = Uuid::new_v4().to_string();
    let inserted = conn
        .execute(
            "INSERT INTO attendance_records(id, student_id, date, status, notes, updated_at)
             VALUES(?, ?, ?, ?, ?, datetime('now'))
             ON CONFLICT(student_id, date) DO NOTHING",
            (
                &record_id,
                &student_id,
                date,
                AttendanceStatus::Absent.as_str(),
                &notes,
            ),
        )
        .map_err(|e| HandlerErr::update(e, "attendance_records"))?;
    if inserted == 0 {
        return Err(HandlerErr::new(
            "record_exists",
            "an attendance record already exists for that day",
        ));
    }
    info!(student = %student_id, %date, by = %actor.user_id, "marked absent");
    Ok(json!({ "recordId": record_id }))
}

fn delete_record(conn: &Connection, record_id: &str) -> Result<(), HandlerErr> {
    let changed = conn
        .execute("DELETE FROM attendance_records WHERE id = ?", [record_id])
        .map_err(|e| HandlerErr::update(e, "attendance_records"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("attendance record not found"));
    }
    Ok(())
}

fn attendance_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let actor = require_actor(state.actor.as_ref(), Capability::DeleteAttendance)?;
    let conn = require_db(state)?;
    let record_id = get_required_str(params, "recordId")?;
    delete_record(conn, &record_id)?;
    info!(record = %record_id, by = %actor.user_id, "attendance record deleted");
    Ok(json!({ "ok": true }))
}

fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.clientConfig" => attendance_client_config(state),
        "attendance.status" => attendance_status(state, &req.params),
        "attendance.checkIn" => attendance_check_in(state, &req.params),
        "attendance.checkOut" => attendance_check_out(state, &req.params),
        "attendance.list" => attendance_list(state, &req.params),
        "attendance.markAbsent" => attendance_mark_absent(state, &req.params),
        "attendance.delete" => attendance_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
