use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_str, request_time, require_actor,
    require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Schedule;
use crate::repo::{schedule_from_row, AttendanceRepository, SqliteRepository, SCHEDULE_COLUMNS};
use crate::roles::Capability;
use crate::schedule::{day_of_week, format_time, parse_time};
use chrono::NaiveTime;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

fn schedule_json(s: &Schedule) -> Value {
    json!({
        "id": s.id,
        "dayOfWeek": s.day_of_week,
        "checkInStart": format_time(s.check_in_start),
        "checkInEnd": format_time(s.check_in_end),
        "checkOutStart": format_time(s.check_out_start),
        "checkOutEnd": format_time(s.check_out_end),
        "lateThresholdMinutes": s.late_threshold_minutes,
        "classId": s.class_id,
        "active": s.active,
    })
}

fn get_time(params: &Value, key: &str) -> Result<NaiveTime, HandlerErr> {
    let raw = get_required_str(params, key)?;
    parse_time(&raw).map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e)))
}

fn schedules_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let day = params.get("dayOfWeek").and_then(|v| v.as_u64());
    let mut sql = format!("SELECT {} FROM schedules", SCHEDULE_COLUMNS);
    if day.is_some() {
        sql.push_str(" WHERE day_of_week = ?");
    }
    sql.push_str(" ORDER BY day_of_week, check_in_start, id");
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let rows = match day {
        Some(d) => stmt.query_map([d as i64], schedule_from_row),
        None => stmt.query_map([], schedule_from_row),
    }
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)?;
    let schedules: Vec<Value> = rows.iter().map(schedule_json).collect();
    Ok(json!({ "schedules": schedules }))
}

fn schedules_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let day = params
        .get("dayOfWeek")
        .and_then(|v| v.as_u64())
        .filter(|d| *d <= 6)
        .ok_or_else(|| HandlerErr::bad_params("dayOfWeek must be 0..=6 (0 = Sunday)"))?;
    let check_in_start = get_time(params, "checkInStart")?;
    let check_in_end = get_time(params, "checkInEnd")?;
    let check_out_start = get_time(params, "checkOutStart")?;
    let check_out_end = get_time(params, "checkOutEnd")?;
    if check_in_start >= check_in_end {
        return Err(HandlerErr::bad_params("checkInStart must be before checkInEnd"));
    }
    if check_out_start >= check_out_end {
        return Err(HandlerErr::bad_params(
            "checkOutStart must be before checkOutEnd",
        ));
    }
    let late_threshold = match params.get("lateThresholdMinutes") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .filter(|m| *m <= 24 * 60)
            .ok_or_else(|| HandlerErr::bad_params("lateThresholdMinutes must be 0..=1440"))?,
    };
    let class_id = get_optional_str(params, "classId")?;
    let active = get_optional_bool(params, "active")?.unwrap_or(true);
    let schedule_id = match get_optional_str(params, "id")? {
        Some(id) => id,
        None => Uuid::new_v4().to_string(),
    };

    conn.execute(
        "INSERT INTO schedules(
            id, day_of_week, check_in_start, check_in_end, check_out_start, check_out_end,
            late_threshold_minutes, class_id, active
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            day_of_week = excluded.day_of_week,
            check_in_start = excluded.check_in_start,
            check_in_end = excluded.check_in_end,
            check_out_start = excluded.check_out_start,
            check_out_end = excluded.check_out_end,
            late_threshold_minutes = excluded.late_threshold_minutes,
            class_id = excluded.class_id,
            active = excluded.active",
        rusqlite::params![
            schedule_id,
            day as i64,
            format_time(check_in_start),
            format_time(check_in_end),
            format_time(check_out_start),
            format_time(check_out_end),
            late_threshold as i64,
            class_id,
            active as i64,
        ],
    )
    .map_err(|e| HandlerErr::update(e, "schedules"))?;
    info!(schedule = %schedule_id, day, class = ?class_id, "schedule saved");
    Ok(json!({ "scheduleId": schedule_id }))
}

fn schedules_today(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let now = request_time(params)?;
    let class_id = get_optional_str(params, "classId")?;
    let day = day_of_week(now.date());
    let schedule = SqliteRepository::new(conn)
        .schedule_for_day(day, class_id.as_deref())
        .map_err(HandlerErr::query)?;
    Ok(json!({
        "date": now.date().to_string(),
        "dayOfWeek": day,
        "schedule": schedule.as_ref().map(schedule_json),
    }))
}

fn handle(
    state: &mut AppState,
    req: &Request,
    capability: Capability,
    f: fn(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let run = || {
        require_actor(state.actor.as_ref(), capability)?;
        let conn = require_db(state)?;
        f(conn, &req.params)
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "schedules.list" => Some(handle(state, req, Capability::ViewAttendance, schedules_list)),
        "schedules.upsert" => Some(handle(
            state,
            req,
            Capability::ManageSchedules,
            schedules_upsert,
        )),
        "schedules.today" => Some(handle(state, req, Capability::ViewAttendance, schedules_today)),
        _ => None,
    }
}
