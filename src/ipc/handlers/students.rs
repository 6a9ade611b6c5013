use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_str, require_actor, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;
use uuid::Uuid;

fn student_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "fullName": r.get::<_, String>(1)?,
        "studentNo": r.get::<_, Option<String>>(2)?,
        "classId": r.get::<_, Option<String>>(3)?,
        "active": r.get::<_, i64>(4)? != 0,
    }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
    only_student: Option<&str>,
) -> Result<serde_json::Value, HandlerErr> {
    let mut sql = "SELECT id, full_name, student_no, class_id, active FROM students WHERE 1 = 1"
        .to_string();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(class_id) = get_optional_str(params, "classId")? {
        sql.push_str(" AND class_id = ?");
        binds.push(Value::Text(class_id));
    }
    if let Some(student_id) = only_student {
        sql.push_str(" AND id = ?");
        binds.push(Value::Text(student_id.to_string()));
    }
    sql.push_str(" ORDER BY full_name, id");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let students = stmt
        .query_map(params_from_iter(binds), student_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "students": students }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let full_name = get_required_str(params, "fullName")?;
    let student_no = get_optional_str(params, "studentNo")?;
    let class_id = get_optional_str(params, "classId")?;
    let active = get_optional_bool(params, "active")?.unwrap_or(true);
    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, full_name, student_no, class_id, active, updated_at)
         VALUES(?, ?, ?, ?, ?, datetime('now'))",
        (&student_id, &full_name, &student_no, &class_id, active as i64),
    )
    .map_err(|e| HandlerErr::update(e, "students"))?;
    Ok(json!({ "studentId": student_id }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let Some(patch) = params.get("patch").filter(|v| v.is_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut sets: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if patch.get("fullName").is_some() {
        sets.push("full_name = ?");
        binds.push(Value::Text(get_required_str(patch, "fullName")?));
    }
    if patch.get("studentNo").is_some() {
        sets.push("student_no = ?");
        binds.push(opt_text(get_optional_str(patch, "studentNo")?));
    }
    if patch.get("classId").is_some() {
        sets.push("class_id = ?");
        binds.push(opt_text(get_optional_str(patch, "classId")?));
    }
    if let Some(active) = get_optional_bool(patch, "active")? {
        sets.push("active = ?");
        binds.push(Value::Integer(active as i64));
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("patch has no known fields"));
    }
    binds.push(Value::Text(student_id));
    let sql = format!(
        "UPDATE students SET {}, updated_at = datetime('now') WHERE id = ?",
        sets.join(", ")
    );
    let changed = conn
        .execute(&sql, params_from_iter(binds))
        .map_err(|e| HandlerErr::update(e, "students"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "ok": true }))
}

fn opt_text(v: Option<String>) -> Value {
    v.map(Value::Text).unwrap_or(Value::Null)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || {
        let actor = require_actor(state.actor.as_ref(), Capability::ViewAttendance)?;
        let conn = require_db(state)?;
        let only = if actor.role.is_scoped_to_self() {
            actor.student_id.as_deref()
        } else {
            None
        };
        students_list(conn, &req.params, only)
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_write(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let run = || {
        require_actor(state.actor.as_ref(), Capability::ManageStudents)?;
        let conn = require_db(state)?;
        f(conn, &req.params)
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_write(state, req, students_create)),
        "students.update" => Some(handle_students_write(state, req, students_update)),
        _ => None,
    }
}
