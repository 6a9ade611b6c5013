use crate::error::AttendanceError;
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::roles::{Actor, Capability};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde_json::Value;
use tracing::warn;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        warn!(error = %e, "query failed");
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update(e: impl std::fmt::Display, table: &str) -> Self {
        warn!(error = %e, table, "update failed");
        Self {
            details: Some(serde_json::json!({ "table": table })),
            ..Self::new("db_update_failed", e.to_string())
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        warn!(error = %e, "internal error");
        Self::new("internal", e.to_string())
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AttendanceError> for HandlerErr {
    fn from(e: AttendanceError) -> Self {
        if let AttendanceError::Store(inner) = &e {
            warn!(error = %inner, "attendance store error");
        }
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn get_required_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

pub fn get_required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

/// Wall-clock time for an attendance request; `at` overrides the local clock.
pub fn request_time(params: &Value) -> Result<NaiveDateTime, HandlerErr> {
    match get_optional_str(params, "at")? {
        Some(raw) => NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S")
            .map_err(|_| HandlerErr::bad_params("at must be YYYY-MM-DDTHH:MM:SS")),
        None => Ok(chrono::Local::now().naive_local()),
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_actor(actor: Option<&Actor>, capability: Capability) -> Result<&Actor, HandlerErr> {
    let Some(actor) = actor else {
        return Err(HandlerErr::new("no_session", "call session.set first"));
    };
    if !actor.role.can(capability) {
        return Err(HandlerErr::new(
            "forbidden",
            format!("{} may not {:?}", actor.role.as_str(), capability),
        ));
    }
    Ok(actor)
}

pub fn require_student_access(actor: &Actor, student_id: &str) -> Result<(), HandlerErr> {
    if actor.can_act_for_student(student_id) {
        Ok(())
    } else {
        Err(HandlerErr::new(
            "forbidden",
            "not allowed to act for this student",
        ))
    }
}

/// The student's class, or `not_found`.
pub fn student_class(conn: &Connection, student_id: &str) -> Result<Option<String>, HandlerErr> {
    use rusqlite::OptionalExtension;
    conn.query_row(
        "SELECT class_id FROM students WHERE id = ?",
        [student_id],
        |r| r.get::<_, Option<String>>(0),
    )
    .optional()
    .map_err(HandlerErr::query)?
    .ok_or_else(|| HandlerErr::not_found("student not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_str_treats_blank_as_missing() {
        let p = json!({ "a": "  ", "b": null, "c": " x ", "d": 3 });
        assert_eq!(get_optional_str(&p, "a").ok().flatten(), None);
        assert_eq!(get_optional_str(&p, "b").ok().flatten(), None);
        assert_eq!(get_optional_str(&p, "c").ok().flatten(), Some("x".to_string()));
        assert!(get_optional_str(&p, "d").is_err());
        assert_eq!(get_optional_str(&p, "missing").ok().flatten(), None);
    }

    #[test]
    fn request_time_parses_override() {
        let t = request_time(&json!({ "at": "2026-10-15T07:29:59" })).ok().expect("time");
        assert_eq!(t.format("%H:%M:%S").to_string(), "07:29:59");
        assert!(request_time(&json!({ "at": "07:29" })).is_err());
    }

    #[test]
    fn attendance_errors_keep_their_code() {
        let e: HandlerErr = AttendanceError::NoSchedule.into();
        assert_eq!(e.code, "no_schedule");
        let resp = e.response("7");
        assert_eq!(resp["error"]["code"], "no_schedule");
        assert_eq!(resp["ok"], false);
    }

    #[test]
    fn internal_errors_use_internal_code() {
        let resp = HandlerErr::internal("serializer refused").response("9");
        assert_eq!(resp["error"]["code"], "internal");
        assert_eq!(resp["error"]["message"], "serializer refused");
    }
}
