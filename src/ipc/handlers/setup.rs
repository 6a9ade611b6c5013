use crate::db;
use crate::discipline::Thresholds;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_actor;
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use crate::spoofing::DEFAULT_HISTORY_CAPACITY;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
pub enum SetupSection {
    Geolocation,
    Attendance,
    Discipline,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "geolocation" => Some(Self::Geolocation),
            "attendance" => Some(Self::Attendance),
            "discipline" => Some(Self::Discipline),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Geolocation => "setup.geolocation",
            Self::Attendance => "setup.attendance",
            Self::Discipline => "setup.discipline",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        // One-shot fix, never cached.
        SetupSection::Geolocation => json!({
            "enableHighAccuracy": true,
            "timeoutMs": 15000,
            "maximumAgeMs": 0
        }),
        SetupSection::Attendance => json!({
            "historyCapacity": DEFAULT_HISTORY_CAPACITY
        }),
        SetupSection::Discipline => {
            let t = Thresholds::default();
            json!({
                "warningThreshold": t.warning,
                "probationThreshold": t.probation,
                "criticalThreshold": t.critical
            })
        }
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Geolocation => match k.as_str() {
                "enableHighAccuracy" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "timeoutMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1000, 120_000)?));
                }
                "maximumAgeMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 600_000)?));
                }
                _ => return Err(format!("unknown geolocation field: {}", k)),
            },
            SetupSection::Attendance => match k.as_str() {
                "historyCapacity" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 2, 50)?));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
            SetupSection::Discipline => match k.as_str() {
                "warningThreshold" | "probationThreshold" | "criticalThreshold" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10_000)?));
                }
                _ => return Err(format!("unknown discipline field: {}", k)),
            },
        }
    }
    if let SetupSection::Discipline = section {
        let w = obj.get("warningThreshold").and_then(|v| v.as_i64()).unwrap_or(0);
        let p = obj.get("probationThreshold").and_then(|v| v.as_i64()).unwrap_or(0);
        let c = obj.get("criticalThreshold").and_then(|v| v.as_i64()).unwrap_or(0);
        if !(w < p && p < c) {
            return Err("thresholds must increase: warning < probation < critical".into());
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            }
        }
    }
    Ok(current)
}

pub fn history_capacity(conn: &rusqlite::Connection) -> anyhow::Result<usize> {
    let s = load_section(conn, SetupSection::Attendance)?;
    Ok(s.get("historyCapacity")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_HISTORY_CAPACITY))
}

pub fn discipline_thresholds(conn: &rusqlite::Connection) -> anyhow::Result<Thresholds> {
    let s = load_section(conn, SetupSection::Discipline)?;
    let d = Thresholds::default();
    let get = |k: &str, fallback: i64| s.get(k).and_then(|v| v.as_i64()).unwrap_or(fallback);
    Ok(Thresholds {
        warning: get("warningThreshold", d.warning),
        probation: get("probationThreshold", d.probation),
        critical: get("criticalThreshold", d.critical),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_actor(state.actor.as_ref(), Capability::ViewAttendance) {
        return e.response(&req.id);
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for (name, section) in [
        ("geolocation", SetupSection::Geolocation),
        ("attendance", SetupSection::Attendance),
        ("discipline", SetupSection::Discipline),
    ] {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(name.to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_actor(state.actor.as_ref(), Capability::ManageSchedules) {
        return e.response(&req.id);
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let mut result = json!({ "ok": true });
    result[section_raw] = current;
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
