use crate::geo::validate_coordinates;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_f64, get_required_str, require_actor,
    require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Coordinates, Location};
use crate::repo::{location_from_row, LOCATION_COLUMNS};
use crate::roles::Capability;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

fn locations_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let include_inactive = get_optional_bool(params, "includeInactive")?.unwrap_or(true);
    let sql = if include_inactive {
        format!("SELECT {} FROM locations ORDER BY name, id", LOCATION_COLUMNS)
    } else {
        format!(
            "SELECT {} FROM locations WHERE active = 1 ORDER BY name, id",
            LOCATION_COLUMNS
        )
    };
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let locations: Vec<Location> = stmt
        .query_map([], location_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "locations": locations }))
}

fn locations_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let latitude = get_required_f64(params, "latitude")?;
    let longitude = get_required_f64(params, "longitude")?;
    validate_coordinates(Coordinates::new(latitude, longitude)).map_err(HandlerErr::bad_params)?;
    let radius = params
        .get("radiusMeters")
        .and_then(|v| v.as_u64())
        .filter(|r| *r > 0 && *r <= u32::MAX as u64)
        .ok_or_else(|| HandlerErr::bad_params("radiusMeters must be a positive integer"))?;
    let active = get_optional_bool(params, "active")?.unwrap_or(true);

    let location_id = match get_optional_str(params, "id")? {
        Some(id) => id,
        None => Uuid::new_v4().to_string(),
    };
    conn.execute(
        "INSERT INTO locations(id, name, latitude, longitude, radius_meters, active)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            radius_meters = excluded.radius_meters,
            active = excluded.active",
        (&location_id, &name, latitude, longitude, radius as i64, active as i64),
    )
    .map_err(|e| HandlerErr::update(e, "locations"))?;
    info!(location = %location_id, name = %name, radius, "location saved");
    Ok(json!({ "locationId": location_id }))
}

fn locations_set_active(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let location_id = get_required_str(params, "locationId")?;
    let Some(active) = get_optional_bool(params, "active")? else {
        return Err(HandlerErr::bad_params("missing active"));
    };
    let changed = conn
        .execute(
            "UPDATE locations SET active = ? WHERE id = ?",
            (active as i64, &location_id),
        )
        .map_err(|e| HandlerErr::update(e, "locations"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("location not found"));
    }
    Ok(json!({ "ok": true }))
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
        "locations.list" => Some(handle(state, req, Capability::ViewAttendance, locations_list)),
        "locations.upsert" => Some(handle(
            state,
            req,
            Capability::ManageLocations,
            locations_upsert,
        )),
        "locations.setActive" => Some(handle(
            state,
            req,
            Capability::ManageLocations,
            locations_set_active,
        )),
        _ => None,
    }
}
