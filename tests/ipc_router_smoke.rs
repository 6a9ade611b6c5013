mod common;

use common::Sidecar;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut sc = Sidecar::spawn();

    let health = sc.request_ok("health", json!({}));
    assert!(health["workspacePath"].is_null());
    assert!(health["role"].is_null());

    let e = sc.request_err("attendance.list", json!({}));
    assert_eq!(e["code"], "no_session");
    sc.login("admin-1", "admin", None);
    let e = sc.request_err("attendance.list", json!({}));
    assert_eq!(e["code"], "no_workspace");

    sc.select_workspace();
    for method in [
        "setup.get",
        "students.list",
        "locations.list",
        "schedules.list",
        "schedules.today",
        "permits.list",
        "attendance.clientConfig",
        "attendance.list",
    ] {
        sc.request_ok(method, json!({}));
    }

    let e = sc.request_err("grades.open", json!({}));
    assert_eq!(e["code"], "not_implemented");

    let bad = sc.send_line("{not json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["role"], "admin");
}

#[test]
fn session_rules() {
    let mut sc = Sidecar::spawn();
    sc.select_workspace();

    let e = sc.request_err("session.set", json!({ "userId": "s1", "role": "student" }));
    assert_eq!(e["code"], "bad_params");
    let e = sc.request_err("session.set", json!({ "userId": "x", "role": "janitor" }));
    assert_eq!(e["code"], "bad_params");

    assert!(sc.request_ok("session.get", json!({})).is_null());
    let e = sc.request_err("setup.get", json!({}));
    assert_eq!(e["code"], "no_session");
    sc.login("s1", "student", Some("stu-1"));
    let session = sc.request_ok("session.get", json!({}));
    assert_eq!(session["role"], "student");
    assert_eq!(session["studentId"], "stu-1");
}

#[test]
fn setup_get_update_roundtrip_and_validation() {
    let mut sc = Sidecar::spawn();
    sc.select_workspace();
    sc.login("admin-1", "admin", None);

    let setup = sc.request_ok("setup.get", json!({}));
    assert_eq!(setup["geolocation"]["enableHighAccuracy"], true);
    assert_eq!(setup["geolocation"]["timeoutMs"], 15000);
    assert_eq!(setup["attendance"]["historyCapacity"], 10);
    assert_eq!(setup["discipline"]["criticalThreshold"], 75);

    let updated = sc.request_ok(
        "setup.update",
        json!({ "section": "geolocation", "patch": { "timeoutMs": 20000 } }),
    );
    assert_eq!(updated["geolocation"]["timeoutMs"], 20000);
    let config = sc.request_ok("attendance.clientConfig", json!({}));
    assert_eq!(config["geolocation"]["timeoutMs"], 20000);

    let e = sc.request_err(
        "setup.update",
        json!({ "section": "attendance", "patch": { "historyCapacity": 1 } }),
    );
    assert_eq!(e["code"], "bad_params");
    let e = sc.request_err(
        "setup.update",
        json!({ "section": "discipline", "patch": { "criticalThreshold": 40 } }),
    );
    assert_eq!(e["code"], "bad_params");

    sc.login("guru-1", "teacher", None);
    let e = sc.request_err(
        "setup.update",
        json!({ "section": "geolocation", "patch": { "timeoutMs": 5000 } }),
    );
    assert_eq!(e["code"], "forbidden");
}

#[test]
fn locations_upsert_validates_and_toggles() {
    let mut sc = Sidecar::spawn();
    sc.select_workspace();
    sc.login("admin-1", "admin", None);

    let e = sc.request_err(
        "locations.upsert",
        json!({ "name": "Field", "latitude": 91.0, "longitude": 110.2, "radiusMeters": 50 }),
    );
    assert_eq!(e["code"], "bad_params");
    let e = sc.request_err(
        "locations.upsert",
        json!({ "name": "Field", "latitude": -6.9, "longitude": 110.2, "radiusMeters": 0 }),
    );
    assert_eq!(e["code"], "bad_params");

    let id = sc.request_ok(
        "locations.upsert",
        json!({ "name": "Field", "latitude": -6.901, "longitude": 110.201, "radiusMeters": 80 }),
    )["locationId"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    sc.request_ok(
        "locations.setActive",
        json!({ "locationId": id, "active": false }),
    );
    let active = sc.request_ok("locations.list", json!({ "includeInactive": false }));
    assert_eq!(active["locations"].as_array().map(|l| l.len()), Some(0));
    let all = sc.request_ok("locations.list", json!({}));
    assert_eq!(all["locations"][0]["radiusMeters"], 80);
    assert_eq!(all["locations"][0]["active"], false);

    let e = sc.request_err(
        "locations.setActive",
        json!({ "locationId": "missing", "active": true }),
    );
    assert_eq!(e["code"], "not_found");
}
