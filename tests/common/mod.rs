#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

/// Base epoch milliseconds for position samples; tests add offsets.
pub const T0_MS: i64 = 1_792_000_000_000;

/// Thursday 2026-10-15.
pub const SCHOOL_DAY: &str = "2026-10-15";

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: TempDir,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_sikajid");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sikajid");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            workspace: tempfile::tempdir().expect("temp workspace"),
        }
    }

    pub fn send_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Returns the error object; panics if the call succeeded.
    pub fn request_err(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().unwrap_or_else(|| json!({}))
    }

    pub fn select_workspace(&mut self) {
        let path = self.workspace.path().to_string_lossy().to_string();
        self.request_ok("workspace.select", json!({ "path": path }));
    }

    pub fn login(&mut self, user_id: &str, role: &str, student_id: Option<&str>) {
        self.request_ok(
            "session.set",
            json!({ "userId": user_id, "role": role, "studentId": student_id }),
        );
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A workspace with the Main Gate geofence, a Thursday schedule
/// (check-in 06:30-07:30, check-out 15:00-17:00) and two students in 7A.
pub struct School {
    pub sidecar: Sidecar,
    pub siti: String,
    pub budi: String,
    pub gate: String,
}

pub fn seed_school() -> School {
    let mut sidecar = Sidecar::spawn();
    sidecar.select_workspace();
    sidecar.login("admin-1", "admin", None);

    let gate = sidecar.request_ok(
        "locations.upsert",
        json!({
            "name": "Main Gate",
            "latitude": -6.9,
            "longitude": 110.2,
            "radiusMeters": 50
        }),
    )["locationId"]
        .as_str()
        .expect("locationId")
        .to_string();
    sidecar.request_ok(
        "schedules.upsert",
        json!({
            "dayOfWeek": 4,
            "checkInStart": "06:30",
            "checkInEnd": "07:30",
            "checkOutStart": "15:00",
            "checkOutEnd": "17:00"
        }),
    );
    let mut student = |name: &str| {
        sidecar.request_ok("students.create", json!({ "fullName": name, "classId": "7A" }))
            ["studentId"]
            .as_str()
            .expect("studentId")
            .to_string()
    };
    let siti = student("Siti Rahma");
    let budi = student("Budi Santoso");

    School {
        sidecar,
        siti,
        budi,
        gate,
    }
}

/// A plausible fix about 17 m from the Main Gate centre.
pub fn near_gate(offset_secs: i64) -> Value {
    position(-6.900123, 110.200089, 12.0, offset_secs)
}

pub fn position(latitude: f64, longitude: f64, accuracy: f64, offset_secs: i64) -> Value {
    json!({
        "latitude": latitude,
        "longitude": longitude,
        "accuracy": accuracy,
        "timestamp": T0_MS + offset_secs * 1000
    })
}

pub fn device() -> Value {
    json!({
        "userAgent": "Mozilla/5.0 (Linux; Android 14)",
        "language": "id-ID",
        "platform": "Linux armv8l",
        "screenWidth": 412,
        "screenHeight": 915,
        "timezone": "Asia/Jakarta",
        "canvasData": "data:image/png;base64,AAAA",
        "hardwareConcurrency": 8
    })
}

pub fn at(time: &str) -> String {
    format!("{}T{}", SCHOOL_DAY, time)
}
