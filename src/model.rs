use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A named circular geofence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32,
    pub active: bool,
}

impl Location {
    pub fn center(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u32,
    pub check_in_start: NaiveTime,
    pub check_in_end: NaiveTime,
    pub check_out_start: NaiveTime,
    pub check_out_end: NaiveTime,
    pub late_threshold_minutes: u32,
    /// `None` applies to every class.
    pub class_id: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "late" => Some(Self::Late),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub check_in_time: Option<NaiveDateTime>,
    pub check_in_latitude: Option<f64>,
    pub check_in_longitude: Option<f64>,
    pub location_id: Option<String>,
    pub check_out_time: Option<NaiveDateTime>,
    pub check_out_latitude: Option<f64>,
    pub check_out_longitude: Option<f64>,
    pub status: AttendanceStatus,
    pub notes: String,
    pub device_fingerprint: Option<String>,
    pub violation_flag: bool,
}

impl AttendanceRecord {
    pub fn is_checked_out(&self) -> bool {
        self.check_out_time.is_some()
    }
}

/// Fields written when a check-in is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInWrite {
    pub student_id: String,
    pub date: NaiveDate,
    pub time: NaiveDateTime,
    pub position: Coordinates,
    pub location_id: String,
    pub status: AttendanceStatus,
    pub notes: String,
    pub device_fingerprint: String,
    pub violation_flag: bool,
}

/// Fields written when a check-out is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutWrite {
    pub record_id: String,
    pub time: NaiveDateTime,
    pub position: Coordinates,
    pub notes: String,
    pub violation_flag: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    Pending,
    Approved,
    Rejected,
}

impl PermitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit {
    pub id: String,
    pub student_id: String,
    pub kind: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PermitStatus,
    pub reason: String,
}

impl Permit {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}
