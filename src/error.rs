use thiserror::Error;

/// Why a check-in or check-out was refused.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("you must be inside the school area to check in")]
    OutsideSchoolArea {
        nearest: Option<String>,
        distance_meters: Option<f64>,
    },

    #[error("location looks spoofed (confidence {confidence})")]
    LocationSuspicious {
        confidence: i32,
        warnings: Vec<String>,
    },

    #[error("no attendance schedule for today")]
    NoSchedule,

    #[error("check-in opens at {opens_at}")]
    CheckInNotOpen { opens_at: String },

    #[error("no check-in recorded for today")]
    NotCheckedIn,

    #[error("already checked out today")]
    AlreadyCheckedOut,

    #[error("check-out cannot precede check-in")]
    CheckOutBeforeCheckIn,

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PositionUnavailable(_) => "position_unavailable",
            Self::OutsideSchoolArea { .. } => "outside_school_area",
            Self::LocationSuspicious { .. } => "location_suspicious",
            Self::NoSchedule => "no_schedule",
            Self::CheckInNotOpen { .. } => "check_in_not_open",
            Self::NotCheckedIn => "not_checked_in",
            Self::AlreadyCheckedOut => "already_checked_out",
            Self::CheckOutBeforeCheckIn => "check_out_before_check_in",
            Self::Store(_) => "store",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::OutsideSchoolArea {
                nearest,
                distance_meters,
            } => Some(serde_json::json!({
                "nearestLocation": nearest,
                "distanceMeters": distance_meters,
            })),
            Self::LocationSuspicious {
                confidence,
                warnings,
            } => Some(serde_json::json!({
                "confidence": confidence,
                "warnings": warnings,
            })),
            _ => None,
        }
    }
}
