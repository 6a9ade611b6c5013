use crate::geo::haversine_distance;
use crate::model::Coordinates;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
pub const MIN_VALID_CONFIDENCE: i32 = 60;

const PERFECT_ACCURACY_METERS: f64 = 5.0;
const PERFECT_ACCURACY_PENALTY: i32 = 30;
const MAX_PLAUSIBLE_SPEED_MPS: f64 = 50.0;
const TELEPORT_PENALTY: i32 = 40;
const FAKE_PATTERN_PENALTY: i32 = 30;
/// Default position reported by stock mobile emulators.
const EMULATOR_REFERENCE: Coordinates = Coordinates {
    latitude: 37.4219983,
    longitude: -122.084,
};
const EMULATOR_REFERENCE_RADIUS_METERS: f64 = 1.0;

/// One reading from the client's positioning API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported accuracy radius in meters.
    pub accuracy: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl PositionSample {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Bounded ring buffer of recent samples. Oldest is evicted first.
#[derive(Debug, Clone)]
pub struct LocationHistory {
    samples: VecDeque<PositionSample>,
    capacity: usize,
}

impl Default for LocationHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl LocationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PositionSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn last(&self) -> Option<&PositionSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoofCheck {
    /// Starts at 100; deductions accumulate and are not clamped.
    pub confidence: i32,
    pub warnings: Vec<String>,
    pub valid: bool,
}

/// Scores `sample` against the previous reading in `history`.
///
/// This runs on data the client reports about itself, so it only filters
/// out careless spoofing.
pub fn check_sample(sample: &PositionSample, history: &LocationHistory) -> SpoofCheck {
    let mut confidence = 100;
    let mut warnings = Vec::new();

    if sample.accuracy.is_nan() || sample.accuracy < PERFECT_ACCURACY_METERS {
        confidence -= PERFECT_ACCURACY_PENALTY;
        warnings.push(format!(
            "Location accuracy is suspiciously precise ({:.1} m)",
            sample.accuracy
        ));
    }

    if let Some(speed) = history.last().and_then(|prev| implied_speed(prev, sample)) {
        if speed > MAX_PLAUSIBLE_SPEED_MPS {
            confidence -= TELEPORT_PENALTY;
            warnings.push(format!(
                "Position moved implausibly fast ({:.0} m/s) since the last reading",
                speed
            ));
        }
    }

    if let Some(pattern) = fake_pattern(sample.coordinates()) {
        confidence -= FAKE_PATTERN_PENALTY;
        warnings.push(format!("Coordinates look fabricated ({})", pattern));
    }

    SpoofCheck {
        confidence,
        valid: confidence >= MIN_VALID_CONFIDENCE,
        warnings,
    }
}

/// Meters per second between two samples; `None` when time did not advance
/// or the gap does not fit in an `i64`.
fn implied_speed(prev: &PositionSample, current: &PositionSample) -> Option<f64> {
    let elapsed_ms = current.timestamp.checked_sub(prev.timestamp)?;
    if elapsed_ms <= 0 {
        return None;
    }
    let meters = haversine_distance(prev.coordinates(), current.coordinates());
    Some(meters / (elapsed_ms as f64 / 1000.0))
}

fn fake_pattern(p: Coordinates) -> Option<&'static str> {
    if p.latitude == 0.0 || p.longitude == 0.0 {
        return Some("zero coordinate");
    }
    if haversine_distance(p, EMULATOR_REFERENCE) <= EMULATOR_REFERENCE_RADIUS_METERS {
        return Some("emulator default position");
    }
    if has_trailing_zeros(p.latitude) || has_trailing_zeros(p.longitude) {
        return Some("too few decimal places");
    }
    None
}

/// Real fixes carry 6+ decimals; hand-typed ones end in zeros.
fn has_trailing_zeros(v: f64) -> bool {
    format!("{:.6}", v).ends_with("000")
}
