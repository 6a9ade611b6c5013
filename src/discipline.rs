use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Violation,
    Achievement,
}

impl EntryKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "violation" => Some(Self::Violation),
            "achievement" => Some(Self::Achievement),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Violation => "violation",
            Self::Achievement => "achievement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Good,
    Warning,
    Probation,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: i64,
    pub probation: i64,
    pub critical: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: 25,
            probation: 50,
            critical: 75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineScore {
    pub violation_points: i64,
    pub achievement_points: i64,
    /// Violations minus achievements; may be negative.
    pub score: i64,
    pub standing: Standing,
}

pub fn standing_for(score: i64, t: &Thresholds) -> Standing {
    if score >= t.critical {
        Standing::Critical
    } else if score >= t.probation {
        Standing::Probation
    } else if score >= t.warning {
        Standing::Warning
    } else {
        Standing::Good
    }
}

pub fn discipline_score<I>(entries: I, t: &Thresholds) -> DisciplineScore
where
    I: IntoIterator<Item = (EntryKind, i64)>,
{
    let mut violation_points: i64 = 0;
    let mut achievement_points: i64 = 0;
    for (kind, points) in entries {
        match kind {
            EntryKind::Violation => {
                violation_points = violation_points.saturating_add(points)
            }
            EntryKind::Achievement => {
                achievement_points = achievement_points.saturating_add(points)
            }
        }
    }
    let score = violation_points.saturating_sub(achievement_points);
    DisciplineScore {
        violation_points,
        achievement_points,
        score,
        standing: standing_for(score, t),
    }
}
