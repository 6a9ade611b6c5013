use crate::error::AttendanceError;
use crate::fingerprint::{device_fingerprint, DeviceInfo};
use crate::geo::{find_matching_location, nearest_location, validate_coordinates};
use crate::model::{AttendanceRecord, AttendanceStatus, CheckInWrite, CheckOutWrite, Schedule};
use crate::repo::AttendanceRepository;
use crate::schedule::{
    attendance_status, check_in_open, day_of_week, format_time, is_late_checkout,
    late_checkout_note, minutes_late,
};
use crate::spoofing::{check_sample, LocationHistory, PositionSample, SpoofCheck};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct StudentRef<'a> {
    pub id: &'a str,
    pub class_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub record: AttendanceRecord,
    pub status: AttendanceStatus,
    pub location_name: String,
    pub minutes_late: i64,
    pub confidence: i32,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutOutcome {
    pub record: AttendanceRecord,
    pub confidence: i32,
    pub warnings: Vec<String>,
    pub late_without_permit: bool,
    pub permit_id: Option<String>,
}

/// Per-student validator state. Holds the recent position history the
/// anti-spoofing check compares against.
#[derive(Debug, Clone, Default)]
pub struct AttendanceSession {
    history: LocationHistory,
}

impl AttendanceSession {
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            history: LocationHistory::with_capacity(capacity),
        }
    }

    pub fn history(&self) -> &LocationHistory {
        &self.history
    }

    /// Scores the sample, then records it so the next check sees it.
    fn screen(&mut self, sample: &PositionSample) -> Result<SpoofCheck, AttendanceError> {
        validate_coordinates(sample.coordinates()).map_err(AttendanceError::PositionUnavailable)?;
        let check = check_sample(sample, &self.history);
        self.history.push(*sample);
        debug!(
            confidence = check.confidence,
            warnings = check.warnings.len(),
            "screened position sample"
        );
        if !check.valid {
            return Err(AttendanceError::LocationSuspicious {
                confidence: check.confidence,
                warnings: check.warnings,
            });
        }
        Ok(check)
    }

    pub fn check_in<R: AttendanceRepository + ?Sized>(
        &mut self,
        repo: &R,
        student: StudentRef<'_>,
        sample: &PositionSample,
        device: &DeviceInfo,
        now: NaiveDateTime,
    ) -> Result<CheckInOutcome, AttendanceError> {
        let date = now.date();
        let schedule = today_schedule(repo, student, now)?;
        if !check_in_open(now.time(), &schedule) {
            return Err(AttendanceError::CheckInNotOpen {
                opens_at: format_time(schedule.check_in_start),
            });
        }
        if let Some(existing) = repo.today_record(student.id, date)? {
            if existing.is_checked_out() {
                return Err(AttendanceError::AlreadyCheckedOut);
            }
        }

        let check = self.screen(sample)?;

        let locations = repo.active_locations()?;
        let Some(location) = find_matching_location(sample.coordinates(), &locations) else {
            let nearest = nearest_location(sample.coordinates(), &locations);
            info!(
                student = student.id,
                nearest = nearest.as_ref().map(|n| n.name.as_str()),
                "check-in rejected: outside school area"
            );
            return Err(AttendanceError::OutsideSchoolArea {
                distance_meters: nearest.as_ref().map(|n| n.distance_meters),
                nearest: nearest.map(|n| n.name),
            });
        };

        let status = attendance_status(now.time(), &schedule);
        let late_by = minutes_late(now.time(), &schedule);
        let mut notes = Vec::new();
        if status == AttendanceStatus::Late {
            notes.push(format!("Late by {} min", late_by));
        }
        for w in &check.warnings {
            notes.push(format!("Location warning: {}", w));
        }

        let write = CheckInWrite {
            student_id: student.id.to_string(),
            date,
            time: now,
            position: sample.coordinates(),
            location_id: location.id.clone(),
            status,
            notes: notes.join("\n"),
            device_fingerprint: device_fingerprint(device, sample.timestamp),
            violation_flag: !check.warnings.is_empty(),
        };
        let record = repo.upsert_check_in(&write)?;
        info!(
            student = student.id,
            status = status.as_str(),
            location = location.name.as_str(),
            confidence = check.confidence,
            "check-in accepted"
        );

        Ok(CheckInOutcome {
            record,
            status,
            location_name: location.name.clone(),
            minutes_late: late_by,
            confidence: check.confidence,
            warnings: check.warnings,
        })
    }

    pub fn check_out<R: AttendanceRepository + ?Sized>(
        &mut self,
        repo: &R,
        student: StudentRef<'_>,
        sample: &PositionSample,
        now: NaiveDateTime,
    ) -> Result<CheckOutOutcome, AttendanceError> {
        let date = now.date();
        let record = repo
            .today_record(student.id, date)?
            .ok_or(AttendanceError::NotCheckedIn)?;
        let Some(checked_in_at) = record.check_in_time else {
            return Err(AttendanceError::NotCheckedIn);
        };
        if record.is_checked_out() {
            return Err(AttendanceError::AlreadyCheckedOut);
        }
        if now < checked_in_at {
            return Err(AttendanceError::CheckOutBeforeCheckIn);
        }

        let check = self.screen(sample)?;

        let mut warnings = check.warnings.clone();
        let mut notes = record.notes.clone();
        let mut late_without_permit = false;
        let mut permit_id = None;
        if is_late_checkout(now.time()) {
            match repo.approved_permit_on(student.id, date)? {
                Some(permit) => permit_id = Some(permit.id),
                None => {
                    let note = late_checkout_note();
                    if !notes.is_empty() {
                        notes.push('\n');
                    }
                    notes.push_str(&note);
                    warnings.push(note);
                    late_without_permit = true;
                }
            }
        }

        let write = CheckOutWrite {
            record_id: record.id.clone(),
            time: now,
            position: sample.coordinates(),
            notes,
            violation_flag: record.violation_flag || late_without_permit,
        };
        let updated = repo.update_check_out(&write)?;
        info!(
            student = student.id,
            late_without_permit,
            confidence = check.confidence,
            "check-out accepted"
        );

        Ok(CheckOutOutcome {
            record: updated,
            confidence: check.confidence,
            warnings,
            late_without_permit,
            permit_id,
        })
    }
}

/// The schedule governing `now`; no schedule means check-in is disabled.
pub fn today_schedule<R: AttendanceRepository + ?Sized>(
    repo: &R,
    student: StudentRef<'_>,
    now: NaiveDateTime,
) -> Result<Schedule, AttendanceError> {
    repo.schedule_for_day(day_of_week(now.date()), student.class_id)?
        .ok_or(AttendanceError::NoSchedule)
}
