use crate::model::{AttendanceStatus, Schedule};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

/// Check-outs after this time of day need an approved permit.
///
/// Kept apart from the schedule's own check-out window; whether the two
/// should be unified is an open product question.
pub const LATE_CHECKOUT_CUTOFF_SECS: u32 = 17 * 3600 + 15 * 60;
pub const LATE_CHECKOUT_CUTOFF_LABEL: &str = "17:15";

/// 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .map_err(|_| format!("invalid time: {}", raw))
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

/// Picks today's schedule: a class-scoped one beats an all-classes one.
pub fn select_schedule<'a>(
    schedules: &'a [Schedule],
    day: u32,
    class_id: Option<&str>,
) -> Option<&'a Schedule> {
    let mut fallback = None;
    for s in schedules.iter().filter(|s| s.active && s.day_of_week == day) {
        match (&s.class_id, class_id) {
            (Some(scope), Some(cid)) if scope == cid => return Some(s),
            (None, _) if fallback.is_none() => fallback = Some(s),
            _ => {}
        }
    }
    fallback
}

/// Late iff strictly after the end of the check-in window.
pub fn attendance_status(now: NaiveTime, schedule: &Schedule) -> AttendanceStatus {
    if now > schedule.check_in_end {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

pub fn check_in_open(now: NaiveTime, schedule: &Schedule) -> bool {
    now >= schedule.check_in_start
}

/// Whole minutes past the end of the check-in window, 0 when on time.
pub fn minutes_late(now: NaiveTime, schedule: &Schedule) -> i64 {
    let delta = now.signed_duration_since(schedule.check_in_end);
    delta.num_minutes().max(0)
}

pub fn is_late_checkout(now: NaiveTime) -> bool {
    now.num_seconds_from_midnight() > LATE_CHECKOUT_CUTOFF_SECS
}

pub fn late_checkout_note() -> String {
    format!(
        "Check-out after {} without an approved permit",
        LATE_CHECKOUT_CUTOFF_LABEL
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_time(s).expect("time")
    }

    fn schedule(day: u32, class_id: Option<&str>) -> Schedule {
        Schedule {
            id: format!("s-{}-{}", day, class_id.unwrap_or("all")),
            day_of_week: day,
            check_in_start: t("06:30"),
            check_in_end: t("07:30:00"),
            check_out_start: t("14:00"),
            check_out_end: t("16:00"),
            late_threshold_minutes: 15,
            class_id: class_id.map(|s| s.to_string()),
            active: true,
        }
    }

    #[test]
    fn lateness_boundary_is_exclusive() {
        let s = schedule(1, None);
        assert_eq!(attendance_status(t("07:29:59"), &s), AttendanceStatus::Present);
        assert_eq!(attendance_status(t("07:30:00"), &s), AttendanceStatus::Present);
        assert_eq!(attendance_status(t("07:30:01"), &s), AttendanceStatus::Late);
        assert_eq!(attendance_status(t("08:00"), &s), AttendanceStatus::Late);
    }

    #[test]
    fn minutes_late_counts_whole_minutes() {
        let s = schedule(1, None);
        assert_eq!(minutes_late(t("07:00"), &s), 0);
        assert_eq!(minutes_late(t("07:45:30"), &s), 15);
    }

    #[test]
    fn day_of_week_starts_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 11).expect("date");
        let thursday = NaiveDate::from_ymd_opt(2026, 10, 15).expect("date");
        assert_eq!(day_of_week(sunday), 0);
        assert_eq!(day_of_week(thursday), 4);
    }

    #[test]
    fn class_scoped_schedule_wins() {
        let all = schedule(2, None);
        let scoped = schedule(2, Some("7A"));
        let other_day = schedule(3, Some("7A"));
        let schedules = vec![all.clone(), scoped.clone(), other_day];

        assert_eq!(select_schedule(&schedules, 2, Some("7A")), Some(&scoped));
        assert_eq!(select_schedule(&schedules, 2, Some("8B")), Some(&all));
        assert_eq!(select_schedule(&schedules, 2, None), Some(&all));
        assert_eq!(select_schedule(&schedules, 4, Some("7A")), None);
    }

    #[test]
    fn inactive_schedule_is_not_a_fallback() {
        let mut s = schedule(1, None);
        s.active = false;
        assert!(select_schedule(&[s], 1, None).is_none());
    }

    #[test]
    fn late_checkout_cutoff_is_fixed_at_1715() {
        assert!(!is_late_checkout(t("17:15:00")));
        assert!(is_late_checkout(t("17:15:01")));
        assert!(!is_late_checkout(t("15:00")));
    }

    #[test]
    fn parse_time_rejects_garbage() {
        assert!(parse_time("7.30").is_err());
        assert!(parse_time("25:00").is_err());
        assert_eq!(format_time(t("07:05")), "07:05:00");
    }
}
