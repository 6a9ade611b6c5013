use crate::model::{
    AttendanceRecord, AttendanceStatus, CheckInWrite, CheckOutWrite, Location, Permit,
    PermitStatus, Schedule,
};
use crate::schedule::select_schedule;
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Everything the attendance validator reads from or writes to the store.
pub trait AttendanceRepository {
    fn active_locations(&self) -> anyhow::Result<Vec<Location>>;

    fn schedule_for_day(&self, day: u32, class_id: Option<&str>)
        -> anyhow::Result<Option<Schedule>>;

    fn today_record(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceRecord>>;

    fn approved_permit_on(&self, student_id: &str, date: NaiveDate)
        -> anyhow::Result<Option<Permit>>;

    /// Creates the day's record or overwrites its check-in columns.
    fn upsert_check_in(&self, write: &CheckInWrite) -> anyhow::Result<AttendanceRecord>;

    fn update_check_out(&self, write: &CheckOutWrite) -> anyhow::Result<AttendanceRecord>;
}

pub struct SqliteRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

pub const LOCATION_COLUMNS: &str = "id, name, latitude, longitude, radius_meters, active";

pub fn location_from_row(r: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: r.get(0)?,
        name: r.get(1)?,
        latitude: r.get(2)?,
        longitude: r.get(3)?,
        radius_meters: r.get(4)?,
        active: r.get::<_, i64>(5)? != 0,
    })
}

pub const SCHEDULE_COLUMNS: &str = "id, day_of_week, check_in_start, check_in_end,
    check_out_start, check_out_end, late_threshold_minutes, class_id, active";

pub fn schedule_from_row(r: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: r.get(0)?,
        day_of_week: r.get(1)?,
        check_in_start: r.get(2)?,
        check_in_end: r.get(3)?,
        check_out_start: r.get(4)?,
        check_out_end: r.get(5)?,
        late_threshold_minutes: r.get(6)?,
        class_id: r.get(7)?,
        active: r.get::<_, i64>(8)? != 0,
    })
}

pub const RECORD_COLUMNS: &str = "id, student_id, date, check_in_time, check_in_latitude,
    check_in_longitude, location_id, check_out_time, check_out_latitude,
    check_out_longitude, status, notes, device_fingerprint, violation_flag";

pub fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status_raw: String = r.get(10)?;
    let status = AttendanceStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown attendance status: {}", status_raw).into(),
        )
    })?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        date: r.get(2)?,
        check_in_time: r.get(3)?,
        check_in_latitude: r.get(4)?,
        check_in_longitude: r.get(5)?,
        location_id: r.get(6)?,
        check_out_time: r.get(7)?,
        check_out_latitude: r.get(8)?,
        check_out_longitude: r.get(9)?,
        status,
        notes: r.get(11)?,
        device_fingerprint: r.get(12)?,
        violation_flag: r.get::<_, i64>(13)? != 0,
    })
}

pub const PERMIT_COLUMNS: &str = "id, student_id, kind, start_date, end_date, status, reason";

pub fn permit_from_row(r: &Row<'_>) -> rusqlite::Result<Permit> {
    let status_raw: String = r.get(5)?;
    let status = PermitStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown permit status: {}", status_raw).into(),
        )
    })?;
    Ok(Permit {
        id: r.get(0)?,
        student_id: r.get(1)?,
        kind: r.get(2)?,
        start_date: r.get(3)?,
        end_date: r.get(4)?,
        status,
        reason: r.get(6)?,
    })
}

impl SqliteRepository<'_> {
    fn record_by_id(&self, id: &str) -> anyhow::Result<AttendanceRecord> {
        let sql = format!("SELECT {} FROM attendance_records WHERE id = ?", RECORD_COLUMNS);
        self.conn
            .query_row(&sql, [id], record_from_row)
            .optional()
            .context("failed to load attendance record")?
            .ok_or_else(|| anyhow!("attendance record {} vanished", id))
    }
}

impl AttendanceRepository for SqliteRepository<'_> {
    fn active_locations(&self) -> anyhow::Result<Vec<Location>> {
        let sql = format!(
            "SELECT {} FROM locations WHERE active = 1 ORDER BY name, id",
            LOCATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], location_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to load active locations")?;
        Ok(rows)
    }

    fn schedule_for_day(
        &self,
        day: u32,
        class_id: Option<&str>,
    ) -> anyhow::Result<Option<Schedule>> {
        let sql = format!(
            "SELECT {} FROM schedules WHERE day_of_week = ? AND active = 1 ORDER BY id",
            SCHEDULE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let schedules = stmt
            .query_map([day], schedule_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to load schedules")?;
        Ok(select_schedule(&schedules, day, class_id).cloned())
    }

    fn today_record(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE student_id = ? AND date = ?",
            RECORD_COLUMNS
        );
        self.conn
            .query_row(&sql, (student_id, date), record_from_row)
            .optional()
            .context("failed to load today's attendance record")
    }

    fn approved_permit_on(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<Option<Permit>> {
        let sql = format!(
            "SELECT {} FROM permits
             WHERE student_id = ?1 AND status = 'approved' AND start_date <= ?2 AND end_date >= ?2
             ORDER BY start_date
             LIMIT 1",
            PERMIT_COLUMNS
        );
        self.conn
            .query_row(&sql, rusqlite::params![student_id, date], permit_from_row)
            .optional()
            .context("failed to load permits")
    }

    fn upsert_check_in(&self, write: &CheckInWrite) -> anyhow::Result<AttendanceRecord> {
        let new_id = Uuid::new_v4().to_string();
        // Check-out columns are never touched here.
        self.conn
            .execute(
                "INSERT INTO attendance_records(
                    id, student_id, date, check_in_time, check_in_latitude, check_in_longitude,
                    location_id, status, notes, device_fingerprint, violation_flag, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, date) DO UPDATE SET
                    check_in_time = excluded.check_in_time,
                    check_in_latitude = excluded.check_in_latitude,
                    check_in_longitude = excluded.check_in_longitude,
                    location_id = excluded.location_id,
                    status = excluded.status,
                    notes = excluded.notes,
                    device_fingerprint = excluded.device_fingerprint,
                    violation_flag = excluded.violation_flag,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    new_id,
                    write.student_id,
                    write.date,
                    write.time,
                    write.position.latitude,
                    write.position.longitude,
                    write.location_id,
                    write.status.as_str(),
                    write.notes,
                    write.device_fingerprint,
                    write.violation_flag as i64,
                    write.time,
                ],
            )
            .context("failed to upsert check-in")?;
        self.today_record(&write.student_id, write.date)?
            .ok_or_else(|| anyhow!("check-in for {} not found after upsert", write.student_id))
    }

    fn update_check_out(&self, write: &CheckOutWrite) -> anyhow::Result<AttendanceRecord> {
        let changed = self
            .conn
            .execute(
                "UPDATE attendance_records SET
                    check_out_time = ?,
                    check_out_latitude = ?,
                    check_out_longitude = ?,
                    notes = ?,
                    violation_flag = ?,
                    updated_at = ?
                 WHERE id = ?",
                rusqlite::params![
                    write.time,
                    write.position.latitude,
                    write.position.longitude,
                    write.notes,
                    write.violation_flag as i64,
                    write.time,
                    write.record_id,
                ],
            )
            .context("failed to update check-out")?;
        if changed == 0 {
            return Err(anyhow!("attendance record {} not found", write.record_id));
        }
        self.record_by_id(&write.record_id)
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use std::cell::RefCell;

    /// In-process store for exercising the validator without SQLite.
    #[derive(Default)]
    pub struct MemoryRepository {
        pub locations: Vec<Location>,
        pub schedules: Vec<Schedule>,
        pub permits: Vec<Permit>,
        pub records: RefCell<Vec<AttendanceRecord>>,
    }

    impl AttendanceRepository for MemoryRepository {
        fn active_locations(&self) -> anyhow::Result<Vec<Location>> {
            Ok(self.locations.iter().filter(|l| l.active).cloned().collect())
        }

        fn schedule_for_day(
            &self,
            day: u32,
            class_id: Option<&str>,
        ) -> anyhow::Result<Option<Schedule>> {
            Ok(select_schedule(&self.schedules, day, class_id).cloned())
        }

        fn today_record(
            &self,
            student_id: &str,
            date: NaiveDate,
        ) -> anyhow::Result<Option<AttendanceRecord>> {
            Ok(self
                .records
                .borrow()
                .iter()
                .find(|r| r.student_id == student_id && r.date == date)
                .cloned())
        }

        fn approved_permit_on(
            &self,
            student_id: &str,
            date: NaiveDate,
        ) -> anyhow::Result<Option<Permit>> {
            Ok(self
                .permits
                .iter()
                .find(|p| {
                    p.student_id == student_id
                        && p.status == PermitStatus::Approved
                        && p.covers(date)
                })
                .cloned())
        }

        fn upsert_check_in(&self, write: &CheckInWrite) -> anyhow::Result<AttendanceRecord> {
            let mut records = self.records.borrow_mut();
            let idx = match records
                .iter()
                .position(|r| r.student_id == write.student_id && r.date == write.date)
            {
                Some(i) => i,
                None => {
                    records.push(AttendanceRecord {
                        id: Uuid::new_v4().to_string(),
                        student_id: write.student_id.clone(),
                        date: write.date,
                        check_in_time: None,
                        check_in_latitude: None,
                        check_in_longitude: None,
                        location_id: None,
                        check_out_time: None,
                        check_out_latitude: None,
                        check_out_longitude: None,
                        status: write.status,
                        notes: String::new(),
                        device_fingerprint: None,
                        violation_flag: false,
                    });
                    records.len() - 1
                }
            };
            let r = &mut records[idx];
            r.check_in_time = Some(write.time);
            r.check_in_latitude = Some(write.position.latitude);
            r.check_in_longitude = Some(write.position.longitude);
            r.location_id = Some(write.location_id.clone());
            r.status = write.status;
            r.notes = write.notes.clone();
            r.device_fingerprint = Some(write.device_fingerprint.clone());
            r.violation_flag = write.violation_flag;
            Ok(r.clone())
        }

        fn update_check_out(&self, write: &CheckOutWrite) -> anyhow::Result<AttendanceRecord> {
            let mut records = self.records.borrow_mut();
            let r = records
                .iter_mut()
                .find(|r| r.id == write.record_id)
                .ok_or_else(|| anyhow!("attendance record {} not found", write.record_id))?;
            r.check_out_time = Some(write.time);
            r.check_out_latitude = Some(write.position.latitude);
            r.check_out_longitude = Some(write.position.longitude);
            r.notes = write.notes.clone();
            r.violation_flag = write.violation_flag;
            Ok(r.clone())
        }
    }
}
