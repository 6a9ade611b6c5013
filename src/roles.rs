use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Counselor,
    HomeroomTeacher,
    Student,
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageLocations,
    ManageSchedules,
    ManageStudents,
    SelfAttendance,
    ViewAttendance,
    DeleteAttendance,
    ApprovePermits,
    RequestPermits,
    RecordDiscipline,
    ViewDiscipline,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            "counselor" => Some(Self::Counselor),
            "homeroom_teacher" => Some(Self::HomeroomTeacher),
            "student" => Some(Self::Student),
            "parent" => Some(Self::Parent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Counselor => "counselor",
            Self::HomeroomTeacher => "homeroom_teacher",
            Self::Student => "student",
            Self::Parent => "parent",
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Self::Admin => !matches!(capability, SelfAttendance | RequestPermits),
            Self::Teacher => matches!(capability, ViewAttendance | RecordDiscipline | ViewDiscipline),
            Self::Counselor => matches!(
                capability,
                ViewAttendance | ApprovePermits | RecordDiscipline | ViewDiscipline
            ),
            Self::HomeroomTeacher => matches!(
                capability,
                ViewAttendance | ApprovePermits | RecordDiscipline | ViewDiscipline | ManageStudents
            ),
            Self::Student => matches!(
                capability,
                SelfAttendance | ViewAttendance | RequestPermits | ViewDiscipline
            ),
            Self::Parent => matches!(capability, ViewAttendance | RequestPermits | ViewDiscipline),
        }
    }

    /// Whether this role only ever sees its own (or its child's) rows.
    pub fn is_scoped_to_self(self) -> bool {
        matches!(self, Self::Student | Self::Parent)
    }
}

/// Who is making requests on this daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    /// Student a parent account is linked to; a student's own id otherwise.
    pub student_id: Option<String>,
}

impl Actor {
    pub fn can_act_for_student(&self, student_id: &str) -> bool {
        if !self.role.is_scoped_to_self() {
            return true;
        }
        self.student_id.as_deref() == Some(student_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_role() {
        for role in [
            Role::Admin,
            Role::Teacher,
            Role::Counselor,
            Role::HomeroomTeacher,
            Role::Student,
            Role::Parent,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse(" Admin "), Some(Role::Admin));
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn only_students_self_check_in() {
        assert!(Role::Student.can(Capability::SelfAttendance));
        assert!(!Role::Admin.can(Capability::SelfAttendance));
        assert!(!Role::Parent.can(Capability::SelfAttendance));
        assert!(!Role::Teacher.can(Capability::SelfAttendance));
    }

    #[test]
    fn admin_manages_geofences_and_schedules() {
        assert!(Role::Admin.can(Capability::ManageLocations));
        assert!(Role::Admin.can(Capability::ManageSchedules));
        assert!(Role::Admin.can(Capability::DeleteAttendance));
        assert!(!Role::Teacher.can(Capability::ManageLocations));
        assert!(!Role::Counselor.can(Capability::DeleteAttendance));
    }

    #[test]
    fn permits_are_requested_by_families_and_decided_by_staff() {
        assert!(Role::Student.can(Capability::RequestPermits));
        assert!(Role::Parent.can(Capability::RequestPermits));
        assert!(Role::Counselor.can(Capability::ApprovePermits));
        assert!(Role::HomeroomTeacher.can(Capability::ApprovePermits));
        assert!(!Role::Student.can(Capability::ApprovePermits));
    }

    #[test]
    fn students_act_only_for_themselves() {
        let me = Actor {
            user_id: "u1".to_string(),
            role: Role::Student,
            student_id: Some("s1".to_string()),
        };
        assert!(me.can_act_for_student("s1"));
        assert!(!me.can_act_for_student("s2"));

        let staff = Actor {
            user_id: "u2".to_string(),
            role: Role::Counselor,
            student_id: None,
        };
        assert!(staff.can_act_for_student("s2"));
    }
}
