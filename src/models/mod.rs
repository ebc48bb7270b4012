use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reconciler::{BinaryStatus, Toggleable};

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
    Parent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user_id: u64,
    pub name: String,
    pub role: Role,
    pub token: String,
    #[serde(default)]
    pub child_id: Option<u64>,
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Course {
    pub course_id: u64,
    pub name: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Lecture {
    pub lecture_id: u64,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentItem {
    pub content_id: u64,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Quiz {
    pub quiz_id: u64,
    pub title: String,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Question {
    pub question_id: u64,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
}

// ============================================================================
// Attendance
// ============================================================================

/// Fetched as `"P"`/`"A"`; the bulk endpoint expects lowercase codes, see
/// [`AttendanceStatus::submit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum AttendanceStatus {
    #[serde(rename = "P", alias = "p")]
    Present,
    #[serde(rename = "A", alias = "a")]
    Absent,
}

impl AttendanceStatus {
    pub fn submit_code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "p",
            AttendanceStatus::Absent => "a",
        }
    }
}

impl BinaryStatus for AttendanceStatus {
    fn flipped(self) -> Self {
        match self {
            AttendanceStatus::Present => AttendanceStatus::Absent,
            AttendanceStatus::Absent => AttendanceStatus::Present,
        }
    }

    fn is_negative(self) -> bool {
        self == AttendanceStatus::Absent
    }

    fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StudentAttendance {
    pub student_id: u64,
    pub name: String,
    #[serde(default)]
    pub roll_number: String,
    #[serde(rename = "attendanceStatus")]
    pub status: AttendanceStatus,
}

impl Toggleable for StudentAttendance {
    type Key = u64;
    type Status = AttendanceStatus;

    fn key(&self) -> u64 {
        self.student_id
    }

    fn status(&self) -> AttendanceStatus {
        self.status
    }

    fn set_status(&mut self, status: AttendanceStatus) {
        self.status = status;
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self.roll_number.to_lowercase().contains(&query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub student_id: u64,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceSubmission {
    pub course_id: u64,
    pub lecture_id: u64,
    pub records: Vec<AttendanceRecord>,
}

// ============================================================================
// Course content
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum CoverageStatus {
    Covered,
    #[serde(rename = "Not-Covered")]
    NotCovered,
}

impl BinaryStatus for CoverageStatus {
    fn flipped(self) -> Self {
        match self {
            CoverageStatus::Covered => CoverageStatus::NotCovered,
            CoverageStatus::NotCovered => CoverageStatus::Covered,
        }
    }

    fn label(self) -> &'static str {
        match self {
            CoverageStatus::Covered => "Covered",
            CoverageStatus::NotCovered => "Not-Covered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Topic {
    pub topic_id: u64,
    pub title: String,
    pub status: CoverageStatus,
}

impl Toggleable for Topic {
    type Key = u64;
    type Status = CoverageStatus;

    fn key(&self) -> u64 {
        self.topic_id
    }

    fn status(&self) -> CoverageStatus {
        self.status
    }

    fn set_status(&mut self, status: CoverageStatus) {
        self.status = status;
    }

    fn matches(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(&query.to_lowercase())
    }
}

// ============================================================================
// Parental restrictions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RestrictionStatus {
    Allowed,
    #[serde(rename = "Not Allowed")]
    NotAllowed,
}

impl BinaryStatus for RestrictionStatus {
    fn flipped(self) -> Self {
        match self {
            RestrictionStatus::Allowed => RestrictionStatus::NotAllowed,
            RestrictionStatus::NotAllowed => RestrictionStatus::Allowed,
        }
    }

    fn label(self) -> &'static str {
        match self {
            RestrictionStatus::Allowed => "Allowed",
            RestrictionStatus::NotAllowed => "Not Allowed",
        }
    }
}

/// A (course, restriction type) pair for one student. `restriction_id` is
/// only present while a restriction row exists on the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Restriction {
    pub course_id: u64,
    #[serde(default)]
    pub course_name: String,
    pub restriction_type: String,
    pub status: RestrictionStatus,
    #[serde(default)]
    pub restriction_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RestrictionKey {
    pub course_id: u64,
    pub restriction_type: String,
}

impl fmt::Display for RestrictionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.course_id, self.restriction_type)
    }
}

impl Toggleable for Restriction {
    type Key = RestrictionKey;
    type Status = RestrictionStatus;

    fn key(&self) -> RestrictionKey {
        RestrictionKey {
            course_id: self.course_id,
            restriction_type: self.restriction_type.clone(),
        }
    }

    fn status(&self) -> RestrictionStatus {
        self.status
    }

    fn set_status(&mut self, status: RestrictionStatus) {
        self.status = status;
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.course_name.to_lowercase().contains(&query)
            || self.restriction_type.to_lowercase().contains(&query)
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub sender_role: Role,
    pub target_id: u64,
}

// ============================================================================
// Quiz submission
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerEntry {
    pub question_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizSubmission {
    pub student_id: u64,
    pub answers: Vec<AnswerEntry>,
}
