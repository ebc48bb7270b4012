use crate::api::{fetch_json, ApiRequest, Transport};
use crate::error::ApiError;
use crate::models::{
    AttendanceRecord, AttendanceStatus, AttendanceSubmission, Notification, Role,
    StudentAttendance,
};
use crate::notify::Notifier;
use crate::reconciler::{BinaryStatus, ToggleBackend};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn roster_path(course_id: u64, lecture_id: u64) -> String {
    format!("/attendance/{}/{}", course_id, lecture_id)
}

pub fn absence_notification(course_name: &str, student: &StudentAttendance) -> Notification {
    Notification {
        title: "Absence recorded".to_string(),
        description: format!("{} was marked absent in {}.", student.name, course_name),
        sender_role: Role::Teacher,
        target_id: student.student_id,
    }
}

// ============================================================================
// Bulk marking: edits stay local until Submit
// ============================================================================

#[derive(Debug, Clone)]
pub struct AttendanceSheet {
    pub course_id: u64,
    pub lecture_id: u64,
    pub students: Vec<StudentAttendance>,
}

impl AttendanceSheet {
    pub async fn load(
        transport: &dyn Transport,
        course_id: u64,
        lecture_id: u64,
    ) -> Result<Self, ApiError> {
        let students = fetch_json(transport, &roster_path(course_id, lecture_id)).await?;
        Ok(Self {
            course_id,
            lecture_id,
            students,
        })
    }

    pub fn toggle(&mut self, student_id: u64) -> Option<AttendanceStatus> {
        let student = self
            .students
            .iter_mut()
            .find(|s| s.student_id == student_id)?;
        student.status = student.status.flipped();
        Some(student.status)
    }

    pub fn mark_all(&mut self, status: AttendanceStatus) {
        for student in &mut self.students {
            student.status = status;
        }
    }

    pub fn absentees(&self) -> impl Iterator<Item = &StudentAttendance> {
        self.students
            .iter()
            .filter(|s| s.status == AttendanceStatus::Absent)
    }

    /// (present, absent)
    pub fn counts(&self) -> (usize, usize) {
        let absent = self.absentees().count();
        (self.students.len() - absent, absent)
    }

    pub fn submission(&self) -> AttendanceSubmission {
        AttendanceSubmission {
            course_id: self.course_id,
            lecture_id: self.lecture_id,
            records: self
                .students
                .iter()
                .map(|s| AttendanceRecord {
                    student_id: s.student_id,
                    status: s.status.submit_code(),
                })
                .collect(),
        }
    }
}

/// Send the whole sheet in one request.
pub async fn submit_sheet(
    transport: &dyn Transport,
    sheet: &AttendanceSheet,
) -> Result<(), ApiError> {
    let request = ApiRequest::post("/attendance/mark", &sheet.submission())?;
    transport.send(request).await?;

    let (present, absent) = sheet.counts();
    info!(
        course_id = sheet.course_id,
        lecture_id = sheet.lecture_id,
        present,
        absent,
        "attendance submitted"
    );
    Ok(())
}

/// Best-effort absence notices after a successful submit.
pub fn notify_absentees(notifier: &Notifier, sheet: &AttendanceSheet, course_name: &str) -> usize {
    let mut sent = 0;
    for student in sheet.absentees() {
        notifier.notify(absence_notification(course_name, student));
        sent += 1;
    }
    sent
}

// ============================================================================
// Editing an existing lecture: one request per tap
// ============================================================================

pub struct RosterBackend {
    transport: Arc<dyn Transport>,
    course_id: u64,
    lecture_id: u64,
}

impl RosterBackend {
    pub fn new(transport: Arc<dyn Transport>, course_id: u64, lecture_id: u64) -> Self {
        Self {
            transport,
            course_id,
            lecture_id,
        }
    }
}

#[async_trait]
impl ToggleBackend<StudentAttendance> for RosterBackend {
    async fn fetch_all(&self) -> Result<Vec<StudentAttendance>, ApiError> {
        fetch_json(
            self.transport.as_ref(),
            &roster_path(self.course_id, self.lecture_id),
        )
        .await
    }

    async fn apply(
        &self,
        current: &StudentAttendance,
        next: AttendanceStatus,
    ) -> Result<Option<StudentAttendance>, ApiError> {
        let request = ApiRequest::post(
            "/attendance/update",
            &json!({
                "course_id": self.course_id,
                "lecture_id": self.lecture_id,
                "student_id": current.student_id,
                "status": next.submit_code(),
            }),
        )?;
        self.transport.send(request).await?;
        Ok(None)
    }
}
