use crate::models::{AttendanceStatus, StudentAttendance};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Export an attendance roster to a CSV file in `dir`
pub fn export_roster(
    dir: &Path,
    course_name: &str,
    lecture_title: &str,
    students: &[StudentAttendance],
) -> Result<PathBuf> {
    if students.is_empty() {
        anyhow::bail!("No students to export");
    }

    // Generate filename with timestamp
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!(
        "attendance_{}_{}_{}.csv",
        slug(course_name),
        slug(lecture_title),
        timestamp
    );
    let filepath = dir.join(filename);

    let mut wtr = csv::Writer::from_path(&filepath).context("Failed to create CSV file")?;

    wtr.write_record(["student_id", "roll_number", "name", "status"])
        .context("Failed to write CSV headers")?;

    for student in students {
        let status = match student.status {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        };
        wtr.write_record([
            student.student_id.to_string(),
            student.roll_number.clone(),
            student.name.clone(),
            status.to_string(),
        ])
        .context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV writer")?;

    Ok(filepath)
}

fn slug(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_roster() {
        let dir = tempfile::tempdir().unwrap();
        let students = vec![
            StudentAttendance {
                student_id: 1,
                name: "Lovelace, Ada".to_string(),
                roll_number: "R-01".to_string(),
                status: AttendanceStatus::Present,
            },
            StudentAttendance {
                student_id: 2,
                name: "Alan Turing".to_string(),
                roll_number: "R-02".to_string(),
                status: AttendanceStatus::Absent,
            },
        ];

        let filepath = export_roster(dir.path(), "Intro to CS", "Week 1", &students).unwrap();
        assert!(filepath.exists());
        let name = filepath.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("attendance_intro_to_cs_week_1_"));

        let contents = std::fs::read_to_string(&filepath).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "student_id,roll_number,name,status");
        assert_eq!(lines[1], "1,R-01,\"Lovelace, Ada\",present");
        assert_eq!(lines[2], "2,R-02,Alan Turing,absent");
    }

    #[test]
    fn test_empty_roster_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(export_roster(dir.path(), "c", "l", &[]).is_err());
    }
}
