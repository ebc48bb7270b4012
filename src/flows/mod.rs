pub mod attendance;
pub mod quiz;
pub mod restrictions;
pub mod topics;

pub use attendance::{
    absence_notification, notify_absentees, submit_sheet, AttendanceSheet, RosterBackend,
};
pub use quiz::{submit_quiz, QuizAttempt, SubmitCheck};
pub use restrictions::RestrictionBackend;
pub use topics::TopicBackend;
