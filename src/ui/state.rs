use crate::flows::{AttendanceSheet, QuizAttempt, RestrictionBackend, RosterBackend, TopicBackend};
use crate::models::{ContentItem, Course, Lecture, Quiz, Restriction, StudentAttendance, Topic};
use crate::reconciler::{Reconciler, Toggleable};

pub enum AppState {
    Loading {
        message: String,
    },
    CourseSelection {
        courses: Vec<Course>,
        selected_index: usize,
    },
    CourseMenu {
        course: Course,
        selected_index: usize,
    },
    LectureSelection {
        course: Course,
        lectures: Vec<Lecture>,
        selected_index: usize,
        mode: AttendanceMode,
    },
    AttendanceSheet {
        course: Course,
        lecture: Lecture,
        sheet: AttendanceSheet,
        selected_index: usize,
    },
    AttendanceRoster {
        course: Course,
        lecture: Lecture,
        screen: ToggleScreen<StudentAttendance, RosterBackend>,
    },
    ContentSelection {
        course: Course,
        contents: Vec<ContentItem>,
        selected_index: usize,
    },
    TopicCoverage {
        course: Course,
        content: ContentItem,
        screen: ToggleScreen<Topic, TopicBackend>,
    },
    Restrictions {
        screen: ToggleScreen<Restriction, RestrictionBackend>,
    },
    QuizSelection {
        course: Course,
        quizzes: Vec<Quiz>,
        selected_index: usize,
    },
    QuizAttempt {
        course: Course,
        attempt: QuizAttempt,
        selected_index: usize,
        /// Text being typed for a free-text question
        input: Option<String>,
        confirm_unanswered: Option<usize>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttendanceMode {
    /// Mark a fresh lecture and submit everything at once
    Take,
    /// Correct an existing lecture one student at a time
    Edit,
}

pub const COURSE_MENU: [&str; 3] = ["Take attendance", "Edit attendance", "Topic coverage"];

/// A list screen whose items are toggled through a [`Reconciler`].
pub struct ToggleScreen<T: Toggleable, B> {
    pub reconciler: Reconciler<T, B>,
    pub selected_index: usize,
    /// `Some` while the search box has focus
    pub search: Option<String>,
}

impl<T: Toggleable, B> ToggleScreen<T, B> {
    pub fn new(reconciler: Reconciler<T, B>) -> Self {
        Self {
            reconciler,
            selected_index: 0,
            search: None,
        }
    }
}

/// Keep a selection inside a list that may have shrunk.
pub fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}
