use super::{fetch_json, Transport};
use crate::error::ApiError;
use crate::models::{ContentItem, Course, Lecture, Question, Quiz};

pub async fn courses(transport: &dyn Transport, user_id: u64) -> Result<Vec<Course>, ApiError> {
    fetch_json(transport, &format!("/users/{}/courses", user_id)).await
}

pub async fn lectures(transport: &dyn Transport, course_id: u64) -> Result<Vec<Lecture>, ApiError> {
    let mut lectures: Vec<Lecture> =
        fetch_json(transport, &format!("/courses/{}/lectures", course_id)).await?;
    // Most recent first; undated lectures last
    lectures.sort_by(|a, b| b.starts_at.cmp(&a.starts_at));
    Ok(lectures)
}

pub async fn contents(
    transport: &dyn Transport,
    course_id: u64,
) -> Result<Vec<ContentItem>, ApiError> {
    fetch_json(transport, &format!("/courses/{}/contents", course_id)).await
}

pub async fn quizzes(transport: &dyn Transport, course_id: u64) -> Result<Vec<Quiz>, ApiError> {
    fetch_json(transport, &format!("/courses/{}/quizzes", course_id)).await
}

pub async fn questions(transport: &dyn Transport, quiz_id: u64) -> Result<Vec<Question>, ApiError> {
    fetch_json(transport, &format!("/quizzes/{}/questions", quiz_id)).await
}
