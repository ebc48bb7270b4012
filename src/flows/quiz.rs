use crate::api::{questions, ApiRequest, Transport};
use crate::error::ApiError;
use crate::models::{AnswerEntry, Question, Quiz, QuizSubmission};
use indexmap::IndexMap;
use tracing::info;

/// Answers collected locally for one quiz, sent together on Submit.
#[derive(Debug, Clone)]
pub struct QuizAttempt {
    pub quiz: Quiz,
    pub questions: Vec<Question>,
    /// One slot per question, in question order
    answers: IndexMap<u64, Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitCheck {
    Ready,
    NeedsConfirmation { unanswered: usize },
}

impl SubmitCheck {
    pub fn prompt(&self) -> Option<String> {
        match self {
            SubmitCheck::Ready => None,
            SubmitCheck::NeedsConfirmation { unanswered } => Some(format!(
                "{} question{} unanswered. Submit anyway?",
                unanswered,
                if *unanswered == 1 { " is" } else { "s are" }
            )),
        }
    }
}

impl QuizAttempt {
    pub async fn load(transport: &dyn Transport, quiz: Quiz) -> Result<Self, ApiError> {
        let questions = questions(transport, quiz.quiz_id).await?;
        Ok(Self::new(quiz, questions))
    }

    pub fn new(quiz: Quiz, questions: Vec<Question>) -> Self {
        let answers = questions.iter().map(|q| (q.question_id, None)).collect();
        Self {
            quiz,
            questions,
            answers,
        }
    }

    /// Ignored for question ids not in this quiz.
    pub fn answer(&mut self, question_id: u64, answer: impl Into<String>) {
        let answer = answer.into();
        if let Some(slot) = self.answers.get_mut(&question_id) {
            *slot = (!answer.trim().is_empty()).then_some(answer);
        }
    }

    pub fn clear(&mut self, question_id: u64) {
        if let Some(slot) = self.answers.get_mut(&question_id) {
            *slot = None;
        }
    }

    pub fn answer_for(&self, question_id: u64) -> Option<&str> {
        self.answers.get(&question_id)?.as_deref()
    }

    /// Move to the next (or previous) option of a multiple-choice question.
    /// Unanswered questions start at the first option.
    pub fn cycle_option(&mut self, question_id: u64, forward: bool) {
        let Some(question) = self.questions.iter().find(|q| q.question_id == question_id) else {
            return;
        };
        if question.options.is_empty() {
            return;
        }
        let count = question.options.len();
        let position = self
            .answer_for(question_id)
            .and_then(|current| question.options.iter().position(|o| o == current));
        let next = match (position, forward) {
            (None, _) => 0,
            (Some(i), true) => (i + 1) % count,
            (Some(i), false) => (i + count - 1) % count,
        };
        let choice = question.options[next].clone();
        self.answer(question_id, choice);
    }

    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|a| a.is_some()).count()
    }

    pub fn unanswered_count(&self) -> usize {
        self.answers.len() - self.answered_count()
    }

    pub fn check(&self) -> SubmitCheck {
        match self.unanswered_count() {
            0 => SubmitCheck::Ready,
            unanswered => SubmitCheck::NeedsConfirmation { unanswered },
        }
    }

    /// One entry per question in question order. Unanswered entries carry no
    /// `answer` field at all.
    pub fn submission(&self, student_id: u64) -> QuizSubmission {
        QuizSubmission {
            student_id,
            answers: self
                .answers
                .iter()
                .map(|(&question_id, answer)| AnswerEntry {
                    question_id,
                    answer: answer.clone(),
                })
                .collect(),
        }
    }
}

pub async fn submit_quiz(
    transport: &dyn Transport,
    attempt: &QuizAttempt,
    student_id: u64,
) -> Result<(), ApiError> {
    let request = ApiRequest::post(
        format!("/quizzes/{}/submit", attempt.quiz.quiz_id),
        &attempt.submission(student_id),
    )?;
    transport.send(request).await?;
    info!(
        quiz_id = attempt.quiz.quiz_id,
        answered = attempt.answered_count(),
        unanswered = attempt.unanswered_count(),
        "quiz submitted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeTransport;
    use serde_json::json;

    fn attempt() -> QuizAttempt {
        let quiz = Quiz {
            quiz_id: 21,
            title: "Week 3".into(),
            deadline: None,
        };
        let questions = (1..=5)
            .map(|i| Question {
                question_id: i,
                text: format!("Question {}", i),
                options: vec!["a".into(), "b".into(), "c".into()],
            })
            .collect();
        QuizAttempt::new(quiz, questions)
    }

    #[test]
    fn test_prompt_names_unanswered_count() {
        let mut attempt = attempt();
        attempt.answer(1, "a");
        attempt.answer(3, "c");
        attempt.answer(4, "b");

        let check = attempt.check();
        assert_eq!(check, SubmitCheck::NeedsConfirmation { unanswered: 2 });
        assert_eq!(
            check.prompt().unwrap(),
            "2 questions are unanswered. Submit anyway?"
        );

        attempt.answer(2, "a");
        assert_eq!(
            attempt.check().prompt().unwrap(),
            "1 question is unanswered. Submit anyway?"
        );
        attempt.answer(5, "a");
        assert_eq!(attempt.check(), SubmitCheck::Ready);
    }

    #[tokio::test]
    async fn test_confirmed_submit_sends_every_question_once() {
        let transport = FakeTransport::new();
        let mut attempt = attempt();
        attempt.answer(1, "a");
        attempt.answer(3, "c");
        attempt.answer(4, "b");

        submit_quiz(&transport, &attempt, 700).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "/quizzes/21/submit");
        let body = sent[0].body.clone().unwrap();
        assert_eq!(
            body,
            json!({
                "student_id": 700,
                "answers": [
                    {"question_id": 1, "answer": "a"},
                    {"question_id": 2},
                    {"question_id": 3, "answer": "c"},
                    {"question_id": 4, "answer": "b"},
                    {"question_id": 5}
                ]
            })
        );
        // No nulls anywhere in the payload
        assert!(!body.to_string().contains("null"));
    }

    #[test]
    fn test_blank_answer_counts_as_unanswered() {
        let mut attempt = attempt();
        attempt.answer(2, "b");
        attempt.answer(2, "   ");
        assert_eq!(attempt.answer_for(2), None);
        assert_eq!(attempt.unanswered_count(), 5);
    }

    #[tokio::test]
    async fn test_answer_order_does_not_change_payload_order() {
        let transport = FakeTransport::new();
        let mut attempt = attempt();
        attempt.answer(5, "c");
        attempt.answer(2, "b");
        attempt.answer(99, "a");

        submit_quiz(&transport, &attempt, 700).await.unwrap();

        let body = transport.sent()[0].body.clone().unwrap();
        let ids: Vec<u64> = body["answers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["question_id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(body["answers"][4]["answer"], "c");
        assert_eq!(attempt.answered_count(), 2);
    }

    #[test]
    fn test_cycle_option_wraps() {
        let mut attempt = attempt();
        attempt.cycle_option(1, true);
        assert_eq!(attempt.answer_for(1), Some("a"));
        attempt.cycle_option(1, false);
        assert_eq!(attempt.answer_for(1), Some("c"));
        attempt.cycle_option(1, true);
        assert_eq!(attempt.answer_for(1), Some("a"));
        attempt.clear(1);
        assert_eq!(attempt.answered_count(), 0);
    }
}
