use crate::api::{fetch_json, ApiRequest, Transport};
use crate::error::ApiError;
use crate::models::{Restriction, RestrictionStatus};
use crate::reconciler::ToggleBackend;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Parental restrictions of one student. "Allowed" means no restriction row
/// exists; "Not Allowed" means one does and carries a `restriction_id`.
pub struct RestrictionBackend {
    transport: Arc<dyn Transport>,
    student_id: u64,
}

impl RestrictionBackend {
    pub fn new(transport: Arc<dyn Transport>, student_id: u64) -> Self {
        Self {
            transport,
            student_id,
        }
    }

    /// The verb depends only on the status the server last acknowledged.
    fn request_for(&self, current: &Restriction) -> Result<ApiRequest, ApiError> {
        match current.status {
            RestrictionStatus::Allowed => ApiRequest::post(
                "/restrictions/add",
                &json!({
                    "student_id": self.student_id,
                    "course_id": current.course_id,
                    "restriction_type": current.restriction_type,
                }),
            ),
            RestrictionStatus::NotAllowed => {
                let id = current.restriction_id.ok_or_else(|| {
                    ApiError::Invalid(format!(
                        "restriction {}/{} has no restriction_id, reload the list",
                        current.course_id, current.restriction_type
                    ))
                })?;
                Ok(ApiRequest::delete(format!("/restrictions/delete/{}", id)))
            }
        }
    }
}

#[async_trait]
impl ToggleBackend<Restriction> for RestrictionBackend {
    async fn fetch_all(&self) -> Result<Vec<Restriction>, ApiError> {
        fetch_json(
            self.transport.as_ref(),
            &format!("/restrictions/{}", self.student_id),
        )
        .await
    }

    async fn apply(
        &self,
        current: &Restriction,
        next: RestrictionStatus,
    ) -> Result<Option<Restriction>, ApiError> {
        let request = self.request_for(current)?;
        let body = self.transport.send(request).await?;

        let mut stored = current.clone();
        stored.status = next;
        stored.restriction_id = match next {
            RestrictionStatus::NotAllowed => body.get("restriction_id").and_then(|v| v.as_u64()),
            RestrictionStatus::Allowed => None,
        };
        Ok(Some(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertSink;
    use crate::api::testing::FakeTransport;
    use crate::models::RestrictionKey;
    use crate::reconciler::{Reconciler, ToggleOutcome};
    use reqwest::Method;

    fn key(course_id: u64, kind: &str) -> RestrictionKey {
        RestrictionKey {
            course_id,
            restriction_type: kind.to_string(),
        }
    }

    async fn loaded(
        transport: Arc<FakeTransport>,
    ) -> Reconciler<Restriction, RestrictionBackend> {
        transport.reply_once(
            "/restrictions/12",
            Ok(json!([
                {"course_id": 3, "course_name": "Chemistry", "restriction_type": "chat", "status": "Allowed"},
                {"course_id": 3, "course_name": "Chemistry", "restriction_type": "video", "status": "Not Allowed", "restriction_id": 77},
                {"course_id": 4, "course_name": "History", "restriction_type": "chat", "status": "Allowed", "restriction_id": 5}
            ])),
        );
        let (alerts, _rx) = AlertSink::channel();
        let reconciler =
            Reconciler::new("restrictions", RestrictionBackend::new(transport, 12), alerts);
        reconciler.refresh().await.unwrap();
        reconciler
    }

    #[tokio::test]
    async fn test_allowed_posts_add() {
        let transport = Arc::new(FakeTransport::new());
        let reconciler = loaded(transport.clone()).await;
        transport.reply_once("/restrictions/add", Ok(json!({"restriction_id": 90})));

        let outcome = reconciler.toggle(&key(3, "chat")).await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Confirmed(RestrictionStatus::NotAllowed));

        let request = &transport.sent()[1];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/restrictions/add");
        assert_eq!(
            request.body,
            Some(json!({"student_id": 12, "course_id": 3, "restriction_type": "chat"}))
        );

        // The id the server assigned is kept for the next toggle
        let stored = reconciler.with_state(|s| s.get(&key(3, "chat")).cloned().unwrap());
        assert_eq!(stored.restriction_id, Some(90));
        assert_eq!(stored.status, RestrictionStatus::NotAllowed);
    }

    #[tokio::test]
    async fn test_not_allowed_deletes_by_fetched_id() {
        let transport = Arc::new(FakeTransport::new());
        let reconciler = loaded(transport.clone()).await;

        let outcome = reconciler.toggle(&key(3, "video")).await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Confirmed(RestrictionStatus::Allowed));

        let request = &transport.sent()[1];
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(request.path, "/restrictions/delete/77");
        assert_eq!(request.body, None);

        let stored = reconciler.with_state(|s| s.get(&key(3, "video")).cloned().unwrap());
        assert_eq!(stored.restriction_id, None);
    }

    #[tokio::test]
    async fn test_verb_ignores_stray_restriction_id() {
        // An id on an "Allowed" row must not turn the toggle into a DELETE
        let transport = Arc::new(FakeTransport::new());
        let reconciler = loaded(transport.clone()).await;

        reconciler.toggle(&key(4, "chat")).await.unwrap();
        let request = &transport.sent()[1];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/restrictions/add");
    }

    #[tokio::test]
    async fn test_add_then_remove_uses_new_id() {
        let transport = Arc::new(FakeTransport::new());
        let reconciler = loaded(transport.clone()).await;
        transport.reply_once("/restrictions/add", Ok(json!({"restriction_id": 91})));

        reconciler.toggle(&key(3, "chat")).await.unwrap();
        reconciler.toggle(&key(3, "chat")).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent[2].method, Method::DELETE);
        assert_eq!(sent[2].path, "/restrictions/delete/91");
        let status = reconciler.with_state(|s| s.get(&key(3, "chat")).unwrap().status);
        assert_eq!(status, RestrictionStatus::Allowed);
    }

    #[test]
    fn test_missing_id_is_invalid() {
        let backend = RestrictionBackend::new(Arc::new(FakeTransport::new()), 12);
        let restriction = Restriction {
            course_id: 3,
            course_name: "Chemistry".into(),
            restriction_type: "video".into(),
            status: RestrictionStatus::NotAllowed,
            restriction_id: None,
        };
        let err = backend.request_for(&restriction).unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }
}
