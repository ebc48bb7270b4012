use crate::api::{fetch_json, ApiRequest, Transport};
use crate::error::ApiError;
use crate::models::{CoverageStatus, Topic};
use crate::reconciler::ToggleBackend;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Coverage marks for the topics of one content item.
pub struct TopicBackend {
    transport: Arc<dyn Transport>,
    content_id: u64,
}

impl TopicBackend {
    pub fn new(transport: Arc<dyn Transport>, content_id: u64) -> Self {
        Self {
            transport,
            content_id,
        }
    }
}

#[async_trait]
impl ToggleBackend<Topic> for TopicBackend {
    async fn fetch_all(&self) -> Result<Vec<Topic>, ApiError> {
        fetch_json(
            self.transport.as_ref(),
            &format!("/contents/{}/topics", self.content_id),
        )
        .await
    }

    async fn apply(
        &self,
        current: &Topic,
        next: CoverageStatus,
    ) -> Result<Option<Topic>, ApiError> {
        let request = ApiRequest::post(
            format!("/contents/{}/topics/coverage", self.content_id),
            &json!({ "topic_id": current.topic_id, "status": next }),
        )?;
        self.transport.send(request).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertSink;
    use crate::api::testing::FakeTransport;
    use crate::reconciler::{Reconciler, ToggleOutcome};

    #[tokio::test]
    async fn test_coverage_refused_by_server_resyncs() {
        let transport = Arc::new(FakeTransport::new());
        let topics = json!([
            {"topic_id": 1, "title": "Pattern matching", "status": "Not-Covered"},
            {"topic_id": 2, "title": "Closures", "status": "Covered"}
        ]);
        transport.reply_once("/contents/6/topics", Ok(topics.clone()));
        transport.reply_once(
            "/contents/6/topics/coverage",
            Err(ApiError::rejected("content is archived")),
        );
        transport.reply_once("/contents/6/topics", Ok(topics));

        let (alerts, mut rx) = AlertSink::channel();
        let reconciler: Reconciler<Topic, _> =
            Reconciler::new("topics", TopicBackend::new(transport.clone(), 6), alerts);
        reconciler.refresh().await.unwrap();

        let outcome = reconciler.toggle(&1).await.unwrap();
        match outcome {
            ToggleOutcome::RolledBack { error, restored } => {
                assert!(!error.is_retryable());
                assert_eq!(restored, Some(CoverageStatus::NotCovered));
            }
            other => panic!("expected rollback, got {:?}", other),
        }

        let sent = transport.sent();
        assert_eq!(
            sent[1].body,
            Some(json!({"topic_id": 1, "status": "Covered"}))
        );
        assert_eq!(sent[2].path, "/contents/6/topics");
        assert!(rx.try_recv().unwrap().message.contains("refused"));
    }
}
