use crate::alerts::{Alert, AlertSink};
use crate::api::{ApiRequest, Transport};
use crate::models::Notification;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Best-effort side channel. A notification never gates or reverses the
/// operation that triggered it.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
    alerts: AlertSink,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>, alerts: AlertSink) -> Self {
        Self { transport, alerts }
    }

    /// Fire and forget. The handle is only useful to tests and shutdown.
    pub fn notify(&self, notification: Notification) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let alerts = self.alerts.clone();

        tokio::spawn(async move {
            let target = notification.target_id;
            let request = match ApiRequest::post("/notifications", &notification) {
                Ok(request) => request,
                Err(e) => {
                    warn!(target_id = target, error = %e, "could not encode notification");
                    return;
                }
            };

            match transport.send(request).await {
                Ok(_) => debug!(target_id = target, "notification delivered"),
                Err(e) => {
                    warn!(target_id = target, error = %e, "notification failed");
                    alerts.raise(Alert::warning(
                        "Notification not sent",
                        format!("{} could not be notified: {}", target, e),
                    ));
                }
            }
        })
    }
}
