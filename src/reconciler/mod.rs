//! Optimistic toggling of two-valued fields against the LMS.
//!
//! A tap flips the item's status in local state right away, then one request
//! carries the new status to the server. If the server accepts, the local
//! value stands. If it does not, local state is brought back in line with the
//! server, either by re-fetching the whole collection ([`Rollback::Resync`])
//! or by restoring the single item ([`Rollback::Revert`]).
//!
//! Outside the window between a tap and its response, the status shown for
//! an item is the last one the server acknowledged.

mod collection;
mod scope;

pub use collection::ToggleCollection;
pub use scope::ScreenScope;

use crate::alerts::{Alert, AlertSink};
use crate::error::ApiError;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A closed set of exactly two values.
pub trait BinaryStatus: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn flipped(self) -> Self;

    /// Transitions into a negative value may trigger follow-up work, such as
    /// telling a parent their child was marked absent.
    fn is_negative(self) -> bool {
        false
    }

    fn label(self) -> &'static str;
}

pub trait Toggleable: Clone + fmt::Debug + Send + Sync + 'static {
    type Key: Clone + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Status: BinaryStatus;

    fn key(&self) -> Self::Key;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);

    /// Search predicate for the filtered view.
    fn matches(&self, _query: &str) -> bool {
        true
    }
}

/// Server side of one toggleable collection.
#[async_trait]
pub trait ToggleBackend<T: Toggleable>: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<T>, ApiError>;

    /// Ask the server to move `current` (as last acknowledged) to `next`.
    /// Endpoints that echo the stored row return it so local state picks up
    /// server-assigned fields.
    async fn apply(&self, current: &T, next: T::Status) -> Result<Option<T>, ApiError>;
}

/// Parsed the same way from the environment and from `lms.yml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Rollback {
    /// Re-fetch the whole collection after a failure.
    #[default]
    Resync,
    /// Restore only the item that failed.
    Revert,
}

impl FromStr for Rollback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resync" => Ok(Rollback::Resync),
            "revert" => Ok(Rollback::Revert),
            other => Err(format!(
                "unknown rollback mode '{}', expected 'resync' or 'revert'",
                other
            )),
        }
    }
}

impl TryFrom<String> for Rollback {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome<S> {
    /// The server accepted the new status.
    Confirmed(S),
    /// The server did not accept it; `restored` is what local state now shows
    /// for the item (`None` if a re-fetch no longer contains it).
    RolledBack { error: ApiError, restored: Option<S> },
    /// The screen closed before the request settled. The response, if any,
    /// was ignored.
    Abandoned,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToggleError {
    #[error("no item with key {0}")]
    NotFound(String),
}

pub type NegativeHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Reconciler<T: Toggleable, B> {
    name: &'static str,
    backend: Arc<B>,
    state: Arc<Mutex<ToggleCollection<T>>>,
    write_gate: Option<Arc<tokio::sync::Mutex<()>>>,
    rollback: Rollback,
    scope: ScreenScope,
    alerts: AlertSink,
    on_negative: Option<NegativeHook<T>>,
}

impl<T: Toggleable, B> Clone for Reconciler<T, B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            write_gate: self.write_gate.clone(),
            rollback: self.rollback,
            scope: self.scope.clone(),
            alerts: self.alerts.clone(),
            on_negative: self.on_negative.clone(),
        }
    }
}

impl<T, B> Reconciler<T, B>
where
    T: Toggleable,
    B: ToggleBackend<T>,
{
    pub fn new(name: &'static str, backend: B, alerts: AlertSink) -> Self {
        Self {
            name,
            backend: Arc::new(backend),
            state: Arc::new(Mutex::new(ToggleCollection::default())),
            write_gate: Some(Arc::new(tokio::sync::Mutex::new(()))),
            rollback: Rollback::default(),
            scope: ScreenScope::new(),
            alerts,
            on_negative: None,
        }
    }

    pub fn with_rollback(mut self, rollback: Rollback) -> Self {
        self.rollback = rollback;
        self
    }

    /// With serialization on, writes to this collection go out one at a time
    /// in tap order. Off, each tap's request is independent and responses may
    /// settle in any order.
    pub fn serialize_writes(mut self, serialize: bool) -> Self {
        self.write_gate = serialize.then(|| Arc::new(tokio::sync::Mutex::new(())));
        self
    }

    /// Runs after the server confirms a transition into a negative status.
    pub fn on_negative(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_negative = Some(Arc::new(hook));
        self
    }

    pub fn scope(&self) -> &ScreenScope {
        &self.scope
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&ToggleCollection<T>) -> R) -> R {
        f(&self.lock())
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.lock().set_query(query);
    }

    fn lock(&self) -> MutexGuard<'_, ToggleCollection<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load (or reload) the whole collection from the server. Taps whose
    /// request is still outstanding keep their optimistic value.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        self.lock().set_loading(true);

        let fetched = tokio::select! {
            _ = self.scope.closed() => return Ok(0),
            fetched = self.backend.fetch_all() => fetched,
        };

        let mut state = self.lock();
        state.set_loading(false);
        match fetched {
            Ok(items) => {
                let count = items.len();
                state.reset(items);
                info!(collection = self.name, count, "collection loaded");
                Ok(count)
            }
            Err(e) => {
                warn!(collection = self.name, error = %e, "failed to load collection");
                self.alerts.raise(Alert::error(
                    format!("Could not load {}", self.name),
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    pub async fn toggle(&self, key: &T::Key) -> Result<ToggleOutcome<T::Status>, ToggleError> {
        let (prior, next) = {
            let mut state = self.lock();
            let prior = state
                .get(key)
                .map(|item| item.status())
                .ok_or_else(|| ToggleError::NotFound(key.to_string()))?;
            let next = prior.flipped();
            state.replace_status(key, next);
            state.begin_write(key, next);
            (prior, next)
        };
        debug!(
            collection = self.name,
            %key,
            from = prior.label(),
            to = next.label(),
            "optimistic toggle"
        );

        let _permit = match &self.write_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        if self.scope.is_closed() {
            return Ok(self.abandon(key));
        }

        // Fresh copy so server-assigned fields from earlier writes are used
        let fresh = self.lock().get(key).cloned();
        let Some(mut current) = fresh else {
            return Ok(self.abandon(key));
        };
        current.set_status(prior);

        let result = tokio::select! {
            _ = self.scope.closed() => None,
            result = self.backend.apply(&current, next) => Some(result),
        };
        let Some(result) = result else {
            return Ok(self.abandon(key));
        };

        match result {
            Ok(acknowledged) => {
                let confirmed = {
                    let mut state = self.lock();
                    // A later tap on the same key keeps its own optimistic value
                    let shown = if state.finish_write(key) {
                        state.get(key).map(|item| item.status()).unwrap_or(next)
                    } else {
                        next
                    };
                    match acknowledged {
                        Some(mut acknowledged) => {
                            acknowledged.set_status(shown);
                            state.replace_item(acknowledged);
                        }
                        None => {
                            state.replace_status(key, shown);
                        }
                    }
                    state.get(key).cloned()
                };
                info!(collection = self.name, %key, status = next.label(), "toggle confirmed");

                if next.is_negative() {
                    if let (Some(hook), Some(item)) = (&self.on_negative, &confirmed) {
                        let mut item = item.clone();
                        item.set_status(next);
                        hook(&item);
                    }
                }
                Ok(ToggleOutcome::Confirmed(next))
            }
            Err(error) => {
                warn!(collection = self.name, %key, error = %error, "toggle failed, rolling back");
                let hint = if error.is_retryable() {
                    "The change was undone. Check the connection and try again."
                } else {
                    "The server refused the change."
                };
                self.alerts.raise(Alert::error(
                    format!("Could not update {}", self.name),
                    format!("{}\n{}", error, hint),
                ));

                let restored = self.roll_back(key, prior).await;
                Ok(ToggleOutcome::RolledBack { error, restored })
            }
        }
    }

    fn abandon(&self, key: &T::Key) -> ToggleOutcome<T::Status> {
        self.lock().finish_write(key);
        ToggleOutcome::Abandoned
    }

    async fn roll_back(&self, key: &T::Key, prior: T::Status) -> Option<T::Status> {
        let superseded = self.lock().finish_write(key);
        match self.rollback {
            Rollback::Revert => self.revert(key, prior, superseded),
            Rollback::Resync => {
                let fetched = tokio::select! {
                    _ = self.scope.closed() => return None,
                    fetched = self.backend.fetch_all() => fetched,
                };
                match fetched {
                    Ok(items) => {
                        let mut state = self.lock();
                        state.reset(items);
                        state.get(key).map(|item| item.status())
                    }
                    Err(e) => {
                        warn!(
                            collection = self.name,
                            error = %e,
                            "re-sync failed, reverting item only"
                        );
                        self.revert(key, prior, superseded)
                    }
                }
            }
        }
    }

    /// Restore `prior` unless a later tap on the same key is still pending.
    fn revert(&self, key: &T::Key, prior: T::Status, superseded: bool) -> Option<T::Status> {
        let mut state = self.lock();
        let current = state.get(key)?.status();
        if superseded {
            Some(current)
        } else {
            state.replace_status(key, prior);
            Some(prior)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceStatus, CoverageStatus, StudentAttendance, Topic};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Server double with a real store, optional failure and an optional
    /// gate that holds the first `apply` until released.
    struct FakeBackend<T> {
        server: Mutex<Vec<T>>,
        fail_apply: AtomicBool,
        /// Fail only the next apply
        fail_once: AtomicBool,
        fail_fetch: AtomicBool,
        fetches: AtomicUsize,
        applied: Mutex<Vec<String>>,
        entered: Arc<Notify>,
        gate: Mutex<Option<Arc<Notify>>>,
    }

    impl<T: Toggleable> FakeBackend<T> {
        fn with(items: Vec<T>) -> Self {
            Self {
                server: Mutex::new(items),
                fail_apply: AtomicBool::new(false),
                fail_once: AtomicBool::new(false),
                fail_fetch: AtomicBool::new(false),
                fetches: AtomicUsize::new(0),
                applied: Mutex::new(Vec::new()),
                entered: Arc::new(Notify::new()),
                gate: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl<T: Toggleable> ToggleBackend<T> for FakeBackend<T> {
        async fn fetch_all(&self) -> Result<Vec<T>, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(ApiError::Transport("offline".into()));
            }
            Ok(self.server.lock().unwrap().clone())
        }

        async fn apply(&self, current: &T, next: T::Status) -> Result<Option<T>, ApiError> {
            self.applied
                .lock()
                .unwrap()
                .push(format!("{}:{:?}", current.key(), next));
            self.entered.notify_one();

            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            if self.fail_apply.load(Ordering::SeqCst)
                || self.fail_once.swap(false, Ordering::SeqCst)
            {
                return Err(ApiError::Transport("connection reset".into()));
            }
            let mut server = self.server.lock().unwrap();
            if let Some(item) = server.iter_mut().find(|i| i.key() == current.key()) {
                item.set_status(next);
            }
            Ok(None)
        }
    }

    fn topics() -> Vec<Topic> {
        vec![
            Topic {
                topic_id: 1,
                title: "Ownership".into(),
                status: CoverageStatus::NotCovered,
            },
            Topic {
                topic_id: 2,
                title: "Traits".into(),
                status: CoverageStatus::Covered,
            },
        ]
    }

    async fn loaded(
        backend: FakeBackend<Topic>,
    ) -> (
        Reconciler<Topic, FakeBackend<Topic>>,
        tokio::sync::mpsc::UnboundedReceiver<Alert>,
    ) {
        let (alerts, rx) = AlertSink::channel();
        let reconciler = Reconciler::new("topics", backend, alerts);
        reconciler.refresh().await.unwrap();
        (reconciler, rx)
    }

    fn status_of(reconciler: &Reconciler<Topic, FakeBackend<Topic>>, key: u64) -> CoverageStatus {
        reconciler.with_state(|s| s.get(&key).unwrap().status)
    }

    #[tokio::test]
    async fn test_double_flip_restores_original() {
        let (reconciler, _rx) = loaded(FakeBackend::with(topics())).await;

        let first = reconciler.toggle(&1).await.unwrap();
        assert_eq!(first, ToggleOutcome::Confirmed(CoverageStatus::Covered));
        let second = reconciler.toggle(&1).await.unwrap();
        assert_eq!(second, ToggleOutcome::Confirmed(CoverageStatus::NotCovered));

        assert_eq!(status_of(&reconciler, 1), CoverageStatus::NotCovered);
        assert_eq!(
            reconciler.backend.server.lock().unwrap()[0].status,
            CoverageStatus::NotCovered
        );
    }

    #[tokio::test]
    async fn test_local_state_changes_before_response() {
        let backend = FakeBackend::with(topics());
        let gate = Arc::new(Notify::new());
        *backend.gate.lock().unwrap() = Some(gate.clone());
        let entered = backend.entered.clone();
        let (reconciler, _rx) = loaded(backend).await;

        let task = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.toggle(&1).await })
        };

        entered.notified().await;
        // Request is in flight and has not resolved
        assert_eq!(status_of(&reconciler, 1), CoverageStatus::Covered);
        assert_eq!(
            reconciler.backend.server.lock().unwrap()[0].status,
            CoverageStatus::NotCovered
        );

        gate.notify_one();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, ToggleOutcome::Confirmed(CoverageStatus::Covered));
    }

    #[tokio::test]
    async fn test_failure_resyncs_to_server_value() {
        let backend = FakeBackend::with(topics());
        backend.fail_apply.store(true, Ordering::SeqCst);
        let (reconciler, mut rx) = loaded(backend).await;

        let outcome = reconciler.toggle(&1).await.unwrap();
        match outcome {
            ToggleOutcome::RolledBack { error, restored } => {
                assert!(error.is_retryable());
                assert_eq!(restored, Some(CoverageStatus::NotCovered));
            }
            other => panic!("expected rollback, got {:?}", other),
        }

        assert_eq!(status_of(&reconciler, 1), CoverageStatus::NotCovered);
        // Initial load plus the re-sync
        assert_eq!(reconciler.backend.fetches.load(Ordering::SeqCst), 2);
        let alert = rx.try_recv().unwrap();
        assert!(alert.message.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_revert_mode_skips_refetch() {
        let backend = FakeBackend::with(topics());
        backend.fail_apply.store(true, Ordering::SeqCst);
        let (alerts, _rx) = AlertSink::channel();
        let reconciler: Reconciler<Topic, _> =
            Reconciler::new("topics", backend, alerts).with_rollback(Rollback::Revert);
        reconciler.refresh().await.unwrap();

        let outcome = reconciler.toggle(&2).await.unwrap();
        assert!(matches!(
            outcome,
            ToggleOutcome::RolledBack {
                restored: Some(CoverageStatus::Covered),
                ..
            }
        ));
        assert_eq!(reconciler.backend.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_resync_falls_back_to_item_revert() {
        let backend = FakeBackend::with(topics());
        let (reconciler, _rx) = loaded(backend).await;
        reconciler.backend.fail_apply.store(true, Ordering::SeqCst);
        reconciler.backend.fail_fetch.store(true, Ordering::SeqCst);

        let outcome = reconciler.toggle(&1).await.unwrap();
        assert!(matches!(
            outcome,
            ToggleOutcome::RolledBack {
                restored: Some(CoverageStatus::NotCovered),
                ..
            }
        ));
        assert_eq!(status_of(&reconciler, 1), CoverageStatus::NotCovered);
    }

    #[tokio::test]
    async fn test_filtered_view_follows_toggle() {
        let (reconciler, _rx) = loaded(FakeBackend::with(topics())).await;
        reconciler.set_query("owner");

        reconciler.toggle(&1).await.unwrap();
        reconciler.with_state(|s| {
            assert_eq!(s.visible().len(), 1);
            assert_eq!(s.visible()[0].status, CoverageStatus::Covered);
        });
    }

    #[tokio::test]
    async fn test_writes_are_serialized() {
        let backend = FakeBackend::with(topics());
        let gate = Arc::new(Notify::new());
        *backend.gate.lock().unwrap() = Some(gate.clone());
        let entered = backend.entered.clone();
        let (reconciler, _rx) = loaded(backend).await;

        let first = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.toggle(&1).await })
        };
        entered.notified().await;
        let second = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.toggle(&2).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // Both optimistic, only one on the wire
        assert_eq!(status_of(&reconciler, 2), CoverageStatus::NotCovered);
        assert_eq!(reconciler.backend.applied.lock().unwrap().len(), 1);

        gate.notify_one();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(
            *reconciler.backend.applied.lock().unwrap(),
            vec!["1:Covered".to_string(), "2:NotCovered".to_string()]
        );
    }

    fn server_status_of(
        reconciler: &Reconciler<Topic, FakeBackend<Topic>>,
        key: u64,
    ) -> CoverageStatus {
        let server = reconciler.backend.server.lock().unwrap();
        server.iter().find(|t| t.topic_id == key).unwrap().status
    }

    #[tokio::test]
    async fn test_resync_keeps_queued_toggle() {
        let backend = FakeBackend::with(topics());
        let gate = Arc::new(Notify::new());
        *backend.gate.lock().unwrap() = Some(gate.clone());
        backend.fail_once.store(true, Ordering::SeqCst);
        let entered = backend.entered.clone();
        let (reconciler, _rx) = loaded(backend).await;

        let first = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.toggle(&1).await })
        };
        entered.notified().await;
        let second = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.toggle(&2).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(status_of(&reconciler, 2), CoverageStatus::NotCovered);

        // First write fails and re-syncs while the second is still queued
        gate.notify_one();
        assert!(matches!(
            first.await.unwrap().unwrap(),
            ToggleOutcome::RolledBack {
                restored: Some(CoverageStatus::NotCovered),
                ..
            }
        ));
        assert_eq!(
            second.await.unwrap().unwrap(),
            ToggleOutcome::Confirmed(CoverageStatus::NotCovered)
        );

        for key in [1, 2] {
            assert_eq!(status_of(&reconciler, key), server_status_of(&reconciler, key));
        }
        assert_eq!(status_of(&reconciler, 2), CoverageStatus::NotCovered);
    }

    #[tokio::test]
    async fn test_reload_during_toggle_keeps_optimistic_value() {
        let backend = FakeBackend::with(topics());
        let gate = Arc::new(Notify::new());
        *backend.gate.lock().unwrap() = Some(gate.clone());
        let entered = backend.entered.clone();
        let (reconciler, _rx) = loaded(backend).await;

        let task = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.toggle(&1).await })
        };
        entered.notified().await;

        // Server still holds the old value
        reconciler.refresh().await.unwrap();
        assert_eq!(status_of(&reconciler, 1), CoverageStatus::Covered);

        gate.notify_one();
        assert_eq!(
            task.await.unwrap().unwrap(),
            ToggleOutcome::Confirmed(CoverageStatus::Covered)
        );
        assert_eq!(status_of(&reconciler, 1), server_status_of(&reconciler, 1));

        // Nothing left pending: a later reload shows the server as is
        reconciler.refresh().await.unwrap();
        assert_eq!(status_of(&reconciler, 1), CoverageStatus::Covered);
    }

    #[tokio::test]
    async fn test_closed_scope_abandons_in_flight_toggle() {
        let backend = FakeBackend::with(topics());
        let gate = Arc::new(Notify::new());
        *backend.gate.lock().unwrap() = Some(gate.clone());
        let entered = backend.entered.clone();
        let (reconciler, mut rx) = loaded(backend).await;

        let task = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.toggle(&1).await })
        };
        entered.notified().await;
        reconciler.scope().close();

        assert_eq!(task.await.unwrap().unwrap(), ToggleOutcome::Abandoned);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_key_is_an_error() {
        let (reconciler, _rx) = loaded(FakeBackend::with(topics())).await;
        assert_eq!(
            reconciler.toggle(&42).await.unwrap_err(),
            ToggleError::NotFound("42".into())
        );
    }

    #[tokio::test]
    async fn test_negative_hook_only_on_confirmed_negative() {
        let students = vec![StudentAttendance {
            student_id: 5,
            name: "Ada".into(),
            roll_number: "R-05".into(),
            status: AttendanceStatus::Present,
        }];
        let backend = FakeBackend::with(students);
        let calls = Arc::new(AtomicUsize::new(0));
        let (alerts, _rx) = AlertSink::channel();
        let counter = calls.clone();
        let reconciler: Reconciler<StudentAttendance, _> =
            Reconciler::new("attendance", backend, alerts).on_negative(
                move |s: &StudentAttendance| {
                    assert_eq!(s.status, AttendanceStatus::Absent);
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            );
        reconciler.refresh().await.unwrap();

        reconciler.toggle(&5).await.unwrap(); // P -> A
        reconciler.toggle(&5).await.unwrap(); // A -> P
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        reconciler.backend.fail_apply.store(true, Ordering::SeqCst);
        reconciler.toggle(&5).await.unwrap(); // P -> A refused
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rollback_from_str() {
        assert_eq!("Resync".parse::<Rollback>(), Ok(Rollback::Resync));
        assert_eq!(" revert ".parse::<Rollback>(), Ok(Rollback::Revert));
        assert!("undo".parse::<Rollback>().is_err());
    }
}
