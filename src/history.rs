// src/history.rs
//
// Last successfully fetched violation list. A failed refresh is logged,
// published as a request notice and leaves the previous list in place.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::backend::{BackendClient, Violation};
use crate::error::{describe, BackendError};
use crate::stream::notices::{NoticeBoard, NoticeKind};

#[derive(Debug, Default)]
pub struct ViolationHistory {
    violations: Vec<Violation>,
    fetched_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ViolationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the list was replaced.
    pub async fn refresh(&mut self, client: &BackendClient, notices: &mut NoticeBoard) -> bool {
        let result = client.fetch_violations().await;
        self.apply(result, notices)
    }

    pub fn apply(
        &mut self,
        result: Result<Vec<Violation>, BackendError>,
        notices: &mut NoticeBoard,
    ) -> bool {
        match result {
            Ok(violations) => {
                info!("📋 Violation history: {} record(s)", violations.len());
                self.violations = violations;
                self.fetched_at = Some(Utc::now());
                self.last_error = None;
                true
            }
            Err(e) => {
                let reason = describe(e);
                error!(
                    "📋 Failed to refresh violation history (keeping {} record(s)): {}",
                    self.violations.len(),
                    reason
                );
                notices.publish(
                    NoticeKind::Request,
                    format!("Violation history unavailable: {}", reason),
                );
                self.last_error = Some(reason);
                false
            }
        }
    }

    /// Newest first, as served by the backend.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn for_vehicle<'a>(&'a self, vehicle_id: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations
            .iter()
            .filter(move |v| v.vehicle_id.as_ref().is_some_and(|id| id.0 == vehicle_id))
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_server::serve_once;
    use crate::snapshot::ObjectId;

    fn violation(id: i64, vehicle: &str) -> Violation {
        Violation {
            id,
            vehicle_id: Some(ObjectId(vehicle.to_string())),
            timestamp: None,
            video_second: None,
            processed_video_path: None,
            original_video_path: None,
        }
    }

    #[test]
    fn test_failure_keeps_previous_list() {
        let mut notices = NoticeBoard::new(8);
        let mut history = ViolationHistory::new();
        assert!(history.apply(Ok(vec![violation(2, "5"), violation(1, "3")]), &mut notices));
        let fetched = history.fetched_at();
        assert!(fetched.is_some());

        assert!(!history.apply(Err(BackendError::UploadInProgress), &mut notices));
        assert_eq!(history.len(), 2);
        assert_eq!(history.violations()[0].id, 2);
        assert_eq!(history.fetched_at(), fetched);
        assert!(history.last_error().is_some());

        assert!(history.apply(Ok(vec![]), &mut notices));
        assert!(history.is_empty());
        assert!(history.last_error().is_none());
    }

    #[test]
    fn test_failure_publishes_request_notice() {
        let mut notices = NoticeBoard::new(8);
        let mut history = ViolationHistory::new();
        history.apply(Ok(vec![violation(1, "3")]), &mut notices);
        assert!(notices.drain().is_empty());

        history.apply(Err(BackendError::UploadInProgress), &mut notices);
        let drained = notices.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind, NoticeKind::Request);
        assert_eq!(
            drained[0].message,
            "Violation history unavailable: An upload is already in progress"
        );
    }

    #[test]
    fn test_for_vehicle() {
        let mut notices = NoticeBoard::new(8);
        let mut history = ViolationHistory::new();
        history.apply(
            Ok(vec![violation(3, "5"), violation(2, "9"), violation(1, "5")]),
            &mut notices,
        );
        let ids: Vec<_> = history.for_vehicle("5").map(|v| v.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_refresh_against_backend() {
        let (base, _server) = serve_once(
            "200 OK",
            r#"[{"id": 4, "vehicle_id": "2"}, {"id": 3, "vehicle_id": "1"}]"#.to_string(),
        )
        .await;
        let client = BackendClient::new(&base, 5, 5).unwrap();
        let mut notices = NoticeBoard::new(8);
        let mut history = ViolationHistory::new();
        assert!(history.refresh(&client, &mut notices).await);
        assert_eq!(history.len(), 2);

        // the one-shot server is gone now
        assert!(!history.refresh(&client, &mut notices).await);
        assert_eq!(history.len(), 2);
        assert_eq!(notices.drain()[0].kind, NoticeKind::Request);
    }
}
