//! Failure policy for remote calls.
//!
//! Mutations that fail with a transient transaction conflict are sent again
//! exactly once. Every other failure is logged and surfaced as `None`.

use std::future::Future;

use crate::api::{ApiResponse, RemoteErrorMessage};

/// Message prefix Backlog uses for transaction conflicts.
pub const TRANSIENT_CONFLICT_PREFIX: &str = "Deadlock";

/// Whether `error` reports a conflict that a second identical request may get past.
pub fn is_transient_conflict(error: &RemoteErrorMessage) -> bool {
    error.message.starts_with(TRANSIENT_CONFLICT_PREFIX)
}

/// True iff the response failed and any of its errors is a transient conflict.
pub fn check_is_retry<T>(response: &ApiResponse<T>) -> bool {
    match response {
        ApiResponse::Success(_) => false,
        ApiResponse::Failure(errors) => errors.iter().any(is_transient_conflict),
    }
}

/// Unwrap a successful response, or log its errors and return `None`.
pub fn resolve_result<T>(response: ApiResponse<T>) -> Option<T> {
    match response {
        ApiResponse::Success(content) => Some(content),
        failure @ ApiResponse::Failure(_) => {
            tracing::error!("{}", failure.joined_errors());
            None
        }
    }
}

/// Run `attempt`, running it one more time if the first response is a transient conflict.
///
/// The second response is final whatever it contains.
pub async fn retry_on_conflict<T, F, Fut>(mut attempt: F) -> ApiResponse<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResponse<T>>,
{
    let response = attempt().await;
    if !check_is_retry(&response) {
        return response;
    }
    tracing::warn!(errors = %response.joined_errors(), "transient conflict, retrying once");
    attempt().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::test_support::capture_logs;

    fn failure(messages: &[&str]) -> ApiResponse<u32> {
        ApiResponse::Failure(messages.iter().map(|m| RemoteErrorMessage::new(*m)).collect())
    }

    async fn run_scripted(script: Vec<ApiResponse<u32>>) -> (ApiResponse<u32>, usize) {
        let script = RefCell::new(VecDeque::from(script));
        let calls = RefCell::new(0usize);
        let response = retry_on_conflict(|| {
            *calls.borrow_mut() += 1;
            let next = script.borrow_mut().pop_front().expect("unexpected extra attempt");
            async move { next }
        })
        .await;
        (response, calls.into_inner())
    }

    #[test]
    fn conflict_detection_is_prefix_only() {
        assert!(is_transient_conflict(&RemoteErrorMessage::new("DeadlockFound")));
        assert!(is_transient_conflict(&RemoteErrorMessage::new(
            "Deadlock found when trying to get lock"
        )));
        assert!(!is_transient_conflict(&RemoteErrorMessage::new("Found Deadlock")));
        assert!(!is_transient_conflict(&RemoteErrorMessage::new("deadlock")));
    }

    #[test]
    fn check_is_retry_needs_failure_with_conflict() {
        assert!(!check_is_retry(&ApiResponse::Success(1)));
        assert!(!check_is_retry(&failure(&["Permission denied"])));
        assert!(check_is_retry(&failure(&["Permission denied", "DeadlockFound"])));
        assert!(!check_is_retry(&failure(&[])));
    }

    #[test]
    fn resolve_result_returns_content_unchanged() {
        assert_eq!(resolve_result(ApiResponse::Success(5)), Some(5));
    }

    #[test]
    fn resolve_result_logs_joined_errors() {
        let (result, logs) = capture_logs(|| resolve_result(failure(&["first", "second"])));
        assert_eq!(result, None);
        assert!(logs.contains("first, second"), "logs were: {logs}");
    }

    #[tokio::test]
    async fn success_is_attempted_once() {
        let (response, calls) = run_scripted(vec![ApiResponse::Success(1)]).await;
        assert_eq!(response, ApiResponse::Success(1));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn non_conflict_failure_is_not_retried() {
        let (response, calls) = run_scripted(vec![failure(&["Permission denied"])]).await;
        assert!(!response.is_success());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn conflict_is_retried_once_and_can_succeed() {
        let (response, calls) =
            run_scripted(vec![failure(&["DeadlockFound"]), ApiResponse::Success(2)]).await;
        assert_eq!(response, ApiResponse::Success(2));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn second_conflict_is_final() {
        let (response, calls) = run_scripted(vec![
            failure(&["DeadlockFound"]),
            failure(&["DeadlockFound again"]),
        ])
        .await;
        assert_eq!(resolve_result(response), None);
        assert_eq!(calls, 2);
    }
}
