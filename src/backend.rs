use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{FollowCounts, PendingLists, Principal},
    notification::Notification,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network-level failure: the call may never have reached the backend.
    Transport { message: String },
    /// The backend refused the action under the target's privacy rules.
    Denied { message: String },
    /// The backend contract has no such query. Callers render an explicit
    /// degraded state instead of substituting a guessed value.
    Unsupported { operation: &'static str },
    /// Any other backend-reported failure.
    Api { code: String, message: String },
}

impl BackendError {
    pub fn code(&self) -> &str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Denied { .. } => "privacy_blocked",
            Self::Unsupported { .. } => "not_implemented",
            Self::Api { code, .. } => code,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { message } => write!(f, "backend transport error: {message}"),
            Self::Denied { message } => write!(f, "blocked by privacy settings: {message}"),
            Self::Unsupported { operation } => {
                write!(f, "backend does not support operation: {operation}")
            }
            Self::Api { code, message } => write!(f, "backend error {code}: {message}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Directional pending-request answer for one (viewer, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdge {
    pub outgoing: bool,
    pub incoming: bool,
}

/// The remote procedure surface the client consumes. The viewer is implicit
/// in the session every implementation carries.
///
/// Operations the observed backend contract does not include are extension
/// points: the provided bodies answer `Unsupported`, and implementations
/// override them once the backend grows the query. Client code must degrade
/// on `Unsupported` rather than synthesize the answer from other calls.
pub trait SocialBackend: Send + Sync {
    fn is_connected(
        &self,
        a: &Principal,
        b: &Principal,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    fn list_connections(
        &self,
        of: &Principal,
    ) -> impl Future<Output = Result<Vec<Principal>, BackendError>> + Send;

    fn send_connection_request(
        &self,
        target: &Principal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn cancel_connection_request(
        &self,
        target: &Principal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn accept_connection_request(
        &self,
        from: &Principal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn decline_connection_request(
        &self,
        from: &Principal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn is_following(
        &self,
        target: &Principal,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    fn follow(
        &self,
        target: &Principal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn unfollow(
        &self,
        target: &Principal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn follow_counts(
        &self,
        user: &Principal,
    ) -> impl Future<Output = Result<FollowCounts, BackendError>> + Send;

    fn pending_between(
        &self,
        target: &Principal,
    ) -> impl Future<Output = Result<PendingEdge, BackendError>> + Send {
        let _ = target;
        async {
            Err(BackendError::Unsupported {
                operation: "pending_between",
            })
        }
    }

    fn list_pending_requests(
        &self,
    ) -> impl Future<Output = Result<PendingLists, BackendError>> + Send {
        async {
            Err(BackendError::Unsupported {
                operation: "list_pending_requests",
            })
        }
    }

    fn list_following(
        &self,
    ) -> impl Future<Output = Result<Vec<Principal>, BackendError>> + Send {
        async {
            Err(BackendError::Unsupported {
                operation: "list_following",
            })
        }
    }

    fn notifications(
        &self,
    ) -> impl Future<Output = Result<Vec<Notification>, BackendError>> + Send;

    fn mark_notification_read(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn mark_all_notifications_read(
        &self,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn record_profile_view(
        &self,
        target: &Principal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn record_search(
        &self,
        term: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
