use std::sync::Arc;

use futures_util::future::join;
use tracing::debug;

use crate::{
    backend::{BackendError, SocialBackend},
    cache::RelationCache,
    domain::{
        Aggregate, FollowCounts, PendingLists, PendingState, Principal, RelationshipSnapshot,
    },
    notification::Notification,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationError {
    /// Self-pairs are never resolved or mutated; callers special-case "self"
    /// before reaching the reconciler.
    SelfPair { principal: String },
    Backend(BackendError),
}

impl RelationError {
    pub fn code(&self) -> &str {
        match self {
            Self::SelfPair { .. } => "self_pair",
            Self::Backend(e) => e.code(),
        }
    }

    /// True when the backend refused the action under the target's privacy
    /// rules; callers present this distinctly from generic failures.
    pub fn is_privacy_denied(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_denied())
    }
}

impl std::fmt::Display for RelationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfPair { principal } => {
                write!(f, "self pair is not resolvable: {principal}")
            }
            Self::Backend(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for RelationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SelfPair { .. } => None,
            Self::Backend(e) => Some(e),
        }
    }
}

impl From<BackendError> for RelationError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

/// Derives relationship and follow state from backend reads, caches it per
/// (viewer, target) key, and invalidates exactly the keys a successful
/// mutation may have changed. A failed mutation invalidates nothing; the
/// prior cached value stays authoritative.
#[derive(Debug)]
pub struct Reconciler<B> {
    viewer: Principal,
    backend: Arc<B>,
    cache: Arc<RelationCache>,
}

impl<B> Clone for Reconciler<B> {
    fn clone(&self) -> Self {
        Self {
            viewer: self.viewer.clone(),
            backend: Arc::clone(&self.backend),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<B: SocialBackend> Reconciler<B> {
    pub fn new(viewer: Principal, backend: Arc<B>, cache: Arc<RelationCache>) -> Self {
        Self {
            viewer,
            backend,
            cache,
        }
    }

    pub fn viewer(&self) -> &Principal {
        &self.viewer
    }

    fn guard_target(&self, target: &Principal) -> Result<(), RelationError> {
        if *target == self.viewer {
            return Err(RelationError::SelfPair {
                principal: target.to_string(),
            });
        }
        Ok(())
    }

    fn pair_key(&self, target: &Principal) -> (Principal, Principal) {
        (self.viewer.clone(), target.clone())
    }

    /// Resolve the relationship between the viewer and a target.
    ///
    /// One symmetric `is_connected` read plus, where the backend supports it,
    /// one directional pending read. When the pending query is unsupported
    /// the pending axes come back `Unknown`; the absence of a connection is
    /// never turned into a fabricated "no pending request".
    pub async fn resolve_relationship(
        &self,
        target: &Principal,
    ) -> Result<RelationshipSnapshot, RelationError> {
        self.guard_target(target)?;
        let key = self.pair_key(target);
        if let Some(snap) = self.cache.relationships.fresh(&key).await {
            return Ok(snap);
        }

        let epoch = self.cache.relationships.begin(&key).await;
        let (connected, pending) = join(
            self.backend.is_connected(&self.viewer, target),
            self.backend.pending_between(target),
        )
        .await;

        let snap = if connected? {
            RelationshipSnapshot::connected()
        } else {
            match pending {
                Ok(edge) => RelationshipSnapshot::not_connected(
                    PendingState::Known(edge.outgoing),
                    PendingState::Known(edge.incoming),
                ),
                Err(e) if e.is_unsupported() => RelationshipSnapshot::not_connected(
                    PendingState::Unknown,
                    PendingState::Unknown,
                ),
                Err(e) => return Err(e.into()),
            }
        };

        if !self.cache.relationships.store(&key, epoch, snap).await {
            debug!(peer = %target, "relationship read superseded by newer mutation");
        }
        Ok(snap)
    }

    /// Whether the viewer follows the target. Authoritative: the backend has
    /// a direct directional predicate for this axis.
    pub async fn resolve_follow(&self, target: &Principal) -> Result<bool, RelationError> {
        self.guard_target(target)?;
        let key = self.pair_key(target);
        if let Some(value) = self.cache.follows.fresh(&key).await {
            return Ok(value);
        }

        let epoch = self.cache.follows.begin(&key).await;
        let value = self.backend.is_following(target).await?;
        if !self.cache.follows.store(&key, epoch, value).await {
            debug!(peer = %target, "follow read superseded by newer mutation");
        }
        Ok(value)
    }

    pub async fn follow_stats(&self, user: &Principal) -> Result<FollowCounts, RelationError> {
        if let Some(counts) = self.cache.follow_counts.fresh(user).await {
            return Ok(counts);
        }
        let epoch = self.cache.follow_counts.begin(user).await;
        let counts = self.backend.follow_counts(user).await?;
        self.cache.follow_counts.store(user, epoch, counts).await;
        Ok(counts)
    }

    pub async fn connections(&self, user: &Principal) -> Result<Vec<Principal>, RelationError> {
        if let Some(list) = self.cache.connections.fresh(user).await {
            return Ok(list);
        }
        let epoch = self.cache.connections.begin(user).await;
        let list = self.backend.list_connections(user).await?;
        self.cache.connections.store(user, epoch, list.clone()).await;
        Ok(list)
    }

    pub async fn send_connection_request(&self, target: &Principal) -> Result<(), RelationError> {
        self.guard_target(target)?;
        self.backend.send_connection_request(target).await?;
        self.invalidate_request_keys(target).await;
        Ok(())
    }

    pub async fn cancel_connection_request(
        &self,
        target: &Principal,
    ) -> Result<(), RelationError> {
        self.guard_target(target)?;
        self.backend.cancel_connection_request(target).await?;
        self.invalidate_request_keys(target).await;
        Ok(())
    }

    pub async fn accept_connection_request(&self, from: &Principal) -> Result<(), RelationError> {
        self.guard_target(from)?;
        self.backend.accept_connection_request(from).await?;
        self.invalidate_request_keys(from).await;
        // Both sides' connection lists gained an entry.
        self.cache.connections.invalidate(&self.viewer).await;
        self.cache.connections.invalidate(from).await;
        Ok(())
    }

    pub async fn decline_connection_request(&self, from: &Principal) -> Result<(), RelationError> {
        self.guard_target(from)?;
        self.backend.decline_connection_request(from).await?;
        self.invalidate_request_keys(from).await;
        Ok(())
    }

    pub async fn follow(&self, target: &Principal) -> Result<(), RelationError> {
        self.guard_target(target)?;
        self.backend.follow(target).await?;
        self.invalidate_follow_keys(target).await;
        Ok(())
    }

    pub async fn unfollow(&self, target: &Principal) -> Result<(), RelationError> {
        self.guard_target(target)?;
        self.backend.unfollow(target).await?;
        self.invalidate_follow_keys(target).await;
        Ok(())
    }

    async fn invalidate_request_keys(&self, other: &Principal) {
        self.cache
            .relationships
            .invalidate(&self.pair_key(other))
            .await;
        self.cache.pending_requests.invalidate(&self.viewer).await;
    }

    async fn invalidate_follow_keys(&self, target: &Principal) {
        self.cache.follows.invalidate(&self.pair_key(target)).await;
        self.cache.follow_counts.invalidate(&self.viewer).await;
        self.cache.follow_counts.invalidate(target).await;
        self.cache.following.invalidate(&self.viewer).await;
    }

    /// Pending-request lists, where the backend exposes the aggregate query.
    ///
    /// Backends without the query answer `Unsupported` and that is what the
    /// caller gets: the view is degraded, not synthesized by fanning out
    /// per-profile predicate calls over a directory listing.
    pub async fn pending_requests(
        &self,
    ) -> Result<Aggregate<PendingLists>, RelationError> {
        if let Some(lists) = self.cache.pending_requests.fresh(&self.viewer).await {
            return Ok(Aggregate::Ready(lists));
        }
        let epoch = self.cache.pending_requests.begin(&self.viewer).await;
        match self.backend.list_pending_requests().await {
            Ok(lists) => {
                self.cache
                    .pending_requests
                    .store(&self.viewer, epoch, lists.clone())
                    .await;
                Ok(Aggregate::Ready(lists))
            }
            Err(e) if e.is_unsupported() => Ok(Aggregate::Unsupported),
            Err(e) => Err(e.into()),
        }
    }

    /// Who the viewer follows, where the backend exposes the aggregate query.
    pub async fn following(&self) -> Result<Aggregate<Vec<Principal>>, RelationError> {
        if let Some(list) = self.cache.following.fresh(&self.viewer).await {
            return Ok(Aggregate::Ready(list));
        }
        let epoch = self.cache.following.begin(&self.viewer).await;
        match self.backend.list_following().await {
            Ok(list) => {
                self.cache
                    .following
                    .store(&self.viewer, epoch, list.clone())
                    .await;
                Ok(Aggregate::Ready(list))
            }
            Err(e) if e.is_unsupported() => Ok(Aggregate::Unsupported),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, RelationError> {
        if let Some(items) = self.cache.notifications.fresh(&self.viewer).await {
            return Ok(items);
        }
        let epoch = self.cache.notifications.begin(&self.viewer).await;
        let items = self.backend.notifications().await?;
        self.cache
            .notifications
            .store(&self.viewer, epoch, items.clone())
            .await;
        Ok(items)
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), RelationError> {
        self.backend.mark_notification_read(id).await?;
        self.cache.notifications.invalidate(&self.viewer).await;
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), RelationError> {
        self.backend.mark_all_notifications_read().await?;
        self.cache.notifications.invalidate(&self.viewer).await;
        Ok(())
    }
}
