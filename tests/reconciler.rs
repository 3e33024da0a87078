use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use pretty_assertions::assert_eq;
use tokio::sync::Notify;

use amity::{
    backend::{BackendError, PendingEdge, SocialBackend},
    cache::RelationCache,
    domain::{Aggregate, FollowCounts, PendingLists, PendingState, Principal},
    notification::{Notification, NotificationPayload},
    reconcile::Reconciler,
    signals,
};

fn p(text: &str) -> Principal {
    Principal::from_text(text).unwrap()
}

fn pair(a: &Principal, b: &Principal) -> (Principal, Principal) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Default)]
struct StubState {
    connected: BTreeSet<(Principal, Principal)>,
    following: BTreeSet<(Principal, Principal)>,
    pending: BTreeSet<(Principal, Principal)>,
    notifications: Vec<Notification>,
}

struct StubBackend {
    viewer: Principal,
    supports_pending: bool,
    fail_mutations: AtomicBool,
    state: Mutex<StubState>,
    calls: Mutex<BTreeMap<&'static str, u64>>,
    gate_is_following: AtomicBool,
    gate: Notify,
    signal_seen: Notify,
}

impl StubBackend {
    fn new(viewer: Principal, supports_pending: bool) -> Self {
        Self {
            viewer,
            supports_pending,
            fail_mutations: AtomicBool::new(false),
            state: Mutex::new(StubState::default()),
            calls: Mutex::new(BTreeMap::new()),
            gate_is_following: AtomicBool::new(false),
            gate: Notify::new(),
            signal_seen: Notify::new(),
        }
    }

    fn count(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
    }

    fn calls(&self, method: &'static str) -> u64 {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u64 {
        self.calls.lock().unwrap().values().sum()
    }

    fn check_mutation(&self, op: &'static str) -> Result<(), BackendError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                code: "internal".to_string(),
                message: format!("{op} failed"),
            });
        }
        Ok(())
    }
}

impl SocialBackend for StubBackend {
    async fn is_connected(&self, a: &Principal, b: &Principal) -> Result<bool, BackendError> {
        self.count("is_connected");
        Ok(self.state.lock().unwrap().connected.contains(&pair(a, b)))
    }

    async fn list_connections(&self, of: &Principal) -> Result<Vec<Principal>, BackendError> {
        self.count("list_connections");
        let state = self.state.lock().unwrap();
        Ok(state
            .connected
            .iter()
            .filter_map(|(a, b)| {
                if a == of {
                    Some(b.clone())
                } else if b == of {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect())
    }

    async fn send_connection_request(&self, target: &Principal) -> Result<(), BackendError> {
        self.count("send_connection_request");
        self.check_mutation("send_connection_request")?;
        self.state
            .lock()
            .unwrap()
            .pending
            .insert((self.viewer.clone(), target.clone()));
        Ok(())
    }

    async fn cancel_connection_request(&self, target: &Principal) -> Result<(), BackendError> {
        self.count("cancel_connection_request");
        self.check_mutation("cancel_connection_request")?;
        self.state
            .lock()
            .unwrap()
            .pending
            .remove(&(self.viewer.clone(), target.clone()));
        Ok(())
    }

    async fn accept_connection_request(&self, from: &Principal) -> Result<(), BackendError> {
        self.count("accept_connection_request");
        self.check_mutation("accept_connection_request")?;
        let mut state = self.state.lock().unwrap();
        state.pending.remove(&(from.clone(), self.viewer.clone()));
        state.connected.insert(pair(from, &self.viewer));
        Ok(())
    }

    async fn decline_connection_request(&self, from: &Principal) -> Result<(), BackendError> {
        self.count("decline_connection_request");
        self.check_mutation("decline_connection_request")?;
        self.state
            .lock()
            .unwrap()
            .pending
            .remove(&(from.clone(), self.viewer.clone()));
        Ok(())
    }

    async fn is_following(&self, target: &Principal) -> Result<bool, BackendError> {
        self.count("is_following");
        // Capture the answer first so a gated response carries the state
        // observed when the read started, like a slow network reply.
        let value = self
            .state
            .lock()
            .unwrap()
            .following
            .contains(&(self.viewer.clone(), target.clone()));
        if self.gate_is_following.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        Ok(value)
    }

    async fn follow(&self, target: &Principal) -> Result<(), BackendError> {
        self.count("follow");
        self.check_mutation("follow")?;
        self.state
            .lock()
            .unwrap()
            .following
            .insert((self.viewer.clone(), target.clone()));
        Ok(())
    }

    async fn unfollow(&self, target: &Principal) -> Result<(), BackendError> {
        self.count("unfollow");
        self.check_mutation("unfollow")?;
        self.state
            .lock()
            .unwrap()
            .following
            .remove(&(self.viewer.clone(), target.clone()));
        Ok(())
    }

    async fn follow_counts(&self, user: &Principal) -> Result<FollowCounts, BackendError> {
        self.count("follow_counts");
        let state = self.state.lock().unwrap();
        Ok(FollowCounts {
            followers: state.following.iter().filter(|(_, t)| t == user).count() as u64,
            following: state.following.iter().filter(|(f, _)| f == user).count() as u64,
        })
    }

    async fn pending_between(&self, target: &Principal) -> Result<PendingEdge, BackendError> {
        self.count("pending_between");
        if !self.supports_pending {
            return Err(BackendError::Unsupported {
                operation: "pending_between",
            });
        }
        let state = self.state.lock().unwrap();
        Ok(PendingEdge {
            outgoing: state
                .pending
                .contains(&(self.viewer.clone(), target.clone())),
            incoming: state
                .pending
                .contains(&(target.clone(), self.viewer.clone())),
        })
    }

    async fn list_pending_requests(&self) -> Result<PendingLists, BackendError> {
        self.count("list_pending_requests");
        if !self.supports_pending {
            return Err(BackendError::Unsupported {
                operation: "list_pending_requests",
            });
        }
        let state = self.state.lock().unwrap();
        Ok(PendingLists {
            incoming: state
                .pending
                .iter()
                .filter(|(_, to)| *to == self.viewer)
                .map(|(from, _)| from.clone())
                .collect(),
            outgoing: state
                .pending
                .iter()
                .filter(|(from, _)| *from == self.viewer)
                .map(|(_, to)| to.clone())
                .collect(),
        })
    }

    async fn list_following(&self) -> Result<Vec<Principal>, BackendError> {
        self.count("list_following");
        if !self.supports_pending {
            return Err(BackendError::Unsupported {
                operation: "list_following",
            });
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .following
            .iter()
            .filter(|(f, _)| *f == self.viewer)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn notifications(&self) -> Result<Vec<Notification>, BackendError> {
        self.count("notifications");
        Ok(self.state.lock().unwrap().notifications.clone())
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), BackendError> {
        self.count("mark_notification_read");
        self.check_mutation("mark_notification_read")?;
        let mut state = self.state.lock().unwrap();
        for n in &mut state.notifications {
            if n.id == id {
                n.is_read = true;
            }
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<(), BackendError> {
        self.count("mark_all_notifications_read");
        self.check_mutation("mark_all_notifications_read")?;
        let mut state = self.state.lock().unwrap();
        for n in &mut state.notifications {
            n.is_read = true;
        }
        Ok(())
    }

    async fn record_profile_view(&self, _target: &Principal) -> Result<(), BackendError> {
        self.count("record_profile_view");
        self.signal_seen.notify_one();
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(BackendError::Transport {
                message: "telemetry sink down".to_string(),
            });
        }
        Ok(())
    }

    async fn record_search(&self, _term: &str) -> Result<(), BackendError> {
        self.count("record_search");
        self.signal_seen.notify_one();
        Ok(())
    }
}

fn setup(supports_pending: bool) -> (Arc<StubBackend>, Reconciler<StubBackend>) {
    let viewer = p("aaaaa-viewer");
    let backend = Arc::new(StubBackend::new(viewer.clone(), supports_pending));
    let cache = Arc::new(RelationCache::new(Duration::from_secs(60)));
    let reconciler = Reconciler::new(viewer, Arc::clone(&backend), cache);
    (backend, reconciler)
}

#[tokio::test]
async fn self_pair_is_rejected_before_any_backend_call() {
    let (backend, reconciler) = setup(true);
    let viewer = reconciler.viewer().clone();

    let err = reconciler.resolve_relationship(&viewer).await.unwrap_err();
    assert_eq!(err.code(), "self_pair");
    let err = reconciler.resolve_follow(&viewer).await.unwrap_err();
    assert_eq!(err.code(), "self_pair");
    let err = reconciler.follow(&viewer).await.unwrap_err();
    assert_eq!(err.code(), "self_pair");
    let err = reconciler.send_connection_request(&viewer).await.unwrap_err();
    assert_eq!(err.code(), "self_pair");

    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn follow_invalidates_edge_and_counters() {
    let (backend, reconciler) = setup(true);
    let target = p("bbbbb-target");

    assert!(!reconciler.resolve_follow(&target).await.unwrap());
    let viewer = reconciler.viewer().clone();
    assert_eq!(
        reconciler.follow_stats(&viewer).await.unwrap(),
        FollowCounts::default()
    );
    assert_eq!(
        reconciler.follow_stats(&target).await.unwrap(),
        FollowCounts::default()
    );

    reconciler.follow(&target).await.unwrap();

    assert!(reconciler.resolve_follow(&target).await.unwrap());
    assert_eq!(backend.calls("is_following"), 2);

    // Counters for both sides were invalidated and re-fetched.
    let viewer_stats = reconciler.follow_stats(&viewer).await.unwrap();
    let target_stats = reconciler.follow_stats(&target).await.unwrap();
    assert_eq!(backend.calls("follow_counts"), 4);
    assert_eq!(viewer_stats.following, 1);
    assert_eq!(target_stats.followers, 1);
}

#[tokio::test]
async fn accept_connects_pair_and_refreshes_both_connection_lists() {
    let (backend, reconciler) = setup(true);
    let viewer = reconciler.viewer().clone();
    let other = p("ccccc-requester");
    backend
        .state
        .lock()
        .unwrap()
        .pending
        .insert((other.clone(), viewer.clone()));

    let before = reconciler.resolve_relationship(&other).await.unwrap();
    assert!(!before.connected);
    assert_eq!(before.incoming_pending, PendingState::Known(true));
    assert!(reconciler.connections(&viewer).await.unwrap().is_empty());
    assert!(reconciler.connections(&other).await.unwrap().is_empty());

    reconciler.accept_connection_request(&other).await.unwrap();

    let after = reconciler.resolve_relationship(&other).await.unwrap();
    assert!(after.connected);
    assert_eq!(reconciler.connections(&viewer).await.unwrap(), vec![other.clone()]);
    assert_eq!(reconciler.connections(&other).await.unwrap(), vec![viewer.clone()]);
    assert_eq!(backend.calls("list_connections"), 4);
}

#[tokio::test]
async fn failed_mutation_leaves_cached_state_untouched() {
    let (backend, reconciler) = setup(true);
    let target = p("bbbbb-target");

    let before = reconciler.resolve_relationship(&target).await.unwrap();
    let reads_before = backend.calls("is_connected");

    backend.fail_mutations.store(true, Ordering::SeqCst);
    let err = reconciler.send_connection_request(&target).await.unwrap_err();
    assert_eq!(err.code(), "internal");

    // Still served from cache: no invalidation happened, no new backend read.
    let after = reconciler.resolve_relationship(&target).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(backend.calls("is_connected"), reads_before);
}

#[tokio::test]
async fn stale_read_arriving_after_mutation_is_discarded() {
    let (backend, reconciler) = setup(true);
    let target = p("bbbbb-target");

    // A slow read starts before the mutation and resolves after it.
    backend.gate_is_following.store(true, Ordering::SeqCst);
    let slow = {
        let reconciler = reconciler.clone();
        let target = target.clone();
        tokio::spawn(async move { reconciler.resolve_follow(&target).await })
    };
    // Let the read reach the backend before mutating.
    while backend.calls("is_following") == 0 {
        tokio::task::yield_now().await;
    }

    reconciler.follow(&target).await.unwrap();

    backend.gate_is_following.store(false, Ordering::SeqCst);
    backend.gate.notify_one();
    let stale = slow.await.unwrap().unwrap();
    assert!(!stale, "the delayed response carries the old state");

    // The stale response must not have repopulated the cache; the next
    // resolve re-fetches and sees the post-mutation truth.
    assert!(reconciler.resolve_follow(&target).await.unwrap());
    assert_eq!(backend.calls("is_following"), 2);
}

#[tokio::test]
async fn quick_succession_mutations_settle_on_the_last_one() {
    let (_backend, reconciler) = setup(true);
    let target = p("bbbbb-target");

    reconciler.follow(&target).await.unwrap();
    reconciler.unfollow(&target).await.unwrap();
    assert!(!reconciler.resolve_follow(&target).await.unwrap());

    reconciler.unfollow(&target).await.unwrap();
    reconciler.follow(&target).await.unwrap();
    assert!(reconciler.resolve_follow(&target).await.unwrap());
}

#[tokio::test]
async fn missing_pending_query_yields_unknown_not_false() {
    let (backend, reconciler) = setup(false);
    let target = p("bbbbb-target");

    let snap = reconciler.resolve_relationship(&target).await.unwrap();
    assert!(!snap.connected);
    assert_eq!(snap.outgoing_pending, PendingState::Unknown);
    assert_eq!(snap.incoming_pending, PendingState::Unknown);
    assert_eq!(backend.calls("pending_between"), 1);
}

#[tokio::test]
async fn unsupported_aggregates_degrade_without_fanout() {
    let (backend, reconciler) = setup(false);

    assert_eq!(
        reconciler.pending_requests().await.unwrap(),
        Aggregate::Unsupported
    );
    assert_eq!(reconciler.following().await.unwrap(), Aggregate::Unsupported);

    // Degradation is explicit, never synthesized from per-profile probes.
    assert_eq!(backend.calls("is_following"), 0);
    assert_eq!(backend.calls("is_connected"), 0);
}

#[tokio::test]
async fn send_request_invalidates_pair_and_reflects_backend_pending() {
    let (backend, reconciler) = setup(true);
    let target = p("bbbbb-target");

    let before = reconciler.resolve_relationship(&target).await.unwrap();
    assert_eq!(before.outgoing_pending, PendingState::Known(false));

    reconciler.send_connection_request(&target).await.unwrap();

    let after = reconciler.resolve_relationship(&target).await.unwrap();
    assert_eq!(after.outgoing_pending, PendingState::Known(true));
    assert!(!after.connected);
    assert_eq!(backend.calls("is_connected"), 2);

    let lists = reconciler.pending_requests().await.unwrap().ready().unwrap();
    assert_eq!(lists.outgoing, vec![target]);
}

#[tokio::test]
async fn send_request_on_degraded_backend_never_reports_none() {
    let (_backend, reconciler) = setup(false);
    let target = p("bbbbb-target");

    reconciler.send_connection_request(&target).await.unwrap();

    let snap = reconciler.resolve_relationship(&target).await.unwrap();
    assert!(!snap.connected);
    // The true state is pending-outgoing; without the directional query the
    // client reports unknown rather than a fabricated "none".
    assert_eq!(snap.outgoing_pending, PendingState::Unknown);
    assert_eq!(snap.incoming_pending, PendingState::Unknown);
}

#[tokio::test]
async fn mark_read_invalidates_notification_cache() {
    let (backend, reconciler) = setup(true);
    let viewer = reconciler.viewer().clone();
    backend.state.lock().unwrap().notifications.push(Notification {
        id: "n-1".to_string(),
        recipient: viewer,
        is_read: false,
        timestamp: chrono::Utc::now(),
        payload: NotificationPayload::ConnectionRequest {
            from: p("ccccc-requester"),
        },
    });

    let items = reconciler.notifications().await.unwrap();
    assert!(!items[0].is_read);

    reconciler.mark_notification_read("n-1").await.unwrap();

    let items = reconciler.notifications().await.unwrap();
    assert!(items[0].is_read);
    assert_eq!(backend.calls("notifications"), 2);
}

#[tokio::test]
async fn signals_are_fire_and_forget() {
    let (backend, _reconciler) = setup(true);
    let target = p("bbbbb-target");

    // Failures are swallowed; the dispatch still happens.
    backend.fail_mutations.store(true, Ordering::SeqCst);
    signals::record_profile_view(&backend, &target);
    backend.signal_seen.notified().await;
    assert_eq!(backend.calls("record_profile_view"), 1);

    signals::record_search(&backend, "ferris");
    backend.signal_seen.notified().await;
    assert_eq!(backend.calls("record_search"), 1);

    // Blank search terms are dropped client-side.
    signals::record_search(&backend, "   ");
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(backend.calls("record_search"), 1);
}
