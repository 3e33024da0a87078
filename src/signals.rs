use std::sync::Arc;

use tracing::debug;

use crate::{backend::SocialBackend, domain::Principal};

/// Discover signals are best-effort telemetry: the dispatch is spawned and
/// forgotten, failures are logged at debug and swallowed. Swallowing is the
/// contract here, not an omission; these calls must never block or break the
/// surrounding flow.
pub fn record_profile_view<B>(backend: &Arc<B>, target: &Principal)
where
    B: SocialBackend + 'static,
{
    let backend = Arc::clone(backend);
    let target = target.clone();
    tokio::spawn(async move {
        if let Err(e) = backend.record_profile_view(&target).await {
            debug!(profile = %target, error = %e, "profile view signal dropped");
        }
    });
}

pub fn record_search<B>(backend: &Arc<B>, term: &str)
where
    B: SocialBackend + 'static,
{
    let term = term.trim().to_string();
    if term.is_empty() {
        return;
    }
    let backend = Arc::clone(backend);
    tokio::spawn(async move {
        if let Err(e) = backend.record_search(&term).await {
            debug!(term = %term, error = %e, "search signal dropped");
        }
    });
}
