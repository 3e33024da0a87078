use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    backend::{BackendError, PendingEdge, SocialBackend},
    domain::{FollowCounts, PendingLists, Principal},
    id::new_ulid_string,
    notification::Notification,
};

/// HTTP/JSON binding of the backend contract. Every operation is a POST of a
/// JSON body to `{base}/api/{method}` carrying the session bearer token.
#[derive(Debug, Clone)]
pub struct RpcBackend {
    base_url: String,
    session_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ConnectedResponse {
    connected: bool,
}

#[derive(Debug, Deserialize)]
struct ConnectionsResponse {
    connections: Vec<Principal>,
}

#[derive(Debug, Deserialize)]
struct IsFollowingResponse {
    following: bool,
}

#[derive(Debug, Deserialize)]
struct FollowingListResponse {
    following: Vec<Principal>,
}

#[derive(Debug, Deserialize)]
struct NotificationsResponse {
    notifications: Vec<Notification>,
}

impl RpcBackend {
    pub fn new(
        base_url: &str,
        session_token: &str,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Transport {
                message: format!("build http client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: session_token.to_string(),
            client,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/api/{method}", self.base_url)
    }

    async fn call<Req, Resp>(&self, method: &'static str, body: &Req) -> Result<Resp, BackendError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let request_id = new_ulid_string();
        debug!(method, request_id, "backend call");
        let resp = self
            .client
            .post(self.url(method))
            .bearer_auth(&self.session_token)
            .header("x-request-id", request_id.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                message: format!("{method}: {e}"),
            })?;

        let status = resp.status();
        if status.is_success() {
            return resp.json::<Resp>().await.map_err(|e| BackendError::Transport {
                message: format!("decode {method} response: {e}"),
            });
        }

        let parsed = resp.json::<ApiErrorBody>().await.ok();
        let code = parsed
            .as_ref()
            .map(|b| b.code.clone())
            .unwrap_or_else(|| status.as_u16().to_string());
        let message = parsed
            .map(|b| b.message)
            .unwrap_or_else(|| format!("{method} failed with status {status}"));

        if status == reqwest::StatusCode::FORBIDDEN || code == "privacy_blocked" {
            return Err(BackendError::Denied { message });
        }
        if status == reqwest::StatusCode::NOT_IMPLEMENTED || code == "not_implemented" {
            return Err(BackendError::Unsupported { operation: method });
        }
        Err(BackendError::Api { code, message })
    }

    async fn call_unit<Req>(&self, method: &'static str, body: &Req) -> Result<(), BackendError>
    where
        Req: Serialize + Sync,
    {
        self.call::<_, serde_json::Value>(method, body).await?;
        Ok(())
    }
}

impl SocialBackend for RpcBackend {
    async fn is_connected(&self, a: &Principal, b: &Principal) -> Result<bool, BackendError> {
        let resp: ConnectedResponse = self
            .call("is_connected", &serde_json::json!({ "a": a, "b": b }))
            .await?;
        Ok(resp.connected)
    }

    async fn list_connections(&self, of: &Principal) -> Result<Vec<Principal>, BackendError> {
        let resp: ConnectionsResponse = self
            .call("list_connections", &serde_json::json!({ "of": of }))
            .await?;
        Ok(resp.connections)
    }

    async fn send_connection_request(&self, target: &Principal) -> Result<(), BackendError> {
        self.call_unit(
            "send_connection_request",
            &serde_json::json!({ "target": target }),
        )
        .await
    }

    async fn cancel_connection_request(&self, target: &Principal) -> Result<(), BackendError> {
        self.call_unit(
            "cancel_connection_request",
            &serde_json::json!({ "target": target }),
        )
        .await
    }

    async fn accept_connection_request(&self, from: &Principal) -> Result<(), BackendError> {
        self.call_unit(
            "accept_connection_request",
            &serde_json::json!({ "from": from }),
        )
        .await
    }

    async fn decline_connection_request(&self, from: &Principal) -> Result<(), BackendError> {
        self.call_unit(
            "decline_connection_request",
            &serde_json::json!({ "from": from }),
        )
        .await
    }

    async fn is_following(&self, target: &Principal) -> Result<bool, BackendError> {
        let resp: IsFollowingResponse = self
            .call("is_following", &serde_json::json!({ "target": target }))
            .await?;
        Ok(resp.following)
    }

    async fn follow(&self, target: &Principal) -> Result<(), BackendError> {
        self.call_unit("follow", &serde_json::json!({ "target": target }))
            .await
    }

    async fn unfollow(&self, target: &Principal) -> Result<(), BackendError> {
        self.call_unit("unfollow", &serde_json::json!({ "target": target }))
            .await
    }

    async fn follow_counts(&self, user: &Principal) -> Result<FollowCounts, BackendError> {
        self.call("follow_counts", &serde_json::json!({ "user": user }))
            .await
    }

    async fn pending_between(&self, target: &Principal) -> Result<PendingEdge, BackendError> {
        self.call("pending_between", &serde_json::json!({ "target": target }))
            .await
    }

    async fn list_pending_requests(&self) -> Result<PendingLists, BackendError> {
        self.call("list_pending_requests", &serde_json::json!({}))
            .await
    }

    async fn list_following(&self) -> Result<Vec<Principal>, BackendError> {
        let resp: FollowingListResponse =
            self.call("list_following", &serde_json::json!({})).await?;
        Ok(resp.following)
    }

    async fn notifications(&self) -> Result<Vec<Notification>, BackendError> {
        let resp: NotificationsResponse =
            self.call("notifications", &serde_json::json!({})).await?;
        Ok(resp.notifications)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), BackendError> {
        self.call_unit("mark_notification_read", &serde_json::json!({ "id": id }))
            .await
    }

    async fn mark_all_notifications_read(&self) -> Result<(), BackendError> {
        self.call_unit("mark_all_notifications_read", &serde_json::json!({}))
            .await
    }

    async fn record_profile_view(&self, target: &Principal) -> Result<(), BackendError> {
        self.call_unit(
            "record_profile_view",
            &serde_json::json!({ "target": target }),
        )
        .await
    }

    async fn record_search(&self, term: &str) -> Result<(), BackendError> {
        self.call_unit("record_search", &serde_json::json!({ "term": term }))
            .await
    }
}
