use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    InvalidPrincipal { text: String, reason: String },
    SelfPair { principal: String },
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPrincipal { .. } => "invalid_principal",
            Self::SelfPair { .. } => "self_pair",
        }
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPrincipal { text, reason } => {
                write!(f, "invalid principal: {text} ({reason})")
            }
            Self::SelfPair { principal } => {
                write!(f, "self pair is not resolvable: {principal}")
            }
        }
    }
}

impl std::error::Error for DomainError {}

pub const PRINCIPAL_MAX_LEN: usize = 63;

/// Opaque actor reference. The text form is validated once at the boundary;
/// everything past this type can assume a well-formed identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    pub fn from_text(text: &str) -> Result<Self, DomainError> {
        validate_principal_text(text)?;
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Principal {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_principal_text(&value)?;
        Ok(Self(value))
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate_principal_text(text: &str) -> Result<(), DomainError> {
    let invalid = |reason: &str| DomainError::InvalidPrincipal {
        text: text.to_string(),
        reason: reason.to_string(),
    };

    if text.is_empty() {
        return Err(invalid("empty"));
    }
    if text.len() > PRINCIPAL_MAX_LEN {
        return Err(invalid("too long"));
    }
    if text.starts_with('-') || text.ends_with('-') {
        return Err(invalid("leading or trailing dash"));
    }
    if text.contains("--") {
        return Err(invalid("consecutive dashes"));
    }
    // Lowercase base32 groups joined by dashes, as issued by the identity provider.
    if let Some(c) = text
        .chars()
        .find(|&c| !matches!(c, 'a'..='z' | '2'..='7' | '-'))
    {
        return Err(invalid(&format!("unexpected character {c:?}")));
    }
    Ok(())
}

/// One directional pending axis of a relationship. `Unknown` is the explicit
/// degraded value for backends that cannot answer the directional query; it
/// is never collapsed to `Known(false)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PendingState {
    Known(bool),
    Unknown,
}

impl PendingState {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Known(true))
    }
}

/// Derived relationship state for one (viewer, target) pair. The backend is
/// authoritative; this value is a cache entry refreshed by invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub connected: bool,
    pub outgoing_pending: PendingState,
    pub incoming_pending: PendingState,
}

impl RelationshipSnapshot {
    /// A connected pair has no pending request in either direction.
    pub fn connected() -> Self {
        Self {
            connected: true,
            outgoing_pending: PendingState::Known(false),
            incoming_pending: PendingState::Known(false),
        }
    }

    pub fn not_connected(outgoing_pending: PendingState, incoming_pending: PendingState) -> Self {
        Self {
            connected: false,
            outgoing_pending,
            incoming_pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FollowCounts {
    pub followers: u64,
    pub following: u64,
}

/// Incoming and outgoing connection requests for the viewer, where the
/// backend exposes the aggregate query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingLists {
    pub incoming: Vec<Principal>,
    pub outgoing: Vec<Principal>,
}

/// An aggregate view the backend may or may not be able to serve. Consumers
/// render `Unsupported` as an explicit unavailable state instead of an empty
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate<T> {
    Ready(T),
    Unsupported,
}

impl<T> Aggregate<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Unsupported => None,
        }
    }
}
