//! Error types for the emoterelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; every collaborator call
//! reports one of a fixed set of failure kinds.

use thiserror::Error;

/// The top-level error type for all emoterelay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Slot cache errors ---
    #[error("Slot error: {0}")]
    Slot(#[from] SlotError),

    // --- Catalog errors ---
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // --- Platform errors ---
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    // --- Relay errors ---
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Fetch errors ---
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the slot cache and its store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("Unknown emote: {0}")]
    UnknownEmote(String),

    #[error("Source unreachable for {name}: {reason}")]
    SourceUnreachable { name: String, reason: String },

    #[error("Slot store is at capacity ({capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("Provisioning failed for {name}: {reason}")]
    ProvisioningFailed { name: String, reason: String },

    #[error("Emote {0} is not resident")]
    NotResident(String),

    #[error("Invalid emote name: {0}")]
    InvalidName(String),
}

impl SlotError {
    /// Whether this failure should be shown to the person who asked for the emote.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, SlotError::CapacityExceeded { .. })
    }
}

/// Failures refreshing the catalog from a remote feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Catalog feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Catalog feed malformed: {0}")]
    FeedMalformed(String),
}

/// Failures reported by the slot-hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Platform slot capacity reached")]
    CapacityReached,

    #[error("Slot name already taken on the platform: {0}")]
    NameConflict(String),

    #[error("Platform rejected the request: {0}")]
    Rejected(String),

    #[error("Platform resource not found: {0}")]
    NotFound(String),

    #[error("Platform network error: {0}")]
    Network(String),
}

/// Failures during the impersonate-and-resend relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to create identity proxy: {0}")]
    ProxyCreation(ChannelError),

    #[error("Failed to send relayed message: {0}")]
    SendFailed(ChannelError),

    #[error("Relay sent but cleanup failed: {}", warnings.join("; "))]
    PartialFailure { warnings: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Missing permission: {0}")]
    MissingPermission(String),
}

/// Failures retrieving source image content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Bad response {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Content at {url} is not an image ({content_type})")]
    NotAnImage { url: String, content_type: String },
}
