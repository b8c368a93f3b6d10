//! SlotPlatform trait — the abstraction over the slot-hosting platform.
//!
//! The platform owns the slot resources (custom emojis on a Discord guild).
//! The cache only creates, deletes and enumerates them through this trait;
//! capacity is a platform-reported limit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::slot::SlotHandle;

/// A slot the platform reports as already provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratedSlot {
    /// Platform-side name (including any bot prefix)
    pub platform_name: String,

    pub handle: SlotHandle,

    pub is_animated: bool,
}

/// Slot primitives delegated to the hosting platform.
///
/// Implementations own their own retry/backoff; every failure is reported as
/// one of the [`PlatformError`] kinds.
#[async_trait]
pub trait SlotPlatform: Send + Sync {
    /// Human-readable platform name (e.g., "discord").
    fn name(&self) -> &str;

    /// Maximum number of resident slots the platform allows.
    fn capacity(&self) -> usize;

    /// Create a slot from raw image bytes.
    ///
    /// Fails with [`PlatformError::CapacityReached`] when the platform is full
    /// and [`PlatformError::NameConflict`] when the name is taken.
    async fn create_slot(
        &self,
        platform_name: &str,
        image: &[u8],
        is_animated: bool,
    ) -> std::result::Result<SlotHandle, PlatformError>;

    /// Delete a previously created slot.
    async fn delete_slot(&self, handle: &SlotHandle) -> std::result::Result<(), PlatformError>;

    /// Enumerate every slot currently provisioned on the platform.
    async fn enumerate_slots(&self) -> std::result::Result<Vec<EnumeratedSlot>, PlatformError>;
}
