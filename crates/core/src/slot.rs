//! Slot domain types.
//!
//! A slot is one provisioned platform resource (a custom emoji) mirroring a
//! catalog image. The platform owns the resource; we only hold its handle.

use serde::{Deserialize, Serialize};

/// Opaque reference to a platform-owned slot.
///
/// Used only for later delete and render calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotHandle {
    /// Platform-assigned identifier
    pub id: String,

    /// Name the slot was registered under on the platform
    pub platform_name: String,
}

/// A provisioned slot as tracked by the slot store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Logical key (catalog name), unique within the store
    pub name: String,

    /// Platform handle for render/delete
    pub handle: SlotHandle,

    /// Derived from the source content type at creation time
    pub is_animated: bool,

    /// Times the slot was resolved for a message or command
    #[serde(default)]
    pub use_count: u64,
}

impl Slot {
    /// Create a fresh slot with a zero use count.
    pub fn new(name: impl Into<String>, handle: SlotHandle, is_animated: bool) -> Self {
        Self {
            name: name.into(),
            handle,
            is_animated,
            use_count: 0,
        }
    }

    /// The canonical in-message reference (`<:name:id>` / `<a:name:id>`).
    pub fn reference(&self) -> String {
        let prefix = if self.is_animated { "a" } else { "" };
        format!("<{prefix}:{}:{}>", self.handle.platform_name, self.handle.id)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference())
    }
}

/// Whether a source content type denotes an animated image.
pub fn is_animated_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .ends_with("gif")
}
