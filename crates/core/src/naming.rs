//! Slot naming convention shared by the cache, the pipeline and the adapters.
//!
//! Platform-side slots are registered as `bot_name + separator + logical_name`.
//! Tokens carrying that prefix are never substitution candidates, otherwise the
//! pipeline would try to resolve its own references back into itself.

/// Naming scheme for bot-owned slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNaming {
    bot_name: String,
    separator: String,
}

impl SlotNaming {
    pub fn new(bot_name: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            separator: separator.into(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// `Kappa` → `iwashiding__Kappa`
    pub fn platform_name(&self, logical: &str) -> String {
        format!("{}{}{}", self.bot_name, self.separator, logical)
    }

    /// Inverse of [`platform_name`](Self::platform_name). `None` for slots the bot does not own.
    pub fn logical_name<'a>(&self, platform_name: &'a str) -> Option<&'a str> {
        platform_name
            .strip_prefix(self.bot_name.as_str())?
            .strip_prefix(self.separator.as_str())
            .filter(|rest| !rest.is_empty())
    }

    /// Whether a token name belongs to the bot's own naming scheme.
    pub fn is_reserved(&self, token_name: &str) -> bool {
        token_name
            .strip_prefix(self.bot_name.as_str())
            .is_some_and(|rest| rest.starts_with(self.separator.as_str()))
    }

    /// Whether `name` can be referenced as a `:name:` token at all: word
    /// characters only, and outside the reserved prefix.
    pub fn is_addressable(&self, name: &str) -> bool {
        !name.is_empty()
            && name.chars().all(|c| c.is_alphanumeric() || c == '_')
            && !self.is_reserved(name)
    }
}

impl Default for SlotNaming {
    fn default() -> Self {
        Self::new("iwashiding", "__")
    }
}
