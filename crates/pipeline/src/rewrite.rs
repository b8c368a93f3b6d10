//! Message rewrite pipeline.
//!
//! 1. Extract emote tokens (reserved names excluded); none → untouched
//! 2. `ensure` every distinct name concurrently, isolating failures
//! 3. Substitute resolved tokens once every resolution has finished
//! 4. Relay under the author's identity, then retract the original
//!
//! The relay runs on its own task: once the send has been issued it runs to
//! completion even if the caller stops waiting.

use chrono::Utc;
use emoterelay_cache::SlotCache;
use emoterelay_core::channel::{Author, InboundMessage, MessageRef, RelayTransport};
use emoterelay_core::error::{ChannelError, RelayError, SlotError};
use emoterelay_core::event::{DomainEvent, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::token;

/// How relayed messages identify themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayIdentity {
    /// Appended to the author's display name
    pub tag: String,
    /// Name of the transient identity proxy
    pub proxy_name: String,
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// No tokens; the message was left alone
    Untouched,
    /// Tokens were found but none could be resolved; nothing was relayed
    Unresolved { unresolved: Vec<(String, SlotError)> },
    /// The rewritten message was relayed
    Relayed(RelayReport),
}

#[derive(Debug)]
pub struct RelayReport {
    /// The text that was sent
    pub text: String,
    /// Distinct names that were substituted
    pub substituted: Vec<String>,
    /// Distinct names left literal, with the reason
    pub unresolved: Vec<(String, SlotError)>,
    /// The relayed message
    pub relayed: MessageRef,
    /// Cleanup steps that failed after a successful send
    pub warnings: Vec<String>,
}

impl RelayReport {
    /// The cleanup failures as a [`RelayError::PartialFailure`], if any.
    pub fn partial_failure(&self) -> Option<RelayError> {
        (!self.warnings.is_empty()).then(|| RelayError::PartialFailure {
            warnings: self.warnings.clone(),
        })
    }
}

pub struct RewritePipeline {
    cache: Arc<SlotCache>,
    transport: Arc<dyn RelayTransport>,
    identity: RelayIdentity,
    events: Option<Arc<EventBus>>,
}

impl RewritePipeline {
    pub fn new(
        cache: Arc<SlotCache>,
        transport: Arc<dyn RelayTransport>,
        identity: RelayIdentity,
    ) -> Self {
        Self {
            cache,
            transport,
            identity,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Rewrite and relay one message.
    ///
    /// Per-token failures never abort the message; only failures before the
    /// relayed copy exists are returned as errors, and in that case the
    /// original message is left in place.
    pub async fn process(&self, message: &InboundMessage) -> Result<ProcessOutcome, RelayError> {
        let tokens = token::extract(&message.content, self.cache.naming());
        if tokens.is_empty() {
            return Ok(ProcessOutcome::Untouched);
        }

        let names = token::distinct_names(&tokens);
        debug!(names = ?names, "Found emote tokens");

        // Held until the relay completes so no sibling slot is evicted
        let _pinned = self.cache.pin(&names);
        let results =
            futures::future::join_all(names.iter().map(|name| self.cache.ensure(name))).await;

        let mut resolved = HashMap::new();
        let mut substituted = Vec::new();
        let mut unresolved = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(slot) => {
                    resolved.insert(name.clone(), slot.reference());
                    substituted.push(name);
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Emote left unsubstituted");
                    unresolved.push((name, e));
                }
            }
        }

        if resolved.is_empty() {
            return Ok(ProcessOutcome::Unresolved { unresolved });
        }

        let (text, occurrences) = token::substitute(&message.content, &resolved);
        debug!(original = %message.content, edited = %text, occurrences, "Rewrote message");

        let receipt = tokio::spawn(relay(
            self.transport.clone(),
            message.location.clone(),
            message.author.clone(),
            text.clone(),
            self.identity.clone(),
        ))
        .await
        .map_err(|e| {
            RelayError::SendFailed(ChannelError::ConnectionLost(format!(
                "relay task did not complete: {e}"
            )))
        })??;

        info!(
            channel = %message.channel_id(),
            substituted = substituted.len(),
            unresolved = unresolved.len(),
            "Relayed message"
        );
        if let Some(events) = &self.events {
            events.publish(DomainEvent::MessageRelayed {
                channel: message.channel_id().to_string(),
                substituted: substituted.len(),
                unresolved: unresolved.len(),
                timestamp: Utc::now(),
            });
        }

        Ok(ProcessOutcome::Relayed(RelayReport {
            text,
            substituted,
            unresolved,
            relayed: receipt.message,
            warnings: receipt.warnings,
        }))
    }
}

struct RelayReceipt {
    message: MessageRef,
    warnings: Vec<String>,
}

/// Impersonate-and-resend, then retract the original.
///
/// Nothing is deleted unless the send succeeded. Cleanup failures after a
/// successful send are reported as warnings and never retried.
async fn relay(
    transport: Arc<dyn RelayTransport>,
    original: MessageRef,
    author: Author,
    text: String,
    identity: RelayIdentity,
) -> Result<RelayReceipt, RelayError> {
    let proxy = transport
        .create_identity_proxy(&original.channel_id, &identity.proxy_name)
        .await
        .map_err(RelayError::ProxyCreation)?;
    debug!(proxy = %proxy.id, "Created identity proxy");

    let display_name = format!("{}{}", author.display_name, identity.tag);
    let message = match transport
        .send_as_identity(&proxy, &display_name, author.avatar_url.as_deref(), &text)
        .await
    {
        Ok(message) => message,
        Err(e) => {
            if let Err(cleanup) = transport.delete_identity_proxy(&proxy).await {
                warn!(proxy = %proxy.id, error = %cleanup, "Leaked identity proxy after failed send");
            }
            return Err(RelayError::SendFailed(e));
        }
    };

    let mut warnings = Vec::new();
    if let Err(e) = transport.delete_message(&original).await {
        warn!(message = %original.message_id, error = %e, "Original message was not retracted");
        warnings.push(format!(
            "original message {} not deleted: {e}",
            original.message_id
        ));
    }
    if let Err(e) = transport.delete_identity_proxy(&proxy).await {
        warn!(proxy = %proxy.id, error = %e, "Identity proxy was not deleted");
        warnings.push(format!("identity proxy {} not deleted: {e}", proxy.id));
    }

    Ok(RelayReceipt { message, warnings })
}
