//! Channels whose provider integration lives outside the relay.
//!
//! The attempt is recorded as `accepted` rather than `sent` so the audit
//! log never claims a delivery nobody confirmed.

use async_trait::async_trait;
use tracing::info;

use super::{ChannelSender, DeliveryOutcome};
use crate::error::DispatchError;
use crate::routing::model::{Action, ChannelKind};

/// Note attached to every accepted handoff.
pub const PENDING_PROVIDER_NOTE: &str = "accepted, provider integration pending";

/// Records intent for a channel without a configured provider.
pub struct PendingProviderSender {
    channel: ChannelKind,
}

impl PendingProviderSender {
    pub fn new(channel: ChannelKind) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for PendingProviderSender {
    fn channel(&self) -> ChannelKind {
        self.channel
    }

    async fn send(&self, action: &Action, content: &str) -> Result<DeliveryOutcome, DispatchError> {
        info!(
            channel = %self.channel,
            destination = action.destination(),
            chars = content.chars().count(),
            "Handing off to pending provider integration"
        );
        Ok(DeliveryOutcome::Accepted {
            note: PENDING_PROVIDER_NOTE.to_string(),
        })
    }
}
