//! Event fanout to lobby members

use crate::error::FanoutError;
use crate::lobby::LobbyRegistry;
use crate::session::encode_frame;
use log::{debug, error, warn};
use shared::Event;
use std::time::Duration;

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers `events` as one frame to every current member
///
/// Recipients are snapshotted before the first send. Each send is bounded by
/// `timeout`; a failed or timed-out delivery is logged and does not stop the
/// remaining ones. The failing session stays registered until its own
/// connection closes.
pub async fn broadcast(
    registry: &LobbyRegistry,
    events: Vec<Event>,
    timeout: Duration,
) -> FanoutReport {
    let recipients = registry.recipients();
    let mut report = FanoutReport::default();

    if recipients.is_empty() {
        return report;
    }

    debug!("broadcasting to {} members: {:?}", recipients.len(), events);
    let frame = match encode_frame(events) {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to encode broadcast: {}", e);
            report.failed = recipients.len();
            return report;
        }
    };

    for outbound in &recipients {
        match outbound.deliver(frame.clone(), timeout).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Failed to deliver to {}: {}", outbound.identity(), e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Delivers `events` to a single member, logging a failed delivery
pub async fn unicast(
    registry: &LobbyRegistry,
    identity: &str,
    events: Vec<Event>,
    timeout: Duration,
) -> Result<(), FanoutError> {
    let Some(session) = registry.get(identity) else {
        return Err(FanoutError::TransportGone {
            identity: identity.to_string(),
        });
    };

    let result = session.send(events, timeout).await;
    if let Err(e) = &result {
        warn!("Failed to deliver to {}: {}", identity, e);
    }
    result
}
