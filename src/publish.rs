//! Publish engine: bounded-retry connect-and-publish.
//!
//! One message, one topic, two retry layers: the link gate (see
//! [`crate::link`]) and the broker-session loop below. Every session attempt
//! starts from a clean slate; nothing is queued locally, so a message that
//! exhausts its budget is simply lost. Every loop here is retry-count
//! bounded, which keeps the worst-case blocking time of a wake episode
//! deterministic (see [`PublishBudget::worst_case`]).

use defmt::{info, warn};
use embassy_time::{Duration, Timer};

use crate::link::{LinkState, ensure_link_up};

/// Why one broker-session attempt failed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum DeliverError {
    /// Broker hostname could not be resolved.
    Dns,
    /// TCP connection to the broker failed.
    Tcp,
    /// The broker rejected the session (CONNECT handshake).
    Connect,
    /// The serialized message exceeds the transport frame limit. Retrying
    /// the same payload fails identically.
    Oversized,
    /// The send itself was rejected after a successful handshake.
    Send,
}

/// One fresh broker session per call.
#[allow(async_fn_in_trait)]
pub trait BrokerLink {
    /// Establish a session under the stable, device-derived `client_id`,
    /// send `payload` to `topic`, and on success service the session for a
    /// short flush window so the transport drains before power drops.
    async fn deliver(
        &mut self,
        client_id: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), DeliverError>;
}

/// Retry budgets and delays for one publish call. All four values are
/// configuration, never persisted.
#[derive(Clone, Copy, Debug)]
pub struct PublishBudget {
    /// Link polls before giving up.
    pub link_attempts: u32,
    /// Delay between link polls.
    pub link_retry_delay: Duration,
    /// Fresh broker sessions before giving up.
    pub session_attempts: u32,
    /// Delay between failed session attempts.
    pub session_retry_delay: Duration,
}

impl PublishBudget {
    /// Upper bound on one publish call's blocking time:
    /// `link_attempts * link_retry_delay + session_attempts *
    /// session_retry_delay + flush_window`. Worst-case battery draw per wake
    /// is derived from this, so both retry loops must stay count-bounded.
    pub fn worst_case(&self, flush_window: Duration) -> Duration {
        let ticks = self.link_retry_delay.as_ticks() * u64::from(self.link_attempts)
            + self.session_retry_delay.as_ticks() * u64::from(self.session_attempts)
            + flush_window.as_ticks();
        Duration::from_ticks(ticks)
    }
}

/// Deliver one message with bounded retries. Returns `true` on the first
/// successful session attempt without consuming the remaining budget;
/// `false` once either budget is exhausted.
///
/// No session attempt is made while the link is down: a connect against a
/// dead radio would waste a retry the payload could have used later.
pub async fn publish<L: LinkState, B: BrokerLink>(
    link: &mut L,
    broker: &mut B,
    client_id: &str,
    topic: &str,
    payload: &[u8],
    budget: &PublishBudget,
) -> bool {
    if !ensure_link_up(link, budget.link_attempts, budget.link_retry_delay).await {
        warn!(
            "publish: link down, dropping '{}' ({} bytes)",
            topic,
            payload.len()
        );
        return false;
    }

    for attempt in 1..=budget.session_attempts {
        match broker.deliver(client_id, topic, payload).await {
            Ok(()) => {
                info!(
                    "publish: '{}' delivered, {} bytes, attempt {}",
                    topic,
                    payload.len(),
                    attempt
                );
                return true;
            }
            Err(e) => {
                // Oversized payloads fail identically on a fresh session but
                // still consume an attempt; the budget stays the hard bound.
                warn!(
                    "publish: attempt {}/{} for '{}' failed: {}",
                    attempt, budget.session_attempts, topic, e
                );
                if attempt < budget.session_attempts {
                    Timer::after(budget.session_retry_delay).await;
                }
            }
        }
    }

    warn!("publish: session budget exhausted for '{}'", topic);
    false
}
