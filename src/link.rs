//! Connectivity gate.
//!
//! Publishing is only attempted once the radio layer reports an established
//! link. The expected case is link-already-warm (the device was suspended,
//! not powered off), so this is a plain bounded poll with no backoff and no
//! jitter: succeed fast or fail fast and save the battery.

use defmt::{info, warn};
use embassy_time::{Duration, Timer};

/// Radio/link layer as seen by the gate. The firmware wraps the network
/// stack; tests wrap a counter.
pub trait LinkState {
    fn is_up(&mut self) -> bool;
}

/// Wait for the link to come up, polling at most `max_attempts` times with
/// `per_attempt_delay` between polls. Returns immediately when the link is
/// already up; returns `false` once the budget is exhausted.
pub async fn ensure_link_up<L: LinkState>(
    link: &mut L,
    max_attempts: u32,
    per_attempt_delay: Duration,
) -> bool {
    for attempt in 1..=max_attempts {
        if link.is_up() {
            if attempt > 1 {
                info!("link: up after {} polls", attempt);
            }
            return true;
        }
        Timer::after(per_attempt_delay).await;
    }
    warn!("link: still down after {} polls, giving up", max_attempts);
    false
}
