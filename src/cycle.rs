//! Duty-cycle scheduler.
//!
//! The central state machine. Its state is the `countdown` field of the
//! persisted [`crate::record::CycleRecord`]: `countdown > 0` means primary-only wakes,
//! `countdown == 0` means a status (secondary) report is owed this wake.
//!
//! ```text
//! primary-only --(decrement, reaches 0)--> secondary-owed
//! secondary-owed --(secondary publish ok)--> primary-only (countdown = ratio - 1)
//! secondary-owed --(secondary publish failed)--> secondary-owed (retry next wake)
//! ```
//!
//! The primary report is attempted on every wake and is fire-and-forget with
//! respect to scheduling; only the secondary report gates the countdown. A
//! failed secondary never skips a cadence period, it only delays it.

use defmt::{info, warn};

use crate::link::LinkState;
use crate::publish::{BrokerLink, PublishBudget, publish};
use crate::record::{self, RecordSlot};

/// Wall-clock cadence, in minutes. Configuration only, never persisted: the
/// cycles-per-period ratio is rederived on every use, so a firmware update
/// that changes the cadence never meets a countdown scaled to a stale ratio.
#[derive(Clone, Copy, Debug)]
pub struct CadenceConfig {
    /// Deep-sleep interval between wakes; every wake sends a primary report.
    pub primary_interval_mins: u32,
    /// Target interval between secondary (status) reports.
    pub secondary_period_mins: u32,
}

impl CadenceConfig {
    /// Number of primary cycles per secondary period.
    pub const fn cycles_per_secondary(&self) -> i32 {
        (self.secondary_period_mins / self.primary_interval_mins) as i32
    }
}

/// The two prebuilt reports for this wake. Payload construction is the cycle
/// driver's job; the scheduler only decides what gets sent.
pub struct WakeReports<'a> {
    pub primary_topic: &'a str,
    pub primary_payload: &'a [u8],
    pub secondary_topic: &'a str,
    pub secondary_payload: &'a [u8],
}

/// What one wake episode accomplished.
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub struct WakeOutcome {
    pub primary_sent: bool,
    /// `None` when no secondary report was owed this wake.
    pub secondary: Option<bool>,
}

/// Run one wake episode: load the record, publish the primary report,
/// publish the secondary report if owed, persist the record exactly once.
///
/// Every context this needs is passed in and handed back through the slot;
/// nothing here outlives the wake episode. No failure path is fatal: all of
/// them fall through to the store and return control to the sleep
/// transition.
pub async fn run_wake<S, L, B>(
    slot: &mut S,
    link: &mut L,
    broker: &mut B,
    client_id: &str,
    cadence: &CadenceConfig,
    budget: &PublishBudget,
    reports: &WakeReports<'_>,
) -> WakeOutcome
where
    S: RecordSlot,
    L: LinkState,
    B: BrokerLink,
{
    let (mut rec, was_valid) = record::load(slot);
    if !was_valid {
        info!("cycle: first boot, status report owed immediately");
    }

    let primary_sent = publish(
        link,
        broker,
        client_id,
        reports.primary_topic,
        reports.primary_payload,
        budget,
    )
    .await;
    if !primary_sent {
        // Absorbed: the reading is lost, scheduling is untouched.
        warn!("cycle: primary report dropped");
    }

    let secondary = if rec.countdown <= 0 {
        // Below zero is only reachable by outside tampering with the slot;
        // treat it as owed instead of counting back up.
        let sent = publish(
            link,
            broker,
            client_id,
            reports.secondary_topic,
            reports.secondary_payload,
            budget,
        )
        .await;
        if sent {
            rec.countdown = cadence.cycles_per_secondary() - 1;
        } else {
            rec.countdown = 0;
            warn!("cycle: status report failed, retrying next wake");
        }
        Some(sent)
    } else {
        rec.countdown -= 1;
        None
    };

    record::store(slot, rec);
    info!("cycle: wakes until next status report: {}", rec.countdown);

    WakeOutcome {
        primary_sent,
        secondary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::DeliverError;
    use crate::record::{CycleRecord, RECORD_MARKER};
    use embassy_futures::block_on;
    use embassy_time::Duration;

    struct MemSlot {
        record: CycleRecord,
    }

    impl RecordSlot for MemSlot {
        fn read(&mut self) -> CycleRecord {
            self.record
        }

        fn write(&mut self, record: CycleRecord) {
            self.record = record;
        }
    }

    struct UpLink;

    impl LinkState for UpLink {
        fn is_up(&mut self) -> bool {
            true
        }
    }

    /// Broker that answers each `deliver` call from a script; repeats the
    /// last entry once the script runs out.
    struct ScriptedBroker {
        script: Vec<Result<(), DeliverError>>,
        calls: usize,
    }

    impl ScriptedBroker {
        fn playing(script: &[Result<(), DeliverError>]) -> Self {
            Self {
                script: script.to_vec(),
                calls: 0,
            }
        }

        fn always_ok() -> Self {
            Self::playing(&[Ok(())])
        }

        fn always_failing() -> Self {
            Self::playing(&[Err(DeliverError::Connect)])
        }
    }

    impl BrokerLink for ScriptedBroker {
        async fn deliver(
            &mut self,
            _client_id: &str,
            _topic: &str,
            _payload: &[u8],
        ) -> Result<(), DeliverError> {
            let outcome = self.script[self.calls.min(self.script.len() - 1)];
            self.calls += 1;
            outcome
        }
    }

    fn slot_with(countdown: i32) -> MemSlot {
        MemSlot {
            record: CycleRecord {
                marker: RECORD_MARKER,
                countdown,
            },
        }
    }

    fn cadence(primary_mins: u32, secondary_mins: u32) -> CadenceConfig {
        CadenceConfig {
            primary_interval_mins: primary_mins,
            secondary_period_mins: secondary_mins,
        }
    }

    const BUDGET: PublishBudget = PublishBudget {
        link_attempts: 2,
        link_retry_delay: Duration::from_millis(1),
        session_attempts: 2,
        session_retry_delay: Duration::from_millis(1),
    };

    const REPORTS: WakeReports<'static> = WakeReports {
        primary_topic: "tempmon/dev/temp-1/temperature",
        primary_payload: b"{\"sensor\":\"dev\",\"temperature\":21.50}",
        secondary_topic: "tempmon/dev/status",
        secondary_payload: b"{\"sensor\":\"dev\"}",
    };

    fn wake(slot: &mut MemSlot, broker: &mut ScriptedBroker, cad: &CadenceConfig) -> WakeOutcome {
        block_on(run_wake(
            slot,
            &mut UpLink,
            broker,
            "dev",
            cad,
            &BUDGET,
            &REPORTS,
        ))
    }

    #[test]
    fn positive_countdown_decrements_and_skips_secondary() {
        let mut slot = slot_with(5);
        let mut broker = ScriptedBroker::always_ok();

        let outcome = wake(&mut slot, &mut broker, &cadence(60, 24 * 60));

        assert_eq!(
            outcome,
            WakeOutcome {
                primary_sent: true,
                secondary: None
            }
        );
        assert_eq!(slot.record.countdown, 4);
        // Only the primary report went out.
        assert_eq!(broker.calls, 1);
    }

    #[test]
    fn secondary_success_resets_countdown_to_ratio_minus_one() {
        let mut slot = slot_with(0);
        let mut broker = ScriptedBroker::always_ok();

        let outcome = wake(&mut slot, &mut broker, &cadence(60, 24 * 60));

        assert_eq!(outcome.secondary, Some(true));
        assert_eq!(slot.record.countdown, 23);
    }

    #[test]
    fn ratio_of_one_keeps_secondary_owed_every_wake() {
        let mut slot = slot_with(0);
        let mut broker = ScriptedBroker::always_ok();

        let outcome = wake(&mut slot, &mut broker, &cadence(60, 60));

        assert_eq!(outcome.secondary, Some(true));
        assert_eq!(slot.record.countdown, 0);
    }

    #[test]
    fn failed_secondary_never_skips_the_cadence() {
        let mut slot = slot_with(0);
        let cad = cadence(60, 24 * 60);

        for _ in 0..5 {
            let mut broker = ScriptedBroker::always_failing();
            let outcome = wake(&mut slot, &mut broker, &cad);

            assert_eq!(outcome.secondary, Some(false));
            assert_eq!(slot.record.countdown, 0);
        }

        // Once a session goes through, the cadence restarts.
        let mut broker = ScriptedBroker::always_ok();
        let outcome = wake(&mut slot, &mut broker, &cad);
        assert_eq!(outcome.secondary, Some(true));
        assert_eq!(slot.record.countdown, 23);
    }

    #[test]
    fn primary_failure_never_alters_the_countdown() {
        let cad = cadence(60, 24 * 60);

        for start in [0, 3] {
            let mut ok_slot = slot_with(start);
            // Both publishes succeed.
            wake(&mut ok_slot, &mut ScriptedBroker::always_ok(), &cad);

            let mut failing_slot = slot_with(start);
            // Primary exhausts its two session attempts, secondary succeeds.
            let mut broker = ScriptedBroker::playing(&[
                Err(DeliverError::Send),
                Err(DeliverError::Send),
                Ok(()),
            ]);
            let outcome = wake(&mut failing_slot, &mut broker, &cad);

            assert!(!outcome.primary_sent);
            assert_eq!(failing_slot.record.countdown, ok_slot.record.countdown);
        }
    }

    #[test]
    fn first_boot_sends_status_regardless_of_cadence() {
        let mut slot = MemSlot {
            record: CycleRecord {
                marker: 0xA5,
                countdown: 999,
            },
        };
        let mut broker = ScriptedBroker::always_ok();

        let outcome = wake(&mut slot, &mut broker, &cadence(60, 24 * 60));

        assert_eq!(outcome.secondary, Some(true));
        assert!(slot.record.is_valid());
        assert_eq!(slot.record.countdown, 23);
        // Primary plus secondary.
        assert_eq!(broker.calls, 2);
    }

    #[test]
    fn tampered_negative_countdown_is_treated_as_owed() {
        let mut slot = slot_with(-7);
        let mut broker = ScriptedBroker::always_failing();

        let outcome = wake(&mut slot, &mut broker, &cadence(60, 24 * 60));

        assert_eq!(outcome.secondary, Some(false));
        assert_eq!(slot.record.countdown, 0);
    }
}
