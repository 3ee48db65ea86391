//! Persistent cycle record.
//!
//! The one piece of state that outlives a wake episode. It lives in a memory
//! region that keeps its contents across deep sleep but not across a cold
//! power cycle, so validity is tracked with a sentinel byte: a mismatch means
//! "first boot or anomalous reset" and the record self-heals to its zero
//! state. That is the expected signal, not an error.

use defmt::{info, warn};

/// Sentinel byte marking a record written by a prior wake episode.
pub const RECORD_MARKER: u8 = b'W';

/// Fixed-size record kept in the durable slot. Read whole, written whole;
/// partial-field updates are not permitted.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub struct CycleRecord {
    /// Must equal [`RECORD_MARKER`] for the record to be trusted.
    pub marker: u8,
    /// Primary cycles remaining before the next status report is owed.
    pub countdown: i32,
}

impl CycleRecord {
    /// An uninitialized record, as RTC memory presents after power loss.
    pub const fn empty() -> Self {
        Self {
            marker: 0,
            countdown: 0,
        }
    }

    /// A valid record with the countdown at zero: status report owed on the
    /// very next wake.
    pub const fn reset() -> Self {
        Self {
            marker: RECORD_MARKER,
            countdown: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.marker == RECORD_MARKER
    }
}

/// Durable key-value slot holding exactly one [`CycleRecord`].
///
/// The firmware backs this with RTC fast memory; tests back it with a plain
/// field. Implementations must read and write the whole record atomically
/// from the caller's point of view.
pub trait RecordSlot {
    fn read(&mut self) -> CycleRecord;
    fn write(&mut self, record: CycleRecord);
}

/// Read the record from the slot. On sentinel mismatch the slot is
/// reinitialized and rewritten before returning, and the flag is `false`.
pub fn load(slot: &mut impl RecordSlot) -> (CycleRecord, bool) {
    let record = slot.read();
    if record.is_valid() {
        info!("record: loaded {}", record);
        (record, true)
    } else {
        warn!("record: marker mismatch ({}), reinitializing", record.marker);
        let fresh = CycleRecord::reset();
        slot.write(fresh);
        (fresh, false)
    }
}

/// Write the record back. The sentinel is forced to the valid value so a
/// caller can never persist an unmarked record.
pub fn store(slot: &mut impl RecordSlot, mut record: CycleRecord) {
    record.marker = RECORD_MARKER;
    info!("record: storing {}", record);
    slot.write(record);
}
