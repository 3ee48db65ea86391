//! tempmon: battery-powered duty-cycle temperature reporter.
//!
//! The device wakes on an RTC timer, reads a sensor, publishes a temperature
//! report over MQTT, occasionally publishes a richer status report, and goes
//! back into deep sleep. Everything restarts from zero on each wake; the only
//! state that survives is a small [`record::CycleRecord`] kept in RTC fast
//! memory, which drives the status-report cadence.
//!
//! The library is hardware-agnostic: the binary (feature `firmware`) supplies
//! the RTC memory slot, the Wi-Fi link, and the broker session behind the
//! seam traits [`record::RecordSlot`], [`link::LinkState`], and
//! [`publish::BrokerLink`].

#![cfg_attr(not(test), no_std)]

pub mod cycle;
pub mod link;
pub mod mqtt;
pub mod publish;
pub mod record;
pub mod report;
pub mod sensor;

// Host unit tests need a defmt sink to link against.
#[cfg(test)]
mod host_logger {
    #[defmt::global_logger]
    struct HostLogger;

    unsafe impl defmt::Logger for HostLogger {
        fn acquire() {}
        unsafe fn flush() {}
        unsafe fn release() {}
        unsafe fn write(_bytes: &[u8]) {}
    }
}
