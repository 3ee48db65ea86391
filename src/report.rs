//! Topic and payload builders for the two report channels.
//!
//! Content topics carry the high-frequency temperature readings; the status
//! topic carries the low-frequency device health report. JSON is built by
//! hand into heapless strings (no serde_json in no_std).

use core::fmt::Write;
use heapless::String;

/// Firmware identity embedded in the status payload.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Content topic: `tempmon/{device_id}/{sensor_id}/temperature`
pub fn build_content_topic(device_id: &str, sensor_id: &str) -> String<128> {
    let mut topic = String::new();
    write!(topic, "tempmon/{}/{}/temperature", device_id, sensor_id).ok();
    topic
}

/// Status topic: `tempmon/{device_id}/status`
pub fn build_status_topic(device_id: &str) -> String<64> {
    let mut topic = String::new();
    write!(topic, "tempmon/{}/status", device_id).ok();
    topic
}

/// Primary report payload: `{"sensor":...,"temperature":...}`
pub fn build_content_payload(device_id: &str, temperature_c: f32) -> String<192> {
    let mut payload = String::new();
    write!(payload, "{{").ok();
    write!(payload, "\"sensor\":\"{}\",", device_id).ok();
    write!(payload, "\"temperature\":{:.2}", temperature_c).ok();
    write!(payload, "}}").ok();
    payload
}

/// Secondary (status) report payload. Carries the content topic so the
/// backend can find the device's readings, plus battery, link quality and
/// firmware identity. Link quality is reported here and nowhere else; it
/// never feeds scheduling.
pub fn build_status_payload(
    device_id: &str,
    content_topic: &str,
    battery_mv: u16,
    rssi_dbm: i8,
) -> String<256> {
    let mut payload = String::new();
    write!(payload, "{{").ok();
    write!(payload, "\"sensor\":\"{}\",", device_id).ok();
    write!(payload, "\"topic\":\"{}\",", content_topic).ok();
    write!(payload, "\"battery\":{},", battery_mv).ok();
    write!(payload, "\"rssi\":{},", rssi_dbm).ok();
    write!(payload, "\"firmware\":\"{}\"", FIRMWARE_VERSION).ok();
    write!(payload, "}}").ok();
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_topic_shape() {
        let topic = build_content_topic("tempmon-a1b2c3", "temp-1");
        assert_eq!(topic.as_str(), "tempmon/tempmon-a1b2c3/temp-1/temperature");
    }

    #[test]
    fn status_topic_shape() {
        let topic = build_status_topic("tempmon-a1b2c3");
        assert_eq!(topic.as_str(), "tempmon/tempmon-a1b2c3/status");
    }

    #[test]
    fn content_payload_is_flat_json() {
        let payload = build_content_payload("tempmon-a1b2c3", 21.5);
        assert_eq!(
            payload.as_str(),
            "{\"sensor\":\"tempmon-a1b2c3\",\"temperature\":21.50}"
        );
    }

    #[test]
    fn content_payload_handles_negative_readings() {
        let payload = build_content_payload("dev", -8.25);
        assert_eq!(payload.as_str(), "{\"sensor\":\"dev\",\"temperature\":-8.25}");
    }

    #[test]
    fn status_payload_carries_identity_and_health() {
        let payload = build_status_payload("dev", "tempmon/dev/temp-1/temperature", 2970, -61);
        let expected_prefix =
            "{\"sensor\":\"dev\",\"topic\":\"tempmon/dev/temp-1/temperature\",\"battery\":2970,\"rssi\":-61,\"firmware\":\"";
        assert!(payload.as_str().starts_with(expected_prefix));
        assert!(payload.as_str().ends_with("\"}"));
        assert!(payload.as_str().contains(FIRMWARE_VERSION));
    }
}
