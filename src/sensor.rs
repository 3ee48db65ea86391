//! Analog front-end conversions.
//!
//! Pure raw-ADC-to-engineering-unit math; the ADC itself is sampled by the
//! firmware binary. Calibrated for a TMP36-style analog temperature sensor
//! (500 mV at 0 °C, 10 mV/°C) and a 2:1 battery voltage divider, both read
//! through a 12-bit ADC.

/// ADC full-scale reading.
pub const ADC_MAX: u16 = 4095;
/// ADC full-scale voltage in millivolts at the configured attenuation.
pub const ADC_FULL_SCALE_MV: u32 = 3300;

/// Sensor output at 0 °C, millivolts.
const TEMP_ZERO_C_MV: f32 = 500.0;
/// Sensor slope, millivolts per °C.
const TEMP_MV_PER_C: f32 = 10.0;

/// Battery divider ratio (two equal resistors).
const BATTERY_DIVIDER: u16 = 2;

/// Millivolts at the ADC pin for a raw reading.
pub fn raw_to_millivolts(raw: u16) -> u16 {
    let raw = raw.min(ADC_MAX);
    ((raw as u32 * ADC_FULL_SCALE_MV) / ADC_MAX as u32) as u16
}

/// Temperature in °C for a raw reading of the sensor pin.
pub fn raw_to_celsius(raw: u16) -> f32 {
    let mv = raw_to_millivolts(raw) as f32;
    (mv - TEMP_ZERO_C_MV) / TEMP_MV_PER_C
}

/// Battery voltage in millivolts for a raw reading of the divider pin.
pub fn raw_to_battery_millivolts(raw: u16) -> u16 {
    raw_to_millivolts(raw).saturating_mul(BATTERY_DIVIDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_maps_to_reference_voltage() {
        assert_eq!(raw_to_millivolts(ADC_MAX), 3300);
        assert_eq!(raw_to_millivolts(0), 0);
    }

    #[test]
    fn out_of_range_raw_is_clamped() {
        assert_eq!(raw_to_millivolts(u16::MAX), 3300);
    }

    #[test]
    fn room_temperature_conversion() {
        // 750 mV ≈ 25 °C; raw for 750 mV = 750 * 4095 / 3300 ≈ 931.
        let celsius = raw_to_celsius(931);
        assert!((celsius - 25.0).abs() < 0.5, "got {}", celsius);
    }

    #[test]
    fn sub_zero_conversion() {
        // 400 mV = -10 °C; raw ≈ 496.
        let celsius = raw_to_celsius(496);
        assert!((celsius + 10.0).abs() < 0.5, "got {}", celsius);
    }

    #[test]
    fn battery_divider_is_undone() {
        // 1650 mV at the pin = 3300 mV at the battery; raw ≈ 2048.
        let mv = raw_to_battery_millivolts(2048);
        assert!((3290..=3310).contains(&mv), "got {}", mv);
    }
}
