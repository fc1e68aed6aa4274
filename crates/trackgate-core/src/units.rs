//! Conversions to and from canonical units.
//!
//! The canonical speed unit is knots and the canonical length unit is
//! meters. Plugins convert at extraction time, so a [`crate::PositionRecord`]
//! never carries wire-native units.

const KNOTS_PER_KPH: f64 = 0.539_956_803_455_723_7;
const KNOTS_PER_MPH: f64 = 0.868_976_241_900_647_9;
const KNOTS_PER_MPS: f64 = 1.943_844_492_440_605;
const METERS_PER_FOOT: f64 = 0.3048;
const METERS_PER_MILE: f64 = 1609.344;

/// Knots from kilometers per hour.
pub fn knots_from_kph(value: f64) -> f64 {
    value * KNOTS_PER_KPH
}

/// Knots from miles per hour.
pub fn knots_from_mph(value: f64) -> f64 {
    value * KNOTS_PER_MPH
}

/// Knots from meters per second.
pub fn knots_from_mps(value: f64) -> f64 {
    value * KNOTS_PER_MPS
}

/// Knots from centimeters per second, seen in some binary protocols.
pub fn knots_from_cps(value: f64) -> f64 {
    knots_from_mps(value / 100.0)
}

/// Kilometers per hour from knots.
pub fn kph_from_knots(value: f64) -> f64 {
    value / KNOTS_PER_KPH
}

/// Meters per second from knots.
pub fn mps_from_knots(value: f64) -> f64 {
    value / KNOTS_PER_MPS
}

/// Meters from feet.
pub fn meters_from_feet(value: f64) -> f64 {
    value * METERS_PER_FOOT
}

/// Meters from miles.
pub fn meters_from_miles(value: f64) -> f64 {
    value * METERS_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 0.001,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_speed_conversions() {
        assert_close(knots_from_kph(100.0), 53.9957);
        assert_close(knots_from_mph(100.0), 86.8976);
        assert_close(knots_from_mps(10.0), 19.4384);
        assert_close(knots_from_cps(1000.0), 19.4384);
    }

    #[test]
    fn test_speed_round_trip() {
        assert_close(kph_from_knots(knots_from_kph(72.5)), 72.5);
        assert_close(mps_from_knots(knots_from_mps(5.1)), 5.1);
    }

    #[test]
    fn test_length_conversions() {
        assert_close(meters_from_feet(1000.0), 304.8);
        assert_close(meters_from_miles(1.0), 1609.344);
    }
}
