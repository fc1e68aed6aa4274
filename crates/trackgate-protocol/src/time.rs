//! Composition of wire date/time fields into UTC instants.

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Builder for an absolute UTC instant from separately captured calendar
/// fields. Two-digit years are normalized to 2000+YY; trackers predating
/// the year 2000 do not exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeBuilder {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    millisecond: u32,
}

impl DateTimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the current UTC date, for protocols that send time-of-day
    /// only.
    pub fn today() -> Self {
        let now = Utc::now();
        Self::new().date(now.year(), now.month(), now.day())
    }

    pub fn date(mut self, year: i32, month: u32, day: u32) -> Self {
        self.year = if (0..100).contains(&year) { 2000 + year } else { year };
        self.month = month;
        self.day = day;
        self
    }

    /// Date fields in reversed (day-first) order.
    pub fn date_reverse(self, day: u32, month: u32, year: i32) -> Self {
        self.date(year, month, day)
    }

    pub fn time(mut self, hour: u32, minute: u32, second: u32) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self
    }

    /// Time fields in reversed (second-first) order.
    pub fn time_reverse(self, second: u32, minute: u32, hour: u32) -> Self {
        self.time(hour, minute, second)
    }

    pub fn millisecond(mut self, millisecond: u32) -> Self {
        self.millisecond = millisecond;
        self
    }

    /// Resolve to an instant; `None` when the fields do not form a valid
    /// calendar date or time.
    pub fn build(self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        )
        .single()
        .map(|t| t + chrono::Duration::milliseconds(self.millisecond as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_two_digit_year() {
        let time = DateTimeBuilder::new().date(17, 5, 19).time(11, 5, 40).build().unwrap();
        assert_eq!(time, Utc.with_ymd_and_hms(2017, 5, 19, 11, 5, 40).unwrap());
    }

    #[test]
    fn test_four_digit_year_passes_through() {
        let time = DateTimeBuilder::new().date(1999, 12, 31).time(23, 59, 59).build().unwrap();
        assert_eq!(time.year(), 1999);
    }

    #[test]
    fn test_reversed_field_orders() {
        let forward = DateTimeBuilder::new().date(17, 5, 19).time(11, 5, 40).build();
        let reversed = DateTimeBuilder::new()
            .date_reverse(19, 5, 17)
            .time_reverse(40, 5, 11)
            .build();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_invalid_date_is_none() {
        assert_eq!(DateTimeBuilder::new().date(17, 2, 30).time(0, 0, 0).build(), None);
        assert_eq!(DateTimeBuilder::new().date(17, 1, 1).time(25, 0, 0).build(), None);
    }

    #[test]
    fn test_milliseconds() {
        let time = DateTimeBuilder::new()
            .date(17, 5, 19)
            .time(11, 5, 40)
            .millisecond(250)
            .build()
            .unwrap();
        assert_eq!(time.timestamp_subsec_millis(), 250);
    }
}
