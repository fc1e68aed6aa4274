//! Sequential typed access to one matched input.
//!
//! A [`Parser`] walks the captured groups of one successful
//! [`crate::Pattern`] match in declaration order. Optional groups that did
//! not participate in the match yield `None`; the `_or` accessor variants
//! consume them silently and return the supplied default (several legacy
//! protocols treat an absent numeric field as 0, and that behavior is kept).
//!
//! Consuming more fields than the pattern captured is a contract violation
//! on the caller's side and panics.

use crate::time::DateTimeBuilder;
use chrono::{DateTime, Utc};
use regex::Captures;

/// Coordinate encodings accepted by [`Parser::next_coordinate`].
///
/// `Deg` is whole or decimal degrees, `Min` is decimal minutes, `MinMin` is
/// minutes captured as two groups (integer and fractional part), `Hem` is a
/// hemisphere letter (`N`/`S`/`E`/`W`) or sign character. The variant name
/// lists the captured groups in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFormat {
    DegDeg,
    DegDegHem,
    DegHem,
    DegMinMin,
    DegMinHem,
    DegMinMinHem,
    HemDeg,
    HemDegMin,
    HemDegMinMin,
}

/// Date/time group orders accepted by [`Parser::next_date_time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeFormat {
    /// Time only; date taken from the current day
    Hms,
    /// Reversed time only
    Smh,
    HmsYmd,
    HmsDmy,
    SmhYmd,
    SmhDmy,
    DmyHms,
    YmdHms,
}

/// Cursor over the captures of one match.
pub struct Parser<'a> {
    groups: Vec<Option<&'a str>>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn from_captures(captures: Captures<'a>) -> Self {
        let groups = captures
            .iter()
            .skip(1) // group 0 is the whole match
            .map(|m| m.map(|m| m.as_str()))
            .collect();
        Self { groups, position: 0 }
    }

    /// Skip `count` captured groups without looking at them.
    pub fn skip(&mut self, count: usize) {
        self.position += count;
    }

    /// Whether the next group captured a non-empty value. Does not consume
    /// on success; on failure the group (or `n` related groups, see
    /// [`Parser::has_next_n`]) is skipped.
    pub fn has_next(&mut self) -> bool {
        self.has_next_n(1)
    }

    /// Like [`Parser::has_next`], but skips `n` groups when the next one is
    /// absent. Used for alternate branches that capture several groups.
    pub fn has_next_n(&mut self, n: usize) -> bool {
        match self.groups.get(self.position) {
            Some(Some(value)) if !value.is_empty() => true,
            Some(_) => {
                self.position += n;
                false
            }
            // Past the last group: nothing left to branch on.
            None => false,
        }
    }

    /// Consume and return the next captured group. `None` when the group did
    /// not participate in the match.
    ///
    /// # Panics
    ///
    /// Panics when every captured group has already been consumed.
    pub fn next(&mut self) -> Option<&'a str> {
        let value = self.groups[self.position];
        self.position += 1;
        value.filter(|v| !v.is_empty())
    }

    pub fn next_int(&mut self) -> Option<i64> {
        self.next_radix(10)
    }

    pub fn next_int_or(&mut self, default: i64) -> i64 {
        self.next_int().unwrap_or(default)
    }

    pub fn next_hex_int(&mut self) -> Option<i64> {
        self.next_radix(16)
    }

    pub fn next_hex_int_or(&mut self, default: i64) -> i64 {
        self.next_hex_int().unwrap_or(default)
    }

    pub fn next_bin_int(&mut self) -> Option<i64> {
        self.next_radix(2)
    }

    fn next_radix(&mut self, radix: u32) -> Option<i64> {
        if self.has_next() {
            self.next().and_then(|v| i64::from_str_radix(v, radix).ok())
        } else {
            None
        }
    }

    pub fn next_double(&mut self) -> Option<f64> {
        if self.has_next() {
            self.next().and_then(|v| v.parse().ok())
        } else {
            None
        }
    }

    pub fn next_double_or(&mut self, default: f64) -> f64 {
        self.next_double().unwrap_or(default)
    }

    /// Consume the groups of one coordinate in the given encoding and return
    /// signed decimal degrees. A hemisphere of `S`, `W` or `-` negates.
    pub fn next_coordinate(&mut self, format: CoordinateFormat) -> f64 {
        use CoordinateFormat::*;

        let mut hemisphere: Option<&str> = None;
        let coordinate = match format {
            DegDeg => self.next_split_double(),
            DegDegHem => {
                let value = self.next_split_double();
                hemisphere = self.next();
                value
            }
            DegHem => {
                let value = self.next_double_or(0.0);
                hemisphere = self.next();
                value
            }
            DegMinMin => self.next_int_or(0) as f64 + self.next_split_double() / 60.0,
            DegMinHem => {
                let value = self.next_int_or(0) as f64 + self.next_double_or(0.0) / 60.0;
                hemisphere = self.next();
                value
            }
            DegMinMinHem => {
                let value = self.next_int_or(0) as f64 + self.next_split_double() / 60.0;
                hemisphere = self.next();
                value
            }
            HemDeg => {
                hemisphere = self.next();
                self.next_double_or(0.0)
            }
            HemDegMin => {
                hemisphere = self.next();
                self.next_int_or(0) as f64 + self.next_double_or(0.0) / 60.0
            }
            HemDegMinMin => {
                hemisphere = self.next();
                self.next_int_or(0) as f64 + self.next_split_double() / 60.0
            }
        };

        match hemisphere {
            Some("S") | Some("W") | Some("-") => -coordinate.abs(),
            _ => coordinate,
        }
    }

    /// Integer and fractional part captured as two adjacent groups.
    fn next_split_double(&mut self) -> f64 {
        let whole = self.next().unwrap_or("0");
        let fraction = self.next().unwrap_or("0");
        format!("{whole}.{fraction}").parse().unwrap_or(0.0)
    }

    /// Compose separately captured date/time groups into one UTC instant.
    /// Two-digit years are interpreted as 2000+YY. Returns `None` when the
    /// captured values do not form a valid calendar date.
    pub fn next_date_time(&mut self, format: DateTimeFormat) -> Option<DateTime<Utc>> {
        self.next_date_time_radix(format, 10)
    }

    /// Like [`Parser::next_date_time`] for protocols whose digit groups are
    /// hex-encoded.
    pub fn next_date_time_radix(
        &mut self,
        format: DateTimeFormat,
        radix: u32,
    ) -> Option<DateTime<Utc>> {
        use DateTimeFormat::*;

        let field = |parser: &mut Self| parser.next_radix(radix).unwrap_or(0);

        let mut year = 0;
        let mut month = 0;
        let mut day = 0;
        let (hour, minute, second);

        match format {
            Hms => {
                hour = field(self);
                minute = field(self);
                second = field(self);
            }
            Smh => {
                second = field(self);
                minute = field(self);
                hour = field(self);
            }
            HmsYmd => {
                hour = field(self);
                minute = field(self);
                second = field(self);
                year = field(self);
                month = field(self);
                day = field(self);
            }
            HmsDmy => {
                hour = field(self);
                minute = field(self);
                second = field(self);
                day = field(self);
                month = field(self);
                year = field(self);
            }
            SmhYmd => {
                second = field(self);
                minute = field(self);
                hour = field(self);
                year = field(self);
                month = field(self);
                day = field(self);
            }
            SmhDmy => {
                second = field(self);
                minute = field(self);
                hour = field(self);
                day = field(self);
                month = field(self);
                year = field(self);
            }
            DmyHms => {
                day = field(self);
                month = field(self);
                year = field(self);
                hour = field(self);
                minute = field(self);
                second = field(self);
            }
            YmdHms => {
                year = field(self);
                month = field(self);
                day = field(self);
                hour = field(self);
                minute = field(self);
                second = field(self);
            }
        }

        let builder = if matches!(format, Hms | Smh) {
            DateTimeBuilder::today()
        } else {
            DateTimeBuilder::new().date(year as i32, month as u32, day as u32)
        };
        builder
            .time(hour as u32, minute as u32, second as u32)
            .build()
    }
}
