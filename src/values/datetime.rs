//! Date and time values with bit-packed month/day and time fields.

use std::fmt::{self, Write};

use crate::values::trim_whitespace;
use crate::{Error, Result};

/// The eight date-time flavours of the XML Schema clock and calendar
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    /// `xsd:gYear`
    GYear,
    /// `xsd:gYearMonth`
    GYearMonth,
    /// `xsd:date`
    Date,
    /// `xsd:dateTime`
    DateTime,
    /// `xsd:gMonth`
    GMonth,
    /// `xsd:gMonthDay`
    GMonthDay,
    /// `xsd:gDay`
    GDay,
    /// `xsd:time`
    Time,
}

impl DateTimeKind {
    /// Does a value of this kind carry a year component?
    pub fn has_year(self) -> bool {
        matches!(
            self,
            DateTimeKind::GYear | DateTimeKind::GYearMonth | DateTimeKind::Date | DateTimeKind::DateTime
        )
    }

    /// Does a value of this kind carry a packed month/day component?
    pub fn has_month_day(self) -> bool {
        !matches!(self, DateTimeKind::GYear | DateTimeKind::Time)
    }

    /// Does a value of this kind carry a packed time component?
    pub fn has_time(self) -> bool {
        matches!(self, DateTimeKind::DateTime | DateTimeKind::Time)
    }
}

/// A date-time value.
///
/// `month_day` packs `month * 32 + day`; `time` packs
/// `((hour * 64) + minute) * 64 + second`. `fractional_secs` holds the
/// fractional second digits in reverse order (`".050"` is stored as the
/// integer `50`), zero meaning there are none. The timezone is an offset
/// in minutes when present.
///
/// Equality is component-wise; two values that differ component-wise are
/// compared again after normalization to UTC.
#[derive(Debug, Clone, Eq)]
pub struct DateTimeValue {
    /// Flavour of this value.
    pub kind: DateTimeKind,
    /// Calendar year, may be negative.
    pub year: i64,
    /// `month * 32 + day`.
    pub month_day: u32,
    /// `((hour * 64) + minute) * 64 + second`.
    pub time: u32,
    /// Reversed fractional second digits, `0` when absent.
    pub fractional_secs: u32,
    /// Timezone offset in minutes, `None` when the value is local.
    pub timezone_minutes: Option<i32>,
}

impl DateTimeValue {
    /// Assembles a value from calendar fields. An `hour` of 24 with zero
    /// minutes and seconds rolls over to the next day.
    #[allow(clippy::too_many_arguments)]
    pub fn from_fields(
        kind: DateTimeKind,
        mut year: i64,
        mut month: u32,
        mut day: u32,
        mut hour: u32,
        minute: u32,
        second: u32,
        fractional_secs: u32,
        timezone_minutes: Option<i32>,
    ) -> Self {
        if hour == 24 && minute == 0 && second == 0 {
            hour = 0;
            if kind.has_month_day() {
                day += 1;
                if day > days_in_month(year, month) {
                    day = 1;
                    month += 1;
                    if month > 12 {
                        month = 1;
                        year += 1;
                    }
                }
            }
        }
        DateTimeValue {
            kind,
            year,
            month_day: month * 32 + day,
            time: ((hour * 64) + minute) * 64 + second,
            fractional_secs,
            timezone_minutes,
        }
    }

    /// Month component, 0 when absent.
    pub fn month(&self) -> u32 {
        self.month_day / 32
    }

    /// Day component, 0 when absent.
    pub fn day(&self) -> u32 {
        self.month_day % 32
    }

    /// Hour component.
    pub fn hour(&self) -> u32 {
        self.time / (64 * 64)
    }

    /// Minute component.
    pub fn minute(&self) -> u32 {
        (self.time / 64) % 64
    }

    /// Second component, fractional part excluded.
    pub fn second(&self) -> u32 {
        self.time % 64
    }

    /// Parses the lexical form belonging to `kind`.
    pub fn parse(kind: DateTimeKind, lexical: &str) -> Result<Self> {
        let trimmed = trim_whitespace(lexical);
        Parser::new(kind, trimmed)
            .run()
            .ok_or_else(|| Error::Format {
                datatype: kind_name(kind),
                value: lexical.to_string(),
            })
    }

    /// The same instant with all fields adjusted to UTC. Values without a
    /// timezone are interpreted as UTC.
    pub fn normalize(&self) -> DateTimeValue {
        let tz = self.timezone_minutes.unwrap_or(0);
        if tz == 0 {
            let mut utc = self.clone();
            utc.timezone_minutes = Some(0);
            return utc;
        }

        // XML Schema appendix E: add the negated offset, then carry
        // minutes into hours, hours into days and days through the
        // Gregorian calendar.
        let mut year = self.year;
        let mut month = i64::from(self.month().max(1));
        let mut day = i64::from(self.day().max(1));
        let mut hour = i64::from(self.hour());
        let mut minute = i64::from(self.minute()) - i64::from(tz);

        hour += minute.div_euclid(60);
        minute = minute.rem_euclid(60);
        day += hour.div_euclid(24);
        hour = hour.rem_euclid(24);

        loop {
            if day < 1 {
                month -= 1;
                if month < 1 {
                    month = 12;
                    year -= 1;
                }
                day += i64::from(days_in_month(year, month as u32));
            } else if day > i64::from(days_in_month(year, month as u32)) {
                day -= i64::from(days_in_month(year, month as u32));
                month += 1;
                if month > 12 {
                    month = 1;
                    year += 1;
                }
            } else {
                break;
            }
        }

        DateTimeValue {
            kind: self.kind,
            year,
            month_day: if self.kind.has_month_day() {
                (month as u32) * 32 + day as u32
            } else {
                self.month_day
            },
            time: ((hour as u32 * 64) + minute as u32) * 64 + self.second(),
            fractional_secs: self.fractional_secs,
            timezone_minutes: Some(0),
        }
    }

    fn lexical(&self) -> String {
        let mut out = String::new();
        match self.kind {
            DateTimeKind::GYear => {
                write_year(&mut out, self.year);
            }
            DateTimeKind::GYearMonth => {
                write_year(&mut out, self.year);
                let _ = write!(out, "-{:02}", self.month());
            }
            DateTimeKind::Date => {
                write_year(&mut out, self.year);
                let _ = write!(out, "-{:02}-{:02}", self.month(), self.day());
            }
            DateTimeKind::DateTime => {
                write_year(&mut out, self.year);
                let _ = write!(out, "-{:02}-{:02}T", self.month(), self.day());
                self.write_time(&mut out);
            }
            DateTimeKind::GMonth => {
                let _ = write!(out, "--{:02}", self.month());
            }
            DateTimeKind::GMonthDay => {
                let _ = write!(out, "--{:02}-{:02}", self.month(), self.day());
            }
            DateTimeKind::GDay => {
                let _ = write!(out, "---{:02}", self.day());
            }
            DateTimeKind::Time => {
                self.write_time(&mut out);
            }
        }
        match self.timezone_minutes {
            None => {}
            Some(0) => out.push('Z'),
            Some(tz) => {
                let sign = if tz < 0 { '-' } else { '+' };
                let magnitude = tz.unsigned_abs();
                let _ = write!(out, "{}{:02}:{:02}", sign, magnitude / 60, magnitude % 60);
            }
        }
        out
    }

    fn write_time(&self, out: &mut String) {
        let _ = write!(
            out,
            "{:02}:{:02}:{:02}",
            self.hour(),
            self.minute(),
            self.second()
        );
        if self.fractional_secs != 0 {
            out.push('.');
            out.extend(self.fractional_secs.to_string().chars().rev());
        }
    }

    /// Number of code points of the canonical lexical form.
    pub fn characters_length(&self) -> usize {
        self.lexical().chars().count()
    }

    /// Writes the canonical lexical form into `target` at `offset`.
    pub fn fill_characters(&self, target: &mut [char], offset: usize) -> usize {
        let mut pos = offset;
        for ch in self.lexical().chars() {
            target[pos] = ch;
            pos += 1;
        }
        pos
    }
}

impl PartialEq for DateTimeValue {
    fn eq(&self, other: &Self) -> bool {
        let component_wise = self.kind == other.kind
            && self.year == other.year
            && self.month_day == other.month_day
            && self.time == other.time
            && self.fractional_secs == other.fractional_secs
            && self.timezone_minutes == other.timezone_minutes;
        if component_wise {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        let a = self.normalize();
        let b = other.normalize();
        a.year == b.year
            && a.month_day == b.month_day
            && a.time == b.time
            && a.fractional_secs == b.fractional_secs
    }
}

impl fmt::Display for DateTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.lexical())
    }
}

/// Days in `month` of `year` in the Gregorian calendar.
pub(crate) fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
        _ => 31,
    }
}

fn kind_name(kind: DateTimeKind) -> &'static str {
    match kind {
        DateTimeKind::GYear => "gYear",
        DateTimeKind::GYearMonth => "gYearMonth",
        DateTimeKind::Date => "date",
        DateTimeKind::DateTime => "dateTime",
        DateTimeKind::GMonth => "gMonth",
        DateTimeKind::GMonthDay => "gMonthDay",
        DateTimeKind::GDay => "gDay",
        DateTimeKind::Time => "time",
    }
}

fn write_year(out: &mut String, year: i64) {
    if year < 0 {
        out.push('-');
    }
    let _ = write!(out, "{:04}", year.unsigned_abs());
}

/// Hand-rolled cursor parser for the date-time lexical forms. Returns
/// `None` on the first violation; the caller turns that into a format
/// error carrying the original input.
struct Parser<'a> {
    kind: DateTimeKind,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(kind: DateTimeKind, input: &'a str) -> Self {
        Parser {
            kind,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn run(mut self) -> Option<DateTimeValue> {
        let mut year = 0i64;
        let mut month = 0u32;
        let mut day = 0u32;
        let mut hour = 0u32;
        let mut minute = 0u32;
        let mut second = 0u32;
        let mut fractional = 0u32;

        match self.kind {
            DateTimeKind::GYear => {
                year = self.year()?;
            }
            DateTimeKind::GYearMonth => {
                year = self.year()?;
                self.expect(b'-')?;
                month = self.digits2()?;
            }
            DateTimeKind::Date => {
                year = self.year()?;
                self.expect(b'-')?;
                month = self.digits2()?;
                self.expect(b'-')?;
                day = self.digits2()?;
            }
            DateTimeKind::DateTime => {
                year = self.year()?;
                self.expect(b'-')?;
                month = self.digits2()?;
                self.expect(b'-')?;
                day = self.digits2()?;
                self.expect(b'T')?;
                let (h, m, s, f) = self.time()?;
                hour = h;
                minute = m;
                second = s;
                fractional = f;
            }
            DateTimeKind::GMonth => {
                self.expect(b'-')?;
                self.expect(b'-')?;
                month = self.digits2()?;
            }
            DateTimeKind::GMonthDay => {
                self.expect(b'-')?;
                self.expect(b'-')?;
                month = self.digits2()?;
                self.expect(b'-')?;
                day = self.digits2()?;
            }
            DateTimeKind::GDay => {
                self.expect(b'-')?;
                self.expect(b'-')?;
                self.expect(b'-')?;
                day = self.digits2()?;
            }
            DateTimeKind::Time => {
                let (h, m, s, f) = self.time()?;
                hour = h;
                minute = m;
                second = s;
                fractional = f;
            }
        }

        let timezone = self.timezone()?;
        if self.pos != self.bytes.len() {
            return None;
        }

        if minute > 59 || second > 59 {
            return None;
        }
        if hour > 24 || (hour == 24 && (minute != 0 || second != 0 || fractional != 0)) {
            return None;
        }
        let parses_month = !matches!(
            self.kind,
            DateTimeKind::GYear | DateTimeKind::GDay | DateTimeKind::Time
        );
        let parses_day = matches!(
            self.kind,
            DateTimeKind::Date | DateTimeKind::DateTime | DateTimeKind::GMonthDay | DateTimeKind::GDay
        );
        if parses_month && !(1..=12).contains(&month) {
            return None;
        }
        if parses_day {
            let limit = if parses_month {
                days_in_month(year, month)
            } else {
                31
            };
            if !(1..=limit).contains(&day) {
                return None;
            }
        }

        Some(DateTimeValue::from_fields(
            self.kind, year, month, day, hour, minute, second, fractional, timezone,
        ))
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        if self.bytes.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn digit(&mut self) -> Option<u32> {
        let b = *self.bytes.get(self.pos)?;
        if b.is_ascii_digit() {
            self.pos += 1;
            Some(u32::from(b - b'0'))
        } else {
            None
        }
    }

    fn digits2(&mut self) -> Option<u32> {
        Some(self.digit()? * 10 + self.digit()?)
    }

    fn year(&mut self) -> Option<i64> {
        let negative = self.expect(b'-').is_some();
        let start = self.pos;
        let mut year = 0i64;
        while let Some(d) = self.digit() {
            year = year.checked_mul(10)?.checked_add(i64::from(d))?;
        }
        if self.pos - start < 4 {
            return None;
        }
        Some(if negative { -year } else { year })
    }

    fn time(&mut self) -> Option<(u32, u32, u32, u32)> {
        let hour = self.digits2()?;
        self.expect(b':')?;
        let minute = self.digits2()?;
        self.expect(b':')?;
        let second = self.digits2()?;
        let fractional = if self.expect(b'.').is_some() {
            let start = self.pos;
            let mut reversed = 0u64;
            let mut scale = 1u64;
            while let Some(d) = self.digit() {
                reversed += u64::from(d) * scale;
                scale = scale.checked_mul(10)?;
            }
            if self.pos == start || reversed > u64::from(u32::MAX) {
                return None;
            }
            reversed as u32
        } else {
            0
        };
        Some((hour, minute, second, fractional))
    }

    fn timezone(&mut self) -> Option<Option<i32>> {
        match self.bytes.get(self.pos) {
            None => Some(None),
            Some(b'Z') => {
                self.pos += 1;
                Some(Some(0))
            }
            Some(sign @ (b'+' | b'-')) => {
                let negative = *sign == b'-';
                self.pos += 1;
                let hours = self.digits2()?;
                self.expect(b':')?;
                let minutes = self.digits2()?;
                if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
                    return None;
                }
                let total = (hours * 60 + minutes) as i32;
                Some(Some(if negative { -total } else { total }))
            }
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_date_time_with_zone() {
        let v = DateTimeValue::parse(DateTimeKind::DateTime, "2023-06-01T08:30:15Z").unwrap();
        assert_eq!(v.year, 2023);
        assert_eq!((v.month(), v.day()), (6, 1));
        assert_eq!((v.hour(), v.minute(), v.second()), (8, 30, 15));
        assert_eq!(v.timezone_minutes, Some(0));
    }

    #[test]
    fn hour_24_rolls_to_the_next_day() {
        let v = DateTimeValue::parse(DateTimeKind::DateTime, "2023-12-31T24:00:00Z").unwrap();
        let next = DateTimeValue::parse(DateTimeKind::DateTime, "2024-01-01T00:00:00Z").unwrap();
        assert_eq!(v, next);
        assert_eq!(v.year, 2024);
        assert_eq!((v.month(), v.day(), v.hour()), (1, 1, 0));
    }

    #[test]
    fn equality_normalizes_timezones() {
        let utc = DateTimeValue::parse(DateTimeKind::DateTime, "2023-06-01T10:00:00Z").unwrap();
        let offset =
            DateTimeValue::parse(DateTimeKind::DateTime, "2023-06-01T12:00:00+02:00").unwrap();
        assert_eq!(utc, offset);
    }

    #[test]
    fn normalization_carries_across_month_and_year() {
        let v =
            DateTimeValue::parse(DateTimeKind::DateTime, "2024-01-01T00:30:00+01:00").unwrap();
        let utc = v.normalize();
        assert_eq!(utc.year, 2023);
        assert_eq!((utc.month(), utc.day()), (12, 31));
        assert_eq!((utc.hour(), utc.minute()), (23, 30));
    }

    #[test]
    fn fractional_seconds_are_reversed() {
        let v = DateTimeValue::parse(DateTimeKind::Time, "01:02:03.050").unwrap();
        assert_eq!(v.fractional_secs, 50);
        assert_eq!(v.to_string(), "01:02:03.05");
    }

    #[test]
    fn partial_kinds_render_their_canonical_shape() {
        let cases = [
            (DateTimeKind::GYear, "2023"),
            (DateTimeKind::GYearMonth, "2023-06"),
            (DateTimeKind::GMonth, "--06"),
            (DateTimeKind::GMonthDay, "--06-15"),
            (DateTimeKind::GDay, "---15"),
        ];
        for (kind, lexical) in cases {
            let v = DateTimeValue::parse(kind, lexical).unwrap();
            assert_eq!(v.to_string(), lexical, "{:?}", kind);
        }
    }

    #[test]
    fn bad_shapes_are_format_errors() {
        assert!(DateTimeValue::parse(DateTimeKind::Date, "2023-13-01").is_err());
        assert!(DateTimeValue::parse(DateTimeKind::Date, "2023-02-30").is_err());
        assert!(DateTimeValue::parse(DateTimeKind::Time, "25:00:00").is_err());
        assert!(DateTimeValue::parse(DateTimeKind::DateTime, "2023-06-01").is_err());
        assert!(DateTimeValue::parse(DateTimeKind::Date, "2023-06-01+15:00").is_err());
    }
}
