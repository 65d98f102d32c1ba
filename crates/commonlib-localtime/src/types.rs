use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::zone::{from_local, to_local};

const NAIVE_RFC3339: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const NORWEGIAN_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// An instant held in UTC and written in the local zone as RFC 3339 with
/// whole seconds, e.g. `2020-02-01T12:34:56+01:00`.
///
/// Parsing accepts RFC 3339 with any offset, or a timestamp without an
/// offset (`2020-02-01T12:34:56`) which is taken as local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(pub chrono::DateTime<Utc>);

/// A calendar date in the local zone, written as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(pub NaiveDate);

/// An instant held in UTC and written in the local zone as
/// `dd.mm.yyyy HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NorwegianDateTime(pub chrono::DateTime<Utc>);

pub fn parse_date_time(input: &str) -> Result<DateTime> {
    if let Ok(t) = chrono::DateTime::parse_from_rfc3339(input) {
        return Ok(DateTime(t.with_timezone(&Utc)));
    }
    let naive = NaiveDateTime::parse_from_str(input, NAIVE_RFC3339).map_err(|source| Error::Parse {
        input: input.to_string(),
        format: "RFC 3339",
        source,
    })?;
    from_local(&naive).map(DateTime)
}

pub fn parse_date(input: &str) -> Result<Date> {
    NaiveDate::parse_from_str(input, DATE_FORMAT)
        .map(Date)
        .map_err(|source| Error::Parse {
            input: input.to_string(),
            format: "YYYY-MM-DD",
            source,
        })
}

pub fn parse_norwegian_date_time(input: &str) -> Result<NorwegianDateTime> {
    let naive = NaiveDateTime::parse_from_str(input, NORWEGIAN_FORMAT).map_err(|source| Error::Parse {
        input: input.to_string(),
        format: "dd.mm.yyyy HH:MM:SS",
        source,
    })?;
    from_local(&naive).map(NorwegianDateTime)
}

impl DateTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl Date {
    /// Today's date in the local zone.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// The local date at the instant `t`.
    pub fn from_utc(t: chrono::DateTime<Utc>) -> Self {
        Self(to_local(&t).date_naive())
    }
}

impl NorwegianDateTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_local(&self.0).to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl fmt::Display for NorwegianDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_local(&self.0).format(NORWEGIAN_FORMAT))
    }
}

impl FromStr for DateTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_date_time(s)
    }
}

impl FromStr for Date {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_date(s)
    }
}

impl FromStr for NorwegianDateTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_norwegian_date_time(s)
    }
}

impl Deref for DateTime {
    type Target = chrono::DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for Date {
    type Target = NaiveDate;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for NorwegianDateTime {
    type Target = chrono::DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(t: chrono::DateTime<Utc>) -> Self {
        Self(t)
    }
}

impl From<NaiveDate> for Date {
    fn from(d: NaiveDate) -> Self {
        Self(d)
    }
}

impl From<chrono::DateTime<Utc>> for NorwegianDateTime {
    fn from(t: chrono::DateTime<Utc>) -> Self {
        Self(t)
    }
}

impl From<DateTime> for NorwegianDateTime {
    fn from(t: DateTime) -> Self {
        Self(t.0)
    }
}

/// Serialize through `Display` and deserialize a JSON string through
/// `FromStr`.
macro_rules! string_serde {
    ($ty:ident, $expecting:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                struct StrVisitor;

                impl Visitor<'_> for StrVisitor {
                    type Value = $ty;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<$ty, E> {
                        v.parse().map_err(E::custom)
                    }
                }

                deserializer.deserialize_str(StrVisitor)
            }
        }
    };
}

string_serde!(DateTime, "an RFC 3339 timestamp");
string_serde!(Date, "a date formatted as YYYY-MM-DD");
string_serde!(NorwegianDateTime, "a timestamp formatted as dd.mm.yyyy HH:MM:SS");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set_local_time_zone;
    use chrono::{Datelike, TimeZone, Timelike};

    fn oslo() {
        set_local_time_zone("Europe/Oslo").unwrap();
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_zoned_timestamp_is_converted_to_utc() {
        oslo();
        let t = parse_date_time("2020-02-01T13:34:56+02:00").unwrap();
        assert_eq!(t.0, utc(2020, 2, 1, 11, 34, 56));
    }

    #[test]
    fn test_timestamp_without_offset_is_local() {
        oslo();
        let t = parse_date_time("2020-02-01T12:34:56").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (11, 34, 56));
    }

    #[test]
    fn test_fractional_seconds_are_accepted_and_dropped_on_output() {
        oslo();
        let t = parse_date_time("2020-02-01T11:34:56.250Z").unwrap();
        assert_eq!(t.nanosecond(), 250_000_000);
        assert_eq!(t.to_string(), "2020-02-01T12:34:56+01:00");
    }

    #[test]
    fn test_date_time_display_in_summer_time() {
        oslo();
        let t = DateTime(utc(2020, 7, 1, 10, 0, 0));
        assert_eq!(t.to_string(), "2020-07-01T12:00:00+02:00");
    }

    #[test]
    fn test_garbage_is_rejected() {
        oslo();
        assert!(matches!(
            parse_date_time("yesterday"),
            Err(Error::Parse { format: "RFC 3339", .. })
        ));
        assert!(parse_date("01.02.2020").is_err());
        assert!(parse_norwegian_date_time("2020-02-01T12:34:56").is_err());
    }

    #[test]
    fn test_date_round_trip() {
        oslo();
        let date = parse_date("2020-02-01").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2020, 2, 1));
        assert_eq!(date.to_string(), "2020-02-01");
    }

    #[test]
    fn test_date_from_utc_uses_local_date() {
        oslo();
        let date = Date::from_utc(utc(2020, 1, 31, 23, 30, 0));
        assert_eq!(date.to_string(), "2020-02-01");
    }

    #[test]
    fn test_norwegian_date_time() {
        oslo();
        let t = parse_norwegian_date_time("01.02.2020 12:34:56").unwrap();
        assert_eq!(t.0, utc(2020, 2, 1, 11, 34, 56));
        assert_eq!(t.to_string(), "01.02.2020 12:34:56");
        assert_eq!(
            NorwegianDateTime(utc(2020, 2, 1, 11, 34, 56)).to_string(),
            "01.02.2020 12:34:56"
        );
    }
}
