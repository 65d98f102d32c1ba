use std::sync::RwLock;

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::{Error, Result};

static LOCAL_ZONE: RwLock<Tz> = RwLock::new(Tz::UTC);

/// Set the zone every type in this crate formats and parses in.
///
/// Takes an IANA name such as `Europe/Oslo`. The zone is process-wide and
/// defaults to UTC.
pub fn set_local_time_zone(name: &str) -> Result<()> {
    let zone: Tz = name
        .parse()
        .map_err(|_| Error::UnknownTimeZone(name.to_string()))?;
    *LOCAL_ZONE.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = zone;
    debug!(zone = name, "local time zone set");
    Ok(())
}

pub fn local_time_zone() -> Tz {
    *LOCAL_ZONE.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn to_local(utc: &DateTime<Utc>) -> DateTime<Tz> {
    utc.with_timezone(&local_time_zone())
}

/// Interpret a wall-clock time in the local zone. In a fold the earlier
/// instant wins.
pub(crate) fn from_local(naive: &NaiveDateTime) -> Result<DateTime<Utc>> {
    match local_time_zone().from_local_datetime(naive) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(Error::NonexistentLocalTime(naive.to_string())),
    }
}
