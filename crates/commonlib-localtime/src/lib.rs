//! Date and time types that are stored in UTC but read and written in a
//! configurable local zone.
//!
//! Set the zone once at startup:
//!
//! ```
//! commonlib_localtime::set_local_time_zone("Europe/Oslo").unwrap();
//!
//! let t: commonlib_localtime::DateTime = "2020-02-01T12:34:56".parse().unwrap();
//! assert_eq!(t.to_string(), "2020-02-01T12:34:56+01:00");
//! ```

mod error;
mod types;
mod zone;

pub use error::{Error, Result};
pub use types::{parse_date, parse_date_time, parse_norwegian_date_time, Date, DateTime, NorwegianDateTime};
pub use zone::{local_time_zone, set_local_time_zone};
