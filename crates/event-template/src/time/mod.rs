//! Time values for templates.
//!
//! [`Time`] is what the `UnixTime` helper returns. Printing it uses
//! [`layout::DEFAULT_LAYOUT`], and templates call methods on it to turn a
//! stored timestamp into text:
//!
//! ```text
//! {{ (UnixTime .Check.Executed).Format "2 Jan 2006 15:04:05" }}
//! {{ (UnixTime .Check.Executed).UTC.Format "2006-01-02T15:04:05Z07:00" }}
//! {{ .Check.Executed | UnixTime | printf "%v" }}
//! ```
//!
//! | Method | Result |
//! |--------|--------|
//! | `Format layout` | text, see [`layout`] |
//! | `Unix` | seconds since the epoch |
//! | `UTC` / `Local` | the same instant in UTC / the local zone |
//! | `Year`, `Day`, `Hour`, `Minute`, `Second`, `YearDay` | numbers |
//! | `Month`, `Weekday` | English names |

pub mod layout;

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike, Utc};

use crate::template::funcs::{args0, args1, str_arg, FuncError};
use crate::template::Value;

/// An instant with the offset it should be displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time(DateTime<FixedOffset>);

impl Time {
    /// The instant `seconds` after the epoch, in the local time zone.
    ///
    /// Returns `None` when the timestamp is outside the supported range.
    pub fn from_unix(seconds: i64) -> Option<Self> {
        let utc = DateTime::<Utc>::from_timestamp(seconds, 0)?;
        Some(Time(utc.with_timezone(&Local).into()))
    }

    /// Seconds since the epoch.
    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// Formats with a reference-time layout.
    pub fn format(&self, layout: &str) -> String {
        layout::format(&self.0, layout)
    }

    pub fn utc(&self) -> Self {
        Time(self.0.with_timezone(&Utc).into())
    }

    pub fn local(&self) -> Self {
        Time(self.0.with_timezone(&Local).into())
    }

    /// Calls a template method such as `.Format` or `.UTC`.
    pub(crate) fn call_method(&self, method: &str, args: &[Value]) -> Result<Value, FuncError> {
        if method == "Format" {
            let layout = str_arg("Format", args1("Format", args)?)?;
            return Ok(Value::String(self.format(layout)));
        }

        let value = self.niladic(method).ok_or_else(|| {
            FuncError::new(format!("time value has no method {method}"))
        })?;
        args0(method, args)?;
        Ok(value)
    }

    fn niladic(&self, method: &str) -> Option<Value> {
        let t = &self.0;
        let value = match method {
            "Unix" => Value::Int(self.unix()),
            "UTC" => Value::Time(self.utc()),
            "Local" => Value::Time(self.local()),
            "Year" => Value::Int(i64::from(t.year())),
            "Month" => Value::from(layout::format(t, "January")),
            "Day" => Value::from(t.day()),
            "Hour" => Value::from(t.hour()),
            "Minute" => Value::from(t.minute()),
            "Second" => Value::from(t.second()),
            "YearDay" => Value::from(t.ordinal()),
            "Weekday" => Value::from(layout::format(t, "Monday")),
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(layout::DEFAULT_LAYOUT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn call(time: &Time, method: &str, args: &[Value]) -> Result<Value, FuncError> {
        time.call_method(method, args)
    }

    #[test]
    fn test_from_unix_matches_local_time() {
        let time = Time::from_unix(1520275913).unwrap();
        let expected = Local.timestamp_opt(1520275913, 0).unwrap();
        assert_eq!(time.0, DateTime::<FixedOffset>::from(expected));
        assert_eq!(time.unix(), 1520275913);
    }

    #[test]
    fn test_out_of_range_timestamp() {
        assert!(Time::from_unix(i64::MAX).is_none());
    }

    #[test]
    fn test_methods() {
        let time = Time::from_unix(1520275913).unwrap().utc();
        assert_eq!(
            call(&time, "Format", &["2 Jan 2006 15:04:05".into()]).unwrap(),
            Value::from("5 Mar 2018 18:51:53")
        );
        assert_eq!(call(&time, "Unix", &[]).unwrap(), Value::Int(1520275913));
        assert_eq!(call(&time, "Year", &[]).unwrap(), Value::Int(2018));
        assert_eq!(call(&time, "Month", &[]).unwrap(), Value::from("March"));
        assert_eq!(call(&time, "Weekday", &[]).unwrap(), Value::from("Monday"));
        assert_eq!(call(&time, "YearDay", &[]).unwrap(), Value::Int(64));
        assert_eq!(call(&time, "UTC", &[]).unwrap(), Value::Time(time));
    }

    #[test]
    fn test_prints_with_default_layout() {
        let time = Time::from_unix(0).unwrap().utc();
        assert_eq!(time.to_string(), "1970-01-01 00:00:00 +0000 UTC");
    }

    #[test]
    fn test_method_errors() {
        let time = Time::from_unix(0).unwrap();
        let err = call(&time, "Nanosecond", &[]).unwrap_err();
        assert_eq!(err.to_string(), "time value has no method Nanosecond");
        assert!(call(&time, "Format", &[]).is_err());
        assert!(call(&time, "Format", &[Value::Int(1)]).is_err());
        assert!(call(&time, "Unix", &[Value::Int(1)])
            .unwrap_err()
            .to_string()
            .contains("wrong number of args for Unix"));
    }
}
