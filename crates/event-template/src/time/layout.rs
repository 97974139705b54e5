//! Reference-time layouts.
//!
//! A layout is an example rendering of the reference instant
//! `Mon Jan 2 15:04:05 MST 2006`. Each recognised piece of the reference
//! (`2006`, `Jan`, `15`, `-07:00`, ...) is replaced by the matching piece of
//! the formatted instant; everything else is copied literally. For example
//! `"2 Jan 2006 15:04:05"` formats 1520275913 (UTC) as
//! `"5 Mar 2018 18:51:53"`.

use std::fmt::Write as _;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

/// Layout used when a time value is printed without an explicit format.
pub const DEFAULT_LAYOUT: &str = "2006-01-02 15:04:05 -0700 MST";

const LONG_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const LONG_DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Std {
    LongMonth,
    Month,
    NumMonth,
    ZeroMonth,
    LongWeekDay,
    WeekDay,
    Day,
    UnderDay,
    ZeroDay,
    ZeroYearDay,
    LongYear,
    Year,
    Hour,
    Hour12,
    ZeroHour12,
    Minute,
    ZeroMinute,
    Second,
    ZeroSecond,
    Pm,
    LowerPm,
    Zone,
    /// Numeric offset. `utc_z` prints `Z` for UTC.
    Offset {
        colon: bool,
        minutes: bool,
        seconds: bool,
        utc_z: bool,
    },
    /// Fractional seconds with this many digits; `trim` drops trailing zeros.
    Fraction { sep: char, digits: usize, trim: bool },
}

/// Formats `time` according to a reference-time `layout`.
pub fn format(time: &DateTime<FixedOffset>, layout: &str) -> String {
    let mut out = String::with_capacity(layout.len() + 8);
    let mut rest = layout;

    while let Some(ch) = rest.chars().next() {
        match next_std(rest) {
            Some((std, len)) => {
                write_std(&mut out, time, std);
                rest = &rest[len..];
            }
            None => {
                out.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }

    out
}

/// Matches a reference piece at the start of `s`, returning it and its
/// length in bytes.
fn next_std(s: &str) -> Option<(Std, usize)> {
    let b = s.as_bytes();
    let offset = |colon, minutes, seconds, utc_z| Std::Offset {
        colon,
        minutes,
        seconds,
        utc_z,
    };

    match b[0] {
        b'J' if s.starts_with("January") => Some((Std::LongMonth, 7)),
        b'J' if s.starts_with("Jan") => Some((Std::Month, 3)),
        b'M' if s.starts_with("Monday") => Some((Std::LongWeekDay, 6)),
        b'M' if s.starts_with("Mon") => Some((Std::WeekDay, 3)),
        b'M' if s.starts_with("MST") => Some((Std::Zone, 3)),
        b'0' if s.starts_with("002") => Some((Std::ZeroYearDay, 3)),
        b'0' => match b.get(1) {
            Some(b'1') => Some((Std::ZeroMonth, 2)),
            Some(b'2') => Some((Std::ZeroDay, 2)),
            Some(b'3') => Some((Std::ZeroHour12, 2)),
            Some(b'4') => Some((Std::ZeroMinute, 2)),
            Some(b'5') => Some((Std::ZeroSecond, 2)),
            Some(b'6') => Some((Std::Year, 2)),
            _ => None,
        },
        b'1' if s.starts_with("15") => Some((Std::Hour, 2)),
        b'1' => Some((Std::NumMonth, 1)),
        b'2' if s.starts_with("2006") => Some((Std::LongYear, 4)),
        b'2' => Some((Std::Day, 1)),
        // "_2006" is a literal underscore followed by the year.
        b'_' if s.starts_with("_2") && !s.starts_with("_2006") => Some((Std::UnderDay, 2)),
        b'3' => Some((Std::Hour12, 1)),
        b'4' => Some((Std::Minute, 1)),
        b'5' => Some((Std::Second, 1)),
        b'P' if s.starts_with("PM") => Some((Std::Pm, 2)),
        b'p' if s.starts_with("pm") => Some((Std::LowerPm, 2)),
        b'-' if s.starts_with("-07:00:00") => Some((offset(true, true, true, false), 9)),
        b'-' if s.starts_with("-070000") => Some((offset(false, true, true, false), 7)),
        b'-' if s.starts_with("-07:00") => Some((offset(true, true, false, false), 6)),
        b'-' if s.starts_with("-0700") => Some((offset(false, true, false, false), 5)),
        b'-' if s.starts_with("-07") => Some((offset(false, false, false, false), 3)),
        b'Z' if s.starts_with("Z07:00:00") => Some((offset(true, true, true, true), 9)),
        b'Z' if s.starts_with("Z070000") => Some((offset(false, true, true, true), 7)),
        b'Z' if s.starts_with("Z07:00") => Some((offset(true, true, false, true), 6)),
        b'Z' if s.starts_with("Z0700") => Some((offset(false, true, false, true), 5)),
        b'Z' if s.starts_with("Z07") => Some((offset(false, false, false, true), 3)),
        sep @ (b'.' | b',') => fraction(s, sep as char),
        _ => None,
    }
}

/// `.000`, `.999`, `,000`... A run of zeros or nines after the separator,
/// not followed by another digit.
fn fraction(s: &str, sep: char) -> Option<(Std, usize)> {
    let b = s.as_bytes();
    let digit = *b.get(1)?;
    if digit != b'0' && digit != b'9' {
        return None;
    }
    let run = b[1..].iter().take_while(|&&c| c == digit).count();
    if b.get(1 + run).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    Some((
        Std::Fraction {
            sep,
            digits: run.min(9),
            trim: digit == b'9',
        },
        1 + run,
    ))
}

fn write_std(out: &mut String, time: &DateTime<FixedOffset>, std: Std) {
    let hour12 = match time.hour() % 12 {
        0 => 12,
        h => h,
    };

    // Writing into a String cannot fail.
    let _ = match std {
        Std::LongMonth => write!(out, "{}", LONG_MONTHS[time.month0() as usize]),
        Std::Month => write!(out, "{}", &LONG_MONTHS[time.month0() as usize][..3]),
        Std::NumMonth => write!(out, "{}", time.month()),
        Std::ZeroMonth => write!(out, "{:02}", time.month()),
        Std::LongWeekDay => write!(
            out,
            "{}",
            LONG_DAYS[time.weekday().num_days_from_monday() as usize]
        ),
        Std::WeekDay => write!(
            out,
            "{}",
            &LONG_DAYS[time.weekday().num_days_from_monday() as usize][..3]
        ),
        Std::Day => write!(out, "{}", time.day()),
        Std::UnderDay => write!(out, "{:>2}", time.day()),
        Std::ZeroDay => write!(out, "{:02}", time.day()),
        Std::ZeroYearDay => write!(out, "{:03}", time.ordinal()),
        Std::LongYear => write!(out, "{:04}", time.year()),
        Std::Year => write!(out, "{:02}", time.year().rem_euclid(100)),
        Std::Hour => write!(out, "{:02}", time.hour()),
        Std::Hour12 => write!(out, "{}", hour12),
        Std::ZeroHour12 => write!(out, "{:02}", hour12),
        Std::Minute => write!(out, "{}", time.minute()),
        Std::ZeroMinute => write!(out, "{:02}", time.minute()),
        Std::Second => write!(out, "{}", time.second()),
        Std::ZeroSecond => write!(out, "{:02}", time.second()),
        Std::Pm => out.write_str(if time.hour() >= 12 { "PM" } else { "AM" }),
        Std::LowerPm => out.write_str(if time.hour() >= 12 { "pm" } else { "am" }),
        Std::Zone => {
            // Fixed offsets carry no abbreviation.
            if time.offset().local_minus_utc() == 0 {
                out.write_str("UTC")
            } else {
                write_offset(out, time, false, true, false);
                Ok(())
            }
        }
        Std::Offset {
            colon,
            minutes,
            seconds,
            utc_z,
        } => {
            if utc_z && time.offset().local_minus_utc() == 0 {
                out.write_str("Z")
            } else {
                write_offset(out, time, colon, minutes, seconds);
                Ok(())
            }
        }
        Std::Fraction { sep, digits, trim } => {
            write_fraction(out, time.nanosecond() % 1_000_000_000, sep, digits, trim);
            Ok(())
        }
    };
}

fn write_offset(
    out: &mut String,
    time: &DateTime<FixedOffset>,
    colon: bool,
    minutes: bool,
    seconds: bool,
) {
    let total = time.offset().local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.unsigned_abs();
    let sep = if colon { ":" } else { "" };

    let _ = write!(out, "{}{:02}", sign, total / 3600);
    if minutes {
        let _ = write!(out, "{}{:02}", sep, (total / 60) % 60);
    }
    if seconds {
        let _ = write!(out, "{}{:02}", sep, total % 60);
    }
}

fn write_fraction(out: &mut String, nanos: u32, sep: char, digits: usize, trim: bool) {
    let all = format!("{:09}", nanos);
    let mut frac = &all[..digits];
    if trim {
        frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            return;
        }
    }
    out.push(sep);
    out.push_str(frac);
}
