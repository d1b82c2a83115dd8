// Temporal payload plumbing. Dates are proleptic days-from-CE, times are
// seconds-since-midnight, timestamps are UTC epoch seconds, datetimes are
// timezone-less wall-clock milliseconds. Conversions between the epoch-based
// and wall-based forms shift by the session timezone offset; everything else
// is pure calendar arithmetic via chrono.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Timestamps keep the original unsigned 32-bit epoch window.
pub(crate) const TIMESTAMP_MIN: i64 = 0;
pub(crate) const TIMESTAMP_MAX: i64 = u32::MAX as i64;

pub(crate) fn date_to_days(d: NaiveDate) -> i32 {
    d.num_days_from_ce()
}

pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days)
}

pub(crate) fn time_to_secs(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight()
}

pub(crate) fn secs_to_time(secs: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
}

pub(crate) fn naive_to_wall_millis(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

pub(crate) fn wall_millis_to_naive(ms: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Wall datetime in the session zone for a UTC epoch second.
pub(crate) fn epoch_to_wall_millis(epoch_secs: i64, tz_offset_secs: i32) -> i64 {
    (epoch_secs + tz_offset_secs as i64) * 1000
}

/// UTC epoch second for a wall datetime read in the session zone. `None`
/// when the result falls outside the representable timestamp window.
pub(crate) fn wall_millis_to_epoch(wall_ms: i64, tz_offset_secs: i32) -> Option<i64> {
    let epoch = wall_ms.div_euclid(1000) - tz_offset_secs as i64;
    if (TIMESTAMP_MIN..=TIMESTAMP_MAX).contains(&epoch) {
        Some(epoch)
    } else {
        None
    }
}

// Permissive literal scanning. Accepted date shapes: Y-M-D, Y/M/D, M/D/Y
// (the original client format). Times: H:M, H:M:S, H:M:S.mmm, with an
// optional trailing am/pm. A datetime is a date and a time separated by
// whitespace, either order.

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let b = s.as_bytes();
    let sep = memchr::memchr2(b'-', b'/', b)?;
    let sep_ch = b[sep];
    let rest = &b[sep + 1..];
    let sep2 = memchr::memchr(sep_ch, rest)? + sep + 1;
    let a: i32 = s.get(..sep)?.trim().parse().ok()?;
    let m: u32 = s.get(sep + 1..sep2)?.trim().parse().ok()?;
    let c: i32 = s.get(sep2 + 1..)?.trim().parse().ok()?;
    if sep_ch == b'/' && a <= 12 && c >= 100 {
        // month/day/year client form
        NaiveDate::from_ymd_opt(c, a as u32, m)
    } else {
        NaiveDate::from_ymd_opt(a, m, c as u32)
    }
}

pub(crate) fn parse_time(s: &str) -> Option<NaiveTime> {
    let mut s = s.trim();
    let mut pm = false;
    let mut am = false;
    let lower = s.to_ascii_lowercase();
    if lower.ends_with("pm") {
        pm = true;
        s = s[..s.len() - 2].trim_end();
    } else if lower.ends_with("am") {
        am = true;
        s = s[..s.len() - 2].trim_end();
    }
    let b = s.as_bytes();
    let c1 = memchr::memchr(b':', b)?;
    let mut h: u32 = s.get(..c1)?.trim().parse().ok()?;
    let (m, sec, milli): (u32, u32, u32) = match memchr::memchr(b':', &b[c1 + 1..]) {
        Some(off) => {
            let c2 = c1 + 1 + off;
            let m = s.get(c1 + 1..c2)?.trim().parse().ok()?;
            let secpart = s.get(c2 + 1..)?.trim();
            match memchr::memchr(b'.', secpart.as_bytes()) {
                Some(dot) => {
                    let sec = secpart.get(..dot)?.parse().ok()?;
                    let frac = secpart.get(dot + 1..)?;
                    let mut milli: u32 = 0;
                    for (i, d) in frac.bytes().take(3).enumerate() {
                        if !d.is_ascii_digit() {
                            return None;
                        }
                        milli += (d - b'0') as u32 * [100, 10, 1][i];
                    }
                    (m, sec, milli)
                }
                None => (m, secpart.parse().ok()?, 0),
            }
        }
        None => (s.get(c1 + 1..)?.trim().parse().ok()?, 0, 0),
    };
    if pm && h < 12 {
        h += 12;
    }
    if am && h == 12 {
        h = 0;
    }
    NaiveTime::from_hms_milli_opt(h, m, sec, milli)
}

pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    // A lone date reads as midnight.
    if !s.as_bytes().contains(&b':') {
        return parse_date(s).map(|d| d.and_hms_opt(0, 0, 0)).flatten();
    }
    let b = s.as_bytes();
    // Split on the whitespace between the two halves; either order works.
    let mut split = None;
    let mut from = 0;
    while let Some(off) = memchr::memchr(b' ', &b[from..]) {
        let at = from + off;
        let (head, tail) = (s[..at].trim(), s[at + 1..].trim());
        if (parse_date(head).is_some() && parse_time(tail).is_some())
            || (parse_time(head).is_some() && parse_date(tail).is_some())
        {
            split = Some(at);
            break;
        }
        from = at + 1;
    }
    let at = split?;
    let (head, tail) = (s[..at].trim(), s[at + 1..].trim());
    if let (Some(d), Some(t)) = (parse_date(head), parse_time(tail)) {
        return Some(NaiveDateTime::new(d, t));
    }
    if let (Some(t), Some(d)) = (parse_time(head), parse_date(tail)) {
        return Some(NaiveDateTime::new(d, t));
    }
    None
}

pub(crate) fn format_date(days: i32) -> String {
    match days_to_date(days) {
        Some(d) => format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()),
        None => String::from("0000-00-00"),
    }
}

pub(crate) fn format_time(secs: u32) -> String {
    match secs_to_time(secs) {
        Some(t) => format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second()),
        None => String::from("00:00:00"),
    }
}

pub(crate) fn format_wall_millis(ms: i64) -> String {
    match wall_millis_to_naive(ms) {
        Some(dt) => {
            let frac = ms.rem_euclid(1000);
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
                frac
            )
        }
        None => String::from("0000-00-00 00:00:00.000"),
    }
}
