use crate::datetime::*;
use chrono::{NaiveDate, Timelike};
use test_log::test;

#[test]
fn test_parse_date_shapes() {
    let d = NaiveDate::from_ymd_opt(2001, 2, 3).expect("valid");
    assert_eq!(parse_date("2001-02-03"), Some(d));
    assert_eq!(parse_date("2001/02/03"), Some(d));
    assert_eq!(parse_date("02/03/2001"), Some(d)); // month/day/year client form
    assert_eq!(parse_date(" 2001-2-3 "), Some(d));
    assert_eq!(parse_date("2001-13-03"), None);
    assert_eq!(parse_date("not-a-date"), None);
}

#[test]
fn test_parse_time_shapes() {
    assert_eq!(
        parse_time("04:05").map(|t| time_to_secs(t)),
        Some(4 * 3600 + 5 * 60)
    );
    assert_eq!(
        parse_time("04:05:06").map(|t| time_to_secs(t)),
        Some(4 * 3600 + 5 * 60 + 6)
    );
    assert_eq!(
        parse_time("11:30:15 pm").map(|t| time_to_secs(t)),
        Some(23 * 3600 + 30 * 60 + 15)
    );
    assert_eq!(
        parse_time("12:00:01 am").map(|t| time_to_secs(t)),
        Some(1)
    );
    let t = parse_time("01:02:03.456").expect("parses");
    assert_eq!(t.nanosecond(), 456_000_000);
    assert_eq!(parse_time("25:00"), None);
    assert_eq!(parse_time("0405"), None);
}

#[test]
fn test_parse_datetime_either_order() {
    let d = NaiveDate::from_ymd_opt(2001, 2, 3).expect("valid");
    let dt = d.and_hms_opt(4, 5, 6).expect("valid");
    assert_eq!(parse_datetime("2001-02-03 04:05:06"), Some(dt));
    assert_eq!(parse_datetime("04:05:06 2001-02-03"), Some(dt));
    // a bare date reads as midnight
    assert_eq!(
        parse_datetime("2001-02-03"),
        d.and_hms_opt(0, 0, 0)
    );
    assert_eq!(parse_datetime("neither thing"), None);
}

#[test]
fn test_epoch_wall_round_trip() {
    let offset = 9 * 3600;
    for epoch in [0i64, 86_400, 1_000_000_000] {
        let wall = epoch_to_wall_millis(epoch, offset);
        assert_eq!(wall_millis_to_epoch(wall, offset), Some(epoch));
    }
    // outside the unsigned 32-bit window
    assert_eq!(wall_millis_to_epoch(-1000, 0), None);
    assert_eq!(
        wall_millis_to_epoch((TIMESTAMP_MAX + 1) * 1000, 0),
        None
    );
}

#[test]
fn test_formatting() {
    let d = NaiveDate::from_ymd_opt(1999, 12, 31).expect("valid");
    assert_eq!(format_date(date_to_days(d)), "1999-12-31");
    assert_eq!(format_time(3661), "01:01:01");
    let dt = d.and_hms_milli_opt(23, 59, 58, 123).expect("valid");
    assert_eq!(
        format_wall_millis(naive_to_wall_millis(dt)),
        "1999-12-31 23:59:58.123"
    );
}
