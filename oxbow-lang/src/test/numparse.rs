use crate::numparse::{scan_number, ScanStatus};
use test_log::test;

#[test]
fn test_scan_simple_forms() {
    let s = scan_number(b"  -42  ").expect("scans");
    assert!(s.negative);
    assert_eq!(s.to_i64(), (-42, ScanStatus::Clean));

    let s = scan_number(b"+3.75").expect("scans");
    assert_eq!(s.to_i64(), (4, ScanStatus::Clean));
    assert_eq!(s.to_f64(), 3.75);

    let s = scan_number(b".5").expect("scans");
    assert_eq!(s.to_i64(), (1, ScanStatus::Clean));

    assert!(scan_number(b"").is_none());
    assert!(scan_number(b"  .").is_none());
    assert!(scan_number(b"x123").is_none());
}

#[test]
fn test_scan_stops_at_first_invalid() {
    let s = scan_number(b"123garbage").expect("scans");
    assert_eq!(s.consumed, 3);
    assert_eq!(s.to_i64(), (123, ScanStatus::Clean));

    // 'e' without digits is not an exponent
    let s = scan_number(b"10easy").expect("scans");
    assert_eq!(s.consumed, 2);
    assert_eq!(s.to_i64(), (10, ScanStatus::Clean));
}

#[test]
fn test_scientific_forms() {
    let s = scan_number(b"1.5e3").expect("scans");
    assert_eq!(s.to_i64(), (1500, ScanStatus::Clean));
    assert_eq!(s.to_f64(), 1500.0);

    let s = scan_number(b"25e-1").expect("scans");
    assert_eq!(s.to_i64(), (3, ScanStatus::Clean)); // 2.5 rounds away

    let s = scan_number(b"5.e2").expect("scans");
    assert_eq!(s.to_f64(), 500.0);
}

#[test]
fn test_sig_digit_truncation() {
    let sixty_three = "9".repeat(63);
    let s = scan_number(sixty_three.as_bytes()).expect("scans");
    assert_eq!(s.to_i64(), (i64::MAX, ScanStatus::Clean));

    let sixty_four = "9".repeat(64);
    let s = scan_number(sixty_four.as_bytes()).expect("scans");
    assert_eq!(s.to_i64(), (i64::MAX, ScanStatus::Truncated));

    // leading zeros are not significant
    let padded = format!("{}{}", "0".repeat(10), "9".repeat(63));
    let s = scan_number(padded.as_bytes()).expect("scans");
    assert_eq!(s.to_i64().1, ScanStatus::Clean);
}

#[test]
fn test_hex_forms() {
    let s = scan_number(b"0x1A").expect("scans");
    assert!(s.is_hex);
    assert_eq!(s.to_i64(), (0x1a, ScanStatus::Clean));

    let s = scan_number(b"-0xff").expect("scans");
    assert_eq!(s.to_i64(), (-255, ScanStatus::Clean));

    let s = scan_number(b"0x7fffffffffffffff").expect("scans");
    assert_eq!(s.to_i64(), (i64::MAX, ScanStatus::Clean));

    let s = scan_number(b"0x8000000000000000").expect("scans");
    assert_eq!(s.to_i64(), (i64::MAX, ScanStatus::Truncated));

    let s = scan_number(b"0x10000000000000000").expect("scans");
    assert_eq!(s.to_i64(), (i64::MAX, ScanStatus::Truncated));

    // bare 0x is just a zero followed by junk
    let s = scan_number(b"0x").expect("scans");
    assert_eq!(s.consumed, 1);
    assert_eq!(s.to_i64(), (0, ScanStatus::Clean));
}

#[test]
fn test_exponent_overflow_truncates() {
    let s = scan_number(b"1e99999999999999999999").expect("scans");
    assert_eq!(s.to_i64().1, ScanStatus::Truncated);
}
