use crate::{
    cast, CastOpts, CastStatus, CoercionMode, Domain, DomainKind, DomainRegistry, Value,
};
use oxbow_base::SessionTz;
use std::sync::Arc;
use test_log::test;

fn reg() -> Arc<DomainRegistry> {
    DomainRegistry::new()
}

#[test]
fn test_null_in_null_out() {
    let reg = reg();
    let short = reg.resolve_default(DomainKind::Short);
    let c = cast(&Value::null(), &short, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Compatible);
    match c.value {
        Value::Null(Some(d)) => assert!(Arc::ptr_eq(&d, &short)),
        other => panic!("expected domain-tagged NULL, got {:?}", other),
    }
}

#[test]
fn test_identity_cast_is_clone() {
    let reg = reg();
    let int_d = reg.resolve_default(DomainKind::Int);
    let v = Value::Int(42);
    let c = cast(&v, &int_d, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Compatible);
    assert_eq!(c.value, v);
}

#[test]
fn test_short_overflow() {
    let reg = reg();
    let short = reg.resolve_default(DomainKind::Short);
    let c = cast(&Value::Int(40000), &short, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Overflow);
    assert_eq!(c.value, Value::null());

    let mut opts = CastOpts::default();
    opts.preserve_domain = true;
    let c = cast(&Value::Int(40000), &short, &opts);
    assert_eq!(c.status, CastStatus::Overflow);
    match c.value {
        Value::Null(Some(d)) => assert_eq!(d.kind(), DomainKind::Short),
        other => panic!("expected NULL-of-short, got {:?}", other),
    }
}

#[test]
fn test_float_rounds_half_away() {
    let reg = reg();
    let int_d = reg.resolve_default(DomainKind::Int);
    let c = cast(&Value::Double(2.5.into()), &int_d, &CastOpts::default());
    assert_eq!(c.value, Value::Int(3));
    let c = cast(&Value::Double((-2.5).into()), &int_d, &CastOpts::default());
    assert_eq!(c.value, Value::Int(-3));
}

#[test]
fn test_integer_round_trips() {
    let reg = reg();
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));
    for v in [
        Value::Short(-123),
        Value::Int(7_654_321),
        Value::Bigint(99_123_456_789),
        Value::Date(738_000),
        Value::Time(12 * 3600 + 34 * 60 + 56),
    ] {
        let out = cast(&v, &varchar, &CastOpts::default());
        assert_eq!(out.status, CastStatus::Compatible, "{:?}", v);
        let back = cast(&out.value, &v.domain(&reg), &CastOpts::default());
        assert_eq!(back.status, CastStatus::Compatible, "{:?}", v);
        assert_eq!(back.value, v);
    }
}

#[test]
fn test_string_to_bigint_boundaries() {
    let reg = reg();
    let big = reg.resolve_default(DomainKind::Bigint);
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));

    let sixty_three = "9".repeat(63);
    let c = cast(
        &Value::string(varchar.clone(), sixty_three),
        &big,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Compatible);

    let sixty_four = "9".repeat(64);
    let c = cast(
        &Value::string(varchar.clone(), sixty_four),
        &big,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Truncated);
    assert_eq!(c.value, Value::Bigint(i64::MAX));
}

#[test]
fn test_hex_literal_high_nibble() {
    let reg = reg();
    let big = reg.resolve_default(DomainKind::Bigint);
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));
    let c = cast(
        &Value::string(varchar.clone(), "0x7fffffffffffffff"),
        &big,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Compatible);
    assert_eq!(c.value, Value::Bigint(i64::MAX));

    let c = cast(
        &Value::string(varchar, "0x8000000000000000"),
        &big,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Truncated);
    assert_eq!(c.value, Value::Bigint(i64::MAX));
}

#[test]
fn test_string_scanner_stops_at_invalid() {
    let reg = reg();
    let int_d = reg.resolve_default(DomainKind::Int);
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));
    let c = cast(
        &Value::string(varchar.clone(), "  123abc"),
        &int_d,
        &CastOpts::default(),
    );
    assert_eq!(c.value, Value::Int(123));
    let c = cast(
        &Value::string(varchar, "abc"),
        &int_d,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Incompatible);
}

#[test]
fn test_steal_string_shares_buffer() {
    let reg = reg();
    let wide = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(100));
    let narrow = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(10));
    let v = Value::string(narrow, "abcdefgh");
    let c = cast(&v, &wide, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Compatible);
    match (&v, &c.value) {
        (Value::Str(a), Value::Str(b)) => {
            assert!(Arc::ptr_eq(&a.text, &b.text));
            assert!(Arc::ptr_eq(&b.domain, &wide));
        }
        _ => panic!("expected strings"),
    }
}

#[test]
fn test_string_narrowing_modes() {
    let reg = reg();
    let narrow = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(3));
    let wide = reg.intern(Domain::draft(DomainKind::Varchar));
    let v = Value::string(wide, "abcdef");

    let c = cast(&v, &narrow, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Overflow);

    let c = cast(&v, &narrow, &CastOpts::explicit());
    assert_eq!(c.status, CastStatus::Truncated);
    match c.value {
        Value::Str(s) => assert_eq!(s.text.as_ref(), "abc"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn test_varchar_to_blob_explicit_only() {
    let reg = reg();
    let blob = reg.resolve_default(DomainKind::Blob);
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));
    let v = Value::string(varchar, "lob-payload");
    let c = cast(&v, &blob, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Incompatible);
    let c = cast(&v, &blob, &CastOpts::explicit());
    assert_eq!(c.status, CastStatus::Compatible);
}

#[test]
fn test_enum_matching() {
    let reg = reg();
    let labels: Vec<Arc<str>> = vec!["red".into(), "green".into(), "blue".into()];
    let enum_d = reg.intern(Domain::draft(DomainKind::Enumeration).with_enum_labels(labels));
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));

    let c = cast(
        &Value::string(varchar.clone(), "  green  "),
        &enum_d,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Compatible);
    match &c.value {
        Value::Enum(e) => assert_eq!(e.index, 2),
        other => panic!("expected enum, got {:?}", other),
    }

    let c = cast(
        &Value::string(varchar.clone(), ""),
        &enum_d,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Compatible);
    match &c.value {
        Value::Enum(e) => assert_eq!(e.index, 0),
        other => panic!("expected enum, got {:?}", other),
    }

    let c = cast(
        &Value::string(varchar, "mauve"),
        &enum_d,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Incompatible);
}

#[test]
fn test_bit_char_cross_cast() {
    let reg = reg();
    let varbit = reg.intern(Domain::draft(DomainKind::Varbit));
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));

    let c = cast(
        &Value::string(varchar.clone(), "DEAD"),
        &varbit,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Compatible);
    match &c.value {
        Value::Bits(b) => {
            assert_eq!(b.bytes.as_ref(), &[0xde, 0xad]);
            assert_eq!(b.bit_len, 16);
        }
        other => panic!("expected bits, got {:?}", other),
    }
    // and back to hex text
    let back = cast(&c.value, &varchar, &CastOpts::default());
    match &back.value {
        Value::Str(s) => assert_eq!(s.text.as_ref(), "DEAD"),
        other => panic!("expected string, got {:?}", other),
    }

    let c = cast(
        &Value::string(varchar, "no-hex"),
        &varbit,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Error);
}

#[test]
fn test_collection_cast_and_sharing() {
    let reg = reg();
    let int_d = reg.resolve_default(DomainKind::Int);
    let seq_of_int = reg.construct(DomainKind::Sequence, None, -1, 0, vec![int_d.clone()]);
    let set_of_int = reg.construct(DomainKind::Set, None, -1, 0, vec![int_d]);

    let seq = Value::collection(
        seq_of_int.clone(),
        vec![Value::Int(1), Value::Int(2), Value::Int(2)],
    );

    // strictly-compatible elements: the vector is shared, not copied
    let c = cast(&seq, &seq_of_int, &CastOpts::default());
    match (&seq, &c.value) {
        (Value::Coll(a), Value::Coll(b)) => assert!(Arc::ptr_eq(&a.elems, &b.elems)),
        _ => panic!("expected collections"),
    }

    // set coercion dedups
    let c = cast(&seq, &set_of_int, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Compatible);
    match &c.value {
        Value::Coll(s) => assert_eq!(s.elems.len(), 2),
        other => panic!("expected collection, got {:?}", other),
    }
}

#[test]
fn test_collection_elementwise_cast() {
    let reg = reg();
    let short_d = reg.resolve_default(DomainKind::Short);
    let seq_of_short = reg.construct(DomainKind::Sequence, None, -1, 0, vec![short_d]);
    let int_seq = reg.construct(
        DomainKind::Sequence,
        None,
        -1,
        0,
        vec![reg.resolve_default(DomainKind::Int)],
    );
    let seq = Value::collection(int_seq.clone(), vec![Value::Int(5), Value::Int(700)]);
    let c = cast(&seq, &seq_of_short, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Compatible);
    match &c.value {
        Value::Coll(s) => assert_eq!(s.elems.as_ref(), &vec![Value::Short(5), Value::Short(700)]),
        other => panic!("expected collection, got {:?}", other),
    }

    // element overflow surfaces as the collection's status
    let seq = Value::collection(int_seq, vec![Value::Int(40000)]);
    let c = cast(&seq, &seq_of_short, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Overflow);
}

#[test]
fn test_timestamp_datetime_through_session_tz() {
    let reg = reg();
    let ts_d = reg.resolve_default(DomainKind::Timestamp);
    let dt_d = reg.resolve_default(DomainKind::Datetime);

    let mut opts = CastOpts::default();
    opts.tz = SessionTz::fixed(9 * 3600); // UTC+9

    // wall 1970-01-01 09:00:00 in UTC+9 is epoch 0
    let wall = Value::Datetime(9 * 3600 * 1000);
    let c = cast(&wall, &ts_d, &opts);
    assert_eq!(c.status, CastStatus::Compatible);
    assert_eq!(c.value, Value::Timestamp(0));

    let back = cast(&c.value, &dt_d, &opts);
    assert_eq!(back.value, wall);

    // pre-epoch wall time in UTC does not fit the timestamp window
    let c = cast(&Value::Datetime(-1000), &ts_d, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Overflow);
}

#[test]
fn test_string_to_temporal_parsing() {
    let reg = reg();
    let date_d = reg.resolve_default(DomainKind::Date);
    let time_d = reg.resolve_default(DomainKind::Time);
    let dt_d = reg.resolve_default(DomainKind::Datetime);
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));

    let c = cast(
        &Value::string(varchar.clone(), "2001-02-03"),
        &date_d,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Compatible);

    let c = cast(
        &Value::string(varchar.clone(), "11:30:15 pm"),
        &time_d,
        &CastOpts::default(),
    );
    assert_eq!(c.value, Value::Time(23 * 3600 + 30 * 60 + 15));

    let c = cast(
        &Value::string(varchar.clone(), "2001-02-03 04:05:06"),
        &dt_d,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Compatible);

    let c = cast(
        &Value::string(varchar, "not a datetime"),
        &dt_d,
        &CastOpts::default(),
    );
    assert_eq!(c.status, CastStatus::Incompatible);
}

#[test]
fn test_numeric_casts() {
    let reg = reg();
    let num_d = reg.construct(DomainKind::Numeric, None, 10, 2, Vec::new());
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar));

    let c = cast(&Value::Int(1234), &num_d, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Compatible);
    match &c.value {
        Value::Numeric(n) => {
            assert_eq!(n.mantissa, 123400);
            assert_eq!(n.format(), "1234.00");
        }
        other => panic!("expected numeric, got {:?}", other),
    }

    let c = cast(
        &Value::string(varchar, "12.345"),
        &num_d,
        &CastOpts::default(),
    );
    match &c.value {
        // round-half-away on the dropped fraction digit
        Value::Numeric(n) => assert_eq!(n.mantissa, 1235),
        other => panic!("expected numeric, got {:?}", other),
    }

    // 10^8 needs 11 digits at scale 2; precision 10 cannot hold it
    let c = cast(&Value::Bigint(100_000_000), &num_d, &CastOpts::default());
    assert_eq!(c.status, CastStatus::Overflow);

    // numeric back to integer rounds half away from zero
    let n = cast(&Value::Int(7), &num_d, &CastOpts::default()).value;
    let back = cast(&n, &reg.resolve_default(DomainKind::Int), &CastOpts::default());
    assert_eq!(back.value, Value::Int(7));
}

#[test]
fn test_implicit_same_domain_is_value_identity() {
    let reg = reg();
    let varchar = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(20));
    let v = Value::string(varchar.clone(), "hello");
    let c = cast(
        &v,
        &varchar,
        &CastOpts {
            mode: CoercionMode::Implicit,
            ..CastOpts::default()
        },
    );
    assert_eq!(c.status, CastStatus::Compatible);
    assert_eq!(c.value, v);
}
