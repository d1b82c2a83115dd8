// The coercion engine: compute a target-domain value from a source-domain
// value. Every outcome is a status, not a panic; the dest of a failed cast
// is NULL (optionally NULL-of-the-target-domain, for callers that need the
// slot typed anyway). Per-call only, no shared state, and no cancellation
// points: a coercion either finishes or fails.

use crate::datetime as dtu;
use crate::domain::{Codeset, CollationFlag, Domain, DomainKind, MatchLevel};
use crate::numparse::{scan_number, ScanStatus};
use crate::value::{
    pow10_i128, BitVal, CollVal, Currency, EnumVal, LobVal, MonetaryVal, NumericVal, ObjVal,
    StrVal, Value, NUMERIC_MAX_PRECISION,
};
use oxbow_base::SessionTz;
use ordered_float::OrderedFloat;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CoercionMode {
    /// Coercions the engine may apply on its own. Rejects the pairs that are
    /// only legal when a user asked for them.
    #[default]
    Implicit,
    Explicit,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CastOpts {
    pub mode: CoercionMode,
    /// On failure, leave a NULL tagged with the target domain instead of a
    /// bare NULL.
    pub preserve_domain: bool,
    pub tz: SessionTz,
}

impl CastOpts {
    pub fn explicit() -> CastOpts {
        CastOpts {
            mode: CoercionMode::Explicit,
            ..CastOpts::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CastStatus {
    Compatible,
    Truncated,
    Overflow,
    Incompatible,
    Error,
}

impl CastStatus {
    pub fn ok(self) -> bool {
        matches!(self, CastStatus::Compatible | CastStatus::Truncated)
    }

    fn worse(self, other: CastStatus) -> CastStatus {
        self.max(other)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Coerced {
    pub status: CastStatus,
    pub value: Value,
}

impl Coerced {
    fn good(value: Value) -> Coerced {
        Coerced {
            status: CastStatus::Compatible,
            value,
        }
    }

    fn with(status: CastStatus, value: Value) -> Coerced {
        Coerced { status, value }
    }

    fn failed(status: CastStatus, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
        let value = if opts.preserve_domain {
            Value::null_of(target.clone())
        } else {
            Value::null()
        };
        Coerced { status, value }
    }
}

/// Cast `src` into `target`'s domain.
pub fn cast(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    use DomainKind::*;

    // NULL in, NULL out; the dest still gets the target domain.
    if src.is_null() {
        return Coerced::good(Value::null_of(target.clone()));
    }
    let sk = src.kind();
    let tk = target.kind();

    if opts.mode == CoercionMode::Implicit && explicit_only(sk, tk) {
        return Coerced::failed(CastStatus::Incompatible, target, opts);
    }

    // Same kind and nothing parameterized to reconcile: clone only.
    if sk == tk && !tk.is_parameterized() {
        return Coerced::good(src.clone());
    }

    match tk {
        Null => Coerced::good(Value::null_of(target.clone())),
        Variable => Coerced::good(src.clone()),
        Short | Int | Bigint => to_integer(src, target, opts),
        Float | Double => to_float(src, target, opts),
        Numeric => to_numeric(src, target, opts),
        Monetary => to_monetary(src, target, opts),
        Date | Time | Timestamp | Datetime => to_temporal(src, target, opts),
        Char | Varchar | Nchar | Varnchar => to_string_kind(src, target, opts),
        Bit | Varbit => to_bits(src, target, opts),
        Enumeration => to_enum(src, target, opts),
        Set | Multiset | Sequence => to_collection(src, target, opts),
        Midxkey => to_midxkey(src, target, opts),
        Object | Vobj => to_object(src, target, opts),
        Oid => to_oid(src, target, opts),
        Blob | Clob => to_lob(src, target, opts),
    }
}

/// Coercions that only explicit casts may perform.
fn explicit_only(from: DomainKind, to: DomainKind) -> bool {
    use DomainKind::*;
    (from.is_char_family() && matches!(to, Blob | Clob))
        || (matches!(from, Blob | Clob) && to.is_char_family())
        || (from == Object && to == Vobj)
}

// Integer extraction from any numeric-valued source. `Truncated` only comes
// from the string scanner.
enum IntExtract {
    Got(i64, CastStatus),
    Overflow,
    BadLiteral,
    NoPath,
}

fn extract_i64(src: &Value) -> IntExtract {
    match src {
        Value::Short(v) => IntExtract::Got(*v as i64, CastStatus::Compatible),
        Value::Int(v) => IntExtract::Got(*v as i64, CastStatus::Compatible),
        Value::Bigint(v) => IntExtract::Got(*v, CastStatus::Compatible),
        Value::Float(f) => float_to_i64(f.0 as f64),
        Value::Double(f) => float_to_i64(f.0),
        Value::Numeric(n) => IntExtract::Got(n.to_i64_rounded(), CastStatus::Compatible),
        Value::Monetary(m) => float_to_i64(m.amount.0),
        Value::Enum(e) => IntExtract::Got(e.index as i64, CastStatus::Compatible),
        Value::Str(s) => match scan_number(s.text.as_bytes()) {
            Some(scan) => {
                let (v, st) = scan.to_i64();
                let status = match st {
                    ScanStatus::Clean => CastStatus::Compatible,
                    ScanStatus::Truncated => CastStatus::Truncated,
                };
                IntExtract::Got(v, status)
            }
            None => IntExtract::BadLiteral,
        },
        _ => IntExtract::NoPath,
    }
}

fn float_to_i64(f: f64) -> IntExtract {
    if !f.is_finite() {
        return IntExtract::Overflow;
    }
    // Round to nearest, half away from zero, then range-check.
    let r = f.round();
    if r < i64::MIN as f64 || r > i64::MAX as f64 {
        return IntExtract::Overflow;
    }
    IntExtract::Got(r as i64, CastStatus::Compatible)
}

fn to_integer(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    let (v, status) = match extract_i64(src) {
        IntExtract::Got(v, st) => (v, st),
        IntExtract::Overflow => return Coerced::failed(CastStatus::Overflow, target, opts),
        IntExtract::BadLiteral | IntExtract::NoPath => {
            return Coerced::failed(CastStatus::Incompatible, target, opts)
        }
    };
    let value = match target.kind() {
        DomainKind::Short => match i16::try_from(v) {
            Ok(v) => Value::Short(v),
            Err(_) => return Coerced::failed(CastStatus::Overflow, target, opts),
        },
        DomainKind::Int => match i32::try_from(v) {
            Ok(v) => Value::Int(v),
            Err(_) => return Coerced::failed(CastStatus::Overflow, target, opts),
        },
        _ => Value::Bigint(v),
    };
    Coerced::with(status, value)
}

fn extract_f64(src: &Value) -> Option<Option<f64>> {
    // Outer None: no path from this kind. Inner None: bad literal.
    match src {
        Value::Short(v) => Some(Some(*v as f64)),
        Value::Int(v) => Some(Some(*v as f64)),
        Value::Bigint(v) => Some(Some(*v as f64)),
        Value::Float(f) => Some(Some(f.0 as f64)),
        Value::Double(f) => Some(Some(f.0)),
        Value::Numeric(n) => Some(Some(n.to_f64())),
        Value::Monetary(m) => Some(Some(m.amount.0)),
        Value::Enum(e) => Some(Some(e.index as f64)),
        Value::Str(s) => Some(scan_number(s.text.as_bytes()).map(|scan| scan.to_f64())),
        _ => None,
    }
}

fn to_float(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    let v = match extract_f64(src) {
        Some(Some(v)) => v,
        Some(None) => return Coerced::failed(CastStatus::Incompatible, target, opts),
        None => return Coerced::failed(CastStatus::Incompatible, target, opts),
    };
    if !v.is_finite() {
        return Coerced::failed(CastStatus::Overflow, target, opts);
    }
    match target.kind() {
        DomainKind::Float => {
            if v != 0.0 && v.abs() > f32::MAX as f64 {
                return Coerced::failed(CastStatus::Overflow, target, opts);
            }
            Coerced::good(Value::Float(OrderedFloat(v as f32)))
        }
        _ => Coerced::good(Value::Double(OrderedFloat(v))),
    }
}

fn to_numeric(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    let precision = target.precision().clamp(1, NUMERIC_MAX_PRECISION as i32) as u8;
    let scale = target.scale().clamp(0, precision as i32) as u8;
    let made = match src {
        Value::Short(v) => NumericVal::from_i64(*v as i64, precision, scale),
        Value::Int(v) => NumericVal::from_i64(*v as i64, precision, scale),
        Value::Bigint(v) => NumericVal::from_i64(*v, precision, scale),
        Value::Float(f) => NumericVal::from_f64(f.0 as f64, precision, scale),
        Value::Double(f) => NumericVal::from_f64(f.0, precision, scale),
        Value::Monetary(m) => NumericVal::from_f64(m.amount.0, precision, scale),
        Value::Numeric(n) => rescale_numeric(n, precision, scale),
        Value::Str(s) => match scan_number(s.text.as_bytes()) {
            Some(scan) => {
                if scan.is_hex {
                    let (v, _) = scan.to_i64();
                    NumericVal::from_i64(v, precision, scale)
                } else {
                    match scan_to_numeric(&scan, precision, scale) {
                        Some(n) => Some(n),
                        None => return Coerced::failed(CastStatus::Overflow, target, opts),
                    }
                }
            }
            None => return Coerced::failed(CastStatus::Incompatible, target, opts),
        },
        _ => return Coerced::failed(CastStatus::Incompatible, target, opts),
    };
    match made {
        Some(n) => Coerced::good(Value::Numeric(n)),
        None => Coerced::failed(CastStatus::Overflow, target, opts),
    }
}

fn rescale_numeric(n: &NumericVal, precision: u8, scale: u8) -> Option<NumericVal> {
    let m = if scale >= n.scale {
        n.mantissa
            .checked_mul(pow10_i128((scale - n.scale) as u32))?
    } else {
        let p = pow10_i128((n.scale - scale) as u32);
        let q = n.mantissa / p;
        let r = n.mantissa % p;
        if r.abs() >= p / 2 {
            q + n.mantissa.signum()
        } else {
            q
        }
    };
    NumericVal::new(m, precision, scale)
}

fn scan_to_numeric(
    scan: &crate::numparse::ScannedNum<'_>,
    precision: u8,
    scale: u8,
) -> Option<NumericVal> {
    // Mantissa = the digit string with the point moved right by `scale`.
    let digits: Vec<u8> = scan
        .int_digits
        .iter()
        .chain(scan.frac_digits.iter())
        .copied()
        .collect();
    let take = scan.int_digits.len() as i64 + scan.exponent + scale as i64;
    if take < 0 {
        return NumericVal::new(0, precision, scale);
    }
    let mut acc: i128 = 0;
    for k in 0..take {
        let d = if (k as usize) < digits.len() {
            digits[k as usize] - b'0'
        } else {
            0
        };
        acc = acc.checked_mul(10)?.checked_add(d as i128)?;
        if acc >= pow10_i128(NUMERIC_MAX_PRECISION as u32) {
            return None;
        }
    }
    let round_digit = if (take as usize) < digits.len() {
        digits[take as usize] - b'0'
    } else {
        0
    };
    if round_digit >= 5 {
        acc += 1;
    }
    if scan.negative {
        acc = -acc;
    }
    NumericVal::new(acc, precision, scale)
}

fn to_monetary(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    let v = match extract_f64(src) {
        Some(Some(v)) if v.is_finite() => v,
        Some(Some(_)) => return Coerced::failed(CastStatus::Overflow, target, opts),
        _ => return Coerced::failed(CastStatus::Incompatible, target, opts),
    };
    Coerced::good(Value::Monetary(MonetaryVal {
        amount: OrderedFloat(v),
        currency: Currency::default(),
    }))
}

fn to_temporal(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    use DomainKind::*;
    let tz = opts.tz;
    let tk = target.kind();
    let out = match (src, tk) {
        (Value::Str(s), Date) => dtu::parse_date(&s.text).map(|d| Value::Date(dtu::date_to_days(d))),
        (Value::Str(s), Time) => {
            dtu::parse_time(&s.text).map(|t| Value::Time(dtu::time_to_secs(t)))
        }
        (Value::Str(s), Datetime) => {
            dtu::parse_datetime(&s.text).map(|dt| Value::Datetime(dtu::naive_to_wall_millis(dt)))
        }
        (Value::Str(s), Timestamp) => match dtu::parse_datetime(&s.text) {
            Some(dt) => {
                let wall = dtu::naive_to_wall_millis(dt);
                match dtu::wall_millis_to_epoch(wall, tz.offset_secs()) {
                    Some(epoch) => Some(Value::Timestamp(epoch)),
                    None => return Coerced::failed(CastStatus::Overflow, target, opts),
                }
            }
            None => None,
        },
        (Value::Date(days), Datetime) => date_to_wall(*days).map(Value::Datetime),
        (Value::Date(days), Timestamp) => match date_to_wall(*days) {
            Some(wall) => match dtu::wall_millis_to_epoch(wall, tz.offset_secs()) {
                Some(epoch) => Some(Value::Timestamp(epoch)),
                None => return Coerced::failed(CastStatus::Overflow, target, opts),
            },
            None => None,
        },
        (Value::Datetime(ms), Date) => {
            dtu::wall_millis_to_naive(*ms).map(|dt| Value::Date(dtu::date_to_days(dt.date())))
        }
        (Value::Datetime(ms), Time) => {
            dtu::wall_millis_to_naive(*ms).map(|dt| Value::Time(dtu::time_to_secs(dt.time())))
        }
        (Value::Datetime(ms), Timestamp) => {
            match dtu::wall_millis_to_epoch(*ms, tz.offset_secs()) {
                Some(epoch) => Some(Value::Timestamp(epoch)),
                None => return Coerced::failed(CastStatus::Overflow, target, opts),
            }
        }
        (Value::Timestamp(epoch), Datetime) => Some(Value::Datetime(dtu::epoch_to_wall_millis(
            *epoch,
            tz.offset_secs(),
        ))),
        (Value::Timestamp(epoch), Date) => {
            dtu::wall_millis_to_naive(dtu::epoch_to_wall_millis(*epoch, tz.offset_secs()))
                .map(|dt| Value::Date(dtu::date_to_days(dt.date())))
        }
        (Value::Timestamp(epoch), Time) => {
            dtu::wall_millis_to_naive(dtu::epoch_to_wall_millis(*epoch, tz.offset_secs()))
                .map(|dt| Value::Time(dtu::time_to_secs(dt.time())))
        }
        (Value::Int(v), Timestamp) => return epoch_from_int(*v as i64, target, opts),
        (Value::Bigint(v), Timestamp) => return epoch_from_int(*v, target, opts),
        _ => return Coerced::failed(CastStatus::Incompatible, target, opts),
    };
    match out {
        Some(v) => Coerced::good(v),
        None => Coerced::failed(CastStatus::Incompatible, target, opts),
    }
}

fn date_to_wall(days: i32) -> Option<i64> {
    let d = dtu::days_to_date(days)?;
    d.and_hms_opt(0, 0, 0).map(dtu::naive_to_wall_millis)
}

fn epoch_from_int(v: i64, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    if (dtu::TIMESTAMP_MIN..=dtu::TIMESTAMP_MAX).contains(&v) {
        Coerced::good(Value::Timestamp(v))
    } else {
        Coerced::failed(CastStatus::Overflow, target, opts)
    }
}

fn str_length(codeset: Codeset, s: &str) -> usize {
    match codeset {
        Codeset::Utf8 => s.chars().count(),
        _ => s.len(),
    }
}

fn truncate_str(codeset: Codeset, s: &str, precision: usize) -> String {
    match codeset {
        Codeset::Utf8 => s.chars().take(precision).collect(),
        _ => s.as_bytes()[..precision.min(s.len())]
            .iter()
            .map(|b| *b as char)
            .collect(),
    }
}

fn collation_ok(src: &Domain, target: &Domain) -> bool {
    src.collation() == target.collation()
        || target.coll_flag() != CollationFlag::Normal
        || src.coll_flag() == CollationFlag::Leave
}

fn to_string_kind(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    // String-to-string first: this is the steal-string path, a pointer copy
    // of the payload under a new domain tag whenever the target can hold it.
    if let Value::Str(s) = src {
        if !collation_ok(&s.domain, target) {
            return Coerced::failed(CastStatus::Incompatible, target, opts);
        }
        let len = str_length(target.codeset(), &s.text);
        if target.has_floating_precision() || len <= target.precision() as usize {
            return Coerced::good(Value::Str(StrVal {
                domain: target.clone(),
                text: s.text.clone(),
            }));
        }
        return match opts.mode {
            CoercionMode::Explicit => {
                let cut = truncate_str(target.codeset(), &s.text, target.precision() as usize);
                Coerced::with(
                    CastStatus::Truncated,
                    Value::Str(StrVal {
                        domain: target.clone(),
                        text: cut.into(),
                    }),
                )
            }
            CoercionMode::Implicit => Coerced::failed(CastStatus::Overflow, target, opts),
        };
    }

    let text: String = match src {
        Value::Short(v) => format!("{}", v),
        Value::Int(v) => format!("{}", v),
        Value::Bigint(v) => format!("{}", v),
        Value::Float(f) => format!("{}", f.0),
        Value::Double(f) => format!("{}", f.0),
        Value::Numeric(n) => n.format(),
        Value::Monetary(m) => format!("{}", m.amount.0),
        Value::Date(days) => dtu::format_date(*days),
        Value::Time(secs) => dtu::format_time(*secs),
        Value::Datetime(ms) => dtu::format_wall_millis(*ms),
        Value::Timestamp(epoch) => {
            dtu::format_wall_millis(dtu::epoch_to_wall_millis(*epoch, opts.tz.offset_secs()))
        }
        Value::Bits(b) => hex_of_bits(b),
        Value::Enum(e) => e.label().unwrap_or("").to_string(),
        _ => return Coerced::failed(CastStatus::Incompatible, target, opts),
    };
    let len = str_length(target.codeset(), &text);
    if target.has_floating_precision() || len <= target.precision() as usize {
        return Coerced::good(Value::Str(StrVal {
            domain: target.clone(),
            text: text.into(),
        }));
    }
    match opts.mode {
        CoercionMode::Explicit => {
            let cut = truncate_str(target.codeset(), &text, target.precision() as usize);
            Coerced::with(
                CastStatus::Truncated,
                Value::Str(StrVal {
                    domain: target.clone(),
                    text: cut.into(),
                }),
            )
        }
        CoercionMode::Implicit => Coerced::failed(CastStatus::Overflow, target, opts),
    }
}

fn hex_of_bits(b: &BitVal) -> String {
    let mut out = String::with_capacity(b.bytes.len() * 2);
    for byte in b.bytes.iter() {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

fn to_bits(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    match src {
        Value::Bits(b) => {
            if target.has_floating_precision() || b.bit_len <= target.precision() as usize {
                return Coerced::good(Value::Bits(BitVal {
                    domain: target.clone(),
                    bytes: b.bytes.clone(),
                    bit_len: b.bit_len,
                }));
            }
            match opts.mode {
                CoercionMode::Explicit => {
                    let bit_len = target.precision() as usize;
                    let nbytes = bit_len.div_ceil(8);
                    let bytes: Arc<[u8]> = b.bytes[..nbytes.min(b.bytes.len())].into();
                    Coerced::with(
                        CastStatus::Truncated,
                        Value::Bits(BitVal {
                            domain: target.clone(),
                            bytes,
                            bit_len,
                        }),
                    )
                }
                CoercionMode::Implicit => Coerced::failed(CastStatus::Overflow, target, opts),
            }
        }
        Value::Str(s) => {
            // Hex pairs; any non-hex character is an error, not a mismatch.
            let mut bytes = Vec::with_capacity(s.text.len() / 2 + 1);
            let mut nibbles = 0usize;
            let mut cur: u8 = 0;
            for ch in s.text.bytes() {
                let v = match ch {
                    b'0'..=b'9' => ch - b'0',
                    b'a'..=b'f' => ch - b'a' + 10,
                    b'A'..=b'F' => ch - b'A' + 10,
                    _ => return Coerced::failed(CastStatus::Error, target, opts),
                };
                if nibbles % 2 == 0 {
                    cur = v << 4;
                } else {
                    bytes.push(cur | v);
                }
                nibbles += 1;
            }
            if nibbles % 2 == 1 {
                bytes.push(cur);
            }
            let bit_len = nibbles * 4;
            if !target.has_floating_precision() && bit_len > target.precision() as usize {
                return match opts.mode {
                    CoercionMode::Explicit => {
                        let keep = target.precision() as usize;
                        let nbytes = keep.div_ceil(8);
                        bytes.truncate(nbytes);
                        Coerced::with(
                            CastStatus::Truncated,
                            Value::bits(target.clone(), bytes, keep),
                        )
                    }
                    CoercionMode::Implicit => Coerced::failed(CastStatus::Overflow, target, opts),
                };
            }
            Coerced::good(Value::bits(target.clone(), bytes, bit_len))
        }
        _ => Coerced::failed(CastStatus::Incompatible, target, opts),
    }
}

fn to_enum(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    let labels = target.enum_labels();
    match src {
        Value::Str(s) => {
            let trimmed = s.text.trim();
            // Labels compare under the domain collation; the capability here
            // is binary equality.
            if let Some(pos) = labels.iter().position(|l| l.as_ref() == trimmed) {
                return Coerced::good(Value::Enum(EnumVal {
                    domain: target.clone(),
                    index: (pos + 1) as u16,
                }));
            }
            if trimmed.is_empty() {
                return Coerced::good(Value::Enum(EnumVal {
                    domain: target.clone(),
                    index: 0,
                }));
            }
            Coerced::failed(CastStatus::Incompatible, target, opts)
        }
        Value::Short(_) | Value::Int(_) | Value::Bigint(_) => {
            let v = match extract_i64(src) {
                IntExtract::Got(v, _) => v,
                _ => return Coerced::failed(CastStatus::Incompatible, target, opts),
            };
            if v < 0 || v as usize > labels.len() {
                return Coerced::failed(CastStatus::Overflow, target, opts);
            }
            Coerced::good(Value::Enum(EnumVal {
                domain: target.clone(),
                index: v as u16,
            }))
        }
        Value::Enum(e) => {
            if Arc::ptr_eq(&e.domain, target) || e.domain.matches(target, MatchLevel::Exact) {
                return Coerced::good(Value::Enum(EnumVal {
                    domain: target.clone(),
                    index: e.index,
                }));
            }
            match e.label() {
                Some(label) => match labels.iter().position(|l| l.as_ref() == label) {
                    Some(pos) => Coerced::good(Value::Enum(EnumVal {
                        domain: target.clone(),
                        index: (pos + 1) as u16,
                    })),
                    None => Coerced::failed(CastStatus::Incompatible, target, opts),
                },
                None => Coerced::good(Value::Enum(EnumVal {
                    domain: target.clone(),
                    index: 0,
                })),
            }
        }
        _ => Coerced::failed(CastStatus::Incompatible, target, opts),
    }
}

/// Lazy per-element cast stream for collection coercion. Elements are cast
/// one at a time as the consumer advances, so a large source collection
/// never materializes an intermediate of cast results.
pub struct ElementCasts<'a> {
    elems: std::slice::Iter<'a, Value>,
    targets: &'a [Arc<Domain>],
    opts: &'a CastOpts,
}

pub fn element_casts<'a>(
    elems: &'a [Value],
    targets: &'a [Arc<Domain>],
    opts: &'a CastOpts,
) -> ElementCasts<'a> {
    ElementCasts {
        elems: elems.iter(),
        targets,
        opts,
    }
}

impl Iterator for ElementCasts<'_> {
    type Item = Coerced;

    fn next(&mut self) -> Option<Coerced> {
        let v = self.elems.next()?;
        Some(match pick_element_target(v, self.targets) {
            Some(t) => cast(v, t, self.opts),
            None => Coerced::good(v.clone()),
        })
    }
}

fn pick_element_target<'a>(v: &Value, targets: &'a [Arc<Domain>]) -> Option<&'a Arc<Domain>> {
    if targets.is_empty() {
        return None;
    }
    targets
        .iter()
        .find(|t| t.kind() == v.kind())
        .or_else(|| targets.first())
}

fn element_strictly_compatible(v: &Value, targets: &[Arc<Domain>]) -> bool {
    if targets.is_empty() {
        return true;
    }
    match v {
        Value::Str(s) => targets
            .iter()
            .any(|t| s.domain.matches(t, MatchLevel::Exact)),
        Value::Bits(b) => targets
            .iter()
            .any(|t| b.domain.matches(t, MatchLevel::Exact)),
        Value::Enum(e) => targets
            .iter()
            .any(|t| e.domain.matches(t, MatchLevel::Exact)),
        Value::Coll(c) => targets
            .iter()
            .any(|t| c.domain.matches(t, MatchLevel::Exact)),
        Value::Object(o) => targets.iter().any(|t| o.domain.matches(t, MatchLevel::Set)),
        Value::Null(_) => true,
        other => targets.iter().any(|t| t.kind() == other.kind()),
    }
}

fn to_collection(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    let src_elems: Vec<Value>;
    let elems: &[Value] = match src {
        Value::Coll(c) => {
            // Strictly-compatible element domains short-circuit to sharing
            // the element vector under the new domain tag.
            if c.elems
                .iter()
                .all(|v| element_strictly_compatible(v, target.elements()))
                && (target.kind() != DomainKind::Set || all_distinct(&c.elems))
            {
                return Coerced::good(Value::Coll(CollVal {
                    domain: target.clone(),
                    elems: c.elems.clone(),
                }));
            }
            &c.elems
        }
        // A scalar coerces into a singleton collection.
        other => {
            src_elems = vec![other.clone()];
            &src_elems
        }
    };

    let mut out = Vec::with_capacity(elems.len());
    let mut status = CastStatus::Compatible;
    for c in element_casts(elems, target.elements(), opts) {
        status = status.worse(c.status);
        if !status.ok() {
            return Coerced::failed(status, target, opts);
        }
        out.push(c.value);
    }
    if target.kind() == DomainKind::Set {
        dedup_in_place(&mut out);
    }
    Coerced::with(status, Value::collection(target.clone(), out))
}

fn all_distinct(elems: &[Value]) -> bool {
    for (i, a) in elems.iter().enumerate() {
        if elems[i + 1..].contains(a) {
            return false;
        }
    }
    true
}

fn dedup_in_place(elems: &mut Vec<Value>) {
    let mut seen: Vec<Value> = Vec::with_capacity(elems.len());
    elems.retain(|v| {
        if seen.contains(v) {
            false
        } else {
            seen.push(v.clone());
            true
        }
    });
}

fn to_midxkey(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    let elems = match src {
        Value::Coll(c) => &c.elems,
        _ => return Coerced::failed(CastStatus::Incompatible, target, opts),
    };
    if elems.len() != target.elements().len() {
        return Coerced::failed(CastStatus::Incompatible, target, opts);
    }
    let mut out = Vec::with_capacity(elems.len());
    let mut status = CastStatus::Compatible;
    for (v, t) in elems.iter().zip(target.elements().iter()) {
        let c = cast(v, t, opts);
        status = status.worse(c.status);
        if !status.ok() {
            return Coerced::failed(status, target, opts);
        }
        out.push(c.value);
    }
    Coerced::with(status, Value::collection(target.clone(), out))
}

fn to_object(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    match src {
        Value::Object(o) => {
            let class_ok = target.class_oid().is_none()
                || o.domain.class_oid().is_none()
                || target.class_oid() == o.domain.class_oid();
            if class_ok {
                Coerced::good(Value::Object(ObjVal {
                    domain: target.clone(),
                    oid: o.oid,
                }))
            } else {
                Coerced::failed(CastStatus::Incompatible, target, opts)
            }
        }
        Value::Oid(oid) => Coerced::good(Value::Object(ObjVal {
            domain: target.clone(),
            oid: *oid,
        })),
        _ => Coerced::failed(CastStatus::Incompatible, target, opts),
    }
}

fn to_oid(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    match src {
        Value::Object(o) => Coerced::good(Value::Oid(o.oid)),
        Value::Oid(oid) => Coerced::good(Value::Oid(*oid)),
        _ => Coerced::failed(CastStatus::Incompatible, target, opts),
    }
}

fn to_lob(src: &Value, target: &Arc<Domain>, opts: &CastOpts) -> Coerced {
    match src {
        Value::Lob(l) if l.domain.kind() == target.kind() => {
            Coerced::good(Value::Lob(LobVal {
                domain: target.clone(),
                locator: l.locator.clone(),
            }))
        }
        Value::Str(s) => Coerced::good(Value::Lob(LobVal {
            domain: target.clone(),
            locator: s.text.clone(),
        })),
        _ => Coerced::failed(CastStatus::Incompatible, target, opts),
    }
}
