use crate::domain::{Domain, DomainKind, Oid};
use crate::registry::DomainRegistry;
use ordered_float::OrderedFloat;
use std::sync::Arc;

// A value is a tagged payload plus, for the parameterized kinds, the domain
// that governs it. The payload representations are chosen so that `Value`
// is Eq + Hash: floats are OrderedFloat, strings and byte payloads are
// shared Arcs (which also makes the coercion engine's "steal string"
// re-tagging a pointer copy rather than a data copy).

/// Fixed-point decimal payload: `mantissa / 10^scale`, capped at 38 digits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NumericVal {
    pub mantissa: i128,
    pub precision: u8,
    pub scale: u8,
}

pub(crate) const NUMERIC_MAX_PRECISION: u8 = 38;

pub(crate) fn pow10_i128(n: u32) -> i128 {
    let mut p: i128 = 1;
    for _ in 0..n {
        p *= 10;
    }
    p
}

impl NumericVal {
    pub fn new(mantissa: i128, precision: u8, scale: u8) -> Option<NumericVal> {
        if precision == 0 || precision > NUMERIC_MAX_PRECISION || scale > precision {
            return None;
        }
        if mantissa.abs() >= pow10_i128(precision as u32) {
            return None;
        }
        Some(NumericVal {
            mantissa,
            precision,
            scale,
        })
    }

    pub fn from_i64(v: i64, precision: u8, scale: u8) -> Option<NumericVal> {
        let m = (v as i128).checked_mul(pow10_i128(scale as u32))?;
        NumericVal::new(m, precision, scale)
    }

    pub fn from_f64(v: f64, precision: u8, scale: u8) -> Option<NumericVal> {
        if !v.is_finite() {
            return None;
        }
        let scaled = v * pow10_i128(scale as u32) as f64;
        // Two i128 range guards: the round itself, then the precision cap
        // inside `new`.
        if scaled >= i128::MAX as f64 || scaled <= i128::MIN as f64 {
            return None;
        }
        NumericVal::new(scaled.round() as i128, precision, scale)
    }

    /// Integer interpretation, round-half-away-from-zero.
    pub fn to_i64_rounded(&self) -> i64 {
        let p = pow10_i128(self.scale as u32);
        let q = self.mantissa / p;
        let r = self.mantissa % p;
        let half = p / 2;
        let q = if r.abs() >= half && half > 0 {
            q + self.mantissa.signum()
        } else {
            q
        };
        q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / pow10_i128(self.scale as u32) as f64
    }

    pub fn format(&self) -> String {
        if self.scale == 0 {
            return format!("{}", self.mantissa);
        }
        let p = pow10_i128(self.scale as u32);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let a = self.mantissa.abs();
        format!(
            "{}{}.{:0width$}",
            sign,
            a / p,
            a % p,
            width = self.scale as usize
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Currency {
    #[default]
    Dollar,
    Euro,
    Won,
    Yen,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MonetaryVal {
    pub amount: OrderedFloat<f64>,
    pub currency: Currency,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StrVal {
    pub domain: Arc<Domain>,
    pub text: Arc<str>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BitVal {
    pub domain: Arc<Domain>,
    pub bytes: Arc<[u8]>,
    pub bit_len: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EnumVal {
    pub domain: Arc<Domain>,
    /// 1-based label index; 0 is the reserved "no label" slot.
    pub index: u16,
}

impl EnumVal {
    pub fn label(&self) -> Option<&str> {
        if self.index == 0 {
            return None;
        }
        self.domain
            .enum_labels()
            .get(self.index as usize - 1)
            .map(|l| l.as_ref())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CollVal {
    pub domain: Arc<Domain>,
    pub elems: Arc<Vec<Value>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ObjVal {
    pub domain: Arc<Domain>,
    pub oid: Oid,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LobVal {
    pub domain: Arc<Domain>,
    pub locator: Arc<str>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Value {
    /// NULL, optionally still carrying a domain (every kind admits NULL).
    Null(Option<Arc<Domain>>),
    Short(i16),
    Int(i32),
    Bigint(i64),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    Numeric(NumericVal),
    Monetary(MonetaryVal),
    /// Proleptic days from the common era.
    Date(i32),
    /// Seconds since midnight.
    Time(u32),
    /// Seconds since the unix epoch, UTC.
    Timestamp(i64),
    /// Wall-clock milliseconds (timezone-less), unix-epoch based.
    Datetime(i64),
    Str(StrVal),
    Bits(BitVal),
    Enum(EnumVal),
    Coll(CollVal),
    Object(ObjVal),
    Oid(Oid),
    Lob(LobVal),
}

impl Value {
    pub fn null() -> Value {
        Value::Null(None)
    }

    pub fn null_of(domain: Arc<Domain>) -> Value {
        Value::Null(Some(domain))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    pub fn kind(&self) -> DomainKind {
        match self {
            Value::Null(Some(d)) => d.kind(),
            Value::Null(None) => DomainKind::Null,
            Value::Short(_) => DomainKind::Short,
            Value::Int(_) => DomainKind::Int,
            Value::Bigint(_) => DomainKind::Bigint,
            Value::Float(_) => DomainKind::Float,
            Value::Double(_) => DomainKind::Double,
            Value::Numeric(_) => DomainKind::Numeric,
            Value::Monetary(_) => DomainKind::Monetary,
            Value::Date(_) => DomainKind::Date,
            Value::Time(_) => DomainKind::Time,
            Value::Timestamp(_) => DomainKind::Timestamp,
            Value::Datetime(_) => DomainKind::Datetime,
            Value::Str(s) => s.domain.kind(),
            Value::Bits(b) => b.domain.kind(),
            Value::Enum(_) => DomainKind::Enumeration,
            Value::Coll(c) => c.domain.kind(),
            // Covers Vobj values too; the payload's domain knows which.
            Value::Object(o) => o.domain.kind(),
            Value::Oid(_) => DomainKind::Oid,
            Value::Lob(l) => l.domain.kind(),
        }
    }

    /// The governing domain: the payload's own for parameterized kinds, the
    /// registry default otherwise.
    pub fn domain(&self, reg: &DomainRegistry) -> Arc<Domain> {
        match self {
            Value::Null(Some(d)) => d.clone(),
            Value::Str(s) => s.domain.clone(),
            Value::Bits(b) => b.domain.clone(),
            Value::Enum(e) => e.domain.clone(),
            Value::Coll(c) => c.domain.clone(),
            Value::Object(o) => o.domain.clone(),
            Value::Lob(l) => l.domain.clone(),
            Value::Numeric(n) => {
                reg.construct(
                    DomainKind::Numeric,
                    None,
                    n.precision as i32,
                    n.scale as i32,
                    Vec::new(),
                )
            }
            other => reg.resolve_default(other.kind()),
        }
    }

    pub fn string(domain: Arc<Domain>, text: impl Into<Arc<str>>) -> Value {
        debug_assert!(domain.kind().is_char_family());
        Value::Str(StrVal {
            domain,
            text: text.into(),
        })
    }

    pub fn bits(domain: Arc<Domain>, bytes: impl Into<Arc<[u8]>>, bit_len: usize) -> Value {
        debug_assert!(domain.kind().is_bit_family());
        Value::Bits(BitVal {
            domain,
            bytes: bytes.into(),
            bit_len,
        })
    }

    pub fn collection(domain: Arc<Domain>, elems: Vec<Value>) -> Value {
        Value::Coll(CollVal {
            domain,
            elems: Arc::new(elems),
        })
    }
}
