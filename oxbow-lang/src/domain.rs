use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentinel precision for string and bit domains whose length is not pinned.
pub const FLOATING_PRECISION: i32 = -1;

/// Base kinds a domain can describe. The timezone-carrying temporal variants
/// are folded onto [`TzSpec`] rather than being separate kinds, so the
/// enumeration stays flat. `Midxkey` must stay last: the registry fans its
/// bucket out by element count and indexes past the other kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum DomainKind {
    Null,
    Short,
    Int,
    Bigint,
    Float,
    Double,
    Numeric,
    Monetary,
    Date,
    Time,
    Timestamp,
    Datetime,
    Char,
    Varchar,
    Nchar,
    Varnchar,
    Bit,
    Varbit,
    Object,
    Set,
    Multiset,
    Sequence,
    Blob,
    Clob,
    Enumeration,
    Oid,
    Vobj,
    Variable,
    Midxkey,
}

pub const KIND_COUNT: usize = DomainKind::Midxkey as usize + 1;

impl DomainKind {
    pub fn is_parameterized(self) -> bool {
        use DomainKind::*;
        matches!(
            self,
            Numeric
                | Char
                | Varchar
                | Nchar
                | Varnchar
                | Bit
                | Varbit
                | Object
                | Set
                | Multiset
                | Sequence
                | Blob
                | Clob
                | Enumeration
                | Midxkey
        )
    }

    pub fn is_char_family(self) -> bool {
        use DomainKind::*;
        matches!(self, Char | Varchar | Nchar | Varnchar)
    }

    pub fn is_bit_family(self) -> bool {
        matches!(self, DomainKind::Bit | DomainKind::Varbit)
    }

    /// Variable-length string/bit kinds keep their registry bucket sorted by
    /// precision descending; fixed-length kinds ascending.
    pub fn is_variable_len_str(self) -> bool {
        use DomainKind::*;
        matches!(self, Varchar | Varnchar | Varbit)
    }

    pub fn is_fixed_len_str(self) -> bool {
        use DomainKind::*;
        matches!(self, Char | Nchar | Bit)
    }

    pub fn is_integer(self) -> bool {
        use DomainKind::*;
        matches!(self, Short | Int | Bigint)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, DomainKind::Float | DomainKind::Double)
    }

    pub fn is_temporal(self) -> bool {
        use DomainKind::*;
        matches!(self, Date | Time | Timestamp | Datetime)
    }

    pub fn is_collection(self) -> bool {
        use DomainKind::*;
        matches!(self, Set | Multiset | Sequence)
    }

    /// Fixed default precision applied by `construct` when the caller does
    /// not pin one. Strings and bits default to the floating sentinel.
    pub fn default_precision(self) -> i32 {
        use DomainKind::*;
        match self {
            Short => 5,
            Int => 10,
            Bigint => 19,
            Float => 7,
            Double => 15,
            Monetary => 14,
            Numeric => 15,
            Time => 8,
            Date => 10,
            Timestamp => 19,
            Datetime => 23,
            Char | Varchar | Nchar | Varnchar | Bit | Varbit => FLOATING_PRECISION,
            _ => 0,
        }
    }

    pub fn default_scale(self) -> i32 {
        match self {
            DomainKind::Datetime => 3,
            _ => 0,
        }
    }
}

/// Timezone attribute for the temporal kinds. `Tz` carries an explicit zone,
/// `Ltz` resolves against the session zone at evaluation time.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub enum TzSpec {
    #[default]
    None,
    Tz,
    Ltz,
}

#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub enum Codeset {
    Binary,
    Ascii,
    #[default]
    Utf8,
}

#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub enum CollationFlag {
    /// Collation participates in matching as-is.
    #[default]
    Normal,
    /// The domain's collation wins over the value's on coercion.
    Enforce,
    /// The value keeps its collation; the domain's is advisory.
    Leave,
}

/// Storage identity of an object: volume, page, slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Oid {
    pub volid: i16,
    pub pageid: i32,
    pub slotid: i16,
}

impl Oid {
    pub const fn new(volid: i16, pageid: i32, slotid: i16) -> Self {
        Oid {
            volid,
            pageid,
            slotid,
        }
    }
}

/// How closely two domains must agree to be considered the same.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MatchLevel {
    /// Every attribute equal, precision included. Inserts use this.
    Exact,
    /// String/bit match: same family and charset, candidate precision at
    /// least the required one. Lets the first node of a sorted bucket
    /// satisfy the query without scanning the tail.
    Str,
    /// Base kind only.
    Any,
    /// Exact, but tolerant of a missing class identity on either side of an
    /// object domain.
    Set,
}

/// An immutable descriptor of a value type. Drafts are built with
/// [`Domain::draft`] and friends and only become meaningful once interned
/// through the registry; after that, equal attributes imply pointer
/// identity.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Domain {
    pub(crate) kind: DomainKind,
    pub(crate) precision: i32,
    pub(crate) scale: i32,
    pub(crate) codeset: Codeset,
    pub(crate) collation: i32,
    pub(crate) coll_flag: CollationFlag,
    pub(crate) tz: TzSpec,
    pub(crate) class_oid: Option<Oid>,
    /// Set while a class refers to itself during schema bootstrap; the class
    /// identity is deferred until the OID is published.
    pub(crate) self_ref: bool,
    pub(crate) is_desc: bool,
    pub(crate) elements: Vec<Arc<Domain>>,
    pub(crate) enum_labels: Vec<Arc<str>>,
    /// Attribute digest, precomputed so bucket scans can reject fast.
    pub(crate) sig: u64,
}

impl Domain {
    pub fn draft(kind: DomainKind) -> Domain {
        Domain {
            kind,
            precision: kind.default_precision(),
            scale: kind.default_scale(),
            codeset: Codeset::default(),
            collation: 0,
            coll_flag: CollationFlag::default(),
            tz: TzSpec::default(),
            class_oid: None,
            self_ref: false,
            is_desc: false,
            elements: Vec::new(),
            enum_labels: Vec::new(),
            sig: 0,
        }
    }

    pub fn with_precision(mut self, precision: i32) -> Domain {
        self.precision = precision;
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Domain {
        self.scale = scale;
        self
    }

    pub fn with_collation(mut self, collation: i32, flag: CollationFlag) -> Domain {
        self.collation = collation;
        self.coll_flag = flag;
        self
    }

    pub fn with_tz(mut self, tz: TzSpec) -> Domain {
        self.tz = tz;
        self
    }

    pub fn with_class(mut self, class_oid: Oid) -> Domain {
        self.class_oid = Some(class_oid);
        self
    }

    pub fn with_self_ref(mut self) -> Domain {
        self.self_ref = true;
        self
    }

    pub fn with_descending(mut self) -> Domain {
        self.is_desc = true;
        self
    }

    pub fn with_elements(mut self, elements: Vec<Arc<Domain>>) -> Domain {
        self.elements = elements;
        self
    }

    pub fn with_enum_labels(mut self, labels: Vec<Arc<str>>) -> Domain {
        self.enum_labels = labels;
        self
    }

    pub fn kind(&self) -> DomainKind {
        self.kind
    }

    pub fn precision(&self) -> i32 {
        self.precision
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn codeset(&self) -> Codeset {
        self.codeset
    }

    pub fn collation(&self) -> i32 {
        self.collation
    }

    pub fn coll_flag(&self) -> CollationFlag {
        self.coll_flag
    }

    pub fn tz(&self) -> TzSpec {
        self.tz
    }

    pub fn class_oid(&self) -> Option<Oid> {
        self.class_oid
    }

    pub fn is_self_ref(&self) -> bool {
        self.self_ref
    }

    pub fn is_desc(&self) -> bool {
        self.is_desc
    }

    pub fn elements(&self) -> &[Arc<Domain>] {
        &self.elements
    }

    pub fn enum_labels(&self) -> &[Arc<str>] {
        &self.enum_labels
    }

    /// Floating precision means "whatever the value brings".
    pub fn has_floating_precision(&self) -> bool {
        self.precision == FLOATING_PRECISION
    }

    /// Recompute the attribute digest. Called once by the registry before a
    /// draft is compared against a bucket.
    pub(crate) fn seal(&mut self) {
        let mut buf = Vec::with_capacity(64);
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.precision.to_le_bytes());
        buf.extend_from_slice(&self.scale.to_le_bytes());
        buf.push(self.codeset as u8);
        buf.extend_from_slice(&self.collation.to_le_bytes());
        buf.push(self.coll_flag as u8);
        buf.push(self.tz as u8);
        buf.push(self.is_desc as u8);
        buf.push(self.self_ref as u8);
        if let Some(oid) = self.class_oid {
            buf.extend_from_slice(&oid.volid.to_le_bytes());
            buf.extend_from_slice(&oid.pageid.to_le_bytes());
            buf.extend_from_slice(&oid.slotid.to_le_bytes());
        }
        for e in &self.elements {
            buf.extend_from_slice(&e.sig.to_le_bytes());
        }
        for l in &self.enum_labels {
            buf.extend_from_slice(l.as_bytes());
            buf.push(0);
        }
        self.sig = rapidhash::rapidhash(&buf);
    }

    /// Attribute comparison at the given level. Pointer identity is the
    /// caller's shortcut; this is the slow path behind it.
    pub fn matches(&self, other: &Domain, level: MatchLevel) -> bool {
        if self.kind != other.kind {
            // The one cross-kind case: STR tolerates a fixed/variable pair
            // within the same family.
            let paired = level == MatchLevel::Str
                && ((self.kind.is_char_family() && other.kind.is_char_family())
                    || (self.kind.is_bit_family() && other.kind.is_bit_family()));
            if !paired {
                return false;
            }
        }
        match level {
            MatchLevel::Any => true,
            MatchLevel::Exact => self.sig == other.sig && self.same_attrs(other),
            MatchLevel::Set => {
                if self.kind == DomainKind::Object
                    && (self.class_oid.is_none() || other.class_oid.is_none())
                {
                    let mut a = self.clone();
                    let mut b = other.clone();
                    a.class_oid = None;
                    b.class_oid = None;
                    a.seal();
                    b.seal();
                    a.same_attrs(&b)
                } else {
                    self.sig == other.sig && self.same_attrs(other)
                }
            }
            MatchLevel::Str => {
                self.codeset == other.codeset
                    && self.collation == other.collation
                    && self.is_desc == other.is_desc
                    && (self.has_floating_precision() || self.precision >= other.precision)
            }
        }
    }

    fn same_attrs(&self, other: &Domain) -> bool {
        self.kind == other.kind
            && self.precision == other.precision
            && self.scale == other.scale
            && self.codeset == other.codeset
            && self.collation == other.collation
            && self.coll_flag == other.coll_flag
            && self.tz == other.tz
            && self.class_oid == other.class_oid
            && self.self_ref == other.self_ref
            && self.is_desc == other.is_desc
            && self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(other.elements.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b) || a.same_attrs(b))
            && self.enum_labels == other.enum_labels
    }
}
