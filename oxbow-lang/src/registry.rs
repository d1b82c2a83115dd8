use crate::domain::{Domain, DomainKind, MatchLevel, Oid, KIND_COUNT};
use std::sync::{Arc, RwLock};
use tracing::debug;

// Midxkey domains land in one of ten buckets keyed by element count, to keep
// the composite-key lists short; every other kind gets exactly one bucket.
const MIDX_FANOUT: usize = 10;
const BUCKET_COUNT: usize = KIND_COUNT - 1 + MIDX_FANOUT;

/// The canonical domain cache. Process-wide in a running server (owned by
/// the boot wiring), per-instance in tests so state never leaks between
/// them. Lookups scan a per-kind bucket under the read half of the lock;
/// only a miss takes the write half, re-scans, and inserts, so a racing
/// interner can never produce a second canonical copy.
pub struct DomainRegistry {
    buckets: Vec<RwLock<Vec<Arc<Domain>>>>,
    defaults: Vec<Arc<Domain>>,
}

fn bucket_index(kind: DomainKind, element_count: usize) -> usize {
    let k = kind as usize;
    if kind == DomainKind::Midxkey {
        k + element_count % MIDX_FANOUT
    } else {
        k
    }
}

impl DomainRegistry {
    pub fn new() -> Arc<DomainRegistry> {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        for _ in 0..BUCKET_COUNT {
            buckets.push(RwLock::new(Vec::new()));
        }
        let mut reg = DomainRegistry {
            buckets,
            defaults: Vec::with_capacity(KIND_COUNT),
        };
        // Seed the canonical default for every kind up front. For the
        // non-parameterized kinds these are the only domains that will ever
        // exist; for the rest they anchor the default-precision variant.
        for k in 0..KIND_COUNT {
            let kind = ALL_KINDS[k];
            let d = reg.intern_inner(Domain::draft(kind));
            reg.defaults.push(d);
        }
        Arc::new(reg)
    }

    /// The pre-seeded canonical domain for a kind.
    pub fn resolve_default(&self, kind: DomainKind) -> Arc<Domain> {
        self.defaults[kind as usize].clone()
    }

    /// Canonicalize a draft. The draft is consumed; the result is the one
    /// shared descriptor for its attribute set, idempotently.
    pub fn intern(&self, draft: Domain) -> Arc<Domain> {
        self.intern_inner(draft)
    }

    /// Build a domain from parts, applying the fixed-precision rules, and
    /// canonicalize it.
    pub fn construct(
        &self,
        kind: DomainKind,
        class_oid: Option<Oid>,
        precision: i32,
        scale: i32,
        elements: Vec<Arc<Domain>>,
    ) -> Arc<Domain> {
        let mut draft = Domain::draft(kind);
        // Fixed-width kinds always carry their canonical precision; string
        // and bit kinds keep whatever the caller pinned (or the floating
        // sentinel). A negative precision on a pinnable kind means
        // "default".
        if kind.is_char_family() || kind.is_bit_family() {
            draft.precision = precision;
        } else if kind == DomainKind::Numeric && precision >= 0 {
            draft.precision = precision;
            draft.scale = scale;
        }
        if let Some(oid) = class_oid {
            draft.class_oid = Some(oid);
        }
        draft.elements = elements;
        self.intern(draft)
    }

    /// Index-key variant lookup: same attributes, ordering flag included.
    pub fn find_with_ordering(
        &self,
        kind: DomainKind,
        precision: i32,
        scale: i32,
        is_desc: bool,
    ) -> Option<Arc<Domain>> {
        let mut probe = Domain::draft(kind);
        if precision >= 0 {
            probe.precision = precision;
            probe.scale = scale;
        }
        probe.is_desc = is_desc;
        probe.seal();
        let bucket = &self.buckets[bucket_index(kind, 0)];
        let list = bucket.read().unwrap_or_else(|e| e.into_inner());
        list.iter()
            .find(|d| d.matches(&probe, MatchLevel::Exact))
            .cloned()
    }

    /// First canonical domain satisfying `level` against the probe, in the
    /// bucket's maintained order.
    pub fn find_matching(&self, probe: &Domain, level: MatchLevel) -> Option<Arc<Domain>> {
        let mut probe = probe.clone();
        probe.seal();
        let bucket = &self.buckets[bucket_index(probe.kind(), probe.elements().len())];
        let list = bucket.read().unwrap_or_else(|e| e.into_inner());
        list.iter().find(|d| d.matches(&probe, level)).cloned()
    }

    /// Resolve a self-referencing draft once its class identity is known:
    /// produces (or finds) the canonical object domain for the class.
    pub fn resolve_self_ref(&self, domain: &Arc<Domain>, class_oid: Oid) -> Arc<Domain> {
        debug_assert!(domain.is_self_ref());
        let mut draft = (**domain).clone();
        draft.self_ref = false;
        draft.class_oid = Some(class_oid);
        self.intern(draft)
    }

    fn intern_inner(&self, mut draft: Domain) -> Arc<Domain> {
        draft.seal();
        let idx = bucket_index(draft.kind(), draft.elements().len());
        let bucket = &self.buckets[idx];
        {
            let list = bucket.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = list.iter().find(|d| d.matches(&draft, MatchLevel::Exact)) {
                return hit.clone();
            }
        }
        let mut list = bucket.write().unwrap_or_else(|e| e.into_inner());
        // Re-scan: another thread may have inserted between our read and
        // write sections.
        if let Some(hit) = list.iter().find(|d| d.matches(&draft, MatchLevel::Exact)) {
            return hit.clone();
        }
        let pos = insert_position(&list, &draft);
        let canonical = Arc::new(draft);
        list.insert(pos, canonical.clone());
        debug!(target: "oxbow",
               "interned domain kind {:?} precision {} (bucket {} len {})",
               canonical.kind(), canonical.precision(), idx, list.len());
        canonical
    }
}

/// Maintained bucket order: variable-length strings by precision descending,
/// fixed-length by precision ascending, numerics by (precision, scale)
/// descending. The order lets a STR search accept the first match instead of
/// scanning for a best fit.
fn insert_position(list: &[Arc<Domain>], draft: &Domain) -> usize {
    // Floating precision sorts as "infinitely wide": first among the
    // descending variable-length lists, last among the ascending fixed ones.
    fn eff(d: &Domain) -> i64 {
        if d.has_floating_precision() {
            i64::MAX
        } else {
            d.precision() as i64
        }
    }
    let kind = draft.kind();
    if kind.is_variable_len_str() {
        list.iter()
            .position(|d| eff(d) < eff(draft))
            .unwrap_or(list.len())
    } else if kind.is_fixed_len_str() {
        list.iter()
            .position(|d| eff(d) > eff(draft))
            .unwrap_or(list.len())
    } else if kind == DomainKind::Numeric {
        list.iter()
            .position(|d| {
                (d.precision(), d.scale()) < (draft.precision(), draft.scale())
            })
            .unwrap_or(list.len())
    } else {
        list.len()
    }
}

const ALL_KINDS: [DomainKind; KIND_COUNT] = [
    DomainKind::Null,
    DomainKind::Short,
    DomainKind::Int,
    DomainKind::Bigint,
    DomainKind::Float,
    DomainKind::Double,
    DomainKind::Numeric,
    DomainKind::Monetary,
    DomainKind::Date,
    DomainKind::Time,
    DomainKind::Timestamp,
    DomainKind::Datetime,
    DomainKind::Char,
    DomainKind::Varchar,
    DomainKind::Nchar,
    DomainKind::Varnchar,
    DomainKind::Bit,
    DomainKind::Varbit,
    DomainKind::Object,
    DomainKind::Set,
    DomainKind::Multiset,
    DomainKind::Sequence,
    DomainKind::Blob,
    DomainKind::Clob,
    DomainKind::Enumeration,
    DomainKind::Oid,
    DomainKind::Vobj,
    DomainKind::Variable,
    DomainKind::Midxkey,
];
