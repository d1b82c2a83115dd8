// Every request argument and every row value crosses this crate: domains are
// the canonical, interned type descriptors; values are the tagged payloads
// that point back at them; coercion computes a target-domain value from a
// source-domain value with defined overflow/truncation outcomes.
//
// Canonicalization is the load-bearing property. Two domains with equal
// attributes are the _same allocation_, so domain equality anywhere else in
// the server is a pointer comparison, and a value can carry an `Arc<Domain>`
// without anyone worrying about descriptor drift.

mod coerce;
mod datetime;
mod domain;
mod numparse;
mod registry;
mod value;

pub use coerce::{
    cast, element_casts, CastOpts, CastStatus, Coerced, CoercionMode, ElementCasts,
};
pub use domain::{
    Codeset, CollationFlag, Domain, DomainKind, MatchLevel, Oid, TzSpec, FLOATING_PRECISION,
    KIND_COUNT,
};
pub use numparse::{scan_number, ScanStatus, ScannedNum};
pub use registry::DomainRegistry;
pub use value::{
    BitVal, CollVal, Currency, EnumVal, LobVal, MonetaryVal, NumericVal, ObjVal, StrVal, Value,
};
