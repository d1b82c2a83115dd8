use crate::{Domain, DomainKind, DomainRegistry, MatchLevel, Oid};
use std::sync::Arc;
use test_log::test;

#[test]
fn test_default_domains_are_canonical() {
    let reg = DomainRegistry::new();
    let a = reg.resolve_default(DomainKind::Int);
    let b = reg.resolve_default(DomainKind::Int);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.precision(), 10);
    assert_eq!(reg.resolve_default(DomainKind::Bigint).precision(), 19);
    assert_eq!(reg.resolve_default(DomainKind::Datetime).scale(), 3);
}

#[test]
fn test_intern_is_idempotent() {
    let reg = DomainRegistry::new();
    let a = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(80));
    let b = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(80));
    let c = reg.intern((*a).clone());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
}

#[test]
fn test_exact_match_iff_identity() {
    let reg = DomainRegistry::new();
    let a = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(10));
    let b = reg.intern(Domain::draft(DomainKind::Varchar).with_precision(20));
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!a.matches(&b, MatchLevel::Exact));
    assert!(a.matches(&b, MatchLevel::Any));
    // identity implies exact
    assert!(a.matches(&a, MatchLevel::Exact));
}

#[test]
fn test_variable_strings_sorted_descending() {
    let reg = DomainRegistry::new();
    reg.intern(Domain::draft(DomainKind::Varchar).with_precision(10));
    reg.intern(Domain::draft(DomainKind::Varchar).with_precision(300));
    reg.intern(Domain::draft(DomainKind::Varchar).with_precision(50));
    // A STR search for any precision <= 300 is satisfied by the first
    // matching node thanks to the descending order.
    let probe = Domain::draft(DomainKind::Varchar).with_precision(40);
    let hit = reg.find_matching(&probe, MatchLevel::Str);
    let hit = hit.expect("some varchar holds 40 chars");
    assert!(hit.has_floating_precision() || hit.precision() >= 40);
}

#[test]
fn test_fixed_strings_sorted_ascending() {
    let reg = DomainRegistry::new();
    let c30 = reg.intern(Domain::draft(DomainKind::Char).with_precision(30));
    let c10 = reg.intern(Domain::draft(DomainKind::Char).with_precision(10));
    let probe = Domain::draft(DomainKind::Char).with_precision(5);
    let hit = reg.find_matching(&probe, MatchLevel::Str).expect("char fits");
    // ascending order: the tightest fit comes first
    assert!(Arc::ptr_eq(&hit, &c10));
    assert!(!Arc::ptr_eq(&hit, &c30));
}

#[test]
fn test_find_with_ordering_distinguishes_desc() {
    let reg = DomainRegistry::new();
    let asc = reg.intern(Domain::draft(DomainKind::Int));
    let desc = reg.intern(Domain::draft(DomainKind::Int).with_descending());
    assert!(!Arc::ptr_eq(&asc, &desc));
    let found = reg.find_with_ordering(DomainKind::Int, -1, 0, true);
    assert!(found.map(|d| Arc::ptr_eq(&d, &desc)).unwrap_or(false));
    let found = reg.find_with_ordering(DomainKind::Int, -1, 0, false);
    assert!(found.map(|d| Arc::ptr_eq(&d, &asc)).unwrap_or(false));
}

#[test]
fn test_midxkey_buckets_by_element_count() {
    let reg = DomainRegistry::new();
    let int_d = reg.resolve_default(DomainKind::Int);
    let two = reg.construct(
        DomainKind::Midxkey,
        None,
        -1,
        0,
        vec![int_d.clone(), int_d.clone()],
    );
    let two_again = reg.construct(
        DomainKind::Midxkey,
        None,
        -1,
        0,
        vec![int_d.clone(), int_d.clone()],
    );
    let three = reg.construct(
        DomainKind::Midxkey,
        None,
        -1,
        0,
        vec![int_d.clone(), int_d.clone(), int_d],
    );
    assert!(Arc::ptr_eq(&two, &two_again));
    assert!(!Arc::ptr_eq(&two, &three));
}

#[test]
fn test_set_level_tolerates_missing_class() {
    let reg = DomainRegistry::new();
    let anon = reg.intern(Domain::draft(DomainKind::Object));
    let classed = reg.intern(Domain::draft(DomainKind::Object).with_class(Oid::new(0, 128, 3)));
    assert!(!anon.matches(&classed, MatchLevel::Exact));
    assert!(anon.matches(&classed, MatchLevel::Set));
}

#[test]
fn test_self_ref_resolution() {
    let reg = DomainRegistry::new();
    let draft = reg.intern(Domain::draft(DomainKind::Object).with_self_ref());
    assert!(draft.is_self_ref());
    assert!(draft.class_oid().is_none());
    let resolved = reg.resolve_self_ref(&draft, Oid::new(0, 640, 1));
    assert!(!resolved.is_self_ref());
    assert_eq!(resolved.class_oid(), Some(Oid::new(0, 640, 1)));
    // resolving twice lands on the same canonical domain
    let again = reg.resolve_self_ref(&draft, Oid::new(0, 640, 1));
    assert!(Arc::ptr_eq(&resolved, &again));
}

#[test]
fn test_concurrent_intern_single_canonical() {
    let reg = DomainRegistry::new();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let reg = reg.clone();
        handles.push(std::thread::spawn(move || {
            reg.intern(Domain::draft(DomainKind::Varchar).with_precision(777))
        }));
    }
    let mut results = Vec::new();
    for h in handles {
        results.push(h.join().expect("interner thread"));
    }
    for pair in results.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
    }
}
