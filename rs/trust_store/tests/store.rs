use assert_matches::assert_matches;
use cion_base_types::{Ia, Isd, Validity};
use cion_pki::{
    CertKind, CertificateBundle, Role, Trc, TrcId, Version, generate_base_trc,
};
use cion_trust_store::{Chain, ChainQuery, SledTrustDb, TrustDb, TrustDbError};

fn open_db() -> (tempfile::TempDir, SledTrustDb) {
    let dir = tempfile::tempdir().unwrap();
    let db = SledTrustDb::open(dir.path()).unwrap();
    (dir, db)
}

fn core_bundle(ia: Ia, validity: Validity) -> CertificateBundle {
    let mut bundle = CertificateBundle::new();
    bundle.create(ia, Role::Core, validity).unwrap();
    bundle
}

fn base_trc(isd: u16, version: u64, validity: Validity) -> Trc {
    let ia: Ia = format!("{isd}-ff00:0:110").parse().unwrap();
    let bundle = core_bundle(ia, validity);
    generate_base_trc(
        Isd(isd),
        Version(version),
        Version(version),
        "store test TRC".to_string(),
        validity,
        vec![ia.asn()],
        vec![ia.asn()],
        &bundle,
    )
    .unwrap()
}

fn chain_for(ia: Ia, validity: Validity) -> Chain {
    let bundle = core_bundle(ia, validity);
    Chain {
        as_cert: bundle.certificate(CertKind::As).unwrap().to_vec(),
        ca_cert: bundle.certificate(CertKind::Root).unwrap().to_vec(),
    }
}

#[test]
fn trc_insertion_is_idempotent() {
    let (_dir, db) = open_db();
    let trc = base_trc(1, 1, Validity::for_seconds_from_now(3600));

    assert!(db.insert_trc(&trc).unwrap());
    assert!(!db.insert_trc(&trc).unwrap());
}

#[test]
fn conflicting_trc_is_rejected() {
    let (_dir, db) = open_db();
    let trc = base_trc(1, 1, Validity::for_seconds_from_now(3600));
    assert!(db.insert_trc(&trc).unwrap());

    let mut modified = trc.clone();
    modified.raw[0] ^= 0xff;
    assert_matches!(db.insert_trc(&modified), Err(TrustDbError::ConflictingTrc(_)));

    // The stored TRC is unchanged.
    let stored = db.signed_trc(trc.id).unwrap().unwrap();
    assert_eq!(stored.raw, trc.raw);
}

#[test]
fn missing_trc_is_not_an_error() {
    let (_dir, db) = open_db();
    let trc = base_trc(1, 1, Validity::for_seconds_from_now(3600));
    db.insert_trc(&trc).unwrap();

    let absent = TrcId { isd: Isd(2), ..trc.id };
    assert_eq!(db.signed_trc(absent).unwrap(), None);
}

#[test]
fn mixed_latest_query_is_unsupported() {
    let (_dir, db) = open_db();
    let id = TrcId { isd: Isd(1), base: Version::LATEST, serial: Version(1) };
    assert_matches!(db.signed_trc(id), Err(TrustDbError::UnsupportedQuery(_)));
}

#[test]
fn exact_lookup_returns_the_inserted_trc() {
    let (_dir, db) = open_db();
    let trc = base_trc(1, 1, Validity::for_seconds_from_now(3600));
    db.insert_trc(&trc).unwrap();

    assert_eq!(db.signed_trc(trc.id).unwrap(), Some(trc));
}

#[test]
fn latest_lookup_returns_the_highest_version_pair() {
    let (_dir, db) = open_db();
    let validity = Validity::for_seconds_from_now(3600);
    for version in [1, 2, 5] {
        db.insert_trc(&base_trc(1, version, validity)).unwrap();
    }
    // A TRC of another ISD does not leak into the scan.
    db.insert_trc(&base_trc(2, 9, validity)).unwrap();

    let latest = db
        .signed_trc(TrcId { isd: Isd(1), base: Version::LATEST, serial: Version::LATEST })
        .unwrap()
        .unwrap();
    assert_eq!(latest.id.serial, Version(5));

    let single = db
        .signed_trc(TrcId { isd: Isd(2), base: Version::LATEST, serial: Version::LATEST })
        .unwrap()
        .unwrap();
    assert_eq!(single.id.serial, Version(9));
}

#[test]
fn chain_insertion_is_idempotent() {
    let (_dir, db) = open_db();
    let ia: Ia = "1-ff00:0:110".parse().unwrap();
    let chain = chain_for(ia, Validity::for_seconds_from_now(3600));

    assert!(db.insert_chain(&chain).unwrap());
    assert!(!db.insert_chain(&chain).unwrap());
}

#[test]
fn chain_without_ca_certificate_is_rejected() {
    let (_dir, db) = open_db();
    let ia: Ia = "1-ff00:0:110".parse().unwrap();
    let mut chain = chain_for(ia, Validity::for_seconds_from_now(3600));
    chain.ca_cert.clear();
    assert_matches!(db.insert_chain(&chain), Err(TrustDbError::InvalidChain(_)));
}

#[test]
fn distinct_chains_for_one_subject_are_kept_apart() {
    let (_dir, db) = open_db();
    let ia: Ia = "1-ff00:0:110".parse().unwrap();
    let validity = Validity::for_seconds_from_now(3600);
    // Two runs of the generator share the IA but not the key material.
    let first = chain_for(ia, validity);
    let second = chain_for(ia, validity);

    assert!(db.insert_chain(&first).unwrap());
    assert!(db.insert_chain(&second).unwrap());

    let query = ChainQuery { ia, ..ChainQuery::default() };
    let mut found = db.chains(&query).unwrap();
    found.sort_by(|a, b| a.as_cert.cmp(&b.as_cert));
    let mut want = vec![first, second];
    want.sort_by(|a, b| a.as_cert.cmp(&b.as_cert));
    assert_eq!(found, want);
}

#[test]
fn chains_filter_by_ia_and_subject_key_prefix() {
    let (_dir, db) = open_db();
    let validity = Validity::for_seconds_from_now(3600);
    let ia_a: Ia = "1-ff00:0:110".parse().unwrap();
    let ia_b: Ia = "1-ff00:0:111".parse().unwrap();
    let chain_a = chain_for(ia_a, validity);
    let chain_b = chain_for(ia_b, validity);
    db.insert_chain(&chain_a).unwrap();
    db.insert_chain(&chain_b).unwrap();

    // IA bound query only sees that IA's chains.
    let query = ChainQuery { ia: ia_a, ..ChainQuery::default() };
    assert_eq!(db.chains(&query).unwrap(), vec![chain_a.clone()]);

    // The wildcard IA sees both.
    assert_eq!(db.chains(&ChainQuery::default()).unwrap().len(), 2);

    // A subject key identifier prefix narrows the result.
    let skid = chain_a.as_cert_info().unwrap().subject_key_id;
    let query = ChainQuery {
        ia: ia_a,
        subject_key_id: skid[..4].to_vec(),
        ..ChainQuery::default()
    };
    assert_eq!(db.chains(&query).unwrap(), vec![chain_a.clone()]);

    // A prefix that matches no subject returns nothing, without error.
    let mut wrong = skid;
    wrong[0] ^= 0xff;
    let query = ChainQuery { ia: ia_a, subject_key_id: wrong, ..ChainQuery::default() };
    assert_eq!(db.chains(&query).unwrap(), Vec::<Chain>::new());
}

#[test]
fn chains_filter_by_validity_bounds() {
    let (_dir, db) = open_db();
    let ia: Ia = "1-ff00:0:110".parse().unwrap();
    let validity = Validity::for_seconds_from_now(3600);
    let chain = chain_for(ia, validity);
    db.insert_chain(&chain).unwrap();

    // Bounds inside the chain validity match.
    let query = ChainQuery {
        ia,
        not_before: Some(validity.not_before + time::Duration::seconds(10)),
        not_after: Some(validity.not_after - time::Duration::seconds(10)),
        ..ChainQuery::default()
    };
    assert_eq!(db.chains(&query).unwrap().len(), 1);

    // A lower bound before the chain becomes valid does not.
    let query = ChainQuery {
        ia,
        not_before: Some(validity.not_before - time::Duration::seconds(10)),
        ..ChainQuery::default()
    };
    assert_eq!(db.chains(&query).unwrap().len(), 0);

    // An upper bound past the chain expiry does not.
    let query = ChainQuery {
        ia,
        not_after: Some(validity.not_after + time::Duration::seconds(10)),
        ..ChainQuery::default()
    };
    assert_eq!(db.chains(&query).unwrap().len(), 0);

    // Unconstrained bounds match.
    let query = ChainQuery { ia, ..ChainQuery::default() };
    assert_eq!(db.chains(&query).unwrap().len(), 1);
}

#[test]
fn close_flushes_without_error() {
    let (_dir, db) = open_db();
    db.insert_trc(&base_trc(1, 1, Validity::for_seconds_from_now(3600))).unwrap();
    db.close().unwrap();
}
