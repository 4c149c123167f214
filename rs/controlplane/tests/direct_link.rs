use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cion_base_types::{Ia, Validity};
use cion_controlplane::{ControlPlane, ControlPlaneServer, DirectLinkClient, Discovery, PathLookup};
use cion_pki::{
    generate_base_trc, CertKind, CertificateBundle, Role, TlsCertificate, TrcStateMachine, Version,
};
use cion_trust_store::{Chain, ChainQuery, SledTrustDb, TrustDb};
use slog::Logger;
use tokio::sync::watch;

const PROBE_INTERVAL: Duration = Duration::from_millis(50);

fn test_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

struct TestNode {
    ia: Ia,
    _dir: tempfile::TempDir,
    db: Arc<dyn TrustDb>,
    discovery: Arc<Discovery>,
    service: Arc<ControlPlane>,
    identity: TlsCertificate,
    chain: Chain,
    addr: SocketAddr,
    server: Option<ControlPlaneServer>,
}

/// Generates trust material for one AS, seeds its own store and binds its
/// control-plane server.
fn make_node(ia: &str) -> TestNode {
    let ia: Ia = ia.parse().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let db: Arc<dyn TrustDb> = Arc::new(SledTrustDb::open(dir.path()).unwrap());

    let validity = Validity::for_seconds_from_now(3600);
    let mut bundle = CertificateBundle::new();
    bundle.create(ia, Role::Core, validity).unwrap();
    let trc = generate_base_trc(
        ia.isd(),
        Version(1),
        Version(1),
        format!("base TRC of ISD {}", ia.isd()),
        validity,
        vec![ia.asn()],
        vec![ia.asn()],
        &bundle,
    )
    .unwrap();

    let mut machine = TrcStateMachine::new(ia.isd());
    machine.update(trc.clone()).unwrap();

    db.insert_trc(&trc).unwrap();
    let chain = Chain {
        as_cert: bundle.certificate(CertKind::As).unwrap().to_vec(),
        ca_cert: bundle.certificate(CertKind::Root).unwrap().to_vec(),
    };
    db.insert_chain(&chain).unwrap();

    let identity = bundle.tls_certificate().unwrap();
    let server =
        ControlPlaneServer::bind(test_logger(), "127.0.0.1:0".parse().unwrap(), &identity)
            .unwrap();
    let addr = server.local_addr().unwrap();

    let discovery = Arc::new(Discovery::new());
    let service = Arc::new(ControlPlane::new(
        test_logger(),
        ia,
        discovery.clone(),
        db.clone(),
    ));

    TestNode {
        ia,
        _dir: dir,
        db,
        discovery,
        service,
        identity,
        chain,
        addr,
        server: Some(server),
    }
}

fn start_client(node: &TestNode, shutdown: &watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    let client = DirectLinkClient::new(
        test_logger(),
        node.ia,
        node.discovery.clone(),
        node.identity.clone(),
        node.db.clone(),
        node.service.clone(),
    )
    .unwrap();
    client.start(PROBE_INTERVAL, shutdown.clone())
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn probes_establish_direct_links_both_ways() {
    let mut a = make_node("1-ff00:0:110");
    let mut b = make_node("1-ff00:0:111");

    // Both sides already hold each other's chains, as after an exchange of
    // trust material.
    a.db.insert_chain(&b.chain).unwrap();
    b.db.insert_chain(&a.chain).unwrap();

    a.discovery.add_neighbor(b.ia, b.addr);
    b.discovery.add_neighbor(a.ia, a.addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_a = a.server.take().unwrap().start(a.service.clone(), shutdown_rx.clone());
    let server_b = b.server.take().unwrap().start(b.service.clone(), shutdown_rx.clone());
    let client_a = start_client(&a, &shutdown_rx);
    let client_b = start_client(&b, &shutdown_rx);

    let (service_a, ia_a, ia_b) = (a.service.clone(), a.ia, b.ia);
    wait_for("path from A to B", move || {
        !service_a.get_paths(ia_a, ia_b).is_empty()
    })
    .await;
    let (service_b, ia_a2, ia_b2) = (b.service.clone(), a.ia, b.ia);
    wait_for("path from B to A", move || {
        !service_b.get_paths(ia_b2, ia_a2).is_empty()
    })
    .await;

    // Exactly one direct path with a single segment whose identifier is
    // the neighbor's underlay endpoint.
    let paths = a.service.get_paths(a.ia, b.ia);
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].segments.len(), 1);
    assert_eq!(paths[0].segments[0].id, b.addr.to_string().into_bytes());
    assert_eq!(paths[0].segments[0].interfaces, vec![1]);

    let paths = b.service.get_paths(b.ia, a.ia);
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].segments[0].id, a.addr.to_string().into_bytes());

    shutdown_tx.send(true).unwrap();
    for handle in [server_a, server_b, client_a, client_b] {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("task should stop on shutdown")
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_failure_triggers_trust_fetch_and_recovery() {
    // Different ISDs so the fetched TRC does not collide with the local one.
    let mut a = make_node("1-ff00:0:110");
    let mut b = make_node("2-ff00:0:210");

    // A knows B as a neighbor but holds none of B's trust material, so the
    // first handshake must fail and trigger the fetch path.
    a.discovery.add_neighbor(b.ia, b.addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_a = a.server.take().unwrap().start(a.service.clone(), shutdown_rx.clone());
    let server_b = b.server.take().unwrap().start(b.service.clone(), shutdown_rx.clone());
    let client_a = start_client(&a, &shutdown_rx);

    let (service_a, ia_a, ia_b) = (a.service.clone(), a.ia, b.ia);
    wait_for("path from A to B after trust fetch", move || {
        !service_a.get_paths(ia_a, ia_b).is_empty()
    })
    .await;

    // The fetch reconciled B's chain and TRC into A's store.
    let query = ChainQuery { ia: b.ia, ..ChainQuery::default() };
    assert_eq!(a.db.chains(&query).unwrap(), vec![b.chain.clone()]);
    let fetched = a
        .db
        .signed_trc(cion_pki::TrcId {
            isd: b.ia.isd(),
            base: Version::LATEST,
            serial: Version::LATEST,
        })
        .unwrap()
        .expect("B's TRC should have been fetched");
    assert_eq!(fetched.id.isd, b.ia.isd());

    shutdown_tx.send(true).unwrap();
    for handle in [server_a, server_b, client_a] {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("task should stop on shutdown")
            .unwrap();
    }
}
