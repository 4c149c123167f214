//! CION network node.
//!
//! Single-binary SCION node for one AS: generates the local trust
//! material, serves the control-plane RPCs, probes the configured
//! neighbors and forwards data-plane traffic between the underlay
//! sockets.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cion_base_types::{Asn, Validity};
use cion_controlplane::{ControlPlane, ControlPlaneServer, DirectLinkClient, Discovery};
use cion_dataplane::{Dataplane, Forwarder};
use cion_pki::{
    generate_base_trc, CertKind, CertificateBundle, Role, TrcId, TrcStateMachine, Version,
};
use cion_trust_store::{Chain, SledTrustDb, TrustDb};
use clap::Parser;
use slog::{info, o, Drain, Logger};
use tokio::sync::watch;

mod config;

use config::Config;

#[derive(Parser)]
#[command(about = "CION network node", version)]
struct Args {
    /// Path to the node configuration file.
    #[arg(long, short)]
    config: PathBuf,
}

fn root_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn parse_ases(texts: &[String]) -> anyhow::Result<Vec<Asn>> {
    texts
        .iter()
        .map(|s| s.parse::<Asn>().map_err(|e| anyhow::anyhow!("{e}")))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log = root_logger();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let local_ia = config.node.local_ia;
    info!(log, "starting node"; "ia" => %local_ia, "role" => ?config.node.role);

    let db: Arc<dyn TrustDb> = Arc::new(
        SledTrustDb::open(&config.node.trust_db_path).context("opening trust store")?,
    );

    // Trust bootstrap. Failure here is fatal; the node must not come up
    // without TLS material.
    let validity = Validity::for_seconds_from_now(config.trc.validity_seconds);
    let mut bundle = CertificateBundle::new();
    bundle
        .create(local_ia, config.node.role, validity)
        .context("generating certificate bundle")?;

    if config.node.role == Role::Core {
        let latest = TrcId {
            isd: local_ia.isd(),
            base: Version::LATEST,
            serial: Version::LATEST,
        };
        if db.signed_trc(latest).context("querying trust store")?.is_none() {
            let core_ases = if config.trc.core_ases.is_empty() {
                vec![local_ia.asn()]
            } else {
                parse_ases(&config.trc.core_ases)?
            };
            let authoritative_ases = if config.trc.authoritative_ases.is_empty() {
                core_ases.clone()
            } else {
                parse_ases(&config.trc.authoritative_ases)?
            };
            let trc = generate_base_trc(
                local_ia.isd(),
                Version(1),
                Version(1),
                config.trc.description.clone(),
                validity,
                core_ases,
                authoritative_ases,
                &bundle,
            )
            .context("generating base TRC")?;

            let mut machine = TrcStateMachine::new(local_ia.isd());
            machine.update(trc.clone()).context("installing base TRC")?;
            db.insert_trc(&trc).context("persisting base TRC")?;
            info!(log, "generated base TRC"; "id" => %trc.id);
        } else {
            info!(log, "trust store already holds a TRC for this ISD");
        }
    }

    let as_cert = bundle
        .certificate(CertKind::As)
        .expect("every role holds an AS certificate")
        .to_vec();
    // Without a local root the AS certificate is self-signed and doubles
    // as its own issuer entry.
    let ca_cert = bundle
        .certificate(CertKind::Root)
        .map(<[u8]>::to_vec)
        .unwrap_or_else(|| as_cert.clone());
    db.insert_chain(&Chain { as_cert, ca_cert })
        .context("persisting local certificate chain")?;
    let identity = bundle.tls_certificate().context("exporting TLS credentials")?;

    // Control plane.
    let discovery = Arc::new(Discovery::new());
    for neighbor in &config.neighbors {
        discovery.add_neighbor(neighbor.ia, neighbor.addr);
    }
    let service = Arc::new(ControlPlane::new(
        log.new(o!("component" => "controlplane")),
        local_ia,
        discovery.clone(),
        db.clone(),
    ));
    let server = ControlPlaneServer::bind(
        log.new(o!("component" => "controlplane")),
        config.control.listen,
        &identity,
    )
    .context("binding control-plane endpoint")?;
    info!(log, "control plane listening"; "addr" => %server.local_addr()?);

    // Data plane.
    let forwarder = Arc::new(Forwarder::new(
        local_ia,
        &config.forwarding_key().context("decoding forwarding key")?,
        config.external_next_hops(),
    ));
    let dataplane = Dataplane::bind(
        log.new(o!("component" => "dataplane")),
        forwarder,
        config.dataplane.internal,
        &config.interface_binds(),
    )
    .await
    .context("binding underlay sockets")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = server.start(service.clone(), shutdown_rx.clone());
    let client = DirectLinkClient::new(
        log.new(o!("component" => "controlplane")),
        local_ia,
        discovery,
        identity,
        db.clone(),
        service,
    )
    .context("creating direct-link client")?;
    let client_handle = client.start(
        Duration::from_millis(config.control.probe_interval_ms),
        shutdown_rx.clone(),
    );
    let dataplane_handle = dataplane.start(shutdown_rx);

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!(log, "shutting down");
    let _ = shutdown_tx.send(true);
    // Release in reverse acquisition order.
    for handle in [dataplane_handle, client_handle, server_handle] {
        let _ = handle.await;
    }
    db.close().context("closing trust store")?;
    Ok(())
}
