use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cion_base_types::Ia;
use cion_pki::{TlsCertificate, Trc};
use cion_proto::control_plane::v1;
use cion_proto::control_plane::{
    SEGMENT_CREATION_BEACON_PROCEDURE, TRUST_MATERIAL_CHAINS_PROCEDURE,
    TRUST_MATERIAL_TRC_PROCEDURE,
};
use cion_trust_store::{Chain, TrustDb};
use http::{Method, Request, Response, StatusCode};
use prost::Message;
use slog::{info, warn, Logger};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::discovery::{Discovery, Neighbor};
use crate::service::{DirectPathWriter, Path, PathSegment};
use crate::tls::{AcceptAnyServerCert, TrustStoreServerVerifier};
use crate::{tls, wire, TransportError};

/// The direct-link probe client.
///
/// On every tick the client sends a beacon to each configured neighbor,
/// all neighbors concurrently. A successful probe refreshes the neighbor's
/// entry in the active direct-link table. A TLS-classified failure
/// triggers a trust-material fetch so the next tick can authenticate; any
/// other failure is logged and retried on the next tick.
pub struct DirectLinkClient {
    log: Logger,
    local_ia: Ia,
    discovery: Arc<Discovery>,
    identity: TlsCertificate,
    trust_db: Arc<dyn TrustDb>,
    paths: Arc<dyn DirectPathWriter>,
    endpoint: quinn::Endpoint,
}

impl DirectLinkClient {
    pub fn new(
        log: Logger,
        local_ia: Ia,
        discovery: Arc<Discovery>,
        identity: TlsCertificate,
        trust_db: Arc<dyn TrustDb>,
        paths: Arc<dyn DirectPathWriter>,
    ) -> Result<DirectLinkClient, TransportError> {
        let endpoint = quinn::Endpoint::client("0.0.0.0:0".parse().expect("valid bind address"))?;
        Ok(DirectLinkClient {
            log,
            local_ia,
            discovery,
            identity,
            trust_db,
            paths,
            endpoint,
        })
    }

    /// Spawns the periodic probe loop. The loop stops within one interval
    /// of a shutdown signal.
    pub fn start(self, interval: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(interval, shutdown))
    }

    async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            self.probe_neighbors().await;
        }
        info!(self.log, "direct-link client stopped");
    }

    async fn probe_neighbors(&self) {
        let probes: Vec<_> = self
            .discovery
            .neighbors()
            .into_iter()
            .map(|neighbor| self.probe_neighbor(neighbor))
            .collect();
        futures::future::join_all(probes).await;
    }

    async fn probe_neighbor(&self, neighbor: Neighbor) {
        match self.send_beacon(&neighbor).await {
            Ok(()) => {
                let path = Path {
                    segments: vec![PathSegment {
                        id: neighbor.addr.to_string().into_bytes(),
                        interfaces: vec![1],
                    }],
                };
                self.paths.set_active_direct_path(neighbor.ia, path);
            }
            Err(e) if e.is_tls_handshake() => {
                info!(self.log, "handshake failed, fetching trust material";
                    "neighbor" => %neighbor.ia, "error" => %e);
                if let Err(fetch_err) = self.fetch_trust_material(&neighbor).await {
                    warn!(self.log, "trust material fetch failed";
                        "neighbor" => %neighbor.ia, "error" => %fetch_err);
                }
            }
            Err(e) => {
                warn!(self.log, "beacon probe failed";
                    "neighbor" => %neighbor.ia, "error" => %e);
            }
        }
    }

    async fn send_beacon(&self, neighbor: &Neighbor) -> Result<(), TransportError> {
        let beacon = v1::BeaconRequest {
            segment: Some(v1::PathSegment {
                segment_info: self.local_ia.to_string().into_bytes(),
                as_entries: Vec::new(),
            }),
        };
        let verifier = Arc::new(TrustStoreServerVerifier::new(
            self.trust_db.clone(),
            neighbor.ia,
        ));
        let crypto = Arc::new(tls::client_crypto(&self.identity, verifier)?);
        let request = post_request(SEGMENT_CREATION_BEACON_PROCEDURE, beacon.encode_to_vec())?;
        let response = self.rpc(neighbor.addr, crypto, request).await?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status()));
        }
        Ok(())
    }

    /// Fetches the neighbor's latest TRC and its certificate chains and
    /// hands them to the trust store.
    ///
    /// Server verification is suspended for the fetch; its purpose is
    /// obtaining the very material later handshakes verify against.
    pub async fn fetch_trust_material(&self, neighbor: &Neighbor) -> Result<(), TransportError> {
        let crypto = Arc::new(tls::client_crypto(&self.identity, Arc::new(AcceptAnyServerCert))?);

        let trc_request = v1::TrcRequest {
            isd: neighbor.ia.isd().0 as u32,
            base: 0,
            serial: 0,
        };
        let request = post_request(TRUST_MATERIAL_TRC_PROCEDURE, trc_request.encode_to_vec())?;
        let response = self.rpc(neighbor.addr, crypto.clone(), request).await?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status()));
        }
        let trc_response = v1::TrcResponse::decode(response.body().as_ref())
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;
        let trc = Trc::decode(&trc_response.trc)
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;
        let inserted = self
            .trust_db
            .insert_trc(&trc)
            .map_err(|e| TransportError::TrustMaterial(e.to_string()))?;
        info!(self.log, "fetched TRC"; "neighbor" => %neighbor.ia,
            "id" => %trc.id, "inserted" => inserted);

        let chains_request = v1::ChainsRequest {
            isd_as: neighbor.ia.to_u64(),
            subject_key_id: Vec::new(),
        };
        let request = post_request(TRUST_MATERIAL_CHAINS_PROCEDURE, chains_request.encode_to_vec())?;
        let response = self.rpc(neighbor.addr, crypto, request).await?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status()));
        }
        let chains_response = v1::ChainsResponse::decode(response.body().as_ref())
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;
        let count = chains_response.chains.len();
        for chain in chains_response.chains {
            let chain = Chain { as_cert: chain.as_cert, ca_cert: chain.ca_cert };
            self.trust_db
                .insert_chain(&chain)
                .map_err(|e| TransportError::TrustMaterial(e.to_string()))?;
        }
        info!(self.log, "fetched certificate chains";
            "neighbor" => %neighbor.ia, "chains" => count);
        Ok(())
    }

    async fn rpc(
        &self,
        addr: SocketAddr,
        crypto: Arc<rustls::ClientConfig>,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let connecting = self.endpoint.connect_with(
            quinn::ClientConfig::new(crypto),
            addr,
            &addr.ip().to_string(),
        )?;
        let connection = connecting.await?;
        let (send, recv) = connection.open_bi().await?;
        let mut send = FramedWrite::new(send, LengthDelimitedCodec::new());
        let mut recv = FramedRead::new(recv, LengthDelimitedCodec::new());
        wire::write_request(&mut send, request).await?;
        send.into_inner().finish().await?;
        let response = wire::read_response(&mut recv).await?;
        connection.close(0u32.into(), b"done");
        Ok(response)
    }
}

fn post_request(path: &str, body: Vec<u8>) -> Result<Request<Bytes>, TransportError> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(http::header::CONTENT_TYPE, "application/protobuf")
        .header(http::header::ACCEPT, "application/protobuf")
        .body(Bytes::from(body))
        .map_err(|e| TransportError::InvalidMessage(e.to_string()))
}
