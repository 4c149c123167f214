use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use cion_base_types::Ia;
use cion_pki::{TlsCertificate, TrcId, Version};
use cion_proto::control_plane::v1;
use cion_proto::control_plane::{
    SEGMENT_CREATION_BEACON_PROCEDURE, SEGMENT_LOOKUP_SEGMENTS_PROCEDURE,
    SEGMENT_REGISTRATION_PROCEDURE, TRUST_MATERIAL_CHAINS_PROCEDURE,
    TRUST_MATERIAL_TRC_PROCEDURE,
};
use cion_proto::crypto::v1 as crypto_v1;
use cion_trust_store::{ChainQuery, TrustDbError};
use http::StatusCode;
use prost::Message;
use slog::{debug, info, warn, Logger};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tower::ServiceExt;

use crate::service::{ControlPlane, Path, PathLookup};
use crate::{tls, wire, TransportError};

/// The control-plane RPC server: a QUIC endpoint with mandatory mutual TLS
/// dispatching each accepted stream to the procedure named by the request
/// path.
pub struct ControlPlaneServer {
    log: Logger,
    endpoint: quinn::Endpoint,
}

impl ControlPlaneServer {
    /// Binds the QUIC endpoint, offering the AS certificate and requiring a
    /// client certificate from every peer.
    pub fn bind(
        log: Logger,
        addr: SocketAddr,
        identity: &TlsCertificate,
    ) -> Result<ControlPlaneServer, TransportError> {
        let crypto = tls::server_crypto(identity)?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
        let endpoint = quinn::Endpoint::server(server_config, addr)?;
        Ok(ControlPlaneServer { log, endpoint })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Spawns the accept loop. Each connection and each stream is handled
    /// on its own task.
    pub fn start(
        self,
        service: Arc<ControlPlane>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let ControlPlaneServer { log, endpoint } = self;
        let router = router(service);
        tokio::spawn(async move {
            loop {
                let connecting = tokio::select! {
                    _ = shutdown.changed() => break,
                    incoming = endpoint.accept() => match incoming {
                        Some(connecting) => connecting,
                        None => break,
                    },
                };
                tokio::spawn(handle_connection(
                    log.clone(),
                    router.clone(),
                    connecting,
                    shutdown.clone(),
                ));
            }
            endpoint.close(0u32.into(), b"shutting down");
            info!(log, "control-plane server stopped");
        })
    }
}

async fn handle_connection(
    log: Logger,
    router: Router,
    connecting: quinn::Connecting,
    mut shutdown: watch::Receiver<bool>,
) {
    let connection = match connecting.await {
        Ok(connection) => connection,
        Err(e) => {
            // Includes peers failing the mutual TLS handshake.
            debug!(log, "connection attempt failed"; "error" => %e);
            return;
        }
    };
    loop {
        let stream = tokio::select! {
            _ = shutdown.changed() => break,
            stream = connection.accept_bi() => stream,
        };
        match stream {
            Ok((send, recv)) => {
                tokio::spawn(handle_stream(log.clone(), router.clone(), send, recv));
            }
            Err(_) => break,
        }
    }
}

async fn handle_stream(
    log: Logger,
    router: Router,
    send: quinn::SendStream,
    recv: quinn::RecvStream,
) {
    let mut recv = FramedRead::new(recv, LengthDelimitedCodec::new());
    let mut send = FramedWrite::new(send, LengthDelimitedCodec::new());
    let request = match wire::read_request(&mut recv).await {
        Ok(request) => request,
        Err(e) => {
            debug!(log, "failed to read request"; "error" => %e);
            return;
        }
    };
    let response = match router.oneshot(request).await {
        Ok(response) => response,
        Err(e) => match e {},
    };
    if let Err(e) = wire::write_response(&mut send, response).await {
        debug!(log, "failed to write response"; "error" => %e);
        return;
    }
    if let Err(e) = send.into_inner().finish().await {
        debug!(log, "failed to finish stream"; "error" => %e);
    }
}

fn router(service: Arc<ControlPlane>) -> Router {
    Router::new()
        .route(SEGMENT_CREATION_BEACON_PROCEDURE, post(handle_beacon))
        .route(SEGMENT_LOOKUP_SEGMENTS_PROCEDURE, post(handle_segments))
        .route(SEGMENT_REGISTRATION_PROCEDURE, post(handle_segments_registration))
        .route(TRUST_MATERIAL_CHAINS_PROCEDURE, post(handle_chains))
        .route(TRUST_MATERIAL_TRC_PROCEDURE, post(handle_trc))
        .with_state(service)
}

fn proto_response<M: Message>(message: &M) -> Response {
    (
        [(http::header::CONTENT_TYPE, "application/protobuf")],
        message.encode_to_vec(),
    )
        .into_response()
}

fn status_response(status: StatusCode, message: String) -> Response {
    (status, message).into_response()
}

fn bad_request(message: String) -> Response {
    status_response(StatusCode::BAD_REQUEST, message)
}

async fn handle_beacon(State(service): State<Arc<ControlPlane>>, body: Bytes) -> Response {
    let request = match v1::BeaconRequest::decode(body.as_ref()) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("malformed beacon request: {e}")),
    };
    info!(service.log(), "received beacon";
        "as_entries" => request.segment.map(|s| s.as_entries.len()).unwrap_or(0));
    proto_response(&v1::BeaconResponse::default())
}

async fn handle_segments(State(service): State<Arc<ControlPlane>>, body: Bytes) -> Response {
    let request = match v1::SegmentsRequest::decode(body.as_ref()) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("malformed segments request: {e}")),
    };
    let src = Ia::from_u64(request.src_isd_as);
    let dst = Ia::from_u64(request.dst_isd_as);
    let paths = service.get_paths(src, dst);
    if paths.is_empty() {
        return status_response(StatusCode::NOT_FOUND, format!("no path to {dst}"));
    }
    let segments = paths.iter().map(encode_direct_path).collect();
    let mut response = v1::SegmentsResponse::default();
    response
        .segments
        .insert(v1::SegmentType::Up as i32, v1::segments_response::Segments { segments });
    proto_response(&response)
}

/// Direct-link encoding: one AS entry per segment whose signed body names
/// the neighbor's underlay endpoint.
fn encode_direct_path(path: &Path) -> v1::PathSegment {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("wall clock after the epoch")
        .as_secs() as i64;
    let info = v1::SegmentInformation { timestamp, segment_id: 1 };
    v1::PathSegment {
        segment_info: info.encode_to_vec(),
        as_entries: path
            .segments
            .iter()
            .map(|segment| v1::AsEntry {
                signed: Some(crypto_v1::SignedMessage {
                    header_and_body: segment.id.clone(),
                    signature: Vec::new(),
                }),
            })
            .collect(),
    }
}

async fn handle_segments_registration(
    State(service): State<Arc<ControlPlane>>,
    body: Bytes,
) -> Response {
    let request = match v1::SegmentsRegistrationRequest::decode(body.as_ref()) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("malformed registration request: {e}")),
    };
    debug!(service.log(), "acknowledged segment registration";
        "buckets" => request.segments.len());
    proto_response(&v1::SegmentsRegistrationResponse::default())
}

async fn handle_trc(State(service): State<Arc<ControlPlane>>, body: Bytes) -> Response {
    let request = match v1::TrcRequest::decode(body.as_ref()) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("malformed TRC request: {e}")),
    };
    let Ok(isd) = u16::try_from(request.isd) else {
        return bad_request(format!("ISD {} out of range", request.isd));
    };
    let id = TrcId {
        isd: cion_base_types::Isd(isd),
        base: Version(request.base),
        serial: Version(request.serial),
    };
    match service.trust_db().signed_trc(id) {
        Ok(Some(trc)) => proto_response(&v1::TrcResponse { trc: trc.raw }),
        Ok(None) => status_response(StatusCode::NOT_FOUND, format!("no TRC {id}")),
        Err(e @ TrustDbError::UnsupportedQuery(_)) => bad_request(e.to_string()),
        Err(e) => {
            warn!(service.log(), "TRC lookup failed"; "id" => %id, "error" => %e);
            status_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn handle_chains(State(service): State<Arc<ControlPlane>>, body: Bytes) -> Response {
    let request = match v1::ChainsRequest::decode(body.as_ref()) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("malformed chains request: {e}")),
    };
    let ia = Ia::from_u64(request.isd_as);
    let query = ChainQuery {
        ia,
        subject_key_id: request.subject_key_id,
        not_before: None,
        not_after: None,
    };
    let chains = match service.trust_db().chains(&query) {
        Ok(chains) => chains,
        Err(e) => {
            warn!(service.log(), "chain lookup failed"; "ia" => %ia, "error" => %e);
            return status_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };
    if chains.is_empty() {
        return status_response(StatusCode::NOT_FOUND, format!("no chains for {ia}"));
    }
    let response = v1::ChainsResponse {
        chains: chains
            .into_iter()
            .map(|chain| v1::Chain { as_cert: chain.as_cert, ca_cert: chain.ca_cert })
            .collect(),
    };
    proto_response(&response)
}
