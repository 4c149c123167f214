//! Control Plane
//!
//! Control-plane signaling and neighbor management over mutually
//! authenticated QUIC. The server side exposes the beacon, segment lookup,
//! segment registration and trust material procedures; the client side
//! probes each configured neighbor periodically and maintains the active
//! direct-link table the path lookup reads.
//!
//! RPCs are `http` requests and responses carried over QUIC bidirectional
//! streams; dispatch is by procedure path. Request and response bodies are
//! protobuf.
//!
//! COMPONENTS:
//!  - Discovery (discovery.rs): the configured neighbor table.
//!  - Service (service.rs): path lookup state shared by server and client.
//!  - Server (server.rs): QUIC endpoint accepting RPCs.
//!  - Client (client.rs): periodic beacon probes and trust-material fetch.

mod client;
mod discovery;
mod server;
mod service;
mod tls;
mod wire;

use std::io;

use thiserror::Error;

pub use client::DirectLinkClient;
pub use discovery::{Discovery, Neighbor};
pub use server::ControlPlaneServer;
pub use service::{ControlPlane, DirectPathWriter, Path, PathLookup, PathSegment};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection could not be initiated")]
    Connect(#[from] quinn::ConnectError),
    #[error("TLS handshake with peer failed: {reason}")]
    Handshake { reason: String },
    #[error("disconnected: {reason}")]
    Disconnected { reason: String },
    #[error("i/o failure")]
    Io(#[from] io::Error),
    #[error("request failed with status {0}")]
    Status(http::StatusCode),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("trust material handling failed: {0}")]
    TrustMaterial(String),
    #[error("TLS credentials rejected")]
    Tls(#[from] rustls::Error),
}

impl TransportError {
    /// True if the failure is TLS-classified. Any handshake-level failure
    /// counts; the peer may simply be missing our trust material (or we
    /// theirs), which a trust-material fetch can reconcile.
    pub fn is_tls_handshake(&self) -> bool {
        matches!(self, TransportError::Handshake { .. })
    }
}

impl From<quinn::ConnectionError> for TransportError {
    fn from(value: quinn::ConnectionError) -> Self {
        match value {
            // Transport-level errors carry the TLS alerts exchanged during
            // the handshake, ours as well as the peer's.
            quinn::ConnectionError::TransportError(e) => {
                TransportError::Handshake { reason: e.to_string() }
            }
            quinn::ConnectionError::VersionMismatch => TransportError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "QUIC version mismatch",
            )),
            quinn::ConnectionError::Reset => {
                TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset))
            }
            quinn::ConnectionError::TimedOut => {
                TransportError::Io(io::Error::from(io::ErrorKind::TimedOut))
            }
            quinn::ConnectionError::ConnectionClosed(e) => {
                TransportError::Disconnected { reason: e.to_string() }
            }
            quinn::ConnectionError::ApplicationClosed(e) => {
                TransportError::Disconnected { reason: e.to_string() }
            }
            quinn::ConnectionError::LocallyClosed => {
                TransportError::Disconnected { reason: "connection closed locally".to_string() }
            }
        }
    }
}

impl From<quinn::WriteError> for TransportError {
    fn from(value: quinn::WriteError) -> Self {
        match value {
            quinn::WriteError::Stopped(e) => TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                e.to_string(),
            )),
            quinn::WriteError::ConnectionLost(cause) => cause.into(),
            quinn::WriteError::UnknownStream => TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "unknown QUIC stream",
            )),
            quinn::WriteError::ZeroRttRejected => TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "zero rtt rejected",
            )),
        }
    }
}
