//! Data-Plane Forwarder
//!
//! Stateless per-packet processing of SCION data-plane traffic: header
//! decoding, hop-field MAC verification, path-pointer advancement and
//! resolution of the egress underlay address. Processing mutates the packet
//! buffer in place and only commits once every check has passed; on any
//! error the buffer is untouched.
//!
//! Processor objects are pooled so the steady state allocates nothing per
//! packet. The forwarder is safe for concurrent use on disjoint packet
//! buffers.

mod processor;
mod runner;
pub mod wire;

use thiserror::Error;

pub use processor::{Forwarder, NextHop, INTERNAL_INTERFACE};
pub use runner::Dataplane;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    InvalidPacket(String),
    #[error("hop field expired")]
    HopExpired,
    #[error("packet received on interface {actual}, hop field expects {expected}")]
    IngressMismatch { expected: u16, actual: u16 },
    #[error("hop field MAC verification failed")]
    MacInvalid,
    #[error("no underlay address for egress interface {0}")]
    UnknownExternalInterface(u16),
    #[error("path pointer cannot advance past the last hop")]
    PathOverflow,
    #[error("packet for another AS delivered to the local host path")]
    LocalDestinationMismatch,
    #[error("packet from the local host carries no egress interface")]
    EgressZeroFromInternal,
}
