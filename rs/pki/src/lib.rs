//! PKI Engine
//!
//! Control-plane PKI for a single AS: generation and classification of the
//! SCION certificate kinds, the in-memory certificate bundle that backs the
//! node's TLS identity, the TRC payload codec, the base-TRC generator and
//! the per-ISD TRC state machine.
//!
//! All certificates use ECDSA over P-256 with SHA-256 and carry the ISD-AS
//! attribute in their subject distinguished name. Certificate kinds are
//! told apart by their extended key usage OIDs.

mod certs;
mod generator;
mod trc;
mod trcs;

pub use certs::{
    CertError, CertInfo, CertKind, CertificateBundle, Role, TlsCertificate, chain_id,
};
pub use generator::generate_base_trc;
pub use trc::{Trc, TrcError, TrcId, Version};
pub use trcs::TrcStateMachine;

/// Object identifier of the ISD-AS attribute in subject distinguished names.
pub(crate) const OID_NAME_IA: &[u64] = &[1, 3, 112, 4, 2, 2, 1];
/// Extended key usage marking a sensitive voting certificate.
pub(crate) const OID_EXT_KEY_USAGE_SENSITIVE: &[u64] = &[1, 3, 112, 4, 2, 2, 2];
/// Extended key usage marking a regular voting certificate.
pub(crate) const OID_EXT_KEY_USAGE_REGULAR: &[u64] = &[1, 3, 112, 4, 2, 2, 3];
/// Extended key usage marking a root certificate.
pub(crate) const OID_EXT_KEY_USAGE_ROOT: &[u64] = &[1, 3, 112, 4, 2, 2, 4];

pub(crate) fn oid_to_string(oid: &[u64]) -> String {
    let parts: Vec<String> = oid.iter().map(|c| c.to_string()).collect();
    parts.join(".")
}
