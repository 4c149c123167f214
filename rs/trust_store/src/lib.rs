//! Trust Store
//!
//! Persistent keyed storage for TRCs and certificate chains, safe for
//! concurrent use. Two logical buckets exist: one holding DER-encoded TRCs
//! keyed by ISD and version pair, and one holding certificate chains keyed
//! by the subject's ISD-AS and subject key identifier.
//!
//! Lookups never fail on missing material; absence is reported as an empty
//! result. Inserts are idempotent on byte-identical re-insertion and refuse
//! to overwrite a TRC with the same identifier but different content.

mod sled_db;

use cion_base_types::Ia;
use cion_pki::{CertError, CertInfo, Trc, TrcError, TrcId};
use thiserror::Error;
use time::OffsetDateTime;

pub use sled_db::SledTrustDb;

#[derive(Debug, Error)]
pub enum TrustDbError {
    #[error("storage failure")]
    Storage(#[from] sled::Error),
    #[error("TRC with identifier {0} exists with different content")]
    ConflictingTrc(TrcId),
    #[error("unsupported TRC query {0}: latest must apply to both versions")]
    UnsupportedQuery(TrcId),
    #[error("invalid chain: {0}")]
    InvalidChain(String),
    #[error(transparent)]
    Cert(#[from] CertError),
    #[error(transparent)]
    Trc(#[from] TrcError),
}

/// A certificate chain: the AS certificate followed by the certificate of
/// its issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub as_cert: Vec<u8>,
    pub ca_cert: Vec<u8>,
}

impl Chain {
    /// Parsed information about the AS certificate.
    pub fn as_cert_info(&self) -> Result<CertInfo, CertError> {
        CertInfo::parse(&self.as_cert)
    }
}

/// Identifies the set of chains a lookup is interested in.
#[derive(Debug, Clone, Default)]
pub struct ChainQuery {
    /// ISD-AS of the AS certificate subject; the wildcard matches all.
    pub ia: Ia,
    /// Prefix the chain's subject key identifier must start with.
    pub subject_key_id: Vec<u8>,
    /// Lower bound: a matching chain's validity starts at or before this.
    /// `None` leaves the bound unconstrained.
    pub not_before: Option<OffsetDateTime>,
    /// Upper bound: a matching chain's validity ends at or after this.
    pub not_after: Option<OffsetDateTime>,
}

impl ChainQuery {
    /// The validity predicate a stored chain has to satisfy.
    pub fn matches_validity(&self, info: &CertInfo) -> bool {
        let not_before_ok = self
            .not_before
            .map(|bound| info.validity.not_before <= bound)
            .unwrap_or(true);
        let not_after_ok = self
            .not_after
            .map(|bound| info.validity.not_after >= bound)
            .unwrap_or(true);
        not_before_ok && not_after_ok
    }
}

/// Database interface for trust material.
pub trait TrustDb: Send + Sync {
    /// Looks up all chains matching the query. Missing material is not an
    /// error.
    fn chains(&self, query: &ChainQuery) -> Result<Vec<Chain>, TrustDbError>;

    /// Inserts the chain. Returns true if the chain was not yet stored.
    fn insert_chain(&self, chain: &Chain) -> Result<bool, TrustDbError>;

    /// Looks up the TRC with the given identifier. With both versions set
    /// to latest, returns the highest stored version pair of the ISD.
    fn signed_trc(&self, id: TrcId) -> Result<Option<Trc>, TrustDbError>;

    /// Inserts the TRC. Returns true if the TRC was not yet stored.
    fn insert_trc(&self, trc: &Trc) -> Result<bool, TrustDbError>;

    fn close(&self) -> Result<(), TrustDbError>;
}
