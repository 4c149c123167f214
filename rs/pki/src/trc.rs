use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use cion_base_types::{Asn, Isd, Validity};
use der::asn1::GeneralizedTime;
use der::{Decode, Encode, Sequence};
use thiserror::Error;
use time::OffsetDateTime;

use crate::certs::{CertError, CertInfo, CertKind};

/// Lowest and highest ISD numbers assignable to an isolation domain.
const MIN_ISD: u16 = 1;
const MAX_ISD: u16 = 4094;

/// Payload format version 1 is encoded as the integer 0.
const PAYLOAD_FORMAT_VERSION: u64 = 0;

#[derive(Debug, Error)]
pub enum TrcError {
    #[error("invalid TRC: {0}")]
    Invalid(String),
    #[error("DER encoding failed")]
    Der(#[from] der::Error),
    #[error(transparent)]
    Cert(#[from] CertError),
    #[error("TRC ISD does not match the state machine ISD")]
    IsdMismatch,
    #[error("TRC base version does not match the current TRC")]
    BaseMismatch,
    #[error("TRC serial version is not increasing")]
    SerialNotIncreasing,
    #[error("TRC updates are not supported")]
    UpdateUnsupported,
    #[error("no TRC installed")]
    NoTrc,
}

/// A TRC version number. Version 0 is the `latest` sentinel used in
/// queries; stored TRCs always carry versions starting at 1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

impl Version {
    pub const LATEST: Version = Version(0);

    pub fn is_latest(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_latest() {
            return f.write_str("latest");
        }
        write!(f, "{}", self.0)
    }
}

/// Identifier of a TRC: the ISD it anchors plus base and serial versions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrcId {
    pub isd: Isd,
    pub base: Version,
    pub serial: Version,
}

impl TrcId {
    pub fn is_base(&self) -> bool {
        self.base == self.serial
    }
}

impl fmt::Display for TrcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ISD{}-B{}-S{}", self.isd, self.base, self.serial)
    }
}

#[derive(Sequence)]
struct TrcIdPayload {
    isd: u64,
    serial: u64,
    base: u64,
}

#[derive(Sequence)]
struct ValidityPayload {
    not_before: GeneralizedTime,
    not_after: GeneralizedTime,
}

/// On-wire TRC payload. Field order is fixed by the DER schema.
#[derive(Sequence)]
struct TrcPayload {
    version: u64,
    id: TrcIdPayload,
    validity: ValidityPayload,
    grace_period: u64,
    no_trust_reset: bool,
    votes: Vec<u64>,
    voting_quorum: u64,
    core_ases: Vec<String>,
    authoritative_ases: Vec<String>,
    description: String,
    certificates: Vec<x509_cert::Certificate>,
}

/// A Trust Root Configuration: the trust anchor of an ISD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trc {
    pub id: TrcId,
    pub validity: Validity,
    /// Grace period of the superseded TRC in seconds. Zero for base TRCs.
    pub grace_period: u64,
    pub no_trust_reset: bool,
    /// Indices into the predecessor's certificate list. Empty for base TRCs.
    pub votes: Vec<u64>,
    pub quorum: u64,
    pub core_ases: Vec<Asn>,
    pub authoritative_ases: Vec<Asn>,
    pub description: String,
    /// DER encodings of the root and voting certificates, in TRC order.
    pub certificates: Vec<Vec<u8>>,
    /// Canonical DER encoding of the payload.
    pub raw: Vec<u8>,
}

impl Default for Trc {
    fn default() -> Trc {
        Trc {
            id: TrcId::default(),
            validity: Validity::new(OffsetDateTime::UNIX_EPOCH, OffsetDateTime::UNIX_EPOCH),
            grace_period: 0,
            no_trust_reset: false,
            votes: Vec::new(),
            quorum: 0,
            core_ases: Vec::new(),
            authoritative_ases: Vec::new(),
            description: String::new(),
            certificates: Vec::new(),
            raw: Vec::new(),
        }
    }
}

impl Trc {
    pub fn is_base(&self) -> bool {
        self.id.is_base()
    }

    /// Encodes the payload to canonical DER.
    pub fn encode(&self) -> Result<Vec<u8>, TrcError> {
        let certificates = self
            .certificates
            .iter()
            .map(|der| x509_cert::Certificate::from_der(der))
            .collect::<Result<Vec<_>, _>>()?;
        let payload = TrcPayload {
            version: PAYLOAD_FORMAT_VERSION,
            id: TrcIdPayload {
                isd: self.id.isd.0 as u64,
                serial: self.id.serial.0,
                base: self.id.base.0,
            },
            validity: ValidityPayload {
                not_before: generalized_time(self.validity.not_before)?,
                not_after: generalized_time(self.validity.not_after)?,
            },
            grace_period: self.grace_period,
            no_trust_reset: self.no_trust_reset,
            votes: self.votes.clone(),
            voting_quorum: self.quorum,
            core_ases: self.core_ases.iter().map(|a| a.to_string()).collect(),
            authoritative_ases: self.authoritative_ases.iter().map(|a| a.to_string()).collect(),
            description: self.description.clone(),
            certificates,
        };
        Ok(payload.to_der()?)
    }

    /// Replaces `raw` with a fresh encoding of the current fields.
    pub fn reencode(&mut self) -> Result<(), TrcError> {
        self.raw = self.encode()?;
        Ok(())
    }

    /// Decodes a DER TRC payload.
    pub fn decode(raw: &[u8]) -> Result<Trc, TrcError> {
        let payload = TrcPayload::from_der(raw)?;
        if payload.version != PAYLOAD_FORMAT_VERSION {
            return Err(TrcError::Invalid(format!(
                "unsupported payload format version {}",
                payload.version
            )));
        }
        let isd = u16::try_from(payload.id.isd)
            .map_err(|_| TrcError::Invalid("ISD out of range".into()))?;
        let certificates = payload
            .certificates
            .iter()
            .map(|cert| cert.to_der())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Trc {
            id: TrcId {
                isd: Isd(isd),
                base: Version(payload.id.base),
                serial: Version(payload.id.serial),
            },
            validity: Validity::new(
                offset_date_time(payload.validity.not_before)?,
                offset_date_time(payload.validity.not_after)?,
            ),
            grace_period: payload.grace_period,
            no_trust_reset: payload.no_trust_reset,
            votes: payload.votes,
            quorum: payload.voting_quorum,
            core_ases: parse_ases(&payload.core_ases)?,
            authoritative_ases: parse_ases(&payload.authoritative_ases)?,
            description: payload.description,
            certificates,
            raw: raw.to_vec(),
        })
    }

    /// Structural validation of the TRC invariants.
    pub fn validate(&self) -> Result<(), TrcError> {
        let invalid = |msg: &str| TrcError::Invalid(msg.to_string());
        if self.id.isd.0 < MIN_ISD || self.id.isd.0 > MAX_ISD {
            return Err(invalid("ISD out of assignable range"));
        }
        if self.id.base.is_latest() || self.id.serial.is_latest() {
            return Err(invalid("version 0 is reserved"));
        }
        if self.id.base > self.id.serial {
            return Err(invalid("base version exceeds serial version"));
        }
        if self.validity.not_before >= self.validity.not_after {
            return Err(invalid("validity window is empty"));
        }
        if self.quorum < 1 {
            return Err(invalid("voting quorum must be at least 1"));
        }
        if self.core_ases.is_empty() {
            return Err(invalid("no core ASes"));
        }
        let core: HashSet<Asn> = self.core_ases.iter().copied().collect();
        if core.len() != self.core_ases.len() {
            return Err(invalid("duplicate core AS"));
        }
        if !self.authoritative_ases.iter().all(|a| core.contains(a)) {
            return Err(invalid("authoritative AS that is not a core AS"));
        }
        if self.is_base() && (!self.votes.is_empty() || self.grace_period != 0) {
            return Err(invalid("base TRC with votes or grace period"));
        }
        if self.certificates.is_empty() {
            return Err(invalid("no certificates"));
        }
        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut voters = 0u64;
        for der in &self.certificates {
            if !seen.insert(der.as_slice()) {
                return Err(invalid("duplicate certificate"));
            }
            let info = CertInfo::parse(der)?;
            match info.kind {
                CertKind::Root => {}
                CertKind::Sensitive | CertKind::Regular => voters += 1,
                _ => return Err(invalid("certificate is neither root nor voting")),
            }
            if !info.validity.contains(&self.validity) {
                return Err(invalid("certificate validity does not cover the TRC"));
            }
        }
        if voters < self.quorum {
            return Err(invalid("fewer voting certificates than the quorum"));
        }
        Ok(())
    }

    /// Certificates of the given kind, in TRC order.
    pub(crate) fn certificates_of_kind(&self, kinds: &[CertKind]) -> Vec<Vec<u8>> {
        self.certificates
            .iter()
            .filter(|der| {
                CertInfo::parse(der)
                    .map(|info| kinds.contains(&info.kind))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

fn generalized_time(t: OffsetDateTime) -> Result<GeneralizedTime, TrcError> {
    let secs = u64::try_from(t.unix_timestamp())
        .map_err(|_| TrcError::Invalid("validity predates the epoch".into()))?;
    Ok(GeneralizedTime::from_unix_duration(Duration::from_secs(secs))?)
}

fn offset_date_time(t: GeneralizedTime) -> Result<OffsetDateTime, TrcError> {
    OffsetDateTime::from_unix_timestamp(t.to_unix_duration().as_secs() as i64)
        .map_err(|e| TrcError::Invalid(e.to_string()))
}

fn parse_ases(texts: &[String]) -> Result<Vec<Asn>, TrcError> {
    texts
        .iter()
        .map(|s| s.parse().map_err(|_| TrcError::Invalid(format!("bad AS number {s:?}"))))
        .collect()
}
