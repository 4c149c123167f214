use cion_base_types::{Asn, Isd, Validity};

use crate::certs::CertificateBundle;
use crate::trc::{Trc, TrcError, TrcId, Version};

/// Generates a base TRC for the given ISD.
///
/// The caller provides the certificate bundle of the AS anchoring the ISD
/// (core index 0 designates the canonical root IA); its root and voting
/// certificates are folded into the TRC in the order root, sensitive,
/// regular. Only base TRCs (`version == base_version`) can be generated;
/// update TRCs require votes over a predecessor and are refused.
#[allow(clippy::too_many_arguments)]
pub fn generate_base_trc(
    isd: Isd,
    version: Version,
    base_version: Version,
    description: String,
    validity: Validity,
    core_ases: Vec<Asn>,
    authoritative_ases: Vec<Asn>,
    bundle: &CertificateBundle,
) -> Result<Trc, TrcError> {
    if version != base_version {
        return Err(TrcError::UpdateUnsupported);
    }
    let mut trc = Trc {
        id: TrcId { isd, base: base_version, serial: version },
        validity,
        grace_period: 0,
        no_trust_reset: false,
        votes: Vec::new(),
        quorum: 1,
        core_ases,
        authoritative_ases,
        description,
        certificates: Vec::new(),
        raw: Vec::new(),
    };
    bundle.join(&mut trc)?;
    trc.validate()?;
    Ok(trc)
}
