use std::collections::HashMap;
use std::fmt;

use cion_base_types::{Ia, Validity};
use der::Encode;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use x509_parser::prelude::{FromDer, ParsedExtension, X509Certificate};

use crate::trc::Trc;
use crate::{
    OID_EXT_KEY_USAGE_REGULAR, OID_EXT_KEY_USAGE_ROOT, OID_EXT_KEY_USAGE_SENSITIVE, OID_NAME_IA,
    oid_to_string,
};

const OID_EXTENSION_EXT_KEY_USAGE: &[u64] = &[2, 5, 29, 37];
const OID_KP_SERVER_AUTH: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 1];
const OID_KP_CLIENT_AUTH: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 2];
const OID_KP_TIME_STAMPING: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 8];

#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate generation failed")]
    Generate(#[from] rcgen::RcgenError),
    #[error("DER encoding failed")]
    Der(#[from] der::Error),
    #[error("malformed certificate: {0}")]
    Parse(String),
    #[error("certificate carries no ISD-AS attribute")]
    MissingIa,
    #[error("certificate carries no subject key identifier")]
    MissingSubjectKeyId,
    #[error("certificate matches no known kind")]
    UnknownKind,
    #[error("no {0} certificate in bundle")]
    MissingCertificate(CertKind),
    #[error("voting on TRCs is not implemented")]
    VoteUnimplemented,
}

/// The kind of a certificate in the control-plane PKI, determined by its
/// extension set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertKind {
    /// CA certificate that anchors an ISD, may issue CA certificates.
    Root,
    /// Sensitive voting certificate.
    Sensitive,
    /// Regular voting certificate.
    Regular,
    /// Intermediate CA certificate, may only issue AS certificates.
    Ca,
    /// AS leaf certificate, used for TLS client and server authentication.
    As,
}

impl fmt::Display for CertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CertKind::Root => "root",
            CertKind::Sensitive => "sensitive voting",
            CertKind::Regular => "regular voting",
            CertKind::Ca => "CA",
            CertKind::As => "AS",
        };
        f.write_str(name)
    }
}

/// Role of the local AS within its ISD. The role determines which
/// certificates the AS holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Core,
    Authoritative,
    Normal,
}

impl Role {
    /// Certificate kinds an AS of this role holds.
    pub fn certificate_kinds(&self) -> &'static [CertKind] {
        match self {
            Role::Core => &[CertKind::Root, CertKind::Sensitive, CertKind::Regular, CertKind::As],
            Role::Authoritative => &[CertKind::Regular, CertKind::As],
            Role::Normal => &[CertKind::As],
        }
    }
}

/// Fields extracted from a DER certificate that the rest of the node cares
/// about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub kind: CertKind,
    pub ia: Ia,
    pub subject_key_id: Vec<u8>,
    pub validity: Validity,
}

impl CertInfo {
    /// Parses and classifies a DER-encoded certificate.
    pub fn parse(der: &[u8]) -> Result<CertInfo, CertError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| CertError::Parse(e.to_string()))?;
        let ia = extract_ia(&cert)?;
        let subject_key_id = extract_subject_key_id(&cert)?;
        let validity = Validity::new(
            OffsetDateTime::from_unix_timestamp(cert.validity().not_before.timestamp())
                .map_err(|e| CertError::Parse(e.to_string()))?,
            OffsetDateTime::from_unix_timestamp(cert.validity().not_after.timestamp())
                .map_err(|e| CertError::Parse(e.to_string()))?,
        );
        Ok(CertInfo {
            kind: classify(&cert)?,
            ia,
            subject_key_id,
            validity,
        })
    }
}

/// Identity of a certificate chain: SHA-256 over the concatenated DER of
/// the AS certificate and the CA certificate.
pub fn chain_id(as_cert: &[u8], ca_cert: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(as_cert);
    hasher.update(ca_cert);
    hasher.finalize().to_vec()
}

/// TLS credential handle exported by the bundle: the AS certificate chain
/// plus the matching private key in a form the TLS stack consumes directly.
#[derive(Clone, Debug)]
pub struct TlsCertificate {
    pub cert_chain: Vec<rustls::Certificate>,
    pub key: rustls::PrivateKey,
}

struct BundleEntry {
    der: Vec<u8>,
    // Retains the private key; required so the AS certificate can be issued
    // by the root within the same `create` call.
    cert: rcgen::Certificate,
}

/// The certificates owned by a single AS, at most one per kind.
///
/// Private keys never leave the bundle; the only credential export is
/// [`CertificateBundle::tls_certificate`].
#[derive(Default)]
pub struct CertificateBundle {
    entries: HashMap<CertKind, BundleEntry>,
}

impl CertificateBundle {
    pub fn new() -> CertificateBundle {
        CertificateBundle::default()
    }

    /// Generates every certificate prescribed by the role, replacing all
    /// previous material in the bundle.
    pub fn create(&mut self, ia: Ia, role: Role, validity: Validity) -> Result<(), CertError> {
        self.entries.clear();
        for kind in role.certificate_kinds() {
            let entry = match kind {
                CertKind::Root => generate_root(ia, validity)?,
                CertKind::Sensitive => {
                    generate_voting(ia, OID_EXT_KEY_USAGE_SENSITIVE, validity)?
                }
                CertKind::Regular => generate_voting(ia, OID_EXT_KEY_USAGE_REGULAR, validity)?,
                CertKind::As => generate_as(ia, validity, self.entries.get(&CertKind::Root))?,
                CertKind::Ca => continue,
            };
            self.entries.insert(*kind, entry);
        }
        Ok(())
    }

    pub fn has_certificate(&self, kind: CertKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// DER encoding of the certificate of the given kind.
    pub fn certificate(&self, kind: CertKind) -> Option<&[u8]> {
        self.entries.get(&kind).map(|e| e.der.as_slice())
    }

    /// The AS certificate and private key as TLS credentials.
    pub fn tls_certificate(&self) -> Result<TlsCertificate, CertError> {
        let entry = self
            .entries
            .get(&CertKind::As)
            .ok_or(CertError::MissingCertificate(CertKind::As))?;
        Ok(TlsCertificate {
            cert_chain: vec![rustls::Certificate(entry.der.clone())],
            key: rustls::PrivateKey(entry.cert.serialize_private_key_der()),
        })
    }

    /// Appends this bundle's root and voting certificates to the TRC's
    /// certificate list, in the order root, sensitive, regular, skipping any
    /// already present, and re-encodes the TRC.
    pub fn join(&self, trc: &mut Trc) -> Result<(), CertError> {
        for kind in [CertKind::Root, CertKind::Sensitive, CertKind::Regular] {
            let Some(entry) = self.entries.get(&kind) else {
                continue;
            };
            if !trc.certificates.iter().any(|c| c == &entry.der) {
                trc.certificates.push(entry.der.clone());
            }
        }
        trc.reencode().map_err(|e| CertError::Parse(e.to_string()))
    }

    /// Adds this AS's vote to a TRC update. Reserved for the update path.
    pub fn vote(&self, _trc: Trc) -> Result<Trc, CertError> {
        Err(CertError::VoteUnimplemented)
    }
}

fn base_params(
    ia: Ia,
    common_name: String,
    validity: Validity,
) -> Result<rcgen::CertificateParams, CertError> {
    let key_pair = rcgen::KeyPair::generate(&rcgen::PKCS_ECDSA_P256_SHA256)?;

    let mut serial = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut serial);
    serial[0] &= 0x7f;

    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, rcgen::DnValue::Utf8String(common_name));
    dn.push(
        rcgen::DnType::CustomDnType(OID_NAME_IA.to_vec()),
        rcgen::DnValue::Utf8String(ia.to_string()),
    );

    let mut params = rcgen::CertificateParams::new(Vec::<String>::new());
    params.alg = &rcgen::PKCS_ECDSA_P256_SHA256;
    params.key_pair = Some(key_pair);
    params.serial_number = Some(rcgen::SerialNumber::from_slice(&serial));
    params.distinguished_name = dn;
    params.not_before = validity.not_before;
    params.not_after = validity.not_after;
    Ok(params)
}

fn ext_key_usage(oids: &[&[u64]]) -> Result<rcgen::CustomExtension, CertError> {
    let oids = oids
        .iter()
        .map(|oid| {
            der::asn1::ObjectIdentifier::new(&oid_to_string(oid))
                .map_err(|e| CertError::Parse(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let content = oids.to_der()?;
    Ok(rcgen::CustomExtension::from_oid_content(
        OID_EXTENSION_EXT_KEY_USAGE,
        content,
    ))
}

fn generate_root(ia: Ia, validity: Validity) -> Result<BundleEntry, CertError> {
    let mut params = base_params(ia, format!("{ia} Root"), validity)?;
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Constrained(1));
    params.key_usages = vec![rcgen::KeyUsagePurpose::KeyCertSign];
    params.custom_extensions = vec![ext_key_usage(&[OID_EXT_KEY_USAGE_ROOT])?];
    let cert = rcgen::Certificate::from_params(params)?;
    let der = cert.serialize_der()?;
    Ok(BundleEntry { der, cert })
}

fn generate_voting(ia: Ia, usage: &[u64], validity: Validity) -> Result<BundleEntry, CertError> {
    let label = if usage == OID_EXT_KEY_USAGE_SENSITIVE { "Sensitive" } else { "Regular" };
    let mut params = base_params(ia, format!("{ia} {label} Voting"), validity)?;
    params.is_ca = rcgen::IsCa::NoCa;
    params.custom_extensions = vec![ext_key_usage(&[OID_KP_TIME_STAMPING, usage])?];
    let cert = rcgen::Certificate::from_params(params)?;
    let der = cert.serialize_der()?;
    Ok(BundleEntry { der, cert })
}

fn generate_as(
    ia: Ia,
    validity: Validity,
    issuer: Option<&BundleEntry>,
) -> Result<BundleEntry, CertError> {
    let mut params = base_params(ia, format!("{ia} AS Certificate"), validity)?;
    params.is_ca = rcgen::IsCa::ExplicitNoCa;
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::KeyEncipherment,
    ];
    params.custom_extensions = vec![ext_key_usage(&[OID_KP_SERVER_AUTH, OID_KP_CLIENT_AUTH])?];
    let cert = rcgen::Certificate::from_params(params)?;
    let der = match issuer {
        Some(root) => cert.serialize_der_with_signer(&root.cert)?,
        None => cert.serialize_der()?,
    };
    Ok(BundleEntry { der, cert })
}

fn extract_ia(cert: &X509Certificate<'_>) -> Result<Ia, CertError> {
    let wanted = oid_to_string(OID_NAME_IA);
    for attr in cert.subject().iter_attributes() {
        if attr.attr_type().to_id_string() != wanted {
            continue;
        }
        let text = attr.as_str().map_err(|e| CertError::Parse(e.to_string()))?;
        return text.parse().map_err(|_| CertError::MissingIa);
    }
    Err(CertError::MissingIa)
}

fn extract_subject_key_id(cert: &X509Certificate<'_>) -> Result<Vec<u8>, CertError> {
    cert.extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::SubjectKeyIdentifier(id) => Some(id.0.to_vec()),
            _ => None,
        })
        .ok_or(CertError::MissingSubjectKeyId)
}

fn classify(cert: &X509Certificate<'_>) -> Result<CertKind, CertError> {
    let basic_constraints = cert
        .basic_constraints()
        .map_err(|e| CertError::Parse(e.to_string()))?
        .map(|ext| (ext.value.ca, ext.value.path_len_constraint));
    let is_ca = basic_constraints.map(|(ca, _)| ca).unwrap_or(false);
    let cert_sign = cert
        .key_usage()
        .map_err(|e| CertError::Parse(e.to_string()))?
        .map(|ext| ext.value.key_cert_sign())
        .unwrap_or(false);
    let eku = cert
        .extended_key_usage()
        .map_err(|e| CertError::Parse(e.to_string()))?
        .map(|ext| ext.value);

    let has_usage = |oid: &[u64]| {
        let wanted = oid_to_string(oid);
        eku.map(|e| e.other.iter().any(|o| o.to_id_string() == wanted))
            .unwrap_or(false)
    };

    if has_usage(OID_EXT_KEY_USAGE_ROOT) {
        if !is_ca || !cert_sign {
            return Err(CertError::UnknownKind);
        }
        return Ok(CertKind::Root);
    }
    if has_usage(OID_EXT_KEY_USAGE_SENSITIVE) {
        if is_ca {
            return Err(CertError::UnknownKind);
        }
        return Ok(CertKind::Sensitive);
    }
    if has_usage(OID_EXT_KEY_USAGE_REGULAR) {
        if is_ca {
            return Err(CertError::UnknownKind);
        }
        return Ok(CertKind::Regular);
    }
    if is_ca {
        if cert_sign && basic_constraints.map(|(_, len)| len == Some(0)).unwrap_or(false) {
            return Ok(CertKind::Ca);
        }
        return Err(CertError::UnknownKind);
    }
    let (server_auth, client_auth) =
        eku.map(|e| (e.server_auth, e.client_auth)).unwrap_or((false, false));
    if server_auth && client_auth {
        return Ok(CertKind::As);
    }
    Err(CertError::UnknownKind)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn test_ia() -> Ia {
        "1-ff00:0:110".parse().unwrap()
    }

    fn bundle_for(role: Role) -> CertificateBundle {
        let mut bundle = CertificateBundle::new();
        bundle
            .create(test_ia(), role, Validity::for_seconds_from_now(3600))
            .unwrap();
        bundle
    }

    #[test]
    fn core_role_holds_all_kinds() {
        let bundle = bundle_for(Role::Core);
        for kind in [CertKind::Root, CertKind::Sensitive, CertKind::Regular, CertKind::As] {
            assert!(bundle.has_certificate(kind), "{kind}");
        }
        assert!(!bundle.has_certificate(CertKind::Ca));
    }

    #[test]
    fn authoritative_role_holds_regular_and_as() {
        let bundle = bundle_for(Role::Authoritative);
        assert!(!bundle.has_certificate(CertKind::Root));
        assert!(!bundle.has_certificate(CertKind::Sensitive));
        assert!(bundle.has_certificate(CertKind::Regular));
        assert!(bundle.has_certificate(CertKind::As));
    }

    #[test]
    fn normal_role_holds_only_as() {
        let bundle = bundle_for(Role::Normal);
        assert!(!bundle.has_certificate(CertKind::Root));
        assert!(!bundle.has_certificate(CertKind::Sensitive));
        assert!(!bundle.has_certificate(CertKind::Regular));
        assert!(bundle.has_certificate(CertKind::As));
    }

    #[test]
    fn generated_certificates_classify_as_their_kind() {
        let bundle = bundle_for(Role::Core);
        for kind in [CertKind::Root, CertKind::Sensitive, CertKind::Regular, CertKind::As] {
            let info = CertInfo::parse(bundle.certificate(kind).unwrap()).unwrap();
            assert_eq!(info.kind, kind);
            assert_eq!(info.ia, test_ia());
            assert!(!info.subject_key_id.is_empty());
        }
    }

    #[test]
    fn certificate_validity_is_second_granular() {
        let validity = Validity::for_seconds_from_now(3600);
        let mut bundle = CertificateBundle::new();
        bundle.create(test_ia(), Role::Normal, validity).unwrap();
        let info = CertInfo::parse(bundle.certificate(CertKind::As).unwrap()).unwrap();
        assert_eq!(info.validity, validity);
    }

    #[test]
    fn tls_certificate_exports_as_credentials() {
        let bundle = bundle_for(Role::Normal);
        let tls = bundle.tls_certificate().unwrap();
        assert_eq!(tls.cert_chain.len(), 1);
        assert_eq!(tls.cert_chain[0].0, bundle.certificate(CertKind::As).unwrap());
        assert!(!tls.key.0.is_empty());
    }

    #[test]
    fn tls_certificate_requires_as_certificate() {
        let bundle = CertificateBundle::new();
        assert_matches!(
            bundle.tls_certificate(),
            Err(CertError::MissingCertificate(CertKind::As))
        );
    }

    #[test]
    fn create_replaces_previous_material() {
        let mut bundle = bundle_for(Role::Core);
        bundle
            .create(test_ia(), Role::Normal, Validity::for_seconds_from_now(3600))
            .unwrap();
        assert!(!bundle.has_certificate(CertKind::Root));
        assert!(bundle.has_certificate(CertKind::As));
    }

    #[test]
    fn vote_is_not_implemented() {
        let bundle = bundle_for(Role::Core);
        let trc = Trc::default();
        assert_matches!(bundle.vote(trc), Err(CertError::VoteUnimplemented));
    }

    #[test]
    fn chain_id_is_input_sensitive() {
        assert_ne!(chain_id(b"a", b"b"), chain_id(b"b", b"a"));
        assert_eq!(chain_id(b"a", b"b"), chain_id(b"a", b"b"));
        assert_eq!(chain_id(b"a", b"b").len(), 32);
    }
}
