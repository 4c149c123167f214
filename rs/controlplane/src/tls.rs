//! TLS configuration for the control-plane QUIC endpoints.
//!
//! Both directions are authenticated. The server demands a client
//! certificate but defers its authorisation to a higher layer; presentation
//! alone lets the RPC proceed. The client verifies the server's AS
//! certificate against the chains recorded in the trust store, except on
//! the trust-material fetch path, whose whole purpose is reconciling a
//! store that does not know the peer yet.

use std::sync::Arc;
use std::time::SystemTime;

use cion_base_types::Ia;
use cion_trust_store::{ChainQuery, TrustDb};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::server::{ClientCertVerified, ClientCertVerifier};
use rustls::{Certificate, CertificateError, DistinguishedName, ServerName};
use time::OffsetDateTime;

use cion_pki::TlsCertificate;

/// ALPN protocol identifier offered on every connection.
pub(crate) const ALPN: &[u8] = b"h3";

/// Accepts any presented client certificate.
pub(crate) struct AcceptAnyClientCert;

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn client_auth_root_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }
}

/// Verifies the server leaf certificate against the trust store: the
/// presented certificate must be the AS certificate of a currently valid
/// chain stored for the neighbor.
pub(crate) struct TrustStoreServerVerifier {
    db: Arc<dyn TrustDb>,
    neighbor: Ia,
}

impl TrustStoreServerVerifier {
    pub(crate) fn new(db: Arc<dyn TrustDb>, neighbor: Ia) -> TrustStoreServerVerifier {
        TrustStoreServerVerifier { db, neighbor }
    }
}

impl ServerCertVerifier for TrustStoreServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let now = OffsetDateTime::now_utc();
        let query = ChainQuery {
            ia: self.neighbor,
            subject_key_id: Vec::new(),
            not_before: Some(now),
            not_after: Some(now),
        };
        let chains = self
            .db
            .chains(&query)
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        if chains.iter().any(|c| c.as_cert == end_entity.0) {
            return Ok(ServerCertVerified::assertion());
        }
        Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer))
    }
}

/// Accepts any server certificate. Only used by the trust-material fetch.
pub(crate) struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Server-side TLS configuration: offer the AS certificate, require a
/// client certificate.
pub(crate) fn server_crypto(
    identity: &TlsCertificate,
) -> Result<rustls::ServerConfig, rustls::Error> {
    let mut config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(Arc::new(AcceptAnyClientCert))
        .with_single_cert(identity.cert_chain.clone(), identity.key.clone())?;
    config.alpn_protocols = vec![ALPN.to_vec()];
    Ok(config)
}

/// Client-side TLS configuration with the given server verification policy.
pub(crate) fn client_crypto(
    identity: &TlsCertificate,
    verifier: Arc<dyn ServerCertVerifier>,
) -> Result<rustls::ClientConfig, rustls::Error> {
    let mut config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(verifier)
        .with_client_auth_cert(identity.cert_chain.clone(), identity.key.clone())?;
    config.alpn_protocols = vec![ALPN.to_vec()];
    Ok(config)
}
