//! Server certificate verification that records its outcome.
//!
//! A client connecting to an IRC server usually wants to know whether the
//! certificate checked out without refusing the connection outright. The
//! verifier below runs the regular WebPKI checks, stores the verdict in a
//! shared flag and lets the handshake continue. Handshake signatures are
//! always checked, so the key exchange is still bound to the certificate the
//! peer presented.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error, SignatureScheme};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) struct RecordingVerifier {
    inner: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
    enforce: bool,
    verified: Arc<AtomicBool>,
}

impl RecordingVerifier {
    /// `inner` is `None` when no CA bundle is configured.
    pub(crate) fn new(
        inner: Option<Arc<WebPkiServerVerifier>>,
        provider: Arc<CryptoProvider>,
        enforce: bool,
    ) -> Self {
        Self {
            inner,
            provider,
            enforce,
            verified: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn verdict(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.verified)
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        let outcome = match &self.inner {
            Some(inner) => {
                inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            }
            None => Err(Error::General("no CA bundle configured".into())),
        };

        match outcome {
            Ok(verified) => {
                debug!(server = ?server_name, "Server certificate verified");
                self.verified.store(true, Ordering::Release);
                Ok(verified)
            }
            Err(e) if self.enforce => {
                warn!(server = ?server_name, error = %e, "Rejecting server certificate");
                Err(e)
            }
            Err(e) => {
                debug!(server = ?server_name, error = %e, "Server certificate not verified");
                self.verified.store(false, Ordering::Release);
                Ok(ServerCertVerified::assertion())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
