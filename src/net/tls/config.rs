//! TLS configuration.
//!
//! [`TlsConfig`] only records paths and preferences. Nothing is read from
//! disk until a stream or listener is constructed from it, and every problem
//! with a referenced file is reported at that point as [`TlsError::Config`].

use super::verify::RecordingVerifier;
use super::TlsRuntime;
use crate::net::TlsError;
use pkcs8::EncryptedPrivateKeyInfo;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// On-disk encoding of the private key file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyEncoding {
    #[default]
    Pem,
    /// Raw DER (ASN.1).
    Asn1,
}

/// Where the password of an encrypted private key comes from.
#[derive(Clone, Default)]
pub enum KeyPassword {
    /// The key is not encrypted.
    #[default]
    None,
    /// A password known up front.
    Literal(String),
    /// Asked interactively when the key is loaded.
    Prompt(Arc<dyn Fn() -> Option<String> + Send + Sync>),
}

impl KeyPassword {
    /// Wraps an interactive callback.
    pub fn prompt<F>(ask: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        KeyPassword::Prompt(Arc::new(ask))
    }

    fn resolve(&self) -> Option<String> {
        match self {
            KeyPassword::None => None,
            KeyPassword::Literal(password) => Some(password.clone()),
            KeyPassword::Prompt(ask) => ask(),
        }
    }
}

impl fmt::Debug for KeyPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPassword::None => f.write_str("None"),
            KeyPassword::Literal(_) => f.write_str("Literal(<redacted>)"),
            KeyPassword::Prompt(_) => f.write_str("Prompt"),
        }
    }
}

/// TLS settings for a stream or a listener.
///
/// ```
/// use distrirc::net::{KeyEncoding, KeyPassword, TlsConfig};
///
/// let config = TlsConfig::new()
///     .with_cert_chain("/etc/distrirc/chain.pem")
///     .with_private_key_encoded("/etc/distrirc/key.der", KeyEncoding::Asn1)
///     .with_password(KeyPassword::Literal("hunter2".into()))
///     .with_ca_bundle("/etc/ssl/certs/ca-certificates.crt")
///     .with_cipher_list("TLS13_AES_256_GCM_SHA384:TLS13_CHACHA20_POLY1305_SHA256");
/// assert_eq!(config.key_encoding(), KeyEncoding::Asn1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    cert_chain: Option<PathBuf>,
    certificate: Option<PathBuf>,
    private_key: Option<PathBuf>,
    key_encoding: KeyEncoding,
    password: KeyPassword,
    ca_bundle: Option<PathBuf>,
    cipher_list: Option<String>,
    require_verified_peer: bool,
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// PEM file holding our certificate followed by its intermediates.
    pub fn with_cert_chain(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_chain = Some(path.into());
        self
    }

    /// PEM file holding our own certificate alone.
    pub fn with_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate = Some(path.into());
        self
    }

    /// PEM private key.
    pub fn with_private_key(self, path: impl Into<PathBuf>) -> Self {
        self.with_private_key_encoded(path, KeyEncoding::Pem)
    }

    pub fn with_private_key_encoded(mut self, path: impl Into<PathBuf>, encoding: KeyEncoding) -> Self {
        self.private_key = Some(path.into());
        self.key_encoding = encoding;
        self
    }

    pub fn with_password(mut self, password: KeyPassword) -> Self {
        self.password = password;
        self
    }

    /// Trusted CA certificates used to verify the peer.
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Colon-separated cipher suite names, e.g. `TLS13_AES_128_GCM_SHA256`.
    pub fn with_cipher_list(mut self, list: impl Into<String>) -> Self {
        self.cipher_list = Some(list.into());
        self
    }

    /// Abort client handshakes whose server certificate fails verification
    /// instead of only recording the outcome.
    pub fn require_verified_peer(mut self, required: bool) -> Self {
        self.require_verified_peer = required;
        self
    }

    pub fn cert_chain(&self) -> Option<&Path> {
        self.cert_chain.as_deref()
    }

    pub fn certificate(&self) -> Option<&Path> {
        self.certificate.as_deref()
    }

    pub fn private_key(&self) -> Option<&Path> {
        self.private_key.as_deref()
    }

    pub fn key_encoding(&self) -> KeyEncoding {
        self.key_encoding
    }

    pub fn ca_bundle(&self) -> Option<&Path> {
        self.ca_bundle.as_deref()
    }

    pub fn cipher_list(&self) -> Option<&str> {
        self.cipher_list.as_deref()
    }

    pub fn requires_verified_peer(&self) -> bool {
        self.require_verified_peer
    }

    /// Builds a client configuration plus the flag its verifier writes to.
    pub(crate) fn client_config(
        &self,
        runtime: &TlsRuntime,
    ) -> Result<(Arc<ClientConfig>, Arc<AtomicBool>), TlsError> {
        let provider = self.provider(runtime)?;
        let inner = match self.load_roots()? {
            Some(roots) => Some(
                WebPkiServerVerifier::builder_with_provider(roots, Arc::clone(&provider))
                    .build()
                    .map_err(|e| TlsError::Settings(e.to_string()))?,
            ),
            None => None,
        };
        let verifier = RecordingVerifier::new(inner, Arc::clone(&provider), self.require_verified_peer);
        let verdict = verifier.verdict();

        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier));

        let chain = self.load_certificates()?;
        let config = match (chain.is_empty(), self.load_private_key()?) {
            (false, Some(key)) => builder.with_client_auth_cert(chain, key)?,
            _ => builder.with_no_client_auth(),
        };
        Ok((Arc::new(config), verdict))
    }

    /// Builds a server configuration, optionally demanding client
    /// certificates signed by the CA bundle.
    pub(crate) fn server_config(
        &self,
        runtime: &TlsRuntime,
        require_client_cert: bool,
    ) -> Result<Arc<ServerConfig>, TlsError> {
        let provider = self.provider(runtime)?;
        let chain = self.load_certificates()?;
        let key = self.load_private_key()?;
        let key = match key {
            Some(key) if !chain.is_empty() => key,
            _ => {
                return Err(TlsError::Settings(
                    "a server needs a certificate and a private key".into(),
                ))
            }
        };

        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;
        let builder = if require_client_cert {
            let roots = self.load_roots()?.ok_or(TlsError::NoCaBundle)?;
            let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider)
                .build()
                .map_err(|e| TlsError::Settings(e.to_string()))?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };
        Ok(Arc::new(builder.with_single_cert(chain, key)?))
    }

    /// The runtime's provider, restricted to the configured cipher suites.
    fn provider(&self, runtime: &TlsRuntime) -> Result<Arc<CryptoProvider>, TlsError> {
        let base = runtime.provider();
        let Some(list) = self.cipher_list.as_deref() else {
            return Ok(Arc::clone(base));
        };

        let wanted: Vec<&str> = list
            .split(':')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        let suites: Vec<_> = base
            .cipher_suites
            .iter()
            .filter(|suite| {
                suite
                    .suite()
                    .as_str()
                    .is_some_and(|name| wanted.iter().any(|w| w.eq_ignore_ascii_case(name)))
            })
            .copied()
            .collect();
        if suites.is_empty() {
            return Err(TlsError::Settings(format!(
                "no supported cipher suite in \"{list}\""
            )));
        }
        debug!(kept = suites.len(), "Filtered cipher suites");
        Ok(Arc::new(CryptoProvider {
            cipher_suites: suites,
            ..CryptoProvider::clone(base)
        }))
    }

    /// Our certificate chain, leaf first. Empty when none is configured.
    fn load_certificates(&self) -> Result<Vec<CertificateDer<'static>>, TlsError> {
        let mut chain = Vec::new();
        if let Some(path) = &self.certificate {
            chain.extend(read_certificates(path)?.into_iter().take(1));
        }
        if let Some(path) = &self.cert_chain {
            for cert in read_certificates(path)? {
                if !chain.contains(&cert) {
                    chain.push(cert);
                }
            }
        }
        Ok(chain)
    }

    fn load_roots(&self) -> Result<Option<Arc<RootCertStore>>, TlsError> {
        let Some(path) = &self.ca_bundle else {
            return Ok(None);
        };
        let mut roots = RootCertStore::empty();
        for cert in read_certificates(path)? {
            roots
                .add(cert)
                .map_err(|e| TlsError::config(path, e))?;
        }
        Ok(Some(Arc::new(roots)))
    }

    fn load_private_key(&self) -> Result<Option<PrivateKeyDer<'static>>, TlsError> {
        let Some(path) = &self.private_key else {
            return Ok(None);
        };
        let raw = fs::read(path).map_err(|e| TlsError::config(path, e))?;

        let key = match self.key_encoding {
            KeyEncoding::Pem => {
                let text = std::str::from_utf8(&raw)
                    .map_err(|_| TlsError::config(path, "PEM file is not valid text"))?;
                if text.contains(ENCRYPTED_KEY_LABEL) {
                    let (_, document) = pkcs8::Document::from_pem(text)
                        .map_err(|e| TlsError::config(path, e))?;
                    self.decrypt_key(path, document.as_bytes())?
                } else {
                    PrivateKeyDer::from_pem_slice(&raw).map_err(|e| TlsError::config(path, e))?
                }
            }
            KeyEncoding::Asn1 => {
                if EncryptedPrivateKeyInfo::try_from(raw.as_slice()).is_ok() {
                    self.decrypt_key(path, &raw)?
                } else {
                    PrivateKeyDer::try_from(raw).map_err(|e| TlsError::config(path, e))?
                }
            }
        };
        Ok(Some(key))
    }

    fn decrypt_key(&self, path: &Path, der: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
        let info = EncryptedPrivateKeyInfo::try_from(der).map_err(|e| TlsError::config(path, e))?;
        let password = self
            .password
            .resolve()
            .ok_or_else(|| TlsError::config(path, "private key is encrypted but no password was given"))?;
        let secret = info
            .decrypt(password.as_bytes())
            .map_err(|e| TlsError::config(path, format!("cannot decrypt private key: {e}")))?;
        Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            secret.as_bytes().to_vec(),
        )))
    }
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| TlsError::config(path, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::config(path, e))?;
    if certs.is_empty() {
        return Err(TlsError::config(path, "no certificate found"));
    }
    Ok(certs)
}
