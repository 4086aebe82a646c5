//! TLS transport.
//!
//! Built on `rustls` with the `ring` provider. The provider is installed once
//! per process through [`TlsRuntime::init`]; every TLS constructor takes the
//! resulting handle, so there is no hidden global initialisation step.
//!
//! ## Peer Verification
//!
//! ```text
//!            client side                         server side
//!   ┌──────────────────────────────┐   ┌──────────────────────────────────┐
//!   │ CA bundle configured?        │   │ accept()                         │
//!   │   yes: verify, record result │   │   no client cert requested       │
//!   │   no:  record "unverified"   │   │   peer_verified() == true        │
//!   │ handshake proceeds either    │   │ accept_requiring_cert()          │
//!   │ way unless the config asks   │   │   cert required + checked        │
//!   │ for a verified peer          │   │   against the CA bundle          │
//!   └──────────────────────────────┘   └──────────────────────────────────┘
//! ```

mod config;
mod stream;
mod verify;

pub use config::{KeyEncoding, KeyPassword, TlsConfig};
pub use stream::{TlsServer, TlsStream};

use super::TlsError;
use rustls::crypto::CryptoProvider;
use std::sync::Arc;
use tracing::debug;

/// Handle proving the TLS library is initialised.
///
/// Cloning is cheap. When the last clone is dropped the runtime logs its
/// teardown; the provider itself stays installed for the process lifetime.
#[derive(Clone, Debug)]
pub struct TlsRuntime {
    inner: Arc<RuntimeInner>,
}

#[derive(Debug)]
struct RuntimeInner {
    provider: Arc<CryptoProvider>,
}

impl TlsRuntime {
    /// Installs the process-wide crypto provider if needed.
    pub fn init() -> Result<Self, TlsError> {
        // Losing the race to another installer is fine; use whatever won.
        let _ = CryptoProvider::install_default(rustls::crypto::ring::default_provider());
        let provider = CryptoProvider::get_default()
            .cloned()
            .ok_or_else(|| TlsError::Settings("no crypto provider installed".into()))?;
        debug!(
            cipher_suites = provider.cipher_suites.len(),
            "TLS runtime initialised"
        );
        Ok(Self {
            inner: Arc::new(RuntimeInner { provider }),
        })
    }

    pub(crate) fn provider(&self) -> &Arc<CryptoProvider> {
        &self.inner.provider
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        debug!("TLS runtime released");
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::TlsConfig;
    use std::path::PathBuf;

    pub fn path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    pub fn server_config() -> TlsConfig {
        TlsConfig::new()
            .with_cert_chain(path("server-chain.pem"))
            .with_private_key(path("server.key"))
            .with_ca_bundle(path("ca.pem"))
    }

    pub fn client_config() -> TlsConfig {
        TlsConfig::new().with_ca_bundle(path("ca.pem"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        let first = TlsRuntime::init().unwrap();
        let second = TlsRuntime::init().unwrap();
        assert!(!first.provider().cipher_suites.is_empty());
        assert!(Arc::ptr_eq(first.provider(), second.provider()));
    }
}
