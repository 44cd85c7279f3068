//! Root certificate loading for the HTTPS connector.

use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

/// OS root certificates, loaded once per process. May be empty.
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "error loading native root certificate");
        }
        tracing::debug!(count = loaded.certs.len(), "loaded native root certificates");
        loaded.certs
    })
}

/// The process-wide rustls provider if one is installed, aws-lc-rs otherwise.
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// rustls client config trusting the OS store.
///
/// # Errors
///
/// Fails when the store is empty or none of its certificates parse.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err("no native root CA certificates found in OS certificate store".to_owned());
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.iter().cloned());
    if added == 0 {
        return Err(format!(
            "none of the {} native root CA certificates could be parsed",
            certs.len()
        ));
    }
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }

    Ok(rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn native_roots_are_cached() {
        let first = native_root_certs();
        let second = native_root_certs();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn native_config_matches_store_contents() {
        // Minimal containers may ship without an OS store.
        let config = native_roots_client_config();
        assert_eq!(config.is_ok(), !native_root_certs().is_empty());
    }
}
