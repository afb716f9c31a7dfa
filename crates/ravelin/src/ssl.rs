//! TLS identity and certificate-authority materialization.
//!
//! The ssldir layout: `ca/` holds the CA certificate and key,
//! `certs/` and `private_keys/` hold host identities. Materialization
//! is idempotent; existing material is never regenerated.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SslError {
    #[error("PKI error: {0}")]
    Pki(#[from] rcgen::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no private key found in {0}")]
    MissingKey(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How this process uses certificate-authority data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaMode {
    /// Local CA lookups only.
    Local,
    /// Restricted to this process's own CA, nothing else.
    Only,
    /// CA usage disabled for this process.
    None,
}

impl CaMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Only => "only",
            Self::None => "none",
        }
    }
}

/// The CA singleton: certificate and key on disk under `<ssldir>/ca/`.
pub struct CertificateAuthority {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertificateAuthority {
    /// Create the CA material if absent, or pick up the existing one.
    pub fn materialize(ssldir: &Path) -> Result<Self, SslError> {
        let cert_path = ssldir.join("ca/ca_crt.pem");
        let key_path = ssldir.join("ca/ca_key.pem");

        if !(cert_path.exists() && key_path.exists()) {
            fs::create_dir_all(ssldir.join("ca"))?;
            let key = KeyPair::generate()?;
            let mut params = CertificateParams::new(vec!["ravelin-ca".to_string()])?;
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            let cert = params.self_signed(&key)?;
            fs::write(&cert_path, cert.pem())?;
            fs::write(&key_path, key.serialize_pem())?;
            tracing::info!(path = %cert_path.display(), "materialized certificate authority");
        }

        Ok(Self {
            cert_path,
            key_path,
        })
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    /// Reload the CA as an issuer for signing host certificates.
    fn issuer(&self) -> Result<(rcgen::Certificate, KeyPair), SslError> {
        let key = KeyPair::from_pem(&fs::read_to_string(&self.key_path)?)?;
        let params = CertificateParams::from_ca_cert_pem(&fs::read_to_string(&self.cert_path)?)?;
        let cert = params.self_signed(&key)?;
        Ok((cert, key))
    }
}

/// A host TLS identity: certificate and key paths under the ssldir.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Ensure the local-host identity exists, materializing it if absent.
///
/// Signed by the CA when this process has one, self-signed otherwise.
pub fn localhost_identity(
    ssldir: &Path,
    ca: Option<&CertificateAuthority>,
) -> Result<HostIdentity, SslError> {
    let cert_path = ssldir.join("certs/localhost.pem");
    let key_path = ssldir.join("private_keys/localhost.pem");

    if cert_path.exists() && key_path.exists() {
        return Ok(HostIdentity {
            cert_path,
            key_path,
        });
    }

    fs::create_dir_all(ssldir.join("certs"))?;
    fs::create_dir_all(ssldir.join("private_keys"))?;

    let key = KeyPair::generate()?;
    let params = CertificateParams::new(vec!["localhost".to_string()])?;
    let cert = match ca {
        Some(ca) => {
            let (issuer_cert, issuer_key) = ca.issuer()?;
            params.signed_by(&key, &issuer_cert, &issuer_key)?
        }
        None => params.self_signed(&key)?,
    };

    fs::write(&cert_path, cert.pem())?;
    fs::write(&key_path, key.serialize_pem())?;
    tracing::info!(path = %cert_path.display(), "materialized localhost TLS identity");

    Ok(HostIdentity {
        cert_path,
        key_path,
    })
}

/// Build the server-side TLS configuration from a host identity.
pub fn server_config(identity: &HostIdentity) -> Result<Arc<rustls::ServerConfig>, SslError> {
    let mut cert_reader = BufReader::new(fs::File::open(&identity.cert_path)?);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;

    let mut key_reader = BufReader::new(fs::File::open(&identity.key_path)?);
    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| SslError::MissingKey(identity.key_path.clone()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}
