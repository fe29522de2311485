//! TLS certificate store and hostname matching.
//!
//! Certificates are loaded once at startup from a directory of PEM `*.crt`
//! files. The file stem is the identifier the rendered configuration uses to
//! reference `ssl/<id>.crt` and `ssl/<id>.key`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use rustls_pki_types::{CertificateDer, ServerName};
use thiserror::Error;
use webpki::EndEntityCert;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("no PEM certificate found in {0}")]
    Empty(PathBuf),

    #[error("invalid certificate {path}: {reason:?}")]
    Invalid { path: PathBuf, reason: webpki::Error },
}

/// Immutable set of named certificates.
#[derive(Debug, Clone, Default)]
pub struct CertificateStore {
    certs: BTreeMap<String, CertificateDer<'static>>,
}

impl CertificateStore {
    /// Load every `*.crt` file in `dir`. Only the first certificate of each
    /// file is used.
    pub fn load(dir: &Path) -> Result<Self, CertificateError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |error| CertificateError::Io { path, error }
        };

        let mut certs = BTreeMap::new();
        for entry in fs::read_dir(dir).map_err(io_err(dir))? {
            let path = entry.map_err(io_err(dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("crt") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let file = File::open(&path).map_err(io_err(&path))?;
            let cert = rustls_pemfile::certs(&mut BufReader::new(file))
                .next()
                .ok_or_else(|| CertificateError::Empty(path.clone()))?
                .map_err(io_err(&path))?;

            EndEntityCert::try_from(&cert).map_err(|reason| CertificateError::Invalid {
                path: path.clone(),
                reason,
            })?;

            tracing::debug!(id = %id, path = %path.display(), "Loaded certificate");
            certs.insert(id.to_string(), cert);
        }

        tracing::info!(count = certs.len(), dir = %dir.display(), "Certificates loaded");
        Ok(Self { certs })
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.certs.keys().map(String::as_str)
    }

    /// Identifier of the first certificate, in identifier order, that is
    /// valid for `hostname`.
    pub fn find_for_host(&self, hostname: &str) -> Option<&str> {
        let name = ServerName::try_from(hostname).ok()?;
        self.certs.iter().find_map(|(id, der)| {
            let cert = EndEntityCert::try_from(der).ok()?;
            cert.verify_is_valid_for_subject_name(&name)
                .ok()
                .map(|_| id.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ssl")
    }

    #[test]
    fn test_load_skips_non_crt_files() {
        let store = CertificateStore::load(&fixtures()).unwrap();
        let ids: Vec<_> = store.ids().collect();
        assert_eq!(ids, vec!["shop", "wildcard", "zz-wildcard"]);
    }

    #[test]
    fn test_hostname_matching() {
        let store = CertificateStore::load(&fixtures()).unwrap();
        assert_eq!(store.find_for_host("shop.io"), Some("shop"));
        assert_eq!(store.find_for_host("www.shop.io"), Some("shop"));
        assert_eq!(store.find_for_host("example.com"), Some("wildcard"));
        assert_eq!(store.find_for_host("other.io"), None);
        assert_eq!(store.find_for_host("not a hostname"), None);
    }

    #[test]
    fn test_multiple_matches_pick_lowest_id() {
        let store = CertificateStore::load(&fixtures()).unwrap();
        // Both wildcard certificates cover api.example.com.
        assert_eq!(store.find_for_host("api.example.com"), Some("wildcard"));
    }

    #[test]
    fn test_rejects_file_without_certificate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.crt"), "garbage").unwrap();
        let err = CertificateStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, CertificateError::Empty(_)));
    }

    #[test]
    fn test_missing_dir() {
        let err = CertificateStore::load(Path::new("/nonexistent/webrouter/ssl")).unwrap_err();
        assert!(matches!(err, CertificateError::Io { .. }));
    }
}
