#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod alpn;
pub mod body;
pub mod crypto;
pub mod http;
pub mod io;
pub mod proxy;
pub mod tls;
pub mod uri;
pub mod util;

use rcgen::{
    Certificate, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};
use rustls::{RootCertStore, pki_types::CertificateDer};
use std::{error::Error, sync::Arc};
use time::{Duration, OffsetDateTime};

use crate::crypto::init_crypto;

static FOXY_CA: &str = "foxyca";

/// In-memory certificate authority for the mock servers and for pointing a
/// manager's trust store at them. Nothing is written to disk.
#[derive(Debug, Clone)]
pub struct FoxyCA {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    issuer: Issuer<'static, KeyPair>,
    roots: Arc<RootCertStore>,
    ca_der: CertificateDer<'static>,
}

impl FoxyCA {
    pub fn generate() -> Result<FoxyCA, CaError> {
        init_crypto();

        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Unconstrained);

        ca_params.distinguished_name = DistinguishedName::new();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, FOXY_CA);
        ca_params
            .distinguished_name
            .push(DnType::OrganizationName, FOXY_CA);

        ca_params.key_usages.push(KeyUsagePurpose::DigitalSignature);
        ca_params.key_usages.push(KeyUsagePurpose::KeyCertSign);
        ca_params.key_usages.push(KeyUsagePurpose::CrlSign);

        ca_params.not_before = OffsetDateTime::now_utc();
        ca_params.not_after = OffsetDateTime::now_utc().saturating_add(Duration::days(365));

        let key_pair = KeyPair::generate()?;
        let ca_cert = ca_params.self_signed(&key_pair)?;
        let ca_der = ca_cert.der().clone();

        let mut roots = RootCertStore::empty();
        roots.add(ca_der.clone())?;

        let issuer = Issuer::new(ca_params, key_pair);
        Ok(FoxyCA {
            inner: Arc::new(Inner {
                issuer,
                roots: Arc::new(roots),
                ca_der,
            }),
        })
    }

    /// Trust store containing only this CA. Handed to a manager's builder
    /// so it accepts the leaves signed below.
    pub fn roots(&self) -> Arc<RootCertStore> {
        self.inner.roots.clone()
    }

    pub fn ca_der(&self) -> &CertificateDer<'static> {
        &self.inner.ca_der
    }

    pub fn sign_leaf(
        &self,
        cn: &str,
        subject_alt_names: impl Into<Vec<String>>,
    ) -> Result<(Certificate, KeyPair), rcgen::Error> {
        let mut params = CertificateParams::new(subject_alt_names)?;

        params.distinguished_name.push(DnType::CommonName, cn);
        params.is_ca = IsCa::NoCa;
        params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];

        let key_pair = KeyPair::generate()?;
        let leaf = params.signed_by(&key_pair, &self.inner.issuer)?;

        Ok((leaf, key_pair))
    }
}

#[derive(Debug)]
pub enum CaError {
    RcGen(rcgen::Error),
    RustLS(rustls::Error),
}

impl Error for CaError {}

impl std::fmt::Display for CaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<rcgen::Error> for CaError {
    fn from(value: rcgen::Error) -> Self {
        CaError::RcGen(value)
    }
}

impl From<rustls::Error> for CaError {
    fn from(value: rustls::Error) -> Self {
        CaError::RustLS(value)
    }
}
