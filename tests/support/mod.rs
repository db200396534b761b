//! Shared test helpers

#![allow(dead_code)]

#[path = "../../src/tls/fixtures.rs"]
mod fixtures;

pub use fixtures::*;

use smtpd_tls::tls::CertificateMaterial;

impl Material {
    pub fn as_material(&self) -> CertificateMaterial<'_> {
        CertificateMaterial::new(&self.chain, &self.key)
    }
}

/// PEM material for a standalone identity
pub fn identity_material(identity: &Identity) -> Material {
    Material {
        chain: identity.cert.to_pem().unwrap(),
        key: identity.key.private_key_to_pem_pkcs8().unwrap(),
    }
}
