//! Certificate material loading
//!
//! Installs an in-memory certificate chain and private key into a context.
//! Both PEM and DER input are accepted; the bytes are only borrowed for the
//! duration of the call.

use std::ffi::c_int;
use std::fmt;
use std::ptr;

use openssl::pkey::PKey;
use openssl::ssl::SslContextBuilder;
use openssl::x509::X509;

use super::config::TlsError;

const SSL_CTRL_CLEAR_EXTRA_CHAIN_CERTS: c_int = 83;

/// Which half of the certificate material an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Chain,
    Key,
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialKind::Chain => f.write_str("certificate chain"),
            MaterialKind::Key => f.write_str("private key"),
        }
    }
}

/// Certificate chain (leaf first) and the leaf's private key
#[derive(Clone, Copy)]
pub struct CertificateMaterial<'a> {
    pub chain: &'a [u8],
    pub key: &'a [u8],
}

impl<'a> CertificateMaterial<'a> {
    pub fn new(chain: &'a [u8], key: &'a [u8]) -> Self {
        CertificateMaterial { chain, key }
    }

    /// Pair up optional chain and key buffers.
    ///
    /// Both or neither must be given; a lone chain or a lone key is
    /// rejected rather than silently ignored.
    pub fn from_parts(
        chain: Option<&'a [u8]>,
        key: Option<&'a [u8]>,
    ) -> Result<Option<Self>, TlsError> {
        match (chain, key) {
            (Some(chain), Some(key)) => Ok(Some(CertificateMaterial::new(chain, key))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(TlsError::IncompleteMaterial {
                present: MaterialKind::Chain,
                missing: MaterialKind::Key,
            }),
            (None, Some(_)) => Err(TlsError::IncompleteMaterial {
                present: MaterialKind::Key,
                missing: MaterialKind::Chain,
            }),
        }
    }
}

impl fmt::Debug for CertificateMaterial<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("chain_len", &self.chain.len())
            .field("key_len", &self.key.len())
            .finish()
    }
}

fn is_pem(bytes: &[u8]) -> bool {
    bytes.windows(10).any(|w| w == b"-----BEGIN")
}

fn load_error(kind: MaterialKind, reason: impl fmt::Display) -> TlsError {
    TlsError::MaterialLoad {
        kind,
        reason: reason.to_string(),
    }
}

/// Parse every certificate in a run of concatenated DER encodings
fn der_stack(mut chain: &[u8]) -> Result<Vec<X509>, TlsError> {
    let mut certs = Vec::new();

    while !chain.is_empty() {
        let cert = X509::from_der(chain).map_err(|e| load_error(MaterialKind::Chain, e))?;
        let used = cert
            .to_der()
            .map_err(|e| load_error(MaterialKind::Chain, e))?
            .len();
        if used == 0 || used > chain.len() {
            return Err(load_error(MaterialKind::Chain, "trailing bytes after certificate"));
        }
        chain = &chain[used..];
        certs.push(cert);
    }

    Ok(certs)
}

/// Drop intermediates installed by an earlier load
fn clear_extra_chain_certs(ctx: &mut SslContextBuilder) {
    // SAFETY: the builder owns a live SSL_CTX; the call frees the stack it
    // holds and takes no argument.
    unsafe {
        openssl_sys::SSL_CTX_ctrl(
            ctx.as_ptr(),
            SSL_CTRL_CLEAR_EXTRA_CHAIN_CERTS,
            0,
            ptr::null_mut(),
        );
    }
}

/// Install the leaf certificate and any intermediates that follow it.
///
/// Intermediates from a previous load on the same context are replaced, so
/// reloading a context once per connection does not grow it.
pub fn load_chain(ctx: &mut SslContextBuilder, chain: &[u8]) -> Result<(), TlsError> {
    let certs = if is_pem(chain) {
        X509::stack_from_pem(chain).map_err(|e| load_error(MaterialKind::Chain, e))?
    } else {
        der_stack(chain)?
    };

    let mut certs = certs.into_iter();
    let leaf = certs
        .next()
        .ok_or_else(|| load_error(MaterialKind::Chain, "no certificate found"))?;

    ctx.set_certificate(&leaf)
        .map_err(|e| load_error(MaterialKind::Chain, e))?;

    clear_extra_chain_certs(ctx);
    for cert in certs {
        ctx.add_extra_chain_cert(cert)
            .map_err(|e| load_error(MaterialKind::Chain, e))?;
    }

    Ok(())
}

/// Install the private key
pub fn load_key(ctx: &mut SslContextBuilder, key: &[u8]) -> Result<(), TlsError> {
    let pkey = if is_pem(key) {
        PKey::private_key_from_pem(key)
    } else {
        PKey::private_key_from_der(key)
    }
    .map_err(|e| load_error(MaterialKind::Key, e))?;

    ctx.set_private_key(&pkey)
        .map_err(|e| load_error(MaterialKind::Key, e))
}

/// Check that the installed key belongs to the installed leaf certificate
pub fn keys_consistent(ctx: &SslContextBuilder) -> Result<(), TlsError> {
    ctx.check_private_key().map_err(TlsError::KeyMismatch)
}

/// Load chain, load key, check they match; stops at the first failure.
pub fn install(ctx: &mut SslContextBuilder, material: CertificateMaterial<'_>) -> Result<(), TlsError> {
    load_chain(ctx, material.chain)?;
    load_key(ctx, material.key)?;
    keys_consistent(ctx)
}
