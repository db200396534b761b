//! TLS configuration
//!
//! Protocol versions, peer verification policies, the settings a host
//! embeds in its own configuration, and the error type shared by the
//! whole module.

use std::str::FromStr;

use openssl::ssl::{SslContextBuilder, SslVerifyMode};
use serde::{Deserialize, Serialize};

use super::cert::ValidityCheck;
use super::material::MaterialKind;
use super::session::Role;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    /// Parse TLS version from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }
}

impl TryFrom<String> for TlsVersion {
    type Error = TlsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TlsVersion> for String {
    fn from(version: TlsVersion) -> Self {
        version.as_str().to_string()
    }
}

/// Peer certificate verification policy
///
/// The policy a context applies to certificates presented by the other end
/// of the connection. The inbound SMTP side always runs with `Deferred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerVerification {
    /// Don't request a peer certificate
    Disabled,
    /// Request a peer certificate and accept whatever arrives.
    ///
    /// The trust decision is taken out of band, by a separate process that
    /// receives the certificate after the handshake (see
    /// [`DeferredPeer`](super::cert::DeferredPeer)). The handshake is never
    /// blocked on that decision.
    Deferred,
    /// Require a peer certificate and honour OpenSSL's verdict
    Enforced,
}

impl PeerVerification {
    /// Outcome for a certificate OpenSSL pre-verified as `preverify_ok`.
    pub fn decide(self, preverify_ok: bool) -> bool {
        match self {
            PeerVerification::Disabled | PeerVerification::Deferred => true,
            PeerVerification::Enforced => preverify_ok,
        }
    }

    /// Install this policy on a context
    pub fn apply(self, ctx: &mut SslContextBuilder) {
        match self {
            PeerVerification::Disabled => ctx.set_verify(SslVerifyMode::NONE),
            PeerVerification::Deferred => {
                ctx.set_verify_callback(SslVerifyMode::PEER, move |ok, _store| self.decide(ok))
            }
            PeerVerification::Enforced => {
                ctx.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT)
            }
        }
    }
}

/// Context settings a host can embed in its configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TlsSettings {
    /// Lowest protocol version offered
    pub min_version: Option<TlsVersion>,
    /// Highest protocol version offered
    pub max_version: Option<TlsVersion>,
    /// Cipher list (for TLS <= 1.2)
    pub cipher_list: Option<String>,
    /// Cipher suites (for TLS 1.3)
    pub ciphersuites: Option<String>,
    /// Certificate validity window checks
    pub validity: ValidityCheck,
}

impl TlsSettings {
    /// Reject settings OpenSSL would only fail on later
    pub fn validate(&self) -> Result<(), TlsError> {
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min > max {
                return Err(TlsError::InvalidConfig(format!(
                    "min_version {} is above max_version {}",
                    min.as_str(),
                    max.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate material incomplete: {missing} given without {present}")]
    IncompleteMaterial {
        present: MaterialKind,
        missing: MaterialKind,
    },

    #[error("Failed to load {kind}: {reason}")]
    MaterialLoad { kind: MaterialKind, reason: String },

    #[error("Private key does not match certificate: {0}")]
    KeyMismatch(openssl::error::ErrorStack),

    #[error("Session creation failed: {0}")]
    SessionCreation(openssl::error::ErrorStack),

    #[error("Session could not be bound to the {0} role")]
    ProtocolBinding(Role),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}
