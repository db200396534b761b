//! Certificate inspection
//!
//! Validity window checks for the local certificate, summaries used in log
//! fields, and the hand-off of a peer certificate accepted under
//! [`PeerVerification::Deferred`](super::config::PeerVerification::Deferred).

use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::ssl::SslRef;
use openssl::x509::{X509NameRef, X509Ref};
use serde::{Deserialize, Serialize};

use super::config::TlsError;

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: Self::get_cn(cert.subject_name()),
            issuer: Self::get_cn(cert.issuer_name()),
            subject_alt_names: Self::get_subject_alt_names(cert),
        }
    }

    fn get_cn(name: &X509NameRef) -> String {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "<undef>".to_string())
    }

    fn get_subject_alt_names(cert: &X509Ref) -> Vec<String> {
        let Some(san_ext) = cert.subject_alt_names() else {
            return Vec::new();
        };

        san_ext
            .iter()
            .filter_map(|name| {
                if let Some(dns) = name.dnsname() {
                    return Some(format!("DNS:{dns}"));
                }
                let ip = name.ipaddress()?;
                if let Ok(v4) = <[u8; 4]>::try_from(ip) {
                    Some(format!("IP:{}", Ipv4Addr::from(v4)))
                } else if let Ok(v6) = <[u8; 16]>::try_from(ip) {
                    Some(format!("IP:{}", Ipv6Addr::from(v6)))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Non-fatal anomaly in the local certificate's validity window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidityWarning {
    NotYetValid,
    Expired,
}

impl fmt::Display for ValidityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidityWarning::NotYetValid => f.write_str("certificate is not valid yet"),
            ValidityWarning::Expired => f.write_str("certificate has expired"),
        }
    }
}

/// When a validity bound triggers a warning, relative to the current time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundCheck {
    /// Warn when the bound lies strictly after now
    WarnIfLater,
    /// Warn when the bound lies strictly before now
    WarnIfEarlier,
    /// Never warn on this bound
    Ignore,
}

impl BoundCheck {
    /// `position` is the bound compared to now.
    pub fn triggers(self, position: Ordering) -> bool {
        match self {
            BoundCheck::WarnIfLater => position == Ordering::Greater,
            BoundCheck::WarnIfEarlier => position == Ordering::Less,
            BoundCheck::Ignore => false,
        }
    }
}

/// Validity window checks, one predicate per bound
///
/// A not-before bound that trips its predicate reports
/// [`ValidityWarning::NotYetValid`], a not-after bound reports
/// [`ValidityWarning::Expired`]. The outcome never fails a session build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ValidityCheck {
    pub not_before: BoundCheck,
    pub not_after: BoundCheck,
}

impl Default for ValidityCheck {
    fn default() -> Self {
        ValidityCheck {
            not_before: BoundCheck::WarnIfLater,
            not_after: BoundCheck::WarnIfEarlier,
        }
    }
}

impl ValidityCheck {
    /// The comparisons historically applied on the inbound side.
    ///
    /// Both predicates point the other way: a certificate already in its
    /// window is reported as "not valid yet" and "expired". Kept so the
    /// old behaviour can be reproduced on request; nothing selects it by
    /// default.
    pub fn mirrored() -> Self {
        ValidityCheck {
            not_before: BoundCheck::WarnIfEarlier,
            not_after: BoundCheck::WarnIfLater,
        }
    }

    /// Disable both checks
    pub fn disabled() -> Self {
        ValidityCheck {
            not_before: BoundCheck::Ignore,
            not_after: BoundCheck::Ignore,
        }
    }

    /// Warnings for a window whose bounds compare to now as given
    pub fn evaluate(&self, not_before: Ordering, not_after: Ordering) -> Vec<ValidityWarning> {
        let mut warnings = Vec::with_capacity(2);
        if self.not_before.triggers(not_before) {
            warnings.push(ValidityWarning::NotYetValid);
        }
        if self.not_after.triggers(not_after) {
            warnings.push(ValidityWarning::Expired);
        }
        warnings
    }

    /// Warnings for `cert` at time `now`
    pub fn inspect(&self, cert: &X509Ref, now: &Asn1TimeRef) -> Vec<ValidityWarning> {
        let (not_before, not_after) = ValidityWindow::of(cert).compare(now);
        self.evaluate(not_before, not_after)
    }

    /// Warnings for `cert` at the current wall-clock time
    pub fn inspect_now(&self, cert: &X509Ref) -> Result<Vec<ValidityWarning>, TlsError> {
        let now = Asn1Time::days_from_now(0)?;
        Ok(self.inspect(cert, &now))
    }
}

/// The `[not-before, not-after]` range of a certificate
#[derive(Clone, Copy)]
pub struct ValidityWindow<'a> {
    cert: &'a X509Ref,
}

impl<'a> ValidityWindow<'a> {
    pub fn of(cert: &'a X509Ref) -> Self {
        ValidityWindow { cert }
    }

    pub fn not_before(&self) -> &'a Asn1TimeRef {
        self.cert.not_before()
    }

    pub fn not_after(&self) -> &'a Asn1TimeRef {
        self.cert.not_after()
    }

    /// Position of (not-before, not-after) relative to `now`.
    ///
    /// A bound OpenSSL cannot compare counts as equal to now, so it never
    /// produces a warning.
    pub fn compare(&self, now: &Asn1TimeRef) -> (Ordering, Ordering) {
        (
            Self::position(self.not_before(), now),
            Self::position(self.not_after(), now),
        )
    }

    fn position(bound: &Asn1TimeRef, now: &Asn1TimeRef) -> Ordering {
        bound.compare(now).unwrap_or_else(|e| {
            tracing::debug!(%bound, error = %e, "unable to compare certificate time");
            Ordering::Equal
        })
    }
}

impl fmt::Debug for ValidityWindow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidityWindow")
            .field("not_before", &self.not_before().to_string())
            .field("not_after", &self.not_after().to_string())
            .finish()
    }
}

/// A peer certificate accepted without a local verdict
///
/// Handed to whichever component owns the trust decision once the
/// handshake has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredPeer {
    /// DER encoding of the peer's end-entity certificate
    pub certificate: Vec<u8>,
    /// DER encoding of the certificates OpenSSL reports as the peer chain
    pub chain: Vec<Vec<u8>>,
    pub info: CertInfo,
}

impl DeferredPeer {
    /// Collect the peer certificate from a completed handshake.
    ///
    /// Returns `None` when the peer did not present a certificate.
    pub fn from_ssl(ssl: &SslRef) -> Result<Option<Self>, TlsError> {
        let Some(peer) = ssl.peer_certificate() else {
            return Ok(None);
        };

        let chain = match ssl.peer_cert_chain() {
            Some(stack) => stack
                .iter()
                .map(|cert| cert.to_der())
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Some(DeferredPeer {
            certificate: peer.to_der()?,
            chain,
            info: CertInfo::from_x509(&peer),
        }))
    }
}
