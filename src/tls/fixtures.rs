//! Certificates minted at test time
//!
//! Shared between the unit tests and the integration tests under `tests/`,
//! so it only depends on `openssl`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509NameBuilder, X509};

pub const HOUR: i64 = 60 * 60;
pub const DAY: i64 = 24 * HOUR;

static SERIAL: AtomicU32 = AtomicU32::new(1);

/// A certificate together with its private key
pub struct Identity {
    pub cert: X509,
    pub key: PKey<Private>,
}

/// PEM bytes as a caller would read them from disk
pub struct Material {
    pub chain: Vec<u8>,
    pub key: Vec<u8>,
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn p256_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn build(
    cn: &str,
    key: &PKey<Private>,
    issuer: Option<&Identity>,
    not_before: i64,
    not_after: i64,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::Relaxed))
        .unwrap()
        .to_asn1_integer()
        .unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();

    match issuer {
        Some(issuer) => {
            builder.set_issuer_name(issuer.cert.subject_name()).unwrap();
            let san = SubjectAlternativeName::new()
                .dns(cn)
                .build(&builder.x509v3_context(Some(&issuer.cert), None))
                .unwrap();
            builder.append_extension(san).unwrap();
            builder.sign(&issuer.key, MessageDigest::sha256()).unwrap();
        }
        None => {
            builder.set_issuer_name(&name).unwrap();
            builder
                .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                .unwrap();
            builder.sign(key, MessageDigest::sha256()).unwrap();
        }
    }

    builder.build()
}

/// Self-signed intermediate authority valid from yesterday until next year
pub fn authority(cn: &str) -> Identity {
    let key = p256_key();
    let now = unix_now();
    let cert = build(cn, &key, None, now - DAY, now + 365 * DAY);
    Identity { cert, key }
}

/// End-entity certificate with an explicit validity window (unix seconds)
pub fn leaf(cn: &str, issuer: &Identity, not_before: i64, not_after: i64) -> Identity {
    let key = p256_key();
    let cert = build(cn, &key, Some(issuer), not_before, not_after);
    Identity { cert, key }
}

/// Self-signed end-entity certificate, no chain
pub fn self_signed(cn: &str, not_before: i64, not_after: i64) -> Identity {
    let key = p256_key();
    let cert = build(cn, &key, None, not_before, not_after);
    Identity { cert, key }
}

/// `[leaf, intermediate]` chain with the leaf's key, leaf window relative to now
pub fn material_with_window(not_before_offset: i64, not_after_offset: i64) -> Material {
    let now = unix_now();
    let ca = authority("Test Intermediate");
    let leaf = leaf(
        "mx.example.org",
        &ca,
        now + not_before_offset,
        now + not_after_offset,
    );

    let mut chain = leaf.cert.to_pem().unwrap();
    chain.extend_from_slice(&ca.cert.to_pem().unwrap());

    Material {
        chain,
        key: leaf.key.private_key_to_pem_pkcs8().unwrap(),
    }
}

/// Window `[yesterday, next year]`
pub fn valid_material() -> Material {
    material_with_window(-DAY, 365 * DAY)
}

/// Not-before one hour in the future
pub fn not_yet_valid_material() -> Material {
    material_with_window(HOUR, 365 * DAY)
}

/// Not-after one hour in the past
pub fn expired_material() -> Material {
    material_with_window(-365 * DAY, -HOUR)
}

/// A valid chain paired with somebody else's key
pub fn mismatched_material() -> Material {
    let chain = valid_material().chain;
    let key = valid_material().key;
    Material { chain, key }
}
