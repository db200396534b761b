//! TLS session construction for SMTP
//!
//! This module turns certificate material into ready-to-handshake OpenSSL
//! sessions for both sides of an SMTP exchange.
//!
//! # Architecture
//!
//! Construction is split the same way for both roles:
//!
//! 1. `TlsEngine` initialises OpenSSL once per process and hands out a
//!    `ContextFactory`
//! 2. `material` installs a certificate chain and private key into a
//!    `SessionContext` and checks that they belong together
//! 3. `ClientSessionBuilder` / `ServerSessionBuilder` derive a `Session`,
//!    bind it to its role and sanity-check the certificate validity window
//!
//! The outbound (MTA) side owns a throwaway context per session. The inbound
//! side borrows a long-lived context owned by the caller, and installs a
//! deferred peer verification policy on it: client certificates are
//! requested but never rejected here, the verdict is reached elsewhere.
//!
//! # Examples
//!
//! ## Outbound session
//!
//! ```no_run
//! use smtpd_tls::tls::{TlsEngine, TlsSettings, ClientSessionBuilder, CertificateMaterial};
//!
//! let engine = TlsEngine::init();
//! let factory = engine.context_factory(TlsSettings::default());
//!
//! let chain = std::fs::read("/etc/mail/relay.crt").unwrap();
//! let key = std::fs::read("/etc/mail/relay.key").unwrap();
//!
//! let session = ClientSessionBuilder::new(&factory)
//!     .build(Some(CertificateMaterial::new(&chain, &key)))
//!     .unwrap();
//!
//! let tcp_stream = std::net::TcpStream::connect("mx.example.org:25").unwrap();
//! // ... EHLO / STARTTLS exchange ...
//! let tls_stream = session.handshake(tcp_stream).unwrap();
//! ```
//!
//! ## Inbound session
//!
//! ```no_run
//! use smtpd_tls::tls::{TlsEngine, TlsSettings, ServerSessionBuilder, CertificateMaterial};
//! use std::net::TcpListener;
//!
//! let engine = TlsEngine::init();
//! let mut context = engine.context_factory(TlsSettings::default()).create().unwrap();
//!
//! let chain = std::fs::read("/etc/mail/mx.crt").unwrap();
//! let key = std::fs::read("/etc/mail/mx.key").unwrap();
//!
//! let listener = TcpListener::bind("0.0.0.0:25").unwrap();
//! for tcp_stream in listener.incoming() {
//!     let session = ServerSessionBuilder::new()
//!         .build(&mut context, CertificateMaterial::new(&chain, &key))
//!         .unwrap();
//!     let tls_stream = session.handshake(tcp_stream.unwrap()).unwrap();
//! }
//! ```

pub mod cert;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod material;
#[cfg(test)]
#[allow(dead_code)]
mod fixtures;
pub mod session;

pub use cert::{BoundCheck, CertInfo, DeferredPeer, ValidityCheck, ValidityWarning, ValidityWindow};
pub use config::{PeerVerification, TlsError, TlsSettings, TlsVersion};
pub use context::{ContextFactory, SessionContext, TlsEngine};
pub use diagnostics::{Diagnostics, MemoryDiagnostics, TracingDiagnostics};
pub use material::{CertificateMaterial, MaterialKind};
pub use session::{
    build_client_session, build_server_session, ClientSessionBuilder, Role, ServerSessionBuilder,
    Session,
};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
