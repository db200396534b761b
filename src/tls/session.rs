//! TLS session construction
//!
//! Builds the per-connection OpenSSL session for each SMTP role.
//!
//! Both builders walk the same steps: get a context, install certificate
//! material, check the key against the certificate, derive a session, bind
//! it to its role, then look at the certificate's validity window. Any
//! failure before the last step drops everything created so far and
//! reports the error; the validity window check only ever warns.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use openssl::ssl::{Ssl, SslRef, SslStream};

use super::cert::{CertInfo, ValidityCheck, ValidityWarning};
use super::config::{PeerVerification, TlsError};
use super::context::{ContextFactory, SessionContext};
use super::diagnostics::{Diagnostics, TracingDiagnostics};
use super::material::{self, CertificateMaterial};

/// Which end of the SMTP connection a session serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Outbound relay to a remote server
    Client,
    /// Inbound connection from a remote client
    Server,
}

impl Role {
    /// Prefix for operator-facing messages
    pub fn log_prefix(self) -> &'static str {
        match self {
            Role::Client => "smtp-out",
            Role::Server => "smtp-in",
        }
    }

    /// Name of the build reported when construction fails
    pub fn failure_tag(self) -> &'static str {
        match self {
            Role::Client => "ssl_mta_init",
            Role::Server => "ssl_smtp_init",
        }
    }

    /// Whether sessions for this role accept rather than connect
    pub fn is_server(self) -> bool {
        self == Role::Server
    }

    fn bind(self, ssl: &mut SslRef) -> Result<(), TlsError> {
        match self {
            Role::Client => ssl.set_connect_state(),
            Role::Server => ssl.set_accept_state(),
        }

        if ssl.is_server() != self.is_server() {
            return Err(TlsError::ProtocolBinding(self));
        }
        Ok(())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// A session bound to one role, ready for its handshake
pub struct Session {
    ssl: Ssl,
    role: Role,
    warnings: Vec<ValidityWarning>,
}

impl Session {
    /// Role the session is bound to
    pub fn role(&self) -> Role {
        self.role
    }

    /// Underlying OpenSSL session
    pub fn ssl(&self) -> &SslRef {
        &self.ssl
    }

    /// Mutable access to the underlying OpenSSL session
    pub fn ssl_mut(&mut self) -> &mut SslRef {
        &mut self.ssl
    }

    /// Validity window warnings emitted while building this session
    pub fn validity_warnings(&self) -> &[ValidityWarning] {
        &self.warnings
    }

    /// Summary of the local certificate, if one was loaded
    pub fn certificate_info(&self) -> Option<CertInfo> {
        self.ssl.certificate().map(CertInfo::from_x509)
    }

    /// Give up the role binding and return the raw session
    pub fn into_ssl(self) -> Ssl {
        self.ssl
    }

    /// Run the handshake for this session's role over `stream`
    pub fn handshake<S: Read + Write>(self, stream: S) -> Result<SslStream<S>, TlsError> {
        let role = self.role;
        let mut stream = SslStream::new(self.ssl, stream)?;
        stream
            .do_handshake()
            .map_err(|e| TlsError::Handshake(format!("{} handshake failed: {}", role, e)))?;
        Ok(stream)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

fn check_validity(
    ssl: &SslRef,
    role: Role,
    check: &ValidityCheck,
    diagnostics: &dyn Diagnostics,
) -> Vec<ValidityWarning> {
    let Some(cert) = ssl.certificate() else {
        return Vec::new();
    };

    match check.inspect_now(cert) {
        Ok(warnings) => {
            for warning in &warnings {
                diagnostics.warning(role, &warning.to_string());
            }
            warnings
        }
        Err(e) => {
            tracing::debug!(role = role.log_prefix(), error = %e, "validity window not checked");
            Vec::new()
        }
    }
}

/// Builds outbound (MTA) sessions
///
/// Every session gets its own context from the factory. The context is
/// released as soon as the session exists.
pub struct ClientSessionBuilder<'a> {
    factory: &'a ContextFactory<'a>,
    validity: ValidityCheck,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<'a> ClientSessionBuilder<'a> {
    pub fn new(factory: &'a ContextFactory<'a>) -> Self {
        ClientSessionBuilder {
            validity: factory.settings().validity,
            factory,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn validity(mut self, check: ValidityCheck) -> Self {
        self.validity = check;
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Build a session, optionally presenting `material` as client identity.
    ///
    /// The validity window is only checked when material was given.
    pub fn build(&self, material: Option<CertificateMaterial<'_>>) -> Result<Session, TlsError> {
        self.try_build(material).map_err(|e| {
            self.diagnostics.failure(Role::Client.failure_tag(), &e);
            e
        })
    }

    /// [`build`](Self::build) from separately optional chain and key.
    ///
    /// Giving only one of the two is an error.
    pub fn build_from_parts(
        &self,
        chain: Option<&[u8]>,
        key: Option<&[u8]>,
    ) -> Result<Session, TlsError> {
        CertificateMaterial::from_parts(chain, key)
            .and_then(|material| self.try_build(material))
            .map_err(|e| {
                self.diagnostics.failure(Role::Client.failure_tag(), &e);
                e
            })
    }

    fn try_build(&self, material: Option<CertificateMaterial<'_>>) -> Result<Session, TlsError> {
        let mut context = self.factory.create()?;

        if let Some(material) = material {
            material::install(context.builder_mut(), material)?;
        }

        let mut ssl = context.new_session().map_err(TlsError::SessionCreation)?;
        Role::Client.bind(&mut ssl)?;

        // The session holds its own reference to whatever it needs.
        drop(context);

        let warnings = match material {
            Some(_) => check_validity(&ssl, Role::Client, &self.validity, &*self.diagnostics),
            None => Vec::new(),
        };

        Ok(Session {
            ssl,
            role: Role::Client,
            warnings,
        })
    }
}

/// Builds inbound sessions on a caller-owned context
///
/// The context is updated in place (material and the deferred peer
/// verification policy) and left with the caller. When several threads
/// share one context they must serialise their builds.
///
/// Unless [`validity`](Self::validity) is set, the validity window is
/// checked the way the context's settings say.
pub struct ServerSessionBuilder {
    validity: Option<ValidityCheck>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Default for ServerSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerSessionBuilder {
    pub fn new() -> Self {
        ServerSessionBuilder {
            validity: None,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn validity(mut self, check: ValidityCheck) -> Self {
        self.validity = Some(check);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Build a session presenting `material` as server identity.
    ///
    /// Peer certificates are requested and always accepted at this layer.
    pub fn build(
        &self,
        context: &mut SessionContext,
        material: CertificateMaterial<'_>,
    ) -> Result<Session, TlsError> {
        self.try_build(context, material).map_err(|e| {
            self.diagnostics.failure(Role::Server.failure_tag(), &e);
            e
        })
    }

    fn try_build(
        &self,
        context: &mut SessionContext,
        material: CertificateMaterial<'_>,
    ) -> Result<Session, TlsError> {
        self.diagnostics
            .debug(Role::Server, "session_start_ssl: switching to SSL");

        material::install(context.builder_mut(), material)?;
        PeerVerification::Deferred.apply(context.builder_mut());

        let mut ssl = context.new_session().map_err(TlsError::SessionCreation)?;
        Role::Server.bind(&mut ssl)?;

        let check = self.validity.unwrap_or_else(|| context.validity());
        let warnings = check_validity(&ssl, Role::Server, &check, &*self.diagnostics);

        Ok(Session {
            ssl,
            role: Role::Server,
            warnings,
        })
    }
}

/// Build an outbound session with default checks, logging through `tracing`
pub fn build_client_session(
    factory: &ContextFactory<'_>,
    chain: Option<&[u8]>,
    key: Option<&[u8]>,
) -> Result<Session, TlsError> {
    ClientSessionBuilder::new(factory).build_from_parts(chain, key)
}

/// Build an inbound session with default checks, logging through `tracing`
pub fn build_server_session(
    context: &mut SessionContext,
    chain: &[u8],
    key: &[u8],
) -> Result<Session, TlsError> {
    ServerSessionBuilder::new().build(context, CertificateMaterial::new(chain, key))
}
