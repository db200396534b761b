//! Crypto engine and context creation
//!
//! OpenSSL is initialised once through [`TlsEngine`]. Every context is
//! created by a [`ContextFactory`] borrowed from the engine, so nothing can
//! reach OpenSSL before it has been set up.

use foreign_types::ForeignTypeRef;
use openssl::error::ErrorStack;
use openssl::ssl::{
    Ssl, SslContext, SslContextBuilder, SslContextRef, SslMethod, SslOptions,
    SslSessionCacheMode, SslVerifyMode,
};

use super::cert::ValidityCheck;
use super::config::{TlsError, TlsSettings};

/// Process-wide OpenSSL state
///
/// Create one with [`TlsEngine::init`] at startup and keep it alive for as
/// long as sessions are being built.
#[derive(Debug)]
pub struct TlsEngine {
    version: &'static str,
}

impl TlsEngine {
    /// Initialise the OpenSSL library
    pub fn init() -> Self {
        openssl::init();
        let version = openssl::version::version();
        tracing::debug!(version, "crypto engine initialised");
        TlsEngine { version }
    }

    /// OpenSSL version string
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Create a context factory applying `settings` to every context
    pub fn context_factory(&self, settings: TlsSettings) -> ContextFactory<'_> {
        ContextFactory {
            _engine: self,
            settings,
        }
    }

    /// Tear the engine down.
    ///
    /// OpenSSL releases its own global state at process exit, this only
    /// marks the point after which no more contexts are created.
    pub fn shutdown(self) {
        tracing::debug!(version = self.version, "crypto engine shut down");
    }
}

/// Produces generically configured contexts
#[derive(Debug)]
pub struct ContextFactory<'e> {
    _engine: &'e TlsEngine,
    settings: TlsSettings,
}

impl ContextFactory<'_> {
    pub fn settings(&self) -> &TlsSettings {
        &self.settings
    }

    /// Create a fresh context.
    ///
    /// The context uses the version-flexible method so it can back either
    /// role; the role is chosen per session. Peer verification is off until
    /// a policy is installed.
    pub fn create(&self) -> Result<SessionContext, TlsError> {
        self.settings.validate()?;

        let mut builder = SslContextBuilder::new(SslMethod::tls())?;

        builder.set_options(SslOptions::ALL | SslOptions::NO_SSLV3 | SslOptions::NO_COMPRESSION);
        builder.set_session_cache_mode(SslSessionCacheMode::OFF);
        builder.set_verify(SslVerifyMode::NONE);

        if let Some(min) = self.settings.min_version {
            builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        }
        if let Some(max) = self.settings.max_version {
            builder.set_max_proto_version(Some(max.to_openssl_version()))?;
        }
        if let Some(ref ciphers) = self.settings.cipher_list {
            builder.set_cipher_list(ciphers)?;
        }
        if let Some(ref ciphers) = self.settings.ciphersuites {
            builder.set_ciphersuites(ciphers)?;
        }

        Ok(SessionContext::from_builder(builder).with_validity(self.settings.validity))
    }
}

/// Reusable configuration sessions are derived from
///
/// Holds protocol and verification policy plus the loaded certificate
/// material. A context stays mutable after sessions have been derived from
/// it; each session keeps its own reference to the underlying `SSL_CTX`.
pub struct SessionContext {
    builder: SslContextBuilder,
    validity: ValidityCheck,
}

impl SessionContext {
    /// Wrap a context configured elsewhere, with the default validity check
    pub fn from_builder(builder: SslContextBuilder) -> Self {
        SessionContext {
            builder,
            validity: ValidityCheck::default(),
        }
    }

    /// Replace the validity check sessions on this context default to
    pub fn with_validity(mut self, check: ValidityCheck) -> Self {
        self.validity = check;
        self
    }

    /// Validity check taken from the settings the context was created with
    pub fn validity(&self) -> ValidityCheck {
        self.validity
    }

    pub fn builder(&self) -> &SslContextBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut SslContextBuilder {
        &mut self.builder
    }

    /// Borrow the context as a finished `SslContextRef`
    pub fn as_context_ref(&self) -> &SslContextRef {
        // SAFETY: the builder owns a live SSL_CTX for at least as long as
        // `self` is borrowed, and the returned reference cannot outlive it.
        unsafe { SslContextRef::from_ptr(self.builder.as_ptr()) }
    }

    /// Derive a new, role-less session
    pub(crate) fn new_session(&self) -> Result<Ssl, ErrorStack> {
        Ssl::new(self.as_context_ref())
    }

    /// Freeze the context
    pub fn build(self) -> SslContext {
        self.builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::config::TlsVersion;
    use openssl::ssl::SslVersion;

    #[test]
    fn test_engine_version() {
        let engine = TlsEngine::init();
        assert!(engine.version().contains("SSL"));
        engine.shutdown();
    }

    #[test]
    fn test_default_context() {
        let engine = TlsEngine::init();
        let ctx = engine.context_factory(TlsSettings::default()).create().unwrap();

        assert!(ctx.builder().options().contains(SslOptions::NO_COMPRESSION));

        let ctx = ctx.as_context_ref();
        assert_eq!(ctx.verify_mode(), SslVerifyMode::NONE);
        assert!(ctx.certificate().is_none());
    }

    #[test]
    fn test_version_range() {
        let engine = TlsEngine::init();
        let settings = TlsSettings {
            min_version: Some(TlsVersion::Tls12),
            max_version: Some(TlsVersion::Tls13),
            ..TlsSettings::default()
        };
        let mut ctx = engine.context_factory(settings).create().unwrap();

        assert!(ctx.builder_mut().min_proto_version() == Some(SslVersion::TLS1_2));
        assert!(ctx.builder_mut().max_proto_version() == Some(SslVersion::TLS1_3));
    }

    #[test]
    fn test_bad_cipher_list() {
        let engine = TlsEngine::init();
        let settings = TlsSettings {
            cipher_list: Some("NO-SUCH-CIPHER".to_string()),
            ..TlsSettings::default()
        };

        let err = engine.context_factory(settings).create().err().unwrap();
        assert!(matches!(err, TlsError::OpenSsl(_)));
    }

    #[test]
    fn test_context_carries_validity() {
        let engine = TlsEngine::init();
        let settings = TlsSettings {
            validity: ValidityCheck::mirrored(),
            ..TlsSettings::default()
        };

        let ctx = engine.context_factory(settings).create().unwrap();
        assert_eq!(ctx.validity(), ValidityCheck::mirrored());

        let ctx = SessionContext::from_builder(SslContextBuilder::new(SslMethod::tls()).unwrap());
        assert_eq!(ctx.validity(), ValidityCheck::default());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let engine = TlsEngine::init();
        let settings = TlsSettings {
            min_version: Some(TlsVersion::Tls13),
            max_version: Some(TlsVersion::Tls10),
            ..TlsSettings::default()
        };

        let err = engine.context_factory(settings).create().err().unwrap();
        assert!(matches!(err, TlsError::InvalidConfig(_)));
    }

    #[test]
    fn test_sessions_outlive_context() {
        let engine = TlsEngine::init();
        let ctx = engine.context_factory(TlsSettings::default()).create().unwrap();

        let first = ctx.new_session().unwrap();
        let second = ctx.new_session().unwrap();
        drop(ctx);

        assert!(first.ssl_context().certificate().is_none());
        assert!(second.ssl_context().certificate().is_none());
    }
}
