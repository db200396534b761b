//! smtpd-tls - TLS session setup for an SMTP daemon
//!
//! This crate builds the per-connection OpenSSL sessions an SMTP process
//! needs in its two roles: relaying mail to remote servers (`smtp-out`) and
//! accepting mail from remote clients (`smtp-in`).

pub mod tls;
