//! TLS transport loading for an optional broker TLS connection (spec §6).
//!
//! Reads X.509 client certificate, private key, and CA certificate from
//! PEM files and configures `rumqttc`'s TLS transport.

use rumqttc::Transport;

use crate::config::BrokerOptions;
use crate::error::{CommunicationError, CommunicationResult};

/// Build a TLS transport from certificate file paths in `options`.
pub fn load_tls_transport(options: &BrokerOptions) -> CommunicationResult<Transport> {
    let ca = std::fs::read(&options.ca_cert_path).map_err(|e| {
        CommunicationError::Tls(format!("failed to read CA cert '{}': {e}", options.ca_cert_path))
    })?;

    let client_cert = std::fs::read(&options.client_cert_path).map_err(|e| {
        CommunicationError::Tls(format!(
            "failed to read client cert '{}': {e}",
            options.client_cert_path
        ))
    })?;

    let client_key = std::fs::read(&options.client_key_path).map_err(|e| {
        CommunicationError::Tls(format!(
            "failed to read client key '{}': {e}",
            options.client_key_path
        ))
    })?;

    Ok(Transport::tls_with_config(rumqttc::TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: Some((client_cert, client_key)),
    }))
}

pub fn plaintext_transport() -> Transport {
    Transport::Tcp
}
