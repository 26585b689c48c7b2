//! Delivery server addresses
//!
//! A server is named by a URL of the form
//! `postern://<64 hex chars of server key>@host[:port]`.

use core::fmt;
use core::str::FromStr;

use url::Url;

use crate::errors::HandshakeError;

pub const ADDRESS_SCHEME: &str = "postern";
pub const DEFAULT_PORT: u16 = 16333;

/// A parsed delivery server address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    server_key: [u8; 32],
    host: String,
    port: u16,
}

impl ServerAddress {
    /// Parse and validate a server address
    pub fn parse(input: &str) -> Result<Self, HandshakeError> {
        let invalid = |reason: &str| HandshakeError::InvalidAddress {
            reason: reason.to_string(),
        };

        let url = Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != ADDRESS_SCHEME {
            return Err(invalid("unexpected scheme"));
        }
        if url.password().is_some() || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("unexpected URL components"));
        }
        if !(url.path().is_empty() || url.path() == "/") {
            return Err(invalid("unexpected path"));
        }

        let key_bytes = hex::decode(url.username()).map_err(|_| invalid("server key is not hex"))?;
        let server_key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| invalid("server key must be 32 bytes"))?;

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(invalid("missing host")),
        };

        Ok(Self {
            server_key,
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
        })
    }

    pub fn server_key(&self) -> &[u8; 32] {
        &self.server_key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}",
            ADDRESS_SCHEME,
            hex::encode(self.server_key),
            self.host
        )?;
        if self.port != DEFAULT_PORT {
            write!(f, ":{}", self.port)?;
        }
        Ok(())
    }
}

impl FromStr for ServerAddress {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
