//! Client configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT};

/// Settings for opening a connection to the administration interface.
#[derive(Clone)]
pub struct ClientConfig {
    /// Host to connect to
    pub host: String,
    /// Port the administration interface listens on
    pub port: u16,
    /// Shared secret for challenge/response authentication. `None` expects
    /// a server that does not ask for authentication.
    pub secret: Option<String>,
    /// Upper bound on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Log every request line and response at debug level
    pub log_traffic: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secret: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            log_traffic: false,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `host:port` with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the shared secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Reads the shared secret from a file.
    ///
    /// The file content is used verbatim, trailing newline included, which
    /// is how the server itself reads its secret file.
    pub fn with_secret_file(mut self, path: impl AsRef<Path>) -> std::io::Result<Self> {
        self.secret = Some(std::fs::read_to_string(path)?);
        Ok(self)
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables or disables traffic logging for connections opened with this config.
    #[must_use]
    pub fn with_traffic_logging(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }

    /// Returns the remote address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keeps the secret out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("log_traffic", &self.log_traffic)
            .finish()
    }
}
