//! # Runtime Configuration
//!
//! Which transport the façade uses, which endpoint it talks to, and which
//! enclave it speaks for. Read from the environment with `Config::from_env`,
//! or from any key lookup with `Config::from_lookup`.
//!
//! | variable                | meaning                                   |
//! |-------------------------|-------------------------------------------|
//! | `XDRUN_TRANSPORT`       | `direct` or `correlated`                  |
//! | `XDRUN_ENDPOINT`        | name the direct transport resolves        |
//! | `XDRUN_ENCLAVE`         | name logged with every operation          |
//! | `XDRUN_RECV_TIMEOUT_MS` | reply timeout for the correlated transport |

use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "ClosureRemote";
pub const DEFAULT_ENCLAVE: &str = "local";

pub const ENV_TRANSPORT: &str = "XDRUN_TRANSPORT";
pub const ENV_ENDPOINT: &str = "XDRUN_ENDPOINT";
pub const ENV_ENCLAVE: &str = "XDRUN_ENCLAVE";
pub const ENV_RECV_TIMEOUT_MS: &str = "XDRUN_RECV_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidTransport(String),
    InvalidTimeout(String),
    EmptyValue(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransport(s) => write!(f, "Unknown transport kind: {}", s),
            Self::InvalidTimeout(s) => write!(f, "Invalid receive timeout: {}", s),
            Self::EmptyValue(key) => write!(f, "{} is set but empty", key),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// In-process call through the name service.
    Direct,
    /// Tagged frames on a fabric.
    #[default]
    Correlated,
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "sync" => Ok(TransportKind::Direct),
            "correlated" | "async" => Ok(TransportKind::Correlated),
            _ => Err(Error::InvalidTransport(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Direct => f.write_str("direct"),
            TransportKind::Correlated => f.write_str("correlated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub transport: TransportKind,
    pub endpoint_name: String,
    pub enclave: String,
    pub recv_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            endpoint_name: DEFAULT_ENDPOINT.to_string(),
            enclave: DEFAULT_ENCLAVE.to_string(),
            recv_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(kind) = lookup(ENV_TRANSPORT) {
            config.transport = kind.parse()?;
        }
        if let Some(name) = lookup(ENV_ENDPOINT) {
            config.endpoint_name = non_empty(ENV_ENDPOINT, name)?;
        }
        if let Some(enclave) = lookup(ENV_ENCLAVE) {
            config.enclave = non_empty(ENV_ENCLAVE, enclave)?;
        }
        if let Some(ms) = lookup(ENV_RECV_TIMEOUT_MS) {
            let millis: u64 = ms.trim().parse().map_err(|_| Error::InvalidTimeout(ms.clone()))?;
            config.recv_timeout = Some(Duration::from_millis(millis));
        }

        Ok(config)
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_endpoint_name(mut self, name: impl Into<String>) -> Self {
        self.endpoint_name = name.into();
        self
    }

    pub fn with_enclave(mut self, enclave: impl Into<String>) -> Self {
        self.enclave = enclave.into();
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }
}

fn non_empty(key: &'static str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        Err(Error::EmptyValue(key))
    } else {
        Ok(value)
    }
}
