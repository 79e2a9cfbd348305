// ai
//! 🔌 Connection — one server endpoint, one on/off switch.
//!
//! 🎬 *[a config walks into a pool. it leaves as a Connection. it never leaves again.]*
//!
//! 🧠 Knowledge graph:
//! - `ConnectionConfig`: the serde face. What the TOML/env says about an endpoint.
//! - `Connection`: the runtime face. Everything immutable after construction,
//!   except `enabled`, which is an `AtomicBool` because many requests read it and
//!   the failover loop flips it from whatever task noticed the node went dark.
//! - Identity is by reference: connections travel as `Arc<Connection>` and are
//!   compared with `Arc::ptr_eq`. Two connections to the same host:port are still
//!   two connections. Like twins. Same face, different tax returns. 🦆

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};

/// 🚚 How requests reach this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// 📡 Plain HTTP. The classic.
    #[default]
    Http,
    /// 🔒 HTTP over TLS.
    Https,
    /// 🕳️ Never touches the network. Dry runs and tests.
    Null,
}

impl TransportKind {
    /// 🔧 URL scheme used when building the base URL.
    pub fn scheme(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::Https => "https",
            TransportKind::Null => "null",
        }
    }
}

/// 📦 Serde-facing description of one endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// 📡 Hostname or IP. No scheme. The scheme comes from `transport`.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 🧭 Optional path prefix, for clusters hiding behind a reverse proxy at `/es` or similar.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub transport: TransportKind,
    /// ⏱️ Whole-request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// ⏱️ Connect timeout, seconds. `0` means "no separate connect timeout".
    #[serde(default)]
    pub connect_timeout: u64,
    /// 🔄 Keep idle sockets around between requests.
    #[serde(default = "default_persistent")]
    pub persistent: bool,
    /// 🫁 Gzip request bodies.
    #[serde(default)]
    pub compression: bool,
    /// 🏷️ Extra headers sent with every request through this connection.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 🎒 Transport-specific passthrough keys. Stored verbatim, interpreted by nobody here.
    #[serde(default)]
    pub config: Map<String, Value>,
}

// 📡 localhost: where every cluster starts its career
fn default_host() -> String {
    "localhost".to_string()
}

// 📡 9200: the port your fingers type before your brain catches up
pub(crate) fn default_port() -> u16 {
    9200
}

// ⏱️ 300 seconds. Five whole minutes. Bulk requests can be meaty and we're not monsters.
fn default_timeout() -> u64 {
    300
}

fn default_persistent() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: None,
            transport: TransportKind::default(),
            timeout: default_timeout(),
            connect_timeout: 0,
            persistent: default_persistent(),
            compression: false,
            headers: BTreeMap::new(),
            config: Map::new(),
        }
    }
}

impl ConnectionConfig {
    /// 🎯 A default config pointed at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// 🔧 Builder-style transport override.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// 🔒 Reject configs that can never produce a working endpoint.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::Configuration(
                "connection host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ClientError::Configuration(format!(
                "connection to '{}' has port 0, which is not a port, it is a cry for help",
                self.host
            )));
        }
        if self.timeout == 0 {
            return Err(ClientError::Configuration(format!(
                "connection to '{}:{}' has a zero timeout",
                self.host, self.port
            )));
        }
        // 🏷️ a header reqwest can't encode fails every request, on every node, forever
        for (name, value) in &self.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ClientError::Configuration(format!(
                    "connection to '{}:{}' has an invalid header name {name:?}",
                    self.host, self.port
                )));
            }
            if HeaderValue::from_str(value).is_err() {
                return Err(ClientError::Configuration(format!(
                    "connection to '{}:{}' has an invalid value for header {name:?}",
                    self.host, self.port
                )));
            }
        }
        Ok(())
    }
}

/// 🔌 A configured endpoint the pool can route requests through.
#[derive(Debug)]
pub struct Connection {
    host: String,
    port: u16,
    path: Option<String>,
    transport: TransportKind,
    timeout: Duration,
    connect_timeout: Option<Duration>,
    persistent: bool,
    compression: bool,
    headers: BTreeMap<String, String>,
    config: Map<String, Value>,
    // 🚦 the ONLY mutable field. flipped by the pool, read by every strategy.
    enabled: AtomicBool,
}

impl Connection {
    /// 🏗️ Build a connection from its config. Validates first, asks questions never.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            path: config
                .path
                .as_deref()
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            transport: config.transport,
            timeout: Duration::from_secs(config.timeout),
            connect_timeout: match config.connect_timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            persistent: config.persistent,
            compression: config.compression,
            headers: config.headers.clone(),
            config: config.config.clone(),
            enabled: AtomicBool::new(true),
        })
    }

    /// 🎯 Shorthand for a default connection at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::from_config(&ConnectionConfig::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// 🎒 The passthrough map. Look up transport-specific keys here.
    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// 🚦 Is this connection still eligible for selection?
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// ✅ Put a connection back into rotation. Only the owner decides this.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// 🗑️ Take the connection out of rotation.
    ///
    /// Returns `true` only for the caller that actually flipped it from enabled to
    /// disabled, so concurrent failures against the same node notify exactly once.
    pub fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }

    /// 📡 `scheme://host:port[/path]`, no trailing slash.
    pub fn base_url(&self) -> String {
        let mut url = format!("{}://{}:{}", self.transport.scheme(), self.host, self.port);
        if let Some(path) = &self.path {
            url.push('/');
            url.push_str(path);
        }
        url
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
