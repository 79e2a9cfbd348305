//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🧠 Knowledge graph:
//! - `ClientConfig`: what the connection pool and bulk encoder need. Connections,
//!   strategy flag, retry-on-conflict default, auto-populate, UDP endpoint.
//! - `CliConfig`: knobs only the binary cares about (batch size, parallelism).
//! - `AppConfig`: both of the above, loaded by [`load_config`] via Figment from
//!   `SLUICE_*` env vars and an optional TOML file.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::connection::{ConnectionConfig, TransportKind, default_port};
use crate::error::Result;

/// 📦 Everything the client needs to know about the cluster it talks to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientConfig {
    /// 🔌 Explicit endpoints, in selection order. Empty → one endpoint built from the
    /// top-level `host`/`port`/`path`/`transport` fields below.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub transport: TransportKind,
    /// 🔄 Rotate across connections instead of sticking to the first healthy one.
    #[serde(default, alias = "roundRobin")]
    pub round_robin: bool,
    /// 🔁 Stamped onto every `update` action that doesn't carry its own `_retry_on_conflict`.
    #[serde(default, alias = "retryOnConflict")]
    pub retry_on_conflict: u32,
    /// 🪞 Copy server-assigned ids/versions back onto every id-less document, flag or no flag.
    #[serde(default)]
    pub auto_populate: bool,
    /// 📮 Where fire-and-forget bulk datagrams go.
    #[serde(default)]
    pub udp: UdpConfig,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connections: Vec::new(),
            host: default_host(),
            port: default_port(),
            path: None,
            transport: TransportKind::default(),
            round_robin: false,
            retry_on_conflict: 0,
            auto_populate: false,
            udp: UdpConfig::default(),
        }
    }
}

impl ClientConfig {
    /// 🎯 A config with exactly these endpoints and defaults for everything else.
    pub fn with_connections(connections: Vec<ConnectionConfig>) -> Self {
        Self {
            connections,
            ..Self::default()
        }
    }

    /// 🔌 The endpoints the pool will be built from, after applying the
    /// "no explicit connections → use the top-level host" rule. Each is validated.
    pub fn resolved_connections(&self) -> Result<Vec<ConnectionConfig>> {
        let resolved = if self.connections.is_empty() {
            vec![ConnectionConfig {
                host: self.host.clone(),
                port: self.port,
                path: self.path.clone(),
                transport: self.transport,
                ..ConnectionConfig::default()
            }]
        } else {
            self.connections.clone()
        };
        for connection in &resolved {
            connection.validate()?;
        }
        Ok(resolved)
    }
}

/// 📮 The UDP side channel. Default matches the classic bulk UDP listener.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct UdpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_udp_port")]
    pub port: u16,
}

// 📮 9700: the port where datagrams go to be maybe-indexed
fn default_udp_port() -> u16 {
    9700
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_udp_port(),
        }
    }
}

/// 🎛️ Knobs for the command-line front door.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CliConfig {
    /// 📦 Actions per bulk request when splitting a big file.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🧵 Bulk requests allowed in flight at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_batch_size() -> usize {
    500
}

fn default_parallelism() -> usize {
    1
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parallelism: default_parallelism(),
        }
    }
}

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub cli: CliConfig,
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`SLUICE_*`, nested keys split on `__`, so
/// `SLUICE_CLIENT__ROUND_ROBIN=true`) with an optional TOML file. TOML wins on conflicts.
///   - `None` → env vars only.
///   - `Some(path)` → env vars + TOML file, merged.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("SLUICE_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SLUICE_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SLUICE_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
