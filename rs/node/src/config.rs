use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use cion_base_types::Ia;
use cion_pki::Role;
use serde::Deserialize;

/// Top-level node configuration, read from a TOML file at start.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub trc: TrcConfig,
    pub control: ControlConfig,
    pub dataplane: DataplaneConfig,
    #[serde(default, rename = "neighbor")]
    pub neighbors: Vec<NeighborConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// The ISD-AS this node serves.
    pub local_ia: Ia,
    /// Role of the AS within its ISD.
    pub role: Role,
    /// Directory of the persistent trust store.
    pub trust_db_path: PathBuf,
}

/// Parameters of the base TRC a core node generates at first start.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrcConfig {
    #[serde(default = "default_trc_description")]
    pub description: String,
    /// Lifetime of the generated TRC and certificates in seconds.
    #[serde(default = "default_validity_seconds")]
    pub validity_seconds: i64,
    /// Core ASes of the ISD. Defaults to just the local AS, which is then
    /// the canonical root.
    #[serde(default)]
    pub core_ases: Vec<String>,
    /// Authoritative ASes. Defaults to the core set.
    #[serde(default)]
    pub authoritative_ases: Vec<String>,
}

impl Default for TrcConfig {
    fn default() -> TrcConfig {
        TrcConfig {
            description: default_trc_description(),
            validity_seconds: default_validity_seconds(),
            core_ases: Vec::new(),
            authoritative_ases: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// Bind address of the control-plane QUIC endpoint.
    pub listen: SocketAddr,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeighborConfig {
    pub ia: Ia,
    /// Underlay endpoint of the neighbor's control-plane server.
    pub addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataplaneConfig {
    /// Bind address of the host-facing underlay socket.
    pub internal: SocketAddr,
    /// Hex-encoded forwarding secret for hop-field MAC verification.
    pub forwarding_key: String,
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceConfig>,
}

/// One external SCION interface: its local bind address and the underlay
/// endpoint of the peer router behind it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    pub id: u16,
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl Config {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn forwarding_key(&self) -> anyhow::Result<Vec<u8>> {
        Ok(hex::decode(&self.dataplane.forwarding_key)?)
    }

    /// Interface id to peer-router underlay address, as consumed by the
    /// forwarder.
    pub fn external_next_hops(&self) -> HashMap<u16, SocketAddr> {
        self.dataplane
            .interfaces
            .iter()
            .map(|i| (i.id, i.remote))
            .collect()
    }

    /// Interface id to local bind address, as consumed by the socket
    /// runner.
    pub fn interface_binds(&self) -> HashMap<u16, SocketAddr> {
        self.dataplane
            .interfaces
            .iter()
            .map(|i| (i.id, i.local))
            .collect()
    }
}

fn default_trc_description() -> String {
    "CION base TRC".to_string()
}

fn default_validity_seconds() -> i64 {
    365 * 24 * 60 * 60
}

fn default_probe_interval_ms() -> u64 {
    1000
}
