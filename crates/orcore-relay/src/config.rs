//! Relay configuration: a flat `serde`-deserializable struct loaded from
//! TOML, with `directories` supplying the platform default config path.
//! The teacher's `arti-relay/src/config.rs` builds this the same way but
//! through a `derive_builder`/`tor-config` layer meant for a much larger,
//! hot-reloadable multi-module config surface; a relay with one config
//! file and no reload story doesn't need that indirection, so this is a
//! plain `Deserialize` struct with `#[serde(default)]` fields instead.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::err::{Error, Result};

/// Default per-link send-side token-bucket refill rate, in bytes/sec.
pub const DEFAULT_BANDWIDTH_RATE: u64 = 1024 * 1024;
/// Default per-link token-bucket burst capacity, in bytes.
pub const DEFAULT_BANDWIDTH_BURST: u64 = 4 * 1024 * 1024;
/// Default window an OR-link may sit idle before it's a candidate for
/// expiry (spec §4.C).
pub const DEFAULT_LINK_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);
/// Default timeout for building a circuit end-to-end before giving up.
pub const DEFAULT_CIRCUIT_BUILD_TIMEOUT: Duration = Duration::from_secs(60);
/// Default grace period for draining a circuit's in-flight cells once
/// it's been asked to close, before it's torn down unconditionally.
pub const DEFAULT_CIRCUIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);
/// Default max duration an origin circuit may be reused for new streams
/// before it's retired in favor of a fresh one (spec's
/// `MaxCircuitDirtiness`).
pub const DEFAULT_MAX_CIRCUIT_DIRTINESS: Duration = Duration::from_secs(10 * 60);

fn default_bandwidth_rate() -> u64 {
    DEFAULT_BANDWIDTH_RATE
}
fn default_bandwidth_burst() -> u64 {
    DEFAULT_BANDWIDTH_BURST
}
fn default_link_idle_secs() -> u64 {
    DEFAULT_LINK_IDLE_TIMEOUT.as_secs()
}
fn default_build_timeout_secs() -> u64 {
    DEFAULT_CIRCUIT_BUILD_TIMEOUT.as_secs()
}
fn default_drain_timeout_secs() -> u64 {
    DEFAULT_CIRCUIT_DRAIN_TIMEOUT.as_secs()
}
fn default_max_dirtiness_secs() -> u64 {
    DEFAULT_MAX_CIRCUIT_DIRTINESS.as_secs()
}
fn default_socks_listen() -> SocketAddr {
    "127.0.0.1:9050".parse().expect("valid default SOCKS address")
}
fn default_or_listen() -> SocketAddr {
    "0.0.0.0:9001".parse().expect("valid default OR-port address")
}
fn default_identity_key_path() -> PathBuf {
    PathBuf::from("identity.rsa.der")
}
fn default_nickname() -> String {
    "Unnamed".to_string()
}

/// Top-level relay configuration, as loaded from a TOML file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// This relay's advertised nickname (cosmetic; spec §6's
    /// `RouterDescriptor::nickname`).
    pub nickname: String,
    /// Address the SOCKS client-facing listener binds.
    pub socks_listen: SocketAddr,
    /// Address the inbound OR-port listener binds.
    pub or_listen: SocketAddr,
    /// Path (relative to the config directory unless absolute) of the
    /// DER-encoded RSA identity private key, generated on first run if
    /// absent.
    pub identity_key_path: PathBuf,
    /// Per-link send-side token-bucket refill rate, in bytes/sec.
    #[serde(default = "default_bandwidth_rate")]
    pub bandwidth_rate: u64,
    /// Per-link token-bucket burst capacity, in bytes.
    #[serde(default = "default_bandwidth_burst")]
    pub bandwidth_burst: u64,
    /// Seconds an OR-link may sit idle before becoming eligible for
    /// expiry.
    #[serde(default = "default_link_idle_secs")]
    pub link_idle_timeout_secs: u64,
    /// Seconds allowed to build a circuit before giving up.
    #[serde(default = "default_build_timeout_secs")]
    pub circuit_build_timeout_secs: u64,
    /// Seconds allowed to drain a closing circuit before it's torn down
    /// unconditionally.
    #[serde(default = "default_drain_timeout_secs")]
    pub circuit_drain_timeout_secs: u64,
    /// Seconds before an idle origin circuit is considered too dirty to
    /// reuse for a new stream.
    #[serde(default = "default_max_dirtiness_secs")]
    pub max_circuit_dirtiness_secs: u64,
    /// Routers this relay knows about, standing in for the real
    /// consensus-document directory this workspace doesn't parse (spec
    /// §6's router-set feed interface; see `netdir.rs`).
    #[serde(default)]
    pub routers: Vec<StaticRouterConfig>,
    /// This relay's own exit policy, governing what `RELAY_BEGIN`
    /// destinations it's willing to connect out to, in the same
    /// `accept|reject addr[/prefix]:port[-port]` textual form as a
    /// `StaticRouterConfig`'s `exit_policy` (spec §4.G, §6). Defaults to
    /// rejecting everything, matching a fresh relay that hasn't opted
    /// in to exiting yet.
    #[serde(default)]
    pub exit_policy: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            nickname: default_nickname(),
            socks_listen: default_socks_listen(),
            or_listen: default_or_listen(),
            identity_key_path: default_identity_key_path(),
            bandwidth_rate: default_bandwidth_rate(),
            bandwidth_burst: default_bandwidth_burst(),
            link_idle_timeout_secs: default_link_idle_secs(),
            circuit_build_timeout_secs: default_build_timeout_secs(),
            circuit_drain_timeout_secs: default_drain_timeout_secs(),
            max_circuit_dirtiness_secs: default_max_dirtiness_secs(),
            routers: Vec::new(),
            exit_policy: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load and parse a config file from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.display().to_string(),
            source: std::sync::Arc::new(e),
        })?;
        toml::from_str(&text).map_err(|e| Error::Config {
            path: path.display().to_string(),
            source: std::sync::Arc::new(e),
        })
    }

    /// The platform-default config file path:
    /// `<config dir>/orcore-relay.toml`.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("orcore-relay.toml"))
    }

    /// Resolve `self.identity_key_path` against `base_dir` if it's
    /// relative.
    pub fn identity_key_path(&self, base_dir: &Path) -> PathBuf {
        if self.identity_key_path.is_absolute() {
            self.identity_key_path.clone()
        } else {
            base_dir.join(&self.identity_key_path)
        }
    }

    pub fn link_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.link_idle_timeout_secs)
    }

    pub fn circuit_build_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_build_timeout_secs)
    }

    pub fn circuit_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_drain_timeout_secs)
    }

    pub fn max_circuit_dirtiness(&self) -> Duration {
        Duration::from_secs(self.max_circuit_dirtiness_secs)
    }
}

/// One statically-configured router entry, the config-file stand-in for
/// a row of the directory consensus this workspace never parses.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StaticRouterConfig {
    /// Hex-encoded 20-byte RSA identity fingerprint.
    pub identity: String,
    /// Cosmetic nickname.
    pub nickname: String,
    /// IPv4 address this router accepts OR connections on.
    pub addr: std::net::Ipv4Addr,
    /// OR port.
    pub or_port: u16,
    /// PEM or base64 DER-encoded RSA public onion key.
    pub onion_key: String,
    /// Advertised bandwidth, in bytes/sec.
    #[serde(default)]
    pub bandwidth_bytes_per_sec: u64,
    /// Family members, as hex-encoded identity fingerprints.
    #[serde(default)]
    pub family: Vec<String>,
    /// Exit policy rules, in the compact `accept`/`reject addr:port`
    /// textual form (spec §6).
    #[serde(default)]
    pub exit_policy: Vec<String>,
    /// Flags this router has (`Guard`, `Exit`, `Fast`, `Stable`, ...).
    #[serde(default)]
    pub flags: Vec<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "orcore", "orcore-relay")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bandwidth_rate, DEFAULT_BANDWIDTH_RATE);
        assert_eq!(cfg.link_idle_timeout(), DEFAULT_LINK_IDLE_TIMEOUT);
        assert_eq!(cfg.max_circuit_dirtiness(), DEFAULT_MAX_CIRCUIT_DIRTINESS);
        assert!(cfg.routers.is_empty());
    }

    #[test]
    fn parses_minimal_toml() {
        let text = r#"
            nickname = "TestRelay"
            socks_listen = "127.0.0.1:9150"
            or_listen = "0.0.0.0:9101"
            identity_key_path = "id.der"

            [[routers]]
            identity = "0123456789abcdef0123456789abcdef01234567"
            nickname = "Guard1"
            addr = "198.51.100.7"
            or_port = 9001
            onion_key = "base64stand-in"
            flags = ["Guard", "Fast"]
        "#;
        let cfg: RelayConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.nickname, "TestRelay");
        assert_eq!(cfg.bandwidth_rate, DEFAULT_BANDWIDTH_RATE);
        assert_eq!(cfg.routers.len(), 1);
        assert_eq!(cfg.routers[0].nickname, "Guard1");
        assert_eq!(cfg.routers[0].flags, vec!["Guard", "Fast"]);
    }

    #[test]
    fn identity_key_path_resolves_relative() {
        let cfg = RelayConfig::default();
        let base = Path::new("/var/lib/orcore-relay");
        assert_eq!(cfg.identity_key_path(base), base.join("identity.rsa.der"));

        let mut abs = cfg.clone();
        abs.identity_key_path = PathBuf::from("/etc/orcore/id.der");
        assert_eq!(abs.identity_key_path(base), PathBuf::from("/etc/orcore/id.der"));
    }
}
