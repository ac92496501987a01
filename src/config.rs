//! Party configuration: who this process is, who its peers are, and
//! where to reach them, loaded from a TOML file with environment
//! overrides (`FRONCTOCOL_*`) for container/CI deployment.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

/// One run's worth of network configuration: this party's own name, the
/// address it listens on, and every peer's address (including its own,
/// for convenience when building a full `PeerSet`).
#[derive(Debug, Clone, Deserialize)]
pub struct PartyConfig {
    pub me: String,
    pub listen_addr: SocketAddr,
    pub peers: HashMap<String, SocketAddr>,
}

impl PartyConfig {
    /// Loads from `path`, then layers in any `FRONCTOCOL_*` environment
    /// variables (e.g. `FRONCTOCOL_ME=alice` overrides the `me` key).
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("FRONCTOCOL").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.try_deserialize().map_err(|e| Error::Config(e.to_string()))
    }

    /// The addresses of every peer except `self.me`, keyed by identity.
    #[must_use]
    pub fn other_peer_addrs(&self) -> HashMap<String, SocketAddr> {
        self.peers
            .iter()
            .filter(|(id, _)| **id != self.me)
            .map(|(id, addr)| (id.clone(), *addr))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_filters_self_out_of_peer_addrs() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            me = "alice"
            listen_addr = "127.0.0.1:9000"

            [peers]
            alice = "127.0.0.1:9000"
            bob = "127.0.0.1:9001"
            "#
        )
        .unwrap();
        let cfg = PartyConfig::load(file.path()).unwrap();
        assert_eq!(cfg.me, "alice");
        assert_eq!(cfg.peers.len(), 2);
        let others = cfg.other_peer_addrs();
        assert_eq!(others.len(), 1);
        assert!(others.contains_key("bob"));
    }
}
