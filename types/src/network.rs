//! Network identifier.

use serde::{Deserialize, Serialize};

/// Identifies which network a node follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// Local regression-test network with a trivial proof-of-work limit.
    Regtest,
}

impl NetworkId {
    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }
}
