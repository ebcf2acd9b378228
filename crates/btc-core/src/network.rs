use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Version bytes and prefixes that distinguish one chain from another.
///
/// Networks are plain values. The two well-known ones are `const`s; custom
/// networks are built by the caller (in code or via [`Network::from_json`])
/// and passed in wherever a lookup needs a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: Cow<'static, str>,
    /// Legacy pay-to-pubkey-hash address version.
    pub p2pkh: u8,
    /// Pay-to-script-hash address version.
    pub p2sh: u8,
    /// Bech32 human-readable part.
    pub bech32: Cow<'static, str>,
    /// Wallet import format version.
    pub wif: u8,
    pub xprv: [u8; 4],
    pub yprv: [u8; 4],
    pub zprv: [u8; 4],
    pub xpub: [u8; 4],
    pub ypub: [u8; 4],
    pub zpub: [u8; 4],
}

pub const MAINNET: Network = Network {
    name: Cow::Borrowed("mainnet"),
    p2pkh: 0x00,
    p2sh: 0x05,
    bech32: Cow::Borrowed("bc"),
    wif: 0x80,
    xprv: [0x04, 0x88, 0xad, 0xe4],
    yprv: [0x04, 0x9d, 0x78, 0x78],
    zprv: [0x04, 0xb2, 0x43, 0x0c],
    xpub: [0x04, 0x88, 0xb2, 0x1e],
    ypub: [0x04, 0x9d, 0x7c, 0xb2],
    zpub: [0x04, 0xb2, 0x47, 0x46],
};

pub const TESTNET: Network = Network {
    name: Cow::Borrowed("testnet"),
    p2pkh: 0x6f,
    p2sh: 0xc4,
    bech32: Cow::Borrowed("tb"),
    wif: 0xef,
    xprv: [0x04, 0x35, 0x83, 0x94],
    yprv: [0x04, 0x4a, 0x4e, 0x28],
    zprv: [0x04, 0x5f, 0x18, 0xbc],
    xpub: [0x04, 0x35, 0x87, 0xcf],
    ypub: [0x04, 0x4a, 0x52, 0x62],
    zpub: [0x04, 0x5f, 0x1c, 0xf6],
};

/// Registry used when the caller does not supply one.
pub const DEFAULT_NETWORKS: &[Network] = &[MAINNET, TESTNET];

impl Network {
    /// First network in `networks` whose WIF version byte is `version`.
    pub fn by_wif_version(version: u8, networks: &[Network]) -> Option<&Network> {
        networks.iter().find(|n| n.wif == version)
    }

    /// First network in `networks` whose P2PKH or P2SH version byte is `version`.
    pub fn by_address_version(version: u8, networks: &[Network]) -> Option<&Network> {
        networks
            .iter()
            .find(|n| n.p2pkh == version || n.p2sh == version)
    }

    pub fn by_bech32_hrp<'a>(hrp: &str, networks: &'a [Network]) -> Option<&'a Network> {
        networks
            .iter()
            .find(|n| n.bech32.eq_ignore_ascii_case(hrp))
    }

    /// Loads a custom network definition from JSON.
    pub fn from_json(json: &str) -> Result<Network, BtcError> {
        serde_json::from_str(json)
            .map_err(|e| BtcError::InvalidNetwork(format!("failed to parse network: {e}")))
    }

    pub fn to_json(&self) -> Result<String, BtcError> {
        serde_json::to_string(self)
            .map_err(|e| BtcError::InvalidNetwork(format!("failed to encode network: {e}")))
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
