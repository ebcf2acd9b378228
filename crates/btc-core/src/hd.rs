//! Hierarchical deterministic keys (BIP-32) rooted at a seed or BIP-39 mnemonic.

use bip32::{ChildNumber, DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use zeroize::Zeroize;

use crate::error::BtcError;
use crate::hash::hash160;
use crate::keys::{PrivateKey, PublicKey};
use crate::network::Network;

/// Bit set on a child index to request hardened derivation.
pub const HARDENED: u32 = 0x8000_0000;

/// An extended private key bound to a network.
#[derive(Clone)]
pub struct HdPrivateKey {
    xprv: XPrv,
    network: Network,
}

impl HdPrivateKey {
    /// Master key from a BIP-32 seed (16 to 64 bytes).
    pub fn from_seed(seed: &[u8], network: Network) -> Result<Self, BtcError> {
        let xprv = XPrv::new(seed).map_err(|e| BtcError::DerivationFailed(e.to_string()))?;
        Ok(Self { xprv, network })
    }

    /// Master key from an English BIP-39 phrase and optional passphrase.
    pub fn from_mnemonic(
        phrase: &str,
        passphrase: &str,
        network: Network,
    ) -> Result<Self, BtcError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| BtcError::DerivationFailed(format!("invalid mnemonic: {e}")))?;
        let mut seed = mnemonic.to_seed(passphrase);
        let root = Self::from_seed(&seed, network);
        seed.zeroize();
        root
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn depth(&self) -> u8 {
        self.xprv.attrs().depth
    }

    /// First four bytes of HASH160 of the compressed public key.
    pub fn fingerprint(&self) -> [u8; 4] {
        let id = hash160(&self.public_key().sec());
        [id[0], id[1], id[2], id[3]]
    }

    /// Compressed public key of this node.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(*self.xprv.private_key().verifying_key(), true)
    }

    /// Signing key of this node, compressed, on this node's network.
    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::from_signing_key(
            self.xprv.private_key().clone(),
            true,
            self.network.clone(),
        )
    }

    /// Walks `path` (raw indices, hardened bit included) from this node.
    pub fn derive(&self, path: &[u32]) -> Result<HdPrivateKey, BtcError> {
        let mut xprv = self.xprv.clone();
        for &index in path {
            xprv = xprv
                .derive_child(ChildNumber::from(index))
                .map_err(|e| BtcError::DerivationFailed(format!("child {index:#x}: {e}")))?;
        }
        Ok(Self {
            xprv,
            network: self.network.clone(),
        })
    }

    pub fn derive_path(&self, path: &str) -> Result<HdPrivateKey, BtcError> {
        self.derive(&parse_path(path)?)
    }
}

impl std::fmt::Debug for HdPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdPrivateKey")
            .field("network", &self.network.name)
            .field("depth", &self.depth())
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Parse "m/84'/0'/0'/0/0" into indices, setting [`HARDENED`] on `'` or `h`
/// components. A bare "m" is the empty path.
pub fn parse_path(path: &str) -> Result<Vec<u32>, BtcError> {
    let path: DerivationPath = path
        .replace('h', "'")
        .parse()
        .map_err(|e: bip32::Error| BtcError::DerivationFailed(format!("path '{path}': {e}")))?;
    Ok(path.iter().map(u32::from).collect())
}

/// Inverse of [`parse_path`], using `'` for hardened steps.
pub fn format_path(path: &[u32]) -> String {
    let mut out = String::from("m");
    for &index in path {
        if index & HARDENED != 0 {
            out.push_str(&format!("/{}'", index & !HARDENED));
        } else {
            out.push_str(&format!("/{index}"));
        }
    }
    out
}
