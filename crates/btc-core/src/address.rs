//! Address and output-script derivation for a single public key.

use bitcoin::bech32::{segwit, Hrp};
use bitcoin::ScriptBuf;

use crate::error::BtcError;
use crate::hash::hash160;
use crate::keys::PublicKey;
use crate::network::Network;

/// Single-key output types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptType {
    /// Pay-to-pubkey-hash, `1...` on mainnet.
    P2pkh,
    /// Native segwit v0 pay-to-witness-pubkey-hash, `bc1q...`.
    P2wpkh,
    /// P2WPKH wrapped in P2SH, `3...`.
    P2shP2wpkh,
}

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;
const OP_0: u8 = 0x00;
const PUSH_20: u8 = 0x14;

impl PublicKey {
    /// HASH160 of the sec encoding, so it depends on the compressed flag.
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.sec())
    }

    /// `0x00 0x14 <hash160>`, the v0 witness program for this key.
    pub fn witness_program(&self) -> [u8; 22] {
        let mut program = [0u8; 22];
        program[0] = OP_0;
        program[1] = PUSH_20;
        program[2..].copy_from_slice(&self.hash160());
        program
    }

    pub fn legacy_address(&self, network: &Network) -> String {
        base58_address(network.p2pkh, &self.hash160())
    }

    pub fn segwit_address(&self, network: &Network) -> Result<String, BtcError> {
        let hrp = Hrp::parse(&network.bech32).map_err(|e| {
            BtcError::InvalidNetwork(format!("bad bech32 prefix '{}': {e}", network.bech32))
        })?;
        segwit::encode_v0(hrp, &self.hash160())
            .map_err(|e| BtcError::InvalidAddress(format!("bech32 encoding failed: {e}")))
    }

    pub fn nested_segwit_address(&self, network: &Network) -> String {
        base58_address(network.p2sh, &hash160(&self.witness_program()))
    }

    pub fn address(&self, script_type: ScriptType, network: &Network) -> Result<String, BtcError> {
        match script_type {
            ScriptType::P2pkh => Ok(self.legacy_address(network)),
            ScriptType::P2wpkh => self.segwit_address(network),
            ScriptType::P2shP2wpkh => Ok(self.nested_segwit_address(network)),
        }
    }

    /// Locking script paying to this key.
    pub fn script_pubkey(&self, script_type: ScriptType) -> ScriptBuf {
        let bytes = match script_type {
            ScriptType::P2pkh => {
                let mut s = Vec::with_capacity(25);
                s.extend_from_slice(&[OP_DUP, OP_HASH160, PUSH_20]);
                s.extend_from_slice(&self.hash160());
                s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                s
            }
            ScriptType::P2wpkh => self.witness_program().to_vec(),
            ScriptType::P2shP2wpkh => {
                let mut s = Vec::with_capacity(23);
                s.extend_from_slice(&[OP_HASH160, PUSH_20]);
                s.extend_from_slice(&hash160(&self.witness_program()));
                s.push(OP_EQUAL);
                s
            }
        };
        ScriptBuf::from_bytes(bytes)
    }
}

fn base58_address(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = [0u8; 21];
    payload[0] = version;
    payload[1..].copy_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}
