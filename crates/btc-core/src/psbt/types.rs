use bitcoin::consensus::{deserialize, serialize};
use bitcoin::{OutPoint, ScriptBuf, Transaction, TxOut};

use crate::error::BtcError;
use crate::keys::PublicKey;
use crate::signature::Signature;

pub const GLOBAL_UNSIGNED_TX: u8 = 0x00;

pub const IN_NON_WITNESS_UTXO: u8 = 0x00;
pub const IN_WITNESS_UTXO: u8 = 0x01;
pub const IN_PARTIAL_SIG: u8 = 0x02;
pub const IN_SIGHASH_TYPE: u8 = 0x03;
pub const IN_REDEEM_SCRIPT: u8 = 0x04;
pub const IN_WITNESS_SCRIPT: u8 = 0x05;
pub const IN_BIP32_DERIVATION: u8 = 0x06;

pub const OUT_REDEEM_SCRIPT: u8 = 0x00;
pub const OUT_WITNESS_SCRIPT: u8 = 0x01;
pub const OUT_BIP32_DERIVATION: u8 = 0x02;

/// SIGHASH_ALL, used when an input does not name a sighash type.
pub const DEFAULT_SIGHASH: u32 = 0x01;

/// Where a key-value record lives in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Global,
    Input(usize),
    Output(usize),
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Global => f.write_str("global"),
            Section::Input(i) => write!(f, "input {i}"),
            Section::Output(j) => write!(f, "output {j}"),
        }
    }
}

/// A key-value record kept verbatim because its type is not interpreted.
pub type UnknownRecord = (Vec<u8>, Vec<u8>);

/// A public key together with the root fingerprint and path that derive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsbtDerivation {
    pub pubkey: PublicKey,
    pub fingerprint: [u8; 4],
    pub path: Vec<u32>,
}

impl PsbtDerivation {
    /// Decodes `<fingerprint> <u32 LE>*` for the key `pubkey`.
    pub fn from_record(pubkey: &[u8], value: &[u8]) -> Result<Self, BtcError> {
        let pubkey = PublicKey::from_sec(pubkey)?;
        if value.len() < 4 || value.len() % 4 != 0 {
            return Err(BtcError::InvalidRecord(format!(
                "derivation value of {} bytes",
                value.len()
            )));
        }
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&value[..4]);
        let path = value[4..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self {
            pubkey,
            fingerprint,
            path,
        })
    }

    pub fn value_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 4 * self.path.len());
        out.extend_from_slice(&self.fingerprint);
        for index in &self.path {
            out.extend_from_slice(&index.to_le_bytes());
        }
        out
    }
}

/// One signer's contribution to an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsbtPartialSignature {
    pub pubkey: PublicKey,
    pub signature: Signature,
    pub sighash_type: u8,
}

impl PsbtPartialSignature {
    /// Decodes `<DER signature> <sighash byte>` for the key `pubkey`.
    pub fn from_record(pubkey: &[u8], value: &[u8]) -> Result<Self, BtcError> {
        let pubkey = PublicKey::from_sec(pubkey)?;
        let (&sighash_type, der) = value
            .split_last()
            .ok_or_else(|| BtcError::InvalidRecord("empty partial signature".into()))?;
        let signature = Signature::from_der(der)?;
        Ok(Self {
            pubkey,
            signature,
            sighash_type,
        })
    }

    pub fn value_bytes(&self) -> Vec<u8> {
        let mut out = self.signature.der();
        out.push(self.sighash_type);
        out
    }
}

/// Signing context for one transaction input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsbtInputMetadata {
    pub non_witness_utxo: Option<Transaction>,
    pub witness_utxo: Option<TxOut>,
    pub signatures: Vec<PsbtPartialSignature>,
    pub sighash_type: Option<u32>,
    pub redeem_script: Option<ScriptBuf>,
    pub witness_script: Option<ScriptBuf>,
    pub derivations: Vec<PsbtDerivation>,
    pub unknown: Vec<UnknownRecord>,
}

impl PsbtInputMetadata {
    /// The output this input spends, from whichever UTXO record is present.
    pub fn spent_output(&self, prevout: &OutPoint) -> Option<&TxOut> {
        if let Some(utxo) = &self.witness_utxo {
            return Some(utxo);
        }
        self.non_witness_utxo
            .as_ref()?
            .output
            .get(prevout.vout as usize)
    }

    pub fn has_signature_for(&self, pubkey: &PublicKey) -> bool {
        self.signatures.iter().any(|s| s.pubkey == *pubkey)
    }

    pub fn add_signature(&mut self, sig: PsbtPartialSignature) {
        match self.signatures.iter_mut().find(|s| s.pubkey == sig.pubkey) {
            Some(existing) => *existing = sig,
            None => self.signatures.push(sig),
        }
    }

    pub fn add_derivation(&mut self, derivation: PsbtDerivation) {
        upsert_derivation(&mut self.derivations, derivation);
    }

    /// Applies one record. `prevout` is the outpoint of the matching
    /// transaction input, used to validate a full previous transaction.
    pub(crate) fn apply(
        &mut self,
        key: &[u8],
        value: &[u8],
        prevout: &OutPoint,
    ) -> Result<(), BtcError> {
        let (&key_type, key_data) = split_key(key)?;
        match key_type {
            IN_NON_WITNESS_UTXO => {
                expect_bare_key(key_type, key_data)?;
                let tx: Transaction = decode_consensus(value, "non-witness utxo")?;
                if tx.compute_txid() != prevout.txid {
                    return Err(BtcError::InvalidRecord(format!(
                        "non-witness utxo {} does not match prevout {}",
                        tx.compute_txid(),
                        prevout.txid
                    )));
                }
                if tx.output.len() <= prevout.vout as usize {
                    return Err(BtcError::InvalidRecord(format!(
                        "non-witness utxo has no output {}",
                        prevout.vout
                    )));
                }
                self.non_witness_utxo = Some(tx);
            }
            IN_WITNESS_UTXO => {
                expect_bare_key(key_type, key_data)?;
                self.witness_utxo = Some(decode_consensus(value, "witness utxo")?);
            }
            IN_PARTIAL_SIG => {
                self.add_signature(PsbtPartialSignature::from_record(key_data, value)?);
            }
            IN_SIGHASH_TYPE => {
                expect_bare_key(key_type, key_data)?;
                let bytes: [u8; 4] = value.try_into().map_err(|_| {
                    BtcError::InvalidRecord(format!("sighash type of {} bytes", value.len()))
                })?;
                self.sighash_type = Some(u32::from_le_bytes(bytes));
            }
            IN_REDEEM_SCRIPT => {
                expect_bare_key(key_type, key_data)?;
                self.redeem_script = Some(ScriptBuf::from_bytes(value.to_vec()));
            }
            IN_WITNESS_SCRIPT => {
                expect_bare_key(key_type, key_data)?;
                self.witness_script = Some(ScriptBuf::from_bytes(value.to_vec()));
            }
            IN_BIP32_DERIVATION => {
                self.add_derivation(PsbtDerivation::from_record(key_data, value)?);
            }
            _ => upsert_unknown(&mut self.unknown, key, value),
        }
        Ok(())
    }

    /// Records in serialization order.
    pub(crate) fn records(&self) -> Vec<UnknownRecord> {
        let mut out = Vec::new();
        if let Some(tx) = &self.non_witness_utxo {
            out.push((vec![IN_NON_WITNESS_UTXO], serialize(tx)));
        }
        if let Some(utxo) = &self.witness_utxo {
            out.push((vec![IN_WITNESS_UTXO], serialize(utxo)));
        }
        for sig in &self.signatures {
            out.push((keyed(IN_PARTIAL_SIG, &sig.pubkey), sig.value_bytes()));
        }
        if let Some(ty) = self.sighash_type {
            out.push((vec![IN_SIGHASH_TYPE], ty.to_le_bytes().to_vec()));
        }
        if let Some(script) = &self.redeem_script {
            out.push((vec![IN_REDEEM_SCRIPT], script.to_bytes()));
        }
        if let Some(script) = &self.witness_script {
            out.push((vec![IN_WITNESS_SCRIPT], script.to_bytes()));
        }
        for d in &self.derivations {
            out.push((keyed(IN_BIP32_DERIVATION, &d.pubkey), d.value_bytes()));
        }
        out.extend(self.unknown.iter().cloned());
        out
    }
}

/// Ownership proof for one transaction output. Carries no signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsbtOutputMetadata {
    pub redeem_script: Option<ScriptBuf>,
    pub witness_script: Option<ScriptBuf>,
    pub derivations: Vec<PsbtDerivation>,
    pub unknown: Vec<UnknownRecord>,
}

impl PsbtOutputMetadata {
    pub fn add_derivation(&mut self, derivation: PsbtDerivation) {
        upsert_derivation(&mut self.derivations, derivation);
    }

    pub(crate) fn apply(&mut self, key: &[u8], value: &[u8]) -> Result<(), BtcError> {
        let (&key_type, key_data) = split_key(key)?;
        match key_type {
            OUT_REDEEM_SCRIPT => {
                expect_bare_key(key_type, key_data)?;
                self.redeem_script = Some(ScriptBuf::from_bytes(value.to_vec()));
            }
            OUT_WITNESS_SCRIPT => {
                expect_bare_key(key_type, key_data)?;
                self.witness_script = Some(ScriptBuf::from_bytes(value.to_vec()));
            }
            OUT_BIP32_DERIVATION => {
                self.add_derivation(PsbtDerivation::from_record(key_data, value)?);
            }
            _ => upsert_unknown(&mut self.unknown, key, value),
        }
        Ok(())
    }

    pub(crate) fn records(&self) -> Vec<UnknownRecord> {
        let mut out = Vec::new();
        if let Some(script) = &self.redeem_script {
            out.push((vec![OUT_REDEEM_SCRIPT], script.to_bytes()));
        }
        if let Some(script) = &self.witness_script {
            out.push((vec![OUT_WITNESS_SCRIPT], script.to_bytes()));
        }
        for d in &self.derivations {
            out.push((keyed(OUT_BIP32_DERIVATION, &d.pubkey), d.value_bytes()));
        }
        out.extend(self.unknown.iter().cloned());
        out
    }
}

pub(crate) fn split_key(key: &[u8]) -> Result<(&u8, &[u8]), BtcError> {
    key.split_first()
        .ok_or_else(|| BtcError::InvalidRecord("empty key".into()))
}

pub(crate) fn expect_bare_key(key_type: u8, key_data: &[u8]) -> Result<(), BtcError> {
    if key_data.is_empty() {
        Ok(())
    } else {
        Err(BtcError::InvalidRecord(format!(
            "key type {key_type:#04x} takes no key data, got {} bytes",
            key_data.len()
        )))
    }
}

pub(crate) fn decode_consensus<T: bitcoin::consensus::Decodable>(
    value: &[u8],
    what: &str,
) -> Result<T, BtcError> {
    deserialize(value).map_err(|e| BtcError::InvalidRecord(format!("bad {what}: {e}")))
}

pub(crate) fn upsert_unknown(unknown: &mut Vec<UnknownRecord>, key: &[u8], value: &[u8]) {
    match unknown.iter_mut().find(|(k, _)| k.as_slice() == key) {
        Some((_, v)) => *v = value.to_vec(),
        None => unknown.push((key.to_vec(), value.to_vec())),
    }
}

fn upsert_derivation(derivations: &mut Vec<PsbtDerivation>, derivation: PsbtDerivation) {
    match derivations
        .iter_mut()
        .find(|d| d.pubkey == derivation.pubkey)
    {
        Some(existing) => *existing = derivation,
        None => derivations.push(derivation),
    }
}

fn keyed(key_type: u8, pubkey: &PublicKey) -> Vec<u8> {
    let mut key = vec![key_type];
    key.extend_from_slice(&pubkey.sec());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hd::HARDENED;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn derivation_record_roundtrip() {
        let pubkey = hex::decode(G).unwrap();
        let value = hex::decode("d34db33f5400008000000080000000800000000005000000").unwrap();
        let d = PsbtDerivation::from_record(&pubkey, &value).unwrap();
        assert_eq!(d.fingerprint, [0xd3, 0x4d, 0xb3, 0x3f]);
        assert_eq!(d.path, vec![84 | HARDENED, HARDENED, HARDENED, 0, 5]);
        assert_eq!(d.value_bytes(), value);
    }

    #[test]
    fn derivation_value_must_be_word_aligned() {
        let pubkey = hex::decode(G).unwrap();
        assert!(PsbtDerivation::from_record(&pubkey, &[1, 2, 3]).is_err());
        assert!(PsbtDerivation::from_record(&pubkey, &[1, 2, 3, 4, 5]).is_err());
        assert!(PsbtDerivation::from_record(&[0x02; 10], &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn partial_signature_record_keeps_sighash_byte() {
        let pubkey = hex::decode(G).unwrap();
        let der = Signature::new([0x11; 32], [0x22; 32]).der();
        let mut value = der.clone();
        value.push(0x81);
        let sig = PsbtPartialSignature::from_record(&pubkey, &value).unwrap();
        assert_eq!(sig.sighash_type, 0x81);
        assert_eq!(sig.signature.der(), der);
        assert_eq!(sig.value_bytes(), value);
    }

    #[test]
    fn partial_signature_rejects_bad_der() {
        let pubkey = hex::decode(G).unwrap();
        assert!(PsbtPartialSignature::from_record(&pubkey, &[]).is_err());
        assert!(PsbtPartialSignature::from_record(&pubkey, &[0x31, 0x00, 0x01]).is_err());
    }

    #[test]
    fn input_rejects_key_data_on_bare_types() {
        let mut meta = PsbtInputMetadata::default();
        let prevout = OutPoint::null();
        let result = meta.apply(&[IN_SIGHASH_TYPE, 0x00], &1u32.to_le_bytes(), &prevout);
        assert!(matches!(result, Err(BtcError::InvalidRecord(_))));
    }

    #[test]
    fn input_sighash_type_must_be_four_bytes() {
        let mut meta = PsbtInputMetadata::default();
        let prevout = OutPoint::null();
        assert!(meta.apply(&[IN_SIGHASH_TYPE], &[1, 0], &prevout).is_err());
        meta.apply(&[IN_SIGHASH_TYPE], &[0x83, 0, 0, 0], &prevout)
            .unwrap();
        assert_eq!(meta.sighash_type, Some(0x83));
    }

    #[test]
    fn unknown_records_overwrite_by_key() {
        let mut meta = PsbtOutputMetadata::default();
        meta.apply(&[0xfc, 0x01], &[0xaa]).unwrap();
        meta.apply(&[0xfc, 0x02], &[0xbb]).unwrap();
        meta.apply(&[0xfc, 0x01], &[0xcc]).unwrap();
        assert_eq!(
            meta.unknown,
            vec![(vec![0xfc, 0x01], vec![0xcc]), (vec![0xfc, 0x02], vec![0xbb])]
        );
    }

    #[test]
    fn output_records_in_type_order() {
        let mut meta = PsbtOutputMetadata::default();
        meta.apply(&[0xf0], &[1]).unwrap();
        meta.apply(&[OUT_WITNESS_SCRIPT], &[0x51]).unwrap();
        meta.apply(&[OUT_REDEEM_SCRIPT], &[0x00, 0x20]).unwrap();
        let types: Vec<u8> = meta.records().iter().map(|(k, _)| k[0]).collect();
        assert_eq!(types, vec![OUT_REDEEM_SCRIPT, OUT_WITNESS_SCRIPT, 0xf0]);
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut meta = PsbtOutputMetadata::default();
        assert!(meta.apply(&[], &[1]).is_err());
    }

    #[test]
    fn section_display() {
        assert_eq!(Section::Global.to_string(), "global");
        assert_eq!(Section::Input(2).to_string(), "input 2");
        assert_eq!(Section::Output(0).to_string(), "output 0");
    }
}
