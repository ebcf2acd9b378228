use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{OutPoint, Transaction};
use tracing::{debug, warn};

use super::{Psbt, PsbtInputMetadata, PsbtPartialSignature, DEFAULT_SIGHASH};
use crate::error::BtcError;
use crate::hd::HdPrivateKey;
use crate::keys::PublicKey;

impl Psbt {
    /// Signs every input that names a key derived from `root`.
    ///
    /// For each derivation whose fingerprint is `root`'s, the child key is
    /// derived along the recorded path and must reproduce the recorded
    /// public key. Inputs whose sighash cannot be computed (no spent output
    /// known, bad sighash type) are skipped. A public key that already has a
    /// signature is left alone, so signing twice adds nothing.
    ///
    /// Returns the number of signatures added.
    pub fn sign(&mut self, root: &HdPrivateKey) -> usize {
        if !self.is_settled() {
            debug!(status = ?self.state.status(), "psbt not signable until fully parsed");
            return 0;
        }
        let Some(tx) = self.tx.as_ref() else {
            return 0;
        };
        let fingerprint = root.fingerprint();
        let mut cache = SighashCache::new(tx);
        let mut added = 0;

        for (index, (txin, meta)) in tx.input.iter().zip(self.inputs.iter_mut()).enumerate() {
            let mut fresh: Vec<PsbtPartialSignature> = Vec::new();
            for derivation in meta.derivations.iter().filter(|d| d.fingerprint == fingerprint) {
                if meta.has_signature_for(&derivation.pubkey)
                    || fresh.iter().any(|s| s.pubkey == derivation.pubkey)
                {
                    continue;
                }
                let child = match root.derive(&derivation.path) {
                    Ok(child) => child,
                    Err(e) => {
                        warn!(input = index, error = %e, "psbt derivation failed");
                        continue;
                    }
                };
                let key = child.private_key();
                if !key.public_key().same_point(&derivation.pubkey) {
                    debug!(input = index, "derived key does not match psbt derivation, skipping");
                    continue;
                }
                let (hash, sighash_type) =
                    match input_sighash(&mut cache, index, &txin.previous_output, meta, &derivation.pubkey) {
                        Ok(found) => found,
                        Err(e) => {
                            warn!(input = index, error = %e, "psbt input not signable");
                            continue;
                        }
                    };
                match key.sign(&hash) {
                    Ok(signature) => fresh.push(PsbtPartialSignature {
                        pubkey: derivation.pubkey.clone(),
                        signature,
                        sighash_type: sighash_type.to_u32() as u8,
                    }),
                    Err(e) => warn!(input = index, error = %e, "psbt signing failed"),
                }
            }
            added += fresh.len();
            meta.signatures.extend(fresh);
        }
        debug!(added, "psbt signed");
        added
    }

    /// Digest input `index` commits to, with the sighash type it was built
    /// under.
    pub fn sighash(
        &self,
        index: usize,
        pubkey: &PublicKey,
    ) -> Result<([u8; 32], EcdsaSighashType), BtcError> {
        let tx = self
            .tx()
            .ok_or_else(|| BtcError::IncompleteData("no unsigned tx".into()))?;
        let txin = tx
            .input
            .get(index)
            .ok_or_else(|| BtcError::InvalidRecord(format!("no input {index}")))?;
        let meta = self
            .inputs
            .get(index)
            .ok_or_else(|| BtcError::InvalidRecord(format!("no metadata for input {index}")))?;
        let mut cache = SighashCache::new(tx);
        input_sighash(&mut cache, index, &txin.previous_output, meta, pubkey)
    }
}

/// Picks the digest algorithm from the input's scripts:
/// a witness script means P2WSH, a P2WPKH redeem script or spent output
/// means P2WPKH, anything else is legacy over the redeem script (if any) or
/// the spent output's script.
fn input_sighash(
    cache: &mut SighashCache<&Transaction>,
    index: usize,
    prevout: &OutPoint,
    meta: &PsbtInputMetadata,
    pubkey: &PublicKey,
) -> Result<([u8; 32], EcdsaSighashType), BtcError> {
    let raw_type = meta.sighash_type.unwrap_or(DEFAULT_SIGHASH);
    let sighash_type = EcdsaSighashType::from_standard(raw_type)
        .map_err(|e| BtcError::SigningError(format!("sighash type {raw_type:#x}: {e}")))?;
    let spent = meta.spent_output(prevout).ok_or_else(|| {
        BtcError::IncompleteData(format!("spent output of input {index} unknown"))
    })?;

    let hash = if let Some(witness_script) = &meta.witness_script {
        cache
            .p2wsh_signature_hash(index, witness_script, spent.value, sighash_type)
            .map_err(|e| BtcError::SigningError(format!("p2wsh sighash: {e}")))?
            .to_byte_array()
    } else {
        let script = meta.redeem_script.as_ref().unwrap_or(&spent.script_pubkey);
        if script.is_p2wpkh() {
            if script.as_bytes()[2..] != pubkey.hash160() {
                return Err(BtcError::DerivationMismatch(format!(
                    "input {index} pays to a different key"
                )));
            }
            cache
                .p2wpkh_signature_hash(index, script, spent.value, sighash_type)
                .map_err(|e| BtcError::SigningError(format!("p2wpkh sighash: {e}")))?
                .to_byte_array()
        } else {
            cache
                .legacy_signature_hash(index, script, sighash_type.to_u32())
                .map_err(|e| BtcError::SigningError(format!("legacy sighash: {e}")))?
                .to_byte_array()
        }
    };
    Ok((hash, sighash_type))
}
