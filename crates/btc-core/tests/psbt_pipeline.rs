//! End-to-end tests over the public API:
//! mnemonic -> HD key -> build PSBT -> serialize -> chunked parse -> sign -> verify.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use btc_core::hd::parse_path;
use btc_core::psbt::PsbtDerivation;
use btc_core::stream::ByteParser;
use btc_core::*;

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn root() -> HdPrivateKey {
    HdPrivateKey::from_mnemonic(TEST_MNEMONIC, "", MAINNET).unwrap()
}

fn spend_tx(inputs: &[(u8, u32)], outputs: &[u64]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|&(seed, vout)| TxIn {
                previous_output: OutPoint::new(Txid::from_byte_array([seed; 32]), vout),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|&sats| TxOut {
                value: Amount::from_sat(sats),
                script_pubkey: ScriptBuf::from_bytes(
                    [0x00, 0x14].into_iter().chain([0x44; 20]).collect(),
                ),
            })
            .collect(),
    }
}

/// A watch-only coordinator builds the PSBT: it knows the xpub-side data
/// (pubkeys, paths, fingerprint) and the spent outputs, but not the keys.
fn coordinator_psbt(root: &HdPrivateKey) -> Psbt {
    let tx = spend_tx(&[(0xaa, 0), (0xbb, 3)], &[70_000, 9_000]);
    let mut psbt = Psbt::new(tx).unwrap();

    for (index, (path, sats)) in [("m/84'/0'/0'/0/0", 50_000), ("m/84'/0'/0'/1/2", 30_000)]
        .into_iter()
        .enumerate()
    {
        let pubkey = root.derive_path(path).unwrap().public_key();
        let spk = pubkey.script_pubkey(ScriptType::P2wpkh);
        let derivation = PsbtDerivation {
            pubkey,
            fingerprint: root.fingerprint(),
            path: parse_path(path).unwrap(),
        };
        let mut key = vec![0x06];
        key.extend_from_slice(&derivation.pubkey.sec());
        psbt.add(Section::Input(index), &key, &derivation.value_bytes())
            .unwrap();

        let utxo = bitcoin::consensus::serialize(&TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: spk,
        });
        psbt.add(Section::Input(index), &[0x01], &utxo).unwrap();
    }
    psbt
}

#[test]
fn full_pipeline_sign_and_verify() {
    let root = root();
    let psbt = coordinator_psbt(&root);
    assert_eq!(psbt.fee(), 1_000);

    // Transport in small chunks, as over a serial link.
    let wire = psbt.serialize();
    let mut received = Psbt::default();
    for chunk in wire.chunks(7) {
        let mut stream = ByteParser::new(chunk);
        assert_eq!(received.from_stream(&mut stream), chunk.len());
    }
    assert_eq!(received.status(), ParseStatus::Done);
    assert_eq!(received.fee_exact().unwrap(), 1_000);

    assert_eq!(received.sign(&root), 2);
    assert_eq!(received.sign(&root), 0);

    // Back at the coordinator: parse the signed document and check each
    // signature against an independently computed BIP-143 digest.
    let signed = Psbt::from_base64(&received.to_base64()).unwrap();
    let tx = signed.tx().unwrap().clone();
    let mut cache = SighashCache::new(&tx);
    for (index, meta) in signed.inputs().iter().enumerate() {
        assert_eq!(meta.signatures.len(), 1);
        let utxo = meta.witness_utxo.as_ref().unwrap();
        let digest = cache
            .p2wpkh_signature_hash(index, &utxo.script_pubkey, utxo.value, EcdsaSighashType::All)
            .unwrap()
            .to_byte_array();
        let partial = &meta.signatures[0];
        assert!(partial.pubkey.verify(&partial.signature, &digest));
        assert_eq!(partial.sighash_type, 0x01);
    }
}

#[test]
fn signatures_recover_to_derived_keys() {
    let root = root();
    let mut psbt = coordinator_psbt(&root);
    psbt.sign(&root);
    let meta = &psbt.inputs()[0];
    let partial = &meta.signatures[0];
    let (digest, _) = psbt.sighash(0, &partial.pubkey).unwrap();
    let recovered = PublicKey::recover(&partial.signature, &digest).unwrap();
    assert_eq!(recovered, partial.pubkey);
}

#[test]
fn second_signer_only_adds_its_own_signature() {
    let root = root();
    let mut psbt = coordinator_psbt(&root);
    psbt.sign(&root);

    let stranger = HdPrivateKey::from_seed(&[9u8; 32], MAINNET).unwrap();
    let bytes = psbt.serialize();
    assert_eq!(psbt.sign(&stranger), 0);
    assert_eq!(psbt.serialize(), bytes);
}

#[test]
fn derived_wallet_key_roundtrips_through_wif() {
    let key = root().derive_path("m/84'/0'/0'/0/0").unwrap().private_key();
    assert_eq!(
        key.segwit_address().unwrap(),
        "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
    );
    let restored = PrivateKey::from_wif(&key.wif()).unwrap();
    assert_eq!(restored.public_key(), key.public_key());
    assert_eq!(restored.segwit_address().unwrap(), key.segwit_address().unwrap());
}

#[test]
fn corrupted_transfer_is_rejected() {
    let mut wire = coordinator_psbt(&root()).serialize();
    // Turn the last input's terminator into a 9-byte length prefix.
    let len = wire.len();
    wire[len - 3] ^= 0xff;
    let mut received = Psbt::default();
    received.parse_chunk(&wire);
    assert_ne!(received.status(), ParseStatus::Done);
    assert!(Psbt::parse(&wire).is_err());
}
