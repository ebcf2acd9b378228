//! secp256k1 key pair model: signing, verification, recovery and WIF.

use crypto_utils::{SecretBuf, ZeroizingString};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::ops::Reduce;
use k256::{FieldBytes, NonZeroScalar, Scalar, U256};
use tracing::debug;
use zeroize::Zeroize;

use crate::error::BtcError;
use crate::network::{Network, DEFAULT_NETWORKS};
use crate::signature::Signature;
use crate::stream::{ParseStream, SerializeStream};
use crate::streamable::{write_from_offset, ParseState, ParseStatus, Resume, Streamable};

/// A curve point plus the serialization flag used when it is hashed or
/// written ("sec" format: 33 bytes compressed, 65 bytes uncompressed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    point: VerifyingKey,
    compressed: bool,
}

impl PublicKey {
    pub fn from_verifying_key(point: VerifyingKey, compressed: bool) -> Self {
        Self { point, compressed }
    }

    /// Parses a 33- or 65-byte sec encoding; the length decides the flag.
    pub fn from_sec(bytes: &[u8]) -> Result<Self, BtcError> {
        let point = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| BtcError::InvalidPublicKey(format!("failed to parse sec bytes: {e}")))?;
        Ok(Self {
            point,
            compressed: bytes.len() == 33,
        })
    }

    pub fn sec(&self) -> Vec<u8> {
        self.point
            .to_encoded_point(self.compressed)
            .as_bytes()
            .to_vec()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.point
    }

    /// Same curve point, regardless of serialization flag.
    pub fn same_point(&self, other: &PublicKey) -> bool {
        self.point == other.point
    }

    /// `true` iff `sig` is a valid signature of `hash` by this key.
    ///
    /// High-S signatures are normalized before checking, so either half of
    /// the S range verifies.
    pub fn verify(&self, sig: &Signature, hash: &[u8; 32]) -> bool {
        let Some(sig) = to_ecdsa(sig) else {
            return false;
        };
        let sig = sig.normalize_s().unwrap_or(sig);
        self.point.verify_prehash(hash, &sig).is_ok()
    }

    /// Recovers the signing key from a recoverable signature.
    ///
    /// The recovery byte may carry the legacy 27/31 offsets; an index in
    /// 27..=30 yields an uncompressed key, anything else a compressed one.
    pub fn recover(sig: &Signature, hash: &[u8; 32]) -> Result<PublicKey, BtcError> {
        let ecdsa = to_ecdsa(sig)
            .ok_or_else(|| BtcError::InvalidPublicKey("signature has zero r or s".into()))?;
        let recid = RecoveryId::from_byte(sig.recovery_id()).ok_or_else(|| {
            BtcError::InvalidPublicKey(format!("invalid recovery id {}", sig.index()))
        })?;
        let point = VerifyingKey::recover_from_prehash(hash, &ecdsa, recid)
            .map_err(|e| BtcError::InvalidPublicKey(format!("recovery failed: {e}")))?;
        let compressed = !(27..31).contains(&sig.index());
        Ok(Self { point, compressed })
    }
}

fn to_ecdsa(sig: &Signature) -> Option<EcdsaSignature> {
    EcdsaSignature::from_slice(&sig.compact()[..64]).ok()
}

/// A secp256k1 secret scalar bound to a network.
///
/// The scalar lives inside a `k256` [`SigningKey`], which overwrites it on
/// drop. Byte copies handed out by [`PrivateKey::secret_bytes`] are
/// [`SecretBuf`]s and scrub themselves the same way.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
    network: Network,
    public_key: PublicKey,
}

impl PrivateKey {
    /// Builds a key from 32 big-endian bytes, reduced modulo the curve order.
    /// A value that reduces to zero is rejected.
    pub fn from_bytes(
        secret: &[u8; 32],
        compressed: bool,
        network: Network,
    ) -> Result<Self, BtcError> {
        let mut field = FieldBytes::from(*secret);
        let scalar = <Scalar as Reduce<U256>>::reduce_bytes(&field);
        field.as_mut_slice().zeroize();

        let scalar: Option<NonZeroScalar> = NonZeroScalar::new(scalar).into();
        let scalar = scalar
            .ok_or_else(|| BtcError::InvalidPrivateKey("secret reduces to zero".into()))?;
        Ok(Self::from_signing_key(
            SigningKey::from(scalar),
            compressed,
            network,
        ))
    }

    pub fn from_signing_key(signing_key: SigningKey, compressed: bool, network: Network) -> Self {
        let public_key = PublicKey::from_verifying_key(*signing_key.verifying_key(), compressed);
        Self {
            signing_key,
            network,
            public_key,
        }
    }

    /// Fresh key from the OS random source.
    pub fn random(network: Network) -> Result<Self, BtcError> {
        let mut secret = crypto_utils::random::random_secret::<32>();
        Self::from_bytes(secret.scratch_mut(), true, network)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn set_network(&mut self, network: Network) {
        self.network = network;
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Copy of the 32-byte scalar in a self-scrubbing buffer.
    pub fn secret_bytes(&self) -> SecretBuf<32> {
        let mut field = self.signing_key.to_bytes();
        let mut out = SecretBuf::new();
        out.extend_from_slice(&field);
        field.as_mut_slice().zeroize();
        out
    }

    /// Deterministic (RFC6979) ECDSA over a 32-byte digest.
    ///
    /// The result is low-S and carries the public-key recovery id.
    pub fn sign(&self, hash: &[u8; 32]) -> Result<Signature, BtcError> {
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| BtcError::SigningError(format!("ecdsa signing failed: {e}")))?;
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature::with_index(r, s, recid.to_byte()))
    }

    /// Wallet import format: base58check(`wif || secret || [0x01]`).
    pub fn wif(&self) -> ZeroizingString {
        let mut payload = SecretBuf::<34>::new();
        payload.push(self.network.wif);
        payload.extend_from_slice(&self.secret_bytes());
        if self.public_key.is_compressed() {
            payload.push(0x01);
        }
        ZeroizingString::new(bs58::encode(&*payload).with_check().into_string())
    }

    /// Decodes a WIF string against the built-in networks.
    pub fn from_wif(wif: &str) -> Result<Self, BtcError> {
        Self::from_wif_in(wif, DEFAULT_NETWORKS)
    }

    /// Decodes a WIF string, resolving its version byte against `networks`
    /// (first match wins).
    pub fn from_wif_in(wif: &str, networks: &[Network]) -> Result<Self, BtcError> {
        let mut secret = SecretBuf::<32>::new();
        let (network, compressed) = decode_wif_into(wif, networks, &mut secret)?;
        let bytes: &[u8; 32] = secret
            .get(0..32)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| BtcError::InvalidPrivateKey("wif secret truncated".into()))?;
        Self::from_bytes(bytes, compressed, network)
    }

    pub fn address(&self) -> Result<String, BtcError> {
        self.public_key.segwit_address(&self.network)
    }

    pub fn legacy_address(&self) -> String {
        self.public_key.legacy_address(&self.network)
    }

    pub fn segwit_address(&self) -> Result<String, BtcError> {
        self.public_key.segwit_address(&self.network)
    }

    pub fn nested_segwit_address(&self) -> String {
        self.public_key.nested_segwit_address(&self.network)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("network", &self.network.name)
            .field("public_key", &self.public_key.sec())
            .finish_non_exhaustive()
    }
}

/// A private key in its raw 32-byte big-endian form, parsed incrementally.
///
/// Bytes collect in a scrubbing buffer until all 32 have arrived; the value
/// is then reduced modulo the curve order and the public key computed. A
/// secret that is zero (or reduces to zero) fails the parse.
#[derive(Debug)]
pub struct RawPrivateKey {
    buf: SecretBuf<32>,
    key: Option<PrivateKey>,
    compressed: bool,
    network: Network,
    state: ParseState,
}

impl RawPrivateKey {
    /// Empty reader. Parsed keys get `network` and a compressed public key.
    pub fn new(network: Network) -> Self {
        Self {
            buf: SecretBuf::new(),
            key: None,
            compressed: true,
            network,
            state: ParseState::default(),
        }
    }

    /// Wraps an existing key for serialization.
    pub fn from_key(key: PrivateKey) -> Self {
        Self {
            buf: SecretBuf::new(),
            compressed: key.public_key().is_compressed(),
            network: key.network().clone(),
            key: Some(key),
            state: ParseState::default(),
        }
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    /// The parsed key, once the parse is done.
    pub fn key(&self) -> Option<&PrivateKey> {
        self.key.as_ref().filter(|_| self.state.status() == ParseStatus::Done)
    }

    pub fn into_key(self) -> Option<PrivateKey> {
        let done = self.state.status() == ParseStatus::Done;
        self.key.filter(|_| done)
    }
}

impl Streamable for RawPrivateKey {
    fn from_stream(&mut self, stream: &mut dyn ParseStream) -> usize {
        match self.state.begin() {
            Resume::Failed => return 0,
            Resume::Fresh => {
                self.buf.clear();
                self.key = None;
            }
            Resume::Continue => {}
        }
        let mut read = 0;
        while self.buf.len() < 32 {
            let Some(byte) = stream.read() else {
                break;
            };
            if !self.buf.push(byte) {
                break;
            }
            read += 1;
        }
        self.state.advance(read);
        if self.buf.len() == 32 {
            match PrivateKey::from_bytes(self.buf.scratch_mut(), self.compressed, self.network.clone()) {
                Ok(key) => {
                    self.key = Some(key);
                    self.state.finish();
                }
                Err(e) => {
                    debug!(error = %e, "raw private key rejected");
                    self.state.fail();
                }
            }
            self.buf.clear();
        }
        read
    }

    fn to_stream(&self, stream: &mut dyn SerializeStream, offset: usize) -> usize {
        match &self.key {
            Some(key) => write_from_offset(&key.secret_bytes(), stream, offset),
            None => 0,
        }
    }

    fn length(&self) -> usize {
        32
    }

    fn status(&self) -> ParseStatus {
        self.state.status()
    }

    fn bytes_parsed(&self) -> usize {
        self.state.bytes_parsed()
    }
}

/// Base58check-decodes `wif` into `secret`.
///
/// The 40-byte scratch buffer is scrubbed on every path, and `secret` is left
/// all-zero whenever decoding fails.
fn decode_wif_into(
    wif: &str,
    networks: &[Network],
    secret: &mut SecretBuf<32>,
) -> Result<(Network, bool), BtcError> {
    secret.clear();
    let mut scratch = SecretBuf::<40>::new();
    let len = bs58::decode(wif)
        .with_check(None)
        .onto(&mut scratch.scratch_mut()[..])
        .map_err(|e| BtcError::InvalidPrivateKey(format!("wif base58check: {e}")))?;
    if !(33..=34).contains(&len) || !scratch.set_len(len) {
        return Err(BtcError::InvalidPrivateKey(format!(
            "wif payload must be 33 or 34 bytes, got {len}"
        )));
    }
    let network = Network::by_wif_version(scratch[0], networks).ok_or_else(|| {
        BtcError::InvalidNetwork(format!("unknown wif version {:#04x}", scratch[0]))
    })?;
    let compressed = len == 34 && scratch[33] != 0;
    let copied = secret.extend_from_slice(&scratch[1..33]);
    debug_assert!(copied);
    Ok((network.clone(), compressed))
}
