//! Partially signed transactions (BIP-174, version 0).
//!
//! A [`Psbt`] owns the unsigned transaction plus one metadata record per
//! input and per output, index-aligned with `tx.input` / `tx.output`. It
//! parses incrementally through [`Streamable`](crate::streamable::Streamable)
//! (see `parser.rs`), so a document can arrive in arbitrary chunks.

mod parser;
mod sign;
mod types;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bitcoin::Transaction;

use crate::error::BtcError;
use crate::script::Script;
use crate::streamable::{ParseState, ParseStatus, Streamable};

pub use types::{
    PsbtDerivation, PsbtInputMetadata, PsbtOutputMetadata, PsbtPartialSignature, Section,
    UnknownRecord, DEFAULT_SIGHASH,
};

use types::{decode_consensus, expect_bare_key, split_key, upsert_unknown, GLOBAL_UNSIGNED_TX};

/// `psbt` followed by the 0xff separator.
pub const MAGIC: [u8; 5] = *b"psbt\xff";

/// Which part of the encoding the parser expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Cursor {
    /// Index of the next magic byte.
    Magic(usize),
    #[default]
    Key,
    Value,
}

#[derive(Debug, Clone, Default)]
pub struct Psbt {
    tx: Option<Transaction>,
    inputs: Vec<PsbtInputMetadata>,
    outputs: Vec<PsbtOutputMetadata>,
    unknown: Vec<UnknownRecord>,

    // Parser scratch.
    key: Script,
    value: Script,
    section: Option<Section>,
    cursor: Cursor,
    last_key_pos: usize,
    state: ParseState,
}

impl Psbt {
    /// Wraps an unsigned transaction with empty metadata for every input and
    /// output. Inputs must not carry scriptSigs or witnesses.
    pub fn new(tx: Transaction) -> Result<Self, BtcError> {
        check_unsigned(&tx)?;
        Ok(Self {
            inputs: vec![PsbtInputMetadata::default(); tx.input.len()],
            outputs: vec![PsbtOutputMetadata::default(); tx.output.len()],
            tx: Some(tx),
            ..Self::default()
        })
    }

    /// Parses a complete document held in memory.
    pub fn parse(bytes: &[u8]) -> Result<Self, BtcError> {
        let mut psbt = Self::default();
        let consumed = psbt.parse_chunk(bytes);
        match psbt.status() {
            ParseStatus::Done if consumed == bytes.len() => Ok(psbt),
            ParseStatus::Done => Err(BtcError::ParseFailed(format!(
                "{} trailing bytes after psbt",
                bytes.len() - consumed
            ))),
            ParseStatus::Incomplete => Err(BtcError::ParseFailed(format!(
                "truncated psbt after {consumed} bytes"
            ))),
            ParseStatus::Failed => Err(BtcError::ParseFailed(format!(
                "malformed psbt record after byte {}",
                psbt.last_key_pos
            ))),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.to_bytes()
    }

    pub fn from_base64(text: &str) -> Result<Self, BtcError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| BtcError::ParseFailed(format!("psbt base64: {e}")))?;
        Self::parse(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.serialize())
    }

    /// The unsigned transaction. `None` until a parse has completed.
    pub fn tx(&self) -> Option<&Transaction> {
        self.tx.as_ref().filter(|_| self.is_settled())
    }

    /// Per-input metadata, empty while a parse is unfinished or failed.
    pub fn inputs(&self) -> &[PsbtInputMetadata] {
        if self.is_settled() {
            &self.inputs
        } else {
            &[]
        }
    }

    pub fn inputs_mut(&mut self) -> &mut [PsbtInputMetadata] {
        if self.is_settled() {
            &mut self.inputs
        } else {
            &mut []
        }
    }

    pub fn outputs(&self) -> &[PsbtOutputMetadata] {
        if self.is_settled() {
            &self.outputs
        } else {
            &[]
        }
    }

    pub fn outputs_mut(&mut self) -> &mut [PsbtOutputMetadata] {
        if self.is_settled() {
            &mut self.outputs
        } else {
            &mut []
        }
    }

    /// Global records of unrecognized types.
    pub fn unknown(&self) -> &[UnknownRecord] {
        if self.is_settled() {
            &self.unknown
        } else {
            &[]
        }
    }

    /// Byte offset just past the last complete record of the current parse.
    pub fn last_key_pos(&self) -> usize {
        self.last_key_pos
    }

    /// Total partial signatures across all inputs.
    pub fn signature_count(&self) -> usize {
        self.inputs().iter().map(|i| i.signatures.len()).sum()
    }

    /// True once the document is whole: built with [`Psbt::new`] or fully
    /// parsed. A failed or unfinished parse exposes no metadata.
    pub(crate) fn is_settled(&self) -> bool {
        self.state.status() == ParseStatus::Done
    }

    /// Adds or replaces one key-value record in `section`.
    ///
    /// The key's first byte is its type. Typed records are validated and
    /// decoded into the metadata; unrecognized types are kept verbatim. A
    /// record whose key already exists replaces the earlier one.
    pub fn add(&mut self, section: Section, key: &[u8], value: &[u8]) -> Result<(), BtcError> {
        match section {
            Section::Global => {
                let (&key_type, key_data) = split_key(key)?;
                if key_type != GLOBAL_UNSIGNED_TX {
                    upsert_unknown(&mut self.unknown, key, value);
                    return Ok(());
                }
                expect_bare_key(key_type, key_data)?;
                if self.tx.is_some() {
                    return Err(BtcError::InvalidRecord("duplicate unsigned tx".into()));
                }
                let tx: Transaction = decode_consensus(value, "unsigned tx")?;
                check_unsigned(&tx)?;
                self.tx = Some(tx);
                Ok(())
            }
            Section::Input(i) => {
                let tx = self.tx.as_ref().ok_or_else(|| {
                    BtcError::InvalidRecord("input record before unsigned tx".into())
                })?;
                let prevout = tx
                    .input
                    .get(i)
                    .map(|txin| txin.previous_output)
                    .ok_or_else(|| BtcError::InvalidRecord(format!("no input {i}")))?;
                let meta = self
                    .inputs
                    .get_mut(i)
                    .ok_or_else(|| BtcError::InvalidRecord(format!("no metadata for input {i}")))?;
                meta.apply(key, value, &prevout)
            }
            Section::Output(j) => {
                let meta = self
                    .outputs
                    .get_mut(j)
                    .ok_or_else(|| BtcError::InvalidRecord(format!("no output {j}")))?;
                meta.apply(key, value)
            }
        }
    }

    /// Sum of known input amounts minus the declared outputs, floored at
    /// zero. Inputs whose spent output is unknown contribute nothing, so the
    /// result is a lower bound unless [`Psbt::fee_exact`] succeeds.
    pub fn fee(&self) -> u64 {
        let Some(tx) = self.tx() else {
            return 0;
        };
        let known_in = tx
            .input
            .iter()
            .zip(&self.inputs)
            .filter_map(|(txin, meta)| meta.spent_output(&txin.previous_output))
            .fold(0u64, |acc, out| acc.saturating_add(out.value.to_sat()));
        known_in.saturating_sub(self.output_total(tx))
    }

    /// The fee, or `IncompleteData` if any input amount is unknown.
    pub fn fee_exact(&self) -> Result<u64, BtcError> {
        if !self.is_settled() {
            return Err(BtcError::IncompleteData("psbt not fully parsed".into()));
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| BtcError::IncompleteData("no unsigned tx".into()))?;
        let mut total_in = 0u64;
        for (index, txin) in tx.input.iter().enumerate() {
            let out = self
                .inputs
                .get(index)
                .and_then(|meta| meta.spent_output(&txin.previous_output))
                .ok_or_else(|| {
                    BtcError::IncompleteData(format!("amount of input {index} unknown"))
                })?;
            total_in = total_in.saturating_add(out.value.to_sat());
        }
        let total_out = self.output_total(tx);
        total_in.checked_sub(total_out).ok_or_else(|| {
            BtcError::InvalidRecord(format!(
                "outputs ({total_out}) exceed inputs ({total_in})"
            ))
        })
    }

    fn output_total(&self, tx: &Transaction) -> u64 {
        tx.output
            .iter()
            .fold(0u64, |acc, out| acc.saturating_add(out.value.to_sat()))
    }
}

fn check_unsigned(tx: &Transaction) -> Result<(), BtcError> {
    for (index, txin) in tx.input.iter().enumerate() {
        if !txin.script_sig.is_empty() || !txin.witness.is_empty() {
            return Err(BtcError::InvalidRecord(format!(
                "input {index} of unsigned tx carries a signature"
            )));
        }
    }
    Ok(())
}
