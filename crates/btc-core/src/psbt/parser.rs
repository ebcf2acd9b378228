use tracing::{debug, warn};

use super::{Cursor, Psbt, PsbtInputMetadata, PsbtOutputMetadata, Section, MAGIC};
use crate::script::Script;
use crate::stream::{ParseStream, SerializeStream};
use crate::streamable::{write_from_offset, ParseStatus, Resume, Streamable};
use crate::varint;

use super::types::GLOBAL_UNSIGNED_TX;

impl Psbt {
    fn reset_parse(&mut self) {
        self.tx = None;
        self.inputs.clear();
        self.outputs.clear();
        self.unknown.clear();
        self.key = Script::new();
        self.value = Script::new();
        self.section = Some(Section::Global);
        self.cursor = Cursor::Magic(0);
        self.last_key_pos = 0;
    }

    /// Handles a zero-length key: closes the current section and moves on.
    fn end_section(&mut self) {
        let Some(section) = self.section else {
            return;
        };
        let (n_in, n_out) = match &self.tx {
            Some(tx) => (tx.input.len(), tx.output.len()),
            None => {
                warn!(offset = self.state.bytes_parsed(), "psbt global section has no unsigned tx");
                self.state.fail();
                return;
            }
        };
        if section == Section::Global {
            self.inputs = vec![PsbtInputMetadata::default(); n_in];
            self.outputs = vec![PsbtOutputMetadata::default(); n_out];
        }

        let next = match section {
            Section::Global if n_in > 0 => Some(Section::Input(0)),
            Section::Global if n_out > 0 => Some(Section::Output(0)),
            Section::Input(i) if i + 1 < n_in => Some(Section::Input(i + 1)),
            Section::Global | Section::Input(_) if n_out > 0 => Some(Section::Output(0)),
            Section::Output(j) if j + 1 < n_out => Some(Section::Output(j + 1)),
            _ => None,
        };
        debug!(from = %section, to = ?next, "psbt section closed");
        self.section = next;
        if next.is_none() {
            self.state.finish();
        }
    }

    fn finish_record(&mut self) {
        let Some(section) = self.section else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        let value = std::mem::take(&mut self.value);
        let result = self.add(section, key.as_bytes(), value.as_bytes());
        // Keep the finished sub-parsers so their next call starts fresh.
        self.key = key;
        self.value = value;
        match result {
            Ok(()) => self.last_key_pos = self.state.bytes_parsed(),
            Err(e) => {
                warn!(
                    section = %section,
                    offset = self.last_key_pos,
                    error = %e,
                    "psbt record rejected"
                );
                self.state.fail();
            }
        }
    }

    /// Encodes the whole document.
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length());
        out.extend_from_slice(&MAGIC);
        if let Some(tx) = &self.tx {
            put_record(&mut out, &[GLOBAL_UNSIGNED_TX], &bitcoin::consensus::serialize(tx));
        }
        for (key, value) in &self.unknown {
            put_record(&mut out, key, value);
        }
        out.push(0x00);
        for meta in &self.inputs {
            for (key, value) in meta.records() {
                put_record(&mut out, &key, &value);
            }
            out.push(0x00);
        }
        for meta in &self.outputs {
            for (key, value) in meta.records() {
                put_record(&mut out, &key, &value);
            }
            out.push(0x00);
        }
        out
    }
}

fn put_record(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    varint::write(key.len() as u64, out);
    out.extend_from_slice(key);
    varint::write(value.len() as u64, out);
    out.extend_from_slice(value);
}

fn record_len(key_len: usize, value_len: usize) -> usize {
    varint::encoded_len(key_len as u64)
        + key_len
        + varint::encoded_len(value_len as u64)
        + value_len
}

impl Streamable for Psbt {
    fn from_stream(&mut self, stream: &mut dyn ParseStream) -> usize {
        match self.state.begin() {
            Resume::Failed => return 0,
            Resume::Fresh => self.reset_parse(),
            Resume::Continue => {}
        }

        let mut read = 0;
        while self.state.is_incomplete() {
            match self.cursor {
                Cursor::Magic(pos) => {
                    let Some(byte) = stream.read() else {
                        break;
                    };
                    read += 1;
                    self.state.advance(1);
                    if byte != MAGIC[pos] {
                        warn!(offset = pos, "psbt magic mismatch");
                        self.state.fail();
                    } else if pos + 1 == MAGIC.len() {
                        self.cursor = Cursor::Key;
                        self.last_key_pos = MAGIC.len();
                    } else {
                        self.cursor = Cursor::Magic(pos + 1);
                    }
                }
                Cursor::Key => {
                    let n = self.key.from_stream(stream);
                    read += n;
                    self.state.advance(n);
                    match self.key.status() {
                        ParseStatus::Incomplete => break,
                        ParseStatus::Failed => {
                            warn!(offset = self.last_key_pos, "psbt key malformed");
                            self.state.fail();
                        }
                        ParseStatus::Done if self.key.is_empty() => {
                            self.last_key_pos = self.state.bytes_parsed();
                            self.end_section();
                        }
                        ParseStatus::Done => self.cursor = Cursor::Value,
                    }
                }
                Cursor::Value => {
                    let n = self.value.from_stream(stream);
                    read += n;
                    self.state.advance(n);
                    match self.value.status() {
                        ParseStatus::Incomplete => break,
                        ParseStatus::Failed => {
                            warn!(offset = self.last_key_pos, "psbt value malformed");
                            self.state.fail();
                        }
                        ParseStatus::Done => {
                            self.cursor = Cursor::Key;
                            self.finish_record();
                        }
                    }
                }
            }
        }
        read
    }

    fn to_stream(&self, stream: &mut dyn SerializeStream, offset: usize) -> usize {
        write_from_offset(&self.encode(), stream, offset)
    }

    fn length(&self) -> usize {
        let mut len = MAGIC.len() + 1 + self.inputs.len() + self.outputs.len();
        if let Some(tx) = &self.tx {
            len += record_len(1, bitcoin::consensus::serialize(tx).len());
        }
        let records = self
            .unknown
            .iter()
            .cloned()
            .chain(self.inputs.iter().flat_map(|m| m.records()))
            .chain(self.outputs.iter().flat_map(|m| m.records()));
        for (key, value) in records {
            len += record_len(key.len(), value.len());
        }
        len
    }

    fn status(&self) -> ParseStatus {
        self.state.status()
    }

    fn bytes_parsed(&self) -> usize {
        self.state.bytes_parsed()
    }
}
