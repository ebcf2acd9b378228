//! Length-prefixed byte strings.
//!
//! Every PSBT key and value travels as `<compact-size length> <bytes>`, the
//! same framing a serialized script uses, so the record parser hands both to
//! this type.

use crate::stream::{ParseStream, SerializeStream};
use crate::streamable::{write_from_offset, ParseState, ParseStatus, Resume, Streamable};
use crate::varint;

/// Upper bound on a single field. A length above this fails the parse before
/// anything is allocated.
pub const MAX_FIELD_LEN: u64 = 4_000_000;

#[derive(Debug, Clone, Default)]
pub struct Script {
    data: Vec<u8>,
    prefix: [u8; 9],
    expected: usize,
    state: ParseState,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn prefix_len(&self) -> usize {
        varint::prefix_len(self.prefix[0])
    }

    /// Handles one byte at position `pos` of the encoding.
    fn accept(&mut self, pos: usize, byte: u8) -> ParseStatus {
        if pos < 9 && (pos == 0 || pos < self.prefix_len()) {
            self.prefix[pos] = byte;
            let plen = self.prefix_len();
            if pos + 1 < plen {
                return ParseStatus::Incomplete;
            }
            let Some(len) = varint::decode(&self.prefix[..plen]) else {
                return ParseStatus::Failed;
            };
            if len > MAX_FIELD_LEN {
                return ParseStatus::Failed;
            }
            self.expected = len as usize;
            self.data.reserve_exact(self.expected);
        } else {
            self.data.push(byte);
        }
        if self.data.len() == self.expected {
            ParseStatus::Done
        } else {
            ParseStatus::Incomplete
        }
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Script {}

impl From<&[u8]> for Script {
    fn from(data: &[u8]) -> Self {
        Self::from_bytes(data)
    }
}

impl Streamable for Script {
    fn from_stream(&mut self, stream: &mut dyn ParseStream) -> usize {
        match self.state.begin() {
            Resume::Failed => return 0,
            Resume::Fresh => {
                self.data.clear();
                self.prefix = [0u8; 9];
                self.expected = 0;
            }
            Resume::Continue => {}
        }
        let mut read = 0;
        while self.state.is_incomplete() {
            let Some(byte) = stream.read() else {
                break;
            };
            let pos = self.state.bytes_parsed();
            self.state.advance(1);
            read += 1;
            match self.accept(pos, byte) {
                ParseStatus::Incomplete => {}
                ParseStatus::Done => self.state.finish(),
                ParseStatus::Failed => self.state.fail(),
            }
        }
        read
    }

    fn to_stream(&self, stream: &mut dyn SerializeStream, offset: usize) -> usize {
        let mut encoded = Vec::with_capacity(self.length());
        varint::write(self.data.len() as u64, &mut encoded);
        encoded.extend_from_slice(&self.data);
        write_from_offset(&encoded, stream, offset)
    }

    fn length(&self) -> usize {
        varint::encoded_len(self.data.len() as u64) + self.data.len()
    }

    fn status(&self) -> ParseStatus {
        self.state.status()
    }

    fn bytes_parsed(&self) -> usize {
        self.state.bytes_parsed()
    }
}
