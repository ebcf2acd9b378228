//! The resumable parse/serialize contract shared by every binary entity.

use crate::stream::{ByteParser, ParseStream, SerializeStream};

/// Progress of a streaming parse.
///
/// `Failed` is sticky: further `from_stream` calls are no-ops and the entity
/// has to be discarded. A `from_stream` call on a `Done` entity starts a new
/// parse from scratch, so one object can consume a sequence of documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStatus {
    Incomplete,
    #[default]
    Done,
    Failed,
}

/// A binary-format entity that can be parsed and serialized incrementally.
pub trait Streamable {
    /// Consumes as many bytes as the stream has available (never more than
    /// the entity needs) and returns how many were consumed by this call.
    fn from_stream(&mut self, stream: &mut dyn ParseStream) -> usize;

    /// Writes the encoding starting at byte `offset`, as far as the sink has
    /// room. Returns the number of bytes written by this call.
    fn to_stream(&self, stream: &mut dyn SerializeStream, offset: usize) -> usize;

    /// Total size of the encoding in bytes.
    fn length(&self) -> usize;

    fn status(&self) -> ParseStatus;

    /// Bytes consumed by the current (or last finished) parse.
    fn bytes_parsed(&self) -> usize;

    /// Feeds a chunk of memory to [`Streamable::from_stream`].
    fn parse_chunk(&mut self, chunk: &[u8]) -> usize {
        let mut parser = ByteParser::new(chunk);
        self.from_stream(&mut parser)
    }

    /// Encodes the whole entity into a fresh vector.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length());
        self.to_stream(&mut out, 0);
        out
    }
}

/// How a `from_stream` call should proceed, as decided by [`ParseState::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Earlier parse failed; do nothing.
    Failed,
    /// Previous parse finished (or none started); reset scratch state.
    Fresh,
    /// Pick up where the last call left off.
    Continue,
}

/// Status and byte counter bookkeeping embedded in each streaming parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseState {
    status: ParseStatus,
    bytes_parsed: usize,
}

impl ParseState {
    /// Applies the status transition rules at the top of a `from_stream` call.
    pub fn begin(&mut self) -> Resume {
        match self.status {
            ParseStatus::Failed => Resume::Failed,
            ParseStatus::Done => {
                self.bytes_parsed = 0;
                self.status = ParseStatus::Incomplete;
                Resume::Fresh
            }
            ParseStatus::Incomplete => Resume::Continue,
        }
    }

    pub fn status(&self) -> ParseStatus {
        self.status
    }

    pub fn bytes_parsed(&self) -> usize {
        self.bytes_parsed
    }

    pub fn is_incomplete(&self) -> bool {
        self.status == ParseStatus::Incomplete
    }

    pub fn advance(&mut self, n: usize) {
        self.bytes_parsed += n;
    }

    pub fn finish(&mut self) {
        self.status = ParseStatus::Done;
    }

    pub fn fail(&mut self) {
        self.status = ParseStatus::Failed;
    }
}

/// Writes `encoded[offset..]` into the sink as far as it has room.
pub fn write_from_offset(encoded: &[u8], stream: &mut dyn SerializeStream, offset: usize) -> usize {
    let mut written = 0;
    for &byte in encoded.iter().skip(offset) {
        if stream.available() == 0 || !stream.write(byte) {
            break;
        }
        written += 1;
    }
    written
}
