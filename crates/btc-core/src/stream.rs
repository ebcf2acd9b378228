//! Byte transports for the streaming codecs.
//!
//! A [`ParseStream`] hands out bytes as they become available and a
//! [`SerializeStream`] accepts bytes while it has room. Neither blocks: a
//! codec reads or writes only what `available()` reports and returns, and the
//! caller re-invokes it once the transport has more data or more room.

/// Pull source of bytes.
pub trait ParseStream {
    /// Number of bytes that can be read right now without blocking.
    fn available(&self) -> usize;

    /// Takes the next byte, or `None` when nothing is available.
    fn read(&mut self) -> Option<u8>;
}

/// Push sink of bytes.
pub trait SerializeStream {
    /// Number of bytes that can be written right now without blocking.
    fn available(&self) -> usize;

    /// Writes one byte. Returns `false` if the sink had no room.
    fn write(&mut self, byte: u8) -> bool;
}

/// A [`ParseStream`] over an in-memory slice.
#[derive(Debug, Clone)]
pub struct ByteParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl ParseStream for ByteParser<'_> {
    fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }
}

/// A fixed-capacity [`SerializeStream`] writing into a caller-owned buffer.
#[derive(Debug)]
pub struct SliceSerializer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceSerializer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl SerializeStream for SliceSerializer<'_> {
    fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn write(&mut self, byte: u8) -> bool {
        match self.buf.get_mut(self.pos) {
            Some(slot) => {
                *slot = byte;
                self.pos += 1;
                true
            }
            None => false,
        }
    }
}

/// A growable vector is an unbounded sink.
impl SerializeStream for Vec<u8> {
    fn available(&self) -> usize {
        usize::MAX - self.len()
    }

    fn write(&mut self, byte: u8) -> bool {
        self.push(byte);
        true
    }
}
