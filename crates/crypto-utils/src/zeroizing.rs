use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A fixed-capacity byte buffer for secret material that is zeroed when dropped.
///
/// The storage lives inline (no heap), which keeps key bytes out of the
/// allocator. `len` tracks how much of the capacity currently holds data; all
/// accessors are range-checked against it.
pub struct SecretBuf<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> SecretBuf<N> {
    /// Creates an empty, all-zero buffer.
    pub fn new() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
        }
    }

    /// Copies `data` into a new buffer. Returns `None` if it does not fit.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let mut buf = Self::new();
        buf.extend_from_slice(data).then_some(buf)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `data`. Returns `false` (leaving the buffer untouched) if the
    /// result would exceed the capacity.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> bool {
        let Some(end) = self.len.checked_add(data.len()) else {
            return false;
        };
        if end > N {
            return false;
        }
        self.bytes[self.len..end].copy_from_slice(data);
        self.len = end;
        true
    }

    pub fn push(&mut self, byte: u8) -> bool {
        self.extend_from_slice(&[byte])
    }

    /// Full-capacity scratch access for decoders that write in place.
    /// Follow with [`SecretBuf::set_len`] to mark how much is valid.
    pub fn scratch_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    pub fn set_len(&mut self, len: usize) -> bool {
        if len > N {
            return false;
        }
        self.len = len;
        true
    }

    pub fn get(&self, range: std::ops::Range<usize>) -> Option<&[u8]> {
        if range.start > range.end || range.end > self.len {
            return None;
        }
        Some(&self.bytes[range])
    }

    /// Overwrites the whole capacity with zeros and empties the buffer.
    pub fn clear(&mut self) {
        self.bytes.zeroize();
        self.len = 0;
    }

    /// `true` if every byte of the capacity (not just the used part) is zero.
    pub fn is_scrubbed(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

impl<const N: usize> Default for SecretBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Deref for SecretBuf<N> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl<const N: usize> Zeroize for SecretBuf<N> {
    fn zeroize(&mut self) {
        self.clear();
    }
}

impl<const N: usize> Drop for SecretBuf<N> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<const N: usize> ZeroizeOnDrop for SecretBuf<N> {}

impl<const N: usize> std::fmt::Debug for SecretBuf<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBuf<{N}>({} bytes, redacted)", self.len)
    }
}

/// A `String` wrapper that is zeroed when dropped.
///
/// Use this for sensitive text (WIF keys, mnemonic phrases) that must not
/// linger in memory after use.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingString(String);

impl ZeroizingString {
    pub fn new(data: String) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for ZeroizingString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ZeroizingString {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&str> for ZeroizingString {
    fn from(data: &str) -> Self {
        Self::new(data.to_owned())
    }
}

impl std::fmt::Debug for ZeroizingString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ZeroizingString(redacted)")
    }
}
