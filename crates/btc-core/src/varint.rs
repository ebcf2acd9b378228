//! Compact-size ("varint") length prefixes.
//!
//! - 0x00-0xfc: value is the byte itself
//! - 0xfd: followed by 2 bytes little-endian
//! - 0xfe: followed by 4 bytes little-endian
//! - 0xff: followed by 8 bytes little-endian

/// Encoded size of `n`.
pub fn encoded_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Total prefix size announced by the first prefix byte.
pub fn prefix_len(first: u8) -> usize {
    match first {
        0xfd => 3,
        0xfe => 5,
        0xff => 9,
        _ => 1,
    }
}

pub fn write(n: u64, out: &mut Vec<u8>) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Decodes a complete prefix (`prefix.len() == prefix_len(prefix[0])`).
///
/// Returns `None` for a wrong-sized buffer or a non-canonical encoding (a
/// value that would have fit a shorter form).
pub fn decode(prefix: &[u8]) -> Option<u64> {
    let (&first, rest) = prefix.split_first()?;
    if prefix.len() != prefix_len(first) {
        return None;
    }
    let mut le = [0u8; 8];
    le[..rest.len()].copy_from_slice(rest);
    let value = match first {
        0xfd..=0xff => u64::from_le_bytes(le),
        _ => u64::from(first),
    };
    (encoded_len(value) == prefix.len()).then_some(value)
}
