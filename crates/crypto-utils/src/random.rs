use rand::RngCore;
use rand_core::OsRng;

use crate::zeroizing::SecretBuf;

/// Fills `out` in place from the OS random source.
pub fn fill_random(out: &mut [u8]) {
    OsRng.fill_bytes(out);
}

/// A full `SecretBuf` of OS randomness, generated directly in the scrubbing
/// container so no copy of the bytes is left behind.
pub fn random_secret<const N: usize>() -> SecretBuf<N> {
    let mut buf = SecretBuf::new();
    fill_random(buf.scratch_mut());
    let filled = buf.set_len(N);
    debug_assert!(filled, "len N always fits SecretBuf<N>");
    buf
}
