//! # crypto-utils
//!
//! Memory-safety and secure random generation helpers shared by the key and
//! codec crates.

pub mod random;
pub mod zeroizing;

pub use zeroizing::{SecretBuf, ZeroizingString};
