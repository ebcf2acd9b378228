//! # btc-core
//!
//! Bitcoin keys, signatures, addresses and partially signed transactions for
//! constrained transports.
//!
//! Every binary entity implements [`streamable::Streamable`]: it parses from a
//! [`stream::ParseStream`] that may deliver bytes a few at a time, keeping its
//! progress across calls, and serializes into a [`stream::SerializeStream`]
//! from any offset.

pub mod address;
pub mod descriptor;
pub mod error;
pub mod hash;
pub mod hd;
pub mod keys;
pub mod network;
pub mod psbt;
pub mod script;
pub mod signature;
pub mod stream;
pub mod streamable;
pub mod varint;

pub use address::ScriptType;
pub use error::BtcError;
pub use hd::HdPrivateKey;
pub use keys::{PrivateKey, PublicKey, RawPrivateKey};
pub use network::{Network, DEFAULT_NETWORKS, MAINNET, TESTNET};
pub use psbt::{Psbt, Section};
pub use signature::Signature;
pub use streamable::{ParseStatus, Streamable};
