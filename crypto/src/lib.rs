//! Hashing and verification primitives for Meridian.
//!
//! - **Blake2b** for sub-block identifiers and selection seeds
//! - [`TransactionVerifier`]: the contract a signature-checking collaborator
//!   implements; every transaction must pass it before pooling

pub mod hash;
pub mod verify;

pub use hash::{blake2b_256, blake2b_256_multi, selection_seed, sub_block_id};
pub use verify::{AcceptAll, TransactionVerifier, VerifyError};
