//! Shared utility functions.
//!
//! - `hash`: SHA-256 of byte buffers and files

mod hash;

pub use hash::{compute_hash, hash_file};
