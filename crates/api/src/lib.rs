// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]

//! # Quill API
//!
//! Core traits for the Quill signing service: the [`signer::Signer`] base
//! trait, the three capability traits ([`signer::FileSigner`],
//! [`signer::DataSigner`], [`signer::HashSigner`]), and the read-only
//! [`registry::SignerDirectory`] handed to the HTTP layer at startup.

pub mod registry;
pub mod signer;

pub use registry::SignerDirectory;
pub use signer::{
    merge_options, Capability, DataSigner, FileSigner, HashSigner, SignedFile, Signature, Signer,
};
