// Path: crates/signers/src/lib.rs
#![forbid(unsafe_code)]

//! # Quill Signers
//!
//! The concrete signer implementations behind the uniform
//! [`quill_api::Signer`] contract, and the factory that builds them from
//! validated configuration records.
//!
//! | type tag | capabilities | backend |
//! |---|---|---|
//! | `contentsignature` | data | ECDSA P-256/P-384, software or HSM |
//! | `contentsignaturepki` | data | ECDSA + issued end-entity chain |
//! | `genericrsa` | data, hash | RSA PSS or PKCS#1 v1.5, SHA-256 |
//! | `mar` | data, hash | RSA PKCS#1 v1.5, SHA-384 |
//! | `apk2` | file | external `apksigner` process |

pub mod apk;
pub mod backend;
pub mod content_signature;
pub mod content_signature_pki;
pub mod factory;
pub mod generic_rsa;
pub mod mar;

pub use backend::KeyBackend;
pub use factory::{build_registry, build_signer};

#[cfg(test)]
pub(crate) mod testutil {
    use quill_types::config::{KeyMaterial, SignerConfig};

    pub fn test_config(id: &str, kind: &str) -> SignerConfig {
        SignerConfig {
            id: id.into(),
            kind: kind.into(),
            mode: None,
            key: KeyMaterial::Inline { pem: String::new() },
            certificate: None,
            pki: None,
            defaults: None,
        }
    }
}
