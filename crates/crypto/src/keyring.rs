// Path: crates/crypto/src/keyring.rs
//! Passphrase encryption for private keys at rest.
//!
//! Format V1:
//! [ Magic: "QUILLKEY" (8) ]
//! [ Version: u16 (2) ]
//! [ KDF Algo: u8 (1) ]
//! [ KDF Mem KiB: u32 (4) ]
//! [ KDF Iters: u32 (4) ]
//! [ KDF Lanes: u8 (1) ]
//! [ Salt: 16B ]
//! [ AEAD Algo: u8 (1) ]
//! [ Nonce: 12B ]
//! [ Ciphertext + Tag: N + 16 ]

use crate::error::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// Header Constants
const HEADER_MAGIC: &[u8; 8] = b"QUILLKEY";
const HEADER_VERSION: u16 = 1;
const HEADER_LEN: usize = 8 + 2 + 1 + 4 + 4 + 1 + 16 + 1 + 12; // 49 Bytes

// Parameter Defaults (Strong defaults for V1)
const KDF_ALGO_ARGON2ID: u8 = 1;
const KDF_MEM_KIB: u32 = 64 * 1024; // 64 MiB
const KDF_ITERS: u32 = 3;
const KDF_LANES: u8 = 4;
const SALT_LEN: usize = 16;
const AEAD_ALGO_CHACHA20POLY1305: u8 = 1;
const NONCE_LEN: usize = 12;
const KEK_LEN: usize = 32;

/// A container for sensitive data that zeroizes on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(pub Vec<u8>);

fn derive_kek(
    passphrase: &str,
    salt: &[u8],
    mem_kib: u32,
    iters: u32,
    lanes: u8,
) -> Result<Zeroizing<[u8; KEK_LEN]>, CryptoError> {
    let params = Params::new(mem_kib, iters, lanes as u32, Some(KEK_LEN))
        .map_err(|e| CryptoError::OperationFailed(format!("Argon2 params: {}", e)))?;
    let kdf = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut kek = Zeroizing::new([0u8; KEK_LEN]);
    kdf.hash_password_into(passphrase.as_bytes(), salt, kek.as_mut())
        .map_err(|e| CryptoError::OperationFailed(format!("Argon2 derivation failed: {}", e)))?;
    Ok(kek)
}

fn field<'a>(data: &'a [u8], start: usize, len: usize) -> Result<&'a [u8], CryptoError> {
    data.get(start..start + len)
        .ok_or_else(|| CryptoError::InvalidInput("File too short".into()))
}

/// Encrypts raw key bytes using a passphrase, wrapping them in the V1 format.
pub fn encrypt_key(secret: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    // 1. Generate Salt and Nonce
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce_bytes);

    // 2. Construct Header
    // Bytes are packed manually to keep a stable, endian-independent on-disk
    // format.
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(HEADER_MAGIC);
    header.extend_from_slice(&HEADER_VERSION.to_be_bytes());
    header.push(KDF_ALGO_ARGON2ID);
    header.extend_from_slice(&KDF_MEM_KIB.to_be_bytes());
    header.extend_from_slice(&KDF_ITERS.to_be_bytes());
    header.push(KDF_LANES);
    header.extend_from_slice(&salt);
    header.push(AEAD_ALGO_CHACHA20POLY1305);
    header.extend_from_slice(&nonce_bytes);

    debug_assert_eq!(header.len(), HEADER_LEN);

    // 3. Derive KEK (Key Encryption Key)
    let kek = derive_kek(passphrase, &salt, KDF_MEM_KIB, KDF_ITERS, KDF_LANES)?;

    // 4. Encrypt
    // Header binding is implicit: salt and KDF params are bound through the
    // derived key, the nonce through AEAD usage, magic/version checked on
    // decode before decrypt.
    let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_ref()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), secret)
        .map_err(|_| CryptoError::OperationFailed("Encryption failed".into()))?;

    // 5. Pack Output
    let mut output = header;
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Decrypts a key blob using a passphrase, respecting the versioned header.
pub fn decrypt_key(data: &[u8], passphrase: &str) -> Result<SensitiveBytes, CryptoError> {
    // 1. Validate Header Structure
    if data.len() < HEADER_LEN + 16 {
        return Err(CryptoError::InvalidInput("File too short".into()));
    }

    if field(data, 0, 8)? != HEADER_MAGIC {
        return Err(CryptoError::InvalidInput("Invalid file signature".into()));
    }

    let version_bytes: [u8; 2] = field(data, 8, 2)?
        .try_into()
        .map_err(|_| CryptoError::InvalidInput("File too short".into()))?;
    let version = u16::from_be_bytes(version_bytes);
    if version != HEADER_VERSION {
        return Err(CryptoError::Unsupported(format!(
            "Unsupported key format version: {}",
            version
        )));
    }

    // 2. Extract Metadata
    let _kdf_id = field(data, 10, 1)?;
    let mem_kib = u32::from_be_bytes(
        field(data, 11, 4)?
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("File too short".into()))?,
    );
    let iters = u32::from_be_bytes(
        field(data, 15, 4)?
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("File too short".into()))?,
    );
    let lanes = field(data, 19, 1)?
        .first()
        .copied()
        .ok_or_else(|| CryptoError::InvalidInput("File too short".into()))?;
    let salt = field(data, 20, SALT_LEN)?;
    let _aead_id = field(data, 36, 1)?;
    let nonce_bytes = field(data, 37, NONCE_LEN)?;
    let ciphertext = data
        .get(HEADER_LEN..)
        .ok_or_else(|| CryptoError::InvalidInput("File too short".into()))?;

    // 3. Derive KEK from the header's own parameters
    let kek = derive_kek(passphrase, salt, mem_kib, iters, lanes)?;

    // 4. Decrypt
    let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_ref()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            CryptoError::OperationFailed(
                "Decryption failed (wrong passphrase or corrupted file)".into(),
            )
        })?;

    Ok(SensitiveBytes(plaintext))
}

/// Loads a key file from disk, decrypting it with `passphrase`.
pub fn load_key_file(path: &Path, passphrase: &str) -> Result<SensitiveBytes, CryptoError> {
    let encrypted = std::fs::read(path)
        .map_err(|e| CryptoError::InvalidInput(format!("Failed to read key file: {}", e)))?;
    decrypt_key(&encrypted, passphrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_v1() {
        let secret = b"my_secret_key_seed_32_bytes_long";
        let pass = "strong_password";

        let encrypted = encrypt_key(secret, pass).unwrap();

        // Basic structure checks
        assert_eq!(&encrypted[0..8], HEADER_MAGIC);
        assert_eq!(encrypted.len(), HEADER_LEN + secret.len() + 16); // Header + Plaintext + Tag

        let decrypted = decrypt_key(&encrypted, pass).unwrap();
        assert_eq!(decrypted.0, secret);
    }

    #[test]
    fn test_wrong_passphrase() {
        let secret = b"secret";
        let encrypted = encrypt_key(secret, "pass").unwrap();
        assert!(decrypt_key(&encrypted, "wrong").is_err());
    }

    #[test]
    fn test_tamper_header_salt() {
        // Modifying the salt changes the derived KEK, so AEAD decryption
        // fails with a tag mismatch.
        let secret = b"secret";
        let mut encrypted = encrypt_key(secret, "pass").unwrap();

        // Tamper with the salt (index 25 is inside the salt range 20..36)
        encrypted[25] ^= 0xFF;

        assert!(decrypt_key(&encrypted, "pass").is_err());
    }

    #[test]
    fn test_truncated_input() {
        let secret = b"secret";
        let encrypted = encrypt_key(secret, "pass").unwrap();
        assert!(decrypt_key(&encrypted[..HEADER_LEN - 1], "pass").is_err());
    }
}
