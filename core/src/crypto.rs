//! Byte-string crypto helpers used next to the request task.
//!
//! Everything here works on fully buffered input; nothing streams.

use std::fmt;
use std::str::FromStr;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose, Engine as _};
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use thiserror::Error;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("AES-256-CBC needs a 32 byte key and 16 byte iv, got {key} and {iv}")]
    KeyLength { key: usize, iv: usize },

    #[error("decryption failed: bad padding or corrupt ciphertext")]
    Decrypt,

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Decode standard-alphabet base64. ASCII whitespace (line breaks from
/// wrapped encoders) is ignored.
pub fn base64_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| CryptoError::Base64(e.to_string()))
}

/// AES-256-CBC decryption with PKCS#7 padding.
pub fn decrypt_aes_cbc(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::KeyLength {
        key: key.len(),
        iv: iv.len(),
    })?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Digest algorithms accepted by `hash_hex`, named the way callers pass them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MD5" => Ok(HashAlgorithm::Md5),
            "SHA-1" => Ok(HashAlgorithm::Sha1),
            "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA-512" => Ok(HashAlgorithm::Sha512),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
        })
    }
}

impl HashAlgorithm {
    pub fn digest_hex(self, input: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => format!("{:x}", md5::compute(input)),
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(input)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(input)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(input)),
        }
    }
}

/// Lowercase hex digest of `input` for the algorithm named `algorithm`
/// (`"MD5"`, `"SHA-1"`, `"SHA-256"` or `"SHA-512"`).
pub fn hash_hex(input: &[u8], algorithm: &str) -> Result<String, CryptoError> {
    Ok(algorithm.parse::<HashAlgorithm>()?.digest_hex(input))
}
