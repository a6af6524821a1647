// SPDX-License-Identifier: Apache-2.0

//! AES-256-GCM encryption of opaque strings under a shared password.
//!
//! The key is the SHA-256 digest of the UTF-8 password. That is not a
//! password KDF: the password must be a high-entropy server secret.
//!
//! Wire format: `hex(nonce) || base64(ciphertext || tag)`. The nonce is
//! always 12 bytes, so the first 24 characters are the nonce and no
//! delimiter is needed.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::Result;
use crate::error::GiscoreError;

/// Size of an AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Length of the hex-encoded nonce prefix.
pub const NONCE_HEX_LEN: usize = NONCE_SIZE * 2;

fn cipher_for(password: &str) -> Option<Aes256Gcm> {
    let key = Sha256::digest(password.as_bytes());
    Aes256Gcm::new_from_slice(key.as_slice()).ok()
}

/// Encrypts `plaintext` under `password` with a fresh random nonce.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String> {
    let cipher = cipher_for(password).ok_or(GiscoreError::Encryption)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| GiscoreError::Encryption)?;

    Ok(format!("{}{}", hex::encode(nonce), STANDARD.encode(sealed)))
}

/// Decrypts a token produced by [`encrypt`].
///
/// Every failure (bad hex, bad base64, truncated input, tag mismatch,
/// wrong password, non-UTF-8 plaintext) collapses into
/// [`GiscoreError::Decryption`].
pub fn decrypt(token: &str, password: &str) -> Result<String> {
    open(token, password).ok_or(GiscoreError::Decryption)
}

fn open(token: &str, password: &str) -> Option<String> {
    let nonce_hex = token.get(..NONCE_HEX_LEN)?;
    let body = token.get(NONCE_HEX_LEN..)?;

    // Lowercase only, so no two spellings of the same nonce are accepted.
    if !nonce_hex
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }

    let mut nonce = [0u8; NONCE_SIZE];
    hex::decode_to_slice(nonce_hex, &mut nonce).ok()?;
    let sealed = STANDARD.decode(body).ok()?;

    let cipher = cipher_for(password)?;
    let plain = cipher.decrypt(&Nonce::from(nonce), sealed.as_slice()).ok()?;
    String::from_utf8(plain).ok()
}
