//! Sealing and opening of the session cookie payload.
//!
//! The cookie value is AES-256-GCM over the serialized session record:
//! base64(nonce || ciphertext || tag), where nonce is 12 bytes and tag is
//! 16 bytes. The AEAD tag is what makes the cookie tamper-evident, so no
//! separate signature is carried.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::pbkdf2;
use std::num::NonZeroU32;

/// The length of the AES-256 key in bytes
pub const KEY_LENGTH: usize = 32;

/// The length of the AES-GCM nonce in bytes
const NONCE_LENGTH: usize = 12;

/// Number of PBKDF2 iterations for key derivation
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt for PBKDF2 key derivation (fixed salt is acceptable here since the
/// signing secret itself is unique per deployment)
const PBKDF2_SALT: &[u8] = b"drivr-session-cookie-v1";

/// Derive a 256-bit sealing key from a configured secret string.
///
/// Secrets are human-managed strings (environment variables, config files);
/// PBKDF2 stretches them into keys suitable for AES-256-GCM.
pub fn derive_key(secret: &str) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).unwrap(),
        PBKDF2_SALT,
        secret.as_bytes(),
        &mut key,
    );
    key
}

/// Seal a plaintext payload into a cookie-safe string.
///
/// # Errors
/// Returns an error if encryption fails.
pub fn seal(plaintext: &str, key: &[u8; KEY_LENGTH]) -> Result<String> {
    use rand::RngCore;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

    let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&combined))
}

/// Open a sealed cookie value back into the plaintext payload.
///
/// # Errors
/// Returns an error if the base64 decoding fails, the value is too short,
/// or the AEAD authentication fails (wrong key or tampered data).
pub fn open(sealed: &str, key: &[u8; KEY_LENGTH]) -> Result<String> {
    let combined = BASE64.decode(sealed).context("Failed to decode base64")?;

    if combined.len() < NONCE_LENGTH + 1 {
        anyhow::bail!("Sealed value too short");
    }

    let (nonce_bytes, ciphertext_bytes) = combined.split_at(NONCE_LENGTH);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;
    let plaintext = cipher
        .decrypt(nonce, ciphertext_bytes)
        .map_err(|e| anyhow::anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
}
