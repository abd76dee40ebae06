//! Symmetric encryption for bearer tokens and encrypted request bodies.
//!
//! Both use AES-256-GCM with a key derived as `SHA-256(secret)` and a random
//! 12-byte nonce prepended to the ciphertext. Tokens travel hex-encoded,
//! bodies base64-encoded.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with a key derived from `secret`.
///
/// Returns `nonce || ciphertext`.
pub fn encrypt(secret: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(secret)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext` produced by [`encrypt`] with the same secret.
pub fn decrypt(secret: &str, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() <= NONCE_LEN {
        return Err(CryptoError::Decrypt);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    cipher_for(secret)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Encrypt a signature value into a hex bearer token.
///
/// # Examples
///
/// ```
/// use sigil_auth::crypto::{decrypt_token, encrypt_token};
///
/// let token = encrypt_token("server-secret", "3||alice|hash|1700000000000||").unwrap();
/// assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
/// assert_eq!(
///     decrypt_token("server-secret", &token).unwrap(),
///     "3||alice|hash|1700000000000||"
/// );
/// ```
pub fn encrypt_token(secret: &str, value: &str) -> Result<String, CryptoError> {
    encrypt(secret, value.as_bytes()).map(hex::encode)
}

/// Decrypt a hex bearer token back into the signature value.
pub fn decrypt_token(secret: &str, token: &str) -> Result<String, CryptoError> {
    let raw = hex::decode(token.trim()).map_err(|_| CryptoError::Encoding)?;
    let plain = decrypt(secret, &raw)?;
    String::from_utf8(plain).map_err(|_| CryptoError::Encoding)
}

/// Encrypt a request body into its base64 wire form.
pub fn encrypt_body(secret: &str, body: &[u8]) -> Result<String, CryptoError> {
    encrypt(secret, body).map(|raw| BASE64.encode(raw))
}

/// Decrypt a base64 request body.
pub fn decrypt_body(secret: &str, body: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let trimmed = body.trim_ascii();
    let raw = BASE64.decode(trimmed).map_err(|_| CryptoError::Encoding)?;
    decrypt(secret, &raw)
}

fn cipher_for(secret: &str) -> Result<Aes256Gcm, CryptoError> {
    let key = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::Encrypt)
}
