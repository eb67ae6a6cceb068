//! AES-256-GCM sealing of stored values.
//!
//! Every value is sealed with a fresh random 96-bit nonce and encoded as
//! `base64(nonce || ciphertext || tag)` so it can live in a JSON document.

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use ring::aead::NONCE_LEN;
use ring::rand::{SecureRandom, SystemRandom};

use crate::traits::CredentialsError;

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

/// Yields exactly one nonce, so each sealing key is used once.
struct SingleNonce(Option<[u8; NONCE_LEN]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

fn crypto_err(reason: &str) -> CredentialsError {
    CredentialsError::Crypto(reason.to_string())
}

/// Generate a random 256-bit key.
pub fn generate_key() -> Result<[u8; KEY_LEN], CredentialsError> {
    let mut key = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| crypto_err("failed to generate key"))?;
    Ok(key)
}

/// Encrypt `plaintext` and return the encoded sealed value.
pub fn seal(plaintext: &str, key: &[u8; KEY_LEN]) -> Result<String, CredentialsError> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| crypto_err("failed to generate nonce"))?;

    let unbound = UnboundKey::new(AEAD_ALG, key).map_err(|_| crypto_err("invalid key"))?;
    let mut sealing_key = SealingKey::new(unbound, SingleNonce(Some(nonce)));

    let mut in_out = plaintext.as_bytes().to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| crypto_err("seal failed"))?;

    let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&in_out);
    Ok(STANDARD.encode(out))
}

/// Decrypt an encoded sealed value.
pub fn open(encoded: &str, key: &[u8; KEY_LEN]) -> Result<String, CredentialsError> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| CredentialsError::Serialization(e.to_string()))?;
    if raw.len() < NONCE_LEN {
        return Err(crypto_err("sealed value too short"));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(nonce_bytes);

    let unbound = UnboundKey::new(AEAD_ALG, key).map_err(|_| crypto_err("invalid key"))?;
    let mut opening_key = OpeningKey::new(unbound, SingleNonce(Some(nonce)));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| crypto_err("authentication failed, wrong key or corrupted data"))?;

    String::from_utf8(plaintext.to_vec()).map_err(|e| CredentialsError::Serialization(e.to_string()))
}
