//! SecurityGate: turns an optionally end-to-end-encrypted payload into a
//! plaintext working file and guarantees the plaintext is wiped afterwards.
//!
//! Payload layout (produced by the uploading client):
//! `salt[16] || iv[12] || ciphertext`. Key = PBKDF2-HMAC-SHA256 over the
//! passphrase with the embedded salt, 100_000 iterations, 32 bytes.
//! Cipher = AES-256-GCM with empty AAD.

use crate::error::FatalError;
use anyhow::{Context, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = NONCE_LEN; // 12
const PBKDF2_ITERATIONS: NonZeroU32 = NonZeroU32::new(100_000).unwrap();
const KEY_LEN: usize = 32;

/// A plaintext working file. When the gate had to decrypt, the file is owned
/// here and removed on drop; a pass-through input is left alone.
#[derive(Debug)]
pub struct Plaintext {
    path: PathBuf,
    owned: bool,
}

impl Plaintext {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Plaintext {
    fn drop(&mut self) {
        if self.owned {
            match std::fs::remove_file(&self.path) {
                Ok(()) => info!("plaintext working file wiped: {}", self.path.display()),
                Err(err) => warn!(
                    "failed to wipe plaintext {}: {err}",
                    self.path.display()
                ),
            }
        }
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ITERATIONS,
        salt,
        passphrase.as_bytes(),
        &mut key,
    );
    key
}

/// Decrypts `input` if it carries the `.enc` suffix, otherwise returns it
/// unchanged with zero copies. Any decryption problem is a hard
/// `FatalError::Decryption`: ciphertext is never handed on as a document.
pub fn decrypt(input: &Path, passphrase: Option<&str>) -> Result<Plaintext> {
    if !crate::job::is_encrypted(input) {
        return Ok(Plaintext {
            path: input.to_path_buf(),
            owned: false,
        });
    }

    let passphrase = passphrase.ok_or_else(|| {
        FatalError::Decryption("encrypted input but no passphrase supplied".into())
    })?;

    let data = std::fs::read(input)
        .with_context(|| format!("reading encrypted payload: {}", input.display()))?;
    let plain = open_payload(&data, passphrase).map_err(anyhow::Error::from)?;

    let out_path = plaintext_path(input);
    std::fs::write(&out_path, &plain)
        .with_context(|| format!("writing plaintext: {}", out_path.display()))?;
    info!("decryption ok: {} bytes of plaintext", plain.len());

    Ok(Plaintext {
        path: out_path,
        owned: true,
    })
}

/// Authenticated decryption of a raw `salt || iv || ciphertext` payload.
pub fn open_payload(data: &[u8], passphrase: &str) -> std::result::Result<Vec<u8>, FatalError> {
    if data.len() <= SALT_LEN + IV_LEN {
        return Err(FatalError::Decryption(format!(
            "payload too short: {} bytes",
            data.len()
        )));
    }
    let (salt, rest) = data.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);

    let key = derive_key(passphrase, salt);
    let unbound = UnboundKey::new(&AES_256_GCM, &key)
        .map_err(|_| FatalError::Decryption("key setup failed".into()))?;
    let key = LessSafeKey::new(unbound);
    let nonce = Nonce::try_assume_unique_for_key(iv)
        .map_err(|_| FatalError::Decryption("bad IV length".into()))?;

    let mut in_out = ciphertext.to_vec();
    let plain = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| FatalError::Decryption("authentication failed (wrong key or tampered payload)".into()))?;
    Ok(plain.to_vec())
}

/// Seals plaintext into the same `salt || iv || ciphertext` layout the gate
/// consumes. Used for fixtures and local tooling; production payloads are
/// sealed by the uploading client.
pub fn seal_payload(plain: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill(&mut salt)
        .map_err(|_| anyhow::anyhow!("rng failure"))?;
    rng.fill(&mut iv).map_err(|_| anyhow::anyhow!("rng failure"))?;

    let key = derive_key(passphrase, &salt);
    let unbound =
        UnboundKey::new(&AES_256_GCM, &key).map_err(|_| anyhow::anyhow!("key setup failed"))?;
    let key = LessSafeKey::new(unbound);
    let nonce =
        Nonce::try_assume_unique_for_key(&iv).map_err(|_| anyhow::anyhow!("bad IV length"))?;

    let mut in_out = plain.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| anyhow::anyhow!("seal failed"))?;

    let mut out = Vec::with_capacity(SALT_LEN + IV_LEN + in_out.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// `report.pdf.enc` decrypts next to itself as `report.pdf`.
fn plaintext_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("payload.enc");
    let stripped = name.strip_suffix(".enc").unwrap_or(name);
    input.with_file_name(stripped)
}
