//! Cryptography module for reading counter-mode encrypted bundles.
//!
//! The key schedule is a SHA-1 based stretch that is *not* PBKDF1/PBKDF2: it
//! has to match the external packing tool byte for byte, quirks included.
//!
//! ```text
//! hash0 = SHA1(password || salt)
//! hashN = SHA1^(iterations - 2)(hash0)
//! seed  = SHA1(hashN) || SHA1('1' || hashN) || SHA1('2' || hashN) || ...
//! key   = seed[..key_length]
//! ```
//!
//! The keystream is AES in single-block mode over a 16-byte counter block whose
//! first eight bytes hold a little-endian block counter starting at 1 and whose
//! last eight bytes are zero.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha1_smol::Sha1;

use crate::error::{AssetError, Result};

pub const DEFAULT_KEY_LENGTH: usize = 32;
pub const DEFAULT_ITERATIONS: u32 = 100;

const BLOCK_SIZE: usize = 16;
// Buffers above this size are split across the rayon pool.
const PARALLEL_CHUNK: usize = 64 * 1024;

/// Signatures of bundles that are stored in the clear.
const PLAIN_SIGNATURES: [&[u8]; 4] = [b"UnityFS", b"UnityWeb", b"UnityRaw", b"UnityArchive"];

/// Key schedule parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherOptions {
    pub key_length: usize,
    pub iterations: u32,
}

impl Default for CipherOptions {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Password and salt for the encrypted bundle variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionKey {
    pub password: String,
    pub salt: Vec<u8>,
}

impl DecryptionKey {
    pub fn new(password: impl Into<String>, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            password: password.into(),
            salt: salt.into(),
        }
    }
}

fn sha1_concat(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.digest().bytes()
}

/// Derives `key_length` bytes of key material from `password` and `salt`.
///
/// `iterations` must be at least 2.
pub fn derive_key(password: &str, salt: &[u8], key_length: usize, iterations: u32) -> Result<Vec<u8>> {
    if iterations < 2 {
        return Err(AssetError::InvalidOptions(format!(
            "iteration count must be at least 2, got {iterations}"
        )));
    }

    let mut hash = sha1_concat(&[password.as_bytes(), salt]);
    for _ in 0..iterations - 2 {
        hash = sha1_concat(&[&hash[..]]);
    }

    let mut seed = Vec::with_capacity(key_length + 20);
    seed.extend_from_slice(&sha1_concat(&[&hash[..]]));

    let mut marker: u8 = 1;
    while seed.len() < key_length {
        let prefix = [marker.wrapping_add(48)];
        seed.extend_from_slice(&sha1_concat(&[&prefix[..], &hash[..]]));
        marker = marker.wrapping_add(1);
    }

    seed.truncate(key_length);
    Ok(seed)
}

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(key: &[u8]) -> Result<Self> {
        let invalid = |_| AssetError::Decryption(format!("cannot build AES cipher from a {}-byte key", key.len()));
        match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            n => Err(AssetError::Decryption(format!(
                "unsupported key length {n}; expected 16, 24 or 32 bytes"
            ))),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// A seekable counter-mode keystream bound to one derived key.
pub struct Keystream {
    cipher: BlockCipher,
}

impl Keystream {
    pub fn new(password: &str, salt: &[u8], options: CipherOptions) -> Result<Self> {
        let key = derive_key(password, salt, options.key_length, options.iterations)?;
        Ok(Self {
            cipher: BlockCipher::new(&key)?,
        })
    }

    /// XORs the keystream into `data`, treating `data[0]` as the first byte of
    /// block number `first_block` (zero-based).
    pub fn apply(&self, data: &mut [u8], first_block: u64) {
        for (i, chunk) in data.chunks_mut(BLOCK_SIZE).enumerate() {
            let block = self.block(first_block + i as u64);
            for (byte, key) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= key;
            }
        }
    }

    /// Same as [`apply`](Self::apply) over the whole buffer, fanned out across the rayon pool.
    pub fn apply_parallel(&self, data: &mut [u8]) {
        if data.len() <= PARALLEL_CHUNK {
            self.apply(data, 0);
            return;
        }
        let blocks_per_chunk = (PARALLEL_CHUNK / BLOCK_SIZE) as u64;
        data.par_chunks_mut(PARALLEL_CHUNK)
            .enumerate()
            .for_each(|(i, chunk)| self.apply(chunk, i as u64 * blocks_per_chunk));
    }

    fn block(&self, index: u64) -> Block {
        let mut block = Block::default();
        block[..8].copy_from_slice(&(index + 1).to_le_bytes());
        self.cipher.encrypt_block(&mut block);
        block
    }
}

/// Decrypts `ciphertext`; the output has the same length as the input.
pub fn decrypt(ciphertext: &[u8], password: &str, salt: &[u8], options: CipherOptions) -> Result<Vec<u8>> {
    let keystream = Keystream::new(password, salt, options)?;
    let mut out = ciphertext.to_vec();
    keystream.apply_parallel(&mut out);
    Ok(out)
}

/// Counter mode is symmetric; encryption is the same transform.
pub fn encrypt(plaintext: &[u8], password: &str, salt: &[u8], options: CipherOptions) -> Result<Vec<u8>> {
    decrypt(plaintext, password, salt, options)
}

/// True when `data` starts with one of the known clear-text bundle signatures.
pub fn is_plain_bundle(data: &[u8]) -> bool {
    PLAIN_SIGNATURES.iter().any(|sig| data.starts_with(sig))
}
