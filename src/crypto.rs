// MIT License - Copyright (c) 2026 Peter Wright
// Session cipher and message checksum

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use tracing::debug;

use crate::constants::{BLOCK_LEN, CRC_POLY, SESSION_ID_LEN};
use crate::error::{OmniError, Result};

/// Derive the per-connection session key.
///
/// The last five bytes of the pre-shared key are XORed with the five bytes of
/// session material the controller hands out in its AckNewSession.
pub fn derive_session_key(private_key: &[u8; 16], session_id: &[u8; SESSION_ID_LEN]) -> [u8; 16] {
    let mut key = *private_key;
    let offset = key.len() - SESSION_ID_LEN;
    for (k, s) in key[offset..].iter_mut().zip(session_id) {
        *k ^= s;
    }
    key
}

/// CRC-16 over `data`: reflected polynomial 0xA001, initial value 0,
/// eight shift rounds per byte.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// AES-128 engine for OmniMessage payloads.
///
/// Each 16-byte block has its first two bytes XORed with the packet sequence
/// number (high byte, then low byte) before encryption, which binds the
/// ciphertext to one packet. The final partial block is zero padded.
pub struct OmniCrypt {
    cipher: Aes128,
}

impl OmniCrypt {
    pub fn new(key: &[u8; 16]) -> Self {
        debug!("Session cipher initialised");
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
        }
    }

    /// Encrypt `plaintext` for the packet carrying `sequence`.
    pub fn encrypt(&self, plaintext: &[u8], sequence: u16) -> Vec<u8> {
        let padded_len = plaintext.len().div_ceil(BLOCK_LEN).max(1) * BLOCK_LEN;
        let mut buf = plaintext.to_vec();
        buf.resize(padded_len, 0);

        let [hi, lo] = sequence.to_be_bytes();
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            block[0] ^= hi;
            block[1] ^= lo;
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        buf
    }

    /// Decrypt a payload received in the packet carrying `sequence`.
    ///
    /// The result keeps the zero padding; the message length byte says how
    /// much of it is meaningful.
    pub fn decrypt(&self, ciphertext: &[u8], sequence: u16) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(OmniError::malformed(format!(
                "encrypted payload of {} bytes is not a whole number of blocks",
                ciphertext.len()
            )));
        }

        let [hi, lo] = sequence.to_be_bytes();
        let mut buf = ciphertext.to_vec();
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
            block[0] ^= hi;
            block[1] ^= lo;
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for OmniCrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmniCrypt").finish_non_exhaustive()
    }
}
