//! Forward-secure ciphers built on top of [`crate::chacha20poly1305`].
//!
//! `FSChaCha20` wraps the raw ChaCha20 stream with the nonce/rekey schedule
//! BIP 324 uses for the 3-byte length field; `FSChaCha20Poly1305` does the
//! same for the AEAD-protected packet body. Both irreversibly advance their
//! key every [`REKEY_INTERVAL`] uses so a compromise of a later key cannot
//! be used to decrypt earlier traffic.

use crate::chacha20poly1305::chacha20::chacha20_block;
use crate::chacha20poly1305::{self as aead};

/// Number of chunks/packets between rekeys, fixed by BIP 324.
pub const REKEY_INTERVAL: u32 = 224;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    InvalidTag,
}

impl From<aead::Error> for Error {
    fn from(_: aead::Error) -> Self {
        Error::InvalidTag
    }
}

/// Forward-secure (unauthenticated) stream cipher used for the packet length
/// field. Keystream bytes are generated 64 at a time and buffered across
/// calls, since `crypt` is always invoked with 3-byte chunks that don't line
/// up with ChaCha20's 64-byte blocks.
#[derive(Clone, Debug)]
pub struct FSChaCha20 {
    key: [u8; 32],
    block_counter: u32,
    chunk_counter: u32,
    keystream: Vec<u8>,
}

impl FSChaCha20 {
    pub fn new(key: [u8; 32]) -> Self {
        FSChaCha20 {
            key,
            block_counter: 0,
            chunk_counter: 0,
            keystream: Vec::new(),
        }
    }

    fn epoch_nonce(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        let epoch = (self.chunk_counter / REKEY_INTERVAL) as u64;
        nonce[4..12].copy_from_slice(&epoch.to_le_bytes());
        nonce
    }

    fn fill_keystream(&mut self, n: usize) {
        let nonce = self.epoch_nonce();
        while self.keystream.len() < n {
            self.keystream
                .extend_from_slice(&chacha20_block(&self.key, &nonce, self.block_counter));
            self.block_counter += 1;
        }
    }

    fn take_keystream(&mut self, n: usize) -> Vec<u8> {
        self.fill_keystream(n);
        self.keystream.drain(..n).collect()
    }

    /// XOR `chunk` in place with the next `chunk.len()` keystream bytes and
    /// advance the chunk counter, rekeying if this was the last chunk of the
    /// current epoch.
    pub fn crypt(&mut self, chunk: &mut [u8]) {
        let ks = self.take_keystream(chunk.len());
        for (byte, k) in chunk.iter_mut().zip(ks.iter()) {
            *byte ^= k;
        }
        if (self.chunk_counter + 1) % REKEY_INTERVAL == 0 {
            let new_key = self.take_keystream(32);
            self.key.copy_from_slice(&new_key);
            self.block_counter = 0;
            self.keystream.clear();
        }
        self.chunk_counter += 1;
    }
}

/// Forward-secure AEAD used for packet bodies.
#[derive(Clone, Debug)]
pub struct FSChaCha20Poly1305 {
    key: [u8; 32],
    packet_counter: u64,
}

impl FSChaCha20Poly1305 {
    pub fn new(key: [u8; 32]) -> Self {
        FSChaCha20Poly1305 {
            key,
            packet_counter: 0,
        }
    }

    fn nonce(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&((self.packet_counter % REKEY_INTERVAL as u64) as u32).to_le_bytes());
        nonce[4..12].copy_from_slice(&(self.packet_counter / REKEY_INTERVAL as u64).to_le_bytes());
        nonce
    }

    fn rekey_if_due(&mut self, nonce: &[u8; 12]) {
        if (self.packet_counter + 1) % REKEY_INTERVAL as u64 == 0 {
            let mut rekey_nonce = [0u8; 12];
            rekey_nonce[..4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
            rekey_nonce[4..12].copy_from_slice(&nonce[4..12]);
            let ciphertext = aead::encrypt(&self.key, &rekey_nonce, &[], &[0u8; 32]);
            self.key.copy_from_slice(&ciphertext[..32]);
        }
        self.packet_counter += 1;
    }

    pub fn encrypt(&mut self, aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let nonce = self.nonce();
        let ciphertext = aead::encrypt(&self.key, &nonce, aad, plaintext);
        self.rekey_if_due(&nonce);
        ciphertext
    }

    pub fn decrypt(&mut self, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = self.nonce();
        let plaintext = aead::decrypt(&self.key, &nonce, aad, ciphertext)?;
        self.rekey_if_due(&nonce);
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fschacha20_roundtrip_across_rekey() {
        let mut sender = FSChaCha20::new([1u8; 32]);
        let mut receiver = FSChaCha20::new([1u8; 32]);
        for i in 0..(REKEY_INTERVAL * 2 + 1) {
            let mut chunk = (i as u32).to_le_bytes()[..3].to_vec();
            let plain = chunk.clone();
            sender.crypt(&mut chunk);
            receiver.crypt(&mut chunk);
            assert_eq!(chunk, plain);
        }
    }

    #[test]
    fn fschacha20poly1305_rekey_changes_key_every_interval() {
        let mut sender = FSChaCha20Poly1305::new([2u8; 32]);
        let mut receiver = FSChaCha20Poly1305::new([2u8; 32]);
        let mut last_ciphertext = Vec::new();
        for i in 0..=REKEY_INTERVAL {
            let pt = format!("packet {i}");
            let ct = sender.encrypt(b"", pt.as_bytes());
            let decrypted = receiver.decrypt(b"", &ct).unwrap();
            assert_eq!(decrypted, pt.as_bytes());
            if i == REKEY_INTERVAL {
                last_ciphertext = ct;
            }
        }
        // Packet REKEY_INTERVAL is encrypted under the post-rekey key, distinct
        // from whatever packet 0 would have produced with the same plaintext.
        let mut fresh = FSChaCha20Poly1305::new([2u8; 32]);
        let first_ct = fresh.encrypt(b"", format!("packet {REKEY_INTERVAL}").as_bytes());
        assert_ne!(first_ct, last_ciphertext);
    }

    #[test]
    fn tampered_packet_fails_to_decrypt() {
        let mut sender = FSChaCha20Poly1305::new([3u8; 32]);
        let mut receiver = FSChaCha20Poly1305::new([3u8; 32]);
        let mut ct = sender.encrypt(b"", b"hello");
        ct[0] ^= 1;
        assert!(receiver.decrypt(b"", &ct).is_err());
    }
}
