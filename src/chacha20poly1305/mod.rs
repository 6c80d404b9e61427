//! ChaCha20-Poly1305 AEAD construction (RFC 8439 section 2.8), built from the
//! raw [`chacha20`] block function and [`poly1305`] authenticator. This is
//! the base construction that [`crate::fschacha20poly1305`] wraps with
//! BIP-324's forward-secure rekeying.

pub mod chacha20;
pub mod poly1305;

use chacha20::chacha20_block;
use poly1305::Poly1305;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The authentication tag did not match during decryption.
    InvalidTag,
}

fn chacha20_xor(key: &[u8; 32], nonce: &[u8; 12], data: &mut [u8]) {
    for (i, block) in data.chunks_mut(64).enumerate() {
        let keystream = chacha20_block(key, nonce, i as u32 + 1);
        for (byte, ks) in block.iter_mut().zip(keystream.iter()) {
            *byte ^= ks;
        }
    }
}

fn poly1305_key(key: &[u8; 32], nonce: &[u8; 12]) -> [u8; 32] {
    let block0 = chacha20_block(key, nonce, 0);
    let mut poly_key = [0u8; 32];
    poly_key.copy_from_slice(&block0[..32]);
    poly_key
}

fn compute_tag(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], ciphertext: &[u8]) -> [u8; 16] {
    let poly_key = poly1305_key(key, nonce);
    let mut poly = Poly1305::new(&poly_key);
    poly.add(aad, true);
    poly.add(ciphertext, true);
    let mut lengths = [0u8; 16];
    lengths[..8].copy_from_slice(&(aad.len() as u64).to_le_bytes());
    lengths[8..].copy_from_slice(&(ciphertext.len() as u64).to_le_bytes());
    poly.add(&lengths, false);
    poly.tag()
}

/// Encrypt `plaintext` in place, returning it with a 16-byte tag appended.
pub fn encrypt(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut ciphertext = plaintext.to_vec();
    chacha20_xor(key, nonce, &mut ciphertext);
    let tag = compute_tag(key, nonce, aad, &ciphertext);
    ciphertext.extend_from_slice(&tag);
    ciphertext
}

/// Decrypt and verify `ciphertext` (with its trailing 16-byte tag). Returns
/// `Err(Error::InvalidTag)` without producing any plaintext on mismatch.
pub fn decrypt(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < 16 {
        return Err(Error::InvalidTag);
    }
    let msg_len = ciphertext.len() - 16;
    let (body, received_tag) = ciphertext.split_at(msg_len);
    let expected_tag = compute_tag(key, nonce, aad, body);
    // Not constant-time; this is a test-only implementation (see crate docs).
    if expected_tag != received_tag {
        return Err(Error::InvalidTag);
    }
    let mut plaintext = body.to_vec();
    chacha20_xor(key, nonce, &mut plaintext);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [7u8; 32];
        let nonce = [1u8; 12];
        let aad = b"associated data";
        let plaintext = b"a secret message that spans more than one block of keystream!!";
        let ciphertext = encrypt(&key, &nonce, aad, plaintext);
        let decrypted = decrypt(&key, &nonce, aad, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn bitflip_in_ciphertext_fails() {
        let key = [7u8; 32];
        let nonce = [1u8; 12];
        let aad = b"aad";
        let mut ciphertext = encrypt(&key, &nonce, aad, b"hello world");
        ciphertext[0] ^= 1;
        assert_eq!(decrypt(&key, &nonce, aad, &ciphertext), Err(Error::InvalidTag));
    }

    #[test]
    fn bitflip_in_aad_fails() {
        let key = [7u8; 32];
        let nonce = [1u8; 12];
        let ciphertext = encrypt(&key, &nonce, b"aad", b"hello world");
        assert_eq!(decrypt(&key, &nonce, b"aaX", &ciphertext), Err(Error::InvalidTag));
    }

    // RFC 8439 section 2.8.2 test vector.
    #[test]
    fn rfc8439_vector() {
        let key = {
            let mut k = [0u8; 32];
            for (i, b) in k.iter_mut().enumerate() {
                *b = 0x80 + i as u8;
            }
            k
        };
        let nonce = [0x07, 0x00, 0x00, 0x00, 0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47];
        let aad = hex::decode("50515253c0c1c2c3c4c5c6c7").unwrap();
        let plaintext = b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.";
        let ciphertext = encrypt(&key, &nonce, &aad, plaintext);
        let expected_ct = hex::decode(concat!(
            "d31a8d34648e60db7b86afbc53ef7ec2",
            "a4aded51296e08fea9e2b5a736ee62d6",
            "3dbea45e8ca9671282fafb69da92728b",
            "1a71de0a9e060b2905d6a5b67ecd3b36",
            "92ddbd7f2d778b8c9803aee328091b58",
            "fab324e4fad675945585808b4831d7bc",
            "3ff4def08e4b7a9de576d26586cec64b",
            "6116"
        ))
        .unwrap();
        let expected_tag = hex::decode("1ae10b594f09e26a7e902ecbd0600691").unwrap();
        assert_eq!(&ciphertext[..ciphertext.len() - 16], &expected_ct[..]);
        assert_eq!(&ciphertext[ciphertext.len() - 16..], &expected_tag[..]);
    }
}
