//! Packet framing and the resumable decryption loop (BIP 324 section
//! "Packet encryption and decryption pseudocode").
//!
//! Each packet is `enc_len[3] ‖ aead_body[1 + contents_len + 16]`. Decryption
//! is resumable: [`PacketReader::decrypt`] remembers whether it is still
//! waiting on the length field or the body, so callers can drive it from an
//! arbitrarily chunked byte stream.

use crate::error::Error;
use crate::fschacha20poly1305::{FSChaCha20, FSChaCha20Poly1305};

const HEADER_LEN: usize = 1;
const LENGTH_FIELD_LEN: usize = 3;
const CHACHA20POLY1305_EXPANSION: usize = 16;
const IGNORE_BIT: u8 = 0x80;
const MAX_CONTENTS_LEN: usize = (1 << 24) - 1;

/// The sender side of an established session: wraps contents in a packet
/// header, encrypts the body, and encrypts the length field.
pub struct PacketWriter {
    send_length_cipher: FSChaCha20,
    send_body_cipher: FSChaCha20Poly1305,
}

impl PacketWriter {
    pub(crate) fn new(length_key: [u8; 32], body_key: [u8; 32]) -> Self {
        PacketWriter {
            send_length_cipher: FSChaCha20::new(length_key),
            send_body_cipher: FSChaCha20Poly1305::new(body_key),
        }
    }

    /// Encrypt `contents` as a packet, optionally flagged as a decoy
    /// (`ignore`) that the receiver will authenticate but discard.
    pub fn encrypt(&mut self, contents: &[u8], aad: &[u8], ignore: bool) -> Result<Vec<u8>, Error> {
        if contents.len() > MAX_CONTENTS_LEN {
            return Err(Error::ProtocolViolation);
        }
        let header = if ignore { IGNORE_BIT } else { 0 };
        let mut plaintext = Vec::with_capacity(HEADER_LEN + contents.len());
        plaintext.push(header);
        plaintext.extend_from_slice(contents);
        let body_ciphertext = self.send_body_cipher.encrypt(aad, &plaintext);

        let mut length_field = (contents.len() as u32).to_le_bytes()[..3].to_vec();
        self.send_length_cipher.crypt(&mut length_field);

        let mut out = length_field;
        out.extend_from_slice(&body_ciphertext);
        Ok(out)
    }
}

/// Tracks whether the next bytes to consume are a length field or a body,
/// replacing the `contents_len == -1` sentinel from the reference pseudocode
/// with an explicit two-state enum.
enum ReaderState {
    AwaitingLength,
    AwaitingBody { contents_len: usize },
}

/// The receiver side of an established session.
pub struct PacketReader {
    recv_length_cipher: FSChaCha20,
    recv_body_cipher: FSChaCha20Poly1305,
    state: ReaderState,
}

/// The result of a single resumable decrypt attempt.
pub enum DecryptOutcome {
    /// Not enough bytes buffered for the next step; none consumed.
    NeedMore,
    /// A full packet was consumed. `payload` is `None` for a decoy packet.
    Packet { consumed: usize, payload: Option<Vec<u8>> },
}

impl PacketReader {
    pub(crate) fn new(length_key: [u8; 32], body_key: [u8; 32]) -> Self {
        PacketReader {
            recv_length_cipher: FSChaCha20::new(length_key),
            recv_body_cipher: FSChaCha20Poly1305::new(body_key),
            state: ReaderState::AwaitingLength,
        }
    }

    /// Attempt to decrypt one packet out of the front of `buffer`. Returns
    /// how many bytes were consumed; callers should advance their buffer by
    /// that amount regardless of whether a payload was produced.
    pub fn decrypt(&mut self, buffer: &[u8], aad: &[u8]) -> Result<DecryptOutcome, Error> {
        if let ReaderState::AwaitingLength = self.state {
            if buffer.len() < LENGTH_FIELD_LEN {
                return Ok(DecryptOutcome::NeedMore);
            }
            let mut length_field = buffer[..LENGTH_FIELD_LEN].to_vec();
            self.recv_length_cipher.crypt(&mut length_field);
            let contents_len =
                u32::from_le_bytes([length_field[0], length_field[1], length_field[2], 0]) as usize;
            if contents_len > MAX_CONTENTS_LEN {
                return Err(Error::ProtocolViolation);
            }
            self.state = ReaderState::AwaitingBody { contents_len };
        }

        let contents_len = match self.state {
            ReaderState::AwaitingBody { contents_len } => contents_len,
            ReaderState::AwaitingLength => unreachable!("just transitioned above"),
        };

        let body_len = HEADER_LEN + contents_len + CHACHA20POLY1305_EXPANSION;
        if buffer.len() < LENGTH_FIELD_LEN + body_len {
            return Ok(DecryptOutcome::NeedMore);
        }

        let body_ciphertext = &buffer[LENGTH_FIELD_LEN..LENGTH_FIELD_LEN + body_len];
        let plaintext = self
            .recv_body_cipher
            .decrypt(aad, body_ciphertext)
            .map_err(|_| Error::AuthFailure)?;
        let header = plaintext[0];
        if header & !IGNORE_BIT != 0 {
            return Err(Error::ProtocolViolation);
        }
        let is_decoy = header & IGNORE_BIT != 0;

        self.state = ReaderState::AwaitingLength;
        Ok(DecryptOutcome::Packet {
            consumed: LENGTH_FIELD_LEN + body_len,
            payload: if is_decoy {
                None
            } else {
                Some(plaintext[HEADER_LEN..].to_vec())
            },
        })
    }
}

/// The paired reader/writer for an established v2 session, returned once the
/// handshake completes.
pub struct PacketHandler {
    pub writer: PacketWriter,
    pub reader: PacketReader,
    /// Opaque per-session identifier derived during the handshake; equal on
    /// both peers, for higher layers that want to bind it to e.g. a log line.
    pub session_id: [u8; 32],
}

impl PacketHandler {
    pub(crate) fn new(writer: PacketWriter, reader: PacketReader, session_id: [u8; 32]) -> Self {
        PacketHandler { writer, reader, session_id }
    }

    /// Split into independently-owned halves, e.g. to hand to separate
    /// socket read/write tasks.
    pub fn split(self) -> (PacketReader, PacketWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler_pair() -> (PacketHandler, PacketHandler) {
        let a_to_b_length = [1u8; 32];
        let a_to_b_body = [2u8; 32];
        let b_to_a_length = [3u8; 32];
        let b_to_a_body = [4u8; 32];
        let a = PacketHandler::new(
            PacketWriter::new(a_to_b_length, a_to_b_body),
            PacketReader::new(b_to_a_length, b_to_a_body),
            [0u8; 32],
        );
        let b = PacketHandler::new(
            PacketWriter::new(b_to_a_length, b_to_a_body),
            PacketReader::new(a_to_b_length, a_to_b_body),
            [0u8; 32],
        );
        (a, b)
    }

    #[test]
    fn roundtrip_whole_buffer() {
        let (mut a, mut b) = handler_pair();
        let packet = a.writer.encrypt(b"hello", b"", false).unwrap();
        match b.reader.decrypt(&packet, b"").unwrap() {
            DecryptOutcome::Packet { consumed, payload } => {
                assert_eq!(consumed, packet.len());
                assert_eq!(payload.unwrap(), b"hello");
            }
            DecryptOutcome::NeedMore => panic!("expected a full packet"),
        }
    }

    #[test]
    fn roundtrip_byte_at_a_time() {
        let (mut a, mut b) = handler_pair();
        let packet = a.writer.encrypt(b"chunked delivery", b"", false).unwrap();
        let mut delivered = Vec::new();
        let mut result = None;
        for byte in &packet {
            delivered.push(*byte);
            match b.reader.decrypt(&delivered, b"").unwrap() {
                DecryptOutcome::NeedMore => continue,
                DecryptOutcome::Packet { consumed, payload } => {
                    assert_eq!(consumed, delivered.len());
                    result = Some(payload);
                    break;
                }
            }
        }
        assert_eq!(result.unwrap().unwrap(), b"chunked delivery");
    }

    #[test]
    fn decoy_packet_yields_no_payload_but_is_consumed() {
        let (mut a, mut b) = handler_pair();
        let decoy = a.writer.encrypt(b"ignored contents", b"", true).unwrap();
        match b.reader.decrypt(&decoy, b"").unwrap() {
            DecryptOutcome::Packet { consumed, payload } => {
                assert_eq!(consumed, decoy.len());
                assert!(payload.is_none());
            }
            DecryptOutcome::NeedMore => panic!("expected a full packet"),
        }
    }

    #[test]
    fn tampered_packet_is_rejected() {
        let (mut a, mut b) = handler_pair();
        let mut packet = a.writer.encrypt(b"hello", b"", false).unwrap();
        *packet.last_mut().unwrap() ^= 1;
        assert!(b.reader.decrypt(&packet, b"").is_err());
    }
}
