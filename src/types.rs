//! Shared data types threaded through the handshake and packet layers.

use secp256k1::SecretKey;

/// The four-byte magic that opens a connection, selecting which network's
/// parameters apply. Only `Regtest` is exercised by the handshake's own
/// constants (`HKDF_SALT`, `V1_PREFIX`); the others are carried for
/// completeness of the test-peer's network selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NetworkMagic {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl NetworkMagic {
    pub fn bytes(self) -> [u8; 4] {
        match self {
            NetworkMagic::Mainnet => [0xF9, 0xBE, 0xB4, 0xD9],
            NetworkMagic::Testnet => [0x0B, 0x11, 0x09, 0x07],
            NetworkMagic::Signet => [0x0A, 0x03, 0xCF, 0x40],
            NetworkMagic::Regtest => [0xFA, 0xBF, 0xB5, 0xDA],
        }
    }
}

/// Your role in the handshake. Determines ECDH argument order and which
/// derived subkeys are used for sending versus receiving (section 4.8).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandshakeRole {
    Initiator,
    Responder,
}

/// The ephemeral ECDH keypair generated for one handshake attempt.
#[derive(Clone)]
pub struct EcdhPoint {
    pub(crate) secret_key: SecretKey,
    pub(crate) ellswift_encoding: [u8; 64],
}

/// All keys and terminators derived from the ECDH shared secret via HKDF.
#[derive(Clone)]
pub struct SessionKeyMaterial {
    /// Opaque identifier for this session, shared by both peers.
    pub session_id: [u8; 32],
    pub(crate) initiator_length_key: [u8; 32],
    pub(crate) initiator_packet_key: [u8; 32],
    pub(crate) responder_length_key: [u8; 32],
    pub(crate) responder_packet_key: [u8; 32],
    pub(crate) initiator_garbage_terminator: [u8; 16],
    pub(crate) responder_garbage_terminator: [u8; 16],
}

/// A message delivered from the peer once the session is established. A
/// decoy packet (the ignore bit set) surfaces as `message: None`.
#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    pub message: Option<Vec<u8>>,
}
