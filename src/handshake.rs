//! The v2 handshake state machine (BIP 324 "Overall handshake pseudocode").
//!
//! Modeled as the sum type the design notes call for -- `Handshake::state`
//! moves strictly forward through
//! `ScanningPrefix -> AwaitingTheirKey -> AwaitingAuth -> Established`
//! (initiators skip the first state, since only a responder needs to watch
//! for the legacy v1 magic). Each transition is driven by [`Handshake::feed`],
//! which consumes whatever prefix of the caller's buffer it needs and
//! reports how much it used, so it can be resumed across arbitrarily
//! chunked I/O.

use std::mem;

use rand::Rng;

use crate::ellswift::{ellswift_create, ellswift_ecdh_xonly};
use crate::error::Error;
use crate::hkdf::{tagged_hash, Hkdf};
use crate::packet::{DecryptOutcome, PacketHandler, PacketReader, PacketWriter};
use crate::types::{EcdhPoint, HandshakeRole, NetworkMagic, SessionKeyMaterial};

/// Maximum bytes of pre-handshake garbage tolerated before the garbage
/// terminator must have appeared.
const MAX_GARBAGE_LEN: usize = 4095;
const GARBAGE_TERMINATOR_LEN: usize = 16;
const ELLSWIFT_LEN: usize = 64;

fn v1_prefix(magic: NetworkMagic) -> [u8; 16] {
    let mut prefix = [0u8; 16];
    prefix[..4].copy_from_slice(&magic.bytes());
    prefix[4..11].copy_from_slice(b"version");
    prefix
}

fn hkdf_salt(magic: NetworkMagic) -> Vec<u8> {
    let mut salt = b"bitcoin_v2_shared_secret".to_vec();
    salt.extend_from_slice(&magic.bytes());
    salt
}

fn random_garbage() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(0..=MAX_GARBAGE_LEN);
    let mut garbage = vec![0u8; len];
    rng.fill(garbage.as_mut_slice());
    garbage
}

/// HKDF-expand the ECDH shared secret into every subkey BIP 324 defines,
/// before the caller resolves which half belongs to "send" vs "recv".
fn derive_session_keys(magic: NetworkMagic, shared_secret: &[u8; 32]) -> SessionKeyMaterial {
    let salt = hkdf_salt(magic);
    let hkdf = Hkdf::extract(&salt, shared_secret);

    let mut initiator_length_key = [0u8; 32];
    let mut initiator_packet_key = [0u8; 32];
    let mut responder_length_key = [0u8; 32];
    let mut responder_packet_key = [0u8; 32];
    let mut garbage_terminators = [0u8; 32];
    let mut session_id = [0u8; 32];

    hkdf.expand(b"initiator_L", &mut initiator_length_key).expect("32 <= max okm len");
    hkdf.expand(b"initiator_P", &mut initiator_packet_key).expect("32 <= max okm len");
    hkdf.expand(b"responder_L", &mut responder_length_key).expect("32 <= max okm len");
    hkdf.expand(b"responder_P", &mut responder_packet_key).expect("32 <= max okm len");
    hkdf.expand(b"garbage_terminators", &mut garbage_terminators).expect("32 <= max okm len");
    hkdf.expand(b"session_id", &mut session_id).expect("32 <= max okm len");

    let mut initiator_garbage_terminator = [0u8; 16];
    let mut responder_garbage_terminator = [0u8; 16];
    initiator_garbage_terminator.copy_from_slice(&garbage_terminators[..16]);
    responder_garbage_terminator.copy_from_slice(&garbage_terminators[16..]);

    SessionKeyMaterial {
        session_id,
        initiator_length_key,
        initiator_packet_key,
        responder_length_key,
        responder_packet_key,
        initiator_garbage_terminator,
        responder_garbage_terminator,
    }
}

struct ResolvedKeys {
    send_length_key: [u8; 32],
    send_packet_key: [u8; 32],
    send_garbage_terminator: [u8; 16],
    recv_length_key: [u8; 32],
    recv_packet_key: [u8; 32],
    recv_garbage_terminator: [u8; 16],
}

fn resolve_for_role(keys: &SessionKeyMaterial, role: HandshakeRole) -> ResolvedKeys {
    match role {
        HandshakeRole::Initiator => ResolvedKeys {
            send_length_key: keys.initiator_length_key,
            send_packet_key: keys.initiator_packet_key,
            send_garbage_terminator: keys.initiator_garbage_terminator,
            recv_length_key: keys.responder_length_key,
            recv_packet_key: keys.responder_packet_key,
            recv_garbage_terminator: keys.responder_garbage_terminator,
        },
        HandshakeRole::Responder => ResolvedKeys {
            send_length_key: keys.responder_length_key,
            send_packet_key: keys.responder_packet_key,
            send_garbage_terminator: keys.responder_garbage_terminator,
            recv_length_key: keys.initiator_length_key,
            recv_packet_key: keys.initiator_packet_key,
            recv_garbage_terminator: keys.initiator_garbage_terminator,
        },
    }
}

/// What happened on one call to [`Handshake::feed`].
pub enum HandshakeEvent {
    /// Not enough bytes were available; call again once more arrive.
    NeedMore,
    /// Bytes that must be sent to the peer right away.
    Send(Vec<u8>),
    /// The handshake is complete. The session's packet codec follows.
    Done(PacketHandler),
}

enum State {
    /// Responder-only: watching incoming bytes for a full match against the
    /// legacy v1 magic prefix.
    ScanningPrefix { received_prefix: Vec<u8> },
    /// Our ElligatorSwift key has been sent; waiting for the peer's.
    AwaitingTheirKey {
        point: EcdhPoint,
        sent_garbage: Vec<u8>,
        /// Bytes of the peer's key already read during prefix scanning
        /// (responder only; empty for an initiator).
        prefix_carry: Vec<u8>,
    },
    /// Keys are derived and our garbage terminator + version packet sent;
    /// waiting to authenticate the peer's.
    AwaitingAuth {
        reader: PacketReader,
        writer: PacketWriter,
        session_keys: SessionKeyMaterial,
        recv_garbage_terminator: [u8; 16],
        received_garbage: Vec<u8>,
        terminator_found: bool,
        first_packet: bool,
    },
    /// Placeholder used only while a transition is mid-flight via
    /// `mem::replace`; never observed by callers.
    Transitioning,
    Established,
}

/// Drives one side of the v2 handshake to completion.
pub struct Handshake {
    role: HandshakeRole,
    magic: NetworkMagic,
    state: State,
}

impl Handshake {
    /// Start a new handshake. Returns the bytes (if any) that must be sent
    /// immediately: an initiator's ElligatorSwift key and garbage; a
    /// responder has nothing to send until it has seen a mismatching byte.
    pub fn new(magic: NetworkMagic, role: HandshakeRole) -> (Self, Vec<u8>) {
        match role {
            HandshakeRole::Initiator => {
                let (secret_key, ellswift_encoding) = ellswift_create();
                let sent_garbage = random_garbage();
                let mut message = ellswift_encoding.to_vec();
                message.extend_from_slice(&sent_garbage);
                let handshake = Handshake {
                    role,
                    magic,
                    state: State::AwaitingTheirKey {
                        point: EcdhPoint { secret_key, ellswift_encoding },
                        sent_garbage,
                        prefix_carry: Vec::new(),
                    },
                };
                (handshake, message)
            }
            HandshakeRole::Responder => {
                let handshake = Handshake {
                    role,
                    magic,
                    state: State::ScanningPrefix { received_prefix: Vec::new() },
                };
                (handshake, Vec::new())
            }
        }
    }

    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    /// Feed newly available bytes (the full unconsumed tail of the receive
    /// buffer) into the state machine. Returns the number of bytes consumed
    /// -- the caller should drop that many bytes from the front of its
    /// buffer before the next call -- along with what happened.
    pub fn feed(&mut self, data: &[u8]) -> Result<(usize, HandshakeEvent), Error> {
        match mem::replace(&mut self.state, State::Transitioning) {
            State::ScanningPrefix { mut received_prefix } => {
                let prefix = v1_prefix(self.magic);
                let mut consumed = 0;
                for &byte in data {
                    received_prefix.push(byte);
                    consumed += 1;
                    let idx = received_prefix.len() - 1;
                    if received_prefix[idx] != prefix[idx] {
                        let (secret_key, ellswift_encoding) = ellswift_create();
                        let sent_garbage = random_garbage();
                        let mut message = ellswift_encoding.to_vec();
                        message.extend_from_slice(&sent_garbage);
                        self.state = State::AwaitingTheirKey {
                            point: EcdhPoint { secret_key, ellswift_encoding },
                            sent_garbage,
                            prefix_carry: received_prefix,
                        };
                        return Ok((consumed, HandshakeEvent::Send(message)));
                    }
                    if received_prefix.len() == 16 {
                        return Err(Error::V1Fallback);
                    }
                }
                self.state = State::ScanningPrefix { received_prefix };
                Ok((consumed, HandshakeEvent::NeedMore))
            }

            State::AwaitingTheirKey { point, sent_garbage, prefix_carry } => {
                let have = prefix_carry.len();
                let still_needed = ELLSWIFT_LEN - have;
                if data.len() < still_needed {
                    self.state = State::AwaitingTheirKey { point, sent_garbage, prefix_carry };
                    return Ok((0, HandshakeEvent::NeedMore));
                }
                let mut ellswift_theirs = [0u8; ELLSWIFT_LEN];
                ellswift_theirs[..have].copy_from_slice(&prefix_carry);
                ellswift_theirs[have..].copy_from_slice(&data[..still_needed]);

                let ecdh_x = ellswift_ecdh_xonly(&ellswift_theirs, &point.secret_key)?;
                let shared_secret = match self.role {
                    HandshakeRole::Initiator => {
                        let mut msg = point.ellswift_encoding.to_vec();
                        msg.extend_from_slice(&ellswift_theirs);
                        msg.extend_from_slice(&ecdh_x);
                        tagged_hash("bip324_ellswift_xonly_ecdh", &msg)
                    }
                    HandshakeRole::Responder => {
                        let mut msg = ellswift_theirs.to_vec();
                        msg.extend_from_slice(&point.ellswift_encoding);
                        msg.extend_from_slice(&ecdh_x);
                        tagged_hash("bip324_ellswift_xonly_ecdh", &msg)
                    }
                };

                let session_keys = derive_session_keys(self.magic, &shared_secret);
                let resolved = resolve_for_role(&session_keys, self.role);

                let mut writer = PacketWriter::new(resolved.send_length_key, resolved.send_packet_key);
                let reader = PacketReader::new(resolved.recv_length_key, resolved.recv_packet_key);

                let mut outgoing = resolved.send_garbage_terminator.to_vec();
                // Transport version packet: empty contents, no decoys sent by default.
                let version_packet = writer
                    .encrypt(&[], &sent_garbage, false)
                    .expect("empty contents never exceed the length limit");
                outgoing.extend_from_slice(&version_packet);

                self.state = State::AwaitingAuth {
                    reader,
                    writer,
                    session_keys,
                    recv_garbage_terminator: resolved.recv_garbage_terminator,
                    received_garbage: Vec::new(),
                    terminator_found: false,
                    first_packet: true,
                };
                Ok((still_needed, HandshakeEvent::Send(outgoing)))
            }

            State::AwaitingAuth {
                mut reader,
                writer,
                session_keys,
                recv_garbage_terminator,
                mut received_garbage,
                mut terminator_found,
                mut first_packet,
            } => {
                let mut consumed = 0;

                if !terminator_found {
                    for &byte in data {
                        if received_garbage.len() >= MAX_GARBAGE_LEN + GARBAGE_TERMINATOR_LEN {
                            return Err(Error::ProtocolViolation);
                        }
                        received_garbage.push(byte);
                        consumed += 1;
                        if received_garbage.len() >= GARBAGE_TERMINATOR_LEN
                            && received_garbage[received_garbage.len() - GARBAGE_TERMINATOR_LEN..]
                                == recv_garbage_terminator
                        {
                            terminator_found = true;
                            break;
                        }
                    }
                    if !terminator_found {
                        if received_garbage.len() > MAX_GARBAGE_LEN + GARBAGE_TERMINATOR_LEN {
                            return Err(Error::ProtocolViolation);
                        }
                        self.state = State::AwaitingAuth {
                            reader,
                            writer,
                            session_keys,
                            recv_garbage_terminator,
                            received_garbage,
                            terminator_found,
                            first_packet,
                        };
                        return Ok((consumed, HandshakeEvent::NeedMore));
                    }
                }

                let aad: Vec<u8> = {
                    let garbage_len = received_garbage.len() - GARBAGE_TERMINATOR_LEN;
                    received_garbage[..garbage_len].to_vec()
                };

                loop {
                    let remaining = &data[consumed..];
                    let packet_aad = if first_packet { aad.as_slice() } else { &[] };
                    match reader.decrypt(remaining, packet_aad)? {
                        DecryptOutcome::NeedMore => {
                            self.state = State::AwaitingAuth {
                                reader,
                                writer,
                                session_keys,
                                recv_garbage_terminator,
                                received_garbage,
                                terminator_found,
                                first_packet,
                            };
                            return Ok((consumed, HandshakeEvent::NeedMore));
                        }
                        DecryptOutcome::Packet { consumed: pconsumed, payload } => {
                            consumed += pconsumed;
                            first_packet = false;
                            if payload.is_some() {
                                let session_id = session_keys.session_id;
                                self.state = State::Established;
                                return Ok((
                                    consumed,
                                    HandshakeEvent::Done(PacketHandler::new(writer, reader, session_id)),
                                ));
                            }
                            // Decoy packet: authenticated and discarded, keep scanning.
                        }
                    }
                }
            }

            State::Transitioning => unreachable!("never observed outside of feed()"),
            State::Established => {
                self.state = State::Established;
                Ok((0, HandshakeEvent::NeedMore))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_to_completion(
        a: &mut Handshake,
        b: &mut Handshake,
        mut a_to_b: Vec<u8>,
        mut b_to_a: Vec<u8>,
    ) -> (PacketHandler, PacketHandler) {
        let mut a_done = None;
        let mut b_done = None;
        let mut guard = 0;
        loop {
            guard += 1;
            assert!(guard < 10_000, "handshake did not converge");

            if a_done.is_none() {
                let (consumed, event) = a.feed(&b_to_a).unwrap();
                b_to_a.drain(..consumed);
                if let HandshakeEvent::Send(bytes) = event {
                    a_to_b.extend(bytes);
                } else if let HandshakeEvent::Done(ph) = event {
                    a_done = Some(ph);
                }
            }
            if b_done.is_none() {
                let (consumed, event) = b.feed(&a_to_b).unwrap();
                a_to_b.drain(..consumed);
                if let HandshakeEvent::Send(bytes) = event {
                    b_to_a.extend(bytes);
                } else if let HandshakeEvent::Done(ph) = event {
                    b_done = Some(ph);
                }
            }
            if a_done.is_some() && b_done.is_some() {
                return (a_done.unwrap(), b_done.unwrap());
            }
        }
    }

    #[test]
    fn full_handshake_reaches_matching_session_id() {
        let (mut initiator, init_msg) = Handshake::new(NetworkMagic::Regtest, HandshakeRole::Initiator);
        let (mut responder, resp_msg) = Handshake::new(NetworkMagic::Regtest, HandshakeRole::Responder);
        assert!(resp_msg.is_empty());

        let (mut a_ph, mut b_ph) =
            drive_to_completion(&mut initiator, &mut responder, init_msg, resp_msg);

        assert_eq!(a_ph.session_id, b_ph.session_id);
        assert_eq!(a_ph.session_id.len(), 32);

        let ct = a_ph.writer.encrypt(b"ping", b"", false).unwrap();
        match b_ph.reader.decrypt(&ct, b"").unwrap() {
            DecryptOutcome::Packet { payload, .. } => assert_eq!(payload.unwrap(), b"ping"),
            DecryptOutcome::NeedMore => panic!("expected a full packet"),
        }
    }

    #[test]
    fn responder_detects_v1_fallback() {
        let (mut responder, resp_msg) = Handshake::new(NetworkMagic::Regtest, HandshakeRole::Responder);
        assert!(resp_msg.is_empty());
        let v1 = v1_prefix(NetworkMagic::Regtest);
        let err = responder.feed(&v1).unwrap_err();
        assert_eq!(err, Error::V1Fallback);
    }

    #[test]
    fn responder_emits_nothing_while_prefix_still_matches() {
        let (mut responder, _) = Handshake::new(NetworkMagic::Regtest, HandshakeRole::Responder);
        let v1 = v1_prefix(NetworkMagic::Regtest);
        // Feed all but the last byte: still a full prefix match so far.
        let (consumed, event) = responder.feed(&v1[..15]).unwrap();
        assert_eq!(consumed, 15);
        assert!(matches!(event, HandshakeEvent::NeedMore));
    }

    #[test]
    fn responder_switches_to_v2_on_mismatch() {
        let (mut responder, _) = Handshake::new(NetworkMagic::Regtest, HandshakeRole::Responder);
        let mut data = v1_prefix(NetworkMagic::Regtest)[..4].to_vec();
        data.push(0xFF); // mismatching 5th byte
        let (consumed, event) = responder.feed(&data).unwrap();
        assert_eq!(consumed, 5);
        assert!(matches!(event, HandshakeEvent::Send(_)));
    }
}
