//! A synchronous, buffer-driven transport that carries a v2 session from the
//! first byte of the handshake through established packet exchange (BIP 324
//! section "Transport driver").
//!
//! [`Transport`] has no opinion about sockets, executors, or chunk sizes: the
//! caller owns an inbound byte buffer and calls [`Transport::receive`]
//! whenever more bytes arrive, however many that happens to be. This mirrors
//! [`crate::packet::PacketReader::decrypt`] and
//! [`crate::handshake::Handshake::feed`], both of which this type drives
//! internally, and keeps the core reusable from a blocking socket loop or an
//! async task without committing to either (see [`crate::io`] for the latter).

use crate::error::Error;
use crate::handshake::{Handshake, HandshakeEvent};
use crate::packet::{DecryptOutcome, PacketHandler};
use crate::types::{HandshakeRole, NetworkMagic};

enum Inner {
    Handshaking(Handshake),
    Established(PacketHandler),
    /// Set only once [`Transport::receive`] has returned [`Error::V1Fallback`];
    /// any further call is a programmer error, since the caller was told to
    /// stop using the v2 transport.
    Failed,
}

/// Bytes the caller produced while making progress, and messages it received.
#[derive(Default)]
pub struct TransportEvents {
    /// Bytes to write to the peer, in order, if any.
    pub outgoing: Vec<u8>,
    /// Application messages decrypted this call, in order. A decoy packet
    /// does not appear here: it is authenticated and silently discarded.
    pub messages: Vec<Vec<u8>>,
    /// Set once on the call during which the handshake completes.
    pub handshake_complete: bool,
}

/// Drives one side of a v2 connection from handshake through to established
/// packet exchange.
pub struct Transport {
    inner: Inner,
}

impl Transport {
    /// Start a new connection. Returns the transport and any bytes that must
    /// be sent immediately (an initiator's key and garbage).
    pub fn new(magic: NetworkMagic, role: HandshakeRole) -> (Self, Vec<u8>) {
        let (handshake, initial) = Handshake::new(magic, role);
        (Transport { inner: Inner::Handshaking(handshake) }, initial)
    }

    pub fn is_established(&self) -> bool {
        matches!(self.inner, Inner::Established(_))
    }

    /// Feed the full currently-buffered, not-yet-consumed bytes from the
    /// peer. Returns how many bytes were consumed -- the caller drops that
    /// many bytes from the front of its buffer before the next call -- along
    /// with whatever outgoing bytes and application messages resulted.
    ///
    /// `Err(Error::V1Fallback)` means the peer only ever spoke the legacy v1
    /// protocol; the caller should tear down this transport and reconnect
    /// with a v1 codec instead, feeding it the same bytes from the start.
    pub fn receive(&mut self, data: &[u8]) -> Result<(usize, TransportEvents), Error> {
        let mut events = TransportEvents::default();
        let mut total_consumed = 0;

        loop {
            match &mut self.inner {
                Inner::Handshaking(handshake) => {
                    let (consumed, event) = match handshake.feed(&data[total_consumed..]) {
                        Ok(ok) => ok,
                        Err(e) => {
                            if e == Error::V1Fallback {
                                self.inner = Inner::Failed;
                            }
                            return Err(e);
                        }
                    };
                    total_consumed += consumed;
                    match event {
                        HandshakeEvent::NeedMore => return Ok((total_consumed, events)),
                        HandshakeEvent::Send(bytes) => {
                            events.outgoing.extend(bytes);
                            if consumed == 0 {
                                // Nothing more to read from this call's buffer right now.
                                return Ok((total_consumed, events));
                            }
                            // Otherwise loop: more handshake bytes may already be buffered.
                        }
                        HandshakeEvent::Done(handler) => {
                            self.inner = Inner::Established(handler);
                            events.handshake_complete = true;
                        }
                    }
                }
                Inner::Established(handler) => {
                    match handler.reader.decrypt(&data[total_consumed..], &[])? {
                        DecryptOutcome::NeedMore => return Ok((total_consumed, events)),
                        DecryptOutcome::Packet { consumed, payload } => {
                            total_consumed += consumed;
                            if let Some(message) = payload {
                                events.messages.push(message);
                            }
                        }
                    }
                }
                Inner::Failed => {
                    return Ok((total_consumed, events));
                }
            }
        }
    }

    /// Encrypt and frame an application message for sending. Only valid once
    /// [`Transport::is_established`] returns `true`.
    pub fn send(&mut self, contents: &[u8]) -> Result<Vec<u8>, Error> {
        match &mut self.inner {
            Inner::Established(handler) => handler.writer.encrypt(contents, &[], false),
            Inner::Handshaking(_) | Inner::Failed => Err(Error::ProtocolViolation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_handshake(a: &mut Transport, b: &mut Transport, mut a_to_b: Vec<u8>, mut b_to_a: Vec<u8>) -> (Vec<u8>, Vec<u8>) {
        let mut guard = 0;
        while !(a.is_established() && b.is_established()) {
            guard += 1;
            assert!(guard < 10_000, "handshake did not converge");

            if !a.is_established() {
                let (consumed, events) = a.receive(&b_to_a).unwrap();
                b_to_a.drain(..consumed);
                a_to_b.extend(events.outgoing);
            }
            if !b.is_established() {
                let (consumed, events) = b.receive(&a_to_b).unwrap();
                a_to_b.drain(..consumed);
                b_to_a.extend(events.outgoing);
            }
        }
        (a_to_b, b_to_a)
    }

    #[test]
    fn arbitrary_chunking_end_to_end() {
        let (mut initiator, init_msg) = Transport::new(NetworkMagic::Regtest, HandshakeRole::Initiator);
        let (mut responder, resp_msg) = Transport::new(NetworkMagic::Regtest, HandshakeRole::Responder);
        assert!(resp_msg.is_empty());

        let (a_to_b, b_to_a) = run_handshake(&mut initiator, &mut responder, init_msg, resp_msg);
        assert!(a_to_b.is_empty() && b_to_a.is_empty(), "both sides should have drained everything sent");

        let packet = initiator.send(b"hello over an established session").unwrap();

        // Deliver it to the responder one byte at a time.
        let mut delivered = Vec::new();
        let mut seen_message = None;
        for byte in &packet {
            delivered.push(*byte);
            let (consumed, mut events) = responder.receive(&delivered).unwrap();
            delivered.drain(..consumed);
            if let Some(message) = events.messages.pop() {
                seen_message = Some(message);
            }
        }
        assert_eq!(seen_message.unwrap(), b"hello over an established session");
    }

    #[test]
    fn v1_prefix_on_responder_yields_fallback() {
        let (mut responder, _) = Transport::new(NetworkMagic::Regtest, HandshakeRole::Responder);
        let mut v1 = NetworkMagic::Regtest.bytes().to_vec();
        v1.extend_from_slice(b"version\0\0\0\0\0");
        assert_eq!(responder.receive(&v1).unwrap_err(), Error::V1Fallback);
    }
}
