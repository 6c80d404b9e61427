// SPDX-License-Identifier: CC0-1.0

//! Encrypted transport for the Bitcoin P2P protocol, as specified by BIP 324.
//!
//! This crate implements the "v2" transport: ElligatorSwift-encoded ECDH key
//! exchange, forward-secure ChaCha20/ChaCha20-Poly1305 packet encryption, and
//! the prefix scan that lets a responder fall back to the legacy v1
//! transport when a peer doesn't speak v2.
//!
//! The pieces compose bottom-up:
//!
//! - [`chacha20poly1305`]: the plain RFC 8439 ChaCha20-Poly1305 AEAD.
//! - [`fschacha20poly1305`]: BIP 324's forward-secure wrapper around it.
//! - [`fe`] and [`ellswift`]: secp256k1 field arithmetic and the
//!   ElligatorSwift encode/decode/ECDH primitives.
//! - [`packet`]: packet framing over an established session.
//! - [`handshake`]: the state machine that gets two peers to an established
//!   session.
//! - [`transport`]: the buffer-driven driver most callers want, wiring the
//!   handshake and packet layers together behind one `receive`/`send` API.
//!
//! None of these types open a socket. [`io`] (behind the `tokio` feature)
//! adapts [`transport::Transport`] to `AsyncRead`/`AsyncWrite`.

pub mod chacha20poly1305;
pub mod ellswift;
pub mod error;
pub mod fe;
pub mod fschacha20poly1305;
pub mod handshake;
pub mod hkdf;
pub mod packet;
pub mod shortids;
pub mod transport;
pub mod types;

#[cfg(feature = "tokio")]
pub mod io;

pub use error::Error;
pub use handshake::{Handshake, HandshakeEvent};
pub use packet::{PacketHandler, PacketReader, PacketWriter};
pub use transport::{Transport, TransportEvents};
pub use types::{HandshakeRole, NetworkMagic};
