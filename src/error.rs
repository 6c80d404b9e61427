//! The error surface of the transport. `NeedMore` is not a variant here: it
//! is signaled in-band through `DecryptOutcome::NeedMore` and
//! `HandshakeEvent::NeedMore` instead of an `Err`, since it isn't a failure.
//! `V1Fallback` is the one other control-flow signal; everything else is
//! fatal and the caller must drop the session.

use core::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The peer's initial bytes matched the legacy v1 magic prefix in full;
    /// the caller should switch this connection to the legacy codec.
    V1Fallback,
    /// A structural rule of the protocol was violated: garbage terminator
    /// not found within 4096 bytes, reserved header bits set, a length
    /// field exceeding 2^24 - 1, or similar.
    ProtocolViolation,
    /// An AEAD tag failed to verify, or a handshake packet otherwise failed
    /// to decrypt.
    AuthFailure,
    /// ElligatorSwift decoding produced an x-coordinate with no valid lift.
    /// Treated identically to [`Error::AuthFailure`] at the protocol
    /// surface so peers can't use it as a decryption oracle.
    CryptoInput,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::V1Fallback => write!(f, "peer is using the legacy v1 transport"),
            Error::ProtocolViolation => write!(f, "v2 transport protocol violation"),
            Error::AuthFailure => write!(f, "authentication failure"),
            Error::CryptoInput => write!(f, "invalid ElligatorSwift encoding"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<crate::fschacha20poly1305::Error> for Error {
    fn from(_: crate::fschacha20poly1305::Error) -> Self {
        Error::AuthFailure
    }
}
