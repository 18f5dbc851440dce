//! Error taxonomy for client operations.
//!
//! Each variant maps to exactly one NACK at the session layer; transport
//! failures live in `parlor_protocol::ProtocolError` and kill the
//! session instead.

use std::fmt;

use parlor_core::GameError;

/// Why a client operation was refused. State is never mutated when one
/// of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpError {
    /// No invitation under that ID, or no such logged-in user.
    NotFound,
    /// The invitation/game state machine forbids the operation.
    BadState,
    /// Already logged in, or the username is held by another live client.
    Duplicate,
    /// The client registry is at capacity.
    Full,
    /// Unparseable move text or illegal placement.
    InvalidMove,
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::NotFound => write!(f, "no such invitation or user"),
            OpError::BadState => write!(f, "operation not allowed in the current state"),
            OpError::Duplicate => write!(f, "already logged in under that username"),
            OpError::Full => write!(f, "client registry is full"),
            OpError::InvalidMove => write!(f, "invalid move"),
        }
    }
}

impl std::error::Error for OpError {}

impl From<GameError> for OpError {
    fn from(_: GameError) -> Self {
        OpError::InvalidMove
    }
}
