//! parlor-core
//!
//! Pure match-domain logic:
//! - roles and pieces
//! - the 3×3 board state machine
//! - rated player identities and the Elo update rule

pub mod game;
pub mod player;
pub mod role;

pub use game::{Game, GameError, Move};
pub use player::{MatchOutcome, Player, INITIAL_RATING};
pub use role::Role;
