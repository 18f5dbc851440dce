//! parlor-server
//!
//! Multi-client async TCP server brokering two-player Tic-Tac-Toe
//! matches. Glues together:
//! - `parlor-core` (board, roles, ratings)
//! - `parlor-protocol` (packet framing)
//! and exposes a `server::run(Config, CancellationToken)` entrypoint.

pub mod client;
pub mod client_registry;
pub mod config;
pub mod error;
pub mod invitation;
pub mod player_registry;
pub mod server;
pub mod session;
