//! Rally Race Server - authoritative host for a turn-based multiplayer rally race
//!
//! Participants join a room over WebSocket, send intents, and receive
//! versioned snapshots of the race the host simulates.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
