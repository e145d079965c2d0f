//! Race simulation modules

pub mod controller;
pub mod damage;
pub mod leg;
pub mod rng;
pub mod roll;
pub mod session;
pub mod snapshot;
pub mod types;

pub use controller::{RaceController, RaceSettings};
pub use session::{RaceHandle, RaceRegistry, RaceSession};

use crate::ws::protocol::Intent;

/// Intent received from a connection
#[derive(Debug, Clone)]
pub struct PlayerIntent {
    /// Participant id the connection announced itself as
    pub sender_id: String,
    pub intent: Intent,
    pub received_at: u64,
}
