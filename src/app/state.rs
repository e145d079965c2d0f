//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RaceRegistry;
use crate::util::time::RACE_TICK;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub races: Arc<RaceRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let races = Arc::new(RaceRegistry::new(config.race, config.race_seed, RACE_TICK));
        Self {
            config: Arc::new(config),
            races,
        }
    }
}
