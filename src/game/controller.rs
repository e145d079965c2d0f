//! Race state machine
//!
//! The controller owns the phase, the current leg, heat and every car. It is
//! driven by intents and a one second tick; every operation silently ignores
//! calls that are invalid for the current phase, name an unknown player, or
//! have nothing to act on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::damage::DamageSystem;
use super::leg::generate_leg;
use super::rng::{RandomSource, SeededRandom};
use super::roll::RollSystem;
use super::types::{Participant, Phase, PlayerState, RaceLeg, ShiftDirection};

/// Base points by finishing rank; anything past the table scores the fallback
const BASE_POINTS: [u32; 5] = [10, 8, 7, 6, 5];
const FALLBACK_POINTS: u32 = 4;
const UNDERDOG_BONUS: u32 = 8;
const RAID_DIE: u32 = 20;
const RAID_HEAT_RELIEF: u32 = 10;

/// Race tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceSettings {
    /// Legs per race
    pub max_legs: u32,
    /// Countdown for a leg
    pub leg_time_secs: u32,
    /// Countdown for a checkpoint
    pub checkpoint_secs: u32,
    /// Roll budget a new car starts with
    pub starting_rolls: u32,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            max_legs: 3,
            leg_time_secs: 60,
            checkpoint_secs: 20,
            starting_rolls: 7,
        }
    }
}

/// Score breakdown for one player at the end of a leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegResult {
    pub id: String,
    /// Zero-based finishing rank, absent if overshot
    pub rank: Option<u32>,
    pub distance: u32,
    pub base: u32,
    pub precision: u32,
    pub underdog: u32,
    /// Points actually added after the leg multiplier
    pub awarded: u32,
}

/// The authoritative race
pub struct RaceController<R: RandomSource = SeededRandom> {
    rng: R,
    settings: RaceSettings,
    phase: Phase,
    leg_index: Option<u32>,
    leg: Option<RaceLeg>,
    time_remaining_secs: u32,
    race_heat: u32,
    roster: Vec<Participant>,
    players: HashMap<String, PlayerState>,
    underdog: Option<String>,
    leader: Option<String>,
    leg_results: Vec<LegResult>,
}

impl<R: RandomSource> RaceController<R> {
    pub fn new(settings: RaceSettings, rng: R) -> Self {
        Self {
            rng,
            settings,
            phase: Phase::Lobby,
            leg_index: None,
            leg: None,
            time_remaining_secs: 0,
            race_heat: 0,
            roster: Vec::new(),
            players: HashMap::new(),
            underdog: None,
            leader: None,
            leg_results: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &RaceSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn leg_index(&self) -> Option<u32> {
        self.leg_index
    }

    pub fn leg(&self) -> Option<&RaceLeg> {
        self.leg.as_ref()
    }

    pub fn time_remaining_secs(&self) -> u32 {
        self.time_remaining_secs
    }

    pub fn race_heat(&self) -> u32 {
        self.race_heat
    }

    /// Roster in join order
    pub fn participants(&self) -> &[Participant] {
        &self.roster
    }

    pub fn player(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Cars in join order
    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.roster.iter().filter_map(|p| self.players.get(&p.id))
    }

    pub fn underdog(&self) -> Option<&str> {
        self.underdog.as_deref()
    }

    pub fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    /// Breakdown of the most recently scored leg
    pub fn leg_results(&self) -> &[LegResult] {
        &self.leg_results
    }

    // ------------------------------------------------------------------
    // Lobby
    // ------------------------------------------------------------------

    /// Register a participant and a fresh car. Not phase gated.
    pub fn add_participant(&mut self, id: &str, name: &str) {
        if self.players.contains_key(id) {
            return;
        }
        self.roster.push(Participant {
            id: id.to_string(),
            name: name.to_string(),
            ready: false,
        });
        self.players.insert(
            id.to_string(),
            PlayerState::new(id, name, self.settings.starting_rolls),
        );
        info!(player_id = %id, phase = ?self.phase, "Participant joined");
    }

    pub fn set_ready(&mut self, id: &str, ready: bool) {
        if let Some(p) = self.roster.iter_mut().find(|p| p.id == id) {
            p.ready = ready;
        }
    }

    /// Start the first leg once everyone in the lobby is ready
    pub fn start_if_all_ready(&mut self) {
        if self.phase != Phase::Lobby {
            return;
        }
        if self.roster.is_empty() || !self.roster.iter().all(|p| p.ready) {
            debug!(participants = self.roster.len(), "Start refused, not everyone is ready");
            return;
        }
        self.start_next_leg();
    }

    // ------------------------------------------------------------------
    // Phase transitions
    // ------------------------------------------------------------------

    /// Advance one second. Expiry ends the leg or starts the next one.
    pub fn tick_one_second(&mut self) {
        if !matches!(self.phase, Phase::Leg | Phase::Checkpoint) {
            return;
        }
        self.time_remaining_secs = self.time_remaining_secs.saturating_sub(1);
        if self.time_remaining_secs > 0 {
            return;
        }
        match self.phase {
            Phase::Leg => self.end_leg(),
            _ => self.start_next_leg(),
        }
    }

    /// Skip the rest of the checkpoint countdown
    pub fn next_leg(&mut self) {
        if self.phase != Phase::Checkpoint {
            return;
        }
        self.start_next_leg();
    }

    fn start_next_leg(&mut self) {
        let index = self.leg_index.map_or(0, |i| i + 1);
        self.leg_index = Some(index);

        if index >= self.settings.max_legs {
            self.phase = Phase::End;
            self.leg = None;
            self.time_remaining_secs = 0;
            info!(legs = index, "Race finished");
            return;
        }

        let mut leg = generate_leg(index, &mut self.rng);
        leg.heat_at_start = self.race_heat;
        let draw = self.rng.roll_die(RAID_DIE);
        if draw <= self.race_heat {
            leg.is_police_raid = true;
            self.race_heat = self.race_heat.saturating_sub(RAID_HEAT_RELIEF);
            info!(draw, heat = self.race_heat, "Police raid");
        }

        for player in self.players.values_mut() {
            player.reset_for_leg();
        }
        self.underdog = self.lowest_scorer();
        self.leader = self.highest_scorer();

        info!(
            leg_index = index,
            name = %leg.name,
            target = leg.target_distance,
            weather = leg.weather.label(),
            raid = leg.is_police_raid,
            "Leg started"
        );

        self.leg = Some(leg);
        self.phase = Phase::Leg;
        self.time_remaining_secs = self.settings.leg_time_secs;
    }

    fn lowest_scorer(&self) -> Option<String> {
        self.players()
            .fold(None::<&PlayerState>, |best, p| match best {
                Some(b) if b.points <= p.points => Some(b),
                _ => Some(p),
            })
            .map(|p| p.id.clone())
    }

    fn highest_scorer(&self) -> Option<String> {
        self.players()
            .fold(None::<&PlayerState>, |best, p| match best {
                Some(b) if b.points >= p.points => Some(b),
                _ => Some(p),
            })
            .map(|p| p.id.clone())
    }

    /// Score the leg and move to the checkpoint
    pub fn end_leg(&mut self) {
        if self.phase != Phase::Leg {
            return;
        }
        let Some(leg) = self.leg.as_ref() else {
            return;
        };
        let target = leg.target_distance;
        let index = self.leg_index.unwrap_or(0);
        let (numerator, denominator) = leg_multiplier(index, self.settings.max_legs);

        let mut ranked: Vec<&PlayerState> = self.players().filter(|p| !p.has_overshot).collect();
        ranked.sort_by(|a, b| {
            a.total_distance
                .abs_diff(target)
                .cmp(&b.total_distance.abs_diff(target))
                .then(b.total_distance.cmp(&a.total_distance))
        });

        let leader_overshot = self
            .leader
            .as_ref()
            .and_then(|id| self.players.get(id))
            .is_some_and(|p| p.has_overshot);
        let leader_rank = self
            .leader
            .as_ref()
            .and_then(|id| ranked.iter().position(|p| &p.id == id));

        let mut results: Vec<LegResult> = ranked
            .iter()
            .enumerate()
            .map(|(rank, p)| {
                let base = BASE_POINTS.get(rank).copied().unwrap_or(FALLBACK_POINTS);
                let precision = precision_bonus(p.total_distance.abs_diff(target));
                let is_underdog = self.underdog.as_deref() == Some(p.id.as_str());
                let underdog = if is_underdog
                    && (leader_overshot || leader_rank.is_some_and(|lr| rank < lr))
                {
                    UNDERDOG_BONUS
                } else {
                    0
                };
                let subtotal = base + precision + underdog;
                LegResult {
                    id: p.id.clone(),
                    rank: Some(rank as u32),
                    distance: p.total_distance,
                    base,
                    precision,
                    underdog,
                    awarded: (subtotal * numerator).div_ceil(denominator),
                }
            })
            .collect();

        results.extend(self.players().filter(|p| p.has_overshot).map(|p| LegResult {
            id: p.id.clone(),
            rank: None,
            distance: p.total_distance,
            base: 0,
            precision: 0,
            underdog: 0,
            awarded: 0,
        }));

        for result in &results {
            if let Some(player) = self.players.get_mut(&result.id) {
                player.points += result.awarded;
            }
        }

        info!(
            leg_index = index,
            target,
            scored = results.iter().filter(|r| r.rank.is_some()).count(),
            overshot = results.iter().filter(|r| r.rank.is_none()).count(),
            "Leg ended"
        );

        self.leg_results = results;
        self.phase = Phase::Checkpoint;
        self.time_remaining_secs = self.settings.checkpoint_secs;
    }

    // ------------------------------------------------------------------
    // Leg actions
    // ------------------------------------------------------------------

    /// Roll for `id`; overshoots add heat and damage the car
    pub fn roll(&mut self, id: &str) {
        if self.phase != Phase::Leg {
            return;
        }
        let (Some(leg), Some(player)) = (self.leg.as_ref(), self.players.get(id)) else {
            return;
        };
        let target = leg.target_distance;
        let outcome = RollSystem::perform_roll(player, leg, &mut self.rng);
        if !outcome.rolled {
            debug!(
                player_id = %id,
                shift_owed = outcome.requires_shift_after,
                "Roll refused"
            );
            return;
        }

        let mut updated = outcome.player;
        let overshoot = updated.total_distance.saturating_sub(target);
        if overshoot > 0 || outcome.immediate_overshoot {
            self.race_heat += 1 + DamageSystem::muffler_heat_bonus(&updated);
            let result = DamageSystem::apply_overshoot_damage(&updated, overshoot.max(1), &mut self.rng);
            info!(
                player_id = %id,
                distance = updated.total_distance,
                target,
                spin_out = outcome.immediate_overshoot,
                damage = ?result.damage.kind,
                severity = ?result.damage.severity,
                heat = self.race_heat,
                "Overshoot"
            );
            updated = result.player;
        } else {
            debug!(player_id = %id, value = outcome.value, distance = updated.total_distance, "Rolled");
        }
        self.players.insert(id.to_string(), updated);

        if self.players.values().all(PlayerState::is_resolved) {
            self.end_leg();
        }
    }

    pub fn hold(&mut self, id: &str) {
        if self.phase != Phase::Leg {
            return;
        }
        if let Some(p) = self.players.get_mut(id) {
            p.is_held = true;
        }
    }

    /// Shift one gear; only after the first roll and while still racing
    pub fn shift(&mut self, id: &str, dir: ShiftDirection) {
        if self.phase != Phase::Leg {
            return;
        }
        let Some(p) = self.players.get_mut(id) else {
            return;
        };
        if p.roll_history.is_empty() || p.is_held || p.has_overshot {
            return;
        }
        p.current_gear = p.current_gear.shifted(dir);
        p.shifts_this_leg += 1;
        p.must_shift = false;
    }

    // ------------------------------------------------------------------
    // Checkpoint actions
    // ------------------------------------------------------------------

    /// Clear all damage for one roll of capacity. Returns whether it happened.
    pub fn repair(&mut self, id: &str) -> bool {
        if self.phase != Phase::Checkpoint {
            return false;
        }
        let Some(p) = self.players.get_mut(id) else {
            return false;
        };
        let repaired = DamageSystem::repair(p);
        if repaired {
            info!(player_id = %id, max_rolls = p.max_rolls_allowed, "Car repaired");
        }
        repaired
    }
}

/// Exact hits and near misses earn extra points. Bounds are exclusive.
fn precision_bonus(error: u32) -> u32 {
    match error {
        0 => 5,
        1 => 3,
        2..=4 => 2,
        _ => 0,
    }
}

/// Multiplier as a fraction: 1x, 1.5x, 2x by thirds of the race
fn leg_multiplier(index: u32, max_legs: u32) -> (u32, u32) {
    let third = max_legs.div_ceil(3).max(1);
    if index < third {
        (2, 2)
    } else if index < third * 2 {
        (3, 2)
    } else {
        (4, 2)
    }
}
