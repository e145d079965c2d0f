//! Roll resolution - gear dice, weather, traction and fuel effects

use super::rng::RandomSource;
use super::types::{DamageKind, Gear, PlayerState, RaceLeg, RollRecord, Severity, Weather};

/// Result of a roll attempt
#[derive(Debug, Clone)]
pub struct RollOutcome {
    /// Player after the roll (unchanged if refused)
    pub player: PlayerState,
    /// Value added to distance (0 if refused)
    pub value: u32,
    /// Roll actually happened
    pub rolled: bool,
    /// Black Ice spin-out
    pub immediate_overshoot: bool,
    /// A gear change is owed before the next roll
    pub requires_shift_after: bool,
}

impl RollOutcome {
    fn refused(player: &PlayerState, requires_shift_after: bool) -> Self {
        Self {
            player: player.clone(),
            value: 0,
            rolled: false,
            immediate_overshoot: false,
            requires_shift_after,
        }
    }
}

/// Weather-adjusted draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherRoll {
    pub dice: Vec<u32>,
    pub value: u32,
}

/// Roll system for resolving a single turn
pub struct RollSystem;

impl RollSystem {
    /// Highest gear the engine can use
    pub fn max_gear_allowed(player: &PlayerState) -> Gear {
        match player.damage_of(DamageKind::Engine) {
            None => Gear::TOP,
            Some(Severity::Minor) => Gear::FOURTH,
            Some(Severity::Moderate) => Gear::THIRD,
            Some(Severity::Major) => Gear::SECOND,
            Some(Severity::Severe) => Gear::FIRST,
        }
    }

    /// Fuel damage forces top gear near the end of the roll budget
    pub fn forced_gear_from_fuel(player: &PlayerState) -> Option<Gear> {
        let severity = player.damage_of(DamageKind::Fuel)?;
        let window = match severity {
            Severity::Minor => 1,
            Severity::Moderate => 2,
            Severity::Major => 3,
            Severity::Severe => 4,
        };
        (player.rolls_remaining <= window).then_some(Gear::TOP)
    }

    /// Draw dice for the weather. Rain keeps the best of two, fog the worst.
    pub fn weather_roll<R: RandomSource + ?Sized>(
        weather: Weather,
        die: u32,
        rng: &mut R,
    ) -> WeatherRoll {
        let first = rng.roll_die(die);
        match weather {
            Weather::Rain | Weather::Fog => {
                let second = rng.roll_die(die);
                let value = if weather == Weather::Rain {
                    first.max(second)
                } else {
                    first.min(second)
                };
                WeatherRoll {
                    dice: vec![first, second],
                    value,
                }
            }
            Weather::Clear | Weather::Sweltering | Weather::BlackIce => WeatherRoll {
                dice: vec![first],
                value: first,
            },
        }
    }

    /// Damaged traction control turns anything above the threshold into a 20
    pub fn apply_traction_cap(value: u32, player: &PlayerState) -> u32 {
        let Some(severity) = player.damage_of(DamageKind::TractionControl) else {
            return value;
        };
        let threshold = match severity {
            Severity::Minor => 18,
            Severity::Moderate => 15,
            Severity::Major => 12,
            Severity::Severe => 9,
        };
        if value > threshold {
            20
        } else {
            value
        }
    }

    /// Resolve one roll for `player` on `leg`
    pub fn perform_roll<R: RandomSource + ?Sized>(
        player: &PlayerState,
        leg: &RaceLeg,
        rng: &mut R,
    ) -> RollOutcome {
        if player.rolls_remaining == 0 || player.is_held || player.has_overshot {
            return RollOutcome::refused(player, false);
        }
        if player.must_shift {
            return RollOutcome::refused(player, true);
        }

        let forced = Self::forced_gear_from_fuel(player);
        let gear = match forced {
            Some(gear) => gear,
            None => player.current_gear.min(Self::max_gear_allowed(player)),
        };

        let drawn = Self::weather_roll(leg.weather, gear.die_size(), rng);
        let mut value = Self::apply_traction_cap(drawn.value, player);
        if leg.is_police_raid {
            value *= 2;
        }

        let immediate_overshoot =
            leg.weather == Weather::BlackIce && gear == Gear::TOP && drawn.dice[0] > 15;
        let requires_shift_after = leg.weather == Weather::Sweltering && forced.is_none();

        let mut updated = player.clone();
        if let Some(gear) = forced {
            updated.current_gear = gear;
        }
        updated.total_distance += value;
        updated.rolls_remaining -= 1;
        updated.roll_history.push(RollRecord {
            gear,
            dice: drawn.dice,
            final_value: value,
        });
        updated.must_shift = requires_shift_after;

        RollOutcome {
            player: updated,
            value,
            rolled: true,
            immediate_overshoot,
            requires_shift_after,
        }
    }
}
