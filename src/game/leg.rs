//! Leg generation

use super::rng::RandomSource;
use super::types::{RaceLeg, Weather};

const LEG_FIRST_WORDS: [&str; 9] = [
    "Wooded",
    "City",
    "Suburban",
    "Highway",
    "Mountainside",
    "Desert",
    "Canyon",
    "Train",
    "Country",
];

const LEG_SECOND_WORDS: [&str; 9] = [
    "Way",
    "Streets",
    "Sprawl",
    "Sprint",
    "Climb",
    "Flats",
    "Run",
    "Tracks",
    "Backroads",
];

/// Shortest possible leg target
pub const MIN_TARGET_DISTANCE: u32 = 20;
/// Longest possible leg target
pub const MAX_TARGET_DISTANCE: u32 = 40;

/// Two-word leg name, one draw per word
pub fn random_leg_name<R: RandomSource + ?Sized>(rng: &mut R) -> String {
    let first = LEG_FIRST_WORDS[rng.pick_index(LEG_FIRST_WORDS.len())];
    let second = LEG_SECOND_WORDS[rng.pick_index(LEG_SECOND_WORDS.len())];
    format!("{} {}", first, second)
}

/// Clear 50%, every other weather 12.5%
pub fn determine_weather<R: RandomSource + ?Sized>(rng: &mut R) -> Weather {
    let roll = rng.next_unit();
    if roll < 0.5 {
        Weather::Clear
    } else if roll < 0.625 {
        Weather::Rain
    } else if roll < 0.75 {
        Weather::Fog
    } else if roll < 0.875 {
        Weather::Sweltering
    } else {
        Weather::BlackIce
    }
}

/// Generate leg `index`. The first leg is always clear.
///
/// Raid status and heat are left neutral; the controller decides those.
pub fn generate_leg<R: RandomSource + ?Sized>(index: u32, rng: &mut R) -> RaceLeg {
    let name = random_leg_name(rng);
    let span = (MAX_TARGET_DISTANCE - MIN_TARGET_DISTANCE + 1) as usize;
    let target_distance = MIN_TARGET_DISTANCE + rng.pick_index(span) as u32;
    let weather = if index == 0 {
        Weather::Clear
    } else {
        determine_weather(rng)
    };

    RaceLeg {
        name,
        target_distance,
        weather,
        is_police_raid: false,
        heat_at_start: 0,
    }
}
