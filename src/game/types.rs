//! Shared race data types
//! These are owned by the controller and serialized into snapshots

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Gear selection, 1 (lowest) through 5 (top)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gear(u8);

impl Gear {
    pub const FIRST: Gear = Gear(1);
    pub const SECOND: Gear = Gear(2);
    pub const THIRD: Gear = Gear(3);
    pub const FOURTH: Gear = Gear(4);
    pub const TOP: Gear = Gear(5);

    /// Build a gear, clamping into the 1..=5 range
    pub fn clamped(value: i32) -> Self {
        Self(value.clamp(1, 5) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Die size rolled in this gear
    pub fn die_size(self) -> u32 {
        match self.0 {
            1 => 4,
            2 => 6,
            3 => 8,
            4 => 10,
            _ => 20,
        }
    }

    /// Gear after shifting one step in `dir`, clamped to the valid range
    pub fn shifted(self, dir: ShiftDirection) -> Self {
        Self::clamped(self.0 as i32 + dir.delta())
    }
}

impl Default for Gear {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Direction of a gear change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    Down,
    Up,
}

impl ShiftDirection {
    pub fn delta(self) -> i32 {
        match self {
            Self::Down => -1,
            Self::Up => 1,
        }
    }
}

impl TryFrom<i32> for ShiftDirection {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Down),
            1 => Ok(Self::Up),
            other => Err(other),
        }
    }
}

/// Leg weather
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    /// Single die, no modifiers
    #[default]
    Clear,
    /// Two dice, keep the higher
    Rain,
    /// Two dice, keep the lower
    Fog,
    /// Every voluntary roll forces a shift before the next one
    Sweltering,
    /// Top gear spin-outs on a high first die
    BlackIce,
}

impl Weather {
    pub fn label(self) -> &'static str {
        match self {
            Self::Clear => "Clear Skies",
            Self::Rain => "Rain",
            Self::Fog => "Fog",
            Self::Sweltering => "Sweltering",
            Self::BlackIce => "Black Ice",
        }
    }
}

/// Category of vehicle damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageKind {
    Engine,
    Fuel,
    Navigation,
    Windshield,
    Muffler,
    TractionControl,
}

impl DamageKind {
    /// Every category, in draw order
    pub const ALL: [DamageKind; 6] = [
        DamageKind::Engine,
        DamageKind::Fuel,
        DamageKind::Navigation,
        DamageKind::Windshield,
        DamageKind::Muffler,
        DamageKind::TractionControl,
    ];
}

/// Damage severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Severe,
}

impl Severity {
    const ORDER: [Severity; 4] = [
        Severity::Minor,
        Severity::Moderate,
        Severity::Major,
        Severity::Severe,
    ];

    fn rank(self) -> usize {
        match self {
            Self::Minor => 0,
            Self::Moderate => 1,
            Self::Major => 2,
            Self::Severe => 3,
        }
    }

    /// Severity for a given overshoot amount
    pub fn from_overshoot(amount: u32) -> Self {
        match amount {
            0..=5 => Self::Minor,
            6..=10 => Self::Moderate,
            11..=15 => Self::Major,
            _ => Self::Severe,
        }
    }

    /// Steps an existing entry escalates by when hit again at this severity
    pub fn escalation_steps(self) -> usize {
        self.rank() + 1
    }

    /// Move up the scale by `steps`, saturating at Severe
    pub fn escalated(self, steps: usize) -> Self {
        let idx = (self.rank() + steps).min(Self::ORDER.len() - 1);
        Self::ORDER[idx]
    }
}

/// A single damage entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    pub kind: DamageKind,
    pub severity: Severity,
}

/// One entry in a player's per-leg roll history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollRecord {
    /// Gear actually rolled (after fuel forcing / engine cap)
    pub gear: Gear,
    /// Raw dice drawn
    pub dice: Vec<u32>,
    /// Value added to distance
    #[serde(rename = "final")]
    pub final_value: u32,
}

/// Per-player car state (authoritative)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: String,
    pub name: String,

    // Per-leg
    pub current_gear: Gear,
    pub total_distance: u32,
    pub roll_history: Vec<RollRecord>,
    pub is_held: bool,
    pub has_overshot: bool,
    pub rolls_remaining: u32,
    pub shifts_this_leg: u32,
    pub must_shift: bool,

    // Cross-leg
    pub max_rolls_allowed: u32,
    pub damage: BTreeMap<DamageKind, Severity>,
    pub points: u32,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, name: impl Into<String>, starting_rolls: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            current_gear: Gear::FIRST,
            total_distance: 0,
            roll_history: Vec::new(),
            is_held: false,
            has_overshot: false,
            rolls_remaining: starting_rolls,
            shifts_this_leg: 0,
            must_shift: false,
            max_rolls_allowed: starting_rolls,
            damage: BTreeMap::new(),
            points: 0,
        }
    }

    pub fn damage_of(&self, kind: DamageKind) -> Option<Severity> {
        self.damage.get(&kind).copied()
    }

    /// Held, overshot or out of rolls
    pub fn is_resolved(&self) -> bool {
        self.is_held || self.has_overshot || self.rolls_remaining == 0
    }

    /// Clear per-leg fields, keeping points, damage and roll cap
    pub fn reset_for_leg(&mut self) {
        self.current_gear = Gear::FIRST;
        self.total_distance = 0;
        self.roll_history.clear();
        self.is_held = false;
        self.has_overshot = false;
        self.shifts_this_leg = 0;
        self.must_shift = false;
        self.rolls_remaining = self.max_rolls_allowed;
    }
}

/// A single race leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceLeg {
    pub name: String,
    pub target_distance: u32,
    pub weather: Weather,
    pub is_police_raid: bool,
    pub heat_at_start: u32,
}

/// Race phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Lobby,
    Leg,
    Checkpoint,
    End,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub ready: bool,
}
