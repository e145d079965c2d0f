//! Overshoot damage and its side effects

use super::rng::RandomSource;
use super::types::{Damage, DamageKind, PlayerState, Severity};

/// Player and the damage entry written by an overshoot
#[derive(Debug, Clone)]
pub struct OvershootResult {
    pub player: PlayerState,
    pub damage: Damage,
}

/// Damage system for overshoots and repairs
pub struct DamageSystem;

impl DamageSystem {
    /// Lock the player out for the leg and damage a random category.
    ///
    /// A category already present escalates by the step size of the newly
    /// computed severity instead of being overwritten.
    pub fn apply_overshoot_damage<R: RandomSource + ?Sized>(
        player: &PlayerState,
        overshoot_amount: u32,
        rng: &mut R,
    ) -> OvershootResult {
        let severity = Severity::from_overshoot(overshoot_amount);
        let kind = DamageKind::ALL[rng.pick_index(DamageKind::ALL.len())];

        let next = match player.damage_of(kind) {
            Some(current) => current.escalated(severity.escalation_steps()),
            None => severity,
        };

        let mut updated = player.clone();
        updated.damage.insert(kind, next);
        updated.has_overshot = true;

        OvershootResult {
            player: updated,
            damage: Damage {
                kind,
                severity: next,
            },
        }
    }

    /// Extra heat an overshoot generates with a damaged muffler
    pub fn muffler_heat_bonus(player: &PlayerState) -> u32 {
        match player.damage_of(DamageKind::Muffler) {
            None => 0,
            Some(Severity::Minor) => 1,
            Some(Severity::Moderate) => 2,
            Some(Severity::Major) => 3,
            Some(Severity::Severe) => 4,
        }
    }

    /// Clear all damage in exchange for one roll of capacity.
    ///
    /// Returns false (and leaves the player alone) when there is nothing to
    /// repair or the roll cap is already at its floor.
    pub fn repair(player: &mut PlayerState) -> bool {
        if player.damage.is_empty() || player.max_rolls_allowed <= MIN_ROLLS_ALLOWED {
            return false;
        }
        player.damage.clear();
        player.max_rolls_allowed -= 1;
        player.rolls_remaining = player.rolls_remaining.min(player.max_rolls_allowed);
        true
    }
}

/// Repairs can never take the roll cap below this
pub const MIN_ROLLS_ALLOWED: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rng::SequenceRandom;

    /// Draw that selects `kind`
    fn pick(kind: DamageKind) -> f64 {
        let idx = DamageKind::ALL.iter().position(|k| *k == kind).unwrap();
        (idx as f64 + 0.5) / DamageKind::ALL.len() as f64
    }

    #[test]
    fn fresh_damage_uses_computed_severity() {
        let p = PlayerState::new("p", "P", 7);
        let mut rng = SequenceRandom::new(vec![pick(DamageKind::Windshield)]);
        let out = DamageSystem::apply_overshoot_damage(&p, 12, &mut rng);
        assert!(out.player.has_overshot);
        assert_eq!(
            out.damage,
            Damage {
                kind: DamageKind::Windshield,
                severity: Severity::Major
            }
        );
        assert_eq!(out.player.damage.len(), 1);
    }

    #[test]
    fn existing_damage_escalates() {
        let mut p = PlayerState::new("p", "P", 7);
        p.damage.insert(DamageKind::Muffler, Severity::Minor);

        // Moderate overshoot escalates by two steps
        let mut rng = SequenceRandom::new(vec![pick(DamageKind::Muffler)]);
        let out = DamageSystem::apply_overshoot_damage(&p, 8, &mut rng);
        assert_eq!(out.damage.severity, Severity::Major);
        assert_eq!(out.player.damage.len(), 1);

        // Minor overshoot escalates by one
        let mut rng = SequenceRandom::new(vec![pick(DamageKind::Muffler)]);
        let out = DamageSystem::apply_overshoot_damage(&p, 1, &mut rng);
        assert_eq!(out.damage.severity, Severity::Moderate);

        // Severe saturates
        let mut rng = SequenceRandom::new(vec![pick(DamageKind::Muffler)]);
        let out = DamageSystem::apply_overshoot_damage(&p, 40, &mut rng);
        assert_eq!(out.damage.severity, Severity::Severe);
    }

    #[test]
    fn muffler_bonus_by_severity() {
        let mut p = PlayerState::new("p", "P", 7);
        assert_eq!(DamageSystem::muffler_heat_bonus(&p), 0);
        p.damage.insert(DamageKind::Muffler, Severity::Major);
        assert_eq!(DamageSystem::muffler_heat_bonus(&p), 3);
    }

    #[test]
    fn repair_trades_a_roll_for_a_clean_car() {
        let mut p = PlayerState::new("p", "P", 7);
        assert!(!DamageSystem::repair(&mut p));
        assert_eq!(p.max_rolls_allowed, 7);

        p.damage.insert(DamageKind::Engine, Severity::Severe);
        p.damage.insert(DamageKind::Fuel, Severity::Minor);
        assert!(DamageSystem::repair(&mut p));
        assert!(p.damage.is_empty());
        assert_eq!(p.max_rolls_allowed, 6);
        assert_eq!(p.rolls_remaining, 6);
    }

    #[test]
    fn repair_respects_roll_floor() {
        let mut p = PlayerState::new("p", "P", 1);
        p.damage.insert(DamageKind::Engine, Severity::Minor);
        assert!(!DamageSystem::repair(&mut p));
        assert_eq!(p.damage.len(), 1);
        assert_eq!(p.max_rolls_allowed, 1);
    }
}
