//! Snapshot building and follower-side ordering

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::controller::{LegResult, RaceController};
use super::rng::RandomSource;
use super::types::{Participant, Phase, PlayerState, RaceLeg};

/// Scoreboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub id: String,
    pub points: u32,
}

/// Full race view distributed to followers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceState {
    pub phase: Phase,
    pub participants: Vec<Participant>,
    /// Absent until the first leg starts
    pub leg_index: Option<u32>,
    pub max_legs: u32,
    pub leg: Option<RaceLeg>,
    pub players: BTreeMap<String, PlayerState>,
    pub time_remaining_sec: u32,
    /// Sorted by points, highest first
    pub scoreboard: Vec<ScoreEntry>,
    pub race_heat: u32,
    pub underdog: Option<String>,
    pub leader: Option<String>,
    pub leg_results: Vec<LegResult>,
}

impl RaceState {
    /// Copy the current controller state
    pub fn capture<R: RandomSource>(controller: &RaceController<R>) -> Self {
        let mut scoreboard: Vec<ScoreEntry> = controller
            .players()
            .map(|p| ScoreEntry {
                id: p.id.clone(),
                points: p.points,
            })
            .collect();
        scoreboard.sort_by(|a, b| b.points.cmp(&a.points));

        Self {
            phase: controller.phase(),
            participants: controller.participants().to_vec(),
            leg_index: controller.leg_index(),
            max_legs: controller.settings().max_legs,
            leg: controller.leg().cloned(),
            players: controller
                .players()
                .map(|p| (p.id.clone(), p.clone()))
                .collect(),
            time_remaining_sec: controller.time_remaining_secs(),
            scoreboard,
            race_heat: controller.race_heat(),
            underdog: controller.underdog().map(str::to_string),
            leader: controller.leader().map(str::to_string),
            leg_results: controller.leg_results().to_vec(),
        }
    }
}

/// Builds versioned snapshots for one race
pub struct SnapshotBuilder {
    race_id: Uuid,
    version: u64,
    last_state: Option<RaceState>,
}

impl SnapshotBuilder {
    pub fn new(race_id: Uuid) -> Self {
        Self {
            race_id,
            version: 0,
            last_state: None,
        }
    }

    pub fn race_id(&self) -> Uuid {
        self.race_id
    }

    /// Version of the last snapshot built
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Build a snapshot if the state changed since the last one
    pub fn build_if_changed(&mut self, state: RaceState) -> Option<ServerMsg> {
        if self.last_state.as_ref() == Some(&state) {
            return None;
        }
        Some(self.build(state))
    }

    /// Build a snapshot with the next version
    pub fn build(&mut self, state: RaceState) -> ServerMsg {
        self.version += 1;
        self.last_state = Some(state.clone());
        ServerMsg::Snapshot {
            race_id: self.race_id,
            version: self.version,
            state,
        }
    }
}

/// Follower view: keeps the newest snapshot, dropping stale and duplicate ones
#[derive(Debug, Default)]
pub struct SnapshotFollower {
    race_id: Option<Uuid>,
    /// Races this view has moved past; their snapshots are always stale
    retired: HashSet<Uuid>,
    version: u64,
    state: Option<RaceState>,
}

impl SnapshotFollower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a server message. Returns true if the view changed.
    pub fn apply(&mut self, msg: ServerMsg) -> bool {
        let ServerMsg::Snapshot {
            race_id,
            version,
            state,
        } = msg
        else {
            return false;
        };

        if self.retired.contains(&race_id) {
            return false;
        }
        match self.race_id {
            Some(current) if current == race_id => {
                if version <= self.version {
                    return false;
                }
            }
            Some(current) => {
                self.retired.insert(current);
            }
            None => {}
        }
        self.race_id = Some(race_id);
        self.version = version;
        self.state = Some(state);
        true
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> Option<&RaceState> {
        self.state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::controller::RaceSettings;
    use crate::game::rng::SequenceRandom;

    fn controller() -> RaceController<SequenceRandom> {
        let mut c = RaceController::new(RaceSettings::default(), SequenceRandom::new(vec![0.4]));
        c.add_participant("a", "Alice");
        c.add_participant("b", "Bob");
        c
    }

    fn version_of(msg: &ServerMsg) -> u64 {
        match msg {
            ServerMsg::Snapshot { version, .. } => *version,
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn capture_reflects_controller() {
        let mut c = controller();
        c.set_ready("a", true);
        let state = RaceState::capture(&c);
        assert_eq!(state.phase, Phase::Lobby);
        assert_eq!(state.leg_index, None);
        assert_eq!(state.max_legs, 3);
        assert!(state.leg.is_none());
        assert_eq!(state.players.len(), 2);
        assert!(state.participants[0].ready);
        assert!(!state.participants[1].ready);
    }

    #[test]
    fn scoreboard_sorted_descending() {
        let mut c = controller();
        c.add_participant("c", "Cy");
        for id in ["a", "b", "c"] {
            c.set_ready(id, true);
        }
        c.start_if_all_ready();
        c.hold("a");
        c.hold("c");
        c.roll("b");
        c.end_leg();

        let state = RaceState::capture(&c);
        let points: Vec<u32> = state.scoreboard.iter().map(|s| s.points).collect();
        let mut sorted = points.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(points, sorted);
        assert_eq!(state.scoreboard[0].id, "b");
    }

    #[test]
    fn versions_increase_only_on_change() {
        let mut c = controller();
        let mut builder = SnapshotBuilder::new(Uuid::new_v4());

        let first = builder.build_if_changed(RaceState::capture(&c)).unwrap();
        assert_eq!(version_of(&first), 1);
        assert!(builder.build_if_changed(RaceState::capture(&c)).is_none());

        c.set_ready("a", true);
        let second = builder.build_if_changed(RaceState::capture(&c)).unwrap();
        assert_eq!(version_of(&second), 2);
        assert_eq!(builder.version(), 2);
    }

    #[test]
    fn follower_discards_stale_and_duplicate() {
        let c = controller();
        let mut builder = SnapshotBuilder::new(Uuid::new_v4());
        let v1 = builder.build(RaceState::capture(&c));
        let v2 = builder.build(RaceState::capture(&c));
        let v3 = builder.build(RaceState::capture(&c));

        let mut follower = SnapshotFollower::new();
        assert!(follower.apply(v1.clone()));
        // v2 lost in transit
        assert!(follower.apply(v3.clone()));
        assert!(!follower.apply(v2));
        assert!(!follower.apply(v3));
        assert!(!follower.apply(v1));
        assert_eq!(follower.version(), 3);
    }

    #[test]
    fn follower_accepts_new_race() {
        let c = controller();
        let mut old = SnapshotBuilder::new(Uuid::new_v4());
        for _ in 0..5 {
            old.build(RaceState::capture(&c));
        }
        let mut follower = SnapshotFollower::new();
        assert!(follower.apply(old.build(RaceState::capture(&c))));

        let mut fresh = SnapshotBuilder::new(Uuid::new_v4());
        assert!(follower.apply(fresh.build(RaceState::capture(&c))));
        assert_eq!(follower.version(), 1);
    }

    #[test]
    fn follower_never_returns_to_a_replaced_race() {
        let mut c = controller();
        let mut old = SnapshotBuilder::new(Uuid::new_v4());
        let old_v1 = old.build(RaceState::capture(&c));
        let old_v2 = old.build(RaceState::capture(&c));

        let mut follower = SnapshotFollower::new();
        assert!(follower.apply(old_v1));

        for id in ["a", "b"] {
            c.set_ready(id, true);
        }
        c.start_if_all_ready();
        let mut fresh = SnapshotBuilder::new(Uuid::new_v4());
        assert!(follower.apply(fresh.build(RaceState::capture(&c))));

        // delayed snapshot from the race that was replaced
        assert!(!follower.apply(old_v2));
        assert_eq!(follower.version(), 1);
        assert_eq!(follower.state().map(|s| s.phase), Some(Phase::Leg));

        assert!(follower.apply(fresh.build(RaceState::capture(&c))));
        assert_eq!(follower.version(), 2);
    }

    #[test]
    fn follower_ignores_errors() {
        let mut follower = SnapshotFollower::new();
        let changed = follower.apply(ServerMsg::Error {
            code: "bad_intent".to_string(),
            message: "nope".to_string(),
        });
        assert!(!changed);
        assert!(follower.state().is_none());
    }
}
